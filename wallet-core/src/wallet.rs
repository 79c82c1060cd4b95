//! The wallet orchestration layer: owns account keys and every piece of mutable state (blockchain
//! mirror, owned outputs, payments, unconfirmed sends, transfer log), and drives the scan pipeline
//! and transaction builder against them.
//!
//! This is the one module that ties [`crate::blockchain`], [`crate::scan`], [`crate::send`], and
//! [`crate::persistence`] together into the method surface an embedder actually calls
//! (`refresh`, `transfer`, `commit_tx`, `store`, ...) — everything below this layer is a pure
//! function of its arguments; `Wallet` is where side effects (the filesystem, the daemon, wall
//! clock time) enter the picture.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::account::{AccountKeys, Address};
use crate::blockchain::Blockchain;
use crate::config::{RefreshConfig, SendConfig};
use crate::crypto::{CryptoNotePrimitives, Hash};
use crate::digits::Destination;
use crate::error::{DaemonError, PersistError, ScanError, SendError, WalletCoreError};
use crate::extra::{find_payment_id, PaymentId};
use crate::output::{KeyImage, OutputId, OutputTable, OwnedOutput};
use crate::payment::{PaymentDetail, PaymentTable};
use crate::rpc::DaemonClient;
use crate::scan::{self, CheckedTxItem, RefreshCallbacks};
use crate::send::{self, PendingTx};
use crate::transfer_log::{Direction, TransferLog, TransferLogEntry};
use crate::tx::BlockCodec;
use crate::unconfirmed::UnconfirmedTable;

/// One day of slack subtracted from the account's creation time, both for the `QueryBlocks`
/// request's timestamp anchor and for the scan pipeline's block-timestamp prefilter. Accounts for
/// clock skew between the node that mined a block and this wallet's own creation-time estimate.
pub const ACCOUNT_CREATION_SLACK_SECS: u64 = 86_400;

/// The current Unix time. The one place this crate reads the wall clock, so call sites that need
/// a timestamp (commit time, the `QueryBlocks` cutoff) share a single, mockable choke point.
pub fn now_unix() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

/// Derive a placeholder key image for a watch-only account's owned output.
///
/// A watch-only account has no spend secret, so it cannot compute the real CryptoNote key image
/// (`Hs(ephemeral_secret) * Hp(ephemeral_public)`) that would let it notice this output's own
/// spend. A `keccak256(tx_hash || output_index)` placeholder still satisfies [`OutputTable`]'s
/// key-image-uniqueness invariant, but a watch-only wallet must not be taken to have spend
/// detection: it will never recognize this output as spent by a transaction it didn't build
/// itself.
fn synthetic_key_image(
  primitives: &dyn CryptoNotePrimitives,
  tx_hash: &Hash,
  output_index: usize,
) -> KeyImage {
  let mut data = Vec::with_capacity(40);
  data.extend_from_slice(tx_hash.as_bytes());
  data.extend_from_slice(&(output_index as u64).to_le_bytes());
  let hash = primitives.keccak256(&data);
  KeyImage::from_bytes(*hash.as_bytes())
}

/// A built, ring-signed transaction awaiting `commit_tx`/`commit_split`.
///
/// Stamped with the blockchain generation ([`Wallet::detach_generation`]) it was selected
/// against: committing after an intervening reorg would broadcast a transaction spending outputs
/// this wallet may no longer believe it owns, so `commit_tx` refuses with
/// [`SendError::SelectionInvalidatedByDetach`] instead.
pub struct PendingTransfer {
  pending: PendingTx,
  generation: u64,
}

impl PendingTransfer {
  /// The transaction fee.
  pub fn fee(&self) -> u64 {
    self.pending.fee
  }

  /// The dust residue folded into the fee or paid to the dust policy's address.
  pub fn dust(&self) -> u64 {
    self.pending.dust
  }

  /// Space-joined hex key images this transaction nullifies, for logging only.
  pub fn key_image_debug_string(&self) -> &str {
    &self.pending.key_image_debug_string
  }
}

/// The serial state mutation the applier performs for one scanned transaction: clear any matching
/// unconfirmed send, record newly-owned outputs, flip spent outputs, and synthesize or update a
/// transfer-log entry.
#[allow(clippy::too_many_arguments)]
fn apply_tx(
  primitives: &dyn CryptoNotePrimitives,
  daemon: &dyn DaemonClient,
  outputs: &mut OutputTable,
  payments: &mut PaymentTable,
  unconfirmed: &mut UnconfirmedTable,
  transfer_log: &mut TransferLog,
  callbacks: &mut dyn RefreshCallbacks,
  account: &AccountKeys,
  checked: CheckedTxItem,
) -> Result<(), ScanError> {
  let CheckedTxItem { item, owned_indices, total_received } = checked;
  let tx_hash = item.tx.hash;

  // process_unconfirmed: a no-op, not an error, for the common case where this tx wasn't ours.
  unconfirmed.remove(&tx_hash);

  if !owned_indices.is_empty() && total_received > 0 {
    let response = daemon
      .get_o_indexes(&tx_hash)
      .map_err(|e| ScanError::Daemon(DaemonError::Connection(e.to_string())))?;
    response.status.into_result()?;
    if response.o_indexes.len() != item.tx.outputs.len() {
      return Err(ScanError::OutputIndexCountMismatch {
        returned: response.o_indexes.len(),
        expected: item.tx.outputs.len(),
      });
    }

    let derivation = primitives.generate_key_derivation(&item.tx_pub_key, account.view_secret());
    for index in owned_indices {
      let output = &item.tx.outputs[index];
      let derived = primitives.derive_public_key(&derivation, index, account.spend_public());
      if derived != output.target_key {
        return Err(ScanError::OutputKeyMismatch { index });
      }

      let key_image = match account.spend_secret() {
        Some(spend_secret) => {
          let ephemeral_secret = primitives.derive_secret_key(&derivation, index, spend_secret);
          primitives.generate_key_image(&ephemeral_secret)
        }
        None => synthetic_key_image(primitives, &tx_hash, index),
      };

      let owned_output = OwnedOutput {
        id: OutputId { tx_hash, local_index: index },
        global_index: response.o_indexes[index],
        block_height: item.height,
        amount: output.amount,
        public_key: output.target_key,
        tx_public_key: item.tx_pub_key,
        key_image,
        internal_output_index: index,
        spent: false,
        unlock_time: item.tx.unlock_time,
        is_own_change: false,
      };
      outputs
        .insert(owned_output)
        .map_err(|rejected| ScanError::DuplicateKeyImage(rejected.key_image))?;
    }

    debug!(
      tx_hash = %hex::encode(tx_hash.as_bytes()),
      total_received,
      "applier recorded owned output(s)"
    );
    callbacks.on_money_received(tx_hash, total_received);
  }

  let mut spent_total = 0u64;
  for input in &item.tx.inputs {
    if let Some(owned) = outputs.get_by_key_image_mut(&input.key_image) {
      if !owned.spent {
        owned.spent = true;
        spent_total = spent_total.saturating_add(owned.amount);
      }
    }
  }
  if spent_total > 0 {
    debug!(tx_hash = %hex::encode(tx_hash.as_bytes()), spent_total, "applier recognized a spend");
    callbacks.on_money_spent(tx_hash, spent_total);
  }

  // If this tx already has a log entry (it's one of ours, previously recorded at commit time),
  // just reconcile its confirmation height and stop — don't synthesize a second entry for it.
  if transfer_log.set_block_height(&tx_hash, item.height) {
    return Ok(());
  }

  if total_received > spent_total {
    let amount = total_received - spent_total;
    let payment_id = find_payment_id(&item.tx.extra);
    if let Some(payment_id) = payment_id {
      payments.insert(
        payment_id,
        PaymentDetail { tx_hash, amount, block_height: item.height, unlock_time: item.tx.unlock_time },
      );
    }
    transfer_log.push(TransferLogEntry {
      time: item.time,
      direction: Direction::In,
      tx_hash,
      amount,
      fee: 0,
      payment_id,
      has_address: false,
      address: None,
      block_height: item.height,
      unlock_time: item.tx.unlock_time,
    });
  } else if spent_total > total_received {
    // Foreign-observed outgoing spend: the fee can't be recovered since this wallet didn't build
    // the transaction. Recorded as 0 by design, not as a missing value.
    transfer_log.push(TransferLogEntry {
      time: item.time,
      direction: Direction::Out,
      tx_hash,
      amount: spent_total - total_received,
      fee: 0,
      payment_id: None,
      has_address: false,
      address: None,
      block_height: item.height,
      unlock_time: item.tx.unlock_time,
    });
  }

  Ok(())
}

/// The wallet's full mutable state plus the collaborators it needs to scan and send: account
/// keys, blockchain mirror, owned outputs, payments, unconfirmed sends, transfer log, and the
/// primitive/codec/daemon contracts an embedder supplies.
pub struct Wallet {
  account: AccountKeys,
  account_creation_time: u64,
  primitives: Box<dyn CryptoNotePrimitives>,
  codec: Box<dyn BlockCodec>,
  daemon: Box<dyn DaemonClient>,
  blockchain: Blockchain,
  outputs: OutputTable,
  payments: PaymentTable,
  unconfirmed: UnconfirmedTable,
  transfer_log: TransferLog,
  refresh_config: RefreshConfig,
  send_config: SendConfig,
  run: Arc<AtomicBool>,
  detach_generation: u64,
  keys_path: PathBuf,
  wallet_path: PathBuf,
  rng: StdRng,
}

impl Wallet {
  fn genesis_only_mirror(genesis: Hash) -> Blockchain {
    Blockchain::from_ids(genesis, vec![genesis])
      .expect("a single-entry mirror always satisfies its own genesis invariant")
  }

  /// Create a brand-new account: generates fresh spend/view keypairs, seals them to the
  /// keys-file, and writes an empty wallet-file anchored on `genesis`. Fails if either file
  /// already exists at `path`.
  #[allow(clippy::too_many_arguments)]
  pub fn generate(
    path: &std::path::Path,
    password: &[u8],
    genesis: Hash,
    primitives: Box<dyn CryptoNotePrimitives>,
    codec: Box<dyn BlockCodec>,
    daemon: Box<dyn DaemonClient>,
    refresh_config: RefreshConfig,
    send_config: SendConfig,
  ) -> Result<Self, WalletCoreError> {
    let (keys_path, wallet_path) = crate::persistence::resolve_paths(path);
    if keys_path.exists() || wallet_path.exists() {
      return Err(PersistError::AlreadyExists.into());
    }

    let mut rng = StdRng::from_entropy();

    let (spend_secret, _) = primitives.generate_keypair();
    let (view_secret, _) = primitives.generate_keypair();
    let account = AccountKeys::from_secrets(primitives.as_ref(), spend_secret, view_secret);
    let account_creation_time = now_unix();

    let mut iv = [0u8; 8];
    rng.fill_bytes(&mut iv);
    let sealed =
      crate::persistence::seal_keys_file(primitives.as_ref(), &account, account_creation_time, password, iv);
    std::fs::write(&keys_path, sealed).map_err(PersistError::Io)?;

    let blockchain = Self::genesis_only_mirror(genesis);
    let outputs = OutputTable::new();
    let payments = PaymentTable::new();
    let unconfirmed = UnconfirmedTable::new();
    let transfer_log = TransferLog::new();

    let wallet_bytes = crate::persistence::save_wallet_file(
      &account.address(),
      &blockchain,
      &outputs,
      &payments,
      &unconfirmed,
      &transfer_log,
    );
    std::fs::write(&wallet_path, wallet_bytes).map_err(PersistError::Io)?;

    info!(address = ?account.address(), "generated new wallet");

    Ok(Self {
      account,
      account_creation_time,
      primitives,
      codec,
      daemon,
      blockchain,
      outputs,
      payments,
      unconfirmed,
      transfer_log,
      refresh_config,
      send_config,
      run: Arc::new(AtomicBool::new(true)),
      detach_generation: 0,
      keys_path,
      wallet_path,
      rng,
    })
  }

  /// Load an existing account: unseal the keys-file under `password` (a wrong password fails
  /// here as [`PersistError::InvalidPassword`]), then load the wallet-file if one exists at the
  /// derived path, checking its declared address against the keys-file's. With no wallet-file
  /// present yet, start from an empty state anchored on `genesis`, same as a fresh `generate`.
  #[allow(clippy::too_many_arguments)]
  pub fn load(
    path: &std::path::Path,
    password: &[u8],
    genesis: Hash,
    primitives: Box<dyn CryptoNotePrimitives>,
    codec: Box<dyn BlockCodec>,
    daemon: Box<dyn DaemonClient>,
    refresh_config: RefreshConfig,
    send_config: SendConfig,
  ) -> Result<Self, WalletCoreError> {
    let (keys_path, wallet_path) = crate::persistence::resolve_paths(path);
    let keys_bytes = std::fs::read(&keys_path).map_err(PersistError::Io)?;
    let unsealed = crate::persistence::unseal_keys_file(primitives.as_ref(), &keys_bytes, password)?;
    let address = unsealed.account.address();

    let (blockchain, outputs, payments, unconfirmed, transfer_log) = if wallet_path.exists() {
      let data = std::fs::read(&wallet_path).map_err(PersistError::Io)?;
      let contents = crate::persistence::load_wallet_file(&data)?;
      if contents.address != address {
        return Err(PersistError::Mismatched.into());
      }
      let blockchain = match contents.blockchain.ids().first() {
        Some(&first) if first == genesis => contents.blockchain,
        Some(_) => return Err(ScanError::NoSharedBlock.into()),
        None => Self::genesis_only_mirror(genesis),
      };
      (blockchain, contents.outputs, contents.payments, contents.unconfirmed, contents.transfer_log)
    } else {
      (Self::genesis_only_mirror(genesis), OutputTable::new(), PaymentTable::new(), UnconfirmedTable::new(), TransferLog::new())
    };

    info!(address = ?address, height = blockchain.height(), "loaded wallet");

    Ok(Self {
      account: unsealed.account,
      account_creation_time: unsealed.account_creation_time,
      primitives,
      codec,
      daemon,
      blockchain,
      outputs,
      payments,
      unconfirmed,
      transfer_log,
      refresh_config,
      send_config,
      run: Arc::new(AtomicBool::new(true)),
      detach_generation: 0,
      keys_path,
      wallet_path,
      rng: StdRng::from_entropy(),
    })
  }

  /// Serialize and write the wallet-file. The keys-file is never rewritten here (there is no
  /// change-password operation in this core), so `store` is idempotent with respect to it.
  pub fn store(&self) -> Result<(), WalletCoreError> {
    let bytes = crate::persistence::save_wallet_file(
      &self.account.address(),
      &self.blockchain,
      &self.outputs,
      &self.payments,
      &self.unconfirmed,
      &self.transfer_log,
    );
    std::fs::write(&self.wallet_path, bytes).map_err(PersistError::Io)?;
    Ok(())
  }

  /// Total balance: unspent owned outputs plus the change portion of any unconfirmed sends.
  pub fn balance(&self) -> u64 {
    self.outputs.total_balance() + self.unconfirmed.total_change()
  }

  /// Balance available to spend right now, given the current wall-clock time.
  pub fn unlocked_balance(&self, now: u64) -> u64 {
    self.outputs.unlocked_balance(
      self.blockchain.height(),
      now,
      self.send_config.allowed_block_delta,
      self.send_config.allowed_seconds_delta,
      self.send_config.spendable_age,
    )
  }

  /// The local mirror's current height.
  pub fn get_height(&self) -> u64 {
    self.blockchain.height()
  }

  /// This account's public address.
  pub fn get_address(&self) -> Address {
    self.account.address()
  }

  /// Signal the refresh loop to stop at the top of its next iteration. Does not interrupt an
  /// in-flight RPC.
  pub fn stop(&self) {
    self.run.store(false, Ordering::Relaxed);
  }

  /// A clone of the cancellation flag `stop()` sets, for a caller running `refresh` on a
  /// background thread to poll independently.
  pub fn run_handle(&self) -> Arc<AtomicBool> {
    self.run.clone()
  }

  /// Wipe all scanned state back to a genesis-only mirror, as if this wallet had never refreshed.
  /// Invalidates any outstanding [`PendingTransfer`].
  pub fn reset(&mut self) {
    self.blockchain = Self::genesis_only_mirror(self.blockchain.genesis());
    self.outputs = OutputTable::new();
    self.payments = PaymentTable::new();
    self.unconfirmed = UnconfirmedTable::new();
    self.transfer_log = TransferLog::new();
    self.detach_generation = self.detach_generation.wrapping_add(1);
  }

  /// Roll the mirror back to `[0, from_height)` and purge every owned output, payment, and
  /// incoming transfer-log entry the mirror no longer agrees with. Bumps the detach generation,
  /// invalidating any [`PendingTransfer`] selected before this call. Returns the number of blocks
  /// removed.
  pub fn detach_blockchain(&mut self, from_height: u64) -> u64 {
    let detached = self.blockchain.truncate(from_height);
    if detached > 0 {
      self.purge_from(from_height);
      self.detach_generation = self.detach_generation.wrapping_add(1);
      warn!(from_height, detached, "detached blockchain mirror, purging stale state");
    }
    detached
  }

  fn purge_from(&mut self, from_height: u64) {
    let stale: Vec<OutputId> =
      self.outputs.iter().filter(|o| o.block_height >= from_height).map(|o| o.id).collect();
    for id in stale {
      self.outputs.remove(&id);
    }
    self.payments.detach(from_height);
    self.transfer_log.detach(from_height);
  }

  /// Run `refresh_once` to exhaustion: repeat until a round adds zero new blocks, or `stop()` was
  /// called. On a round's failure, roll back to the height this round started at and retry up to
  /// `refresh_config.max_retries` times before surfacing the error.
  pub fn refresh(&mut self, callbacks: &mut dyn RefreshCallbacks) -> Result<(), WalletCoreError> {
    let mut retries = 0u32;
    loop {
      if !self.run.load(Ordering::Relaxed) {
        return Ok(());
      }
      let last_good_height = self.blockchain.height();
      match self.refresh_once(callbacks) {
        Ok(0) => return Ok(()),
        Ok(_) => retries = 0,
        Err(e) => {
          warn!(error = %e, last_good_height, "refresh round failed, rolling back");
          self.detach_blockchain(last_good_height);
          retries += 1;
          if retries >= self.refresh_config.max_retries {
            return Err(e);
          }
        }
      }
    }
  }

  /// One `QueryBlocks` round: fetch, reconcile the mirror (detecting and purging a reorg), then
  /// scan every newly-fetched full block for owned outputs and spends. Returns the number of new
  /// block ids the mirror gained this round (0 means the daemon had nothing further to offer).
  fn refresh_once(&mut self, callbacks: &mut dyn RefreshCallbacks) -> Result<u64, WalletCoreError> {
    let history = self.blockchain.short_chain_history();
    let cutoff = self.account_creation_time.saturating_sub(ACCOUNT_CREATION_SLACK_SECS);

    let response = self
      .daemon
      .query_blocks(&history, cutoff)
      .map_err(|e| DaemonError::Connection(e.to_string()))?;
    response.status.into_result()?;

    let start_height = response.start_height;
    let items = response.items;
    if items.is_empty() {
      return Ok(0);
    }

    let (new_block_ids, _detached, reorg_from, appended) =
      self.blockchain.update(start_height, &items)?;

    if let Some(from) = reorg_from {
      self.purge_from(from);
      self.detach_generation = self.detach_generation.wrapping_add(1);
    }

    for (offset, item) in items.iter().enumerate() {
      callbacks.on_new_block(start_height + offset as u64, item.block_id);
    }

    if new_block_ids.is_empty() {
      return Ok(appended);
    }
    let new_block_ids_set: HashSet<Hash> = new_block_ids.into_iter().collect();
    let worker_count = self.refresh_config.resolved_worker_count();

    let (skip_tx, skip_rx) = crossbeam_channel::unbounded::<Hash>();
    let on_skip = move |hash: Hash| {
      let _ = skip_tx.send(hash);
    };

    let Wallet {
      ref account,
      ref primitives,
      ref codec,
      ref daemon,
      ref mut outputs,
      ref mut payments,
      ref mut unconfirmed,
      ref mut transfer_log,
      ..
    } = *self;

    let apply = |checked: CheckedTxItem| -> Result<(), ScanError> {
      apply_tx(
        primitives.as_ref(),
        daemon.as_ref(),
        outputs,
        payments,
        unconfirmed,
        transfer_log,
        callbacks,
        account,
        checked,
      )
    };

    scan::process_transactions(
      &items,
      start_height,
      &new_block_ids_set,
      codec.as_ref(),
      account,
      primitives.as_ref(),
      cutoff,
      worker_count,
      on_skip,
      apply,
    )?;

    for hash in skip_rx.try_iter() {
      callbacks.on_skip_transaction(hash);
    }

    Ok(appended)
  }

  /// Build transactions covering `dsts`, automatically splitting into multiple shards if a single
  /// transaction would exceed the size limit. Does not broadcast; see `commit_tx`/`commit_split`.
  pub fn transfer_split(
    &mut self,
    dsts: &[Destination],
    unlock_time: u64,
    fee: u64,
    extra: &[u8],
  ) -> Result<Vec<PendingTransfer>, WalletCoreError> {
    self.build_transactions(dsts, unlock_time, fee, extra).map_err(Into::into)
  }

  /// Like `transfer_split`, but rejects destinations that would require more than one
  /// transaction — the single-tx convenience method the JSON-RPC `transfer` call maps to.
  pub fn transfer(
    &mut self,
    dsts: &[Destination],
    unlock_time: u64,
    fee: u64,
    extra: &[u8],
  ) -> Result<PendingTransfer, WalletCoreError> {
    let mut pending = self.build_transactions(dsts, unlock_time, fee, extra)?;
    if pending.len() != 1 {
      return Err(
        SendError::Rejected(format!(
          "destinations require {} transactions; use transfer_split",
          pending.len()
        ))
        .into(),
      );
    }
    Ok(pending.pop().expect("checked len == 1"))
  }

  fn build_transactions(
    &mut self,
    dsts: &[Destination],
    unlock_time: u64,
    fee: u64,
    extra: &[u8],
  ) -> Result<Vec<PendingTransfer>, SendError> {
    let chain_height = self.blockchain.height();
    let now = now_unix();
    let generation = self.detach_generation;
    let built = send::create_transactions(
      &self.account,
      &mut self.outputs,
      chain_height,
      now,
      self.primitives.as_ref(),
      self.codec.as_ref(),
      self.daemon.as_ref(),
      dsts,
      unlock_time,
      fee,
      extra,
      &self.send_config,
      &mut self.rng,
    )?;
    Ok(built.into_iter().map(|pending| PendingTransfer { pending, generation }).collect())
  }

  /// Broadcast one built transaction: flips its selected outputs to `spent`, records an
  /// unconfirmed-send entry, and appends an outgoing transfer-log entry. Refuses a transaction
  /// selected before a reorg invalidated it.
  pub fn commit_tx(&mut self, pending: PendingTransfer) -> Result<Hash, WalletCoreError> {
    if pending.generation != self.detach_generation {
      return Err(SendError::SelectionInvalidatedByDetach.into());
    }

    let now = now_unix();
    let tx_hash = self.codec.hash_transaction(&pending.pending.tx);
    let change_amount = pending.pending.change_destination.map(|d| d.amount).unwrap_or(0);
    let total_outputs: u64 = pending.pending.tx.outputs.iter().map(|o| o.amount).sum();
    let amount_sent = total_outputs.saturating_sub(change_amount);
    let fee = pending.pending.fee;
    let tx_unlock_time = pending.pending.tx.unlock_time;

    let unconfirmed = send::commit(self.daemon.as_ref(), self.codec.as_ref(), &mut self.outputs, &pending.pending, now)?;
    info!(tx_hash = %hex::encode(tx_hash.as_bytes()), amount_sent, fee, "committed transfer");

    self.unconfirmed.insert(tx_hash, unconfirmed);
    self.transfer_log.push(TransferLogEntry {
      time: now,
      direction: Direction::Out,
      tx_hash,
      amount: amount_sent,
      fee,
      payment_id: None,
      has_address: false,
      address: None,
      block_height: 0,
      unlock_time: tx_unlock_time,
    });

    Ok(tx_hash)
  }

  /// Commit every pending transfer in order. A mid-vector rejection leaves already-committed
  /// shards committed (matching [`send::commit`]'s no-rollback behavior): the returned vector
  /// holds whichever hashes succeeded, and `Some(error)` carries the failure that stopped it.
  pub fn commit_split(
    &mut self,
    pendings: Vec<PendingTransfer>,
  ) -> (Vec<Hash>, Option<WalletCoreError>) {
    let mut hashes = Vec::with_capacity(pendings.len());
    for pending in pendings {
      match self.commit_tx(pending) {
        Ok(hash) => hashes.push(hash),
        Err(e) => return (hashes, Some(e)),
      }
    }
    (hashes, None)
  }

  /// Every recorded occurrence of `payment_id`.
  pub fn get_payments(&self, payment_id: &PaymentId) -> &[PaymentDetail] {
    self.payments.get(payment_id)
  }

  /// Every recorded payment occurrence past `min_block_height` (strict: equal to the bound is
  /// excluded), optionally restricted to `payment_ids`.
  pub fn get_bulk_payments(
    &self,
    payment_ids: Option<&[PaymentId]>,
    min_block_height: u64,
  ) -> Vec<(PaymentId, PaymentDetail)> {
    self.payments.bulk(payment_ids, min_block_height)
  }

  /// The full user-visible transfer history, in recorded order.
  pub fn get_transfers(&self) -> impl Iterator<Item = &TransferLogEntry> {
    self.transfer_log.iter()
  }

  /// Alias for `balance()`, matching the JSON-RPC surface's naming.
  pub fn getbalance(&self) -> u64 {
    self.balance()
  }

  /// Alias for `get_address()`, matching the JSON-RPC surface's naming.
  pub fn getaddress(&self) -> Address {
    self.get_address()
  }

  /// The generation counter bumped on every detach/reset; a [`PendingTransfer`] built at a
  /// different generation is stale.
  pub fn detach_generation(&self) -> u64 {
    self.detach_generation
  }

  /// Seed the internal RNG deterministically. Test-only: production callers get a fresh
  /// `from_entropy()` seed from `generate`/`load`.
  #[cfg(test)]
  pub(crate) fn seed_rng(&mut self, seed: u64) {
    self.rng = StdRng::seed_from_u64(seed);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crypto::{Chacha8Iv, Chacha8Key, KeyDerivation, PublicKey, RingSignature, SecretKey};
  use crate::error::BoxError;
  use crate::rpc::{
    GetOIndexesResponse, GetRandomOutsResponse, QueryBlocksResponse, SendRawTransactionResponse, Status,
  };
  use crate::scan::NoopCallbacks;
  use crate::tx::{ConstructedTransaction, ParsedBlock, ParsedTransaction};

  struct FakePrimitives;
  impl CryptoNotePrimitives for FakePrimitives {
    fn keccak256(&self, data: &[u8]) -> Hash {
      let mut out = [0u8; 32];
      for (i, b) in data.iter().enumerate() {
        out[i % 32] ^= *b;
      }
      Hash::from_bytes(out)
    }
    fn secret_to_public(&self, secret: &SecretKey) -> PublicKey {
      PublicKey::from_bytes(*secret.as_bytes())
    }
    fn generate_keypair(&self) -> (SecretKey, PublicKey) {
      let secret = SecretKey::from_bytes([0; 32]);
      let public = self.secret_to_public(&secret);
      (secret, public)
    }
    fn generate_key_derivation(&self, _tx_public_key: &PublicKey, _view_secret: &SecretKey) -> KeyDerivation {
      KeyDerivation::from_bytes([0; 32])
    }
    fn derive_public_key(&self, _derivation: &KeyDerivation, _output_index: usize, base: &PublicKey) -> PublicKey {
      *base
    }
    fn derive_secret_key(&self, _derivation: &KeyDerivation, _output_index: usize, base: &SecretKey) -> SecretKey {
      base.clone()
    }
    fn generate_key_image(&self, ephemeral_secret: &SecretKey) -> KeyImage {
      KeyImage::from_bytes(*ephemeral_secret.as_bytes())
    }
    fn derive_chacha8_key(&self, _password: &[u8]) -> Chacha8Key {
      Chacha8Key::from_bytes([0; 32])
    }
    fn chacha8_xor(&self, _key: &Chacha8Key, _iv: &Chacha8Iv, _data: &mut [u8]) {}
    fn generate_ring_signature(
      &self,
      _prefix_hash: &Hash,
      _key_image: &KeyImage,
      _ring: &[PublicKey],
      _secret: &SecretKey,
      _secret_index: usize,
    ) -> RingSignature {
      RingSignature(vec![])
    }
  }

  struct NullDaemon;
  impl DaemonClient for NullDaemon {
    fn query_blocks(&self, _block_ids: &[Hash], _timestamp: u64) -> Result<QueryBlocksResponse, BoxError> {
      Ok(QueryBlocksResponse { status: Status::Ok, start_height: 0, current_height: 0, items: vec![] })
    }
    fn get_o_indexes(&self, _tx_hash: &Hash) -> Result<GetOIndexesResponse, BoxError> {
      Ok(GetOIndexesResponse { status: Status::Ok, o_indexes: vec![] })
    }
    fn get_random_outs(&self, _amounts: &[u64], _outs_count: usize) -> Result<GetRandomOutsResponse, BoxError> {
      Ok(GetRandomOutsResponse { status: Status::Ok, outs: vec![] })
    }
    fn send_raw_transaction(&self, _tx_as_hex: &str) -> Result<SendRawTransactionResponse, BoxError> {
      Ok(SendRawTransactionResponse { status: Status::Ok })
    }
  }

  struct NullCodec;
  impl BlockCodec for NullCodec {
    fn parse_block(&self, _block_blob: &[u8], _tx_blobs: &[Vec<u8>]) -> Result<ParsedBlock, BoxError> {
      unimplemented!()
    }
    fn parse_transaction(&self, _tx_blob: &[u8]) -> Result<ParsedTransaction, BoxError> {
      unimplemented!()
    }
    fn transaction_blob_size(&self, _tx: &ConstructedTransaction) -> usize {
      0
    }
    fn serialize_transaction(&self, _tx: &ConstructedTransaction) -> String {
      String::new()
    }
    fn hash_transaction(&self, _tx: &ConstructedTransaction) -> Hash {
      Hash::from_bytes([0; 32])
    }
  }

  fn new_wallet(dir: &std::path::Path, name: &str) -> (Wallet, Hash) {
    let genesis = Hash::from_bytes([7; 32]);
    let path = dir.join(name);
    let wallet = Wallet::generate(
      &path,
      b"hunter2",
      genesis,
      Box::new(FakePrimitives),
      Box::new(NullCodec),
      Box::new(NullDaemon),
      RefreshConfig::default(),
      SendConfig::default(),
    )
    .unwrap();
    (wallet, genesis)
  }

  #[test]
  fn generate_then_load_round_trips() {
    let dir = tempdir();
    let (wallet, genesis) = new_wallet(dir.path(), "w1");
    let address = wallet.get_address();
    assert_eq!(wallet.get_height(), 1);
    drop(wallet);

    let loaded = Wallet::load(
      &dir.path().join("w1"),
      b"hunter2",
      genesis,
      Box::new(FakePrimitives),
      Box::new(NullCodec),
      Box::new(NullDaemon),
      RefreshConfig::default(),
      SendConfig::default(),
    )
    .unwrap();
    assert_eq!(loaded.get_address(), address);
    assert_eq!(loaded.get_height(), 1);
    assert_eq!(loaded.balance(), 0);
  }

  #[test]
  fn generate_refuses_to_overwrite() {
    let dir = tempdir();
    let _ = new_wallet(dir.path(), "w2");
    let genesis = Hash::from_bytes([7; 32]);
    let err = Wallet::generate(
      &dir.path().join("w2"),
      b"hunter2",
      genesis,
      Box::new(FakePrimitives),
      Box::new(NullCodec),
      Box::new(NullDaemon),
      RefreshConfig::default(),
      SendConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, WalletCoreError::Persist(PersistError::AlreadyExists)));
  }

  #[test]
  fn load_with_wrong_password_fails_authentication() {
    let dir = tempdir();
    let (_wallet, genesis) = new_wallet(dir.path(), "w3");
    let err = Wallet::load(
      &dir.path().join("w3"),
      b"wrong password",
      genesis,
      Box::new(FakePrimitives),
      Box::new(NullCodec),
      Box::new(NullDaemon),
      RefreshConfig::default(),
      SendConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, WalletCoreError::Persist(PersistError::InvalidPassword)));
  }

  #[test]
  fn detach_blockchain_purges_stale_state() {
    let dir = tempdir();
    let (mut wallet, _genesis) = new_wallet(dir.path(), "w4");

    let tx_hash = Hash::from_bytes([9; 32]);
    wallet
      .outputs
      .insert(OwnedOutput {
        id: OutputId { tx_hash, local_index: 0 },
        global_index: 0,
        block_height: 5,
        amount: 100,
        public_key: PublicKey::from_bytes([1; 32]),
        tx_public_key: PublicKey::from_bytes([2; 32]),
        key_image: KeyImage::from_bytes([3; 32]),
        internal_output_index: 0,
        spent: false,
        unlock_time: 0,
        is_own_change: false,
      })
      .unwrap();
    wallet.payments.insert(
      PaymentId::Unencrypted([1; 32]),
      PaymentDetail { tx_hash, amount: 100, block_height: 5, unlock_time: 0 },
    );
    wallet.transfer_log.push(TransferLogEntry {
      time: 0,
      direction: Direction::In,
      tx_hash,
      amount: 100,
      fee: 0,
      payment_id: None,
      has_address: false,
      address: None,
      block_height: 5,
      unlock_time: 0,
    });
    wallet.blockchain = Blockchain::from_ids(
      wallet.blockchain.genesis(),
      (0 .. 10).map(|i| Hash::from_bytes([i; 32])).collect(),
    )
    .unwrap();

    let generation_before = wallet.detach_generation();
    wallet.detach_blockchain(5);

    assert_eq!(wallet.blockchain.height(), 5);
    assert!(wallet.outputs.is_empty());
    assert!(wallet.payments.get(&PaymentId::Unencrypted([1; 32])).is_empty());
    assert!(wallet.transfer_log.find_by_tx_hash(&tx_hash).is_none());
    assert_ne!(wallet.detach_generation(), generation_before);
  }

  #[test]
  fn stale_pending_transfer_is_rejected_by_commit() {
    let dir = tempdir();
    let (mut wallet, _genesis) = new_wallet(dir.path(), "w5");
    wallet.seed_rng(42);

    let pending = PendingTransfer {
      pending: PendingTx {
        tx: ConstructedTransaction { unlock_time: 0, inputs: vec![], outputs: vec![], extra: vec![] },
        fee: 0,
        dust: 0,
        change_destination: None,
        selected_outputs: vec![],
        key_image_debug_string: String::new(),
      },
      generation: wallet.detach_generation(),
    };

    wallet.reset();
    let err = wallet.commit_tx(pending).unwrap_err();
    assert!(matches!(err, WalletCoreError::Send(SendError::SelectionInvalidatedByDetach)));
  }

  #[test]
  fn commit_tx_flips_spent_and_records_transfer_log() {
    let dir = tempdir();
    let (mut wallet, _genesis) = new_wallet(dir.path(), "w6");

    let id = OutputId { tx_hash: Hash::from_bytes([5; 32]), local_index: 0 };
    wallet
      .outputs
      .insert(OwnedOutput {
        id,
        global_index: 0,
        block_height: 1,
        amount: 500,
        public_key: PublicKey::from_bytes([1; 32]),
        tx_public_key: PublicKey::from_bytes([2; 32]),
        key_image: KeyImage::from_bytes([4; 32]),
        internal_output_index: 0,
        spent: false,
        unlock_time: 0,
        is_own_change: false,
      })
      .unwrap();

    let change_address = wallet.get_address();
    let pending = PendingTransfer {
      pending: PendingTx {
        tx: ConstructedTransaction {
          unlock_time: 0,
          inputs: vec![],
          outputs: vec![
            crate::tx::Output { amount: 400, target_key: PublicKey::from_bytes([9; 32]) },
            crate::tx::Output { amount: 90, target_key: change_address.spend_public },
          ],
          extra: vec![],
        },
        fee: 10,
        dust: 0,
        change_destination: Some(Destination { address: change_address, amount: 90 }),
        selected_outputs: vec![id],
        key_image_debug_string: hex::encode(wallet.outputs.get(&id).unwrap().key_image.as_bytes()),
      },
      generation: wallet.detach_generation(),
    };

    let balance_before = wallet.balance();
    let tx_hash = wallet.commit_tx(pending).unwrap();

    assert!(wallet.outputs.get(&id).unwrap().spent);
    assert_eq!(wallet.balance(), balance_before - 500 + 90);
    let entry = wallet.transfer_log.find_by_tx_hash(&tx_hash).unwrap();
    assert_eq!(entry.amount, 400);
    assert_eq!(entry.fee, 10);
    assert_eq!(entry.direction, Direction::Out);
  }

  #[test]
  fn apply_tx_records_incoming_payment_and_spend() {
    let dir = tempdir();
    let (mut wallet, _genesis) = new_wallet(dir.path(), "w7");
    let mut callbacks = NoopCallbacks;

    let spend_public = *wallet.account.spend_public();
    let receiving_tx_hash = Hash::from_bytes([1; 32]);
    let received_tx = ParsedTransaction {
      hash: receiving_tx_hash,
      unlock_time: 0,
      inputs: vec![],
      outputs: vec![crate::tx::Output { amount: 700, target_key: spend_public }],
      extra: vec![crate::extra::ExtraField::Nonce({
        let mut nonce = vec![0u8];
        nonce.extend_from_slice(&[3u8; 32]);
        nonce
      })],
    };
    let checked = CheckedTxItem {
      item: scan::TxItem {
        tx: received_tx,
        time: 1000,
        height: 10,
        block_id: Hash::from_bytes([2; 32]),
        tx_pub_key: PublicKey::from_bytes([5; 32]),
        emission_index: 0,
      },
      owned_indices: vec![0],
      total_received: 700,
    };

    let Wallet { ref account, ref primitives, ref daemon, ref mut outputs, ref mut payments, ref mut unconfirmed, ref mut transfer_log, .. } =
      wallet;
    apply_tx(
      primitives.as_ref(),
      daemon.as_ref(),
      outputs,
      payments,
      unconfirmed,
      transfer_log,
      &mut callbacks,
      account,
      checked,
    )
    .unwrap();

    assert_eq!(wallet.balance(), 700);
    let payment_id = PaymentId::Unencrypted([3; 32]);
    assert_eq!(wallet.get_payments(&payment_id).len(), 1);
    assert_eq!(wallet.get_bulk_payments(None, 9).len(), 1);
    assert_eq!(wallet.get_bulk_payments(None, 10).len(), 0);
  }

  fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temp dir for wallet persistence tests")
  }
}
