//! Transaction construction: output selection, decoy fetching, ring-signed assembly, the
//! automatic split-retry loop, and the two-phase prepare/commit lifecycle.

pub mod decoys;

use rand::Rng;

use crate::account::AccountKeys;
use crate::config::{DustPolicy, SendConfig};
use crate::crypto::CryptoNotePrimitives;
use crate::digits::{digit_split_strategy, null_split_strategy, Destination};
use crate::error::SendError;
use crate::extra::serialize_tx_public_key;
use crate::output::{OutputId, OutputTable};
use crate::rpc::DaemonClient;
use crate::tx::{BlockCodec, ConstructedTransaction, Output, SignedInput};

/// The in-flight product of `transfer`: a fully-signed transaction paired with the bookkeeping
/// `commit_tx` needs to flip the spent bits and record the unconfirmed entry.
pub struct PendingTx {
  /// The constructed, ring-signed transaction, ready to serialize and broadcast.
  pub tx: ConstructedTransaction,
  /// The transaction fee.
  pub fee: u64,
  /// The dust residue folded into the fee or paid to the dust policy's address.
  pub dust: u64,
  /// The change destination, if any change was due.
  pub change_destination: Option<Destination>,
  /// The owned outputs this transaction spends, tentatively marked `spent` the moment this is
  /// built so a subsequent `transfer` call in the same `create_transactions` attempt doesn't
  /// reuse them. Actually flipped to final on [`commit`].
  pub selected_outputs: Vec<OutputId>,
  /// A human-readable list of the key images this transaction nullifies, for logging/debugging.
  pub key_image_debug_string: String,
}

/// Uniformly draw and remove one id from `pool` (swap-with-last, matching the reference
/// selection's lack of any ordering preference among candidates).
pub fn pop_random_value(pool: &mut Vec<OutputId>, rng: &mut impl Rng) -> OutputId {
  let index = rng.gen_range(0 .. pool.len());
  pool.swap_remove(index)
}

/// Select owned outputs covering `needed`, preferring non-dust outputs and falling back to dust
/// once non-dust is exhausted. If `add_dust` is set (the `mixin == 0` case, where ring ambiguity
/// doesn't apply and clearing dust is worthwhile), one dust output is drawn first regardless of
/// whether it's needed to meet `needed`.
#[allow(clippy::too_many_arguments)]
pub fn select_transfers(
  outputs: &OutputTable,
  chain_height: u64,
  now: u64,
  config: &SendConfig,
  dust_threshold: u64,
  needed: u64,
  add_dust: bool,
  rng: &mut impl Rng,
) -> Result<Vec<OutputId>, SendError> {
  let mut unused = Vec::new();
  let mut unused_dust = Vec::new();
  for output in outputs.iter() {
    if !output.is_unlocked(
      chain_height,
      now,
      config.allowed_block_delta,
      config.allowed_seconds_delta,
      config.spendable_age,
    ) {
      continue;
    }
    if output.is_dust(dust_threshold) {
      unused_dust.push(output.id);
    } else {
      unused.push(output.id);
    }
  }

  let mut selected = Vec::new();
  let mut found = 0u64;

  if add_dust && !unused_dust.is_empty() {
    let id = pop_random_value(&mut unused_dust, rng);
    found += outputs.get(&id).expect("selected id came from this table").amount;
    selected.push(id);
  }

  while found < needed {
    let id = if !unused.is_empty() {
      pop_random_value(&mut unused, rng)
    } else if !unused_dust.is_empty() {
      pop_random_value(&mut unused_dust, rng)
    } else {
      return Err(SendError::InsufficientFunds { needed, found });
    };
    found += outputs.get(&id).expect("selected id came from this table").amount;
    selected.push(id);
  }

  Ok(selected)
}

/// Build a single transaction paying `dsts`, covering `fee` and selecting decoys for a ring of
/// `mixin + 1`. Does not broadcast or mark outputs spent; see [`commit`].
#[allow(clippy::too_many_arguments)]
pub fn transfer(
  account: &AccountKeys,
  outputs: &OutputTable,
  chain_height: u64,
  now: u64,
  primitives: &dyn CryptoNotePrimitives,
  codec: &dyn BlockCodec,
  daemon: &dyn DaemonClient,
  dsts: &[Destination],
  unlock_time: u64,
  fee: u64,
  extra: &[u8],
  config: &SendConfig,
  rng: &mut impl Rng,
) -> Result<PendingTx, SendError> {
  if dsts.is_empty() {
    return Err(SendError::EmptyDestinations);
  }
  if account.is_watch_only() {
    return Err(SendError::WatchOnlyAccount);
  }
  let destinations_total =
    dsts.iter().try_fold(0u64, |acc, d| acc.checked_add(d.amount)).ok_or(SendError::AmountOverflow)?;
  let needed = destinations_total.checked_add(fee).ok_or(SendError::AmountOverflow)?;

  let add_dust = config.mixin == 0;
  let selected_ids =
    select_transfers(outputs, chain_height, now, config, config.dust_threshold, needed, add_dust, rng)?;
  let selected: Vec<_> =
    selected_ids.iter().map(|id| outputs.get(id).expect("just selected").clone()).collect();
  let found: u64 = selected.iter().map(|o| o.amount).sum();

  let rings = decoys::fetch_decoys(daemon, &selected, config.mixin)?;

  let change_amount = found - needed;
  let change_destination =
    (change_amount > 0).then(|| Destination { address: account.address(), amount: change_amount });

  let (final_dsts, dust) = if config.mixin == 0 {
    null_split_strategy(dsts, change_destination)
  } else {
    digit_split_strategy(primitives, dsts, change_destination, config.dust_threshold)
  };

  let mut final_dsts = final_dsts;
  if dust > 0 {
    if let DustPolicy::PayTo(address) = &config.dust_policy {
      final_dsts.push(Destination { address: *address, amount: dust });
    }
  }

  let (tx_secret, tx_public) = primitives.generate_keypair();

  let mut signed_inputs = Vec::with_capacity(rings.len());
  let mut key_image_debug_string = String::new();
  for ring in &rings {
    let owned = &ring.owned;
    let derivation = primitives.generate_key_derivation(&owned.tx_public_key, account.view_secret());
    let spend_secret = account.spend_secret().ok_or(SendError::WatchOnlyAccount)?;
    let ephemeral_secret =
      primitives.derive_secret_key(&derivation, owned.internal_output_index, spend_secret);

    let ring_keys: Vec<_> = ring.members.iter().map(|(_, key)| *key).collect();
    let prefix_hash = primitives.keccak256(owned.public_key.as_bytes());
    let signature = primitives.generate_ring_signature(
      &prefix_hash,
      &owned.key_image,
      &ring_keys,
      &ephemeral_secret,
      ring.real_index,
    );

    if !key_image_debug_string.is_empty() {
      key_image_debug_string.push(' ');
    }
    key_image_debug_string.push_str(&hex::encode(owned.key_image.as_bytes()));

    signed_inputs.push(SignedInput {
      amount: owned.amount,
      key_offsets: ring.members.iter().map(|(index, _)| *index).collect(),
      key_image: owned.key_image,
      signature,
    });
  }

  let tx_outputs: Vec<Output> = final_dsts
    .iter()
    .enumerate()
    .map(|(index, dst)| {
      let derivation = primitives.generate_key_derivation(&dst.address.view_public, &tx_secret);
      let target_key = primitives.derive_public_key(&derivation, index, &dst.address.spend_public);
      Output { amount: dst.amount, target_key }
    })
    .collect();

  let mut extra_bytes = serialize_tx_public_key(&tx_public);
  extra_bytes.extend_from_slice(extra);

  let tx = ConstructedTransaction {
    unlock_time,
    inputs: signed_inputs,
    outputs: tx_outputs,
    extra: extra_bytes,
  };

  if codec.transaction_blob_size(&tx) as u64 > config.max_tx_size() {
    return Err(SendError::TxTooBig);
  }

  Ok(PendingTx {
    tx,
    fee,
    dust,
    change_destination,
    selected_outputs: selected_ids,
    key_image_debug_string,
  })
}

/// Drive the automatic split-retry loop: try `k = 1, 2, ..`, splitting each destination's amount
/// into `k` roughly-even shards, until every shard's transaction fits the size limit or
/// `config.max_split_attempts` is exhausted.
#[allow(clippy::too_many_arguments)]
pub fn create_transactions(
  account: &AccountKeys,
  outputs: &mut OutputTable,
  chain_height: u64,
  now: u64,
  primitives: &dyn CryptoNotePrimitives,
  codec: &dyn BlockCodec,
  daemon: &dyn DaemonClient,
  dsts: &[Destination],
  unlock_time: u64,
  fee: u64,
  extra: &[u8],
  config: &SendConfig,
  rng: &mut impl Rng,
) -> Result<Vec<PendingTx>, SendError> {
  for k in 1 ..= config.max_split_attempts {
    let shards = split_into_shards(dsts, k);
    let mut built = Vec::with_capacity(k as usize);
    let mut tentatively_spent = Vec::new();
    let mut too_big = false;
    let mut failure = None;

    for shard in &shards {
      match transfer(
        account, outputs, chain_height, now, primitives, codec, daemon, shard, unlock_time, fee,
        extra, config, rng,
      ) {
        Ok(pending) => {
          for id in &pending.selected_outputs {
            let key_image = outputs.get(id).expect("selected id is in this table").key_image;
            if let Some(output) = outputs.get_by_key_image_mut(&key_image) {
              output.spent = true;
            }
            tentatively_spent.push(*id);
          }
          built.push(pending);
        }
        Err(SendError::TxTooBig) => {
          too_big = true;
          break;
        }
        Err(e) => {
          failure = Some(e);
          break;
        }
      }
    }

    for id in &tentatively_spent {
      let key_image = outputs.get(id).expect("tentative id is in this table").key_image;
      if let Some(output) = outputs.get_by_key_image_mut(&key_image) {
        output.spent = false;
      }
    }

    if let Some(e) = failure {
      return Err(e);
    }
    if !too_big {
      return Ok(built);
    }
  }

  Err(SendError::TooManySplits { attempts: config.max_split_attempts })
}

/// Split each destination's amount into `k` shards via floor division, with the last shard
/// absorbing the remainder.
fn split_into_shards(dsts: &[Destination], k: u32) -> Vec<Vec<Destination>> {
  let k = k as u64;
  let mut shards = vec![Vec::with_capacity(dsts.len()); k as usize];
  for dst in dsts {
    let base = dst.amount / k;
    let remainder = dst.amount % k;
    for (i, shard) in shards.iter_mut().enumerate() {
      let amount = if i as u64 == k - 1 { base + remainder } else { base };
      if amount > 0 {
        shard.push(Destination { address: dst.address, amount });
      }
    }
  }
  shards
}

/// Broadcast a built transaction and, on success, flip its selected outputs' `spent` bit and
/// record an unconfirmed-transfer entry.
pub fn commit(
  daemon: &dyn DaemonClient,
  codec: &dyn BlockCodec,
  outputs: &mut OutputTable,
  pending: &PendingTx,
  now: u64,
) -> Result<crate::unconfirmed::UnconfirmedTransfer, SendError> {
  let hex = codec.serialize_transaction(&pending.tx);
  let response = daemon
    .send_raw_transaction(&hex)
    .map_err(|e| SendError::Daemon(crate::error::DaemonError::Connection(e.to_string())))?;
  match response.status {
    crate::rpc::Status::Ok => {}
    crate::rpc::Status::Busy => return Err(SendError::Daemon(crate::error::DaemonError::Busy)),
    crate::rpc::Status::Error(message) => return Err(SendError::Rejected(message)),
  }

  for id in &pending.selected_outputs {
    if let Some(output) = outputs.get(id) {
      let key_image = output.key_image;
      if let Some(output) = outputs.get_by_key_image_mut(&key_image) {
        output.spent = true;
      }
    }
  }

  Ok(crate::unconfirmed::UnconfirmedTransfer {
    tx: pending.tx.clone(),
    change_amount: pending.change_destination.map(|d| d.amount).unwrap_or(0),
    sent_time: now,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crypto::Hash;
  use crate::output::{KeyImage, OwnedOutput};

  #[test]
  fn split_into_shards_preserves_total_with_remainder_on_last() {
    let address = crate::account::Address {
      spend_public: crate::crypto::PublicKey::from_bytes([1; 32]),
      view_public: crate::crypto::PublicKey::from_bytes([2; 32]),
    };
    let dsts = vec![Destination { address, amount: 500 }];
    let shards = split_into_shards(&dsts, 3);
    assert_eq!(shards.len(), 3);
    let total: u64 = shards.iter().flatten().map(|d| d.amount).sum();
    assert_eq!(total, 500);
    assert_eq!(shards[2][0].amount, 500 / 3 + 500 % 3);
  }

  fn sample_output(id: u8, amount: u64, unlock_time: u64) -> OwnedOutput {
    OwnedOutput {
      id: OutputId { tx_hash: Hash::from_bytes([id; 32]), local_index: 0 },
      global_index: id as u64,
      block_height: 1,
      amount,
      public_key: crate::crypto::PublicKey::from_bytes([id; 32]),
      tx_public_key: crate::crypto::PublicKey::from_bytes([id; 32]),
      key_image: KeyImage::from_bytes([id; 32]),
      internal_output_index: 0,
      spent: false,
      unlock_time,
      is_own_change: false,
    }
  }

  fn test_config() -> SendConfig {
    SendConfig { spendable_age: 0, ..SendConfig::default() }
  }

  #[test]
  fn select_transfers_meets_needed_amount() {
    let mut table = OutputTable::new();
    table.insert(sample_output(1, 100, 0)).unwrap();
    table.insert(sample_output(2, 200, 0)).unwrap();
    table.insert(sample_output(3, 300, 0)).unwrap();
    let mut rng = rand::thread_rng();
    let config = test_config();
    let selected = select_transfers(&table, 100, 0, &config, 0, 250, false, &mut rng).unwrap();
    let total: u64 = selected.iter().map(|id| table.get(id).unwrap().amount).sum();
    assert!(total >= 250);
  }

  #[test]
  fn select_transfers_fails_when_insufficient() {
    let mut table = OutputTable::new();
    table.insert(sample_output(1, 100, 0)).unwrap();
    let mut rng = rand::thread_rng();
    let config = test_config();
    let result = select_transfers(&table, 100, 0, &config, 0, 1000, false, &mut rng);
    assert!(matches!(result, Err(SendError::InsufficientFunds { .. })));
  }

  #[test]
  fn select_transfers_skips_locked_outputs() {
    let mut table = OutputTable::new();
    table.insert(sample_output(1, 100, 1000)).unwrap();
    let mut rng = rand::thread_rng();
    let config = test_config();
    let result = select_transfers(&table, 5, 0, &config, 0, 50, false, &mut rng);
    assert!(matches!(result, Err(SendError::InsufficientFunds { .. })));
  }

  proptest::proptest! {
    #[test]
    fn select_transfers_meets_or_reports_insufficient(
      amounts in proptest::collection::vec(1u64 .. 10_000, 1 .. 20),
      needed in 1u64 .. 100_000,
    ) {
      let mut table = OutputTable::new();
      for (i, amount) in amounts.iter().enumerate() {
        table.insert(sample_output(i as u8, *amount, 0)).unwrap();
      }
      let total: u64 = amounts.iter().sum();
      let mut rng = rand::thread_rng();
      let config = test_config();
      let result = select_transfers(&table, 100, 0, &config, 0, needed, false, &mut rng);
      if total >= needed {
        let selected = result.expect("sufficient funds exist");
        let selected_total: u64 = selected.iter().map(|id| table.get(id).unwrap().amount).sum();
        proptest::prop_assert!(selected_total >= needed);
      } else {
        proptest::prop_assert!(matches!(result, Err(SendError::InsufficientFunds { .. })));
      }
    }
  }
}
