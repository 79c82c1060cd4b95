//! The scan pipeline: a producer stage parses fetched blocks into candidate transactions, a pool
//! of worker threads tests each candidate's outputs for ownership, and a single applier mutates
//! wallet state in the order the producer emitted them.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, trace};

use crate::account::AccountKeys;
use crate::crypto::{CryptoNotePrimitives, Hash, PublicKey};
use crate::error::ScanError;
use crate::extra::find_tx_public_key;
use crate::rpc::QueryBlocksItem;
use crate::tx::{BlockCodec, ParsedTransaction};

/// A transaction queued for ownership scanning, carrying the monotonic position it was emitted
/// at so the applier can restore blockchain order after concurrent scanning.
pub struct TxItem {
  /// The parsed transaction.
  pub tx: ParsedTransaction,
  /// This transaction's block's Unix timestamp.
  pub time: u64,
  /// This transaction's block height.
  pub height: u64,
  /// This transaction's block id.
  pub block_id: Hash,
  /// The ephemeral transaction public key recovered from `tx_extra`.
  pub tx_pub_key: PublicKey,
  /// Position in emission order: `(height, intra-block position)` flattened to a single counter.
  /// The applier uses this, not arrival order, to process transactions — a later scanner
  /// finishing before an earlier one must not let a spend of a same-round receipt jump ahead of
  /// that receipt.
  pub emission_index: u64,
}

/// A [`TxItem`] annotated with the result of its ownership check.
pub struct CheckedTxItem {
  /// The original item.
  pub item: TxItem,
  /// Internal output indices (`tx.outputs[i]`) recognized as belonging to this account.
  pub owned_indices: Vec<usize>,
  /// The sum of `tx.outputs[i].amount` over `owned_indices`.
  pub total_received: u64,
}

/// Test every output of `tx` for ownership under `account`, via `derivation = 8 * view_secret *
/// tx_pub_key` and `P_i == derive_public_key(derivation, i, spend_public)`.
pub fn lookup_acc_outs(
  primitives: &dyn CryptoNotePrimitives,
  account: &AccountKeys,
  tx: &ParsedTransaction,
  tx_pub_key: &PublicKey,
) -> (Vec<usize>, u64) {
  let derivation = primitives.generate_key_derivation(tx_pub_key, account.view_secret());
  let mut owned = Vec::new();
  let mut total_received = 0u64;
  for (index, output) in tx.outputs.iter().enumerate() {
    let derived = primitives.derive_public_key(&derivation, index, account.spend_public());
    if derived == output.target_key {
      owned.push(index);
      total_received = total_received.saturating_add(output.amount);
    }
  }
  (owned, total_received)
}

/// Parse one fetched block's miner tx and embedded transactions into [`TxItem`]s, assigning
/// emission indices in the given block/tx order. Transactions lacking a tx-public-key field are
/// skipped (nothing to scan ownership against) and reported via `on_skip`.
fn emit_block_items(
  codec: &dyn BlockCodec,
  item: &QueryBlocksItem,
  height: u64,
  next_emission_index: &mut u64,
  account_creation_cutoff: u64,
  on_skip: &mut dyn FnMut(Hash),
) -> Result<Vec<TxItem>, ScanError> {
  let Some(block_blob) = item.block_blob.as_ref() else { return Ok(Vec::new()) };
  let block = codec
    .parse_block(block_blob, &item.tx_blobs)
    .map_err(|e| ScanError::Codec(e.to_string()))?;

  if block.timestamp < account_creation_cutoff {
    return Ok(Vec::new());
  }

  let mut out = Vec::new();
  for tx in std::iter::once(block.miner_tx).chain(block.txs) {
    let hash = tx.hash;
    match find_tx_public_key(&tx.extra) {
      Some(tx_pub_key) => {
        let emission_index = *next_emission_index;
        *next_emission_index += 1;
        out.push(TxItem { tx, time: block.timestamp, height, block_id: block.id, tx_pub_key, emission_index });
      }
      None => on_skip(hash),
    }
  }
  Ok(out)
}

/// Run the three-stage scan pipeline over one `QueryBlocks` response's items.
///
/// `worker_count` scanner threads test ownership concurrently; `apply` is invoked serially, in
/// emission order, on the calling thread — it is the applier's whole job to perform wallet-state
/// mutation, so it alone is allowed to see the items out of arrival order restored.
pub fn process_transactions(
  items: &[QueryBlocksItem],
  start_height: u64,
  new_block_ids: &HashSet<Hash>,
  codec: &dyn BlockCodec,
  account: &AccountKeys,
  primitives: &dyn CryptoNotePrimitives,
  account_creation_cutoff: u64,
  worker_count: usize,
  mut on_skip: impl FnMut(Hash) + Send,
  mut apply: impl FnMut(CheckedTxItem) -> Result<(), ScanError>,
) -> Result<(), ScanError> {
  let worker_count = worker_count.max(1);
  let queue_capacity = 2 * worker_count;
  debug!(items = items.len(), worker_count, queue_capacity, "starting scan pipeline");

  let (incoming_tx, incoming_rx) = bounded::<TxItem>(queue_capacity);
  let (checked_tx, checked_rx) = bounded::<CheckedTxItem>(queue_capacity);

  thread::scope(|scope| {
    let producer_handle = scope.spawn({
      let incoming_tx = incoming_tx.clone();
      move || -> Result<(), ScanError> {
        let mut next_emission_index = 0u64;
        for (offset, item) in items.iter().enumerate() {
          if !new_block_ids.contains(&item.block_id) {
            continue;
          }
          let height = start_height + offset as u64;
          let emitted = emit_block_items(
            codec,
            item,
            height,
            &mut next_emission_index,
            account_creation_cutoff,
            &mut on_skip,
          )?;
          for tx_item in emitted {
            trace!(emission_index = tx_item.emission_index, height = tx_item.height, "producer emitted tx");
            if incoming_tx.send(tx_item).is_err() {
              return Ok(());
            }
          }
        }
        Ok(())
      }
    });
    drop(incoming_tx);

    let worker_handles: Vec<_> = (0 .. worker_count)
      .map(|_| {
        let incoming_rx = incoming_rx.clone();
        let checked_tx = checked_tx.clone();
        scope.spawn(move || {
          while let Ok(tx_item) = incoming_rx.recv() {
            let (owned_indices, total_received) =
              lookup_acc_outs(primitives, account, &tx_item.tx, &tx_item.tx_pub_key);
            if !owned_indices.is_empty() {
              trace!(
                tx_hash = %hex::encode(tx_item.tx.hash.as_bytes()),
                total_received,
                "scanner recognized owned output(s)"
              );
            }
            let checked =
              CheckedTxItem { item: tx_item, owned_indices, total_received };
            if checked_tx.send(checked).is_err() {
              return;
            }
          }
        })
      })
      .collect();
    drop(checked_tx);
    drop(incoming_rx);

    // The applier: a min-heap keyed on emission index restores blockchain order even though the
    // worker pool above delivers items out of order.
    let mut pending: BinaryHeap<Reverse<OrderedChecked>> = BinaryHeap::new();
    let mut next_to_apply = 0u64;
    let mut apply_err = None;

    for checked in checked_rx.iter() {
      pending.push(Reverse(OrderedChecked(checked)));
      while let Some(Reverse(OrderedChecked(top))) = pending.peek() {
        if top.item.emission_index != next_to_apply {
          break;
        }
        let Reverse(OrderedChecked(checked)) = pending.pop().unwrap();
        trace!(emission_index = checked.item.emission_index, "applier applying tx in order");
        next_to_apply += 1;
        if let Err(e) = apply(checked) {
          apply_err = Some(e);
          break;
        }
      }
      if apply_err.is_some() {
        break;
      }
    }

    // Disconnect the checked channel before joining: on the error-break path above, workers may
    // still be blocked in `checked_tx.send()` on a full queue this loop has stopped draining.
    // Dropping the receiver makes that `send()` return `Err` immediately so each worker returns,
    // which in turn drops its `incoming_rx` clone and lets the producer's `incoming_tx.send()`
    // fail the same way instead of blocking forever.
    drop(checked_rx);

    for worker in worker_handles {
      let _ = worker.join();
    }
    let producer_result = producer_handle.join().unwrap_or(Ok(()));

    if let Some(e) = apply_err {
      return Err(e);
    }
    debug!(applied = next_to_apply, "scan pipeline finished");
    producer_result
  })
}

struct OrderedChecked(CheckedTxItem);

impl PartialEq for OrderedChecked {
  fn eq(&self, other: &Self) -> bool {
    self.0.item.emission_index == other.0.item.emission_index
  }
}
impl Eq for OrderedChecked {}
impl PartialOrd for OrderedChecked {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for OrderedChecked {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.0.item.emission_index.cmp(&other.0.item.emission_index)
  }
}

/// Callbacks the applier invokes synchronously as it mutates wallet state. Implementors must not
/// block: these run on the refresh thread between otherwise-cheap state mutations.
pub trait RefreshCallbacks {
  /// A new block was appended to the local mirror.
  fn on_new_block(&mut self, _height: u64, _block_id: Hash) {}
  /// Funds were received: a transaction added one or more new owned outputs.
  fn on_money_received(&mut self, _tx_hash: Hash, _amount: u64) {}
  /// Funds were spent: a transaction's inputs matched one or more owned outputs' key images.
  fn on_money_spent(&mut self, _tx_hash: Hash, _amount: u64) {}
  /// A transaction was skipped because it carried no tx-public-key field.
  fn on_skip_transaction(&mut self, _tx_hash: Hash) {}
}

/// A [`RefreshCallbacks`] that does nothing.
#[derive(Default)]
pub struct NoopCallbacks;
impl RefreshCallbacks for NoopCallbacks {}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crypto::{Chacha8Iv, Chacha8Key, KeyDerivation, RingSignature, SecretKey};
  use crate::output::KeyImage;
  use crate::tx::Output;

  struct FakePrimitives;
  impl CryptoNotePrimitives for FakePrimitives {
    fn keccak256(&self, _data: &[u8]) -> Hash {
      Hash::from_bytes([0; 32])
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
    fn derive_public_key(&self, _derivation: &KeyDerivation, output_index: usize, base: &PublicKey) -> PublicKey {
      let mut bytes = *base.as_bytes();
      bytes[0] = bytes[0].wrapping_add(output_index as u8);
      PublicKey::from_bytes(bytes)
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

  #[test]
  fn lookup_acc_outs_finds_matching_output() {
    let primitives = FakePrimitives;
    let account = AccountKeys::from_secrets(
      &primitives,
      SecretKey::from_bytes([5; 32]),
      SecretKey::from_bytes([6; 32]),
    );
    let spend_public = *account.spend_public().as_bytes();
    let mut matching = spend_public;
    matching[0] = matching[0].wrapping_add(1);
    let tx = ParsedTransaction {
      hash: Hash::from_bytes([1; 32]),
      unlock_time: 0,
      inputs: vec![],
      outputs: vec![
        Output { amount: 5, target_key: PublicKey::from_bytes(spend_public) },
        Output { amount: 10, target_key: PublicKey::from_bytes(matching) },
      ],
      extra: vec![],
    };
    let (owned, total) =
      lookup_acc_outs(&primitives, &account, &tx, &PublicKey::from_bytes([9; 32]));
    assert_eq!(owned, vec![1]);
    assert_eq!(total, 10);
  }
}
