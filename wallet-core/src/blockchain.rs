//! The local blockchain mirror: an ordered list of block ids, its genesis invariant, the
//! short-chain-history skip-list used to anchor `QueryBlocks` requests, and unlock-time
//! evaluation.

use crate::crypto::Hash;
use crate::error::ScanError;
use crate::rpc::QueryBlocksItem;

/// A block height below which `unlock_time` is interpreted as a block height rather than a Unix
/// timestamp. Mirrors `CRYPTONOTE_MAX_BLOCK_NUMBER`.
pub const MAX_BLOCK_HEIGHT: u64 = 500_000_000;

/// The ordered mirror of block ids this wallet has scanned, `B[0..H)`.
///
/// Invariant: `B[0]`, once present, is always the active currency's genesis block id; this is
/// checked on every append to an empty mirror and on load.
#[derive(Clone, Debug, Default)]
pub struct Blockchain {
  ids: Vec<Hash>,
  genesis: Hash,
}

impl Blockchain {
  /// An empty mirror for the given genesis id. Appending any other id at height 0 is rejected.
  pub fn new(genesis: Hash) -> Self {
    Self { ids: Vec::new(), genesis }
  }

  /// Restore a mirror from persisted ids, checking the genesis invariant against the caller's
  /// expected genesis id.
  pub fn from_ids(genesis: Hash, ids: Vec<Hash>) -> Result<Self, ScanError> {
    if let Some(&first) = ids.first() {
      if first != genesis {
        return Err(ScanError::NoSharedBlock);
      }
    }
    Ok(Self { ids, genesis })
  }

  /// Restore a mirror from persisted ids without checking the genesis invariant (the loader
  /// doesn't know the expected genesis at this layer); the genesis relation should be checked by
  /// the caller once it knows which currency's genesis this wallet is meant to track.
  pub fn from_ids_unchecked(ids: Vec<Hash>) -> Self {
    let genesis = ids.first().copied().unwrap_or_else(|| Hash::from_bytes([0; 32]));
    Self { ids, genesis }
  }

  /// The current local height, `H`.
  pub fn height(&self) -> u64 {
    self.ids.len() as u64
  }

  /// The block id at `index`, if within range.
  pub fn get(&self, index: u64) -> Option<Hash> {
    self.ids.get(index as usize).copied()
  }

  /// This chain's genesis id.
  pub fn genesis(&self) -> Hash {
    self.genesis
  }

  /// The full ordered list of ids, for persistence.
  pub fn ids(&self) -> &[Hash] {
    &self.ids
  }

  /// A skip-list anchor for `QueryBlocks`: the last 10 ids, then exponentially back-spaced ids
  /// (offsets doubling), always terminated by the genesis id.
  pub fn short_chain_history(&self) -> Vec<Hash> {
    let height = self.ids.len();
    let mut history = Vec::new();
    if height == 0 {
      return history;
    }

    let recent = height.min(10);
    for i in 0 .. recent {
      history.push(self.ids[height - 1 - i]);
    }

    let mut offset = recent;
    let mut step = 1usize;
    while offset < height {
      history.push(self.ids[height - 1 - offset]);
      offset += step;
      step *= 2;
    }

    if history.last() != Some(&self.genesis) {
      history.push(self.genesis);
    }
    history
  }

  /// Apply one `QueryBlocks` response: append/reconcile `items`, starting at `start_height`.
  ///
  /// Returns the ids of every item that carried a full block blob (these feed stage 1 of the
  /// scan pipeline), the number of blocks a reorg erased (0 if none), the height a reorg erased
  /// from if one was detected, and the number of ids actually appended to the mirror this call
  /// (every item that extended or reconciled the tip, whether or not it carried a full block —
  /// during initial sync the daemon returns long runs of id-only headers before the first block
  /// past the account's creation time, and those still advance the mirror). The caller
  /// (`Wallet::refresh_once`) must use this last count, not the full-block id list's length, to
  /// decide whether a round made progress: a round that only appended headers still needs another
  /// `QueryBlocks` round to reach the funded range, and is not yet "nothing further to offer".
  pub fn update(
    &mut self,
    start_height: u64,
    items: &[QueryBlocksItem],
  ) -> Result<(Vec<Hash>, u64, Option<u64>, u64), ScanError> {
    let mut new_block_ids = Vec::new();
    let mut detached = 0u64;
    let mut reorg_from = None;
    let mut appended = 0u64;

    for (offset, item) in items.iter().enumerate() {
      let current_index = start_height + offset as u64;

      if current_index < self.height() {
        if self.get(current_index) == Some(item.block_id) {
          continue;
        }
        if current_index == start_height {
          return Err(ScanError::NoSharedBlock);
        }
        reorg_from.get_or_insert(current_index);
        detached += self.truncate(current_index);
        self.ids.push(item.block_id);
        appended += 1;
      } else {
        if current_index != self.height() {
          return Err(ScanError::Codec(format!(
            "QueryBlocks item at index {current_index} doesn't extend the mirror at height {}",
            self.height()
          )));
        }
        if self.ids.is_empty() && item.block_id != self.genesis {
          return Err(ScanError::NoSharedBlock);
        }
        self.ids.push(item.block_id);
        appended += 1;
      }

      if item.block_blob.is_some() {
        new_block_ids.push(item.block_id);
      }
    }

    Ok((new_block_ids, detached, reorg_from, appended))
  }

  /// Truncate the mirror to `[0, from_height)`. Returns the number of ids removed.
  ///
  /// Only touches the mirror itself; purging owned outputs, payments, and transfer-log entries
  /// at or past `from_height` is the caller's responsibility (see
  /// [`crate::wallet::Wallet::detach_blockchain`]).
  pub fn truncate(&mut self, from_height: u64) -> u64 {
    let from_height = from_height as usize;
    if from_height >= self.ids.len() {
      return 0;
    }
    let removed = (self.ids.len() - from_height) as u64;
    self.ids.truncate(from_height);
    removed
  }
}

/// Evaluate whether `unlock_time` has passed, given the current local height and the current
/// Unix time.
///
/// Values below [`MAX_BLOCK_HEIGHT`] are interpreted as a block height; the output unlocks once
/// `chain_height - 1 + allowed_block_delta >= unlock_time`. Larger values are interpreted as a
/// Unix timestamp; the output unlocks once `now + allowed_seconds_delta >= unlock_time`.
pub fn is_spendtime_unlocked(
  unlock_time: u64,
  chain_height: u64,
  now: u64,
  allowed_block_delta: u64,
  allowed_seconds_delta: u64,
) -> bool {
  if unlock_time < MAX_BLOCK_HEIGHT {
    chain_height.saturating_sub(1) + allowed_block_delta >= unlock_time
  } else {
    now + allowed_seconds_delta >= unlock_time
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hash(byte: u8) -> Hash {
    Hash::from_bytes([byte; 32])
  }

  fn item(id: Hash, full_block: bool) -> QueryBlocksItem {
    QueryBlocksItem {
      block_id: id,
      block_blob: full_block.then(|| vec![]),
      tx_blobs: vec![],
    }
  }

  #[test]
  fn short_chain_history_includes_genesis() {
    let genesis = hash(0);
    let mut chain = Blockchain::new(genesis);
    for i in 1 ..= 25u8 {
      chain.update(i as u64 - 1, &[item(hash(i), false)]).unwrap();
    }
    let history = chain.short_chain_history();
    assert_eq!(history.last(), Some(&genesis));
    assert_eq!(history[0], hash(25));
  }

  #[test]
  fn reorg_detected_and_truncates() {
    let genesis = hash(0);
    let mut chain = Blockchain::new(genesis);
    chain.update(0, &[item(hash(1), false), item(hash(2), false), item(hash(3), false)]).unwrap();
    assert_eq!(chain.height(), 4);

    let (new_ids, detached, reorg_from, appended) =
      chain.update(2, &[item(hash(99), false), item(hash(100), true)]).unwrap();
    assert_eq!(detached, 2);
    assert_eq!(reorg_from, Some(2));
    assert_eq!(chain.height(), 4);
    assert_eq!(chain.get(2), Some(hash(99)));
    assert_eq!(new_ids, vec![hash(100)]);
    assert_eq!(appended, 2);
  }

  #[test]
  fn mismatch_at_start_height_is_fatal() {
    let genesis = hash(0);
    let mut chain = Blockchain::new(genesis);
    chain.update(0, &[item(hash(1), false)]).unwrap();
    let err = chain.update(0, &[item(hash(99), false)]).unwrap_err();
    assert!(matches!(err, ScanError::NoSharedBlock));
  }

  #[test]
  fn matching_block_is_a_no_op() {
    let genesis = hash(0);
    let mut chain = Blockchain::new(genesis);
    chain.update(0, &[item(hash(1), false)]).unwrap();
    let (new_ids, detached, reorg_from, appended) = chain.update(0, &[item(hash(1), false)]).unwrap();
    assert_eq!(detached, 0);
    assert_eq!(reorg_from, None);
    assert!(new_ids.is_empty());
    assert_eq!(appended, 0);
    assert_eq!(chain.height(), 1);
  }

  #[test]
  fn unlock_boundary_exact_height() {
    assert!(is_spendtime_unlocked(9, 10, 0, 0, 0));
    assert!(!is_spendtime_unlocked(10, 10, 0, 0, 0));
  }

  #[test]
  fn unlock_timestamp_interpretation() {
    let ts = MAX_BLOCK_HEIGHT + 1000;
    assert!(is_spendtime_unlocked(ts, 5, MAX_BLOCK_HEIGHT + 1000, 0, 0));
    assert!(!is_spendtime_unlocked(ts, 5, MAX_BLOCK_HEIGHT + 999, 0, 0));
  }

  proptest::proptest! {
    #[test]
    fn truncate_then_reupdate_restores_mirror(
      block_count in 1usize .. 40,
      detach_at in 0u64 .. 40,
    ) {
      let genesis = hash(0);
      let mut chain = Blockchain::new(genesis);
      let mut items = vec![item(genesis, false)];
      items.extend((1 ..= block_count as u8).map(|i| item(hash(i.wrapping_add(10)), false)));
      chain.update(0, &items).unwrap();
      let original_ids = chain.ids().to_vec();

      let detach_at = detach_at.min(chain.height());
      chain.truncate(detach_at);
      proptest::prop_assert_eq!(chain.height(), detach_at);

      let replay = &items[detach_at as usize ..];
      if !replay.is_empty() {
        chain.update(detach_at, replay).unwrap();
      }
      proptest::prop_assert_eq!(chain.ids().to_vec(), original_ids);
    }
  }
}
