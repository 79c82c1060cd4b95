//! The user-visible transfer history (`get_transfers`): one entry per send or receive, updated
//! in place as the scanner reconciles sent transactions with their on-chain confirmation.

use crate::crypto::Hash;
use crate::extra::PaymentId;

/// The direction of a [`TransferLogEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
  /// Funds received.
  In,
  /// Funds sent, whether by this wallet or observed as a foreign spend of an owned output.
  Out,
}

/// One entry of the transfer history.
#[derive(Clone, Debug)]
pub struct TransferLogEntry {
  /// When this entry was recorded (commit time for outgoing, scan time for incoming).
  pub time: u64,
  /// Send or receive.
  pub direction: Direction,
  /// The transaction this entry describes.
  pub tx_hash: Hash,
  /// The net amount moved: received minus spent-back-to-self for incoming, spent minus
  /// received-back-as-change for outgoing.
  pub amount: u64,
  /// The transaction fee, or 0 for an incoming entry, or 0 for an outgoing entry this wallet did
  /// not itself construct (the fee can't be recovered from an externally-observed spend; see the
  /// crate's recorded open question on this).
  pub fee: u64,
  /// The payment id carried in this transaction's extra-nonce, if any.
  pub payment_id: Option<PaymentId>,
  /// Whether `address` is meaningful (this wallet constructed the send and knows the
  /// destination); always `false` for incoming and foreign-observed outgoing entries.
  pub has_address: bool,
  /// The destination address, when `has_address` is set.
  pub address: Option<crate::account::Address>,
  /// The block height this transaction confirmed at; 0 until confirmed.
  pub block_height: u64,
  /// The transaction's unlock time.
  pub unlock_time: u64,
}

/// The transfer history, append-only except for the block-height update a later confirmation
/// applies to a previously-recorded outgoing entry.
#[derive(Clone, Debug, Default)]
pub struct TransferLog {
  entries: Vec<TransferLogEntry>,
}

impl TransferLog {
  /// An empty log.
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a new entry.
  pub fn push(&mut self, entry: TransferLogEntry) {
    self.entries.push(entry);
  }

  /// Find an existing entry by transaction hash.
  pub fn find_by_tx_hash(&self, tx_hash: &Hash) -> Option<&TransferLogEntry> {
    self.entries.iter().find(|e| &e.tx_hash == tx_hash)
  }

  /// Update the block height of a previously-recorded entry for `tx_hash`, if one exists.
  /// Returns whether an entry was found and updated.
  pub fn set_block_height(&mut self, tx_hash: &Hash, block_height: u64) -> bool {
    if let Some(entry) = self.entries.iter_mut().find(|e| &e.tx_hash == tx_hash) {
      entry.block_height = block_height;
      true
    } else {
      false
    }
  }

  /// Erase every incoming entry at or past `from_height` (outgoing entries with no on-chain
  /// confirmation yet are left as-is; a later re-scan will re-confirm them via their
  /// unconfirmed-transfer entry).
  pub fn detach(&mut self, from_height: u64) {
    self.entries.retain(|e| {
      !(e.direction == Direction::In && e.block_height != 0 && e.block_height >= from_height)
    });
  }

  /// Every entry, in recorded order.
  pub fn iter(&self) -> impl Iterator<Item = &TransferLogEntry> {
    self.entries.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(tx_hash: Hash, direction: Direction, block_height: u64) -> TransferLogEntry {
    TransferLogEntry {
      time: 0,
      direction,
      tx_hash,
      amount: 10,
      fee: 0,
      payment_id: None,
      has_address: false,
      address: None,
      block_height,
      unlock_time: 0,
    }
  }

  #[test]
  fn set_block_height_updates_existing_entry() {
    let mut log = TransferLog::new();
    let hash = Hash::from_bytes([1; 32]);
    log.push(entry(hash, Direction::Out, 0));
    assert!(log.set_block_height(&hash, 42));
    assert_eq!(log.find_by_tx_hash(&hash).unwrap().block_height, 42);
  }

  #[test]
  fn detach_only_erases_confirmed_incoming() {
    let mut log = TransferLog::new();
    let incoming = Hash::from_bytes([1; 32]);
    let outgoing = Hash::from_bytes([2; 32]);
    log.push(entry(incoming, Direction::In, 1000));
    log.push(entry(outgoing, Direction::Out, 1000));
    log.detach(1000);
    assert!(log.find_by_tx_hash(&incoming).is_none());
    assert!(log.find_by_tx_hash(&outgoing).is_some());
  }
}
