//! Unconfirmed sends: transactions this wallet has broadcast but not yet seen the scanner
//! re-observe on-chain.

use std::collections::HashMap;

use crate::crypto::Hash;
use crate::tx::ConstructedTransaction;

/// A send awaiting on-chain confirmation.
#[derive(Clone, Debug)]
pub struct UnconfirmedTransfer {
  /// The broadcast transaction.
  pub tx: ConstructedTransaction,
  /// The change amount this send returned to the wallet, contributed to `balance()` until the
  /// transaction confirms and the applier records its own change output as a normal owned output.
  pub change_amount: u64,
  /// The Unix time this transaction was committed.
  pub sent_time: u64,
}

/// Unconfirmed sends, keyed by transaction hash.
#[derive(Clone, Debug, Default)]
pub struct UnconfirmedTable {
  by_hash: HashMap<Hash, UnconfirmedTransfer>,
}

impl UnconfirmedTable {
  /// An empty table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a newly-committed send.
  pub fn insert(&mut self, tx_hash: Hash, transfer: UnconfirmedTransfer) {
    self.by_hash.insert(tx_hash, transfer);
  }

  /// Remove the entry for `tx_hash`, e.g. once the scanner observes it confirmed on-chain.
  /// Returns the removed entry, if present.
  pub fn remove(&mut self, tx_hash: &Hash) -> Option<UnconfirmedTransfer> {
    self.by_hash.remove(tx_hash)
  }

  /// Whether `tx_hash` is still awaiting confirmation.
  pub fn contains(&self, tx_hash: &Hash) -> bool {
    self.by_hash.contains_key(tx_hash)
  }

  /// The sum of every unconfirmed send's change amount, contributed to `balance()`.
  pub fn total_change(&self) -> u64 {
    self.by_hash.values().map(|t| t.change_amount).sum()
  }

  /// Iterate over every unconfirmed send.
  pub fn iter(&self) -> impl Iterator<Item = (&Hash, &UnconfirmedTransfer)> {
    self.by_hash.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_tx() -> ConstructedTransaction {
    ConstructedTransaction { unlock_time: 0, inputs: vec![], outputs: vec![], extra: vec![] }
  }

  #[test]
  fn insert_remove_round_trip() {
    let mut table = UnconfirmedTable::new();
    let hash = Hash::from_bytes([1; 32]);
    table.insert(hash, UnconfirmedTransfer { tx: sample_tx(), change_amount: 5, sent_time: 100 });
    assert!(table.contains(&hash));
    assert_eq!(table.total_change(), 5);
    let removed = table.remove(&hash).unwrap();
    assert_eq!(removed.change_amount, 5);
    assert!(!table.contains(&hash));
  }
}
