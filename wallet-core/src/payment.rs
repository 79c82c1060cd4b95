//! Received-payment records, indexed by payment id for `get_payments`/`get_bulk_payments`.

use std::collections::HashMap;

use crate::crypto::Hash;
use crate::extra::PaymentId;

/// One occurrence of a payment id in a received transaction.
#[derive(Clone, Debug)]
pub struct PaymentDetail {
  /// The transaction that carried this payment id.
  pub tx_hash: Hash,
  /// The net amount received by this transaction.
  pub amount: u64,
  /// The block height the transaction was included at.
  pub block_height: u64,
  /// The transaction's unlock time.
  pub unlock_time: u64,
}

/// Payment records, multi-valued per [`PaymentId`] since the same id may legitimately recur
/// across several transactions (e.g. repeated invoice payments).
#[derive(Clone, Debug, Default)]
pub struct PaymentTable {
  by_id: HashMap<PaymentId, Vec<PaymentDetail>>,
}

impl PaymentTable {
  /// An empty table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a new occurrence of `payment_id`.
  pub fn insert(&mut self, payment_id: PaymentId, detail: PaymentDetail) {
    self.by_id.entry(payment_id).or_default().push(detail);
  }

  /// Every occurrence recorded for `payment_id`.
  pub fn get(&self, payment_id: &PaymentId) -> &[PaymentDetail] {
    self.by_id.get(payment_id).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Every occurrence across every payment id at or above `min_block_height` (strict: entries
  /// exactly at `min_block_height` are excluded, matching the reference semantics where
  /// `get_bulk_payments` is an open lower bound).
  pub fn bulk(
    &self,
    payment_ids: Option<&[PaymentId]>,
    min_block_height: u64,
  ) -> Vec<(PaymentId, PaymentDetail)> {
    let mut out = Vec::new();
    for (id, details) in &self.by_id {
      if let Some(ids) = payment_ids {
        if !ids.contains(id) {
          continue;
        }
      }
      for detail in details {
        if detail.block_height > min_block_height {
          out.push((*id, detail.clone()));
        }
      }
    }
    out
  }

  /// Erase every occurrence at or past `from_height`, as part of a reorg detach.
  pub fn detach(&mut self, from_height: u64) {
    self.by_id.retain(|_, details| {
      details.retain(|d| d.block_height < from_height);
      !details.is_empty()
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn id() -> PaymentId {
    PaymentId::Unencrypted([1; 32])
  }

  fn detail(height: u64) -> PaymentDetail {
    PaymentDetail { tx_hash: Hash::from_bytes([2; 32]), amount: 7, block_height: height, unlock_time: 0 }
  }

  #[test]
  fn get_returns_all_occurrences() {
    let mut table = PaymentTable::new();
    table.insert(id(), detail(1000));
    assert_eq!(table.get(&id()).len(), 1);
    assert_eq!(table.get(&id())[0].amount, 7);
  }

  #[test]
  fn bulk_is_strict_lower_bound() {
    let mut table = PaymentTable::new();
    table.insert(id(), detail(1000));
    assert!(table.bulk(None, 1000).is_empty());
    assert_eq!(table.bulk(None, 999).len(), 1);
  }

  #[test]
  fn detach_erases_at_or_past_height() {
    let mut table = PaymentTable::new();
    table.insert(id(), detail(1000));
    table.detach(1000);
    assert!(table.get(&id()).is_empty());
  }
}
