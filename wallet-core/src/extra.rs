//! Parsing of a transaction's `tx_extra` field: the ephemeral transaction public key a sender
//! attaches so the recipient can derive ownership, and an optional payment-id nonce correlating
//! the transaction with an off-chain invoice.
//!
//! This only parses fields already extracted into a flat list by [`crate::tx::BlockCodec`] — the
//! raw `tx_extra` byte-stream grammar (tag-length-value with several historical oddities) is a
//! block/tx-format concern out of this crate's scope, per its contract boundary with
//! [`crate::tx`].

use crate::crypto::PublicKey;

/// One field recovered from a transaction's `tx_extra`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtraField {
  /// `TX_EXTRA_TAG_PUBKEY`: the ephemeral public key recipients use to derive ownership.
  TxPublicKey(PublicKey),
  /// `TX_EXTRA_NONCE`: an opaque nonce, either a plain payment id, an encrypted (short) payment
  /// id, or application-specific data this wallet does not interpret.
  Nonce(Vec<u8>),
  /// `TX_EXTRA_MYSTERIOUS_MINERGATE` or any other tag this wallet does not act on.
  Unknown { tag: u8, data: Vec<u8> },
}

const NONCE_PAYMENT_ID_TAG: u8 = 0x00;
const NONCE_ENCRYPTED_PAYMENT_ID_TAG: u8 = 0x01;
const TAG_PUBKEY: u8 = 0x01;

/// Serialize a freshly-generated tx-public-key field, to be prepended to whatever extra bytes a
/// `transfer` caller supplies (a payment-id nonce, most commonly).
///
/// Full `tx_extra` grammar (every historical tag, length-prefixing for variable fields) is a
/// block/tx blob format concern this crate otherwise leaves to [`crate::tx::BlockCodec`]; this one
/// field is simple and fixed-length enough that the builder can assemble it directly rather than
/// route it through the codec contract.
pub fn serialize_tx_public_key(key: &PublicKey) -> Vec<u8> {
  let mut out = Vec::with_capacity(33);
  out.push(TAG_PUBKEY);
  out.extend_from_slice(key.as_bytes());
  out
}

/// A payment id recovered from a transaction's extra-nonce, correlating the transaction with an
/// off-chain invoice.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentId {
  /// The legacy, unencrypted 32-byte form.
  Unencrypted([u8; 32]),
  /// The 8-byte form, meant to be XORed against a shared-secret-derived keystream before use;
  /// this crate stores it exactly as carried on-chain (encryption/decryption is a primitive the
  /// embedder supplies, not a concern of extra-field parsing).
  Encrypted([u8; 8]),
}

impl core::fmt::Debug for PaymentId {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      PaymentId::Unencrypted(id) => write!(f, "PaymentId::Unencrypted({})", hex::encode(id)),
      PaymentId::Encrypted(id) => write!(f, "PaymentId::Encrypted({})", hex::encode(id)),
    }
  }
}

/// Serialize a payment id to the nonce-field payload a sender would attach to `extra` (mirrors
/// [`serialize_tx_public_key`]): the sub-tag byte identifying encrypted vs. unencrypted, followed
/// by the id itself. As with [`serialize_tx_public_key`], this is the inner payload only; wrapping
/// it in the outer `TX_EXTRA_NONCE` tag/length framing is [`crate::tx::BlockCodec`]'s job.
pub fn serialize_payment_id_nonce(payment_id: &PaymentId) -> Vec<u8> {
  match payment_id {
    PaymentId::Unencrypted(id) => {
      let mut out = Vec::with_capacity(33);
      out.push(NONCE_PAYMENT_ID_TAG);
      out.extend_from_slice(id);
      out
    }
    PaymentId::Encrypted(id) => {
      let mut out = Vec::with_capacity(9);
      out.push(NONCE_ENCRYPTED_PAYMENT_ID_TAG);
      out.extend_from_slice(id);
      out
    }
  }
}

/// Find the first [`ExtraField::TxPublicKey`] among `fields`.
///
/// A transaction with no tx-public-key field cannot be scanned for ownership (there is nothing
/// to derive against) and must be skipped by the scan pipeline's producer stage.
pub fn find_tx_public_key(fields: &[ExtraField]) -> Option<PublicKey> {
  fields.iter().find_map(|field| match field {
    ExtraField::TxPublicKey(key) => Some(*key),
    _ => None,
  })
}

/// Find and decode a payment id carried in an extra-nonce field, if any.
///
/// Mirrors the nonce sub-tagging the wire format uses: a nonce whose first byte is
/// `NONCE_PAYMENT_ID_TAG` and whose remaining length is 32 is an unencrypted payment id; a nonce
/// whose first byte is `NONCE_ENCRYPTED_PAYMENT_ID_TAG` and whose remaining length is 8 is an
/// encrypted one. Any other shape is nonce data this wallet doesn't interpret as a payment id.
pub fn find_payment_id(fields: &[ExtraField]) -> Option<PaymentId> {
  fields.iter().find_map(|field| {
    let ExtraField::Nonce(nonce) = field else { return None };
    let (&tag, rest) = nonce.split_first()?;
    match (tag, rest.len()) {
      (NONCE_PAYMENT_ID_TAG, 32) => {
        let mut id = [0u8; 32];
        id.copy_from_slice(rest);
        Some(PaymentId::Unencrypted(id))
      }
      (NONCE_ENCRYPTED_PAYMENT_ID_TAG, 8) => {
        let mut id = [0u8; 8];
        id.copy_from_slice(rest);
        Some(PaymentId::Encrypted(id))
      }
      _ => None,
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn finds_tx_public_key_among_other_fields() {
    let key = PublicKey::from_bytes([7; 32]);
    let fields = vec![
      ExtraField::Unknown { tag: 0xde, data: vec![1, 2, 3] },
      ExtraField::TxPublicKey(key),
    ];
    assert_eq!(find_tx_public_key(&fields), Some(key));
  }

  #[test]
  fn missing_tx_public_key_is_none() {
    let fields = vec![ExtraField::Unknown { tag: 0xde, data: vec![] }];
    assert_eq!(find_tx_public_key(&fields), None);
  }

  #[test]
  fn finds_unencrypted_payment_id() {
    let mut nonce = vec![NONCE_PAYMENT_ID_TAG];
    nonce.extend_from_slice(&[9u8; 32]);
    let fields = vec![ExtraField::Nonce(nonce)];
    assert_eq!(find_payment_id(&fields), Some(PaymentId::Unencrypted([9; 32])));
  }

  #[test]
  fn finds_encrypted_payment_id() {
    let mut nonce = vec![NONCE_ENCRYPTED_PAYMENT_ID_TAG];
    nonce.extend_from_slice(&[4u8; 8]);
    let fields = vec![ExtraField::Nonce(nonce)];
    assert_eq!(find_payment_id(&fields), Some(PaymentId::Encrypted([4; 8])));
  }

  #[test]
  fn malformed_nonce_length_is_not_a_payment_id() {
    let fields = vec![ExtraField::Nonce(vec![NONCE_PAYMENT_ID_TAG, 1, 2, 3])];
    assert_eq!(find_payment_id(&fields), None);
  }
}
