//! The CryptoNote primitives this core depends on, modelled as a contract.
//!
//! Ring-signature generation, one-time key derivation, the chacha8 keyed-stream cipher,
//! cryptographic hashing, and amount-into-digits decomposition are *called* by the wallet core but
//! are not consensus logic this crate owns — they're supplied by whatever CryptoNote primitives
//! library the embedder links against (the same separation the teacher draws between its
//! `monero-oxide` primitives crate and its `wallet` crate). [`CryptoNotePrimitives`] is that
//! boundary: every method the scan pipeline, transaction builder, and persistence layer need from
//! "the crypto library" is declared here, with no implementation, so this crate can be exercised
//! against a deterministic fake in tests without linking real elliptic-curve code.
//!
//! The one exception is amount-into-digit decomposition ([`CryptoNotePrimitives::decompose_amount`]):
//! it's listed among the contracted primitives because the original groups it with
//! `cryptonote_format_utils`, but it's pure integer arithmetic, so a correct default is provided
//! and callers need not override it.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte Keccak/CryptoNote-style hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Zeroize)]
pub struct Hash([u8; 32]);

impl Hash {
  /// Wrap raw bytes as a `Hash`.
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    Hash(bytes)
  }

  /// The raw bytes of this hash.
  pub const fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl core::fmt::Debug for Hash {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "Hash({})", hex::encode(self.0))
  }
}

/// An Ed25519-style public key, opaque to this crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Zeroize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
  /// Wrap raw bytes as a `PublicKey`. This does not validate the point is on-curve; that's a
  /// primitive-library concern.
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    PublicKey(bytes)
  }

  /// The raw bytes of this key.
  pub const fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl core::fmt::Debug for PublicKey {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "PublicKey({})", hex::encode(self.0))
  }
}

/// An Ed25519-style secret scalar. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
  /// Wrap raw bytes as a `SecretKey`.
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    SecretKey(bytes)
  }

  /// The raw bytes of this key.
  pub const fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl core::fmt::Debug for SecretKey {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_str("SecretKey(..)")
  }
}

/// A one-time key derivation, `8 * view_secret * tx_public_key` (or the spend-side equivalent).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyDerivation([u8; 32]);

impl KeyDerivation {
  /// Wrap raw bytes as a `KeyDerivation`.
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    KeyDerivation(bytes)
  }

  /// The raw bytes of this derivation.
  pub const fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

/// The chacha8 key derived from a wallet password, used to seal the keys-file.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Chacha8Key([u8; 32]);

impl Chacha8Key {
  /// Wrap raw bytes as a `Chacha8Key`.
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    Chacha8Key(bytes)
  }

  /// The raw bytes of this key.
  pub const fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

/// An 8-byte chacha8 IV, as used by the keys-file format.
pub type Chacha8Iv = [u8; 8];

/// A CryptoNote ring signature over a single input, opaque to this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct RingSignature(pub Vec<u8>);

/// The CryptoNote primitives this core depends on but does not implement.
///
/// Implementors wrap whatever real elliptic-curve/hash library the embedding application links.
/// Every method here is a pure function of its arguments: no network or disk access, no locking.
pub trait CryptoNotePrimitives: Send + Sync {
  /// `keccak256(data)`.
  fn keccak256(&self, data: &[u8]) -> Hash;

  /// `secret_to_public(secret) == secret * G`.
  fn secret_to_public(&self, secret: &SecretKey) -> PublicKey;

  /// Generate a fresh random keypair, used once per constructed transaction as its ephemeral
  /// tx keypair (the secret is used to derive every output's one-time key; the public half is
  /// published in `tx_extra` so recipients can do the same derivation from their side).
  fn generate_keypair(&self) -> (SecretKey, PublicKey);

  /// `generate_key_derivation(tx_public_key, view_secret) == 8 * view_secret * tx_public_key`.
  fn generate_key_derivation(
    &self,
    tx_public_key: &PublicKey,
    view_secret: &SecretKey,
  ) -> KeyDerivation;

  /// Derive the ephemeral public key for output index `output_index` under `derivation`, offset
  /// by the account's spend public key.
  fn derive_public_key(
    &self,
    derivation: &KeyDerivation,
    output_index: usize,
    base: &PublicKey,
  ) -> PublicKey;

  /// Derive the ephemeral secret key paired with [`derive_public_key`](Self::derive_public_key).
  fn derive_secret_key(
    &self,
    derivation: &KeyDerivation,
    output_index: usize,
    base: &SecretKey,
  ) -> SecretKey;

  /// Compute the key image for an owned output's ephemeral secret key.
  fn generate_key_image(&self, ephemeral_secret: &SecretKey) -> crate::output::KeyImage;

  /// Derive the slow, password-stretching chacha8 key used to seal the keys-file.
  fn derive_chacha8_key(&self, password: &[u8]) -> Chacha8Key;

  /// Encrypt (or decrypt; chacha8 is a symmetric stream cipher) `data` in place.
  fn chacha8_xor(&self, key: &Chacha8Key, iv: &Chacha8Iv, data: &mut [u8]);

  /// Generate a CryptoNote ring signature proving knowledge of the secret key of one member of
  /// `ring`, at `secret_index`, over `prefix_hash`, without revealing which.
  fn generate_ring_signature(
    &self,
    prefix_hash: &Hash,
    key_image: &crate::output::KeyImage,
    ring: &[PublicKey],
    secret: &SecretKey,
    secret_index: usize,
  ) -> RingSignature;

  /// Decompose `amount` into canonical base-10 "digit" chunks (a single nonzero digit times a
  /// power of ten), as used by [`digit_split_strategy`](crate::send::digit_split_strategy).
  ///
  /// Pure arithmetic; a correct default is provided so implementors need not override it.
  fn decompose_amount(&self, amount: u64) -> Vec<u64> {
    decompose_amount_into_digits(amount)
  }
}

/// The default, pure-arithmetic implementation of [`CryptoNotePrimitives::decompose_amount`].
pub fn decompose_amount_into_digits(mut amount: u64) -> Vec<u64> {
  let mut digits = Vec::new();
  let mut place = 1u64;
  while amount > 0 {
    let digit = amount % 10;
    if digit != 0 {
      digits.push(digit * place);
    }
    amount /= 10;
    place = place.saturating_mul(10);
  }
  digits
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decompose_sums_to_original() {
    for amount in [0u64, 1, 9, 10, 42, 1234567890, u64::MAX] {
      let digits = decompose_amount_into_digits(amount);
      assert_eq!(digits.iter().sum::<u64>(), amount);
      for d in digits {
        assert!(d > 0);
      }
    }
  }

  #[test]
  fn decompose_zero_is_empty() {
    assert!(decompose_amount_into_digits(0).is_empty());
  }
}
