//! Account keys and addresses.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{CryptoNotePrimitives, PublicKey, SecretKey};

/// The four keys that make up a CryptoNote account: a spend keypair (controls funds) and a view
/// keypair (recognizes incoming funds). A watch-only wallet holds the view secret but not the
/// spend secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccountKeys {
  #[zeroize(skip)]
  spend_public: PublicKey,
  spend_secret: Option<SecretKey>,
  #[zeroize(skip)]
  view_public: PublicKey,
  view_secret: SecretKey,
}

impl core::fmt::Debug for AccountKeys {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("AccountKeys")
      .field("spend_public", &self.spend_public)
      .field("view_public", &self.view_public)
      .field("watch_only", &self.spend_secret.is_none())
      .finish()
  }
}

impl AccountKeys {
  /// Construct a full-spend account from its secret keys, deriving and checking both public
  /// keys against `primitives`.
  pub fn from_secrets(
    primitives: &dyn CryptoNotePrimitives,
    spend_secret: SecretKey,
    view_secret: SecretKey,
  ) -> Self {
    let spend_public = primitives.secret_to_public(&spend_secret);
    let view_public = primitives.secret_to_public(&view_secret);
    Self { spend_public, spend_secret: Some(spend_secret), view_public, view_secret }
  }

  /// Construct a watch-only account: no spend secret, only the ability to recognize incoming
  /// funds and compute balances.
  pub fn watch_only(spend_public: PublicKey, view_secret: SecretKey, view_public: PublicKey) -> Self {
    Self { spend_public, spend_secret: None, view_public, view_secret }
  }

  /// This account's public address keys.
  pub fn address(&self) -> Address {
    Address { spend_public: self.spend_public, view_public: self.view_public }
  }

  /// The spend secret key, if this is not a watch-only account.
  pub fn spend_secret(&self) -> Option<&SecretKey> {
    self.spend_secret.as_ref()
  }

  /// The view secret key. Always present; view-only recognition is the minimum capability an
  /// `AccountKeys` provides.
  pub fn view_secret(&self) -> &SecretKey {
    &self.view_secret
  }

  /// The spend public key.
  pub fn spend_public(&self) -> &PublicKey {
    &self.spend_public
  }

  /// The view public key.
  pub fn view_public(&self) -> &PublicKey {
    &self.view_public
  }

  /// Whether this account lacks a spend secret and so can only observe, not send.
  pub fn is_watch_only(&self) -> bool {
    self.spend_secret.is_none()
  }
}

/// A CryptoNote public address: the two public keys a sender needs to construct an output paying
/// this account, with no subaddress/integrated-address support (out of scope; see the crate's
/// Non-goals).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
  /// The account's spend public key.
  pub spend_public: PublicKey,
  /// The account's view public key.
  pub view_public: PublicKey,
}

impl core::fmt::Debug for Address {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(
      f,
      "Address({}{})",
      hex::encode(self.spend_public.as_bytes()),
      hex::encode(self.view_public.as_bytes())
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct FakePrimitives;
  impl CryptoNotePrimitives for FakePrimitives {
    fn keccak256(&self, data: &[u8]) -> crate::crypto::Hash {
      let mut out = [0u8; 32];
      for (i, b) in data.iter().enumerate() {
        out[i % 32] ^= *b;
      }
      crate::crypto::Hash::from_bytes(out)
    }
    fn secret_to_public(&self, secret: &SecretKey) -> PublicKey {
      PublicKey::from_bytes(*secret.as_bytes())
    }
    fn generate_keypair(&self) -> (SecretKey, PublicKey) {
      let secret = SecretKey::from_bytes([0; 32]);
      let public = self.secret_to_public(&secret);
      (secret, public)
    }
    fn generate_key_derivation(
      &self,
      _tx_public_key: &PublicKey,
      _view_secret: &SecretKey,
    ) -> crate::crypto::KeyDerivation {
      crate::crypto::KeyDerivation::from_bytes([0; 32])
    }
    fn derive_public_key(
      &self,
      _derivation: &crate::crypto::KeyDerivation,
      _output_index: usize,
      base: &PublicKey,
    ) -> PublicKey {
      *base
    }
    fn derive_secret_key(
      &self,
      _derivation: &crate::crypto::KeyDerivation,
      _output_index: usize,
      base: &SecretKey,
    ) -> SecretKey {
      base.clone()
    }
    fn generate_key_image(&self, ephemeral_secret: &SecretKey) -> crate::output::KeyImage {
      crate::output::KeyImage::from_bytes(*ephemeral_secret.as_bytes())
    }
    fn derive_chacha8_key(&self, _password: &[u8]) -> crate::crypto::Chacha8Key {
      crate::crypto::Chacha8Key::from_bytes([0; 32])
    }
    fn chacha8_xor(
      &self,
      _key: &crate::crypto::Chacha8Key,
      _iv: &crate::crypto::Chacha8Iv,
      _data: &mut [u8],
    ) {
    }
    fn generate_ring_signature(
      &self,
      _prefix_hash: &crate::crypto::Hash,
      _key_image: &crate::output::KeyImage,
      _ring: &[PublicKey],
      _secret: &SecretKey,
      _secret_index: usize,
    ) -> crate::crypto::RingSignature {
      crate::crypto::RingSignature(vec![])
    }
  }

  #[test]
  fn from_secrets_derives_public_keys() {
    let primitives = FakePrimitives;
    let account = AccountKeys::from_secrets(
      &primitives,
      SecretKey::from_bytes([1; 32]),
      SecretKey::from_bytes([2; 32]),
    );
    assert_eq!(account.spend_public().as_bytes(), &[1; 32]);
    assert_eq!(account.view_public().as_bytes(), &[2; 32]);
    assert!(!account.is_watch_only());
  }

  #[test]
  fn watch_only_has_no_spend_secret() {
    let account = AccountKeys::watch_only(
      PublicKey::from_bytes([1; 32]),
      SecretKey::from_bytes([2; 32]),
      PublicKey::from_bytes([3; 32]),
    );
    assert!(account.is_watch_only());
    assert!(account.spend_secret().is_none());
  }
}
