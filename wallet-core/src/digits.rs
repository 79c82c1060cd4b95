//! Splitting destination amounts into canonical base-10 "digit" denominations, per
//! `digit_split_strategy`, and the simpler `null_split_strategy` that leaves amounts untouched.

use crate::account::Address;
use crate::crypto::CryptoNotePrimitives;

/// One destination of a constructed transaction: an address and an amount.
#[derive(Clone, Copy, Debug)]
pub struct Destination {
  /// The recipient address.
  pub address: Address,
  /// The amount paid.
  pub amount: u64,
}

/// Leave destinations untouched, appending the change output if non-zero. Used when amount
/// decomposition isn't wanted (e.g. ring-confidential amounts, where digit denomination no
/// longer serves an unlinkability purpose).
pub fn null_split_strategy(dsts: &[Destination], change: Option<Destination>) -> (Vec<Destination>, u64) {
  let mut out = dsts.to_vec();
  if let Some(change) = change {
    if change.amount > 0 {
      out.push(change);
    }
  }
  (out, 0)
}

/// Decompose every destination's amount into single-nonzero-digit chunks. User destinations keep
/// every chunk, however small, as its own output (the recipient must receive exactly what they
/// were promised). The change output's small chunks are instead summed into a single dust
/// residue and handed back to the caller, which applies the configured [`crate::config::DustPolicy`].
pub fn digit_split_strategy(
  primitives: &dyn CryptoNotePrimitives,
  dsts: &[Destination],
  change: Option<Destination>,
  dust_threshold: u64,
) -> (Vec<Destination>, u64) {
  let mut out = Vec::new();
  for dst in dsts {
    for chunk in primitives.decompose_amount(dst.amount) {
      out.push(Destination { address: dst.address, amount: chunk });
    }
  }

  let mut dust = 0u64;
  if let Some(change) = change {
    for chunk in primitives.decompose_amount(change.amount) {
      if chunk > dust_threshold {
        out.push(Destination { address: change.address, amount: chunk });
      } else {
        dust += chunk;
      }
    }
  }

  (out, dust)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crypto::{
    Chacha8Iv, Chacha8Key, Hash, KeyDerivation, PublicKey, RingSignature, SecretKey,
  };
  use crate::output::KeyImage;

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
    fn generate_key_derivation(&self, _t: &PublicKey, _v: &SecretKey) -> KeyDerivation {
      KeyDerivation::from_bytes([0; 32])
    }
    fn derive_public_key(&self, _d: &KeyDerivation, _i: usize, base: &PublicKey) -> PublicKey {
      *base
    }
    fn derive_secret_key(&self, _d: &KeyDerivation, _i: usize, base: &SecretKey) -> SecretKey {
      base.clone()
    }
    fn generate_key_image(&self, s: &SecretKey) -> KeyImage {
      KeyImage::from_bytes(*s.as_bytes())
    }
    fn derive_chacha8_key(&self, _p: &[u8]) -> Chacha8Key {
      Chacha8Key::from_bytes([0; 32])
    }
    fn chacha8_xor(&self, _k: &Chacha8Key, _iv: &Chacha8Iv, _d: &mut [u8]) {}
    fn generate_ring_signature(
      &self,
      _p: &Hash,
      _k: &KeyImage,
      _r: &[PublicKey],
      _s: &SecretKey,
      _i: usize,
    ) -> RingSignature {
      RingSignature(vec![])
    }
  }

  fn addr() -> Address {
    Address { spend_public: PublicKey::from_bytes([1; 32]), view_public: PublicKey::from_bytes([2; 32]) }
  }

  #[test]
  fn user_destination_chunks_survive_as_dust() {
    let primitives = FakePrimitives;
    let dsts = vec![Destination { address: addr(), amount: 7 }];
    let (out, dust) = digit_split_strategy(&primitives, &dsts, None, 100);
    assert_eq!(out.iter().map(|d| d.amount).sum::<u64>(), 7);
    assert_eq!(dust, 0);
  }

  #[test]
  fn change_dust_is_aggregated_not_output() {
    let primitives = FakePrimitives;
    let change = Destination { address: addr(), amount: 7 };
    let (out, dust) = digit_split_strategy(&primitives, &[], Some(change), 100);
    assert!(out.is_empty());
    assert_eq!(dust, 7);
  }

  #[test]
  fn change_above_threshold_becomes_outputs() {
    let primitives = FakePrimitives;
    let change = Destination { address: addr(), amount: 1234 };
    let (out, dust) = digit_split_strategy(&primitives, &[], Some(change), 100);
    // decompose(1234) = [4, 30, 200, 1000]; only chunks above the threshold become outputs.
    assert_eq!(out.iter().map(|d| d.amount).sum::<u64>(), 1200);
    assert_eq!(dust, 34);
  }

  #[test]
  fn null_strategy_passes_through() {
    let dsts = vec![Destination { address: addr(), amount: 50 }];
    let change = Destination { address: addr(), amount: 5 };
    let (out, dust) = null_split_strategy(&dsts, Some(change));
    assert_eq!(out.len(), 2);
    assert_eq!(dust, 0);
  }

  proptest::proptest! {
    #[test]
    fn digit_split_recombines_to_original_total(
      dst_amount in 0u64 .. 1_000_000_000,
      change_amount in 0u64 .. 1_000_000_000,
      dust_threshold in 0u64 .. 1000,
    ) {
      let primitives = FakePrimitives;
      let dsts = vec![Destination { address: addr(), amount: dst_amount }];
      let change = Destination { address: addr(), amount: change_amount };
      let (out, dust) = digit_split_strategy(&primitives, &dsts, Some(change), dust_threshold);
      let total: u64 = out.iter().map(|d| d.amount).sum::<u64>() + dust;
      proptest::prop_assert_eq!(total, dst_amount + change_amount);
    }
  }
}
