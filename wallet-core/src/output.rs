//! Owned outputs: the per-output records the wallet keeps once it recognizes a transaction
//! output as its own, and the key-image index used to recognize that an owned output was spent.

use std::collections::HashMap;

use zeroize::Zeroize;

use crate::crypto::{Hash, PublicKey};

/// A CryptoNote key image: the nullifier that appears in a transaction's inputs once an owned
/// output is spent. Two inputs sharing a key image are the same output spent twice.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Zeroize)]
pub struct KeyImage([u8; 32]);

impl KeyImage {
  /// Wrap raw bytes as a `KeyImage`.
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    KeyImage(bytes)
  }

  /// The raw bytes of this key image.
  pub const fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl core::fmt::Debug for KeyImage {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "KeyImage({})", hex::encode(self.0))
  }
}

/// The globally-unique locator for a transaction output: which transaction, and which position
/// within its `vout`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OutputId {
  /// The hash of the transaction this output belongs to.
  pub tx_hash: Hash,
  /// The output's position within that transaction's `vout`.
  pub local_index: usize,
}

/// An output this wallet recognizes as its own, tracked from the moment it's first scanned until
/// it's spent and the spend is confirmed.
///
/// Named `transfer_details` in the system this core's data model descends from; kept here under
/// a name that says what it holds rather than what subsystem first produced it.
#[derive(Clone, Debug)]
pub struct OwnedOutput {
  /// Which transaction and position this output is.
  pub id: OutputId,
  /// The output's global index, as assigned by the chain (used to fetch decoys and to report
  /// this output's own index when it's later spent as a decoy in someone else's ring).
  pub global_index: u64,
  /// The block height this output was included at.
  pub block_height: u64,
  /// The output's amount, in atomic units.
  pub amount: u64,
  /// The output's one-time public key, `P = Hs(derivation || index) * G + spend_public`.
  pub public_key: PublicKey,
  /// The owning transaction's ephemeral tx-public-key, retained so the ephemeral secret key (and
  /// thus a ring signature) can be re-derived at spend time without re-scanning.
  pub tx_public_key: PublicKey,
  /// This output's key image, computed once and cached (key-image generation requires the
  /// account's spend secret and so is pure but not free).
  pub key_image: KeyImage,
  /// The position of this output's amount within the transaction's `vout`, independent of
  /// `id.local_index` for ring-confidential transactions where outputs interleave by amount.
  pub internal_output_index: usize,
  /// Whether this output has been submitted as an input of a transaction this wallet sent.
  /// Cleared back to `false` if that transaction's containing block is later detached.
  pub spent: bool,
  /// This output's owning transaction's declared unlock time, exactly as carried on-chain
  /// (interpreted as a block height or a Unix timestamp by
  /// [`crate::blockchain::is_spendtime_unlocked`] depending on its magnitude). Kept raw, rather
  /// than resolved to a single height at scan time, because a timestamp-denominated unlock time's
  /// satisfaction depends on the current wall-clock time, which only the caller of `is_unlocked`
  /// knows.
  pub unlock_time: u64,
  /// Whether this output arrived via a transaction this wallet itself built and sent (affects
  /// change recognition and `received` notification suppression, per the scanner's semantics).
  pub is_own_change: bool,
}

impl OwnedOutput {
  /// Whether this output is usable as an input right now: not already spent, its own unlock time
  /// has passed (`tx.unlock_time` against `chain_height`/`now`, per
  /// [`crate::blockchain::is_spendtime_unlocked`]), and it has accrued `spendable_age` blocks of
  /// confirmation beyond the block it was received in.
  #[allow(clippy::too_many_arguments)]
  pub fn is_unlocked(
    &self,
    chain_height: u64,
    now: u64,
    allowed_block_delta: u64,
    allowed_seconds_delta: u64,
    spendable_age: u64,
  ) -> bool {
    if self.spent {
      return false;
    }
    if self.block_height.saturating_add(spendable_age) > chain_height {
      return false;
    }
    crate::blockchain::is_spendtime_unlocked(
      self.unlock_time,
      chain_height,
      now,
      allowed_block_delta,
      allowed_seconds_delta,
    )
  }

  /// Whether this output's amount falls below the dust threshold and so should only be spent
  /// when sweeping, never selected as a meaningful non-dust input.
  pub fn is_dust(&self, dust_threshold: u64) -> bool {
    self.amount <= dust_threshold
  }
}

/// The wallet's full set of owned outputs, indexed both by [`OutputId`] (insertion/lookup during
/// scanning) and by [`KeyImage`] (spend detection: given an input's key image, find the owned
/// output it spends, in O(1)).
#[derive(Clone, Debug, Default)]
pub struct OutputTable {
  outputs: Vec<OwnedOutput>,
  by_id: HashMap<OutputId, usize>,
  by_key_image: HashMap<KeyImage, usize>,
}

impl OutputTable {
  /// An empty table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a newly-recognized owned output.
  ///
  /// Returns `Err` carrying the new output back if its key image already indexes a different
  /// output — the scan pipeline should surface this as [`crate::error::ScanError::DuplicateKeyImage`],
  /// since two outputs sharing a key image implies corrupted wallet state or the same output
  /// scanned twice.
  pub fn insert(&mut self, output: OwnedOutput) -> Result<(), OwnedOutput> {
    if self.by_key_image.contains_key(&output.key_image) {
      return Err(output);
    }
    let index = self.outputs.len();
    self.by_id.insert(output.id, index);
    self.by_key_image.insert(output.key_image, index);
    self.outputs.push(output);
    Ok(())
  }

  /// Look up an owned output by its transaction/position id.
  pub fn get(&self, id: &OutputId) -> Option<&OwnedOutput> {
    self.by_id.get(id).map(|&i| &self.outputs[i])
  }

  /// Look up an owned output by the key image it would produce, e.g. to recognize a spend.
  pub fn get_by_key_image(&self, key_image: &KeyImage) -> Option<&OwnedOutput> {
    self.by_key_image.get(key_image).map(|&i| &self.outputs[i])
  }

  /// Mutably look up an owned output by the key image it would produce.
  pub fn get_by_key_image_mut(&mut self, key_image: &KeyImage) -> Option<&mut OwnedOutput> {
    if let Some(&i) = self.by_key_image.get(key_image) {
      Some(&mut self.outputs[i])
    } else {
      None
    }
  }

  /// Remove an owned output entirely, e.g. because the block it was received in was detached by
  /// a reorg. Returns the removed output, if present.
  pub fn remove(&mut self, id: &OutputId) -> Option<OwnedOutput> {
    let index = self.by_id.remove(id)?;
    let removed = self.outputs.swap_remove(index);
    self.by_key_image.remove(&removed.key_image);
    if index < self.outputs.len() {
      let moved = &self.outputs[index];
      self.by_id.insert(moved.id, index);
      self.by_key_image.insert(moved.key_image, index);
    }
    Some(removed)
  }

  /// Iterate over every owned output.
  pub fn iter(&self) -> impl Iterator<Item = &OwnedOutput> {
    self.outputs.iter()
  }

  /// Iterate mutably over every owned output.
  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OwnedOutput> {
    self.outputs.iter_mut()
  }

  /// The number of outputs tracked, spent or not.
  pub fn len(&self) -> usize {
    self.outputs.len()
  }

  /// Whether no outputs are tracked.
  pub fn is_empty(&self) -> bool {
    self.outputs.is_empty()
  }

  /// The total balance across all tracked outputs, spent outputs included.
  pub fn total_balance(&self) -> u64 {
    self.outputs.iter().filter(|o| !o.spent).map(|o| o.amount).sum()
  }

  /// The balance available to spend right now: unspent, past its own unlock time, and past the
  /// spendable-age confirmation buffer.
  #[allow(clippy::too_many_arguments)]
  pub fn unlocked_balance(
    &self,
    chain_height: u64,
    now: u64,
    allowed_block_delta: u64,
    allowed_seconds_delta: u64,
    spendable_age: u64,
  ) -> u64 {
    self
      .outputs
      .iter()
      .filter(|o| {
        o.is_unlocked(chain_height, now, allowed_block_delta, allowed_seconds_delta, spendable_age)
      })
      .map(|o| o.amount)
      .sum()
  }
}
