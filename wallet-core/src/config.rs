//! Tunables the reference wallet hardcodes as constants; exposed here as configuration so an
//! embedder can adjust them (e.g. for a testnet with a different spendable age) without forking.

use crate::account::Address;

/// Tunables governing `refresh()`.
#[derive(Clone, Debug)]
pub struct RefreshConfig {
  /// Worker threads in the scan pipeline's ownership-check stage. `None` uses
  /// `std::thread::available_parallelism()`, falling back to 4.
  pub scanner_workers: Option<usize>,
  /// Number of `refresh` retries (rolling back via `detach_blockchain`) before a failure is
  /// surfaced to the caller.
  pub max_retries: u32,
}

impl RefreshConfig {
  /// Resolve `scanner_workers` to a concrete thread count.
  pub fn resolved_worker_count(&self) -> usize {
    self.scanner_workers.unwrap_or_else(|| {
      std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
    })
  }
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self { scanner_workers: None, max_retries: 3 }
  }
}

/// What to do with the dust residue a digit split produces for the change output.
#[derive(Clone, Debug)]
pub enum DustPolicy {
  /// Fold the dust into the transaction fee (it simply isn't paid out anywhere).
  AddToFee,
  /// Pay the dust to a specific address (historically, the CryptoNote developer fund address).
  PayTo(Address),
}

/// Tunables governing `transfer`/`create_transactions`.
#[derive(Clone, Debug)]
pub struct SendConfig {
  /// Outputs at or below this amount are dust: awkward to spend, excluded from normal selection
  /// unless `mixin == 0` forces their inclusion.
  pub dust_threshold: u64,
  /// Ring size (decoys per input, excluding the real output).
  pub mixin: u64,
  /// What to do with residual dust from decomposing the change amount.
  pub dust_policy: DustPolicy,
  /// Block delta added when evaluating a block-height unlock time
  /// (see [`crate::blockchain::is_spendtime_unlocked`]).
  pub allowed_block_delta: u64,
  /// Seconds delta added when evaluating a timestamp unlock time.
  pub allowed_seconds_delta: u64,
  /// Blocks of confirmation an output must accrue, beyond its own unlock time, before it's
  /// spendable. Also used when the wallet reports `unlocked_balance`.
  pub spendable_age: u64,
  /// Cap on `create_transactions`' automatic-split loop.
  pub max_split_attempts: u32,
  /// The reward zone used to compute the per-transaction size limit.
  pub block_granted_full_reward_zone: u64,
  /// Bytes reserved for the miner transaction when computing the size limit.
  pub miner_tx_blob_reserved_size: u64,
}

impl SendConfig {
  /// The maximum serialized transaction size this config permits:
  /// `block_granted_full_reward_zone * 1.25 - miner_tx_blob_reserved_size`.
  pub fn max_tx_size(&self) -> u64 {
    (self.block_granted_full_reward_zone * 5 / 4).saturating_sub(self.miner_tx_blob_reserved_size)
  }
}

impl Default for SendConfig {
  fn default() -> Self {
    Self {
      dust_threshold: 0,
      mixin: 0,
      dust_policy: DustPolicy::AddToFee,
      allowed_block_delta: 1,
      allowed_seconds_delta: 120,
      spendable_age: 10,
      max_split_attempts: 30,
      block_granted_full_reward_zone: 60_000,
      miner_tx_blob_reserved_size: 600,
    }
  }
}
