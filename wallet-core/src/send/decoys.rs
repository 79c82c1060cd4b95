//! Ring-decoy selection: `/getrandom_outs.bin`, sorted-ascending-skip-real-index.
//!
//! Deliberately not the teacher's gamma-distributed output selection — the light-wallet protocol
//! this core targets predates that decoy-selection scheme, and the daemon's `getrandom_outs.bin`
//! endpoint already returns candidates chosen however the *daemon* selects them; the wallet's only
//! job is to pick `mixin` of them and splice in the real output at its sorted position.

use crate::crypto::PublicKey;
use crate::error::{DaemonError, SendError};
use crate::output::OwnedOutput;
use crate::rpc::DaemonClient;

/// One input's ring: every member's `(global_index, one_time_key)`, sorted ascending by global
/// index, and the position the real spent output landed at after insertion.
pub struct InputRing {
  /// The owned output being spent.
  pub owned: OwnedOutput,
  /// Ring members in ascending global-index order, the real output included.
  pub members: Vec<(u64, PublicKey)>,
  /// Index into `members` of the real spent output.
  pub real_index: usize,
}

/// Fetch decoys for each selected output and assemble its ring.
///
/// With `mixin == 0` no RPC is made; each ring is the real output alone.
pub fn fetch_decoys(
  daemon: &dyn DaemonClient,
  selected: &[OwnedOutput],
  mixin: u64,
) -> Result<Vec<InputRing>, SendError> {
  if mixin == 0 {
    return Ok(
      selected
        .iter()
        .map(|owned| InputRing {
          owned: owned.clone(),
          members: vec![(owned.global_index, owned.public_key)],
          real_index: 0,
        })
        .collect(),
    );
  }

  let amounts: Vec<u64> = selected.iter().map(|o| o.amount).collect();
  let response = daemon
    .get_random_outs(&amounts, mixin as usize + 1)
    .map_err(|e| SendError::Daemon(DaemonError::Connection(e.to_string())))?;
  response.status.into_result().map_err(SendError::Daemon)?;

  if response.outs.len() != selected.len() {
    return Err(SendError::Daemon(DaemonError::MalformedResponse(format!(
      "getrandom_outs returned {} amount groups for {} requested amounts",
      response.outs.len(),
      selected.len()
    ))));
  }

  let mut rings = Vec::with_capacity(selected.len());
  for (owned, group) in selected.iter().zip(response.outs.iter()) {
    let mut candidates: Vec<(u64, PublicKey)> =
      group.outs.iter().map(|o| (o.global_amount_index, o.out_key)).collect();
    candidates.sort_by_key(|(index, _)| *index);
    candidates.retain(|(index, _)| *index != owned.global_index);
    if (candidates.len() as u64) < mixin {
      return Err(SendError::InsufficientMixins);
    }
    candidates.truncate(mixin as usize);

    let real_index = candidates.partition_point(|(index, _)| *index < owned.global_index);
    let mut members = candidates;
    members.insert(real_index, (owned.global_index, owned.public_key));

    rings.push(InputRing { owned: owned.clone(), members, real_index });
  }

  Ok(rings)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crypto::Hash;
  use crate::output::{KeyImage, OutputId};
  use crate::rpc::{GetRandomOutsResponse, RandomOutputEntry, RandomOutputsForAmount, Status};

  struct FakeDaemon {
    response: GetRandomOutsResponse,
  }

  impl DaemonClient for FakeDaemon {
    fn query_blocks(
      &self,
      _block_ids: &[Hash],
      _timestamp: u64,
    ) -> Result<crate::rpc::QueryBlocksResponse, crate::error::BoxError> {
      unimplemented!()
    }
    fn get_o_indexes(
      &self,
      _tx_hash: &Hash,
    ) -> Result<crate::rpc::GetOIndexesResponse, crate::error::BoxError> {
      unimplemented!()
    }
    fn get_random_outs(
      &self,
      _amounts: &[u64],
      _outs_count: usize,
    ) -> Result<GetRandomOutsResponse, crate::error::BoxError> {
      Ok(self.response.clone())
    }
    fn send_raw_transaction(
      &self,
      _tx_as_hex: &str,
    ) -> Result<crate::rpc::SendRawTransactionResponse, crate::error::BoxError> {
      unimplemented!()
    }
  }

  fn owned(global_index: u64) -> OwnedOutput {
    OwnedOutput {
      id: OutputId { tx_hash: Hash::from_bytes([1; 32]), local_index: 0 },
      global_index,
      block_height: 10,
      amount: 100,
      public_key: PublicKey::from_bytes([9; 32]),
      tx_public_key: PublicKey::from_bytes([8; 32]),
      key_image: KeyImage::from_bytes([1; 32]),
      internal_output_index: 0,
      spent: false,
      unlock_time: 0,
      is_own_change: false,
    }
  }

  #[test]
  fn mixin_zero_skips_rpc() {
    let daemon = FakeDaemon {
      response: GetRandomOutsResponse { status: Status::Ok, outs: vec![] },
    };
    let rings = fetch_decoys(&daemon, &[owned(5)], 0).unwrap();
    assert_eq!(rings[0].members, vec![(5, PublicKey::from_bytes([9; 32]))]);
  }

  #[test]
  fn real_output_spliced_at_sorted_position() {
    let candidates = vec![
      RandomOutputEntry { global_amount_index: 1, out_key: PublicKey::from_bytes([1; 32]) },
      RandomOutputEntry { global_amount_index: 5, out_key: PublicKey::from_bytes([9; 32]) },
      RandomOutputEntry { global_amount_index: 10, out_key: PublicKey::from_bytes([2; 32]) },
    ];
    let daemon = FakeDaemon {
      response: GetRandomOutsResponse {
        status: Status::Ok,
        outs: vec![RandomOutputsForAmount { amount: 100, outs: candidates }],
      },
    };
    let rings = fetch_decoys(&daemon, &[owned(5)], 2).unwrap();
    let ring = &rings[0];
    assert_eq!(ring.members.len(), 3);
    assert_eq!(ring.members[ring.real_index].0, 5);
    assert!(ring.members.windows(2).all(|w| w[0].0 < w[1].0));
  }

  #[test]
  fn insufficient_mixins_errors() {
    let daemon = FakeDaemon {
      response: GetRandomOutsResponse {
        status: Status::Ok,
        outs: vec![RandomOutputsForAmount { amount: 100, outs: vec![] }],
      },
    };
    let result = fetch_decoys(&daemon, &[owned(5)], 2);
    assert!(matches!(result, Err(SendError::InsufficientMixins)));
  }
}
