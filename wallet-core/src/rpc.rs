//! Typed shapes for the daemon endpoints this wallet depends on, and the [`DaemonClient`]
//! contract that actually performs the request.
//!
//! The transport (HTTP, connection pooling, retries below the "is it `BUSY`" level) is explicitly
//! out of scope — an embedder supplies a `DaemonClient` wired to whatever HTTP client it likes.
//! This module only fixes the request/response shapes and the binary/JSON split the daemon uses.

use crate::crypto::Hash;

/// The daemon's status string, common to every response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
  /// The request succeeded.
  Ok,
  /// The daemon is busy (e.g. mid-reorg); callers should back off and retry.
  Busy,
  /// Any other status string, carried verbatim as an error message.
  Error(String),
}

impl Status {
  /// Parse a status string as returned on the wire.
  pub fn parse(raw: &str) -> Self {
    match raw {
      "OK" => Status::Ok,
      "BUSY" => Status::Busy,
      other => Status::Error(other.to_string()),
    }
  }

  /// Convert to a [`crate::error::DaemonError`], or `Ok(())` if the status was `OK`.
  pub fn into_result(self) -> Result<(), crate::error::DaemonError> {
    match self {
      Status::Ok => Ok(()),
      Status::Busy => Err(crate::error::DaemonError::Busy),
      Status::Error(message) => Err(crate::error::DaemonError::Status(message)),
    }
  }
}

/// One item of a [`QueryBlocksResponse`]: a block the daemon believes belongs at a given height.
#[derive(Clone, Debug)]
pub struct QueryBlocksItem {
  /// The block's id.
  pub block_id: Hash,
  /// The block's raw blob, present whenever the daemon includes a full block (as opposed to just
  /// confirming an id already known to match).
  pub block_blob: Option<Vec<u8>>,
  /// Blobs of every non-coinbase transaction in the block, present iff `block_blob` is.
  pub tx_blobs: Vec<Vec<u8>>,
}

/// Response to `/queryblocks.bin`.
#[derive(Clone, Debug)]
pub struct QueryBlocksResponse {
  /// The daemon's status string.
  pub status: Status,
  /// The height of `items[0]`.
  pub start_height: u64,
  /// The the daemon's current height, ahead of `start_height + items.len()` when more remain to
  /// be fetched.
  pub current_height: u64,
  /// The items returned, in ascending height order.
  pub items: Vec<QueryBlocksItem>,
}

/// Response to `/get_o_indexes.bin`: the chain-assigned global index of each output of a
/// transaction, in `vout` order.
#[derive(Clone, Debug)]
pub struct GetOIndexesResponse {
  /// The daemon's status string.
  pub status: Status,
  /// Global output indices, one per `vout` entry.
  pub o_indexes: Vec<u64>,
}

/// One candidate ring member returned for a requested amount.
#[derive(Clone, Copy, Debug)]
pub struct RandomOutputEntry {
  /// The candidate's chain-assigned global index.
  pub global_amount_index: u64,
  /// The candidate's one-time public key.
  pub out_key: crate::crypto::PublicKey,
}

/// Candidates returned for one requested amount.
#[derive(Clone, Debug)]
pub struct RandomOutputsForAmount {
  /// The amount these candidates were requested for.
  pub amount: u64,
  /// The candidates themselves.
  pub outs: Vec<RandomOutputEntry>,
}

/// Response to `/getrandom_outs.bin`.
#[derive(Clone, Debug)]
pub struct GetRandomOutsResponse {
  /// The daemon's status string.
  pub status: Status,
  /// Candidates, one group per requested amount, in request order.
  pub outs: Vec<RandomOutputsForAmount>,
}

/// Response to `/sendrawtransaction`.
#[derive(Clone, Debug)]
pub struct SendRawTransactionResponse {
  /// The daemon's status string.
  pub status: Status,
}

/// The JSON body `/sendrawtransaction` expects, matching the daemon's documented surface. An
/// embedder's transport serializes this; this crate never performs the POST itself.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SendRawTransactionRequest<'a> {
  /// The hex-encoded transaction blob.
  pub tx_as_hex: &'a str,
  /// Whether to skip relaying to other nodes after accepting it into the pool.
  pub do_not_relay: bool,
}

impl<'a> SendRawTransactionRequest<'a> {
  /// Serialize to the JSON body the daemon expects.
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).expect("SendRawTransactionRequest always serializes")
  }
}

#[derive(Debug, serde::Deserialize)]
struct SendRawTransactionWire {
  status: String,
}

impl SendRawTransactionResponse {
  /// Parse a `/sendrawtransaction` JSON response body.
  pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
    let wire: SendRawTransactionWire = serde_json::from_str(body)?;
    Ok(Self { status: Status::parse(&wire.status) })
  }
}

/// The four daemon endpoints this wallet depends on.
///
/// `query_blocks` and `get_o_indexes` and `get_random_outs` are epee-binary-encoded
/// (`wallet_epee` decodes the responses; an embedder's transport still owns the HTTP POST and the
/// epee request encoding, which this crate does not implement — see the crate's Non-goals);
/// `send_raw_transaction` is plain JSON.
pub trait DaemonClient: Send + Sync {
  /// `/queryblocks.bin`.
  fn query_blocks(
    &self,
    block_ids: &[Hash],
    timestamp: u64,
  ) -> Result<QueryBlocksResponse, crate::error::BoxError>;

  /// `/get_o_indexes.bin`.
  fn get_o_indexes(&self, tx_hash: &Hash) -> Result<GetOIndexesResponse, crate::error::BoxError>;

  /// `/getrandom_outs.bin`.
  fn get_random_outs(
    &self,
    amounts: &[u64],
    outs_count: usize,
  ) -> Result<GetRandomOutsResponse, crate::error::BoxError>;

  /// `/sendrawtransaction`.
  fn send_raw_transaction(
    &self,
    tx_as_hex: &str,
  ) -> Result<SendRawTransactionResponse, crate::error::BoxError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_parses_known_strings() {
    assert_eq!(Status::parse("OK"), Status::Ok);
    assert_eq!(Status::parse("BUSY"), Status::Busy);
    assert_eq!(Status::parse("weird"), Status::Error("weird".to_string()));
  }

  #[test]
  fn send_raw_transaction_request_serializes_expected_fields() {
    let request = SendRawTransactionRequest { tx_as_hex: "deadbeef", do_not_relay: false };
    assert_eq!(request.to_json(), r#"{"tx_as_hex":"deadbeef","do_not_relay":false}"#);
  }

  #[test]
  fn send_raw_transaction_response_parses_status() {
    let response = SendRawTransactionResponse::from_json(r#"{"status":"OK"}"#).unwrap();
    assert_eq!(response.status, Status::Ok);
  }

  #[test]
  fn status_into_result() {
    assert!(Status::Ok.into_result().is_ok());
    assert!(matches!(Status::Busy.into_result(), Err(crate::error::DaemonError::Busy)));
    assert!(matches!(
      Status::Error("x".into()).into_result(),
      Err(crate::error::DaemonError::Status(m)) if m == "x"
    ));
  }
}
