//! Decoding of the epee-binary daemon endpoints (`query_blocks`, `get_o_indexes`,
//! `get_random_outs`) into this crate's typed [`crate::rpc`] shapes, using `wallet_epee`.
//!
//! An embedder's transport still owns the HTTP POST and the epee *request* encoding (small and
//! endpoint-specific enough that it doesn't warrant a shared decoder, per [`crate::rpc`]'s doc
//! comment); this module only turns the raw response bytes the transport gets back into something
//! [`crate::scan`] and [`crate::send::decoys`] can use. `send_raw_transaction` is plain JSON and is
//! already handled by [`crate::rpc::SendRawTransactionResponse::from_json`].
//!
//! Field names below are this wallet's own wire contract, not a transcription of any particular
//! daemon's internal RPC schema; an embedder's transport is expected to speak whatever epee layout
//! its daemon actually uses and adapt field names here to match.

use wallet_epee::{Epee, EpeeEntry, EpeeError};

use crate::crypto::{Hash, PublicKey};
use crate::error::{BoxError, DaemonError};
use crate::rpc::{
  GetOIndexesResponse, GetRandomOutsResponse, QueryBlocksItem, QueryBlocksResponse,
  RandomOutputEntry, RandomOutputsForAmount, Status,
};

fn box_err(e: EpeeError) -> BoxError {
  Box::new(DaemonError::MalformedResponse(format!("{e:?}")))
}

fn read_hash<'d>(entry: EpeeEntry<'d, '_, &'d [u8]>) -> Result<Hash, EpeeError> {
  let bytes = entry.to_fixed_len_str(32)?.consume();
  let mut out = [0u8; 32];
  out.copy_from_slice(bytes);
  Ok(Hash::from_bytes(out))
}

fn read_public_key<'d>(entry: EpeeEntry<'d, '_, &'d [u8]>) -> Result<PublicKey, EpeeError> {
  let bytes = entry.to_fixed_len_str(32)?.consume();
  let mut out = [0u8; 32];
  out.copy_from_slice(bytes);
  Ok(PublicKey::from_bytes(out))
}

fn read_bytes<'d>(entry: EpeeEntry<'d, '_, &'d [u8]>) -> Result<Vec<u8>, EpeeError> {
  Ok(entry.to_str()?.consume().to_vec())
}

fn read_status<'d>(entry: EpeeEntry<'d, '_, &'d [u8]>) -> Result<Status, EpeeError> {
  let bytes = entry.to_str()?.consume().to_vec();
  Ok(Status::parse(&String::from_utf8_lossy(&bytes)))
}

fn decode_query_blocks_item<'d>(
  entry: EpeeEntry<'d, '_, &'d [u8]>,
) -> Result<QueryBlocksItem, EpeeError> {
  let mut fields = entry.fields()?;
  let mut block_id = None;
  let mut block_blob = None;
  let mut tx_blobs = Vec::new();

  while let Some(field) = fields.next() {
    let (key, value) = field?;
    match key.consume() {
      b"block_id" => block_id = Some(read_hash(value)?),
      b"block_blob" => block_blob = Some(read_bytes(value)?),
      b"tx_blobs" => {
        let mut iter = value.iterate()?;
        while let Some(tx) = iter.next() {
          tx_blobs.push(read_bytes(tx?)?);
        }
      }
      _ => {}
    }
  }

  Ok(QueryBlocksItem { block_id: block_id.ok_or_else(|| EpeeError::InternalError)?, block_blob, tx_blobs })
}

/// Decode a `query_blocks` response blob.
pub fn decode_query_blocks_response(data: &[u8]) -> Result<QueryBlocksResponse, BoxError> {
  let mut epee = Epee::new(data).map_err(box_err)?;
  let mut fields = epee.entry().map_err(box_err)?.fields().map_err(box_err)?;

  let mut status = Status::Error("missing status field".to_string());
  let mut start_height = 0u64;
  let mut current_height = 0u64;
  let mut items = Vec::new();

  while let Some(field) = fields.next() {
    let (key, value) = field.map_err(box_err)?;
    match key.consume() {
      b"status" => status = read_status(value).map_err(box_err)?,
      b"start_height" => start_height = value.to_u64().map_err(box_err)?,
      b"current_height" => current_height = value.to_u64().map_err(box_err)?,
      b"items" => {
        let mut iter = value.iterate().map_err(box_err)?;
        while let Some(item) = iter.next() {
          items.push(decode_query_blocks_item(item.map_err(box_err)?).map_err(box_err)?);
        }
      }
      _ => {}
    }
  }

  Ok(QueryBlocksResponse { status, start_height, current_height, items })
}

/// Decode a `get_o_indexes` response blob.
pub fn decode_get_o_indexes_response(data: &[u8]) -> Result<GetOIndexesResponse, BoxError> {
  let mut epee = Epee::new(data).map_err(box_err)?;
  let mut fields = epee.entry().map_err(box_err)?.fields().map_err(box_err)?;

  let mut status = Status::Error("missing status field".to_string());
  let mut o_indexes = Vec::new();

  while let Some(field) = fields.next() {
    let (key, value) = field.map_err(box_err)?;
    match key.consume() {
      b"status" => status = read_status(value).map_err(box_err)?,
      b"o_indexes" => {
        let mut iter = value.iterate().map_err(box_err)?;
        while let Some(entry) = iter.next() {
          o_indexes.push(entry.map_err(box_err)?.to_u64().map_err(box_err)?);
        }
      }
      _ => {}
    }
  }

  Ok(GetOIndexesResponse { status, o_indexes })
}

fn decode_random_output_entry<'d>(
  entry: EpeeEntry<'d, '_, &'d [u8]>,
) -> Result<RandomOutputEntry, EpeeError> {
  let mut fields = entry.fields()?;
  let mut global_amount_index = 0u64;
  let mut out_key = None;

  while let Some(field) = fields.next() {
    let (key, value) = field?;
    match key.consume() {
      b"global_amount_index" => global_amount_index = value.to_u64()?,
      b"out_key" => out_key = Some(read_public_key(value)?),
      _ => {}
    }
  }

  Ok(RandomOutputEntry { global_amount_index, out_key: out_key.ok_or_else(|| EpeeError::InternalError)? })
}

fn decode_random_outputs_for_amount<'d>(
  entry: EpeeEntry<'d, '_, &'d [u8]>,
) -> Result<RandomOutputsForAmount, EpeeError> {
  let mut fields = entry.fields()?;
  let mut amount = 0u64;
  let mut outs = Vec::new();

  while let Some(field) = fields.next() {
    let (key, value) = field?;
    match key.consume() {
      b"amount" => amount = value.to_u64()?,
      b"outs" => {
        let mut iter = value.iterate()?;
        while let Some(e) = iter.next() {
          outs.push(decode_random_output_entry(e?)?);
        }
      }
      _ => {}
    }
  }

  Ok(RandomOutputsForAmount { amount, outs })
}

/// Decode a `get_random_outs` response blob.
pub fn decode_get_random_outs_response(data: &[u8]) -> Result<GetRandomOutsResponse, BoxError> {
  let mut epee = Epee::new(data).map_err(box_err)?;
  let mut fields = epee.entry().map_err(box_err)?.fields().map_err(box_err)?;

  let mut status = Status::Error("missing status field".to_string());
  let mut outs = Vec::new();

  while let Some(field) = fields.next() {
    let (key, value) = field.map_err(box_err)?;
    match key.consume() {
      b"status" => status = read_status(value).map_err(box_err)?,
      b"outs" => {
        let mut iter = value.iterate().map_err(box_err)?;
        while let Some(group) = iter.next() {
          outs.push(decode_random_outputs_for_amount(group.map_err(box_err)?).map_err(box_err)?);
        }
      }
      _ => {}
    }
  }

  Ok(GetRandomOutsResponse { status, outs })
}

#[cfg(test)]
mod tests {
  use super::*;

  // Hand-assembled epee blob: header, version, one object with `status: "OK"` and an empty
  // `o_indexes` array of uint64.
  #[rustfmt::skip]
  const GET_O_INDEXES_OK_EMPTY: &[u8] = &[
    0x01, 0x11, 0x01, 0x01, 0x01, 0x01, 0x02, 0x01, // header
    0x01,                                            // version
    0x08,                                            // field count = 2
    0x06, b's', b't', b'a', b't', b'u', b's',        // key "status"
    0x0A,                                             // type: String
    0x08, b'O', b'K',                                 // value: "OK"
    0x09, b'o', b'_', b'i', b'n', b'd', b'e', b'x', b'e', b's', // key "o_indexes"
    0x85,                                             // type: Uint64 | array bit
    0x00,                                             // array len = 0
  ];

  #[test]
  fn decodes_status_and_empty_array() {
    let response = decode_get_o_indexes_response(GET_O_INDEXES_OK_EMPTY).unwrap();
    assert_eq!(response.status, Status::Ok);
    assert!(response.o_indexes.is_empty());
  }

  #[test]
  fn truncated_blob_errors_rather_than_panics() {
    let truncated = &GET_O_INDEXES_OK_EMPTY[.. GET_O_INDEXES_OK_EMPTY.len() - 5];
    assert!(decode_get_o_indexes_response(truncated).is_err());
  }
}
