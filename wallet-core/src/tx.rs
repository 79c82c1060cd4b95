//! Block and transaction parsing, modelled as a contract.
//!
//! Decoding a CryptoNote block blob into its miner transaction and embedded transaction hashes,
//! and a transaction blob into its prefix (vin/vout/extra), is consensus-format logic this crate
//! does not own — the daemon defines the wire format, and the spec explicitly scopes it out. As
//! with [`crate::crypto::CryptoNotePrimitives`], the boundary is a trait: [`BlockCodec`].

use crate::crypto::{Hash, PublicKey};
use crate::extra::ExtraField;

/// A transaction input. Only the "input to key" variant (spending a ring of prior outputs) is
/// represented; a coinbase/miner-tx input (no prior outputs, no key image) is represented by an
/// empty `vin` on the parsed transaction.
#[derive(Clone, Debug)]
pub struct InputToKey {
  /// The amount being spent, 0 for ring-confidential transactions.
  pub amount: u64,
  /// Global output indices of the ring members, offset-encoded on the wire but expanded to
  /// absolute indices here.
  pub key_offsets: Vec<u64>,
  /// The key image nullifying the spent output.
  pub key_image: crate::output::KeyImage,
}

/// A transaction output.
#[derive(Clone, Debug)]
pub struct Output {
  /// The output's amount; 0 for ring-confidential transactions where the amount is carried
  /// encrypted elsewhere in the transaction (out of scope; see the crate's Non-goals).
  pub amount: u64,
  /// The output's one-time public key.
  pub target_key: PublicKey,
}

/// A parsed transaction: just enough structure for ownership scanning and spend detection. Ring
/// signature data, range proofs, and any confidential-amount machinery are not represented; this
/// crate only ever reads a transaction's public shape.
#[derive(Clone, Debug)]
pub struct ParsedTransaction {
  /// This transaction's hash.
  pub hash: Hash,
  /// This transaction's declared unlock time (block height if `< MAX_BLOCK_HEIGHT`, else a Unix
  /// timestamp; see [`crate::blockchain::is_spendtime_unlocked`]).
  pub unlock_time: u64,
  /// Inputs spending prior outputs. Empty for a miner/coinbase transaction.
  pub inputs: Vec<InputToKey>,
  /// This transaction's outputs, in on-chain order.
  pub outputs: Vec<Output>,
  /// Fields recovered from `tx_extra`.
  pub extra: Vec<ExtraField>,
}

/// A parsed block: its own id and its constituent transactions (miner tx first).
#[derive(Clone, Debug)]
pub struct ParsedBlock {
  /// This block's id.
  pub id: Hash,
  /// This block's Unix timestamp, used for the account-creation-time prefilter.
  pub timestamp: u64,
  /// The coinbase transaction.
  pub miner_tx: ParsedTransaction,
  /// Every non-coinbase transaction in the block, in on-chain order.
  pub txs: Vec<ParsedTransaction>,
}

/// Parsing and size-measurement of block/transaction blobs, and serialization of a constructed
/// transaction back to a blob — a pure format contract with no network or consensus-validation
/// responsibility.
pub trait BlockCodec: Send + Sync {
  /// Parse a full block blob (header + miner tx + the embedded transactions, which the daemon
  /// returns alongside the block blob in a `QueryBlocks` response item).
  fn parse_block(
    &self,
    block_blob: &[u8],
    tx_blobs: &[Vec<u8>],
  ) -> Result<ParsedBlock, crate::error::BoxError>;

  /// Parse a single transaction blob in isolation (used when only a tx hash, not its containing
  /// block, is at hand).
  fn parse_transaction(&self, tx_blob: &[u8]) -> Result<ParsedTransaction, crate::error::BoxError>;

  /// The serialized size in bytes a constructed (but not yet broadcast) transaction would have.
  /// Used to enforce the size limit before a `transfer` attempt is accepted.
  fn transaction_blob_size(&self, tx: &ConstructedTransaction) -> usize;

  /// Serialize a constructed transaction to its broadcastable hex-encoded blob.
  fn serialize_transaction(&self, tx: &ConstructedTransaction) -> String;

  /// The hash a constructed transaction will have once broadcast, computed the same way the
  /// daemon computes it from the serialized blob. Needed immediately after `commit` so the
  /// unconfirmed-transfer and transfer-log entries can be keyed before the scanner ever observes
  /// this transaction on-chain.
  fn hash_transaction(&self, tx: &ConstructedTransaction) -> Hash;
}

/// A transaction this wallet has assembled and ring-signed, ready to measure and broadcast.
///
/// Opaque beyond what the builder and codec need to agree on: the codec is responsible for the
/// actual CryptoNote transaction encoding (prefix + signatures), this crate only carries the
/// semantic pieces used to build it.
#[derive(Clone, Debug)]
pub struct ConstructedTransaction {
  /// This transaction's unlock time.
  pub unlock_time: u64,
  /// The inputs spent, each carrying its ring and signature.
  pub inputs: Vec<SignedInput>,
  /// The outputs created.
  pub outputs: Vec<Output>,
  /// The raw `tx_extra` bytes (already serialized by the caller from [`ExtraField`]s).
  pub extra: Vec<u8>,
}

/// One signed input of a [`ConstructedTransaction`]: the ring it was signed against and the
/// resulting ring signature.
#[derive(Clone, Debug)]
pub struct SignedInput {
  /// The amount spent (0 for ring-confidential).
  pub amount: u64,
  /// Absolute global indices of every ring member, including the real spend.
  pub key_offsets: Vec<u64>,
  /// The key image of the real spent output.
  pub key_image: crate::output::KeyImage,
  /// The ring signature proving ownership of one ring member without revealing which.
  pub signature: crate::crypto::RingSignature,
}
