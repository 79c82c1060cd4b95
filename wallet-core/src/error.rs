//! The crate's error hierarchy.
//!
//! Every fallible operation returns a `Result<T, E>` where `E` is a small `thiserror`-derived enum
//! local to the module which can fail. At the public API boundary (`Wallet`'s methods) these are
//! composed into [`WalletCoreError`], so callers can match on the taxonomy described in the
//! specification's error-handling design rather than sniff exception strings.

use thiserror::Error;

use crate::output::KeyImage;

/// A boxed transport or codec error, as produced by an embedder's [`crate::rpc::DaemonClient`] or
/// [`crate::tx::BlockCodec`] implementation.
///
/// Kept as a trait object (rather than an associated type on those traits) so they stay usable as
/// `&dyn DaemonClient`/`&dyn BlockCodec`; call sites only ever call `.to_string()` on it before
/// wrapping it into this crate's own error types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures encountered while talking to, or interpreting responses from, the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
  /// The transport itself failed (connection refused, timed out, reset, ...).
  ///
  /// This is the single *transient* bucket: callers performing a `refresh` loop should retry it.
  #[error("daemon connection failed: {0}")]
  Connection(String),
  /// The daemon answered with a non-`OK`, non-`BUSY` status string.
  #[error("daemon returned error status: {0}")]
  Status(String),
  /// The daemon is busy; the caller should back off and retry.
  #[error("daemon is busy")]
  Busy,
  /// The response did not have the shape this core expects.
  #[error("malformed daemon response: {0}")]
  MalformedResponse(String),
}

/// Failures encountered while scanning the chain for owned outputs.
#[derive(Debug, Error)]
pub enum ScanError {
  /// A daemon RPC failed.
  #[error(transparent)]
  Daemon(#[from] DaemonError),
  /// The daemon anchored a `QueryBlocks` response on a block id mismatching our short history.
  #[error("daemon's QueryBlocks response didn't share a block with our short chain history")]
  NoSharedBlock,
  /// `GetTxGlobalOutputIndexes` returned a different count than the transaction's outputs.
  #[error("global output index count ({returned}) didn't match vout count ({expected})")]
  OutputIndexCountMismatch {
    /// The amount of indexes the daemon returned.
    returned: usize,
    /// The amount of outputs the transaction actually has.
    expected: usize,
  },
  /// A derived one-time public key didn't match the output's declared key.
  #[error("derived output key didn't match the output at index {index}")]
  OutputKeyMismatch {
    /// The internal output index within the offending transaction.
    index: usize,
  },
  /// A key image we derived already exists in the key-image index, attached to a different
  /// output. This should never happen; if it does, the wallet's internal state is corrupt.
  #[error("duplicate key image derived for a new owned output")]
  DuplicateKeyImage(KeyImage),
  /// A block or transaction blob the daemon provided didn't parse.
  #[error("failed to parse a blob the daemon provided: {0}")]
  Codec(String),
}

/// Failures encountered while building or sending a transaction.
#[derive(Debug, Error)]
pub enum SendError {
  /// A daemon RPC failed.
  #[error(transparent)]
  Daemon(#[from] DaemonError),
  /// The caller passed no destinations.
  #[error("no destinations were specified")]
  EmptyDestinations,
  /// `fee + Σ amounts` overflowed.
  #[error("destination amounts overflowed a u64")]
  AmountOverflow,
  /// The wallet does not have enough unlocked, unspent outputs to cover the requested amount.
  #[error("insufficient unlocked funds: needed {needed}, found {found}")]
  InsufficientFunds {
    /// The amount needed, including fee.
    needed: u64,
    /// The amount actually found across selected outputs.
    found: u64,
  },
  /// The daemon returned fewer decoy candidates than the requested mixin for some input.
  #[error("daemon did not return enough mixins for an input")]
  InsufficientMixins,
  /// The constructed transaction's serialized size exceeded the size limit, even after every
  /// split attempt up to the cap.
  #[error("transaction exceeded the size limit after {attempts} split attempts")]
  TooManySplits {
    /// The number of shards attempted before giving up.
    attempts: u32,
  },
  /// A single shard's transaction was too big; `create_transactions` should retry with one more
  /// shard. Never escapes to the public API.
  #[error("transaction blob exceeded the size limit")]
  TxTooBig,
  /// A selection was built before a refresh detached the chain underneath it.
  #[error("a prior reorg invalidated this output selection; re-select before committing")]
  SelectionInvalidatedByDetach,
  /// `transfer`/`create_transactions` was called against a watch-only account, which has no
  /// spend secret to derive an ephemeral key or sign a ring with.
  #[error("cannot construct a transaction from a watch-only account")]
  WatchOnlyAccount,
  /// The daemon rejected a transaction outright (not `BUSY`).
  #[error("daemon rejected the transaction: {0}")]
  Rejected(String),
  /// A blob couldn't be constructed/serialized.
  #[error("failed to construct the transaction: {0}")]
  Codec(String),
}

/// Failures encountered loading or saving the encrypted keys-file and wallet-file.
#[derive(Debug, Error)]
pub enum PersistError {
  /// An I/O error (missing file, permission denied, disk full, ...).
  #[error(transparent)]
  Io(#[from] std::io::Error),
  /// The keys-file existed but failed to decrypt/deserialize/verify under the given password.
  #[error("invalid password")]
  InvalidPassword,
  /// `generate` was called against a path where a keys-file or wallet-file already exists.
  #[error("refusing to overwrite an existing wallet at this path")]
  AlreadyExists,
  /// The wallet-file's account address didn't match the one derived from the keys-file.
  #[error("wallet files don't correspond")]
  Mismatched,
  /// The wallet-file (or keys-file) bytes didn't parse as the expected format.
  #[error("malformed wallet data: {0}")]
  Malformed(String),
  /// The wallet-file declared a version newer than this implementation understands.
  #[error("wallet file version {0} is newer than this implementation supports")]
  UnsupportedVersion(u32),
}

/// The crate-wide error composed from every subsystem's local error type.
///
/// This is what the `Wallet`'s public methods return. Matching on its variants recovers the
/// taxonomy from the specification's error-handling design (transient daemon, protocol, user
/// input, tx-too-big, mixin-unavailable, authentication, filesystem) without string-sniffing.
#[derive(Debug, Error)]
pub enum WalletCoreError {
  /// A scan-pipeline failure.
  #[error(transparent)]
  Scan(#[from] ScanError),
  /// A transaction-construction or commit failure.
  #[error(transparent)]
  Send(#[from] SendError),
  /// A keys-file/wallet-file persistence failure.
  #[error(transparent)]
  Persist(#[from] PersistError),
  /// A daemon RPC failure surfaced directly (outside a scan or send context).
  #[error(transparent)]
  Daemon(#[from] DaemonError),
  /// The caller supplied a malformed payment id.
  #[error("payment id must be exactly 8 (encrypted) or 32 (unencrypted) bytes")]
  InvalidPaymentId,
  /// The caller supplied an address this core couldn't parse.
  #[error("unparseable address")]
  InvalidAddress,
}
