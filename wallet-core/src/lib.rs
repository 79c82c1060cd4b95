//! Scan pipeline, transaction builder, and encrypted persistence for a CryptoNote-family light
//! wallet.
//!
//! This crate does not speak to a daemon or a block format by itself: an embedder supplies both
//! by implementing [`rpc::DaemonClient`] and [`tx::BlockCodec`], and a curve/hash backend by
//! implementing [`crypto::CryptoNotePrimitives`]. [`wallet::Wallet`] wires those three traits
//! together with the account, the local blockchain mirror, the owned-output table, and the
//! payment/transfer history into a single refresh/send/persist API.

pub mod account;
pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod digits;
pub mod error;
pub mod extra;
pub mod output;
pub mod payment;
pub mod persistence;
pub mod rpc;
pub mod rpc_epee;
pub mod scan;
pub mod send;
pub mod transfer_log;
pub mod tx;
pub mod unconfirmed;
pub mod wallet;

pub use account::{AccountKeys, Address};
pub use config::{DustPolicy, RefreshConfig, SendConfig};
pub use error::{DaemonError, PersistError, ScanError, SendError, WalletCoreError};
pub use wallet::{PendingTransfer, Wallet};
