//! Encrypted on-disk persistence: the password-sealed keys-file, and the versioned wallet-file
//! carrying everything else.

use std::path::{Path, PathBuf};

use wallet_io::{read_byte, read_bytes, read_vec, write_vec, VarInt};

use crate::account::{AccountKeys, Address};
use crate::blockchain::Blockchain;
use crate::crypto::{Chacha8Iv, CryptoNotePrimitives, PublicKey, SecretKey};
use crate::error::PersistError;
use crate::extra::PaymentId;
use crate::output::{KeyImage, OutputId, OutputTable, OwnedOutput};
use crate::payment::{PaymentDetail, PaymentTable};
use crate::transfer_log::{Direction, TransferLog, TransferLogEntry};
use crate::unconfirmed::UnconfirmedTable;

/// The current wallet-file format version this crate writes. Older versions remain loadable;
/// fields introduced after a given version are simply absent and load as empty.
pub const CURRENT_WALLET_FILE_VERSION: u32 = 8;

/// Given a path the caller supplied, resolve both the keys-file and wallet-file paths, per the
/// `.keys`-suffix convention: if the given path already ends in `.keys`, that's the keys-file and
/// the wallet-file is the same path with the suffix stripped; otherwise the given path is the
/// wallet-file and `.keys` is appended for the keys-file.
pub fn resolve_paths(path: &Path) -> (PathBuf, PathBuf) {
  if path.extension().is_some_and(|ext| ext == "keys") {
    (path.to_path_buf(), path.with_extension(""))
  } else {
    let mut keys_path = path.as_os_str().to_os_string();
    keys_path.push(".keys");
    (PathBuf::from(keys_path), path.to_path_buf())
  }
}

/// Seal account keys to the keys-file format: an 8-byte random chacha8 IV followed by the
/// chacha8-encrypted serialized keys.
///
/// `account_creation_time` rides along in the same encrypted blob (it isn't secret, but the
/// keys-file is the one place per-account metadata survives a `load`); `refresh()` subtracts a
/// day of slack from it to prefilter blocks mined before the account could possibly have received
/// anything.
pub fn seal_keys_file(
  primitives: &dyn CryptoNotePrimitives,
  account: &AccountKeys,
  account_creation_time: u64,
  password: &[u8],
  iv: Chacha8Iv,
) -> Vec<u8> {
  let mut plaintext = Vec::new();
  write_bytes_exact(&mut plaintext, account.spend_public().as_bytes());
  write_bytes_exact(
    &mut plaintext,
    account.spend_secret().map(|s| *s.as_bytes()).unwrap_or([0; 32]).as_slice(),
  );
  write_bytes_exact(&mut plaintext, account.view_public().as_bytes());
  write_bytes_exact(&mut plaintext, account.view_secret().as_bytes());
  plaintext.push(account.is_watch_only() as u8);
  write_bytes_exact(&mut plaintext, &account_creation_time.to_le_bytes());

  let key = primitives.derive_chacha8_key(password);
  primitives.chacha8_xor(&key, &iv, &mut plaintext);

  let mut out = Vec::with_capacity(8 + plaintext.len());
  out.extend_from_slice(&iv);
  out.extend_from_slice(&plaintext);
  out
}

fn write_bytes_exact(out: &mut Vec<u8>, bytes: &[u8]) {
  out.extend_from_slice(bytes);
}

/// The result of successfully unsealing a keys-file.
pub struct UnsealedKeys {
  /// The recovered account.
  pub account: AccountKeys,
  /// The account's creation time, as sealed alongside the keys.
  pub account_creation_time: u64,
}

/// Unseal a keys-file under `password`, verifying the `secret -> public` relation for both
/// keypairs. A relation mismatch (which a wrong password produces, since the decrypted bytes
/// become garbage) surfaces as [`PersistError::InvalidPassword`].
pub fn unseal_keys_file(
  primitives: &dyn CryptoNotePrimitives,
  data: &[u8],
  password: &[u8],
) -> Result<UnsealedKeys, PersistError> {
  if data.len() < 8 + 32 + 32 + 32 + 32 + 1 + 8 {
    return Err(PersistError::Malformed("keys-file too short".to_string()));
  }
  let (iv_bytes, ciphertext) = data.split_at(8);
  let mut iv = [0u8; 8];
  iv.copy_from_slice(iv_bytes);

  let mut plaintext = ciphertext.to_vec();
  let key = primitives.derive_chacha8_key(password);
  primitives.chacha8_xor(&key, &iv, &mut plaintext);

  let mut cursor = plaintext.as_slice();
  let spend_public = read_fixed::<32>(&mut cursor)?;
  let spend_secret_bytes = read_fixed::<32>(&mut cursor)?;
  let view_public = read_fixed::<32>(&mut cursor)?;
  let view_secret_bytes = read_fixed::<32>(&mut cursor)?;
  let watch_only = *cursor.first().ok_or_else(|| PersistError::Malformed("truncated keys-file".to_string()))? != 0;
  cursor = &cursor[1 ..];
  let account_creation_time = u64::from_le_bytes(read_fixed::<8>(&mut cursor)?);

  let spend_public = PublicKey::from_bytes(spend_public);
  let view_public = PublicKey::from_bytes(view_public);
  let view_secret = SecretKey::from_bytes(view_secret_bytes);

  if primitives.secret_to_public(&view_secret) != view_public {
    return Err(PersistError::InvalidPassword);
  }

  let account = if watch_only {
    AccountKeys::watch_only(spend_public, view_secret, view_public)
  } else {
    let spend_secret = SecretKey::from_bytes(spend_secret_bytes);
    if primitives.secret_to_public(&spend_secret) != spend_public {
      return Err(PersistError::InvalidPassword);
    }
    AccountKeys::from_secrets(primitives, spend_secret, view_secret)
  };

  Ok(UnsealedKeys { account, account_creation_time })
}

fn read_fixed<const N: usize>(cursor: &mut &[u8]) -> Result<[u8; N], PersistError> {
  if cursor.len() < N {
    return Err(PersistError::Malformed("truncated keys-file".to_string()));
  }
  let mut out = [0u8; N];
  out.copy_from_slice(&cursor[.. N]);
  *cursor = &cursor[N ..];
  Ok(out)
}

/// Everything the wallet-file carries besides the account keys (which live in the keys-file and
/// are checked for correspondence on load).
pub struct WalletFileContents {
  /// The wallet-file's declared format version.
  pub version: u32,
  /// The account address this wallet-file was saved under.
  pub address: Address,
  /// The local blockchain mirror.
  pub blockchain: Blockchain,
  /// Owned outputs.
  pub outputs: OutputTable,
  /// Received-payment records (v7+; empty if loaded from an older version).
  pub payments: PaymentTable,
  /// Unconfirmed sends (v6+; empty if loaded from an older version).
  pub unconfirmed: UnconfirmedTable,
  /// The transfer history (v8+; empty if loaded from an older version, per the crate's resolved
  /// open question on pre-v8 wallet-files).
  pub transfer_log: TransferLog,
}

/// Serialize a wallet's non-key state to the current wallet-file format.
pub fn save_wallet_file(
  address: &Address,
  blockchain: &Blockchain,
  outputs: &OutputTable,
  payments: &PaymentTable,
  unconfirmed: &UnconfirmedTable,
  transfer_log: &TransferLog,
) -> Vec<u8> {
  let mut buf = Vec::new();

  VarInt::write(&(CURRENT_WALLET_FILE_VERSION as usize), &mut buf).unwrap();

  write_bytes_exact(&mut buf, address.spend_public.as_bytes());
  write_bytes_exact(&mut buf, address.view_public.as_bytes());

  write_vec(|id, w| write_bytes_exact_io(w, id.as_bytes()), blockchain.ids(), &mut buf).unwrap();

  VarInt::write(&outputs.len(), &mut buf).unwrap();
  for output in outputs.iter() {
    write_owned_output(&mut buf, output);
  }

  let unconfirmed_entries: Vec<_> = unconfirmed.iter().collect();
  VarInt::write(&unconfirmed_entries.len(), &mut buf).unwrap();
  for (tx_hash, transfer) in &unconfirmed_entries {
    write_bytes_exact(&mut buf, tx_hash.as_bytes());
    VarInt::write(&(transfer.change_amount as usize), &mut buf).unwrap();
    VarInt::write(&(transfer.sent_time as usize), &mut buf).unwrap();
  }

  let payment_entries = payments.bulk(None, 0);
  VarInt::write(&payment_entries.len(), &mut buf).unwrap();
  for (payment_id, detail) in &payment_entries {
    write_payment_id(&mut buf, payment_id);
    write_bytes_exact(&mut buf, detail.tx_hash.as_bytes());
    VarInt::write(&(detail.amount as usize), &mut buf).unwrap();
    VarInt::write(&(detail.block_height as usize), &mut buf).unwrap();
    VarInt::write(&(detail.unlock_time as usize), &mut buf).unwrap();
  }

  let entries: Vec<_> = transfer_log.iter().collect();
  VarInt::write(&entries.len(), &mut buf).unwrap();
  for entry in entries {
    buf.push(matches!(entry.direction, Direction::Out) as u8);
    VarInt::write(&(entry.time as usize), &mut buf).unwrap();
    write_bytes_exact(&mut buf, entry.tx_hash.as_bytes());
    VarInt::write(&(entry.amount as usize), &mut buf).unwrap();
    VarInt::write(&(entry.fee as usize), &mut buf).unwrap();
    VarInt::write(&(entry.block_height as usize), &mut buf).unwrap();
    VarInt::write(&(entry.unlock_time as usize), &mut buf).unwrap();
  }

  buf
}

fn write_bytes_exact_io<W: std::io::Write>(w: &mut W, bytes: &[u8]) -> std::io::Result<()> {
  w.write_all(bytes)
}

fn write_owned_output(buf: &mut Vec<u8>, output: &OwnedOutput) {
  write_bytes_exact(buf, output.id.tx_hash.as_bytes());
  VarInt::write(&output.id.local_index, buf).unwrap();
  VarInt::write(&(output.global_index as usize), buf).unwrap();
  VarInt::write(&(output.block_height as usize), buf).unwrap();
  VarInt::write(&(output.amount as usize), buf).unwrap();
  write_bytes_exact(buf, output.public_key.as_bytes());
  write_bytes_exact(buf, output.tx_public_key.as_bytes());
  write_bytes_exact(buf, output.key_image.as_bytes());
  VarInt::write(&output.internal_output_index, buf).unwrap();
  buf.push(output.spent as u8);
  VarInt::write(&(output.unlock_time as usize), buf).unwrap();
  buf.push(output.is_own_change as u8);
}

fn write_payment_id(buf: &mut Vec<u8>, payment_id: &PaymentId) {
  match payment_id {
    PaymentId::Unencrypted(id) => {
      buf.push(0);
      write_bytes_exact(buf, id);
    }
    PaymentId::Encrypted(id) => {
      buf.push(1);
      write_bytes_exact(buf, id);
    }
  }
}

/// Parse wallet-file bytes. The declared address is not checked for correspondence here; the
/// caller (`Wallet::load`) checks it against the keys-file's derived address.
pub fn load_wallet_file(mut data: &[u8]) -> Result<WalletFileContents, PersistError> {
  let version: usize = VarInt::read(&mut data)
    .map_err(|e| PersistError::Malformed(format!("wallet-file version: {e}")))?;
  if version as u32 > CURRENT_WALLET_FILE_VERSION {
    return Err(PersistError::UnsupportedVersion(version as u32));
  }

  let spend_public = PublicKey::from_bytes(
    read_bytes::<_, 32>(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?,
  );
  let view_public = PublicKey::from_bytes(
    read_bytes::<_, 32>(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?,
  );
  let address = Address { spend_public, view_public };

  let ids = read_vec(|r| read_bytes::<_, 32>(r).map(crate::crypto::Hash::from_bytes), None, &mut data)
    .map_err(|e| PersistError::Malformed(e.to_string()))?;
  let blockchain = Blockchain::from_ids_unchecked(ids);

  let output_count: usize =
    VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  let mut outputs = OutputTable::new();
  for _ in 0 .. output_count {
    let output = read_owned_output(&mut data)?;
    outputs.insert(output).map_err(|_| PersistError::Malformed("duplicate key image in wallet-file".to_string()))?;
  }

  let mut unconfirmed = UnconfirmedTable::new();
  if !data.is_empty() {
    let count: usize =
      VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
    for _ in 0 .. count {
      let tx_hash = crate::crypto::Hash::from_bytes(
        read_bytes::<_, 32>(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?,
      );
      let change_amount: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      let sent_time: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      unconfirmed.insert(
        tx_hash,
        crate::unconfirmed::UnconfirmedTransfer {
          tx: crate::tx::ConstructedTransaction {
            unlock_time: 0,
            inputs: vec![],
            outputs: vec![],
            extra: vec![],
          },
          change_amount: change_amount as u64,
          sent_time: sent_time as u64,
        },
      );
    }
  }

  let mut payments = PaymentTable::new();
  if !data.is_empty() {
    let count: usize =
      VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
    for _ in 0 .. count {
      let payment_id = read_payment_id(&mut data)?;
      let tx_hash = crate::crypto::Hash::from_bytes(
        read_bytes::<_, 32>(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?,
      );
      let amount: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      let block_height: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      let unlock_time: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      payments.insert(
        payment_id,
        PaymentDetail {
          tx_hash,
          amount: amount as u64,
          block_height: block_height as u64,
          unlock_time: unlock_time as u64,
        },
      );
    }
  }

  let mut transfer_log = TransferLog::new();
  if !data.is_empty() {
    let count: usize =
      VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
    for _ in 0 .. count {
      let direction =
        if read_byte(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))? != 0 {
          Direction::Out
        } else {
          Direction::In
        };
      let time: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      let tx_hash = crate::crypto::Hash::from_bytes(
        read_bytes::<_, 32>(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?,
      );
      let amount: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      let fee: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      let block_height: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      let unlock_time: usize =
        VarInt::read(&mut data).map_err(|e| PersistError::Malformed(e.to_string()))?;
      transfer_log.push(TransferLogEntry {
        time: time as u64,
        direction,
        tx_hash,
        amount: amount as u64,
        fee: fee as u64,
        payment_id: None,
        has_address: false,
        address: None,
        block_height: block_height as u64,
        unlock_time: unlock_time as u64,
      });
    }
  }

  Ok(WalletFileContents { version: version as u32, address, blockchain, outputs, payments, unconfirmed, transfer_log })
}

fn read_owned_output(data: &mut &[u8]) -> Result<OwnedOutput, PersistError> {
  let tx_hash = crate::crypto::Hash::from_bytes(
    read_bytes::<_, 32>(data).map_err(|e| PersistError::Malformed(e.to_string()))?,
  );
  let local_index: usize = VarInt::read(data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  let global_index: usize = VarInt::read(data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  let block_height: usize = VarInt::read(data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  let amount: usize = VarInt::read(data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  let public_key =
    PublicKey::from_bytes(read_bytes::<_, 32>(data).map_err(|e| PersistError::Malformed(e.to_string()))?);
  let tx_public_key =
    PublicKey::from_bytes(read_bytes::<_, 32>(data).map_err(|e| PersistError::Malformed(e.to_string()))?);
  let key_image =
    KeyImage::from_bytes(read_bytes::<_, 32>(data).map_err(|e| PersistError::Malformed(e.to_string()))?);
  let internal_output_index: usize =
    VarInt::read(data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  let spent = read_byte(data).map_err(|e| PersistError::Malformed(e.to_string()))? != 0;
  let unlock_time: usize = VarInt::read(data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  let is_own_change = read_byte(data).map_err(|e| PersistError::Malformed(e.to_string()))? != 0;

  Ok(OwnedOutput {
    id: OutputId { tx_hash, local_index },
    global_index: global_index as u64,
    block_height: block_height as u64,
    amount: amount as u64,
    public_key,
    tx_public_key,
    key_image,
    internal_output_index,
    spent,
    unlock_time: unlock_time as u64,
    is_own_change,
  })
}

fn read_payment_id(data: &mut &[u8]) -> Result<PaymentId, PersistError> {
  let tag = read_byte(data).map_err(|e| PersistError::Malformed(e.to_string()))?;
  match tag {
    0 => Ok(PaymentId::Unencrypted(
      read_bytes::<_, 32>(data).map_err(|e| PersistError::Malformed(e.to_string()))?,
    )),
    1 => Ok(PaymentId::Encrypted(
      read_bytes::<_, 8>(data).map_err(|e| PersistError::Malformed(e.to_string()))?,
    )),
    _ => Err(PersistError::Malformed("unknown payment-id tag".to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  use crate::crypto::{Chacha8Key, KeyDerivation, RingSignature};
  use crate::output::KeyImage;

  #[test]
  fn resolve_paths_strips_keys_suffix() {
    let (keys, wallet) = resolve_paths(&PathBuf::from("/tmp/mywallet.keys"));
    assert_eq!(keys, PathBuf::from("/tmp/mywallet.keys"));
    assert_eq!(wallet, PathBuf::from("/tmp/mywallet"));
  }

  #[test]
  fn resolve_paths_appends_keys_suffix() {
    let (keys, wallet) = resolve_paths(&PathBuf::from("/tmp/mywallet"));
    assert_eq!(keys, PathBuf::from("/tmp/mywallet.keys"));
    assert_eq!(wallet, PathBuf::from("/tmp/mywallet"));
  }

  /// A reversible "cipher" (xor against a keystream derived from key/iv/position) standing in for
  /// chacha8, so seal/unseal round-trips without pulling in a real stream cipher just for this
  /// test; `secret_to_public` is the identity map so the relation check in `unseal_keys_file`
  /// still exercises real logic against keys it can actually recompute.
  struct FakePrimitives;
  impl CryptoNotePrimitives for FakePrimitives {
    fn keccak256(&self, _data: &[u8]) -> crate::crypto::Hash {
      crate::crypto::Hash::from_bytes([0; 32])
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
    fn derive_chacha8_key(&self, password: &[u8]) -> Chacha8Key {
      let mut key = [0u8; 32];
      for (i, byte) in password.iter().enumerate() {
        key[i % 32] ^= byte;
      }
      Chacha8Key::from_bytes(key)
    }
    fn chacha8_xor(&self, key: &Chacha8Key, iv: &Chacha8Iv, data: &mut [u8]) {
      for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key.as_bytes()[i % 32] ^ iv[i % 8] ^ (i as u8);
      }
    }
    fn generate_ring_signature(
      &self,
      _p: &crate::crypto::Hash,
      _k: &KeyImage,
      _r: &[PublicKey],
      _s: &SecretKey,
      _i: usize,
    ) -> RingSignature {
      RingSignature(vec![])
    }
  }

  proptest::proptest! {
    #[test]
    fn keys_file_seal_unseal_round_trips(
      spend_secret in proptest::array::uniform32(proptest::prelude::any::<u8>()),
      view_secret in proptest::array::uniform32(proptest::prelude::any::<u8>()),
      password in proptest::collection::vec(proptest::prelude::any::<u8>(), 0 .. 32),
      iv in proptest::array::uniform8(proptest::prelude::any::<u8>()),
      account_creation_time in proptest::prelude::any::<u64>(),
    ) {
      let primitives = FakePrimitives;
      let account = AccountKeys::from_secrets(
        &primitives,
        SecretKey::from_bytes(spend_secret),
        SecretKey::from_bytes(view_secret),
      );
      let sealed = seal_keys_file(&primitives, &account, account_creation_time, &password, iv);
      let unsealed = unseal_keys_file(&primitives, &sealed, &password).expect("round trips");
      proptest::prop_assert_eq!(unsealed.account_creation_time, account_creation_time);
      proptest::prop_assert_eq!(unsealed.account.spend_public(), account.spend_public());
      proptest::prop_assert_eq!(unsealed.account.view_public(), account.view_public());
      proptest::prop_assert_eq!(
        unsealed.account.spend_secret().map(|s| *s.as_bytes()),
        account.spend_secret().map(|s| *s.as_bytes())
      );
    }
  }
}
