//! Monero-style VarInt (variable-length integer) encoding.
//!
//! A small integer is encoded 7 bits at a time, little-endian, with the high bit of each byte
//! set when another byte follows. Matches the encoding used throughout Monero's wire formats.
//! <https://github.com/monero-project/monero/blob/master/src/common/varint.h>

use std::io::{self, Read, Write};

use crate::{read_byte, write_byte};

const VARINT_CONTINUATION_FLAG: u8 = 0b1000_0000;
const VARINT_VALUE_MASK: u8 = !VARINT_CONTINUATION_FLAG;

mod sealed {
  /// A seal to prevent implementing `VarInt` on foreign types.
  pub trait Sealed {
    /// Lossless, guaranteed conversion into a `u64`.
    fn into_u64(self) -> u64;
  }
}

#[allow(clippy::cast_possible_truncation)]
const fn upper_bound(bits: u32) -> usize {
  assert!(bits <= 256, "defining a number exceeding u256 as a VarInt");
  ((bits + (7 - 1)) / 7) as usize
}

/// A value which can be read/written as a VarInt. Sealed to primitive integers.
pub trait VarInt: TryFrom<u64> + Copy + sealed::Sealed {
  /// Minimum amount of bytes this could encode as.
  const LOWER_BOUND: usize;
  /// Maximum amount of bytes this could encode as.
  const UPPER_BOUND: usize;

  /// The length of this value's VarInt encoding, in bytes.
  fn varint_len(self) -> usize {
    let varint_u64 = self.into_u64();
    usize::try_from(u64::BITS - varint_u64.leading_zeros()).expect("64 > usize::MAX?").div_ceil(7)
  }

  /// Read a canonical VarInt.
  fn read<R: Read>(r: &mut R) -> io::Result<Self> {
    let mut bits = 0;
    let mut res = 0;
    while {
      let b = read_byte(r)?;
      // Leading zero bytes aren't canonical.
      if (bits != 0) && (b == 0) {
        Err(io::Error::other("non-canonical varint"))?;
      }

      #[allow(non_snake_case)]
      let U_BITS = core::mem::size_of::<Self>() * 8;
      if ((bits + 7) >= U_BITS) && (b >= (1 << (U_BITS - bits))) {
        Err(io::Error::other("varint overflow"))?;
      }

      res += u64::from(b & VARINT_VALUE_MASK) << bits;
      bits += 7;
      (b & VARINT_CONTINUATION_FLAG) == VARINT_CONTINUATION_FLAG
    } {}
    res.try_into().map_err(|_| io::Error::other("VarInt does not fit into integer type"))
  }

  /// Write this value as a VarInt.
  fn write<W: Write>(varint: &Self, w: &mut W) -> io::Result<()> {
    let mut varint: u64 = varint.into_u64();

    while {
      let mut b = u8::try_from(varint & u64::from(VARINT_VALUE_MASK))
        .expect("& 0b0111_1111 left more than 8 bits set");
      varint >>= 7;

      if varint != 0 {
        b |= VARINT_CONTINUATION_FLAG;
      }

      write_byte(&b, w)?;

      varint != 0
    } {}

    Ok(())
  }
}

impl sealed::Sealed for u8 {
  fn into_u64(self) -> u64 {
    self.into()
  }
}
impl VarInt for u8 {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

impl sealed::Sealed for u32 {
  fn into_u64(self) -> u64 {
    self.into()
  }
}
impl VarInt for u32 {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

impl sealed::Sealed for u64 {
  fn into_u64(self) -> u64 {
    self
  }
}
impl VarInt for u64 {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

impl sealed::Sealed for usize {
  fn into_u64(self) -> u64 {
    const _NO_128_BIT_PLATFORMS: [(); (u64::BITS - usize::BITS) as usize] =
      [(); (u64::BITS - usize::BITS) as usize];

    self.try_into().expect("compiling on platform with <64-bit usize yet value didn't fit in u64")
  }
}
impl VarInt for usize {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips() {
    for value in [0u64, 1, 127, 128, 129, 16383, 16384, u32::MAX as u64, u64::MAX] {
      let mut buf = vec![];
      VarInt::write(&value, &mut buf).unwrap();
      let read: u64 = VarInt::read(&mut &buf[..]).unwrap();
      assert_eq!(value, read);
    }
  }

  #[test]
  fn rejects_non_canonical() {
    // 0x80, 0x00 encodes zero non-canonically (a continuation byte followed by a zero byte).
    let buf = [0x80u8, 0x00];
    let res: io::Result<u64> = VarInt::read(&mut &buf[..]);
    assert!(res.is_err());
  }
}
