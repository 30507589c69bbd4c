use std::{error::Error, fmt, mem};

use byteorder::ByteOrder;

/// Byte order of image headers and DATA words.
pub type Endian = byteorder::LittleEndian;

/// Signed machine word of the virtual machine.
#[cfg(not(feature = "value16"))]
pub type VmValue = i32;
#[cfg(feature = "value16")]
pub type VmValue = i16;

/// Unsigned counterpart of [`VmValue`].
#[cfg(not(feature = "value16"))]
pub type VmUValue = u32;
#[cfg(feature = "value16")]
pub type VmUValue = u16;

/// Signed 16-bit quantity used for branch offsets in the code stream.
pub type VmWord = i16;

/// Boundary between the TEXT and DATA halves of the address space.
/// An address at or above this value refers to DATA.
#[cfg(not(feature = "value16"))]
pub const DATA_OFFSET: VmUValue = 0x8000_0000;
#[cfg(feature = "value16")]
pub const DATA_OFFSET: VmUValue = 0x8000;

pub const VALUE_BYTES: usize = mem::size_of::<VmValue>();
pub const WORD_BYTES: usize = mem::size_of::<VmWord>();

/// Allocation alignment within the image TEXT and DATA regions.
pub const ALIGN_MASK: usize = VALUE_BYTES - 1;

#[cfg(not(feature = "value16"))]
pub fn read_value(buf: &[u8]) -> VmValue {
    Endian::read_i32(buf)
}

#[cfg(feature = "value16")]
pub fn read_value(buf: &[u8]) -> VmValue {
    Endian::read_i16(buf)
}

#[cfg(not(feature = "value16"))]
pub fn write_value(buf: &mut [u8], value: VmValue) {
    Endian::write_i32(buf, value);
}

#[cfg(feature = "value16")]
pub fn write_value(buf: &mut [u8], value: VmValue) {
    Endian::write_i16(buf, value);
}

/// Reads a [`VmValue`] stored MSB-first, the layout of code-stream
/// immediates.
#[cfg(not(feature = "value16"))]
pub fn read_value_be(buf: &[u8]) -> VmValue {
    byteorder::BigEndian::read_i32(buf)
}

#[cfg(feature = "value16")]
pub fn read_value_be(buf: &[u8]) -> VmValue {
    byteorder::BigEndian::read_i16(buf)
}

#[cfg(not(feature = "value16"))]
pub fn write_value_be(buf: &mut [u8], value: VmValue) {
    byteorder::BigEndian::write_i32(buf, value);
}

#[cfg(feature = "value16")]
pub fn write_value_be(buf: &mut [u8], value: VmValue) {
    byteorder::BigEndian::write_i16(buf, value);
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseEnumError {
    pub value: String,
    pub enum_name: &'static str,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Failed to parse \"{}\" as {}.",
            &self.value, &self.enum_name
        )
    }
}

impl Error for ParseEnumError {}

pub trait EnumFromStr: Sized {
    fn from_str(s: &str) -> Result<Self, ParseEnumError>;
}

/// Generates [`EnumFromStr`] and `std::str::FromStr` impls that match each
/// variant by its exact name.
#[macro_export]
macro_rules! enum_from_str {
    ($name:ident { $($variant:ident),* $(,)? }) => {
        impl $crate::EnumFromStr for $name {
            fn from_str(s: &str) -> ::std::result::Result<$name, $crate::ParseEnumError> {
                match s {
                    $(stringify!($variant) => Ok($name::$variant),)*
                    _ => Err($crate::ParseEnumError {
                        value: s.to_string(),
                        enum_name: stringify!($name),
                    }),
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::ParseEnumError;

            fn from_str(s: &str) -> ::std::result::Result<$name, $crate::ParseEnumError> {
                <$name as $crate::EnumFromStr>::from_str(s)
            }
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn value_round_trip() {
        let mut buf = [0u8; VALUE_BYTES];
        write_value(&mut buf, -1234);
        assert_eq!(read_value(&buf), -1234);
    }

    #[test]
    fn big_endian_layout() {
        let mut buf = [0u8; VALUE_BYTES];
        write_value_be(&mut buf, 1);
        assert_eq!(buf[VALUE_BYTES - 1], 1);
        assert!(buf[..VALUE_BYTES - 1].iter().all(|&b| b == 0));
    }
}
