use crate::error::InvalidOptionValue;

/// Options the engine recognizes. Anything else travels through the
/// packet opaquely under its raw number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoAPOption {
    Observe,
    UriPath,
    ContentFormat,
    Block2,
    Block1,
}

impl CoAPOption {
    pub fn number(self) -> u16 {
        match self {
            CoAPOption::Observe => 6,
            CoAPOption::UriPath => 11,
            CoAPOption::ContentFormat => 12,
            CoAPOption::Block2 => 23,
            CoAPOption::Block1 => 27,
        }
    }
}

/// Observe option values a request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOption {
    Register = 0,
    Deregister = 1,
}

/// Content-Format registry value for `application/json`, the format the
/// sample applications exchange.
pub const APPLICATION_JSON: u16 = 50;

const OBSERVE_SEQUENCE_MASK: u32 = 0xFF_FFFF;

/// Encodes a 24-bit observe sequence number as a minimal-length
/// big-endian uint (empty for zero).
pub fn encode_u24(value: u32) -> Vec<u8> {
    let value = value & OBSERVE_SEQUENCE_MASK;
    match value {
        0 => vec![],
        v if v <= 0xFF => vec![v as u8],
        v if v <= 0xFFFF => vec![(v >> 8) as u8, v as u8],
        v => vec![(v >> 16) as u8, (v >> 8) as u8, v as u8],
    }
}

/// Decodes a 24-bit uint option value. Values longer than 3 bytes are
/// rejected rather than truncated.
pub fn decode_u24(bytes: &[u8]) -> Result<u32, InvalidOptionValue> {
    if bytes.len() > 3 {
        return Err(InvalidOptionValue::ValueTooLong {
            max: 3,
            actual: bytes.len(),
        });
    }
    Ok(bytes.iter().fold(0u32, |acc, &b| acc << 8 | u32::from(b)))
}

/// Decodes a u16 option value (Content-Format).
pub fn decode_u16(bytes: &[u8]) -> Result<u16, InvalidOptionValue> {
    if bytes.len() > 2 {
        return Err(InvalidOptionValue::ValueTooLong {
            max: 2,
            actual: bytes.len(),
        });
    }
    Ok(bytes.iter().fold(0u16, |acc, &b| acc << 8 | u16::from(b)))
}

pub fn encode_u16(value: u16) -> Vec<u8> {
    encode_u24(u32::from(value))
}

/// Block numbers occupy 20 bits of the option scalar.
const BLOCK_NUMBER_LIMIT: u32 = 1 << 20;

/// Decoded view of a Block1/Block2 option value per RFC 7959:
/// sequence number, more-blocks flag and the size exponent
/// (block size = 2^(4 + exponent), 16..=1024 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockValue {
    pub num: u32,
    pub more: bool,
    pub size_exponent: u8,
}

impl BlockValue {
    pub fn new(num: u32, more: bool, size: usize) -> Result<BlockValue, InvalidOptionValue> {
        if num >= BLOCK_NUMBER_LIMIT {
            return Err(InvalidOptionValue::BlockNumberOutOfRange(num));
        }
        Ok(BlockValue {
            num,
            more,
            size_exponent: size_exponent_for(size)?,
        })
    }

    /// The block size in bytes this value encodes.
    pub fn size(&self) -> usize {
        1 << (self.size_exponent + 4)
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let scalar =
            self.num << 4 | u32::from(self.more) << 3 | u32::from(self.size_exponent & 0x7);
        encode_u24(scalar)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BlockValue, InvalidOptionValue> {
        let scalar = decode_u24(bytes)?;
        Ok(BlockValue {
            num: scalar >> 4,
            more: scalar >> 3 & 0x1 == 0x1,
            size_exponent: (scalar & 0x7) as u8,
        })
    }
}

/// Maps a block size in bytes to its wire exponent.
pub fn size_exponent_for(size: usize) -> Result<u8, InvalidOptionValue> {
    match size {
        16 => Ok(0),
        32 => Ok(1),
        64 => Ok(2),
        128 => Ok(3),
        256 => Ok(4),
        512 => Ok(5),
        1024 => Ok(6),
        n => Err(InvalidOptionValue::UnsupportedBlockSize(n)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_block_value_roundtrip() {
        let block = BlockValue::new(20, true, 1024).unwrap();
        let bytes = block.to_bytes();
        assert_eq!(BlockValue::from_bytes(&bytes).unwrap(), block);
        assert_eq!(block.size(), 1024);
    }

    #[test]
    fn test_block_value_zero_is_empty() {
        let block = BlockValue::new(0, false, 16).unwrap();
        assert_eq!(block.to_bytes(), Vec::<u8>::new());
        let decoded = BlockValue::from_bytes(&[]).unwrap();
        assert_eq!(decoded.num, 0);
        assert!(!decoded.more);
        assert_eq!(decoded.size(), 16);
    }

    #[test]
    fn test_block_number_limit() {
        // 2^20 - 1 is the last number that survives the wire encoding.
        let largest = BlockValue::new((1 << 20) - 1, true, 16).unwrap();
        assert_eq!(
            BlockValue::from_bytes(&largest.to_bytes()).unwrap(),
            largest
        );

        // 2^20 would shift past the 24-bit scalar and come back as 0.
        assert_eq!(
            BlockValue::new(1 << 20, false, 16),
            Err(InvalidOptionValue::BlockNumberOutOfRange(1 << 20))
        );
    }

    #[test]
    fn test_bad_block_size() {
        assert_eq!(
            BlockValue::new(0, false, 100),
            Err(InvalidOptionValue::UnsupportedBlockSize(100))
        );
    }

    #[test]
    fn test_u24_rejects_wide_values() {
        assert_eq!(
            decode_u24(&[1, 2, 3, 4]),
            Err(InvalidOptionValue::ValueTooLong { max: 3, actual: 4 })
        );
    }

    #[test]
    fn test_u24_roundtrip() {
        for value in [0u32, 1, 0xFF, 0x100, 0xFFFF, 0x10000, 0xFF_FFFF] {
            assert_eq!(decode_u24(&encode_u24(value)).unwrap(), value);
        }
    }
}
