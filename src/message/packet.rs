use std::collections::{BTreeMap, LinkedList};

use crate::error::{EncodeError, MalformedPacketError};
use crate::message::header::{Header, MessageClass, MessageType, VERSION};
use crate::message::option::{
    decode_u16, decode_u24, encode_u16, encode_u24, BlockValue, CoAPOption, ObserveOption,
};
use crate::error::InvalidOptionValue;

/// Encoded packets must fit a single unfragmented UDP datagram.
const MAX_PACKET_LENGTH: usize = 1280;

const MAX_TOKEN_LENGTH: usize = 8;

const PAYLOAD_MARKER: u8 = 0xFF;

/// A CoAP message: fixed header, token, ordered options and payload.
/// Once handed to a channel for sending it is treated as immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    token: Vec<u8>,
    options: BTreeMap<u16, LinkedList<Vec<u8>>>,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new() -> Packet {
        Packet {
            header: Header::new(),
            token: Vec::new(),
            options: BTreeMap::new(),
            payload: Vec::new(),
        }
    }

    /// Sets the correlation token. Tokens longer than 8 bytes are a
    /// programming error and fail at encode time.
    pub fn set_token(&mut self, token: Vec<u8>) {
        self.token = token;
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// A random 4-byte token, enough to correlate concurrent exchanges.
    pub fn random_token() -> Vec<u8> {
        rand::random::<u32>().to_be_bytes().to_vec()
    }

    pub fn set_option(&mut self, option: CoAPOption, value: LinkedList<Vec<u8>>) {
        self.options.insert(option.number(), value);
    }

    pub fn add_option(&mut self, option: CoAPOption, value: Vec<u8>) {
        self.add_option_raw(option.number(), value);
    }

    /// Adds a value under a raw option number. Unrecognized options pass
    /// through the engine untouched.
    pub fn add_option_raw(&mut self, number: u16, value: Vec<u8>) {
        self.options.entry(number).or_default().push_back(value);
    }

    pub fn get_option(&self, option: CoAPOption) -> Option<&LinkedList<Vec<u8>>> {
        self.get_option_raw(option.number())
    }

    pub fn get_option_raw(&self, number: u16) -> Option<&LinkedList<Vec<u8>>> {
        self.options.get(&number)
    }

    pub fn clear_option(&mut self, option: CoAPOption) {
        self.options.remove(&option.number());
    }

    pub fn options(&self) -> impl Iterator<Item = (&u16, &LinkedList<Vec<u8>>)> {
        self.options.iter()
    }

    /// First value of a single-valued option, if present.
    fn single_option_value(&self, option: CoAPOption) -> Option<&Vec<u8>> {
        self.get_option(option).and_then(|list| list.front())
    }

    pub fn set_observe_value(&mut self, sequence: u32) {
        let mut list = LinkedList::new();
        list.push_back(encode_u24(sequence));
        self.set_option(CoAPOption::Observe, list);
    }

    /// Marks a GET as an observe registration or deregistration.
    pub fn set_observe_flag(&mut self, flag: ObserveOption) {
        self.set_observe_value(flag as u32);
    }

    /// The observe sequence number, decoded as the 24-bit uint RFC 7641
    /// specifies. Over-wide values error instead of truncating.
    pub fn observe_value(&self) -> Option<Result<u32, InvalidOptionValue>> {
        self.single_option_value(CoAPOption::Observe)
            .map(|v| decode_u24(v))
    }

    pub fn set_block_value(&mut self, option: CoAPOption, block: BlockValue) {
        let mut list = LinkedList::new();
        list.push_back(block.to_bytes());
        self.set_option(option, list);
    }

    /// The Block1/Block2 value carried under `option`, if any.
    pub fn block_value(&self, option: CoAPOption) -> Option<Result<BlockValue, InvalidOptionValue>> {
        self.single_option_value(option)
            .map(|v| BlockValue::from_bytes(v))
    }

    pub fn set_content_format(&mut self, format: u16) {
        let mut list = LinkedList::new();
        list.push_back(encode_u16(format));
        self.set_option(CoAPOption::ContentFormat, list);
    }

    pub fn content_format(&self) -> Option<Result<u16, InvalidOptionValue>> {
        self.single_option_value(CoAPOption::ContentFormat)
            .map(|v| decode_u16(v))
    }

    /// An empty ACK terminating the transaction `original` opened.
    /// The token is carried over so the peer can correlate it.
    pub fn ack_empty_for(original: &Packet) -> Packet {
        let mut packet = Packet::new();
        packet.header.message_type = MessageType::Acknowledgement;
        packet.header.code = MessageClass::Empty;
        packet.header.message_id = original.header.message_id;
        packet.set_token(original.token.clone());
        packet
    }

    /// An empty RST rejecting `original`. Observe deregistration matches
    /// on the token, so it is carried over as well.
    pub fn rst_for(original: &Packet) -> Packet {
        let mut packet = Packet::new();
        packet.header.message_type = MessageType::Reset;
        packet.header.code = MessageClass::Empty;
        packet.header.message_id = original.header.message_id;
        packet.set_token(original.token.clone());
        packet
    }

    /// Decodes a datagram. Pure and total for well-formed input; never
    /// performs I/O.
    pub fn from_bytes(buf: &[u8]) -> Result<Packet, MalformedPacketError> {
        if buf.len() < 4 {
            return Err(MalformedPacketError::Truncated);
        }

        // RFC 7252 3.: messages with an unknown version are silently
        // ignored, so the receive loop drops them like any other
        // malformed datagram.
        let version = buf[0] >> 6;
        if version != VERSION {
            return Err(MalformedPacketError::UnknownVersion(version));
        }

        let token_length = (buf[0] & 0x0F) as usize;
        if token_length > MAX_TOKEN_LENGTH {
            return Err(MalformedPacketError::InvalidTokenLength(buf[0] & 0x0F));
        }

        let header = Header {
            message_type: MessageType::from_number(buf[0] >> 4),
            code: MessageClass::from(buf[1]),
            message_id: u16::from_be_bytes([buf[2], buf[3]]),
        };

        let options_start = 4 + token_length;
        if options_start > buf.len() {
            return Err(MalformedPacketError::Truncated);
        }
        let token = buf[4..options_start].to_vec();

        let mut idx = options_start;
        let mut option_number: u16 = 0;
        let mut options: BTreeMap<u16, LinkedList<Vec<u8>>> = BTreeMap::new();
        while idx < buf.len() {
            let byte = buf[idx];
            if byte == PAYLOAD_MARKER {
                break;
            }

            let mut delta = (byte >> 4) as u16;
            let mut length = (byte & 0x0F) as usize;
            idx += 1;

            match delta {
                13 => {
                    if idx >= buf.len() {
                        return Err(MalformedPacketError::Truncated);
                    }
                    delta = u16::from(buf[idx]) + 13;
                    idx += 1;
                }
                14 => {
                    if idx + 1 >= buf.len() {
                        return Err(MalformedPacketError::Truncated);
                    }
                    delta = u16::from_be_bytes([buf[idx], buf[idx + 1]])
                        .checked_add(269)
                        .ok_or(MalformedPacketError::InvalidOptionDelta)?;
                    idx += 2;
                }
                15 => return Err(MalformedPacketError::InvalidOptionDelta),
                _ => {}
            }

            match length {
                13 => {
                    if idx >= buf.len() {
                        return Err(MalformedPacketError::Truncated);
                    }
                    length = buf[idx] as usize + 13;
                    idx += 1;
                }
                14 => {
                    if idx + 1 >= buf.len() {
                        return Err(MalformedPacketError::Truncated);
                    }
                    length = u16::from_be_bytes([buf[idx], buf[idx + 1]]) as usize + 269;
                    idx += 2;
                }
                15 => return Err(MalformedPacketError::InvalidOptionLength),
                _ => {}
            }

            // Deltas accumulate; overflow would alias one option number
            // onto another.
            option_number = option_number
                .checked_add(delta)
                .ok_or(MalformedPacketError::InvalidOptionDelta)?;

            let end = idx + length;
            if end > buf.len() {
                return Err(MalformedPacketError::InvalidOptionLength);
            }
            options
                .entry(option_number)
                .or_default()
                .push_back(buf[idx..end].to_vec());
            idx = end;
        }

        let mut payload = Vec::new();
        if idx < buf.len() {
            // Payload marker reached.
            if idx + 1 >= buf.len() {
                return Err(MalformedPacketError::EmptyPayload);
            }
            payload = buf[idx + 1..].to_vec();
        }

        Ok(Packet {
            header,
            token,
            options,
            payload,
        })
    }

    /// Encodes the packet for transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        if self.token.len() > MAX_TOKEN_LENGTH {
            return Err(EncodeError::InvalidTokenLength(self.token.len()));
        }

        let mut options_bytes: Vec<u8> = Vec::new();
        let mut previous_number: u16 = 0;
        for (&number, values) in self.options.iter() {
            for value in values.iter() {
                let delta = number - previous_number;

                let mut first = 0u8;
                first |= match delta {
                    0..=12 => (delta as u8) << 4,
                    13..=268 => 13 << 4,
                    _ => 14 << 4,
                };
                first |= match value.len() {
                    0..=12 => value.len() as u8,
                    13..=268 => 13,
                    _ => 14,
                };
                options_bytes.push(first);

                match delta {
                    0..=12 => {}
                    13..=268 => options_bytes.push((delta - 13) as u8),
                    _ => options_bytes.extend_from_slice(&(delta - 269).to_be_bytes()),
                }
                match value.len() {
                    0..=12 => {}
                    13..=268 => options_bytes.push((value.len() - 13) as u8),
                    _ => options_bytes
                        .extend_from_slice(&((value.len() - 269) as u16).to_be_bytes()),
                }

                options_bytes.extend_from_slice(value);
                previous_number = number;
            }
        }

        let mut length = 4 + self.token.len() + options_bytes.len();
        if !self.payload.is_empty() {
            length += 1 + self.payload.len();
        }
        if length > MAX_PACKET_LENGTH {
            return Err(EncodeError::PacketTooLarge(length));
        }

        let mut buf = Vec::with_capacity(length);
        buf.push(
            VERSION << 6 | self.header.message_type.to_number() << 4 | self.token.len() as u8,
        );
        buf.push(u8::from(self.header.code));
        buf.extend_from_slice(&self.header.message_id.to_be_bytes());
        buf.extend_from_slice(&self.token);
        buf.extend_from_slice(&options_bytes);
        if !self.payload.is_empty() {
            buf.push(PAYLOAD_MARKER);
            buf.extend_from_slice(&self.payload);
        }
        Ok(buf)
    }
}

impl Default for Packet {
    fn default() -> Packet {
        Packet::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::header::{RequestType, ResponseType};

    const URI_QUERY: u16 = 15;

    #[test]
    fn test_decode_packet_with_options() {
        let buf = [
            0x44, 0x01, 0x84, 0x9e, 0x51, 0x55, 0x77, 0xe8, 0xb2, 0x48, 0x69, 0x04, 0x54, 0x65,
            0x73, 0x74, 0x43, 0x61, 0x3d, 0x31,
        ];
        let packet = Packet::from_bytes(&buf).unwrap();
        assert_eq!(packet.header.message_type, MessageType::Confirmable);
        assert_eq!(packet.header.code, MessageClass::Request(RequestType::Get));
        assert_eq!(packet.header.message_id, 33950);
        assert_eq!(packet.token(), &[0x51, 0x55, 0x77, 0xE8]);

        let uri_path = packet.get_option(CoAPOption::UriPath).unwrap();
        let segments: Vec<_> = uri_path.iter().cloned().collect();
        assert_eq!(segments, vec![b"Hi".to_vec(), b"Test".to_vec()]);

        let uri_query = packet.get_option_raw(URI_QUERY).unwrap();
        assert_eq!(uri_query.front().unwrap(), &b"a=1".to_vec());
    }

    #[test]
    fn test_decode_packet_with_payload() {
        let buf = [
            0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, 0xFF, 0x48, 0x65, 0x6C, 0x6C, 0x6F,
        ];
        let packet = Packet::from_bytes(&buf).unwrap();
        assert_eq!(packet.header.message_type, MessageType::Acknowledgement);
        assert_eq!(
            packet.header.code,
            MessageClass::Response(ResponseType::Content)
        );
        assert_eq!(packet.header.message_id, 5117);
        assert_eq!(packet.token(), &[0xD0, 0xE2, 0x4D, 0xAC]);
        assert_eq!(packet.payload, b"Hello".to_vec());
    }

    #[test]
    fn test_encode_packet_with_options() {
        let mut packet = Packet::new();
        packet.header.message_type = MessageType::Confirmable;
        packet.header.code = MessageClass::Request(RequestType::Get);
        packet.header.message_id = 33950;
        packet.set_token(vec![0x51, 0x55, 0x77, 0xE8]);
        packet.add_option(CoAPOption::UriPath, b"Hi".to_vec());
        packet.add_option(CoAPOption::UriPath, b"Test".to_vec());
        packet.add_option_raw(URI_QUERY, b"a=1".to_vec());
        assert_eq!(
            packet.to_bytes().unwrap(),
            vec![
                0x44, 0x01, 0x84, 0x9e, 0x51, 0x55, 0x77, 0xe8, 0xb2, 0x48, 0x69, 0x04, 0x54,
                0x65, 0x73, 0x74, 0x43, 0x61, 0x3d, 0x31
            ]
        );
    }

    #[test]
    fn test_encode_packet_with_payload() {
        let mut packet = Packet::new();
        packet.header.message_type = MessageType::Acknowledgement;
        packet.header.code = MessageClass::Response(ResponseType::Content);
        packet.header.message_id = 5117;
        packet.set_token(vec![0xD0, 0xE2, 0x4D, 0xAC]);
        packet.payload = b"Hello".to_vec();
        assert_eq!(
            packet.to_bytes().unwrap(),
            vec![0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, 0xFF, 0x48, 0x65, 0x6C, 0x6C, 0x6F]
        );
    }

    #[test]
    fn test_roundtrip_with_large_option() {
        let mut packet = Packet::new();
        packet.header.message_id = 7;
        packet.add_option(CoAPOption::UriPath, vec![b'x'; 300]);
        packet.payload = b"data".to_vec();
        let decoded = Packet::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_rejects_bad_token_length() {
        // TKL of 9 in the header nibble.
        let buf = [0x49, 0x01, 0x00, 0x01];
        assert_eq!(
            Packet::from_bytes(&buf),
            Err(MalformedPacketError::InvalidTokenLength(9))
        );
    }

    #[test]
    fn test_decode_rejects_truncated_token() {
        let buf = [0x44, 0x01, 0x00, 0x01, 0xAA];
        assert_eq!(Packet::from_bytes(&buf), Err(MalformedPacketError::Truncated));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        for version in [0u8, 2, 3] {
            let buf = [version << 6 | 0x04, 0x01, 0x00, 0x01, 0xAA, 0xBB, 0xCC, 0xDD];
            assert_eq!(
                Packet::from_bytes(&buf),
                Err(MalformedPacketError::UnknownVersion(version))
            );
        }
    }

    #[test]
    fn test_decode_rejects_option_number_overflow() {
        // Extended delta of 65535 + 269 overflows u16 outright.
        let buf = [0x40, 0x01, 0x00, 0x01, 0xE0, 0xFF, 0xFF];
        assert_eq!(
            Packet::from_bytes(&buf),
            Err(MalformedPacketError::InvalidOptionDelta)
        );

        // Two deltas of 65000 would wrap the running option number and
        // alias the second option onto a small number.
        let ext = (65000u16 - 269).to_be_bytes();
        let buf = [
            0x40, 0x01, 0x00, 0x01, 0xE0, ext[0], ext[1], 0xE0, ext[0], ext[1],
        ];
        assert_eq!(
            Packet::from_bytes(&buf),
            Err(MalformedPacketError::InvalidOptionDelta)
        );
    }

    #[test]
    fn test_decode_rejects_reserved_delta() {
        let buf = [0x40, 0x01, 0x00, 0x01, 0xF0];
        assert_eq!(
            Packet::from_bytes(&buf),
            Err(MalformedPacketError::InvalidOptionDelta)
        );
    }

    #[test]
    fn test_decode_rejects_empty_payload_after_marker() {
        let buf = [0x40, 0x01, 0x00, 0x01, 0xFF];
        assert_eq!(
            Packet::from_bytes(&buf),
            Err(MalformedPacketError::EmptyPayload)
        );
    }

    #[test]
    fn test_encode_rejects_oversized_packet() {
        let mut packet = Packet::new();
        packet.payload = vec![0u8; 1400];
        assert!(matches!(
            packet.to_bytes(),
            Err(EncodeError::PacketTooLarge(_))
        ));
    }

    #[test]
    fn test_ack_and_rst_carry_correlation() {
        let mut original = Packet::new();
        original.header.message_id = 42;
        original.set_token(vec![1, 2, 3]);

        let ack = Packet::ack_empty_for(&original);
        assert_eq!(ack.header.message_type, MessageType::Acknowledgement);
        assert_eq!(ack.header.code, MessageClass::Empty);
        assert_eq!(ack.header.message_id, 42);
        assert_eq!(ack.token(), &[1, 2, 3]);

        let rst = Packet::rst_for(&original);
        assert_eq!(rst.header.message_type, MessageType::Reset);
        assert_eq!(rst.header.message_id, 42);
        assert_eq!(rst.token(), &[1, 2, 3]);
    }

    #[test]
    fn test_malicious_packet() {
        use quickcheck::{Gen, QuickCheck, TestResult};

        fn run(data: Vec<u8>) -> TestResult {
            match Packet::from_bytes(&data) {
                Ok(packet) => TestResult::from_bool(packet.token().len() <= 8),
                Err(_) => TestResult::passed(),
            }
        }
        QuickCheck::new()
            .tests(10_000)
            .gen(Gen::new(1500))
            .quickcheck(run as fn(Vec<u8>) -> TestResult);
    }
}
