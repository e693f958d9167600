//! Wire formats for discovery and transfer
//!
//! Three fixed-layout big-endian messages share a magic cookie and a one-byte
//! type tag. Anything that fails validation is foreign traffic and is dropped,
//! never surfaced as an error.

use serde::{Deserialize, Serialize};

pub const MAGIC_COOKIE: u32 = 0xABCD_DCBA;

pub const MSG_TYPE_OFFER: u8 = 0x2;
pub const MSG_TYPE_REQUEST: u8 = 0x3;
pub const MSG_TYPE_PAYLOAD: u8 = 0x4;

/// Well-known port offers are broadcast to.
pub const DISCOVERY_PORT: u16 = 13117;

pub const OFFER_SIZE: usize = 9; // cookie (4) + type (1) + udp port (2) + tcp port (2)
pub const REQUEST_SIZE: usize = 13; // cookie (4) + type (1) + file size (8)
pub const SEGMENT_HEADER_SIZE: usize = 21; // cookie (4) + type (1) + total (8) + current (8)

/// Server announcement carrying its data-plane ports.
/// [cookie: u32][type: u8][udp_port: u16][tcp_port: u16]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferMessage {
    pub udp_port: u16,
    pub tcp_port: u16,
}

impl OfferMessage {
    pub fn encode(&self) -> [u8; OFFER_SIZE] {
        let mut buffer = [0u8; OFFER_SIZE];
        buffer[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buffer[4] = MSG_TYPE_OFFER;
        buffer[5..7].copy_from_slice(&self.udp_port.to_be_bytes());
        buffer[7..9].copy_from_slice(&self.tcp_port.to_be_bytes());
        buffer
    }

    pub fn decode(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < OFFER_SIZE {
            return None;
        }
        let cookie = u32::from_be_bytes(buffer[0..4].try_into().ok()?);
        if cookie != MAGIC_COOKIE || buffer[4] != MSG_TYPE_OFFER {
            return None;
        }
        let udp_port = u16::from_be_bytes(buffer[5..7].try_into().ok()?);
        let tcp_port = u16::from_be_bytes(buffer[7..9].try_into().ok()?);
        Some(Self { udp_port, tcp_port })
    }
}

/// Transfer request naming the desired payload size in bytes.
/// [cookie: u32][type: u8][file_size: u64]
///
/// Only used on UDP; the TCP side sends the size as an ASCII decimal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMessage {
    pub file_size: u64,
}

impl RequestMessage {
    pub fn encode(&self) -> [u8; REQUEST_SIZE] {
        let mut buffer = [0u8; REQUEST_SIZE];
        buffer[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buffer[4] = MSG_TYPE_REQUEST;
        buffer[5..13].copy_from_slice(&self.file_size.to_be_bytes());
        buffer
    }

    pub fn decode(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < REQUEST_SIZE {
            return None;
        }
        let cookie = u32::from_be_bytes(buffer[0..4].try_into().ok()?);
        if cookie != MAGIC_COOKIE || buffer[4] != MSG_TYPE_REQUEST {
            return None;
        }
        let file_size = u64::from_be_bytes(buffer[5..13].try_into().ok()?);
        Some(Self { file_size })
    }
}

/// Header prepended to each UDP payload segment.
/// [cookie: u32][type: u8][total_segments: u64][current_segment: u64][payload...]
///
/// `current_segment` is 1-based. The payload length is not encoded; it is the
/// datagram length minus [`SEGMENT_HEADER_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub total_segments: u64,
    pub current_segment: u64,
}

impl SegmentHeader {
    pub fn encode(&self, buffer: &mut [u8]) {
        buffer[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buffer[4] = MSG_TYPE_PAYLOAD;
        buffer[5..13].copy_from_slice(&self.total_segments.to_be_bytes());
        buffer[13..21].copy_from_slice(&self.current_segment.to_be_bytes());
    }

    pub fn decode(buffer: &[u8]) -> Option<Self> {
        if buffer.len() < SEGMENT_HEADER_SIZE {
            return None;
        }
        let cookie = u32::from_be_bytes(buffer[0..4].try_into().ok()?);
        if cookie != MAGIC_COOKIE || buffer[4] != MSG_TYPE_PAYLOAD {
            return None;
        }
        let total_segments = u64::from_be_bytes(buffer[5..13].try_into().ok()?);
        let current_segment = u64::from_be_bytes(buffer[13..21].try_into().ok()?);
        Some(Self {
            total_segments,
            current_segment,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_round_trip() {
        let offer = OfferMessage {
            udp_port: 20777,
            tcp_port: 20778,
        };
        let bytes = offer.encode();
        assert_eq!(bytes.len(), OFFER_SIZE);
        assert_eq!(OfferMessage::decode(&bytes), Some(offer));
    }

    #[test]
    fn test_request_round_trip() {
        let request = RequestMessage {
            file_size: 1_000_000_000,
        };
        let bytes = request.encode();
        assert_eq!(bytes.len(), REQUEST_SIZE);
        assert_eq!(RequestMessage::decode(&bytes), Some(request));
    }

    #[test]
    fn test_segment_header_round_trip() {
        let header = SegmentHeader {
            total_segments: 977,
            current_segment: 42,
        };
        let mut buffer = [0u8; SEGMENT_HEADER_SIZE];
        header.encode(&mut buffer);
        assert_eq!(SegmentHeader::decode(&buffer), Some(header));
    }

    #[test]
    fn test_decode_rejects_wrong_cookie() {
        let mut offer = OfferMessage {
            udp_port: 1,
            tcp_port: 2,
        }
        .encode();
        offer[0] ^= 0xff;
        assert_eq!(OfferMessage::decode(&offer), None);

        let mut request = RequestMessage { file_size: 5000 }.encode();
        request[3] = 0x00;
        assert_eq!(RequestMessage::decode(&request), None);

        let mut segment = [0u8; SEGMENT_HEADER_SIZE];
        SegmentHeader {
            total_segments: 3,
            current_segment: 1,
        }
        .encode(&mut segment);
        segment[1] ^= 0xff;
        assert_eq!(SegmentHeader::decode(&segment), None);
    }

    #[test]
    fn test_decode_rejects_wrong_type() {
        let mut bytes = OfferMessage {
            udp_port: 9,
            tcp_port: 10,
        }
        .encode();
        bytes[4] = MSG_TYPE_REQUEST;
        assert_eq!(OfferMessage::decode(&bytes), None);
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let offer = OfferMessage {
            udp_port: 1,
            tcp_port: 2,
        }
        .encode();
        assert_eq!(OfferMessage::decode(&offer[..OFFER_SIZE - 1]), None);
        assert_eq!(RequestMessage::decode(&[]), None);
        assert_eq!(SegmentHeader::decode(&offer), None);
    }

    #[test]
    fn test_decode_tolerates_trailing_bytes() {
        let offer = OfferMessage {
            udp_port: 13117,
            tcp_port: 80,
        };
        let mut bytes = offer.encode().to_vec();
        bytes.extend_from_slice(b"trailing");
        assert_eq!(OfferMessage::decode(&bytes), Some(offer));
    }
}
