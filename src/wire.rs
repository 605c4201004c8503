//! The fixed eight-byte frame header: `count` then `tag`, both host-order
//! `i32`s. Host order is fine because all peers live on the same machine.

use byteorder::{ByteOrder, NativeEndian};

use crate::tag::Tag;

pub(crate) const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub count: i32,
    pub tag: Tag,
}

impl Header {
    pub fn encode(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        NativeEndian::write_i32(&mut buf[..4], self.count);
        NativeEndian::write_i32(&mut buf[4..], self.tag);
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Header {
        Header {
            count: NativeEndian::read_i32(&buf[..4]),
            tag: NativeEndian::read_i32(&buf[4..]),
        }
    }
}

/// WAITING and RECEIVED frames describe *another* message in their payload:
/// the `(count, tag)` of the receive being advertised or acknowledged. The
/// note reuses the header layout.
pub(crate) fn encode_note(count: i32, tag: Tag) -> [u8; HEADER_LEN] {
    Header { count, tag }.encode()
}

pub(crate) fn decode_note(buf: &[u8]) -> (i32, Tag) {
    (
        NativeEndian::read_i32(&buf[..4]),
        NativeEndian::read_i32(&buf[4..8]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        for (count, tag) in [(0, 0), (4, 7), (-1, -2), (8, -5), (i32::MAX, i32::MIN)] {
            let header = Header { count, tag };
            assert_eq!(Header::decode(&header.encode()), header);
        }
    }

    #[test]
    fn notes_reuse_the_header_layout() {
        let bytes = encode_note(16, -1);
        assert_eq!(decode_note(&bytes), (16, -1));
        assert_eq!(Header::decode(&bytes), Header { count: 16, tag: -1 });
    }
}
