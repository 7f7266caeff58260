//! Packet framing.
//!
//! Every packet starts with four hex digits giving the length of the whole
//! packet, header included. `0000` is the flush packet and carries no
//! payload. All length arithmetic lives here so no caller can produce a
//! header that does not fit in four digits.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read, Write};
use tracing::trace;

use super::{HEADER_LEN, MAX_PACKET_LENGTH, MAX_PACKET_SIZE};
use crate::error::{FilterError, Result};

/// Flush packet header.
const FLUSH: &[u8; HEADER_LEN] = b"0000";

/// A single packet read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Packet with a payload (possibly empty, header `0004`).
    Data(Bytes),
    /// Zero-length flush packet.
    Flush,
}

/// Reads and writes packets over a pair of byte streams.
pub struct PacketCodec<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> PacketCodec<R, W> {
    /// Wrap a reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Give back the underlying streams.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Read one packet.
    ///
    /// End of stream before the first header byte is `StreamClosed`; end of
    /// stream anywhere else is `TruncatedStream`.
    pub fn read_packet(&mut self) -> Result<Packet> {
        let mut header = [0u8; HEADER_LEN];
        match read_fully(&mut self.reader, &mut header)? {
            0 => return Err(FilterError::StreamClosed),
            n if n < HEADER_LEN => {
                return Err(FilterError::TruncatedStream {
                    expected: HEADER_LEN,
                    got: n,
                })
            }
            _ => {}
        }

        let len = parse_header(&header)?;
        if len == 0 {
            trace!("read flush packet");
            return Ok(Packet::Flush);
        }
        if len < HEADER_LEN {
            return Err(FilterError::MalformedHeader(format!(
                "length {len} is shorter than the header"
            )));
        }
        if len > MAX_PACKET_SIZE {
            return Err(FilterError::MalformedHeader(format!(
                "length {len} exceeds maximum of {MAX_PACKET_SIZE}"
            )));
        }

        let payload_len = len - HEADER_LEN;
        let mut payload = BytesMut::zeroed(payload_len);
        let got = read_fully(&mut self.reader, &mut payload)?;
        if got < payload_len {
            return Err(FilterError::TruncatedStream {
                expected: payload_len,
                got,
            });
        }

        trace!(len = payload_len, "read packet");
        Ok(Packet::Data(payload.freeze()))
    }

    /// Read one text packet, stripping a single trailing newline.
    pub fn read_packet_text(&mut self) -> Result<String> {
        match self.read_packet()? {
            Packet::Data(data) => decode_text(&data),
            Packet::Flush => Err(FilterError::UnexpectedFlush),
        }
    }

    /// Read text packets up to and including the terminating flush.
    ///
    /// Only a stream that ends before the first entry counts as closed.
    pub fn read_packet_list(&mut self) -> Result<Vec<String>> {
        let mut items = Vec::new();
        loop {
            match self.read_packet() {
                Ok(Packet::Data(data)) => items.push(decode_text(&data)?),
                Ok(Packet::Flush) => return Ok(items),
                Err(FilterError::StreamClosed) if !items.is_empty() => {
                    return Err(FilterError::TruncatedStream {
                        expected: HEADER_LEN,
                        got: 0,
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write one packet.
    pub fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_PACKET_LENGTH {
            return Err(FilterError::PacketTooLarge(data.len()));
        }

        let header = format!("{:04x}", data.len() + HEADER_LEN);
        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(data)?;
        trace!(len = data.len(), "wrote packet");
        Ok(())
    }

    /// Write a flush packet.
    pub fn write_flush(&mut self) -> Result<()> {
        self.writer.write_all(FLUSH)?;
        trace!("wrote flush packet");
        Ok(())
    }

    /// Write `text` followed by a newline as one packet.
    pub fn write_packet_text(&mut self, text: &str) -> Result<()> {
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        buf.put_slice(text.as_bytes());
        buf.put_u8(b'\n');
        self.write_packet(&buf)
    }

    /// Write each item as a text packet, then a flush packet, then push
    /// everything out to the host.
    pub fn write_packet_list<I, S>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for item in items {
            self.write_packet_text(item.as_ref())?;
        }
        self.write_flush()?;
        self.flush()
    }

    /// Flush buffered output of the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Parse a four digit hex length header.
fn parse_header(header: &[u8; HEADER_LEN]) -> Result<usize> {
    header.iter().try_fold(0usize, |acc, &b| {
        let digit = (b as char).to_digit(16).ok_or_else(|| {
            FilterError::MalformedHeader(format!(
                "invalid hex digits {:?}",
                String::from_utf8_lossy(header)
            ))
        })?;
        Ok(acc * 16 + digit as usize)
    })
}

/// Decode a text packet payload, dropping one trailing `\n`.
fn decode_text(data: &[u8]) -> Result<String> {
    let data = data.strip_suffix(b"\n").unwrap_or(data);
    std::str::from_utf8(data)
        .map(str::to_owned)
        .map_err(|_| FilterError::InvalidText)
}

/// Read until `buf` is full or the stream ends, returning the byte count.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn reader(input: &[u8]) -> PacketCodec<Cursor<Vec<u8>>, Vec<u8>> {
        PacketCodec::new(Cursor::new(input.to_vec()), Vec::new())
    }

    fn writer() -> PacketCodec<io::Empty, Vec<u8>> {
        PacketCodec::new(io::empty(), Vec::new())
    }

    fn written(codec: PacketCodec<io::Empty, Vec<u8>>) -> Vec<u8> {
        codec.into_parts().1
    }

    #[test]
    fn test_read_data_packet() {
        let mut codec = reader(b"0009hello");
        assert_eq!(
            codec.read_packet().unwrap(),
            Packet::Data(Bytes::from_static(b"hello"))
        );
    }

    #[test]
    fn test_read_flush_packet() {
        let mut codec = reader(b"0000");
        assert_eq!(codec.read_packet().unwrap(), Packet::Flush);
    }

    #[test]
    fn test_empty_data_packet_is_not_flush() {
        let mut codec = reader(b"00040000");
        assert_eq!(codec.read_packet().unwrap(), Packet::Data(Bytes::new()));
        assert_eq!(codec.read_packet().unwrap(), Packet::Flush);
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let mut codec = reader(b"000Ahello\n");
        assert_eq!(codec.read_packet_text().unwrap(), "hello");
    }

    #[test]
    fn test_malformed_header() {
        match reader(b"00zzhello").read_packet() {
            Err(FilterError::MalformedHeader(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_header_shorter_than_itself() {
        for input in [&b"0001"[..], b"0002", b"0003"] {
            match reader(input).read_packet() {
                Err(FilterError::MalformedHeader(_)) => {}
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_header_above_maximum() {
        match reader(b"fff1").read_packet() {
            Err(FilterError::MalformedHeader(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload() {
        match reader(b"0009hel").read_packet() {
            Err(FilterError::TruncatedStream { expected, got }) => {
                assert_eq!(expected, 5);
                assert_eq!(got, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_header() {
        match reader(b"00").read_packet() {
            Err(FilterError::TruncatedStream { expected, got }) => {
                assert_eq!(expected, 4);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_stream_closed() {
        let err = reader(b"").read_packet().unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn test_read_text_strips_one_newline() {
        let mut codec = reader(b"0007a\n\n0006b\n0005c");
        assert_eq!(codec.read_packet_text().unwrap(), "a\n");
        assert_eq!(codec.read_packet_text().unwrap(), "b");
        assert_eq!(codec.read_packet_text().unwrap(), "c");
    }

    #[test]
    fn test_read_text_rejects_flush() {
        match reader(b"0000").read_packet_text() {
            Err(FilterError::UnexpectedFlush) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_read_text_rejects_invalid_utf8() {
        match reader(b"0006\xff\xfe").read_packet_text() {
            Err(FilterError::InvalidText) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_read_empty_list() {
        let mut codec = reader(b"0000");
        assert!(codec.read_packet_list().unwrap().is_empty());
    }

    #[test]
    fn test_read_list_truncated_before_flush() {
        let mut codec = reader(b"000eversion=2\n");
        match codec.read_packet_list() {
            Err(FilterError::TruncatedStream { .. }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_read_list_on_closed_stream() {
        assert!(reader(b"").read_packet_list().unwrap_err().is_closed());
    }

    #[test]
    fn test_write_packet() {
        let mut codec = writer();
        codec.write_packet(b"HELLO").unwrap();
        assert_eq!(written(codec), b"0009HELLO");
    }

    #[test]
    fn test_write_empty_packet() {
        let mut codec = writer();
        codec.write_packet(b"").unwrap();
        assert_eq!(written(codec), b"0004");
    }

    #[test]
    fn test_write_max_packet() {
        let data = vec![b'x'; MAX_PACKET_LENGTH];
        let mut codec = writer();
        codec.write_packet(&data).unwrap();
        let out = written(codec);
        assert_eq!(&out[..4], b"fff0");
        assert_eq!(out.len(), MAX_PACKET_SIZE);

        let mut codec = reader(&out);
        assert_eq!(codec.read_packet().unwrap(), Packet::Data(Bytes::from(data)));
    }

    #[test]
    fn test_write_oversized_packet_rejected() {
        let data = vec![b'x'; MAX_PACKET_LENGTH + 1];
        let mut codec = writer();
        match codec.write_packet(&data) {
            Err(FilterError::PacketTooLarge(n)) => assert_eq!(n, MAX_PACKET_LENGTH + 1),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(written(codec).is_empty());
    }

    #[test]
    fn test_write_list() {
        let mut codec = writer();
        codec
            .write_packet_list(["git-filter-server", "version=2"])
            .unwrap();
        assert_eq!(written(codec), b"0016git-filter-server\n000eversion=2\n0000");
    }

    #[test]
    fn test_write_empty_list() {
        let mut codec = writer();
        codec.write_packet_list(Vec::<String>::new()).unwrap();
        assert_eq!(written(codec), b"0000");
    }

    proptest! {
        #[test]
        fn prop_list_round_trip(items in proptest::collection::vec("[a-z=0-9/._ -]{0,40}", 0..300)) {
            let mut codec = writer();
            codec.write_packet_list(&items).unwrap();
            let out = written(codec);

            let mut codec = reader(&out);
            prop_assert_eq!(codec.read_packet_list().unwrap(), items);
            prop_assert!(codec.read_packet().unwrap_err().is_closed());
        }
    }
}
