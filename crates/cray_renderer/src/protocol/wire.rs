//! Length-prefixed framing.
//!
//! A frame is an 8-byte big-endian payload length followed by the payload,
//! zero-padded up to a whole number of 1024-byte chunks. A zero length
//! header is a graceful close.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::message::{Action, Message};
use super::{ProtocolError, ProtocolResult};

pub const CHUNK_SIZE: usize = 1024;

/// Upper bound on a single payload. Scene uploads with embedded assets are
/// the largest messages.
pub const MAX_FRAME_SIZE: u64 = 1 << 31;

fn padding(len: usize) -> usize {
    (CHUNK_SIZE - len % CHUNK_SIZE) % CHUNK_SIZE
}

/// Write one frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> ProtocolResult<()> {
    writer.write_u64::<BigEndian>(payload.len() as u64)?;
    writer.write_all(payload)?;
    let pad = padding(payload.len());
    if pad > 0 {
        writer.write_all(&[0u8; CHUNK_SIZE][..pad])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one frame. End of stream and a zero length header both surface as
/// [`ProtocolError::ConnectionClosed`].
pub fn read_frame<R: Read>(reader: &mut R) -> ProtocolResult<Vec<u8>> {
    let len = match reader.read_u64::<BigEndian>() {
        Ok(0) => return Err(ProtocolError::ConnectionClosed),
        Ok(len) => len,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(ProtocolError::ConnectionClosed),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    read_exact_or_closed(reader, &mut payload)?;

    let pad = padding(payload.len());
    if pad > 0 {
        let mut scratch = [0u8; CHUNK_SIZE];
        read_exact_or_closed(reader, &mut scratch[..pad])?;
    }
    Ok(payload)
}

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(e),
    })
}

/// A framed JSON message stream over one TCP socket.
#[derive(Debug)]
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer: String,
}

impl Connection {
    pub fn new(stream: TcpStream) -> ProtocolResult<Self> {
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: BufWriter::new(stream),
            peer,
        })
    }

    /// Connect to `address`, trying each resolved address within `timeout`.
    pub fn connect(address: &str, timeout: Duration) -> ProtocolResult<Self> {
        let mut last_error = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::new(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotFound, format!("{} did not resolve", address)))
            .into())
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn send(&mut self, message: &Message) -> ProtocolResult<()> {
        let payload = serde_json::to_vec(message)?;
        log::debug!("-> {} {} ({} bytes)", self.peer, message.name(), payload.len());
        write_frame(&mut self.writer, &payload)
    }

    pub fn send_action(&mut self, action: Action) -> ProtocolResult<()> {
        self.send(&Message::Action(action))
    }

    pub fn send_error(&mut self, error: impl Into<String>) -> ProtocolResult<()> {
        self.send(&Message::Error { error: error.into() })
    }

    pub fn receive(&mut self) -> ProtocolResult<Message> {
        let payload = read_frame(&mut self.reader)?;
        let message: Message = serde_json::from_slice(&payload)?;
        log::debug!("<- {} {} ({} bytes)", self.peer, message.name(), payload.len());
        Ok(message)
    }

    /// Receive and unwrap an action, turning `{"error": ..}` into
    /// [`ProtocolError::Remote`].
    pub fn receive_action(&mut self) -> ProtocolResult<Action> {
        match self.receive()? {
            Message::Action(action) => Ok(action),
            Message::Error { error } => Err(ProtocolError::Remote(error)),
        }
    }

    /// Send the zero-length close frame and shut the socket down.
    pub fn close(&mut self) {
        let _ = self.writer.write_u64::<BigEndian>(0).and_then(|_| self.writer.flush());
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_is_chunk_padded() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"{\"action\":\"ok\"}").unwrap();
        assert_eq!(buf.len(), 8 + CHUNK_SIZE);
        assert_eq!(&buf[..8], &15u64.to_be_bytes());
        assert!(buf[8 + 15..].iter().all(|&b| b == 0));

        let mut exact = Vec::new();
        write_frame(&mut exact, &[7u8; CHUNK_SIZE]).unwrap();
        assert_eq!(exact.len(), 8 + CHUNK_SIZE);
    }

    #[test]
    fn test_frames_read_back_in_sequence() {
        let mut buf = Vec::new();
        let big = vec![42u8; 3000];
        write_frame(&mut buf, b"first").unwrap();
        write_frame(&mut buf, &big).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"first");
        assert_eq!(read_frame(&mut cursor).unwrap(), big);
        assert!(matches!(read_frame(&mut cursor), Err(ProtocolError::ConnectionClosed)));
    }

    #[test]
    fn test_zero_length_is_close() {
        let mut cursor = Cursor::new(0u64.to_be_bytes().to_vec());
        assert!(matches!(read_frame(&mut cursor), Err(ProtocolError::ConnectionClosed)));
    }

    #[test]
    fn test_truncated_payload_is_close() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u64.to_be_bytes());
        buf.extend_from_slice(&[1u8; 40]);
        assert!(matches!(read_frame(&mut Cursor::new(buf)), Err(ProtocolError::ConnectionClosed)));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let buf = (MAX_FRAME_SIZE + 1).to_be_bytes().to_vec();
        assert!(matches!(read_frame(&mut Cursor::new(buf)), Err(ProtocolError::FrameTooLarge(_))));
    }
}
