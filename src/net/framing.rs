//! Message framing for the length-prefixed stream protocol.
//!
//! Format: [4 bytes little-endian length][payload].

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Read a length-prefixed message from a stream
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }

    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write a length-prefixed message to a stream
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    let len_bytes = (data.len() as u32).to_le_bytes();
    stream.write_all(&len_bytes).await?;
    stream.write_all(data).await?;
    stream.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_round_trip() {
        let mut buf = Vec::new();
        assert_ok!(write_message(&mut buf, b"hello").await);
        assert_eq!(&buf[..4], &5u32.to_le_bytes());

        let mut reader = Cursor::new(buf);
        let message = read_message(&mut reader).await.unwrap();
        assert_eq!(message, b"hello");
    }

    #[tokio::test]
    async fn test_empty_message() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"").await.unwrap();

        let mut reader = Cursor::new(buf);
        let message = read_message(&mut reader).await.unwrap();
        assert!(message.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_le_bytes());

        let mut reader = Cursor::new(buf);
        assert!(matches!(
            read_message(&mut reader).await,
            Err(FramingError::MessageTooLarge(_, _))
        ));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_connection_closed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(b"abc");

        let mut reader = Cursor::new(buf);
        assert!(matches!(
            read_message(&mut reader).await,
            Err(FramingError::ConnectionClosed)
        ));
    }
}
