//! Length-prefixed frames carrying one JSON envelope each.
//!
//! ```text
//! +-------------------+---------------------------+
//! | length (4 bytes)  |   UTF-8 JSON envelope     |
//! | u32 little-endian |   (length bytes)          |
//! +-------------------+---------------------------+
//! ```
//!
//! The length excludes the prefix. Zero-length frames are keepalives and are
//! skipped by [`read_envelope`].

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Default frame ceiling: 1 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 1_048_576;

#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    /// Largest payload accepted in either direction.
    pub max_payload_bytes: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl FrameLimits {
    pub fn new(max_payload_bytes: u32) -> Self {
        Self { max_payload_bytes }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {size} bytes exceeds limit {max}")]
    PayloadTooLarge { size: usize, max: u32 },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame is not valid UTF-8")]
    NotUtf8(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn closed_or_io(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one raw frame. Returns an empty vector for a keepalive frame.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    limits: &FrameLimits,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(closed_or_io)?;

    let len = u32::from_le_bytes(len_buf);
    if len > limits.max_payload_bytes {
        return Err(FrameError::PayloadTooLarge {
            size: len as usize,
            max: limits.max_payload_bytes,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(closed_or_io)?;
    }
    Ok(payload)
}

/// Write one raw frame and flush.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    limits: &FrameLimits,
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= limits.max_payload_bytes)
        .ok_or(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: limits.max_payload_bytes,
        })?;

    writer.write_all(&len.to_le_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read frames until a non-empty one arrives and return it as text.
pub async fn read_envelope<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    limits: &FrameLimits,
) -> Result<String, FrameError> {
    loop {
        let payload = read_frame(reader, limits).await?;
        if !payload.is_empty() {
            return Ok(String::from_utf8(payload)?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_arrive_in_order_without_merging() {
        let (mut tx, mut rx) = duplex(8192);
        let limits = FrameLimits::default();

        write_frame(&mut tx, b"{\"a\":1}", &limits).await.unwrap();
        write_frame(&mut tx, b"{\"b\":2}", &limits).await.unwrap();

        assert_eq!(read_frame(&mut rx, &limits).await.unwrap(), b"{\"a\":1}");
        assert_eq!(read_frame(&mut rx, &limits).await.unwrap(), b"{\"b\":2}");
    }

    #[tokio::test]
    async fn test_small_buffer_forces_partial_reads() {
        let (mut tx, mut rx) = duplex(8);
        let limits = FrameLimits::default();
        let payload = br#"{"type":"leave","payload":{"playerId":"someone"}}"#;

        let writer = tokio::spawn(async move {
            write_frame(&mut tx, payload, &FrameLimits::default())
                .await
                .unwrap();
        });

        let received = read_frame(&mut rx, &limits).await.unwrap();
        writer.await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_rejected() {
        let (mut tx, mut rx) = duplex(64);
        let limits = FrameLimits::new(16);

        tx.write_all(&1024u32.to_le_bytes()).await.unwrap();
        tx.flush().await.unwrap();

        assert!(matches!(
            read_frame(&mut rx, &limits).await,
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let (mut tx, _rx) = duplex(64);
        let result = write_frame(&mut tx, &[b'x'; 32], &FrameLimits::new(16)).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_envelope_skips_keepalives() {
        let (mut tx, mut rx) = duplex(256);
        let limits = FrameLimits::default();

        write_frame(&mut tx, &[], &limits).await.unwrap();
        write_frame(&mut tx, &[], &limits).await.unwrap();
        write_frame(&mut tx, b"{}", &limits).await.unwrap();

        assert_eq!(read_envelope(&mut rx, &limits).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_invalid_utf8_reported() {
        let (mut tx, mut rx) = duplex(64);
        let limits = FrameLimits::default();
        write_frame(&mut tx, &[0xff, 0xfe], &limits).await.unwrap();

        assert!(matches!(
            read_envelope(&mut rx, &limits).await,
            Err(FrameError::NotUtf8(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_close_reported_as_closed() {
        let (tx, mut rx) = duplex(64);
        drop(tx);
        assert!(matches!(
            read_frame(&mut rx, &FrameLimits::default()).await,
            Err(FrameError::ConnectionClosed)
        ));
    }
}
