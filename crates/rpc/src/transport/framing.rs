//! Length-delimited message framing for the TCP transport.
//!
//! Wire format: 4-byte big-endian length prefix followed by one JSON-RPC message.
//!
//! Only incoming frames are capped (`max_len`, chosen by the dialer). Outgoing
//! frames are limited by the prefix alone, so a `save` request is bounded by
//! memory rather than by a fixed frame budget.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default cap on incoming frames (64 MiB); see [`TcpDialer::with_max_frame_size`](super::TcpDialer::with_max_frame_size).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Read one frame, rejecting a length prefix above `max_len` before allocating.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    let len = usize::try_from(len).unwrap_or(usize::MAX);

    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("incoming frame of {len} bytes exceeds the {max_len} byte limit"),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write `data` as one frame and flush.
///
/// Fails with `InvalidInput` only when `data` does not fit the 4-byte prefix.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message of {} bytes does not fit a frame", data.len()),
        )
    })?;

    writer.write_u32(len).await?;
    writer.write_all(data).await?;
    writer.flush().await
}
