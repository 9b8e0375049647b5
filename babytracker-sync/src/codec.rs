//! Newline-delimited JSON framing with a hard byte ceiling.
//!
//! Each direction of a connection carries exactly one line. The reader
//! gives up as soon as the ceiling is crossed instead of buffering an
//! unbounded line first.

use crate::error::{SyncError, SyncResult};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Reads one newline-terminated line of at most `max_bytes` bytes,
/// excluding the terminator.
///
/// A final line without terminator is accepted at end of stream. An empty
/// stream yields [`SyncError::ConnectionClosed`].
pub async fn read_line_limited<R>(reader: &mut R, max_bytes: usize) -> SyncResult<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if line.is_empty() {
                return Err(SyncError::ConnectionClosed);
            }
            break;
        }

        match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                if line.len() + pos > max_bytes {
                    return Err(SyncError::PayloadTooLarge { limit: max_bytes });
                }
                line.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                break;
            }
            None => {
                let len = available.len();
                if line.len() + len > max_bytes {
                    return Err(SyncError::PayloadTooLarge { limit: max_bytes });
                }
                line.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|e| SyncError::Protocol(format!("message is not UTF-8: {e}")))
}

/// Serializes `message` as one JSON line and flushes it.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut data = serde_json::to_vec(message)?;
    data.push(b'\n');
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}
