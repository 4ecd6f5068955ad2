//! Exact-length reads over async streams

use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Stream ended before any byte of the request arrived
    #[error("Stream ended")]
    EndOfStream,

    #[error("Stream ended after {received} of {expected} bytes")]
    ShortRead { expected: usize, received: usize },

    #[error("Input/Output fail")]
    Io(#[from] std::io::Error),
}

/// Read exactly `count` bytes, waiting until they arrive or the stream ends.
///
/// An end of stream at a message boundary is [`ReadError::EndOfStream`]; one in the
/// middle of the message is [`ReadError::ShortRead`].
pub async fn read_exact_bytes<R>(reader: &mut R, count: usize) -> Result<Vec<u8>, ReadError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0; count];
    let mut received = 0;
    while received < count {
        match reader.read(&mut buf[received..]).await? {
            0 if received == 0 => return Err(ReadError::EndOfStream),
            0 => {
                return Err(ReadError::ShortRead {
                    expected: count,
                    received,
                })
            }
            n => received += n,
        }
    }
    Ok(buf)
}
