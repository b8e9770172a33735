//! Record-marking transport framing (RFC 1831 §10): fragments one RPC message over a byte
//! stream. Each fragment is a 4-byte big-endian header — high bit is the last-fragment flag,
//! low 31 bits are the fragment's length — followed by that many bytes of payload.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The largest single fragment this reader accepts (2 GiB - 1, the field's own limit).
const MAX_FRAGMENT_LEN: usize = (1 << 31) - 1;

/// The default split point for outgoing records (spec §4.2).
pub const DEFAULT_WRITE_FRAGMENT_LEN: usize = 1 << 20;

#[derive(Debug)]
pub enum FramerError {
    Io(std::io::Error),
    FragmentTooLarge(usize),
}

impl From<std::io::Error> for FramerError {
    fn from(err: std::io::Error) -> Self {
        FramerError::Io(err)
    }
}

impl std::fmt::Display for FramerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramerError::Io(err) => write!(f, "framer io error: {err}"),
            FramerError::FragmentTooLarge(len) => write!(f, "fragment length {len} exceeds maximum"),
        }
    }
}

impl std::error::Error for FramerError {}

/// Reads fragments until the last-fragment flag is set, returning the reassembled record.
/// Returns `Ok(None)` on a clean EOF before any bytes of a new record were read.
pub async fn read_record<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, FramerError> {
    let mut record = Vec::new();
    let mut started = false;
    loop {
        let mut header = [0u8; 4];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof && !started => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        started = true;
        let word = u32::from_be_bytes(header);
        let is_last = word & 0x8000_0000 != 0;
        let len = (word & 0x7fff_ffff) as usize;
        if len > MAX_FRAGMENT_LEN {
            return Err(FramerError::FragmentTooLarge(len));
        }
        let start = record.len();
        record.resize(start + len, 0);
        reader.read_exact(&mut record[start..]).await?;
        if is_last {
            return Ok(Some(record));
        }
    }
}

/// Writes `body` as one or more fragments, splitting at `fragment_len` bytes. Callers must
/// serialize writes per connection — this function issues several `write_all` calls and is not
/// atomic against interleaved writers.
pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
    fragment_len: usize,
) -> Result<(), FramerError> {
    debug_assert!(fragment_len > 0);
    if body.is_empty() {
        writer.write_all(&(0x8000_0000u32).to_be_bytes()).await?;
        return Ok(());
    }
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + fragment_len).min(body.len());
        let is_last = end == body.len();
        let chunk = &body[offset..end];
        let mut header = chunk.len() as u32;
        if is_last {
            header |= 0x8000_0000;
        }
        writer.write_all(&header.to_be_bytes()).await?;
        writer.write_all(chunk).await?;
        offset = end;
    }
    writer.flush().await?;
    Ok(())
}
