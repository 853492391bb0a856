//! The wire frame: `START_CODE MODE LENGTH PAYLOAD END_CODE` (§4.3.1/§6.2).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{SessionError, SessionResult};

/// Maximum payload length accepted on read, guarding against a corrupt
/// length field turning into an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// One byte, broadcast to a 4-byte start tag by default (246 repeated).
pub const DEFAULT_START_BYTE: u8 = 246;
/// One byte, broadcast to a 4-byte end tag by default (135 repeated).
pub const DEFAULT_END_BYTE: u8 = 135;

/// The three carrier modes a frame can declare (§4.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A serialized container (`courier-core::Container::serialize_array`).
    Packet,
    /// A length-prefixed file-transfer record (§4.3.5).
    File,
    /// An opaque binary payload, delivered verbatim (§4.3.6).
    Binary,
}

impl Mode {
    fn to_byte(self) -> u8 {
        match self {
            Mode::Packet => 0x00,
            Mode::File => 0x01,
            Mode::Binary => 0x02,
        }
    }

    fn from_byte(b: u8) -> SessionResult<Self> {
        match b {
            0x00 => Ok(Mode::Packet),
            0x01 => Ok(Mode::File),
            0x02 => Ok(Mode::Binary),
            other => Err(SessionError::Framing(format!("unknown mode byte {other:#04x}"))),
        }
    }
}

/// The start/end framing tags negotiated (out of band) between two peers.
/// Both sides must agree on these; they default to 246/135 repeated four
/// times, matching the source's two single-byte constants.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodes {
    pub start: [u8; 4],
    pub end: [u8; 4],
}

impl Default for FrameCodes {
    fn default() -> Self {
        Self {
            start: [DEFAULT_START_BYTE; 4],
            end: [DEFAULT_END_BYTE; 4],
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub mode: Mode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(mode: Mode, payload: Vec<u8>) -> Self {
        Self { mode, payload }
    }

    /// Writes this frame to `writer` as a single logical unit. Callers are
    /// responsible for serializing writes across a session (distilled spec
    /// §5: "the socket must not be written concurrently") — in practice the
    /// top-priority scheduler lane.
    pub async fn write<W: AsyncWriteExt + Unpin>(&self, writer: &mut W, codes: &FrameCodes) -> SessionResult<()> {
        writer.write_all(&codes.start).await?;
        writer.write_all(&[self.mode.to_byte()]).await?;
        writer.write_all(&(self.payload.len() as u32).to_le_bytes()).await?;
        writer.write_all(&self.payload).await?;
        writer.write_all(&codes.end).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads one frame from `reader`, resynchronizing on a bad start/end
    /// code by rescanning byte-by-byte for the next start sequence
    /// (distilled spec §7: framing errors trigger resynchronization).
    pub async fn read<R: AsyncReadExt + Unpin>(reader: &mut R, codes: &FrameCodes) -> SessionResult<Self> {
        scan_for_start(reader, codes).await?;

        let mut mode_byte = [0u8; 1];
        reader.read_exact(&mut mode_byte).await?;
        let mode = Mode::from_byte(mode_byte[0])?;

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes).await?;
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            return Err(SessionError::Framing(format!(
                "frame length {len} exceeds maximum {MAX_FRAME_LEN}"
            )));
        }

        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;

        let mut end_bytes = [0u8; 4];
        reader.read_exact(&mut end_bytes).await?;
        if end_bytes != codes.end {
            return Err(SessionError::Framing(format!(
                "expected end code {:?}, got {:?}",
                codes.end, end_bytes
            )));
        }

        Ok(Frame { mode, payload })
    }
}

/// Reads one byte at a time until the last four bytes read equal
/// `codes.start`, discarding everything before it. This is the
/// "realign-by-rescan" behavior distilled spec §4.3.1 calls for.
async fn scan_for_start<R: AsyncReadExt + Unpin>(reader: &mut R, codes: &FrameCodes) -> SessionResult<()> {
    let mut window = [0u8; 4];
    reader.read_exact(&mut window).await?;
    let mut discarded = 0u64;
    while window != codes.start {
        window.rotate_left(1);
        let mut next = [0u8; 1];
        reader.read_exact(&mut next).await?;
        window[3] = next[0];
        discarded += 1;
        if discarded > MAX_FRAME_LEN as u64 {
            return Err(SessionError::Framing(
                "start code not found within resync limit".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trips_over_an_in_memory_pipe() {
        let codes = FrameCodes::default();
        let frame = Frame::new(Mode::Packet, b"@header={};@data={};".to_vec());
        let mut buf = Vec::new();
        frame.write(&mut buf, &codes).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = Frame::read(&mut cursor, &codes).await.unwrap();
        assert_eq!(read_back.mode, Mode::Packet);
        assert_eq!(read_back.payload, frame.payload);
    }

    #[tokio::test]
    async fn garbage_prefix_is_skipped_on_resync() {
        let codes = FrameCodes::default();
        let frame = Frame::new(Mode::Binary, b"hello".to_vec());
        let mut buf = vec![1, 2, 3, 4, 5, 6, 7];
        frame.write(&mut buf, &codes).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = Frame::read(&mut cursor, &codes).await.unwrap();
        assert_eq!(read_back.payload, b"hello");
    }

    #[tokio::test]
    async fn bad_end_code_is_rejected() {
        let codes = FrameCodes::default();
        let mut buf = Vec::new();
        buf.extend_from_slice(&codes.start);
        buf.push(0x00);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]); // wrong end code
        let mut cursor = std::io::Cursor::new(buf);
        let err = Frame::read(&mut cursor, &codes).await.unwrap_err();
        assert!(matches!(err, SessionError::Framing(_)));
    }
}
