//! Binary-mode payload: `len|src_id | len|src_sub | len|tgt_id | len|tgt_sub
//! | len|data` (§4.3.6). No container parsing — delivered verbatim.

use crate::error::{SessionError, SessionResult};

/// A decoded binary-line frame.
#[derive(Debug, Clone)]
pub struct BinaryFrame {
    pub source_id: String,
    pub source_sub_id: String,
    pub target_id: String,
    pub target_sub_id: String,
    pub data: Vec<u8>,
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u64).to_le_bytes());
    buf.extend_from_slice(field);
}

fn read_field(bytes: &[u8], offset: &mut usize) -> SessionResult<Vec<u8>> {
    if bytes.len() < *offset + 8 {
        return Err(SessionError::Framing("truncated binary-frame length prefix".into()));
    }
    let len = u64::from_le_bytes(bytes[*offset..*offset + 8].try_into().unwrap()) as usize;
    *offset += 8;
    if bytes.len() < *offset + len {
        return Err(SessionError::Framing("truncated binary-frame field".into()));
    }
    let field = bytes[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(field)
}

fn read_string_field(bytes: &[u8], offset: &mut usize) -> SessionResult<String> {
    let raw = read_field(bytes, offset)?;
    String::from_utf8(raw).map_err(|e| SessionError::Framing(e.to_string()))
}

impl BinaryFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + self.data.len());
        push_field(&mut buf, self.source_id.as_bytes());
        push_field(&mut buf, self.source_sub_id.as_bytes());
        push_field(&mut buf, self.target_id.as_bytes());
        push_field(&mut buf, self.target_sub_id.as_bytes());
        push_field(&mut buf, &self.data);
        buf
    }

    pub fn decode(bytes: &[u8]) -> SessionResult<Self> {
        let mut offset = 0usize;
        Ok(BinaryFrame {
            source_id: read_string_field(bytes, &mut offset)?,
            source_sub_id: read_string_field(bytes, &mut offset)?,
            target_id: read_string_field(bytes, &mut offset)?,
            target_sub_id: read_string_field(bytes, &mut offset)?,
            data: read_field(bytes, &mut offset)?,
        })
    }
}
