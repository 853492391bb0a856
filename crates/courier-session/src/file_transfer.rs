//! File-mode payload: a length-prefixed concatenation of fields (§4.3.5).
//!
//! `len|indication_id | len|source_id | len|source_sub | len|target_id |
//! len|target_sub | len|source_path | len|target_path | len|file_bytes`
//! where each `len` is a 64-bit little-endian byte count of the field that
//! follows it.

use crate::error::{SessionError, SessionResult};

/// One file-transfer record, either about to be sent or just received.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub indication_id: String,
    pub source_id: String,
    pub source_sub_id: String,
    pub target_id: String,
    pub target_sub_id: String,
    pub source_path: String,
    pub target_path: String,
    pub file_bytes: Vec<u8>,
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u64).to_le_bytes());
    buf.extend_from_slice(field);
}

fn read_field(bytes: &[u8], offset: &mut usize) -> SessionResult<Vec<u8>> {
    if bytes.len() < *offset + 8 {
        return Err(SessionError::Framing("truncated file-transfer length prefix".into()));
    }
    let len = u64::from_le_bytes(bytes[*offset..*offset + 8].try_into().unwrap()) as usize;
    *offset += 8;
    if bytes.len() < *offset + len {
        return Err(SessionError::Framing("truncated file-transfer field".into()));
    }
    let field = bytes[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(field)
}

fn read_string_field(bytes: &[u8], offset: &mut usize) -> SessionResult<String> {
    let raw = read_field(bytes, offset)?;
    String::from_utf8(raw).map_err(|e| SessionError::Framing(e.to_string()))
}

impl FileRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.file_bytes.len());
        push_field(&mut buf, self.indication_id.as_bytes());
        push_field(&mut buf, self.source_id.as_bytes());
        push_field(&mut buf, self.source_sub_id.as_bytes());
        push_field(&mut buf, self.target_id.as_bytes());
        push_field(&mut buf, self.target_sub_id.as_bytes());
        push_field(&mut buf, self.source_path.as_bytes());
        push_field(&mut buf, self.target_path.as_bytes());
        push_field(&mut buf, &self.file_bytes);
        buf
    }

    pub fn decode(bytes: &[u8]) -> SessionResult<Self> {
        let mut offset = 0usize;
        Ok(FileRecord {
            indication_id: read_string_field(bytes, &mut offset)?,
            source_id: read_string_field(bytes, &mut offset)?,
            source_sub_id: read_string_field(bytes, &mut offset)?,
            target_id: read_string_field(bytes, &mut offset)?,
            target_sub_id: read_string_field(bytes, &mut offset)?,
            source_path: read_string_field(bytes, &mut offset)?,
            target_path: read_string_field(bytes, &mut offset)?,
            file_bytes: read_field(bytes, &mut offset)?,
        })
    }
}

/// A `(source, target)` pair requested via `request_files` (§6.3).
#[derive(Debug, Clone)]
pub struct RequestedFile {
    pub source_path: String,
    pub target_path: String,
}

/// The notification frame emitted after a file is written (§4.3.5):
/// `indication_id, target_id, target_sub_id, saved_path` — `saved_path` is
/// empty on failure.
#[derive(Debug, Clone)]
pub struct FileSaveNotification {
    pub indication_id: String,
    pub target_id: String,
    pub target_sub_id: String,
    pub saved_path: String,
}

impl FileSaveNotification {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        push_field(&mut buf, self.indication_id.as_bytes());
        push_field(&mut buf, self.target_id.as_bytes());
        push_field(&mut buf, self.target_sub_id.as_bytes());
        push_field(&mut buf, self.saved_path.as_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> SessionResult<Self> {
        let mut offset = 0usize;
        Ok(FileSaveNotification {
            indication_id: read_string_field(bytes, &mut offset)?,
            target_id: read_string_field(bytes, &mut offset)?,
            target_sub_id: read_string_field(bytes, &mut offset)?,
            saved_path: read_string_field(bytes, &mut offset)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_record_round_trips() {
        let record = FileRecord {
            indication_id: "X".into(),
            source_id: "alice".into(),
            source_sub_id: "1".into(),
            target_id: "bob".into(),
            target_sub_id: "2".into(),
            source_path: "/tmp/a.bin".into(),
            target_path: "/tmp/b.bin".into(),
            file_bytes: vec![1, 2, 3, 4, 5],
        };
        let encoded = record.encode();
        let decoded = FileRecord::decode(&encoded).unwrap();
        assert_eq!(decoded.indication_id, "X");
        assert_eq!(decoded.file_bytes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn truncated_payload_errs() {
        let record = FileRecord {
            indication_id: "X".into(),
            source_id: "a".into(),
            source_sub_id: "1".into(),
            target_id: "b".into(),
            target_sub_id: "2".into(),
            source_path: "p".into(),
            target_path: "q".into(),
            file_bytes: vec![9; 16],
        };
        let mut encoded = record.encode();
        encoded.truncate(encoded.len() - 4);
        assert!(FileRecord::decode(&encoded).is_err());
    }
}
