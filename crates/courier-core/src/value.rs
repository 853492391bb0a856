//! The value model: a tagged-variant node forming an N-ary tree.
//!
//! A [`Value`] owns its children directly (`Vec<Value>`) rather than through
//! a shared/non-owning parent pointer as the original implementation did —
//! Rust ownership already gives us "destroying a container destroys its
//! descendants" and "a child's parent pointer never outlives the parent" for
//! free. Code that needs to walk upward uses a [`ValuePath`] captured while
//! descending instead of a stored back-reference; see `DESIGN.md` for the
//! rationale.

use std::fmt;

use crate::error::{Error, Result};

/// Stable numeric type tags, part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Null = 0,
    Bool = 1,
    Short = 2,
    UShort = 3,
    Int = 4,
    UInt = 5,
    Long = 6,
    ULong = 7,
    LLong = 8,
    ULLong = 9,
    Float = 10,
    Double = 11,
    Bytes = 12,
    String = 13,
    Container = 14,
}

impl ValueKind {
    /// Maps a wire type code to its `ValueKind`.
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => ValueKind::Null,
            1 => ValueKind::Bool,
            2 => ValueKind::Short,
            3 => ValueKind::UShort,
            4 => ValueKind::Int,
            5 => ValueKind::UInt,
            6 => ValueKind::Long,
            7 => ValueKind::ULong,
            8 => ValueKind::LLong,
            9 => ValueKind::ULLong,
            10 => ValueKind::Float,
            11 => ValueKind::Double,
            12 => ValueKind::Bytes,
            13 => ValueKind::String,
            14 => ValueKind::Container,
            other => return Err(Error::InvalidType(other)),
        })
    }

    /// The wire type code for this kind.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A labelled, typed node in a container's value tree.
///
/// `payload` always holds the *binary* representation (little-endian for
/// numerics, raw UTF-8 for strings, raw bytes for `bytes`); the canonical
/// *text* representation used on the wire is produced by the codec in
/// [`crate::codec::text`], not stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    name: String,
    kind: ValueKind,
    payload: Vec<u8>,
    children: Vec<Value>,
}

/// A path from a tree root down to a descendant, captured while walking so
/// callers can step back up without a stored parent pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuePath(Vec<usize>);

impl ValuePath {
    pub fn root() -> Self {
        ValuePath(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        ValuePath(path)
    }

    /// The path to this node's parent, or `None` if this is the root.
    pub fn parent(&self) -> Option<ValuePath> {
        if self.0.is_empty() {
            None
        } else {
            let mut path = self.0.clone();
            path.pop();
            Some(ValuePath(path))
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

impl Value {
    /// Stores `raw_bytes` unmodified under `name`/`kind`.
    pub fn new(name: impl Into<String>, kind: ValueKind, raw_bytes: Vec<u8>) -> Self {
        Value {
            name: name.into(),
            kind,
            payload: raw_bytes,
            children: Vec::new(),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Value::new(name, ValueKind::Null, Vec::new())
    }

    pub fn bool(name: impl Into<String>, v: bool) -> Self {
        Value::new(name, ValueKind::Bool, vec![v as u8])
    }

    pub fn short(name: impl Into<String>, v: i16) -> Self {
        Value::new(name, ValueKind::Short, v.to_le_bytes().to_vec())
    }

    pub fn ushort(name: impl Into<String>, v: u16) -> Self {
        Value::new(name, ValueKind::UShort, v.to_le_bytes().to_vec())
    }

    pub fn int(name: impl Into<String>, v: i32) -> Self {
        Value::new(name, ValueKind::Int, v.to_le_bytes().to_vec())
    }

    pub fn uint(name: impl Into<String>, v: u32) -> Self {
        Value::new(name, ValueKind::UInt, v.to_le_bytes().to_vec())
    }

    pub fn long(name: impl Into<String>, v: i64) -> Self {
        Value::new(name, ValueKind::Long, v.to_le_bytes().to_vec())
    }

    pub fn ulong(name: impl Into<String>, v: u64) -> Self {
        Value::new(name, ValueKind::ULong, v.to_le_bytes().to_vec())
    }

    pub fn llong(name: impl Into<String>, v: i64) -> Self {
        Value::new(name, ValueKind::LLong, v.to_le_bytes().to_vec())
    }

    pub fn ullong(name: impl Into<String>, v: u64) -> Self {
        Value::new(name, ValueKind::ULLong, v.to_le_bytes().to_vec())
    }

    pub fn float(name: impl Into<String>, v: f32) -> Self {
        Value::new(name, ValueKind::Float, v.to_le_bytes().to_vec())
    }

    pub fn double(name: impl Into<String>, v: f64) -> Self {
        Value::new(name, ValueKind::Double, v.to_le_bytes().to_vec())
    }

    pub fn bytes(name: impl Into<String>, v: impl Into<Vec<u8>>) -> Self {
        Value::new(name, ValueKind::Bytes, v.into())
    }

    pub fn string(name: impl Into<String>, v: impl Into<String>) -> Self {
        Value::new(name, ValueKind::String, v.into().into_bytes())
    }

    /// A container value declaring `count` children, to be populated by
    /// [`Value::add_child`] as they are constructed or parsed.
    pub fn container(name: impl Into<String>, count: i64) -> Self {
        Value {
            name: name.into(),
            kind: ValueKind::Container,
            payload: count.to_le_bytes().to_vec(),
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: Value) {
        self.children.push(child);
    }

    /// Used by the text decoder, which constructs a value's typed payload
    /// before it knows the entry's name.
    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn children(&self) -> &[Value] {
        &self.children
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ValueKind::Container)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    /// Declared child count: for a container, the number encoded in the
    /// payload; for anything else, zero.
    pub fn child_count(&self) -> i64 {
        if self.is_container() {
            self.to_i64()
        } else {
            0
        }
    }

    fn le_bytes<const N: usize>(&self) -> [u8; N] {
        let mut buf = [0u8; N];
        let n = self.payload.len().min(N);
        buf[..n].copy_from_slice(&self.payload[..n]);
        buf
    }

    pub fn to_bool(&self) -> bool {
        match self.kind {
            ValueKind::Bool => self.payload.first().copied().unwrap_or(0) != 0,
            ValueKind::Null => false,
            _ => self.to_i64() != 0,
        }
    }

    pub fn to_i16(&self) -> i16 {
        self.to_i64() as i16
    }

    pub fn to_u16(&self) -> u16 {
        self.to_u64() as u16
    }

    pub fn to_i32(&self) -> i32 {
        self.to_i64() as i32
    }

    pub fn to_u32(&self) -> u32 {
        self.to_u64() as u32
    }

    /// Canonical signed 64-bit view, used for `long`/`llong` and as the
    /// common path for narrower signed conversions.
    pub fn to_i64(&self) -> i64 {
        match self.kind {
            ValueKind::Bool => self.payload.first().copied().unwrap_or(0) as i64,
            ValueKind::Short => i16::from_le_bytes(self.le_bytes()) as i64,
            ValueKind::UShort => u16::from_le_bytes(self.le_bytes()) as i64,
            ValueKind::Int => i32::from_le_bytes(self.le_bytes()) as i64,
            ValueKind::UInt => u32::from_le_bytes(self.le_bytes()) as i64,
            ValueKind::Long | ValueKind::LLong | ValueKind::Container => {
                i64::from_le_bytes(self.le_bytes())
            }
            ValueKind::ULong | ValueKind::ULLong => u64::from_le_bytes(self.le_bytes()) as i64,
            ValueKind::Float => f32::from_le_bytes(self.le_bytes()) as i64,
            ValueKind::Double => f64::from_le_bytes(self.le_bytes()) as i64,
            ValueKind::Bytes | ValueKind::Null | ValueKind::String => 0,
        }
    }

    /// Canonical unsigned 64-bit view, used for `ulong`/`ullong` and as the
    /// common path for narrower unsigned conversions.
    pub fn to_u64(&self) -> u64 {
        match self.kind {
            ValueKind::ULong | ValueKind::ULLong => u64::from_le_bytes(self.le_bytes()),
            // C-style widening/narrowing: a negative signed value wraps
            // rather than clamping, so e.g. `int(-1)` yields `u64::MAX`.
            _ => self.to_i64() as u64,
        }
    }

    pub fn to_f32(&self) -> f32 {
        match self.kind {
            ValueKind::Float => f32::from_le_bytes(self.le_bytes()),
            ValueKind::Double => f64::from_le_bytes(self.le_bytes()) as f32,
            _ => self.to_i64() as f32,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self.kind {
            ValueKind::Double => f64::from_le_bytes(self.le_bytes()),
            ValueKind::Float => f32::from_le_bytes(self.le_bytes()) as f64,
            _ => self.to_i64() as f64,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self.kind {
            ValueKind::Bytes => self.payload.clone(),
            ValueKind::String => self.payload.clone(),
            _ => self.payload.clone(),
        }
    }

    /// Canonical text representation used in the wire format (§4.1): every
    /// leaf converts to a string.
    pub fn to_canonical_string(&self) -> String {
        match self.kind {
            ValueKind::Null => String::new(),
            ValueKind::Bool => self.to_bool().to_string(),
            ValueKind::Short => self.to_i16().to_string(),
            ValueKind::UShort => self.to_u16().to_string(),
            ValueKind::Int => self.to_i32().to_string(),
            ValueKind::UInt => self.to_u32().to_string(),
            ValueKind::Long | ValueKind::LLong => self.to_i64().to_string(),
            ValueKind::ULong | ValueKind::ULLong => self.to_u64().to_string(),
            ValueKind::Float => format_shortest_f32(self.to_f32()),
            ValueKind::Double => format_shortest_f64(self.to_f64()),
            ValueKind::Bytes => hex::encode(&self.payload),
            ValueKind::String => String::from_utf8_lossy(&self.payload).into_owned(),
            ValueKind::Container => self.to_i64().to_string(),
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("<value name=\"{}\" type=\"{}\">", self.name, self.kind));
        if self.is_container() {
            for child in &self.children {
                out.push_str(&child.to_xml());
            }
        } else {
            out.push_str(&xml_escape(&self.to_canonical_string()));
        }
        out.push_str("</value>");
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        if self.is_container() {
            let children: Vec<_> = self.children.iter().map(Value::to_json).collect();
            json!({ "name": self.name, "type": self.kind.code(), "children": children })
        } else {
            json!({ "name": self.name, "type": self.kind.code(), "value": self.to_canonical_string() })
        }
    }
}

/// Shortest round-trippable decimal for an `f32`.
fn format_shortest_f32(v: f32) -> String {
    let mut s = format!("{v}");
    if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN") {
        s.push_str(".0");
    }
    s
}

/// Shortest round-trippable decimal for an `f64`.
fn format_shortest_f64(v: f64) -> String {
    let mut s = format!("{v}");
    if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN") {
        s.push_str(".0");
    }
    s
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
