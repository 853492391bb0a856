//! The container: the top-level transmissible unit (§3.2/§4.2).
//!
//! Internally synchronized with a reader-writer lock, per the design notes
//! in §9 — callers never take a lock themselves, and the type is cheaply
//! `Clone`-able (an `Arc` around the lock) so it can be shared across the
//! scheduler's worker threads the way the source shares `shared_ptr<
//! value_container>` instances.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::codec::{json, text, xml};
use crate::error::{Error, Result};
use crate::value::Value;

/// Default version string. The source is inconsistent — the constructor
/// uses `"1.0.0.0"`, `initialize()` uses `"1.0"` — this implementation picks
/// `"1.0.0.0"` throughout and documents the choice in `DESIGN.md`.
pub const DEFAULT_VERSION: &str = "1.0.0.0";
pub const DEFAULT_MESSAGE_TYPE: &str = "data_container";

struct Inner {
    source_id: String,
    source_sub_id: String,
    target_id: String,
    target_sub_id: String,
    message_type: String,
    version: String,

    /// Whether `units` is materialized. When `false`, `cached_text` (the
    /// last parsed/produced `@data={...};` fragment) is authoritative and
    /// `units` is empty.
    parsed: bool,
    units: Vec<Value>,
    cached_text: String,

    serialization_count: AtomicU64,
}

impl Inner {
    fn empty() -> Self {
        Inner {
            source_id: String::new(),
            source_sub_id: String::new(),
            target_id: String::new(),
            target_sub_id: String::new(),
            message_type: DEFAULT_MESSAGE_TYPE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            parsed: true,
            units: Vec::new(),
            cached_text: "@data={};".to_string(),
            serialization_count: AtomicU64::new(0),
        }
    }

    /// Materializes `units` from `cached_text` if deserialization was
    /// deferred with `header_only = true`.
    fn ensure_parsed(&mut self) -> Result<()> {
        if !self.parsed {
            self.units = text::parse_body(&self.cached_text)?;
            self.parsed = true;
        }
        Ok(())
    }

    fn header_for_encode<'a>(&'a self) -> text::HeaderToEncode<'a> {
        text::HeaderToEncode {
            target_id: &self.target_id,
            target_sub_id: &self.target_sub_id,
            source_id: &self.source_id,
            source_sub_id: &self.source_sub_id,
            message_type: &self.message_type,
            version: &self.version,
        }
    }
}

/// A labelled, typed value tree plus a routing header (§3.2).
#[derive(Clone)]
pub struct Container {
    inner: Arc<RwLock<Inner>>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Container {
            inner: Arc::new(RwLock::new(Inner::empty())),
        }
    }

    /// Builds a container addressed to `target_id`/`target_sub_id` carrying
    /// `units` under `message_type`, matching the source's multi-field
    /// constructors.
    pub fn addressed(
        source_id: impl Into<String>,
        source_sub_id: impl Into<String>,
        target_id: impl Into<String>,
        target_sub_id: impl Into<String>,
        message_type: impl Into<String>,
        units: Vec<Value>,
    ) -> Self {
        let c = Container::new();
        {
            let mut inner = c.inner.write().expect("container lock poisoned");
            inner.source_id = source_id.into();
            inner.source_sub_id = source_sub_id.into();
            inner.target_id = target_id.into();
            inner.target_sub_id = target_sub_id.into();
            inner.message_type = message_type.into();
            inner.units = units;
            inner.parsed = true;
        }
        c
    }

    pub fn from_text(text: &str, header_only: bool) -> Result<Self> {
        let c = Container::new();
        c.deserialize(text, header_only)?;
        Ok(c)
    }

    pub fn from_bytes(bytes: &[u8], header_only: bool) -> Result<Self> {
        let text = String::from_utf8_lossy(bytes);
        Self::from_text(&text, header_only)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("container lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("container lock poisoned")
    }

    pub fn source_id(&self) -> String {
        self.read().source_id.clone()
    }

    pub fn source_sub_id(&self) -> String {
        self.read().source_sub_id.clone()
    }

    pub fn target_id(&self) -> String {
        self.read().target_id.clone()
    }

    pub fn target_sub_id(&self) -> String {
        self.read().target_sub_id.clone()
    }

    pub fn message_type(&self) -> String {
        self.read().message_type.clone()
    }

    pub fn version(&self) -> String {
        self.read().version.clone()
    }

    pub fn set_source(&self, id: impl Into<String>, sub_id: impl Into<String>) {
        let mut inner = self.write();
        inner.source_id = id.into();
        inner.source_sub_id = sub_id.into();
    }

    pub fn set_target(&self, id: impl Into<String>, sub_id: impl Into<String>) {
        let mut inner = self.write();
        inner.target_id = id.into();
        inner.target_sub_id = sub_id.into();
    }

    pub fn set_message_type(&self, message_type: impl Into<String>) {
        self.write().message_type = message_type.into();
    }

    /// Swaps source and target headers — used by the echo responder and by
    /// the bridge's synthesized error replies.
    pub fn swap_header(&self) {
        let mut inner = self.write();
        std::mem::swap(&mut inner.source_id, &mut inner.target_id);
        std::mem::swap(&mut inner.source_sub_id, &mut inner.target_sub_id);
    }

    /// Appends `value` at the end of the top-level list. Rejects an
    /// already-present value (by structural equality — see `DESIGN.md` for
    /// why this supersedes the source's object-identity check) and returns
    /// `false` in that case.
    pub fn add(&self, value: Value) -> Result<bool> {
        let mut inner = self.write();
        inner.ensure_parsed()?;
        if inner.units.contains(&value) {
            return Ok(false);
        }
        inner.units.push(value);
        Ok(true)
    }

    /// Removes every top-level value named `name`.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut inner = self.write();
        inner.ensure_parsed()?;
        inner.units.retain(|v| v.name() != name);
        Ok(())
    }

    /// All top-level values named `name`, in insertion order.
    pub fn value_array(&self, name: &str) -> Result<Vec<Value>> {
        let mut inner = self.write();
        inner.ensure_parsed()?;
        Ok(inner
            .units
            .iter()
            .filter(|v| v.name() == name)
            .cloned()
            .collect())
    }

    /// The `index`-th top-level value named `name`, or a freshly constructed
    /// null-named placeholder if there is no such match.
    pub fn get_value(&self, name: &str, index: usize) -> Value {
        match self.value_array(name) {
            Ok(matches) => matches.into_iter().nth(index).unwrap_or_else(|| Value::null(name)),
            Err(_) => Value::null(name),
        }
    }

    /// All top-level values, in insertion order.
    pub fn units(&self) -> Result<Vec<Value>> {
        let mut inner = self.write();
        inner.ensure_parsed()?;
        Ok(inner.units.clone())
    }

    /// Canonical text form (§6.1). Produces identical bytes whether `units`
    /// or `cached_text` is currently authoritative (round-trip law 1).
    pub fn serialize(&self) -> String {
        let inner = self.read();
        inner.serialization_count.fetch_add(1, Ordering::Relaxed);
        let body = if inner.parsed {
            text::encode_body(&inner.units)
        } else {
            inner.cached_text.clone()
        };
        text::encode_header(&inner.header_for_encode()) + &body
    }

    pub fn serialize_array(&self) -> Vec<u8> {
        self.serialize().into_bytes()
    }

    /// Number of times `serialize`/`serialize_array` has run, exposed for
    /// callers wiring up metrics around hot containers.
    pub fn serialize_count(&self) -> u64 {
        self.read().serialization_count.load(Ordering::Relaxed)
    }

    /// Populates header and (unless `header_only`) body from `text`.
    pub fn deserialize(&self, text_input: &str, header_only: bool) -> Result<()> {
        tracing::trace!(header_only, len = text_input.len(), "deserializing container");
        let mut inner = self.write();
        *inner = Inner::empty();

        let clean = text::normalize(text_input);
        if clean.is_empty() {
            return Ok(());
        }

        if let Some(header) = text::parse_header(&clean)? {
            if let Some(v) = header.target_id {
                inner.target_id = v;
            }
            if let Some(v) = header.target_sub_id {
                inner.target_sub_id = v;
            }
            if let Some(v) = header.source_id {
                inner.source_id = v;
            }
            if let Some(v) = header.source_sub_id {
                inner.source_sub_id = v;
            }
            if let Some(v) = header.message_type {
                inner.message_type = v;
            }
            if let Some(v) = header.version {
                inner.version = v;
            }
        }

        let data_start = clean.find("@data={");
        inner.cached_text = match data_start {
            Some(_) => {
                // Re-extract the exact `@data={...};` slice so cached_text
                // matches what parse_body will later re-derive from.
                let rest = &clean[data_start.unwrap()..];
                let close = rest.find("};").map(|i| i + 2).unwrap_or(rest.len());
                rest[..close].to_string()
            }
            None => "@data={};".to_string(),
        };

        if header_only {
            inner.parsed = false;
        } else {
            inner.units = text::parse_body(&clean)?;
            inner.parsed = true;
        }

        Ok(())
    }

    /// Deep-clones via a serialize/deserialize round trip; when
    /// `with_values` is `false`, the body is dropped after header parsing,
    /// mirroring the source's `clear_value()` call in its own `copy()`.
    pub fn copy(&self, with_values: bool) -> Result<Self> {
        let c = Container::from_text(&self.serialize(), !with_values)?;
        if !with_values {
            let mut inner = c.write();
            inner.units.clear();
            inner.cached_text = "@data={};".to_string();
            inner.parsed = true;
        }
        Ok(c)
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut inner = self.write();
        inner.ensure_parsed()?;
        Ok(xml::encode(
            &xml::HeaderToEncode {
                target_id: &inner.target_id,
                target_sub_id: &inner.target_sub_id,
                source_id: &inner.source_id,
                source_sub_id: &inner.source_sub_id,
                message_type: &inner.message_type,
                version: &inner.version,
            },
            &inner.units,
        ))
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut inner = self.write();
        inner.ensure_parsed()?;
        Ok(json::encode(
            &json::HeaderToEncode {
                target_id: &inner.target_id,
                target_sub_id: &inner.target_sub_id,
                source_id: &inner.source_id,
                source_sub_id: &inner.source_sub_id,
                message_type: &inner.message_type,
                version: &inner.version,
            },
            &inner.units,
        ))
    }

    pub fn load_packet(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(Error::IoFailed)?;
        Self::from_bytes(&bytes, false)
    }

    pub fn save_packet(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.serialize_array()).map_err(Error::IoFailed)
    }
}
