//! Handshake message types and the `request_connection`/`confirm_connection`
//! container shapes (§4.3.2/§6.3).

use courier_core::{Container, Value};

/// `message_type` values the handshake and control-plane recognize.
pub mod message_type {
    pub const REQUEST_CONNECTION: &str = "request_connection";
    pub const CONFIRM_CONNECTION: &str = "confirm_connection";
    pub const ECHO: &str = "echo";
    pub const REQUEST_FILES: &str = "request_files";
    pub const TRANSFER_CONDITION: &str = "transfer_condition";
}

/// The three session kinds a `request_connection` negotiates (§3.3/§4.3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Carries typed `Container` messages.
    MessageLine,
    /// Carries whole-file transfers (§4.3.5).
    FileLine,
    /// Carries opaque binary frames (§4.3.6).
    BinaryLine,
}

impl SessionKind {
    fn to_i16(self) -> i16 {
        match self {
            SessionKind::MessageLine => 0,
            SessionKind::FileLine => 1,
            SessionKind::BinaryLine => 2,
        }
    }

    fn from_i16(v: i16) -> Self {
        match v {
            1 => SessionKind::FileLine,
            2 => SessionKind::BinaryLine,
            _ => SessionKind::MessageLine,
        }
    }
}

/// The client→server handshake request (§6.3).
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub source_id: String,
    pub source_sub_id: String,
    pub connection_key: String,
    pub auto_echo: bool,
    pub auto_echo_interval_seconds: u16,
    pub session_type: SessionKind,
    pub bridge_mode: bool,
    pub snipping_targets: Vec<String>,
}

impl ConnectionRequest {
    pub fn into_container(self) -> Container {
        let mut snips = Value::container("snipping_targets", self.snipping_targets.len() as i64);
        for (i, target) in self.snipping_targets.iter().enumerate() {
            snips.add_child(Value::string(format!("t{i}"), target.clone()));
        }
        let c = Container::addressed(
            self.source_id,
            self.source_sub_id,
            "",
            "",
            message_type::REQUEST_CONNECTION,
            vec![
                Value::string("connection_key", self.connection_key),
                Value::bool("auto_echo", self.auto_echo),
                Value::ushort("auto_echo_interval_seconds", self.auto_echo_interval_seconds),
                Value::short("session_type", self.session_type.to_i16()),
                Value::bool("bridge_mode", self.bridge_mode),
                snips,
            ],
        );
        c
    }

    pub fn from_container(c: &Container) -> courier_core::Result<Self> {
        let units = c.units()?;
        let find = |name: &str| units.iter().find(|v| v.name() == name).cloned();
        let snipping_targets = find("snipping_targets")
            .map(|v| v.children().iter().map(|c| c.to_canonical_string()).collect())
            .unwrap_or_default();
        Ok(ConnectionRequest {
            source_id: c.source_id(),
            source_sub_id: c.source_sub_id(),
            connection_key: find("connection_key").map(|v| v.to_canonical_string()).unwrap_or_default(),
            auto_echo: find("auto_echo").map(|v| v.to_bool()).unwrap_or(false),
            auto_echo_interval_seconds: find("auto_echo_interval_seconds").map(|v| v.to_u16()).unwrap_or(0),
            session_type: find("session_type").map(|v| SessionKind::from_i16(v.to_i16())).unwrap_or(SessionKind::MessageLine),
            bridge_mode: find("bridge_mode").map(|v| v.to_bool()).unwrap_or(false),
            snipping_targets,
        })
    }
}

/// The server→client handshake reply (§6.3).
#[derive(Debug, Clone)]
pub struct ConnectionConfirm {
    pub confirm: bool,
    pub reason: Option<String>,
    pub key: Option<[u8; 32]>,
    pub iv: Option<[u8; 12]>,
    pub encrypt_mode: bool,
    pub snipping_targets: Vec<String>,
}

impl ConnectionConfirm {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ConnectionConfirm {
            confirm: false,
            reason: Some(reason.into()),
            key: None,
            iv: None,
            encrypt_mode: false,
            snipping_targets: Vec::new(),
        }
    }

    pub fn accepted(encrypt_mode: bool, key: Option<[u8; 32]>, iv: Option<[u8; 12]>, snipping_targets: Vec<String>) -> Self {
        ConnectionConfirm {
            confirm: true,
            reason: None,
            key,
            iv,
            encrypt_mode,
            snipping_targets,
        }
    }

    pub fn into_container(self) -> Container {
        let mut values = vec![Value::bool("confirm", self.confirm)];
        if let Some(reason) = &self.reason {
            values.push(Value::string("reason", reason.clone()));
        }
        if self.confirm {
            values.push(Value::bool("encrypt_mode", self.encrypt_mode));
            if let Some(key) = &self.key {
                values.push(Value::bytes("key", key.to_vec()));
            }
            if let Some(iv) = &self.iv {
                values.push(Value::bytes("iv", iv.to_vec()));
            }
            let mut snips = Value::container("snipping_targets", self.snipping_targets.len() as i64);
            for (i, target) in self.snipping_targets.iter().enumerate() {
                snips.add_child(Value::string(format!("t{i}"), target.clone()));
            }
            values.push(snips);
        }
        Container::addressed("", "", "", "", message_type::CONFIRM_CONNECTION, values)
    }

    pub fn from_container(c: &Container) -> courier_core::Result<Self> {
        let units = c.units()?;
        let find = |name: &str| units.iter().find(|v| v.name() == name).cloned();
        let confirm = find("confirm").map(|v| v.to_bool()).unwrap_or(false);
        let key = find("key").map(|v| v.to_bytes()).and_then(|b| <[u8; 32]>::try_from(b).ok());
        let iv = find("iv").map(|v| v.to_bytes()).and_then(|b| <[u8; 12]>::try_from(b).ok());
        let snipping_targets = find("snipping_targets")
            .map(|v| v.children().iter().map(|c| c.to_canonical_string()).collect())
            .unwrap_or_default();
        Ok(ConnectionConfirm {
            confirm,
            reason: find("reason").map(|v| v.to_canonical_string()),
            key,
            iv,
            encrypt_mode: find("encrypt_mode").map(|v| v.to_bool()).unwrap_or(false),
            snipping_targets,
        })
    }
}

/// Builds an `echo` probe container (no `response` field set).
pub fn echo_probe() -> Container {
    Container::addressed("", "", "", "", message_type::ECHO, vec![])
}

/// Builds the `echo` reply: same message type, `response=true`, headers
/// swapped by the caller before sending.
pub fn echo_reply() -> Container {
    Container::addressed("", "", "", "", message_type::ECHO, vec![Value::bool("response", true)])
}

/// Is this container an echo probe (no `response` field, or `response=false`)?
pub fn is_echo_probe(c: &Container) -> bool {
    match c.units() {
        Ok(units) => !units.iter().any(|v| v.name() == "response" && v.to_bool()),
        Err(_) => true,
    }
}
