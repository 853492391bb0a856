//! The canonical textual wire format (§6.1):
//!
//! ```text
//! container   := header data
//! header      := "@header={" {pair} "};"
//! data        := "@data={" {entry} "};"
//! pair        := "[" tag "," value "];"
//! entry       := "[" name "," type_code "," text_payload "];"
//! ```
//!
//! Parsing is hand-rolled rather than regex-based: the grammar only ever
//! needs a scan for the next `[` and the next following `];`, which a
//! `str::find` loop does without pulling in a regex engine for a handful of
//! bracket-delimited fields.

use crate::error::{Error, Result};
use crate::value::{Value, ValueKind};

pub const TAG_TARGET_ID: &str = "1";
pub const TAG_TARGET_SUB_ID: &str = "2";
pub const TAG_SOURCE_ID: &str = "3";
pub const TAG_SOURCE_SUB_ID: &str = "4";
pub const TAG_MESSAGE_TYPE: &str = "5";
pub const TAG_VERSION: &str = "6";

/// Parsed header fields, keyed by their wire tag.
#[derive(Debug, Default, Clone)]
pub struct HeaderFields {
    pub target_id: Option<String>,
    pub target_sub_id: Option<String>,
    pub source_id: Option<String>,
    pub source_sub_id: Option<String>,
    pub message_type: Option<String>,
    pub version: Option<String>,
}

/// Strips `\r\n` / `\n` line endings, per the parser algorithm's first step.
pub fn normalize(input: &str) -> String {
    input.replace("\r\n", "").replace(['\r', '\n'], "")
}

/// Scans for a balanced `@header={ ... };` block and parses its `[tag,value];`
/// pairs. Returns `None` if no header block is present (body-only input).
pub fn parse_header(input: &str) -> Result<Option<HeaderFields>> {
    let Some(start) = input.find("@header={") else {
        return Ok(None);
    };
    let inner_start = start + "@header={".len();
    let close = find_balanced_close(input, inner_start)
        .ok_or_else(|| Error::MalformedHeader("unclosed @header brace".to_string()))?;
    let inner = &input[inner_start..close];

    let mut fields = HeaderFields::default();
    for (tag, value) in scan_pairs(inner) {
        match tag.as_str() {
            t if t == TAG_TARGET_ID => fields.target_id = Some(value),
            t if t == TAG_TARGET_SUB_ID => fields.target_sub_id = Some(value),
            t if t == TAG_SOURCE_ID => fields.source_id = Some(value),
            t if t == TAG_SOURCE_SUB_ID => fields.source_sub_id = Some(value),
            t if t == TAG_MESSAGE_TYPE => fields.message_type = Some(value),
            t if t == TAG_VERSION => fields.version = Some(value),
            _ => {}
        }
    }
    Ok(Some(fields))
}

/// Scans `[tag,value];` pairs inside an already-isolated header body.
fn scan_pairs(inner: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let bytes = inner.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let Some(open_rel) = inner[i..].find('[') else {
            break;
        };
        let open = i + open_rel;
        let Some(close_rel) = inner[open..].find("];") else {
            break;
        };
        let close = open + close_rel;
        let body = &inner[open + 1..close];
        if let Some((tag, value)) = body.split_once(',') {
            out.push((tag.trim().to_string(), value.trim().to_string()));
        }
        i = close + 2;
    }
    out
}

/// Finds the index of the `}` that balances the `{` already consumed at
/// `inner_start - 1`, tolerating nested braces in payload text.
fn find_balanced_close(input: &str, inner_start: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut depth = 1i32;
    let mut i = inner_start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Scans for a balanced `@data={ ... };` block and parses its
/// `[name,type,payload];` entries into a flat pre-order list, then
/// reconstructs the nested tree using the declared container child counts
/// (§4.1's depth-first reconstruction).
pub fn parse_body(input: &str) -> Result<Vec<Value>> {
    let Some(start) = input.find("@data={") else {
        return Ok(Vec::new());
    };
    let inner_start = start + "@data={".len();
    let close = find_balanced_close(input, inner_start)
        .ok_or_else(|| Error::MalformedContainer("unclosed @data brace".to_string()))?;
    let inner = &input[inner_start..close];

    let flat = scan_entries(inner)?;
    reconstruct_tree(flat)
}

struct FlatEntry {
    name: String,
    kind: ValueKind,
    text: String,
}

/// Scans `[name,type,text-until-`];`];` entries. `text` may itself contain
/// commas; only the first two commas are structural.
fn scan_entries(inner: &str) -> Result<Vec<FlatEntry>> {
    let mut out = Vec::new();
    let mut i = 0usize;
    loop {
        let Some(open_rel) = inner[i..].find('[') else {
            break;
        };
        let open = i + open_rel;
        let Some(close_rel) = inner[open..].find("];") else {
            break;
        };
        let close = open + close_rel;
        let body = &inner[open + 1..close];

        let mut parts = body.splitn(3, ',');
        let name = parts
            .next()
            .ok_or_else(|| Error::MalformedContainer("missing entry name".to_string()))?
            .trim()
            .to_string();
        let type_str = parts
            .next()
            .ok_or_else(|| Error::MalformedContainer("missing entry type".to_string()))?
            .trim();
        let text = parts.next().unwrap_or("").to_string();

        let code: u8 = type_str
            .parse()
            .map_err(|_| Error::MalformedContainer(format!("non-numeric type code: {type_str}")))?;
        let kind = ValueKind::from_code(code)?;

        out.push(FlatEntry { name, kind, text });
        i = close + 2;
    }
    Ok(out)
}

fn decode_leaf(kind: ValueKind, text: &str) -> Value {
    match kind {
        ValueKind::Null => Value::null(String::new()),
        ValueKind::Bool => Value::bool(String::new(), text == "true"),
        ValueKind::Short => Value::short(String::new(), text.parse().unwrap_or(0)),
        ValueKind::UShort => Value::ushort(String::new(), text.parse().unwrap_or(0)),
        ValueKind::Int => Value::int(String::new(), text.parse().unwrap_or(0)),
        ValueKind::UInt => Value::uint(String::new(), text.parse().unwrap_or(0)),
        ValueKind::Long => Value::long(String::new(), text.parse().unwrap_or(0)),
        ValueKind::ULong => Value::ulong(String::new(), text.parse().unwrap_or(0)),
        ValueKind::LLong => Value::llong(String::new(), text.parse().unwrap_or(0)),
        ValueKind::ULLong => Value::ullong(String::new(), text.parse().unwrap_or(0)),
        ValueKind::Float => Value::float(String::new(), text.parse().unwrap_or(0.0)),
        ValueKind::Double => Value::double(String::new(), text.parse().unwrap_or(0.0)),
        ValueKind::Bytes => Value::bytes(String::new(), decode_hex_pairs(text)),
        ValueKind::String => Value::string(String::new(), text.to_string()),
        ValueKind::Container => Value::container(String::new(), text.parse().unwrap_or(0)),
    }
}

/// Decodes hex-pair `bytes` text. Unlike the source this rejects malformed
/// pairs instead of feeding undefined bytes into the payload (§9 open
/// question); a pair that fails to parse is skipped.
fn decode_hex_pairs(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() / 2);
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i + 1 < chars.len() {
        let pair: String = chars[i..i + 2].iter().collect();
        if let Ok(byte) = u8::from_str_radix(&pair, 16) {
            out.push(byte);
        }
        i += 2;
    }
    out
}

fn named(mut v: Value, name: String) -> Value {
    v.rename(name);
    v
}

/// One node of the flat arena built while scanning; `children` holds arena
/// indices rather than owned values so a container already emitted into its
/// parent can keep accepting children until its declared count is reached.
struct ArenaNode {
    value: Value,
    declared: i64,
    children: Vec<usize>,
}

/// Depth-first reconstruction: push a container when encountered, attach
/// each subsequent entry as its child until the declared count is reached,
/// then pop back to the parent and continue (§4.1). Built over a flat arena
/// first (so an in-progress container can be mutated by index) and
/// converted to the owned nested tree at the end.
fn reconstruct_tree(flat: Vec<FlatEntry>) -> Result<Vec<Value>> {
    let mut arena: Vec<ArenaNode> = Vec::new();
    let mut roots: Vec<usize> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for entry in flat {
        let declared = entry.text.parse::<i64>().unwrap_or(0);
        let is_container = matches!(entry.kind, ValueKind::Container);
        let value = named(decode_leaf(entry.kind, &entry.text), entry.name);

        let idx = arena.len();
        arena.push(ArenaNode {
            value,
            declared: if is_container { declared } else { 0 },
            children: Vec::new(),
        });

        if let Some(&parent) = stack.last() {
            arena[parent].children.push(idx);
        } else {
            roots.push(idx);
        }

        if is_container && declared > 0 {
            stack.push(idx);
        }

        while let Some(&top) = stack.last() {
            if arena[top].children.len() as i64 >= arena[top].declared {
                stack.pop();
            } else {
                break;
            }
        }
    }

    if !stack.is_empty() {
        return Err(Error::MalformedContainer(
            "container ended with unfilled declared child count".to_string(),
        ));
    }

    fn build(arena: &[ArenaNode], idx: usize) -> Value {
        let node = &arena[idx];
        let mut value = node.value.clone();
        for &child_idx in &node.children {
            value.add_child(build(arena, child_idx));
        }
        value
    }

    Ok(roots.into_iter().map(|idx| build(&arena, idx)).collect())
}

/// Header fields to encode; mirrors the container's own header state.
pub struct HeaderToEncode<'a> {
    pub target_id: &'a str,
    pub target_sub_id: &'a str,
    pub source_id: &'a str,
    pub source_sub_id: &'a str,
    pub message_type: &'a str,
    pub version: &'a str,
}

/// Emits `@header={...};`. Source/target pairs are omitted when
/// `message_type == "data_container"` but always accepted on input (§4.2
/// step 3).
pub fn encode_header(h: &HeaderToEncode<'_>) -> String {
    let mut out = String::from("@header={");
    if h.message_type != "data_container" {
        out.push_str(&format!("[{TAG_TARGET_ID},{}];", h.target_id));
        out.push_str(&format!("[{TAG_TARGET_SUB_ID},{}];", h.target_sub_id));
        out.push_str(&format!("[{TAG_SOURCE_ID},{}];", h.source_id));
        out.push_str(&format!("[{TAG_SOURCE_SUB_ID},{}];", h.source_sub_id));
    }
    out.push_str(&format!("[{TAG_MESSAGE_TYPE},{}];", h.message_type));
    out.push_str(&format!("[{TAG_VERSION},{}];", h.version));
    out.push_str("};");
    out
}

/// Emits `@data={...};`, walking each top-level value depth-first so a
/// container's declared count is immediately followed by its children.
pub fn encode_body(units: &[Value]) -> String {
    let mut out = String::from("@data={");
    for unit in units {
        encode_value(unit, &mut out);
    }
    out.push_str("};");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push('[');
    out.push_str(value.name());
    out.push(',');
    out.push_str(&value.kind().code().to_string());
    out.push(',');
    out.push_str(&value.to_canonical_string());
    out.push_str("];");
    if value.is_container() {
        for child in value.children() {
            encode_value(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_header() {
        let text = "@header={[5,data_container];[6,1.0.0.0];};@data={};";
        let header = parse_header(text).unwrap().unwrap();
        assert_eq!(header.message_type.as_deref(), Some("data_container"));
        assert_eq!(header.version.as_deref(), Some("1.0.0.0"));
    }

    #[test]
    fn parses_typed_leaf_body() {
        let text = "@data={[answer,4,42];};";
        let body = parse_body(text).unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].name(), "answer");
        assert_eq!(body[0].to_i32(), 42);
    }

    #[test]
    fn reconstructs_nested_container_s3() {
        let text = "@data={[child,14,2];[a,1,true];[b,1,false];};";
        let body = parse_body(text).unwrap();
        assert_eq!(body.len(), 1);
        let child = &body[0];
        assert_eq!(child.name(), "child");
        assert_eq!(child.children().len(), 2);
        assert_eq!(child.children()[0].name(), "a");
        assert!(child.children()[0].to_bool());
        assert_eq!(child.children()[1].name(), "b");
        assert!(!child.children()[1].to_bool());
    }

    #[test]
    fn encode_then_parse_round_trips_nested_container() {
        let mut child = Value::container("child", 2);
        child.add_child(Value::bool("a", true));
        child.add_child(Value::bool("b", false));
        let text = encode_body(std::slice::from_ref(&child));
        assert_eq!(text, "@data={[child,14,2];[a,1,true];[b,1,false];};");
        let parsed = parse_body(&text).unwrap();
        assert_eq!(parsed, vec![child]);
    }

    #[test]
    fn malformed_container_errors_on_unfilled_count() {
        let text = "@data={[child,14,2];[a,1,true];};";
        assert!(parse_body(text).is_err());
    }
}
