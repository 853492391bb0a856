//! One-way JSON emission (§6.4). There is no JSON parser in scope — JSON is
//! an output-only encoding for interop with consumers outside this protocol.

use serde_json::json;

use crate::value::Value;

pub struct HeaderToEncode<'a> {
    pub target_id: &'a str,
    pub target_sub_id: &'a str,
    pub source_id: &'a str,
    pub source_sub_id: &'a str,
    pub message_type: &'a str,
    pub version: &'a str,
}

/// `{header:{...}, values:{<name>: <json-per-value>}}`; a later value with
/// the same name clobbers an earlier one in the `values` map (the source
/// behaves the same way since JSON object keys are not repeatable).
pub fn encode(header: &HeaderToEncode<'_>, units: &[Value]) -> serde_json::Value {
    let mut header_json = serde_json::Map::new();
    if header.message_type != "data_container" {
        header_json.insert("target_id".into(), json!(header.target_id));
        header_json.insert("target_sub_id".into(), json!(header.target_sub_id));
        header_json.insert("source_id".into(), json!(header.source_id));
        header_json.insert("source_sub_id".into(), json!(header.source_sub_id));
    }
    header_json.insert("message_type".into(), json!(header.message_type));
    header_json.insert("version".into(), json!(header.version));

    let mut values = serde_json::Map::new();
    for unit in units {
        values.insert(unit.name().to_string(), unit.to_json());
    }

    json!({ "header": header_json, "values": values })
}
