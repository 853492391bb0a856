//! One-way XML emission (§6.4). As with JSON, there is no XML parser in
//! scope.

use crate::value::Value;

pub struct HeaderToEncode<'a> {
    pub target_id: &'a str,
    pub target_sub_id: &'a str,
    pub source_id: &'a str,
    pub source_sub_id: &'a str,
    pub message_type: &'a str,
    pub version: &'a str,
}

/// `<container><header>...</header><values>...</values></container>`.
pub fn encode(header: &HeaderToEncode<'_>, units: &[Value]) -> String {
    let mut out = String::from("<container><header>");
    if header.message_type != "data_container" {
        out.push_str(&format!("<target_id>{}</target_id>", escape(header.target_id)));
        out.push_str(&format!(
            "<target_sub_id>{}</target_sub_id>",
            escape(header.target_sub_id)
        ));
        out.push_str(&format!("<source_id>{}</source_id>", escape(header.source_id)));
        out.push_str(&format!(
            "<source_sub_id>{}</source_sub_id>",
            escape(header.source_sub_id)
        ));
    }
    out.push_str(&format!(
        "<message_type>{}</message_type>",
        escape(header.message_type)
    ));
    out.push_str(&format!("<version>{}</version>", escape(header.version)));
    out.push_str("</header><values>");
    for unit in units {
        out.push_str(&unit.to_xml());
    }
    out.push_str("</values></container>");
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
