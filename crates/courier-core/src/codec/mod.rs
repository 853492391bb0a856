//! Wire encodings for a container: the canonical text format (the only one
//! with a parser) plus one-way JSON and XML emitters (§6.4).

pub mod json;
pub mod text;
pub mod xml;
