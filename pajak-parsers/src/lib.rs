#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

mod dates;
mod money;

pub use crate::dates::parse_flexible_date;
pub use crate::money::format_amount_id;
pub use crate::money::format_amount_us;
pub use crate::money::parse_amount_minor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    FakturPajak,
    Pph21,
    Pph23,
    Invoice,
    RekeningKoran,
}

impl DocumentType {
    /// Maps an untrusted declared type string. Unknown strings fall back to
    /// `faktur_pajak`, a long-standing quirk of the upload surface; callers
    /// get a warning in the log when it fires.
    #[must_use]
    pub fn from_declared(declared: &str) -> Self {
        match declared.trim().to_ascii_lowercase().as_str() {
            "faktur_pajak" => DocumentType::FakturPajak,
            "pph21" => DocumentType::Pph21,
            "pph23" => DocumentType::Pph23,
            "invoice" => DocumentType::Invoice,
            "rekening_koran" => DocumentType::RekeningKoran,
            other => {
                warn!(declared = other, "unknown document type; treating as faktur_pajak");
                DocumentType::FakturPajak
            }
        }
    }

    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            DocumentType::FakturPajak => "faktur_pajak",
            DocumentType::Pph21 => "pph21",
            DocumentType::Pph23 => "pph23",
            DocumentType::Invoice => "invoice",
            DocumentType::RekeningKoran => "rekening_koran",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            DocumentType::FakturPajak => "Faktur Pajak",
            DocumentType::Pph21 => "PPh 21",
            DocumentType::Pph23 => "PPh 23",
            DocumentType::Invoice => "Invoice",
            DocumentType::RekeningKoran => "Rekening Koran",
        }
    }
}

impl Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Builds the raw-text envelope persisted for documents whose structured
/// extraction happens downstream in the smart mapper.
#[must_use]
pub fn raw_text_envelope(document_type: DocumentType, raw_text: &str, method: &str) -> serde_json::Value {
    let lines = raw_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    serde_json::json!({
        "document_type": document_type.display_name(),
        "raw_text": raw_text,
        "text_lines": lines,
        "extracted_content": {
            "full_text": raw_text,
            "line_count": lines.len(),
            "character_count": raw_text.chars().count(),
            "scan_timestamp": Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        },
        "processing_info": {
            "parsing_method": method,
            "status": "Ready for smart mapper processing",
        },
    })
}

pub trait DocumentParser: Send + Sync {
    fn parse(&self, raw_text: &str) -> serde_json::Value;
}

struct RawTextParser {
    document_type: DocumentType,
    method: &'static str,
}

impl DocumentParser for RawTextParser {
    fn parse(&self, raw_text: &str) -> serde_json::Value {
        raw_text_envelope(self.document_type, raw_text, self.method)
    }
}

/// Dispatches a declared document type to its parser. Adding a type is a
/// registry insert, not a code path.
pub struct ParserRegistry {
    parsers: HashMap<DocumentType, Arc<dyn DocumentParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut parsers: HashMap<DocumentType, Arc<dyn DocumentParser>> = HashMap::new();
        parsers.insert(
            DocumentType::FakturPajak,
            Arc::new(RawTextParser {
                document_type: DocumentType::FakturPajak,
                method: "smart_mapper_ready",
            }),
        );
        for document_type in [DocumentType::Pph21, DocumentType::Pph23, DocumentType::Invoice] {
            parsers.insert(
                document_type,
                Arc::new(RawTextParser {
                    document_type,
                    method: "raw_ocr_output",
                }),
            );
        }
        // The simplified rekening-koran flow also ships a raw-text envelope;
        // the hybrid flow replaces this output entirely.
        parsers.insert(
            DocumentType::RekeningKoran,
            Arc::new(RawTextParser {
                document_type: DocumentType::RekeningKoran,
                method: "raw_ocr_output",
            }),
        );
        Self { parsers }
    }
}

impl ParserRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, document_type: DocumentType, parser: Arc<dyn DocumentParser>) {
        self.parsers.insert(document_type, parser);
    }

    #[must_use]
    pub fn parse(&self, document_type: DocumentType, raw_text: &str) -> serde_json::Value {
        match self.parsers.get(&document_type) {
            Some(parser) => parser.parse(raw_text),
            None => raw_text_envelope(document_type, raw_text, "raw_ocr_output"),
        }
    }
}

/// Collapses runs of whitespace and drops characters outside the word /
/// basic punctuation set. Used on OCR cell text before it is persisted.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .filter(|ch| {
            ch.is_alphanumeric()
                || ch.is_whitespace()
                || matches!(ch, '-' | '.' | '/' | ',' | '_')
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_declared_type_falls_back_to_faktur() {
        assert_eq!(
            DocumentType::from_declared("surat_jalan"),
            DocumentType::FakturPajak
        );
        assert_eq!(
            DocumentType::from_declared("REKENING_KORAN"),
            DocumentType::RekeningKoran
        );
    }

    #[test]
    fn envelope_carries_line_stats() {
        let envelope = raw_text_envelope(
            DocumentType::FakturPajak,
            "FAKTUR PAJAK\n\nNomor: 010.000-24.00000001\n",
            "smart_mapper_ready",
        );

        assert_eq!(envelope["document_type"], "Faktur Pajak");
        assert_eq!(envelope["extracted_content"]["line_count"], 2);
        assert_eq!(
            envelope["processing_info"]["parsing_method"],
            "smart_mapper_ready"
        );
        let lines = envelope["text_lines"].as_array().expect("lines");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn registry_routes_by_type() {
        let registry = ParserRegistry::new();

        let faktur = registry.parse(DocumentType::FakturPajak, "text");
        assert_eq!(faktur["processing_info"]["parsing_method"], "smart_mapper_ready");

        let pph = registry.parse(DocumentType::Pph23, "text");
        assert_eq!(pph["processing_info"]["parsing_method"], "raw_ocr_output");
        assert_eq!(pph["document_type"], "PPh 23");
    }

    #[test]
    fn clean_text_collapses_and_filters() {
        assert_eq!(
            clean_text("  TRANSFER   KE\tPT MAJU  *#!  REF/123 "),
            "TRANSFER KE PT MAJU  REF/123"
        );
    }
}
