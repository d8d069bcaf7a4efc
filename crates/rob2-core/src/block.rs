//! Extracted document text blocks and the evidence items derived from them.

use serde::{Deserialize, Serialize};

use crate::judgement::{EvidenceItem, UNKNOWN_PAGE, lenient_page};

/// One entry of a content list produced by upstream PDF extraction.
///
/// Non-text entries (images, tables without captions) are kept in sequence so
/// neighbor indices stay aligned with the source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default = "unknown", deserialize_with = "lenient_page")]
    pub page_idx: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_level: Option<u32>,
}

fn unknown() -> i64 {
    UNKNOWN_PAGE
}

impl TextBlock {
    pub fn text(text: impl Into<String>, page_idx: i64) -> Self {
        Self {
            kind: Some("text".to_string()),
            text: text.into(),
            page_idx,
            text_level: None,
        }
    }

    pub fn heading(text: impl Into<String>, page_idx: i64, level: u32) -> Self {
        Self {
            text_level: Some(level),
            ..Self::text(text, page_idx)
        }
    }

    /// Whether this block has text worth classifying.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn is_top_heading(&self) -> bool {
        self.text_level == Some(1)
    }

    pub fn to_evidence(&self) -> EvidenceItem {
        EvidenceItem::new(self.text.clone(), self.page_idx)
    }
}
