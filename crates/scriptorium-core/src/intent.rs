//! Keyword-based intent classification.
//!
//! The source of truth is a fixed rule table so the matching behavior is
//! testable in isolation from the orchestration logic. Matching is
//! case-insensitive substring containment, first table hit wins.

use std::sync::LazyLock;

use regex::Regex;

static PAGE_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(?:halaman|pages?)\b").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// The user wants a full (long-form) script.
    ScriptRequest,
    /// Continue from existing scene work.
    Continuation,
    /// Rework something already generated.
    Revision,
    /// Plain discussion, no generation of script pages.
    Conversation,
}

/// Rule table: keyword -> intent. Ordered; earlier rows win.
const RULES: &[(&str, Intent)] = &[
    ("tulis naskah", Intent::ScriptRequest),
    ("buat naskah", Intent::ScriptRequest),
    ("buatkan naskah", Intent::ScriptRequest),
    ("naskah lengkap", Intent::ScriptRequest),
    ("write the script", Intent::ScriptRequest),
    ("write a script", Intent::ScriptRequest),
    ("full script", Intent::ScriptRequest),
    ("halaman", Intent::ScriptRequest),
    ("pages", Intent::ScriptRequest),
    ("lanjutkan", Intent::Continuation),
    ("teruskan", Intent::Continuation),
    ("continue", Intent::Continuation),
    ("next scene", Intent::Continuation),
    ("adegan berikutnya", Intent::Continuation),
    ("revisi", Intent::Revision),
    ("ubah", Intent::Revision),
    ("ganti", Intent::Revision),
    ("perbaiki", Intent::Revision),
    ("rewrite", Intent::Revision),
    ("revise", Intent::Revision),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Intent {
        let lowered = text.to_lowercase();
        for (keyword, intent) in RULES {
            if lowered.contains(keyword) {
                return *intent;
            }
        }
        Intent::Conversation
    }

    /// Explicit page count in the request ("80 halaman", "25 pages"), if any.
    pub fn requested_pages(&self, text: &str) -> Option<u32> {
        PAGE_COUNT
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}
