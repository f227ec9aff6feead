//! Script text normalization.
//!
//! Generated sections come back with model artifacts: transitions glued to the
//! surrounding prose, markdown bold leaking into scene text, leftover
//! part-boundary markers. `normalize_script` cleans a stitched script into
//! plain screenplay text. It never rewrites scene content, only layout.

use std::sync::LazyLock;

use regex::Regex;

/// Transition keywords that must sit on their own line.
pub const TRANSITIONS: &[&str] = &[
    "CUT TO:",
    "DISSOLVE TO:",
    "FADE TO:",
    "SMASH CUT TO:",
    "MONTAGE",
];

// "CUT TO" without the colon, or with stray spacing, becomes "CUT TO:".
static BARE_TRANSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(SMASH CUT TO|DISSOLVE TO|FADE TO|CUT TO)\b:?").unwrap()
});

// Lines the model uses to label its own output, never part of the script.
static MARKER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:\**(?:BAGIAN|PART|SECTION|LANJUTAN|CONTINUED|END OF (?:PART|SECTION))\b[^\n]*|-{3,}|={3,})[ \t]*$",
    )
    .unwrap()
});

static BOLD_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").unwrap());

static TRANSITION_NEEDS_BREAK_BEFORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\S)[ \t]*(SMASH CUT TO:|DISSOLVE TO:|FADE TO:|CUT TO:|MONTAGE\b)").unwrap()
});

static TRANSITION_NEEDS_BREAK_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(SMASH CUT TO:|DISSOLVE TO:|FADE TO:|CUT TO:|MONTAGE\b)[ \t]*(\S)").unwrap()
});

static EXCESS_BLANKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalize a stitched script into clean screenplay layout.
pub fn normalize_script(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n");

    let text = BARE_TRANSITION.replace_all(&text, "$1:");
    let text = MARKER_LINE.replace_all(&text, "");

    // Drop markdown bold but keep the spanned text; then sweep stray "**".
    let text = BOLD_SPAN.replace_all(&text, "$1");
    let text = text.replace("**", "");

    // Force transitions onto their own line: break before, then break after.
    let text = TRANSITION_NEEDS_BREAK_BEFORE.replace_all(&text, "$1\n\n$2");
    let text = TRANSITION_NEEDS_BREAK_AFTER.replace_all(&text, "$1\n$2");

    let text = EXCESS_BLANKS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Join generated sections into one script, with a blank line between them.
pub fn stitch_sections(sections: &[String]) -> String {
    let merged = sections
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    normalize_script(&merged)
}
