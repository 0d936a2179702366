//! Capitalizer privacy enforcement.
//!
//! The capitalizer reads other actors' private monologues; its hint must not
//! leak them. The detection unit is a monologue fragment: monologues are
//! split on sentence punctuation, and any fragment longer than 20 characters
//! found verbatim inside the hint is replaced before the hint propagates.

use tracing::warn;

/// Fragments at or under this many characters are too generic to count as
/// leaks.
const LEAK_THRESHOLD_CHARS: usize = 20;

/// Marker substituted for each leaked fragment.
const REDACTION_MARKER: &str = "[redacted]";

/// Split a monologue into leak-detection fragments.
///
/// Sentence punctuation (`.`, `!`, `?`, `;`) delimits fragments; only
/// trimmed fragments longer than the threshold are detection units.
pub fn leak_fragments(monologue: &str) -> Vec<&str> {
    monologue
        .split(['.', '!', '?', ';'])
        .map(str::trim)
        .filter(|fragment| fragment.chars().count() > LEAK_THRESHOLD_CHARS)
        .collect()
}

/// Scan `hint` against the given monologues and redact every leaked
/// fragment. Returns the cleaned hint and the number of redactions made.
pub fn redact_hint(hint: &str, monologues: &[&str]) -> (String, usize) {
    let mut cleaned = hint.to_string();
    let mut redactions = 0;

    for monologue in monologues {
        for fragment in leak_fragments(monologue) {
            if cleaned.contains(fragment) {
                cleaned = cleaned.replace(fragment, REDACTION_MARKER);
                redactions += 1;
            }
        }
    }

    if redactions > 0 {
        warn!(redactions, "capitalizer hint leaked monologue fragments");
    }

    (cleaned, redactions)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
