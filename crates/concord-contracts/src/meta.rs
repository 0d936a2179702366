//! Meta-agent payloads: capitalizer reports, disruptor bulletins, tension
//! readings.
//!
//! Each meta-agent shares only one property with the others: it consumes
//! context and produces a schema-validated object. These are those objects.

use serde::{Deserialize, Serialize};

use crate::log::Severity;

/// What the capitalizer saw in the recent exchange.
///
/// The environment scans `strategic_hint` against other actors' monologues
/// and redacts any leaked fragment before the hint reaches the next speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalizerReport {
    /// Whether the capitalizer detected exploitable overlap between the
    /// parties' private positions.
    pub overlap_detected: bool,
    /// Self-reported confidence in [1, 10].
    pub confidence_score: u8,
    /// The hint forwarded (post-redaction) to the current speaker.
    pub strategic_hint: String,
    pub rationale: String,
}

/// A fabricated news item the information disruptor injects on cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoBulletin {
    pub headline: String,
    pub severity: Severity,
    /// When false, the bulletin is produced but kept out of the transcript.
    pub inject_into_transcript: bool,
}

/// The tension disruptor's reading of the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensionReading {
    /// New shared tension level in [1, 10]; overwrites
    /// `variables.global_tension_level`.
    pub new_tension_level: u8,
    pub rationale: String,
}
