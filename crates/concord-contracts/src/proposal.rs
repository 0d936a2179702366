//! An actor's single-turn output.
//!
//! `ActionProposal` is produced by the model and is untrusted until the
//! gateway has validated it against its schema. The environment then enforces
//! permissions on every mutation before any of them touch the state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One negotiating turn, as returned by a (primary or created) actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposal {
    /// Private chain-of-thought. Never shown to other actors; the capitalizer
    /// sees it but its hints are redacted against leaks.
    pub internal_monologue: String,
    /// The line spoken into the shared transcript.
    pub public_dialogue: String,
    /// Ordered mutations to apply to `StateObject::variables`.
    #[serde(default)]
    pub state_mutations: Vec<StateMutation>,
    /// True when the speaker offers to settle on the current state.
    #[serde(default)]
    pub propose_resolution: bool,
    /// True when the speaker walks away from the table.
    #[serde(default)]
    pub abort_episode: bool,
}

/// A single mutation against the variables subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMutation {
    /// Whether the path is being created or updated.
    pub action: MutationKind,
    /// Dotted key path rooted inside `variables`, e.g. `"concessions.y"`.
    pub path: String,
    /// The value to deep-copy in at the path.
    pub value: Value,
}

/// The two mutation verbs actors may use.
///
/// `Add` creates intermediate mapping nodes as needed. `Modify` requires the
/// intermediate nodes to already exist; a missing intermediate turns the
/// mutation into a logged no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Modify,
    Add,
}
