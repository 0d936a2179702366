//! Hash-chained episode journal.
//!
//! The live action log actors see is pruned by the context protocol; the
//! journal is the full archive, and the archive is what the critic judges,
//! so it has to be trustworthy after the fact. Each link carries a SHA-256
//! digest over a domain tag, the previous link's digest, and a JSON body
//! holding the episode id, the link's sequence number, and the log entry.
//! Because every digest folds in its predecessor, rewriting any archived
//! turn invalidates the rest of the chain.
//!
//! The JSON body is produced with serde_json's default (sorted-key, compact)
//! encoding, so the same link always digests to the same value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use concord_contracts::log::ActionLogEntry;

/// Domain tag mixed into every link digest, versioned so a future layout
/// change cannot collide with chains sealed under this one.
const CHAIN_DOMAIN_TAG: &[u8] = b"concord-journal-v1";

/// The `prev_hash` of a chain's first link: all-zero hex, which no real
/// digest can produce.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One link in an episode's hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Zero-based position of this link. Gapless within a chain.
    pub sequence: u64,
    /// The episode this chain archives.
    pub episode_id: String,
    /// The archived action-log record.
    pub entry: ActionLogEntry,
    /// Digest of the preceding link (`GENESIS_HASH` at position 0).
    pub prev_hash: String,
    /// Digest of this link; see [`link_digest`].
    pub this_hash: String,
}

/// Digest one link of the chain.
///
/// The digest covers, in one pass: the versioned domain tag, `prev_hash`,
/// and the JSON body `{entry, episode_id, sequence}`. Keeping the id,
/// position, and record inside a single encoded body (rather than framing
/// each field by hand) means the encoding is unambiguous by construction.
/// Output is lowercase hex.
pub fn link_digest(
    prev_hash: &str,
    episode_id: &str,
    sequence: u64,
    entry: &ActionLogEntry,
) -> String {
    let body = json!({
        "entry": entry,
        "episode_id": episode_id,
        "sequence": sequence,
    });

    let mut hasher = Sha256::new();
    hasher.update(CHAIN_DOMAIN_TAG);
    hasher.update(prev_hash.as_bytes());
    hasher.update(body.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a chain for tampering.
///
/// A chain passes when every link sits where its fields claim: sequence
/// numbers count up from zero with no gaps, each `prev_hash` is the digest
/// of the link before it (the genesis sentinel at position 0), and each
/// `this_hash` reproduces under [`link_digest`]. There is nothing to check
/// in an empty chain, so it passes.
pub fn verify_chain(entries: &[JournalEntry]) -> bool {
    entries.iter().enumerate().all(|(position, link)| {
        let claimed_prev = match position {
            0 => GENESIS_HASH,
            _ => entries[position - 1].this_hash.as_str(),
        };
        link.sequence == position as u64
            && link.prev_hash == claimed_prev
            && link.this_hash
                == link_digest(&link.prev_hash, &link.episode_id, link.sequence, &link.entry)
    })
}

/// The full, unpruned archive of one episode's action log.
///
/// Owned exclusively by its environment; no interior mutability needed.
#[derive(Debug)]
pub struct EpisodeJournal {
    episode_id: String,
    entries: Vec<JournalEntry>,
    sequence: u64,
    last_hash: String,
}

impl EpisodeJournal {
    pub fn new(episode_id: impl Into<String>) -> Self {
        Self {
            episode_id: episode_id.into(),
            entries: Vec::new(),
            sequence: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }

    /// Append one log entry to the chain.
    pub fn append(&mut self, entry: &ActionLogEntry) {
        let this_hash = link_digest(&self.last_hash, &self.episode_id, self.sequence, entry);
        self.entries.push(JournalEntry {
            sequence: self.sequence,
            episode_id: self.episode_id.clone(),
            entry: entry.clone(),
            prev_hash: std::mem::replace(&mut self.last_hash, this_hash.clone()),
            this_hash,
        });
        self.sequence += 1;
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// The archived action log, stripped of chain metadata. This is what the
    /// critic evaluates.
    pub fn transcript(&self) -> Vec<ActionLogEntry> {
        self.entries.iter().map(|link| link.entry.clone()).collect()
    }

    /// Check the in-memory chain for tampering.
    pub fn verify_integrity(&self) -> bool {
        verify_chain(&self.entries)
    }

    /// Seal the journal into an exportable record.
    pub fn seal(&self) -> SealedTranscript {
        SealedTranscript {
            episode_id: self.episode_id.clone(),
            entries: self.entries.clone(),
            sealed_at: Utc::now(),
            terminal_hash: self
                .entries
                .last()
                .map(|link| link.this_hash.clone())
                .unwrap_or_default(),
        }
    }
}

/// A sealed, exportable journal for a finished episode.
///
/// `terminal_hash` is a compact commitment to the entire transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedTranscript {
    pub episode_id: String,
    pub entries: Vec<JournalEntry>,
    pub sealed_at: DateTime<Utc>,
    pub terminal_hash: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use concord_contracts::log::{ActionLogEntry, LogBody};

    use super::{verify_chain, EpisodeJournal, GENESIS_HASH};

    fn make_entry(turn: u64, dialogue: &str) -> ActionLogEntry {
        ActionLogEntry {
            turn,
            speaker_id: "side_a".to_string(),
            body: LogBody::Turn {
                internal_monologue: "…".to_string(),
                public_dialogue: dialogue.to_string(),
                state_mutations: vec![],
                propose_resolution: false,
                abort_episode: false,
            },
        }
    }

    #[test]
    fn sequential_appends_form_a_valid_chain() {
        let mut journal = EpisodeJournal::new("ep-chain");
        journal.append(&make_entry(0, "first"));
        journal.append(&make_entry(1, "second"));
        journal.append(&make_entry(2, "third"));

        assert!(journal.verify_integrity());
        assert_eq!(journal.entries().len(), 3);
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let mut journal = EpisodeJournal::new("ep-tamper");
        journal.append(&make_entry(0, "step-a"));
        journal.append(&make_entry(1, "step-b"));

        let mut entries = journal.entries().to_vec();
        entries[0].entry = make_entry(0, "REWRITTEN");

        assert!(
            !verify_chain(&entries),
            "chain must detect a mutated archived entry"
        );
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let mut journal = EpisodeJournal::new("ep-genesis");
        journal.append(&make_entry(0, "opening"));

        assert_eq!(journal.entries()[0].prev_hash, GENESIS_HASH);
    }

    #[test]
    fn sequences_are_gapless() {
        let mut journal = EpisodeJournal::new("ep-seq");
        for turn in 0..5 {
            journal.append(&make_entry(turn, "line"));
        }
        for (idx, link) in journal.entries().iter().enumerate() {
            assert_eq!(link.sequence, idx as u64);
        }
    }

    #[test]
    fn seal_commits_to_the_last_hash() {
        let mut journal = EpisodeJournal::new("ep-seal");
        journal.append(&make_entry(0, "alpha"));
        journal.append(&make_entry(1, "beta"));

        let sealed = journal.seal();
        assert_eq!(sealed.terminal_hash, journal.entries().last().unwrap().this_hash);
        assert!(verify_chain(&sealed.entries));
    }

    #[test]
    fn empty_chain_is_valid() {
        let journal = EpisodeJournal::new("ep-empty");
        assert!(journal.verify_integrity());
        assert!(verify_chain(&[]));
        assert_eq!(journal.seal().terminal_hash, "");
    }
}
