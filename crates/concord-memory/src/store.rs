//! SQLite-backed run history.
//!
//! One database per run lineage. Migrations are forward-only: each version
//! is applied inside a transaction and recorded in `schema_versions`; when a
//! file-backed database is behind the current schema, a backup copy is
//! written next to it before anything is touched.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{info, warn};

use concord_contracts::error::{ConcordError, ConcordResult};
use concord_contracts::log::ActionLogEntry;
use concord_contracts::provision::NewAgentProvisioning;
use concord_contracts::state::TerminationReason;

/// Ordered, append-only migration list. Never edit a shipped entry; add a
/// new version instead.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "
    CREATE TABLE generations (
        id              INTEGER PRIMARY KEY,
        generation      INTEGER NOT NULL,
        converged       INTEGER NOT NULL DEFAULT 0,
        notes           TEXT
    );

    CREATE TABLE agent_profiles (
        id              INTEGER PRIMARY KEY,
        generation_id   INTEGER NOT NULL REFERENCES generations(id),
        agent_id        TEXT NOT NULL,
        strategy_text   TEXT NOT NULL,
        temperature     REAL NOT NULL,
        frequency_penalty REAL NOT NULL
    );

    CREATE TABLE episodes (
        id                  INTEGER PRIMARY KEY,
        generation_id       INTEGER NOT NULL REFERENCES generations(id),
        episode_id          TEXT NOT NULL UNIQUE,
        termination_reason  TEXT NOT NULL,
        agent_a_score       INTEGER,
        agent_b_score       INTEGER,
        final_state         TEXT NOT NULL,
        status              TEXT NOT NULL DEFAULT 'complete'
    );

    CREATE TABLE action_logs (
        id          INTEGER PRIMARY KEY,
        episode_id  TEXT NOT NULL,
        turn_number INTEGER NOT NULL,
        entry       TEXT NOT NULL
    );

    CREATE TABLE created_agents (
        id          INTEGER PRIMARY KEY,
        agent_id    TEXT NOT NULL,
        archetype   TEXT NOT NULL,
        spec        TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'proposed'
    );

    CREATE INDEX idx_episodes_generation_score ON episodes(generation_id, agent_a_score);
    CREATE INDEX idx_episodes_status ON episodes(status);
    CREATE INDEX idx_action_logs_episode_turn ON action_logs(episode_id, turn_number);
    CREATE INDEX idx_created_agents_status ON created_agents(status);
    ",
)];

fn store_err(context: &str, e: impl fmt::Display) -> ConcordError {
    ConcordError::Store {
        reason: format!("{context}: {e}"),
    }
}

/// A persisted episode row.
#[derive(Debug, Clone)]
pub struct EpisodeRow {
    pub episode_id: String,
    pub termination_reason: String,
    pub agent_a_score: Option<i64>,
    pub agent_b_score: Option<i64>,
    pub status: String,
}

/// SQLite store for generations, episodes, transcripts, and created agents.
pub struct SqliteStore {
    conn: Connection,
    /// Set for file-backed stores; used for pre-migration backups.
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a file-backed store and bring it to the current
    /// schema version.
    pub fn open(path: impl AsRef<Path>) -> ConcordResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| store_err("open database", e))?;
        let mut store = Self {
            conn,
            path: Some(path),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (tests, dry runs).
    pub fn open_in_memory() -> ConcordResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| store_err("open database", e))?;
        let mut store = Self { conn, path: None };
        store.migrate()?;
        Ok(store)
    }

    /// The schema version the store is currently at. Zero when virgin.
    pub fn schema_version(&self) -> ConcordResult<i64> {
        let exists: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_versions'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| store_err("probe schema_versions", e))?;
        if exists.is_none() {
            return Ok(0);
        }
        self.conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_versions",
                [],
                |row| row.get(0),
            )
            .map_err(|e| store_err("read schema version", e))
    }

    /// Apply every pending migration, forward-only.
    fn migrate(&mut self) -> ConcordResult<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_versions (
                    version    INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
                );",
            )
            .map_err(|e| store_err("create schema_versions", e))?;

        let current = self.schema_version()?;
        let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _)| *v > current).collect();
        if pending.is_empty() {
            return Ok(());
        }

        // A database that is behind gets a safety copy before the first
        // pending migration touches it.
        if current > 0 {
            self.backup_before_migration(current)?;
        }

        for (version, sql) in pending {
            let tx = self
                .conn
                .transaction()
                .map_err(|e| store_err("begin migration", e))?;
            tx.execute_batch(sql)
                .map_err(|e| store_err(&format!("apply migration v{version}"), e))?;
            tx.execute(
                "INSERT INTO schema_versions (version) VALUES (?1)",
                params![version],
            )
            .map_err(|e| store_err("record migration", e))?;
            tx.commit().map_err(|e| store_err("commit migration", e))?;
            info!(version, "schema migration applied");
        }
        Ok(())
    }

    fn backup_before_migration(&self, current: i64) -> ConcordResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let backup = path.with_extension(format!("v{current}.bak"));
        match std::fs::copy(path, &backup) {
            Ok(_) => info!(backup = %backup.display(), "pre-migration backup written"),
            Err(e) => warn!(error = %e, "pre-migration backup failed; continuing"),
        }
        Ok(())
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Record a generation; returns its row id for foreign keys.
    pub fn insert_generation(
        &self,
        generation: u32,
        converged: bool,
        notes: &Value,
    ) -> ConcordResult<i64> {
        self.conn
            .execute(
                "INSERT INTO generations (generation, converged, notes) VALUES (?1, ?2, ?3)",
                params![generation, converged, notes.to_string()],
            )
            .map_err(|e| store_err("insert generation", e))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Snapshot one actor's strategy as it stood in a generation.
    pub fn insert_agent_profile(
        &self,
        generation_id: i64,
        agent_id: &str,
        strategy_text: &str,
        temperature: f64,
        frequency_penalty: f64,
    ) -> ConcordResult<()> {
        self.conn
            .execute(
                "INSERT INTO agent_profiles
                 (generation_id, agent_id, strategy_text, temperature, frequency_penalty)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![generation_id, agent_id, strategy_text, temperature, frequency_penalty],
            )
            .map_err(|e| store_err("insert agent profile", e))?;
        Ok(())
    }

    /// Record one finished episode. The two score columns carry the first
    /// two primary actors in roster order.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_episode(
        &self,
        generation_id: i64,
        episode_id: &str,
        reason: TerminationReason,
        agent_a_score: Option<i64>,
        agent_b_score: Option<i64>,
        final_state: &Value,
        status: &str,
    ) -> ConcordResult<()> {
        self.conn
            .execute(
                "INSERT INTO episodes
                 (generation_id, episode_id, termination_reason, agent_a_score, agent_b_score,
                  final_state, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    generation_id,
                    episode_id,
                    reason.as_str(),
                    agent_a_score,
                    agent_b_score,
                    final_state.to_string(),
                    status
                ],
            )
            .map_err(|e| store_err("insert episode", e))?;
        Ok(())
    }

    /// Persist an episode's full transcript, one row per entry.
    pub fn insert_action_log(
        &self,
        episode_id: &str,
        entries: &[ActionLogEntry],
    ) -> ConcordResult<()> {
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO action_logs (episode_id, turn_number, entry) VALUES (?1, ?2, ?3)",
            )
            .map_err(|e| store_err("prepare action log insert", e))?;
        for entry in entries {
            let encoded =
                serde_json::to_string(entry).map_err(|e| store_err("encode log entry", e))?;
            stmt.execute(params![episode_id, entry.turn, encoded])
                .map_err(|e| store_err("insert log entry", e))?;
        }
        Ok(())
    }

    /// Record a provisioned agent, whatever its fate.
    pub fn insert_created_agent(
        &self,
        spec: &NewAgentProvisioning,
        status: &str,
    ) -> ConcordResult<()> {
        let encoded = serde_json::to_string(spec).map_err(|e| store_err("encode spec", e))?;
        self.conn
            .execute(
                "INSERT INTO created_agents (agent_id, archetype, spec, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![spec.agent_id, spec.archetype, encoded, status],
            )
            .map_err(|e| store_err("insert created agent", e))?;
        Ok(())
    }

    /// Move a created agent to a new lifecycle status.
    pub fn update_created_agent_status(&self, agent_id: &str, status: &str) -> ConcordResult<()> {
        self.conn
            .execute(
                "UPDATE created_agents SET status = ?1 WHERE agent_id = ?2",
                params![status, agent_id],
            )
            .map_err(|e| store_err("update created agent", e))?;
        Ok(())
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Episodes of one generation, worst `agent_a_score` first — the order
    /// the mutator's failing-slice query wants.
    pub fn episodes_for_generation(&self, generation_id: i64) -> ConcordResult<Vec<EpisodeRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT episode_id, termination_reason, agent_a_score, agent_b_score, status
                 FROM episodes WHERE generation_id = ?1 ORDER BY agent_a_score ASC",
            )
            .map_err(|e| store_err("prepare episode query", e))?;
        let rows = stmt
            .query_map(params![generation_id], |row| {
                Ok(EpisodeRow {
                    episode_id: row.get(0)?,
                    termination_reason: row.get(1)?,
                    agent_a_score: row.get(2)?,
                    agent_b_score: row.get(3)?,
                    status: row.get(4)?,
                })
            })
            .map_err(|e| store_err("query episodes", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| store_err("read episode rows", e))
    }

    /// An episode's transcript, in turn order.
    pub fn action_log(&self, episode_id: &str) -> ConcordResult<Vec<ActionLogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT entry FROM action_logs WHERE episode_id = ?1 ORDER BY turn_number ASC, id ASC",
            )
            .map_err(|e| store_err("prepare log query", e))?;
        let rows = stmt
            .query_map(params![episode_id], |row| row.get::<_, String>(0))
            .map_err(|e| store_err("query log", e))?;

        let mut entries = Vec::new();
        for encoded in rows {
            let encoded = encoded.map_err(|e| store_err("read log row", e))?;
            entries.push(
                serde_json::from_str(&encoded).map_err(|e| store_err("decode log entry", e))?,
            );
        }
        Ok(entries)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
