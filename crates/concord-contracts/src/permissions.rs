//! Authorization scope for created agents.
//!
//! Concord uses a path-prefix permission model: a created agent may only
//! mutate state paths admitted by its allow list and not covered by its deny
//! list. Deny prefixes are always checked first. Primary actors carry no
//! permissions record and are unrestricted.

use serde::{Deserialize, Serialize};

fn default_max_mutations() -> u8 {
    3
}

/// A created agent's authorization scope.
///
/// Registered with the environment when a provisioned spec is mounted; lives
/// for the lifetime of that environment. Permissions are fixed at mount time
/// and are never elevated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPermissions {
    /// Path prefixes (dotted, rooted in `variables`) the agent may mutate.
    #[serde(default)]
    pub can_modify_fields: Vec<String>,
    /// Path prefixes the agent must never mutate. Checked before the allow
    /// list — a denied prefix overrides any allow.
    #[serde(default)]
    pub cannot_modify_fields: Vec<String>,
    /// Whether the agent may terminate the episode unilaterally. Must be
    /// false for every created agent.
    #[serde(default)]
    pub can_abort_episode: bool,
    /// Whether the agent's turn counts toward consecutive agreement. Must be
    /// false for every created agent.
    #[serde(default)]
    pub can_propose_resolution: bool,
    /// Hard cap on mutations per turn. At most 3 for created agents.
    #[serde(default = "default_max_mutations")]
    pub max_state_mutations_per_turn: u8,
}

impl Default for AgentPermissions {
    fn default() -> Self {
        Self {
            can_modify_fields: Vec::new(),
            cannot_modify_fields: Vec::new(),
            can_abort_episode: false,
            can_propose_resolution: false,
            max_state_mutations_per_turn: default_max_mutations(),
        }
    }
}

/// True when `path` falls under `prefix` in dotted-path terms.
///
/// `"concessions"` covers `"concessions"` and `"concessions.y"` but not
/// `"concessionsx"` — prefixes bind at segment boundaries.
fn path_under(path: &str, prefix: &str) -> bool {
    path == prefix || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'.'))
}

impl AgentPermissions {
    /// Decide whether a mutation at `path` is admissible under this scope.
    ///
    /// Deny prefixes win over allow prefixes; a path matching neither list is
    /// rejected (allow lists are exhaustive).
    pub fn allows_path(&self, path: &str) -> Result<(), String> {
        for denied in &self.cannot_modify_fields {
            if path_under(path, denied) {
                return Err(format!("path falls under denied prefix '{denied}'"));
            }
        }
        if self
            .can_modify_fields
            .iter()
            .any(|allowed| path_under(path, allowed))
        {
            Ok(())
        } else {
            Err("path is outside every allowed prefix".to_string())
        }
    }

    /// Enforce the safety guardrails every created agent must satisfy.
    ///
    /// Returns the first violation as a human-readable reason.
    pub fn check_created_guardrails(&self) -> Result<(), String> {
        if self.can_abort_episode {
            return Err("created agents may not hold abort authority".to_string());
        }
        if self.can_propose_resolution {
            return Err("created agents may not propose resolution".to_string());
        }
        if self.max_state_mutations_per_turn > 3 {
            return Err(format!(
                "mutation cap {} exceeds the created-agent limit of 3",
                self.max_state_mutations_per_turn
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(allow: &[&str], deny: &[&str]) -> AgentPermissions {
        AgentPermissions {
            can_modify_fields: allow.iter().map(|s| s.to_string()).collect(),
            cannot_modify_fields: deny.iter().map(|s| s.to_string()).collect(),
            ..AgentPermissions::default()
        }
    }

    #[test]
    fn allowed_prefix_admits_nested_path() {
        let p = perms(&["subsidies"], &[]);
        assert!(p.allows_path("subsidies").is_ok());
        assert!(p.allows_path("subsidies.steel.rate").is_ok());
    }

    #[test]
    fn prefix_binds_at_segment_boundary() {
        let p = perms(&["subsidies"], &[]);
        // "subsidiesx" is a different key, not a child of "subsidies".
        assert!(p.allows_path("subsidiesx").is_err());
    }

    #[test]
    fn deny_overrides_allow() {
        let p = perms(&["concessions", "subsidies"], &["concessions"]);
        assert!(p.allows_path("concessions.y").is_err());
        assert!(p.allows_path("subsidies.grain").is_ok());
    }

    #[test]
    fn unlisted_path_is_rejected() {
        let p = perms(&["subsidies"], &["concessions"]);
        assert!(p.allows_path("tariffs.steel").is_err());
    }

    #[test]
    fn guardrails_reject_abort_authority() {
        let p = AgentPermissions {
            can_abort_episode: true,
            ..AgentPermissions::default()
        };
        assert!(p.check_created_guardrails().is_err());
    }

    #[test]
    fn guardrails_reject_resolution_authority() {
        let p = AgentPermissions {
            can_propose_resolution: true,
            ..AgentPermissions::default()
        };
        assert!(p.check_created_guardrails().is_err());
    }

    #[test]
    fn guardrails_reject_oversized_mutation_cap() {
        let p = AgentPermissions {
            max_state_mutations_per_turn: 4,
            ..AgentPermissions::default()
        };
        assert!(p.check_created_guardrails().is_err());
    }

    #[test]
    fn guardrails_accept_a_conforming_scope() {
        let p = perms(&["rumors"], &["concessions"]);
        assert!(p.check_created_guardrails().is_ok());
    }
}
