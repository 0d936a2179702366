//! Applying validated mutations to the variables subtree.
//!
//! Paths are dotted and rooted inside `StateObject::variables`. `add`
//! creates intermediate mapping nodes as needed; `modify` requires them to
//! exist already and degrades to a logged no-op when they do not. The final
//! value is always deep-copied in — episodes never alias proposal data.

use serde_json::{Map, Value};
use tracing::warn;

use concord_contracts::proposal::{MutationKind, StateMutation};

/// Apply one mutation to `variables`. Returns true when the value landed.
///
/// A `modify` through a missing (or non-mapping) intermediate node is a
/// no-op; the dropped path is logged so actor bugs stay visible. An `add`
/// through a non-mapping intermediate is likewise dropped — the engine never
/// destroys a scalar to make room for a subtree.
pub fn apply_mutation(variables: &mut Map<String, Value>, mutation: &StateMutation) -> bool {
    let mut segments = mutation.path.split('.').collect::<Vec<_>>();
    let leaf = match segments.pop() {
        Some(leaf) if !leaf.is_empty() => leaf,
        _ => {
            warn!(path = %mutation.path, "mutation dropped: empty path");
            return false;
        }
    };

    let mut current = variables;
    for segment in segments {
        let create_missing = mutation.action == MutationKind::Add;

        if !current.contains_key(segment) {
            if create_missing {
                current.insert(segment.to_string(), Value::Object(Map::new()));
            } else {
                warn!(
                    path = %mutation.path,
                    missing = segment,
                    "modify dropped: intermediate node does not exist"
                );
                return false;
            }
        }

        // The key exists now; it must be a mapping to traverse into.
        match current
            .get_mut(segment)
            .expect("segment was just checked or inserted")
            .as_object_mut()
        {
            Some(next) => current = next,
            None => {
                warn!(
                    path = %mutation.path,
                    blocking = segment,
                    "mutation dropped: intermediate node is not a mapping"
                );
                return false;
            }
        }
    }

    current.insert(leaf.to_string(), mutation.value.clone());
    true
}

/// Apply a proposal's mutations in order. Returns how many landed.
pub fn apply_mutations(variables: &mut Map<String, Value>, mutations: &[StateMutation]) -> usize {
    mutations
        .iter()
        .filter(|mutation| apply_mutation(variables, mutation))
        .count()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
