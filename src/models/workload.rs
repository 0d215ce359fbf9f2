use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TailError};

const MAX_WORKLOAD_ID_LEN: usize = 128;

/// Identifier of a workload (container id or name)
///
/// Restricted to the runtime's id/name alphabet so it can be placed in an
/// API path without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkloadId(String);

impl WorkloadId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if is_valid_id(&raw) {
            Ok(Self(raw))
        } else {
            Err(TailError::InvalidWorkloadId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_id(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    raw.len() <= MAX_WORKLOAD_ID_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WorkloadId {
    type Error = TailError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<WorkloadId> for String {
    fn from(id: WorkloadId) -> Self {
        id.0
    }
}

/// Running workload as reported by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSummary {
    pub id: String,
    pub name: String,
    /// Image reference the container was created from, e.g. `nginx:1.25`
    pub image: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_id_accepts_runtime_names() {
        for raw in ["abc", "4f2a9c1e0b7d", "web_1", "api.v2-blue", "A"] {
            assert_eq!(WorkloadId::new(raw).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn test_workload_id_rejects_path_characters() {
        for raw in ["", "../etc", "a/b", "-leading", "_x", "a b", "a?b=1"] {
            assert!(
                matches!(WorkloadId::new(raw), Err(TailError::InvalidWorkloadId(_))),
                "{raw:?} should be rejected"
            );
        }
        assert!(WorkloadId::new("a".repeat(MAX_WORKLOAD_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_workload_id_serde_validates() {
        let id: WorkloadId = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(id.to_string(), "web");
        assert!(serde_json::from_str::<WorkloadId>("\"../x\"").is_err());
    }
}
