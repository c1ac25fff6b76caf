//! Read-only limiter snapshot for operational visibility (supplemented
//! feature, grounded on `services/limits_stats.py` in the original
//! backend). Not part of the enforcement path; purely informational.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub bucket: String,
    pub window_count: i64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LimitsSnapshot {
    pub api: Vec<WindowSnapshot>,
    pub auth: Vec<WindowSnapshot>,
    pub llm_rpm: Vec<WindowSnapshot>,
    pub llm_tpm: Vec<WindowSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_empty() {
        let snapshot = LimitsSnapshot::default();
        assert!(snapshot.api.is_empty());
        assert!(snapshot.llm_tpm.is_empty());
    }
}
