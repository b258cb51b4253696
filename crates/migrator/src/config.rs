use serde::Deserialize;
use std::time::Duration;

/// Tunables for the migration control plane. Hosts usually deserialize this
/// from their service config; every field has a workable default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Topic carrying inconsistency events.
    pub topic: String,

    /// Consumer group feeding the fixers.
    pub group: String,

    /// Page size of the target-to-base validation walk.
    pub batch_size: usize,

    /// Poll interval of the incremental validator once it reaches the end of
    /// the stream.
    pub incr_tail: Duration,

    /// Deadline for a single validator database round-trip.
    pub op_timeout: Duration,

    /// Deadline for one repair.
    pub consume_timeout: Duration,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        MigratorConfig {
            topic: "migrator_inconsistent".to_string(),
            group: "migrator_fix".to_string(),
            batch_size: 100,
            incr_tail: Duration::from_secs(1),
            op_timeout: Duration::from_secs(3),
            consume_timeout: Duration::from_secs(5),
        }
    }
}
