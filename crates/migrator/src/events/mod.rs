pub mod consumer;
pub mod producer;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which store is authoritative (the base) for repairing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Src,
    Dst,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Src => "src",
            Direction::Dst => "dst",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistentKind {
    /// The row exists in target but not in base.
    BaseMissing,
    /// The row exists in base but not in target.
    TargetMissing,
    /// Both rows exist but differ.
    Neq,
}

impl InconsistentKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InconsistentKind::BaseMissing => "base_missing",
            InconsistentKind::TargetMissing => "target_missing",
            InconsistentKind::Neq => "neq",
        }
    }
}

impl fmt::Display for InconsistentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected divergence between the two stores. Field names on the wire
/// are fixed; consumers written against other runtimes decode the same JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InconsistentEvent {
    #[serde(rename = "Typ")]
    pub typ: InconsistentKind,
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Direction")]
    pub direction: Direction,
}
