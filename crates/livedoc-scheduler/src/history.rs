//! Executed operations and the statistics derived from them

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::strategy::UpdateType;

/// Record of one executed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOperation {
    /// Operation id
    pub id: Uuid,
    /// Strategy applied
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    /// Unique changed paths, sorted
    pub affected_files: Vec<String>,
    /// Sections regenerated
    pub affected_sections: Vec<String>,
    /// Execution start
    pub started_at: DateTime<Utc>,
    /// Execution end
    pub completed_at: DateTime<Utc>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Whether the batch applied cleanly
    pub success: bool,
    /// Failure cause when `success` is false
    pub error: Option<String>,
}

/// Aggregates over the retained history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Retained operations
    pub total: usize,
    /// Successful operations
    pub successful: usize,
    /// Failed operations
    pub failed: usize,
    /// `successful / total`, 1.0 when nothing ran yet
    pub success_rate: f64,
    /// Mean duration in milliseconds, 0.0 when nothing ran yet
    pub average_duration_ms: f64,
    /// Operations per strategy
    pub by_type: BTreeMap<UpdateType, usize>,
    /// Completion time of the newest operation
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// Most recent operations, oldest first
#[derive(Debug, Clone)]
pub struct OperationHistory {
    limit: usize,
    operations: VecDeque<UpdateOperation>,
}

impl OperationHistory {
    /// Create history retaining at most `limit` operations
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            operations: VecDeque::with_capacity(limit.min(1024)),
        }
    }

    /// Append, evicting the oldest beyond the limit
    pub fn push(&mut self, operation: UpdateOperation) {
        while self.operations.len() >= self.limit {
            self.operations.pop_front();
        }
        self.operations.push_back(operation);
    }

    /// Up to `n` newest operations, newest first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<UpdateOperation> {
        self.operations.iter().rev().take(n).cloned().collect()
    }

    /// All retained operations, oldest first
    #[must_use]
    pub fn all(&self) -> Vec<UpdateOperation> {
        self.operations.iter().cloned().collect()
    }

    /// Number of retained operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Derive statistics
    #[must_use]
    pub fn stats(&self) -> UpdateStats {
        let total = self.operations.len();
        let successful = self.operations.iter().filter(|op| op.success).count();
        let mut by_type = BTreeMap::new();
        let mut duration_sum = 0u64;
        for op in &self.operations {
            *by_type.entry(op.update_type).or_insert(0) += 1;
            duration_sum = duration_sum.saturating_add(op.duration_ms);
        }

        #[allow(clippy::cast_precision_loss)]
        let (success_rate, average_duration_ms) = if total == 0 {
            (1.0, 0.0)
        } else {
            (
                successful as f64 / total as f64,
                duration_sum as f64 / total as f64,
            )
        };

        UpdateStats {
            total,
            successful,
            failed: total - successful,
            success_rate,
            average_duration_ms,
            by_type,
            last_completed_at: self.operations.back().map(|op| op.completed_at),
        }
    }
}
