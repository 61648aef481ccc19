//! Error History
//!
//! Every classified action failure, in the order it happened, with a summary
//! by category for end-of-run reports.

use chrono::{DateTime, Utc};
use mend_common::ErrorCategory;
use serde::Serialize;
use std::collections::BTreeMap;

/// One classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub message: String,
    pub selector: String,
    pub action_hint: String,
    /// Retries already spent when the failure happened.
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    /// Highest count; ties go to the category seen first.
    pub most_common: Option<ErrorCategory>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorHistory {
    records: Vec<ErrorRecord>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn stats(&self) -> ErrorStats {
        let mut by_category = BTreeMap::new();
        let mut first_seen = Vec::new();
        for record in &self.records {
            let count = by_category.entry(record.category).or_insert(0);
            if *count == 0 {
                first_seen.push(record.category);
            }
            *count += 1;
        }

        let mut most_common: Option<(ErrorCategory, usize)> = None;
        for category in first_seen {
            let count = by_category[&category];
            if most_common.is_none_or(|(_, best)| count > best) {
                most_common = Some((category, count));
            }
        }

        ErrorStats {
            total_errors: self.records.len(),
            by_category,
            most_common: most_common.map(|(category, _)| category),
        }
    }
}
