use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentGeneratorKind;
use crate::models::{UrlRecord, VariantName};

/// Records of the variant being accumulated that are not in a staged chunk yet, plus every
/// path the variant emitted so far. Persisted when a pass runs out of budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stash {
    pub variant: VariantName,
    pub document: DocumentGeneratorKind,
    pub results: Vec<UrlRecord>,
    pub processed_paths: BTreeSet<String>,
}

impl Stash {
    pub fn new(variant: VariantName, document: DocumentGeneratorKind) -> Self {
        Stash {
            variant,
            document,
            results: Vec::new(),
            processed_paths: BTreeSet::new(),
        }
    }

    /// Appends the records of one data set.
    ///
    /// With `remove_duplicates`, records whose path an earlier data set already emitted are
    /// dropped, as are repeats of a path within this data set. Language versions of a path are
    /// alternates of its one record, so a path never needs more than one.
    /// Returns how many records were dropped.
    pub fn add(&mut self, records: Vec<UrlRecord>, remove_duplicates: bool) -> usize {
        let offered = records.len();
        if !remove_duplicates {
            self.results.extend(records);
            return 0;
        }

        let mut in_batch = HashSet::new();
        let surviving = records
            .into_iter()
            .filter(|r| !self.processed_paths.contains(&r.path))
            .filter(|r| in_batch.insert(r.path.clone()))
            .collect::<Vec<_>>();

        self.processed_paths.extend(surviving.iter().map(|r| r.path.clone()));
        let dropped = offered - surviving.len();
        self.results.extend(surviving);
        dropped
    }
}

/// Progress of the current generation pass, persisted between invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub initial_task_count: usize,
    pub processed_task_count: usize,
    /// Set while a process drains the queue. Still set at the start of a pass means the
    /// previous process died without stashing.
    pub in_progress: bool,
    pub stash: Option<Stash>,
}

impl RunState {
    pub fn new(initial_task_count: usize) -> Self {
        RunState {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            initial_task_count,
            processed_task_count: 0,
            in_progress: false,
            stash: None,
        }
    }

    pub fn remaining_task_count(&self) -> usize {
        self.initial_task_count.saturating_sub(self.processed_task_count)
    }
}
