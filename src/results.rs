//! Result types for transient analysis

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::FEAResult;
use crate::math::Vec as FEVec;
use crate::model::SubdomainId;

/// Displacements of a set of watched dofs at the most recent step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DofDisplacementLog {
    pub subdomain: SubdomainId,
    /// Watched dofs in free-dof numbering
    pub dofs: Vec<usize>,
    /// Values of the watched dofs, same order as `dofs`
    pub values: Vec<f64>,
}

impl DofDisplacementLog {
    pub fn new(subdomain: SubdomainId, dofs: Vec<usize>) -> Self {
        let values = vec![0.0; dofs.len()];
        Self {
            subdomain,
            dofs,
            values,
        }
    }

    /// Sample the watched dofs from a solution vector
    pub fn record(&mut self, solution: &FEVec) {
        for (value, &dof) in self.values.iter_mut().zip(&self.dofs) {
            *value = solution[dof];
        }
    }

    /// Value of a watched dof
    pub fn value(&self, dof: usize) -> Option<f64> {
        self.dofs
            .iter()
            .position(|&d| d == dof)
            .map(|i| self.values[i])
    }
}

/// One stored step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Zero-based step index within the storage
    pub step: usize,
    /// Seconds from the first stored step to the start of this one
    pub started_at: f64,
    /// Wall-clock duration of the step solve in seconds
    pub duration: f64,
    pub dofs: Vec<usize>,
    pub values: Vec<f64>,
}

/// Time-history storage registered per subdomain on the analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeHistoryLog {
    records: Vec<StepRecord>,
    #[serde(skip)]
    origin: Option<Instant>,
}

impl TimeHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one step: the solve interval and the child's per-dof entry
    pub fn store_results(&mut self, start: Instant, end: Instant, entry: &DofDisplacementLog) {
        let origin = *self.origin.get_or_insert(start);
        self.records.push(StepRecord {
            step: self.records.len(),
            started_at: start.saturating_duration_since(origin).as_secs_f64(),
            duration: end.saturating_duration_since(start).as_secs_f64(),
            dofs: entry.dofs.clone(),
            values: entry.values.clone(),
        });
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// History of a single dof across all stored records that watch it
    pub fn series(&self, dof: usize) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|r| r.dofs.iter().position(|&d| d == dof).map(|i| r.values[i]))
            .collect()
    }

    /// Total wall-clock time spent in the recorded solves
    pub fn total_duration(&self) -> f64 {
        self.records.iter().map(|r| r.duration).sum()
    }

    pub fn to_json(&self) -> FEAResult<String> {
        Ok(serde_json::to_string(&self.records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_log_records_watched_dofs() {
        let mut log = DofDisplacementLog::new(SubdomainId(0), vec![2, 0]);
        log.record(&FEVec::from_vec(vec![1.0, 2.0, 3.0]));
        assert_eq!(log.values, vec![3.0, 1.0]);
        assert_eq!(log.value(0), Some(1.0));
        assert_eq!(log.value(1), None);
    }

    #[test]
    fn test_store_results() {
        let mut storage = TimeHistoryLog::new();
        let mut entry = DofDisplacementLog::new(SubdomainId(1), vec![0]);

        let t0 = Instant::now();
        for i in 0..3 {
            entry.record(&FEVec::from_vec(vec![i as f64]));
            let start = t0 + Duration::from_millis(10 * i);
            storage.store_results(start, start + Duration::from_millis(4), &entry);
        }

        assert_eq!(storage.len(), 3);
        assert_eq!(storage.series(0), vec![0.0, 1.0, 2.0]);
        assert_eq!(storage.records()[2].step, 2);
        assert!((storage.records()[1].started_at - 0.010).abs() < 1e-9);
        assert!((storage.total_duration() - 0.012).abs() < 1e-9);

        let json = storage.to_json().unwrap();
        assert!(json.contains("\"values\":[2.0]"));
    }
}
