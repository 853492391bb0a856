//! Per-`indication_id` file-transfer progress tracker (§3.4/§4.5).

use std::collections::HashMap;
use std::sync::Mutex;

use courier_core::{Container, Value};

struct Transfer {
    target_id: String,
    target_sub_id: String,
    expected: usize,
    completed: usize,
    failed: usize,
    last_percentage: u16,
}

/// Tracks in-flight file transfers by `indication_id` and reports progress
/// as `transfer_condition` containers, grounded on the source's
/// `file_manager::set`/`received` pair.
#[derive(Default)]
pub struct FileManager {
    transfers: Mutex<HashMap<String, Transfer>>,
}

impl FileManager {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new transfer's expected file count. `target_id`/
    /// `target_sub_id` are the downstream peer the eventual
    /// `transfer_condition` reports are addressed back to. Returns `false`
    /// without changing state if `indication_id` is already tracked.
    pub fn set(
        &self,
        indication_id: impl Into<String>,
        target_id: impl Into<String>,
        target_sub_id: impl Into<String>,
        expected_count: usize,
    ) -> bool {
        let mut transfers = self.transfers.lock().expect("file manager lock poisoned");
        let indication_id = indication_id.into();
        if transfers.contains_key(&indication_id) {
            return false;
        }
        transfers.insert(
            indication_id,
            Transfer {
                target_id: target_id.into(),
                target_sub_id: target_sub_id.into(),
                expected: expected_count,
                completed: 0,
                failed: 0,
                last_percentage: 0,
            },
        );
        true
    }

    /// Records one file's outcome (`path` empty means failed, non-empty
    /// means saved at that path) and returns a `transfer_condition`
    /// container whenever the reported percentage changes or the transfer
    /// completes (§8 property 10). Returns `None` for an unknown
    /// `indication_id`, matching the source's `nullptr` fallback.
    pub fn received(&self, indication_id: &str, path: &str) -> Option<Container> {
        let mut transfers = self.transfers.lock().expect("file manager lock poisoned");
        let transfer = transfers.get_mut(indication_id)?;

        if path.is_empty() {
            transfer.failed += 1;
        } else {
            transfer.completed += 1;
        }

        let percentage = if transfer.expected == 0 {
            100
        } else {
            ((transfer.completed * 100) / transfer.expected) as u16
        };
        let finished = transfer.completed + transfer.failed >= transfer.expected;
        let changed = percentage != transfer.last_percentage;
        transfer.last_percentage = percentage;

        if !finished && !changed {
            return None;
        }

        let target_id = transfer.target_id.clone();
        let target_sub_id = transfer.target_sub_id.clone();
        let completed = transfer.completed;
        let failed = transfer.failed;

        if finished {
            transfers.remove(indication_id);
        }

        let mut units = vec![
            Value::string("indication_id", indication_id),
            Value::ushort("percentage", percentage),
        ];
        if finished {
            units.push(Value::ullong("completed_count", completed as u64));
            units.push(Value::ullong("failed_count", failed as u64));
            units.push(Value::bool("completed", true));
        }

        Some(Container::addressed("", "", target_id, target_sub_id, "transfer_condition", units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_frame_per_distinct_percentage_and_a_final_completed_frame() {
        let manager = FileManager::new();
        assert!(manager.set("X", "client", "0", 4));

        let mut percentages = Vec::new();
        let mut final_seen = false;
        for path in ["a", "b", "c", "d"] {
            let container = manager.received("X", path).expect("percentage should change every call");
            let units = container.units().unwrap();
            let percentage = units.iter().find(|v| v.name() == "percentage").unwrap().to_u16();
            percentages.push(percentage);
            if units.iter().any(|v| v.name() == "completed") {
                final_seen = true;
                assert_eq!(units.iter().find(|v| v.name() == "completed_count").unwrap().to_u64(), 4);
            }
        }

        assert_eq!(percentages, vec![25, 50, 75, 100]);
        assert!(final_seen);
    }

    #[test]
    fn second_set_for_the_same_indication_id_is_rejected() {
        let manager = FileManager::new();
        assert!(manager.set("X", "client", "0", 2));
        assert!(!manager.set("X", "client", "0", 2));
    }

    #[test]
    fn unknown_indication_id_reports_nothing() {
        let manager = FileManager::new();
        assert!(manager.received("missing", "a").is_none());
    }

    #[test]
    fn failures_still_complete_the_transfer_without_reaching_100_percent() {
        let manager = FileManager::new();
        manager.set("Y", "client", "0", 4);
        assert!(manager.received("Y", "a").is_some());
        assert!(manager.received("Y", "").is_none()); // failure: 25% unchanged by completed-only percentage
        assert!(manager.received("Y", "c").is_some());
        let last = manager.received("Y", "").unwrap();
        let units = last.units().unwrap();
        assert!(units.iter().any(|v| v.name() == "completed"));
        assert_eq!(units.iter().find(|v| v.name() == "completed_count").unwrap().to_u64(), 2);
        assert_eq!(units.iter().find(|v| v.name() == "failed_count").unwrap().to_u64(), 2);
    }
}
