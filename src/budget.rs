//! Budget Tracker - process resident footprint measurement
//!
//! Eviction decisions compare the OS-reported resident memory of the current
//! process against the configured budget. When no measurement mechanism is
//! available (pid resolution fails, process table unreadable), the tracker
//! reports 0 bytes, which disables eviction rather than crashing.

use sysinfo::{Pid, ProcessesToUpdate, System};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Measures the resident footprint of the current process.
pub struct BudgetTracker {
    system: System,
    pid: Option<Pid>,
}

impl BudgetTracker {
    /// Create a tracker bound to the current process
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("Could not resolve current pid; memory budget enforcement disabled");
        }
        Self {
            system: System::new(),
            pid,
        }
    }

    /// OS-reported resident memory in bytes; 0 when measurement is unavailable
    pub fn resident_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }

    /// OS-reported resident memory in whole megabytes
    pub fn resident_mb(&mut self) -> u64 {
        self.resident_bytes() / BYTES_PER_MB
    }

    /// Check the footprint against a budget in MB. A budget of 0 disables
    /// enforcement; an unavailable measurement reads as "not over budget".
    pub fn is_over_budget(&mut self, budget_mb: u64) -> bool {
        if budget_mb == 0 {
            return false;
        }
        self.resident_mb() > budget_mb
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BudgetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetTracker").field("pid", &self.pid).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_disables_enforcement() {
        let mut tracker = BudgetTracker::new();
        assert!(!tracker.is_over_budget(0));
    }

    #[test]
    fn test_huge_budget_is_never_exceeded() {
        let mut tracker = BudgetTracker::new();
        assert!(!tracker.is_over_budget(u64::MAX / BYTES_PER_MB));
    }

    #[test]
    fn test_measurement_never_panics() {
        let mut tracker = BudgetTracker::new();
        let _ = tracker.resident_bytes();
        let _ = tracker.resident_mb();
    }
}
