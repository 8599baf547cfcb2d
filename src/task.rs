//! Per-task scheduling state: nice/weight, vruntime, affinity, burst.

use std::collections::HashSet;

pub const NICE_MIN: i32 = -20;
pub const NICE_MAX: i32 = 19;

/// Canonical Linux CFS nice→weight table, indexed by `nice + 20`.
/// `weight(nice=-20) == 88761`, `weight(nice=0) == 1024`, `weight(nice=19) == 15`.
const NICE_TO_WEIGHT: [u32; 40] = [
    88761, 71755, 56483, 46273, 36291, 29154, 23254, 18705, 14949, 11916, 9548, 7620, 6100, 4904,
    3906, 3121, 2501, 1991, 1586, 1277, 1024, 820, 655, 526, 423, 335, 272, 215, 172, 137, 110,
    87, 70, 56, 45, 36, 29, 23, 18, 15,
];

/// Resolve a (clamped) nice value to its CFS weight.
pub fn weight_for_nice(nice: i32) -> u32 {
    let n = nice.clamp(NICE_MIN, NICE_MAX);
    NICE_TO_WEIGHT[(n - NICE_MIN) as usize]
}

pub fn clamp_nice(nice: i32) -> i32 {
    nice.clamp(NICE_MIN, NICE_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Running,
    Blocked,
    Exited,
}

/// The default cgroup id; it need not exist as a live `Group`.
pub const DEFAULT_GROUP_ID: &str = "0";

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub nice: i32,
    pub weight: u32,
    pub vruntime: f64,
    pub state: TaskState,
    pub group_id: String,
    /// Empty set means "may run on any CPU".
    pub affinity: HashSet<u32>,
    pub current_cpu: Option<u32>,
    pub burst: bool,
    pub burst_remaining: u32,
    /// Position in the scheduler's indexed heap, `None` when not RUNNABLE.
    pub heap_index: Option<usize>,
}

impl Task {
    pub fn create(id: impl Into<String>, nice: i32, group_id: Option<String>) -> Self {
        let nice = clamp_nice(nice);
        Task {
            id: id.into(),
            nice,
            weight: weight_for_nice(nice),
            vruntime: 0.0,
            state: TaskState::Runnable,
            group_id: group_id.unwrap_or_else(|| DEFAULT_GROUP_ID.to_string()),
            affinity: HashSet::new(),
            current_cpu: None,
            burst: false,
            burst_remaining: 0,
            heap_index: None,
        }
    }

    pub fn set_nice(&mut self, nice: i32) {
        self.nice = clamp_nice(nice);
        self.weight = weight_for_nice(self.nice);
    }

    pub fn set_affinity(&mut self, mask: HashSet<u32>) {
        self.affinity = mask;
    }

    pub fn can_run_on_cpu(&self, cpu: u32) -> bool {
        self.affinity.is_empty() || self.affinity.contains(&cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_table_boundaries() {
        assert_eq!(weight_for_nice(-20), 88761);
        assert_eq!(weight_for_nice(0), 1024);
        assert_eq!(weight_for_nice(19), 15);
        assert!(weight_for_nice(-20) > weight_for_nice(0));
        assert!(weight_for_nice(0) > weight_for_nice(19));
    }

    #[test]
    fn nice_clamps_on_create_and_set() {
        let mut t = Task::create("t1", -25, None);
        assert_eq!(t.nice, -20);
        t.set_nice(50);
        assert_eq!(t.nice, 19);
        assert_eq!(t.weight, 15);
    }

    #[test]
    fn default_group_is_zero() {
        let t = Task::create("t1", 0, None);
        assert_eq!(t.group_id, "0");
    }

    #[test]
    fn empty_affinity_means_any_cpu() {
        let t = Task::create("t1", 0, None);
        assert!(t.can_run_on_cpu(0));
        assert!(t.can_run_on_cpu(7));
    }

    #[test]
    fn affinity_restricts_cpu() {
        let mut t = Task::create("t1", 0, None);
        t.set_affinity([2, 3].into_iter().collect());
        assert!(!t.can_run_on_cpu(0));
        assert!(t.can_run_on_cpu(2));
    }
}
