//! Tagged event variants applied to a `Scheduler`, and the per-tick batch
//! envelope (`TimeFrame`) a driver submits. Modeled as a tagged enum per
//! spec's design note rather than a class hierarchy.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TaskCreate {
        id: String,
        nice: Option<i32>,
        group_id: Option<String>,
        cpu_mask: Option<HashSet<u32>>,
    },
    TaskExit {
        id: String,
    },
    TaskBlock {
        id: String,
    },
    TaskUnblock {
        id: String,
    },
    TaskYield {
        id: String,
    },
    TaskSetNice {
        id: String,
        nice: i32,
    },
    TaskSetAffinity {
        id: String,
        mask: HashSet<u32>,
    },
    CgroupCreate {
        id: String,
        shares: Option<u32>,
        quota_us: Option<i64>,
        period_us: Option<u64>,
        mask: Option<HashSet<u32>>,
    },
    CgroupModify {
        id: String,
        shares: Option<u32>,
        quota_us: Option<i64>,
        period_us: Option<u64>,
        mask: Option<HashSet<u32>>,
    },
    CgroupDelete {
        id: String,
    },
    TaskMoveCgroup {
        id: String,
        new_group_id: String,
    },
    CpuBurst {
        id: String,
        duration: u32,
    },
}

/// One inbound batch: a virtual-time stamp and the events to apply before
/// the tick at that vtime runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeFrame {
    pub vtime: i64,
    pub events: Vec<Event>,
}
