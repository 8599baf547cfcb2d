//! The scheduler: owns all tasks, groups, per-CPU runqueues and the global
//! runnable heap; applies events; runs the per-tick selection algorithm.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SchedError};
use crate::event::Event;
use crate::group::Group;
use crate::heap::RunHeap;
use crate::task::{Task, TaskState, DEFAULT_GROUP_ID};

pub const MAX_TASKS: usize = 1024;
pub const MAX_GROUPS: usize = 64;
pub const MAX_CPUS: usize = 128;

/// Sentinel schedule entry for a CPU with no eligible task this tick.
pub const IDLE: &str = "idle";

#[derive(Debug, Clone, Default)]
struct Cpu {
    current_task: Option<String>,
    min_vruntime: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TickMeta {
    pub preemptions: u32,
    pub migrations: u32,
    pub runnable_tasks: Vec<String>,
    pub blocked_tasks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TickResult {
    pub vtime: i64,
    /// One entry per CPU, in ascending CPU-id order; `IDLE` when nothing ran.
    pub schedule: Vec<String>,
    pub meta: TickMeta,
}

pub struct Scheduler {
    tasks: HashMap<String, Task>,
    groups: HashMap<String, Group>,
    cpus: Vec<Cpu>,
    heap: RunHeap,
    current_vtime: i64,
    quanta: u32,
}

impl Scheduler {
    pub fn new(cpu_count: usize, quanta: u32) -> Result<Self> {
        if cpu_count == 0 || cpu_count > MAX_CPUS {
            return Err(SchedError::InvalidEvent(format!(
                "cpu_count {} out of range 1..={}",
                cpu_count, MAX_CPUS
            )));
        }
        Ok(Scheduler {
            tasks: HashMap::new(),
            groups: HashMap::new(),
            cpus: vec![Cpu::default(); cpu_count],
            heap: RunHeap::new(),
            current_vtime: 0,
            quanta: quanta.max(1),
        })
    }

    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    pub fn current_vtime(&self) -> i64 {
        self.current_vtime
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // ------------------------------------------------------------------
    // Event state machine (§4.4)
    // ------------------------------------------------------------------

    pub fn apply_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::TaskCreate { id, nice, group_id, cpu_mask } => {
                self.on_task_create(id, nice, group_id, cpu_mask)
            }
            Event::TaskExit { id } => {
                self.on_task_exit(&id);
                Ok(())
            }
            Event::TaskBlock { id } => {
                self.on_task_block(&id);
                Ok(())
            }
            Event::TaskUnblock { id } => {
                self.on_task_unblock(&id);
                Ok(())
            }
            Event::TaskYield { id } => {
                self.on_task_yield(&id);
                Ok(())
            }
            Event::TaskSetNice { id, nice } => {
                if let Some(t) = self.tasks.get_mut(&id) {
                    t.set_nice(nice);
                }
                Ok(())
            }
            Event::TaskSetAffinity { id, mask } => {
                if let Some(t) = self.tasks.get_mut(&id) {
                    t.set_affinity(mask);
                }
                Ok(())
            }
            Event::CgroupCreate { id, shares, quota_us, period_us, mask } => {
                self.on_cgroup_create(id, shares, quota_us, period_us, mask)
            }
            Event::CgroupModify { id, shares, quota_us, period_us, mask } => {
                if let Some(g) = self.groups.get_mut(&id) {
                    let reset = g.modify(shares, quota_us, period_us, mask);
                    if reset {
                        let vt = self.current_vtime;
                        self.groups.get_mut(&id).unwrap().reset_period(vt);
                    }
                }
                Ok(())
            }
            Event::CgroupDelete { id } => {
                self.on_cgroup_delete(&id);
                Ok(())
            }
            Event::TaskMoveCgroup { id, new_group_id } => {
                if let Some(t) = self.tasks.get_mut(&id) {
                    t.group_id = new_group_id;
                }
                Ok(())
            }
            Event::CpuBurst { id, duration } => {
                if let Some(t) = self.tasks.get_mut(&id) {
                    t.burst = true;
                    t.burst_remaining = duration;
                }
                Ok(())
            }
        }
    }

    fn max_live_vruntime(&self) -> f64 {
        self.tasks
            .values()
            .filter(|t| matches!(t.state, TaskState::Runnable | TaskState::Running))
            .map(|t| t.vruntime)
            .fold(0.0_f64, f64::max)
    }

    fn min_live_vruntime(&self) -> f64 {
        let min = self
            .tasks
            .values()
            .filter(|t| matches!(t.state, TaskState::Runnable | TaskState::Running))
            .map(|t| t.vruntime)
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            min
        } else {
            0.0
        }
    }

    fn on_task_create(
        &mut self,
        id: String,
        nice: Option<i32>,
        group_id: Option<String>,
        cpu_mask: Option<HashSet<u32>>,
    ) -> Result<()> {
        if self.tasks.contains_key(&id) {
            return Err(SchedError::InvalidEvent(format!("task {id} already exists")));
        }
        if self.tasks.len() >= MAX_TASKS {
            return Err(SchedError::Capacity(format!("task limit {MAX_TASKS} reached")));
        }
        let start_vr = self.max_live_vruntime();
        let mut t = Task::create(id.clone(), nice.unwrap_or(0), group_id);
        t.vruntime = start_vr;
        if let Some(mask) = cpu_mask {
            t.set_affinity(mask);
        }
        self.tasks.insert(id.clone(), t);
        self.heap.insert(&id, &mut self.tasks);
        Ok(())
    }

    fn on_task_exit(&mut self, id: &str) {
        let Some(task) = self.tasks.get(id) else { return };
        if matches!(task.state, TaskState::Exited) {
            return;
        }
        let has_heap_index = task.heap_index.is_some();
        let current_cpu = task.current_cpu;
        if has_heap_index {
            self.heap.remove(id, &mut self.tasks);
        }
        if let Some(cpu) = current_cpu {
            if let Some(slot) = self.cpus.get_mut(cpu as usize) {
                if slot.current_task.as_deref() == Some(id) {
                    slot.current_task = None;
                }
            }
        }
        self.tasks.remove(id);
    }

    fn on_task_block(&mut self, id: &str) {
        let Some(task) = self.tasks.get(id) else { return };
        if matches!(task.state, TaskState::Exited | TaskState::Blocked) {
            return;
        }
        let has_heap_index = task.heap_index.is_some();
        let cpu = task.current_cpu;
        if has_heap_index {
            self.heap.remove(id, &mut self.tasks);
        }
        if let Some(t) = self.tasks.get_mut(id) {
            t.state = TaskState::Blocked;
            t.current_cpu = None;
        }
        if let Some(cpu) = cpu {
            if let Some(slot) = self.cpus.get_mut(cpu as usize) {
                if slot.current_task.as_deref() == Some(id) {
                    slot.current_task = None;
                }
            }
        }
    }

    fn on_task_unblock(&mut self, id: &str) {
        let Some(task) = self.tasks.get(id) else { return };
        if !matches!(task.state, TaskState::Blocked) {
            return;
        }
        let min_vr = self.min_live_vruntime();
        let t = self.tasks.get_mut(id).unwrap();
        t.state = TaskState::Runnable;
        if t.vruntime < min_vr - 1.0 {
            t.vruntime = min_vr - 1.0;
        }
        self.heap.insert(id, &mut self.tasks);
    }

    fn on_task_yield(&mut self, id: &str) {
        if !self.tasks.contains_key(id) {
            return;
        }
        let max_vr = self.max_live_vruntime();
        let had_heap_slot = self.tasks.get(id).unwrap().heap_index.is_some();
        self.tasks.get_mut(id).unwrap().vruntime = max_vr;
        if had_heap_slot {
            self.heap.update(id, &mut self.tasks);
        }
    }

    fn on_cgroup_create(
        &mut self,
        id: String,
        shares: Option<u32>,
        quota_us: Option<i64>,
        period_us: Option<u64>,
        mask: Option<HashSet<u32>>,
    ) -> Result<()> {
        if self.groups.contains_key(&id) {
            return Err(SchedError::InvalidEvent(format!("group {id} already exists")));
        }
        if self.groups.len() >= MAX_GROUPS {
            return Err(SchedError::Capacity(format!("group limit {MAX_GROUPS} reached")));
        }
        let mut g = Group::create(
            id.clone(),
            shares.unwrap_or(0),
            quota_us.unwrap_or(-1),
            period_us.unwrap_or(0),
            mask.unwrap_or_default(),
        );
        g.period_start_vtime = self.current_vtime;
        self.groups.insert(id, g);
        Ok(())
    }

    fn on_cgroup_delete(&mut self, id: &str) {
        if self.groups.remove(id).is_none() {
            return;
        }
        for t in self.tasks.values_mut() {
            if t.group_id == id {
                t.group_id = DEFAULT_GROUP_ID.to_string();
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-tick algorithm (§4.5)
    // ------------------------------------------------------------------

    pub fn tick(&mut self, vtime: i64) -> Option<TickResult> {
        self.current_vtime = vtime;

        // 2. Refresh group periods.
        let tick_us = (self.quanta.max(1) as i64) * 1000;
        let group_ids: Vec<String> = self.groups.keys().cloned().collect();
        for gid in group_ids {
            let Some(g) = self.groups.get_mut(&gid) else { continue };
            if g.period_us == 0 {
                continue;
            }
            let elapsed_us = (vtime - g.period_start_vtime) * tick_us;
            if vtime < g.period_start_vtime || elapsed_us >= g.period_us as i64 {
                g.reset_period(vtime);
            }
        }

        // 3. Charge the previous running set.
        let mut previous: Vec<Option<String>> = vec![None; self.cpus.len()];
        for cpu in 0..self.cpus.len() {
            let Some(tid) = self.cpus[cpu].current_task.clone() else { continue };
            previous[cpu] = Some(tid.clone());
            let (is_running, is_burst, group_id) = match self.tasks.get(&tid) {
                Some(t) => (matches!(t.state, TaskState::Running), t.burst, t.group_id.clone()),
                None => continue,
            };
            if !is_running {
                continue;
            }
            if !is_burst {
                let weight = self.effective_weight(&tid);
                let delta = (self.quanta as f64) * 1024.0 / (weight as f64);
                self.tasks.get_mut(&tid).unwrap().vruntime += delta;
            } else {
                let t = self.tasks.get_mut(&tid).unwrap();
                if t.burst_remaining > 0 {
                    t.burst_remaining -= 1;
                }
                if t.burst_remaining == 0 {
                    t.burst = false;
                }
            }
            if let Some(g) = self.groups.get_mut(&group_id) {
                g.account_runtime(tick_us as f64);
            }
            let t = self.tasks.get_mut(&tid).unwrap();
            t.state = TaskState::Runnable;
            self.cpus[cpu].current_task = None;
        }

        // 4. Rebuild the heap.
        self.heap.clear();
        for t in self.tasks.values_mut() {
            t.heap_index = None;
        }
        let runnable_ids: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, t)| matches!(t.state, TaskState::Runnable))
            .map(|(id, _)| id.clone())
            .collect();
        for id in runnable_ids {
            self.heap.insert(&id, &mut self.tasks);
        }

        // 5. Select per-CPU assignments.
        let mut planned: HashMap<String, f64> = HashMap::new();
        let mut assignments: Vec<Option<String>> = vec![None; self.cpus.len()];
        let mut assigned: HashSet<String> = HashSet::new();
        for cpu in 0..self.cpus.len() {
            let picked = self.pick_for_cpu(cpu as u32, &mut planned);
            if let Some(ref id) = picked {
                assigned.insert(id.clone());
            }
            assignments[cpu] = picked;
        }

        // 6. Accounting + commit selection.
        let mut preemptions = 0u32;
        let mut migrations = 0u32;
        let mut schedule = Vec::with_capacity(self.cpus.len());
        for cpu in 0..self.cpus.len() {
            match &assignments[cpu] {
                Some(sel_id) => {
                    if let Some(prev_id) = &previous[cpu] {
                        if prev_id != sel_id {
                            preemptions += 1;
                        }
                    }
                    let prior_cpu = self.tasks.get(sel_id).and_then(|t| t.current_cpu);
                    if let Some(pc) = prior_cpu {
                        if pc != cpu as u32 {
                            migrations += 1;
                        }
                    }
                    let t = self.tasks.get_mut(sel_id).unwrap();
                    t.state = TaskState::Running;
                    t.current_cpu = Some(cpu as u32);
                    self.cpus[cpu].current_task = Some(sel_id.clone());
                    self.cpus[cpu].min_vruntime = t.vruntime;
                    schedule.push(sel_id.clone());
                }
                None => {
                    if previous[cpu].is_some() {
                        preemptions += 1;
                    }
                    self.cpus[cpu].current_task = None;
                    schedule.push(IDLE.to_string());
                }
            }
        }

        // 7. Stranded runnables.
        for (id, t) in self.tasks.iter_mut() {
            if matches!(t.state, TaskState::Runnable) && t.current_cpu.is_some() && !assigned.contains(id) {
                t.current_cpu = None;
            }
        }

        // 8. Metadata.
        let runnable_tasks: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, t)| matches!(t.state, TaskState::Runnable | TaskState::Running))
            .map(|(id, _)| id.clone())
            .collect();
        let blocked_tasks: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, t)| matches!(t.state, TaskState::Blocked))
            .map(|(id, _)| id.clone())
            .collect();

        Some(TickResult {
            vtime,
            schedule,
            meta: TickMeta { preemptions, migrations, runnable_tasks, blocked_tasks },
        })
    }

    fn effective_weight(&self, task_id: &str) -> u64 {
        let task = match self.tasks.get(task_id) {
            Some(t) => t,
            None => return 1,
        };
        let base = task.weight as u64;
        match self.groups.get(&task.group_id) {
            Some(g) if g.shares > 0 => (base * g.shares as u64 / 1024).max(1),
            _ => base,
        }
    }

    /// Constrained top-of-heap selection for one CPU, honoring affinity,
    /// group CPU masks, and the tick-local planned quota budget (§4.5).
    fn pick_for_cpu(&mut self, cpu: u32, planned: &mut HashMap<String, f64>) -> Option<String> {
        let tick_runtime_us = (self.quanta as f64) * 1000.0;
        let mut deferred: Vec<String> = Vec::new();
        let mut selected: Option<String> = None;

        while let Some(candidate) = self.heap.extract_min(&mut self.tasks) {
            let eligible = {
                let task = self.tasks.get(&candidate).unwrap();
                let cpu_ok = task.can_run_on_cpu(cpu)
                    && self
                        .groups
                        .get(&task.group_id)
                        .map(|g| g.allows_cpu(cpu))
                        .unwrap_or(true);
                if !cpu_ok {
                    false
                } else {
                    match self.groups.get(&task.group_id) {
                        Some(g) if g.quota_us >= 0 => {
                            let already = planned.get(&task.group_id).copied().unwrap_or(0.0);
                            g.has_quota(already + tick_runtime_us)
                        }
                        _ => true,
                    }
                }
            };

            if eligible {
                let group_id = self.tasks.get(&candidate).unwrap().group_id.clone();
                if let Some(g) = self.groups.get(&group_id) {
                    if g.quota_us >= 0 {
                        *planned.entry(group_id).or_insert(0.0) += tick_runtime_us;
                    }
                }
                selected = Some(candidate);
                break;
            } else {
                deferred.push(candidate);
            }
        }

        for id in deferred {
            self.heap.insert(&id, &mut self.tasks);
        }
        selected
    }
}
