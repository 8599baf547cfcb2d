//! Indexed binary min-heap over RUNNABLE tasks, ordered by `vruntime`.
//!
//! Each task carries its own `heap_index` (see `Task`), so `update`/`remove`
//! by task id cost O(log n) instead of the O(n) scan a plain `BinaryHeap`
//! would need. This stands in for the red-black tree CFS itself uses —
//! spec deliberately drops balanced-tree machinery in favor of this.

use std::collections::HashMap;

use crate::task::Task;

/// Tie-break for equal vruntime is deterministic (by task id) but otherwise
/// unspecified; callers must not depend on ordering among equal keys.
fn less(a: &Task, b: &Task) -> bool {
    (a.vruntime, &a.id) < (b.vruntime, &b.id)
}

#[derive(Debug, Default, Clone)]
pub struct RunHeap {
    entries: Vec<String>,
}

impl RunHeap {
    pub fn new() -> Self {
        RunHeap { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn peek(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }

    /// Insert a task id; the task must already exist in `tasks` with
    /// `heap_index == None`. Sets `heap_index` on success.
    pub fn insert(&mut self, id: &str, tasks: &mut HashMap<String, Task>) {
        if !tasks.contains_key(id) {
            return;
        }
        let idx = self.entries.len();
        self.entries.push(id.to_string());
        if let Some(t) = tasks.get_mut(id) {
            t.heap_index = Some(idx);
        }
        self.sift_up(idx, tasks);
    }

    /// Remove and return the id with smallest vruntime.
    pub fn extract_min(&mut self, tasks: &mut HashMap<String, Task>) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let min_id = self.entries.pop().unwrap();
        if let Some(t) = tasks.get_mut(&min_id) {
            t.heap_index = None;
        }
        if !self.entries.is_empty() {
            if let Some(t) = tasks.get_mut(&self.entries[0]) {
                t.heap_index = Some(0);
            }
            self.sift_down(0, tasks);
        }
        Some(min_id)
    }

    /// Re-establish heap order from `id`'s current position after its
    /// `vruntime` has changed. Undefined if `id`'s `heap_index` is `None`.
    pub fn update(&mut self, id: &str, tasks: &mut HashMap<String, Task>) {
        let idx = match tasks.get(id).and_then(|t| t.heap_index) {
            Some(i) => i,
            None => return,
        };
        let moved_down = self.sift_down(idx, tasks);
        if !moved_down {
            self.sift_up(idx, tasks);
        }
    }

    /// Remove a task id from the heap (it need not be the min).
    pub fn remove(&mut self, id: &str, tasks: &mut HashMap<String, Task>) {
        let idx = match tasks.get(id).and_then(|t| t.heap_index) {
            Some(i) => i,
            None => return,
        };
        if let Some(t) = tasks.get_mut(id) {
            t.heap_index = None;
        }
        let last = self.entries.len() - 1;
        if idx != last {
            self.entries.swap(idx, last);
            self.entries.pop();
            if let Some(t) = tasks.get_mut(&self.entries[idx]) {
                t.heap_index = Some(idx);
            }
            if !self.sift_down(idx, tasks) {
                self.sift_up(idx, tasks);
            }
        } else {
            self.entries.pop();
        }
    }

    /// Linear scan for an id; intended for cold paths only (§4.1).
    pub fn find(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e == id)
    }

    fn sift_up(&mut self, mut idx: usize, tasks: &mut HashMap<String, Task>) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.order_less(idx, parent, tasks) {
                self.swap(idx, parent, tasks);
                idx = parent;
            } else {
                break;
            }
        }
    }

    /// Returns true if any swap occurred.
    fn sift_down(&mut self, mut idx: usize, tasks: &mut HashMap<String, Task>) -> bool {
        let mut moved = false;
        let n = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < n && self.order_less(left, smallest, tasks) {
                smallest = left;
            }
            if right < n && self.order_less(right, smallest, tasks) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest, tasks);
            idx = smallest;
            moved = true;
        }
        moved
    }

    fn order_less(&self, a: usize, b: usize, tasks: &HashMap<String, Task>) -> bool {
        let ta = tasks.get(&self.entries[a]);
        let tb = tasks.get(&self.entries[b]);
        match (ta, tb) {
            (Some(ta), Some(tb)) => less(ta, tb),
            _ => false,
        }
    }

    fn swap(&mut self, a: usize, b: usize, tasks: &mut HashMap<String, Task>) {
        self.entries.swap(a, b);
        if let Some(t) = tasks.get_mut(&self.entries[a]) {
            t.heap_index = Some(a);
        }
        if let Some(t) = tasks.get_mut(&self.entries[b]) {
            t.heap_index = Some(b);
        }
    }
}
