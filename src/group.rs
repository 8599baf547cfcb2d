//! cgroup-like resource-control entity: shares, quota/period, CPU mask.

use std::collections::HashSet;

pub const DEFAULT_SHARES: u32 = 1024;
pub const DEFAULT_PERIOD_US: u64 = 100_000;
/// Sentinel for `quota_us`: unlimited quota, never throttles.
pub const QUOTA_UNLIMITED: i64 = -1;
/// Sentinel for `CGROUP_MODIFY`'s `quota_us` argument: "leave unchanged".
pub const QUOTA_KEEP: i64 = -2;

#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub shares: u32,
    /// Microseconds per period, or `QUOTA_UNLIMITED`.
    pub quota_us: i64,
    pub period_us: u64,
    /// Empty set means "any CPU".
    pub cpu_mask: HashSet<u32>,
    /// Microseconds consumed in the current period.
    pub quota_used: f64,
    pub period_start_vtime: i64,
}

fn normalize_quota(quota_us: i64) -> i64 {
    if quota_us < 0 {
        QUOTA_UNLIMITED
    } else {
        quota_us
    }
}

impl Group {
    pub fn create(
        id: impl Into<String>,
        shares: u32,
        quota_us: i64,
        period_us: u64,
        mask: HashSet<u32>,
    ) -> Self {
        Group {
            id: id.into(),
            shares: if shares == 0 { DEFAULT_SHARES } else { shares },
            quota_us: normalize_quota(quota_us),
            period_us: if period_us == 0 { DEFAULT_PERIOD_US } else { period_us },
            cpu_mask: mask,
            quota_used: 0.0,
            period_start_vtime: 0,
        }
    }

    /// Apply sentinel-guarded updates. `shares == 0` or `period_us == 0` means
    /// "keep". `quota_us == QUOTA_KEEP` means "keep"; any other negative value
    /// (including `QUOTA_UNLIMITED`) means "unlimited". `mask == None` means
    /// "keep". Returns true if `period_us` was explicitly changed (the caller
    /// must then reset the period at the current vtime).
    pub fn modify(
        &mut self,
        shares: Option<u32>,
        quota_us: Option<i64>,
        period_us: Option<u64>,
        mask: Option<HashSet<u32>>,
    ) -> bool {
        if let Some(s) = shares {
            if s > 0 {
                self.shares = s;
            }
        }
        if let Some(q) = quota_us {
            if q != QUOTA_KEEP {
                self.quota_us = normalize_quota(q);
            }
        }
        let mut period_reset = false;
        if let Some(p) = period_us {
            if p > 0 {
                self.period_us = p;
                period_reset = true;
            }
        }
        if let Some(m) = mask {
            self.cpu_mask = m;
        }
        period_reset
    }

    pub fn has_quota(&self, additional_us: f64) -> bool {
        self.quota_us < 0 || self.quota_used + additional_us <= self.quota_us as f64
    }

    pub fn account_runtime(&mut self, r_us: f64) {
        if self.quota_us >= 0 && r_us > 0.0 {
            self.quota_used += r_us;
        }
    }

    pub fn reset_period(&mut self, vtime: i64) {
        self.quota_used = 0.0;
        self.period_start_vtime = vtime;
    }

    pub fn allows_cpu(&self, cpu: u32) -> bool {
        self.cpu_mask.is_empty() || self.cpu_mask.contains(&cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_on_nonpositive_inputs() {
        let g = Group::create("g", 0, QUOTA_UNLIMITED, 0, HashSet::new());
        assert_eq!(g.shares, DEFAULT_SHARES);
        assert_eq!(g.period_us, DEFAULT_PERIOD_US);
        assert_eq!(g.quota_us, QUOTA_UNLIMITED);
    }

    #[test]
    fn unlimited_quota_never_throttles() {
        let mut g = Group::create("g", 1024, QUOTA_UNLIMITED, 100_000, HashSet::new());
        g.quota_used = 1_000_000.0;
        assert!(g.has_quota(1_000_000.0));
    }

    #[test]
    fn modify_keep_sentinels_leave_group_unchanged() {
        let mut g = Group::create("g", 512, 50_000, 200_000, HashSet::new());
        let before = g.clone();
        let reset = g.modify(Some(0), Some(QUOTA_KEEP), Some(0), None);
        assert!(!reset);
        assert_eq!(g.shares, before.shares);
        assert_eq!(g.quota_us, before.quota_us);
        assert_eq!(g.period_us, before.period_us);
    }

    #[test]
    fn modify_period_signals_reset() {
        let mut g = Group::create("g", 512, 50_000, 200_000, HashSet::new());
        assert!(g.modify(None, None, Some(300_000), None));
        assert_eq!(g.period_us, 300_000);
    }

    #[test]
    fn empty_mask_allows_any_cpu() {
        let g = Group::create("g", 1024, QUOTA_UNLIMITED, 100_000, HashSet::new());
        assert!(g.allows_cpu(0));
        assert!(g.allows_cpu(5));
    }
}
