//! CLI-sourced configuration. No config file — spec.md states the scheduler
//! holds no persisted state, so the four knobs below are the entire surface.

use std::path::PathBuf;

use crate::scheduler::MAX_CPUS;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub socket_path: PathBuf,
    pub cpu_count: usize,
    pub quanta: u32,
    pub metadata: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            socket_path: PathBuf::from("event.socket"),
            cpu_count: 4,
            quanta: 1,
            metadata: false,
        }
    }
}

impl SchedulerConfig {
    /// Parse `--socket <path> --cpus <n> --quanta <n> --metadata` by hand,
    /// matching the teacher's preference for explicit argument handling over
    /// a parsing crate. Returns a usage message on the first bad argument.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut cfg = SchedulerConfig::default();
        let mut it = args.into_iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--socket" => {
                    let v = it.next().ok_or("--socket requires a path")?;
                    cfg.socket_path = PathBuf::from(v);
                }
                "--cpus" => {
                    let v = it.next().ok_or("--cpus requires a number")?;
                    let n: usize = v.parse().map_err(|_| format!("invalid --cpus value: {v}"))?;
                    if n == 0 || n > MAX_CPUS {
                        return Err(format!("--cpus must be in 1..={MAX_CPUS}, got {n}"));
                    }
                    cfg.cpu_count = n;
                }
                "--quanta" => {
                    let v = it.next().ok_or("--quanta requires a number")?;
                    cfg.quanta = v.parse().map_err(|_| format!("invalid --quanta value: {v}"))?;
                }
                "--metadata" => cfg.metadata = true,
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(cfg)
    }
}
