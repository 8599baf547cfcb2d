//! Wire codec for the event transport: decodes a `TimeFrame` batch from a
//! JSON object, encodes a `SchedulerTick` result back to JSON, and frames
//! messages on a byte stream per §6 (trailing newline, or completion of the
//! top-level `{…}` object, whichever comes first).

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{Result, SchedError};
use crate::event::{Event, TimeFrame};
use crate::group::QUOTA_KEEP;
use crate::scheduler::TickResult;

/// Maximum size of one framed message (§6).
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Scan `buf` for the end (exclusive) of the first complete message, honoring
/// `\"`-escaped strings so braces inside string literals don't count.
/// Returns `None` if no complete message is present yet.
pub fn find_frame(buf: &[u8]) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut started = false;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                depth += 1;
                started = true;
            }
            b'}' => {
                depth -= 1;
                if started && depth == 0 {
                    return Some(i + 1);
                }
            }
            b'\n' if started && depth == 0 => return Some(i + 1),
            _ => {}
        }
    }
    None
}

pub fn decode_batch(bytes: &[u8]) -> Result<TimeFrame> {
    if bytes.len() > MAX_MESSAGE_BYTES {
        return Err(SchedError::Protocol(format!(
            "message too large: {} bytes (max {})",
            bytes.len(),
            MAX_MESSAGE_BYTES
        )));
    }
    let root: Value = serde_json::from_slice(bytes)?;
    let vtime = root
        .get("vtime")
        .and_then(Value::as_i64)
        .ok_or_else(|| SchedError::Protocol("missing integer \"vtime\"".into()))?;
    let events = root
        .get("events")
        .and_then(Value::as_array)
        .ok_or_else(|| SchedError::Protocol("missing array \"events\"".into()))?;

    // A malformed or unknown-action event is per-event InvalidEvent (§7):
    // it's dropped and logged, but the rest of the batch still decodes and
    // still ticks. Only a structurally broken top-level message (checked
    // above) is a batch-ending Protocol error.
    let mut out = Vec::with_capacity(events.len());
    for (idx, ev) in events.iter().enumerate() {
        match decode_event(ev) {
            Ok(event) => out.push(event),
            Err(e) => tracing::warn!(vtime, event_index = idx, "dropping malformed event: {e}"),
        }
    }
    Ok(TimeFrame { vtime, events: out })
}

fn req_str(v: &Value, field: &str) -> Result<String> {
    v.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SchedError::InvalidEvent(format!("missing string \"{field}\"")))
}

fn opt_str(v: &Value, field: &str) -> Option<String> {
    v.get(field).and_then(Value::as_str).map(str::to_string)
}

fn opt_i64(v: &Value, field: &str) -> Option<i64> {
    v.get(field).and_then(Value::as_i64)
}

fn opt_u64(v: &Value, field: &str) -> Option<u64> {
    v.get(field).and_then(Value::as_u64)
}

fn opt_mask(v: &Value, field: &str) -> Option<HashSet<u32>> {
    v.get(field).and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(Value::as_u64)
            .map(|n| n as u32)
            .collect()
    })
}

/// `cpuQuotaUs` is tri-state on the wire: the field may be absent (no
/// opinion), explicitly `null` (unlimited, §6), or a number. For
/// `CGROUP_MODIFY` a present-but-absent distinction matters (absent = keep,
/// per `Group::modify`'s `QUOTA_KEEP` sentinel); `null` always means
/// unlimited.
fn quota_field(v: &Value) -> Option<i64> {
    match v.get("cpuQuotaUs") {
        None => None,
        Some(Value::Null) => Some(-1),
        Some(other) => other.as_i64().or(Some(QUOTA_KEEP)),
    }
}

fn decode_event(v: &Value) -> Result<Event> {
    let action = v
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| SchedError::InvalidEvent("missing string \"action\"".into()))?;

    Ok(match action {
        "TASK_CREATE" => Event::TaskCreate {
            id: req_str(v, "taskId")?,
            nice: opt_i64(v, "nice").map(|n| n as i32),
            group_id: opt_str(v, "cgroupId"),
            cpu_mask: opt_mask(v, "cpuMask"),
        },
        "TASK_EXIT" => Event::TaskExit { id: req_str(v, "taskId")? },
        "TASK_BLOCK" => Event::TaskBlock { id: req_str(v, "taskId")? },
        "TASK_UNBLOCK" => Event::TaskUnblock { id: req_str(v, "taskId")? },
        "TASK_YIELD" => Event::TaskYield { id: req_str(v, "taskId")? },
        "TASK_SETNICE" => {
            let nice = opt_i64(v, "nice")
                .or_else(|| opt_i64(v, "newNice"))
                .ok_or_else(|| SchedError::InvalidEvent("TASK_SETNICE missing nice".into()))?;
            Event::TaskSetNice { id: req_str(v, "taskId")?, nice: nice as i32 }
        }
        "TASK_SET_AFFINITY" => Event::TaskSetAffinity {
            id: req_str(v, "taskId")?,
            mask: opt_mask(v, "cpuMask").unwrap_or_default(),
        },
        "CGROUP_CREATE" => Event::CgroupCreate {
            id: req_str(v, "cgroupId")?,
            shares: opt_u64(v, "cpuShares").map(|n| n as u32),
            quota_us: quota_field(v),
            period_us: opt_u64(v, "cpuPeriodUs"),
            mask: opt_mask(v, "cpuMask"),
        },
        "CGROUP_MODIFY" => Event::CgroupModify {
            id: req_str(v, "cgroupId")?,
            shares: opt_u64(v, "cpuShares").map(|n| n as u32),
            quota_us: quota_field(v),
            period_us: opt_u64(v, "cpuPeriodUs"),
            mask: opt_mask(v, "cpuMask"),
        },
        "CGROUP_DELETE" => Event::CgroupDelete { id: req_str(v, "cgroupId")? },
        "TASK_MOVE_CGROUP" => Event::TaskMoveCgroup {
            id: req_str(v, "taskId")?,
            new_group_id: req_str(v, "newCgroupId")?,
        },
        "CPU_BURST" => {
            let duration = opt_u64(v, "duration")
                .ok_or_else(|| SchedError::InvalidEvent("CPU_BURST missing duration".into()))?;
            Event::CpuBurst { id: req_str(v, "taskId")?, duration: duration as u32 }
        }
        other => return Err(SchedError::InvalidEvent(format!("unknown action \"{other}\""))),
    })
}

pub fn encode_tick(result: &TickResult, include_metadata: bool) -> Vec<u8> {
    let mut obj = serde_json::Map::new();
    obj.insert("vtime".into(), Value::from(result.vtime));
    obj.insert(
        "schedule".into(),
        Value::Array(result.schedule.iter().cloned().map(Value::from).collect()),
    );
    if include_metadata {
        let meta = serde_json::json!({
            "preemptions": result.meta.preemptions,
            "migrations": result.meta.migrations,
            "runnableTasks": result.meta.runnable_tasks,
            "blockedTasks": result.meta.blocked_tasks,
        });
        obj.insert("meta".into(), meta);
    }
    let mut bytes = serde_json::to_vec(&Value::Object(obj)).expect("tick result is always valid JSON");
    bytes.push(b'\n');
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_minimal_batch() {
        let raw = br#"{"vtime": 3, "events": [{"action": "TASK_CREATE", "taskId": "T1"}]}"#;
        let batch = decode_batch(raw).unwrap();
        assert_eq!(batch.vtime, 3);
        assert_eq!(
            batch.events[0],
            Event::TaskCreate { id: "T1".into(), nice: None, group_id: None, cpu_mask: None }
        );
    }

    #[test]
    fn unknown_action_is_dropped_not_fatal() {
        let raw = br#"{"vtime": 0, "events": [{"action": "NOPE"}]}"#;
        let batch = decode_batch(raw).unwrap();
        assert!(batch.events.is_empty());
    }

    #[test]
    fn one_bad_event_does_not_drop_the_rest_of_the_batch() {
        let raw = br#"{"vtime": 0, "events": [
            {"action": "NOPE"},
            {"action": "TASK_CREATE", "taskId": "T1"}
        ]}"#;
        let batch = decode_batch(raw).unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(
            batch.events[0],
            Event::TaskCreate { id: "T1".into(), nice: None, group_id: None, cpu_mask: None }
        );
    }

    #[test]
    fn null_quota_means_unlimited() {
        let raw = br#"{"vtime": 0, "events": [{"action": "CGROUP_CREATE", "cgroupId": "g", "cpuQuotaUs": null}]}"#;
        let batch = decode_batch(raw).unwrap();
        match &batch.events[0] {
            Event::CgroupCreate { quota_us, .. } => assert_eq!(*quota_us, Some(-1)),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn absent_quota_on_modify_means_keep() {
        let raw = br#"{"vtime": 0, "events": [{"action": "CGROUP_MODIFY", "cgroupId": "g"}]}"#;
        let batch = decode_batch(raw).unwrap();
        match &batch.events[0] {
            Event::CgroupModify { quota_us, .. } => assert_eq!(*quota_us, None),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn find_frame_on_brace_completion() {
        let buf = br#"{"vtime": 0, "events": []}garbage"#;
        let end = find_frame(buf).unwrap();
        assert_eq!(&buf[..end], br#"{"vtime": 0, "events": []}"#);
    }

    #[test]
    fn find_frame_ignores_braces_in_strings() {
        let buf = br#"{"vtime": 0, "events": [{"action": "TASK_CREATE", "taskId": "a}b"}]}"#;
        let end = find_frame(buf).unwrap();
        assert_eq!(end, buf.len());
    }

    #[test]
    fn find_frame_incomplete_returns_none() {
        let buf = br#"{"vtime": 0, "events": ["#;
        assert!(find_frame(buf).is_none());
    }

    #[test]
    fn encode_tick_includes_metadata_only_when_enabled() {
        use crate::scheduler::{TickMeta, TickResult};
        let result = TickResult {
            vtime: 1,
            schedule: vec!["T1".into()],
            meta: TickMeta { preemptions: 0, migrations: 0, runnable_tasks: vec![], blocked_tasks: vec![] },
        };
        let with_meta = encode_tick(&result, true);
        let without_meta = encode_tick(&result, false);
        assert!(String::from_utf8_lossy(&with_meta).contains("meta"));
        assert!(!String::from_utf8_lossy(&without_meta).contains("meta"));
    }
}
