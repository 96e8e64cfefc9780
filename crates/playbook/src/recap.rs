//! Parser for the `ansible-playbook` default callback output.
//!
//! Only the lines needed to attribute outcomes are understood:
//!
//! ```text
//! PLAY [Install docker] ******************************************************
//! TASK [docker : Install packages] *******************************************
//! ok: [web-1]
//! changed: [web-2 -> localhost]
//! fatal: [db-1]: FAILED! => {"msg": "..."}
//! ...ignoring
//! included: /roles/docker/tasks/ubuntu.yml for web-1, web-2
//! PLAY RECAP *****************************************************************
//! web-1      : ok=3    changed=1    unreachable=0    failed=0    skipped=0 ...
//! ```
//!
//! Everything else is ignored. Colour must be disabled by the caller.

use std::collections::BTreeMap;

/// Per-host result of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ok,
    Changed,
    Skipped,
    Included,
    Failed,
    Unreachable,
}

impl EventKind {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Unreachable)
    }
}

/// A host line under a task header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    /// Name of the enclosing play
    pub play: Option<String>,
    /// Role prefix of the task header (`TASK [role : name]`)
    pub role: Option<String>,
    pub host: String,
    pub kind: EventKind,
}

/// Counters from one `PLAY RECAP` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostRecap {
    pub ok: u32,
    pub changed: u32,
    pub unreachable: u32,
    pub failed: u32,
    pub skipped: u32,
    pub rescued: u32,
    pub ignored: u32,
}

impl HostRecap {
    /// No failed or unreachable tasks.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.unreachable == 0
    }
}

/// Parsed transcript of one playbook run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub events: Vec<TaskEvent>,
    pub recap: BTreeMap<String, HostRecap>,
    has_recap: bool,
}

impl Transcript {
    /// Parse captured stdout.
    pub fn parse(output: &str) -> Self {
        let mut transcript = Self::default();
        let mut play: Option<String> = None;
        let mut role: Option<String> = None;
        let mut in_recap = false;

        for line in output.lines() {
            let line = line.trim_end();

            if is_recap_header(line) {
                in_recap = true;
                transcript.has_recap = true;
                continue;
            }
            if in_recap {
                if let Some((host, counters)) = recap_line(line) {
                    transcript.recap.insert(host, counters);
                    continue;
                }
                if !line.trim().is_empty() {
                    in_recap = false;
                }
            }

            if let Some(title) = bracketed_header(line, "PLAY") {
                play = Some(title.to_string());
                role = None;
                continue;
            }
            if let Some(title) = bracketed_header(line, "TASK")
                .or_else(|| bracketed_header(line, "RUNNING HANDLER"))
            {
                role = title
                    .split_once(" : ")
                    .map(|(r, _)| r.trim().to_string());
                continue;
            }

            if line.trim() == "...ignoring" {
                if let Some(last) = transcript.events.iter_mut().rev().find(|e| e.kind.is_failure())
                {
                    last.kind = EventKind::Ok;
                }
                continue;
            }

            for (host, kind) in host_events(line) {
                transcript.events.push(TaskEvent {
                    play: play.clone(),
                    role: role.clone(),
                    host,
                    kind,
                });
            }
        }

        transcript
    }

    /// Whether a `PLAY RECAP` section was seen.
    pub fn has_recap(&self) -> bool {
        self.has_recap
    }
}

fn is_recap_header(line: &str) -> bool {
    line.strip_prefix("PLAY RECAP")
        .is_some_and(|rest| rest.trim().trim_matches('*').is_empty())
}

/// Match `PREFIX [title] ******` and return the title.
fn bracketed_header<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?.trim_start();
    let rest = rest.trim_end_matches('*').trim_end();
    rest.strip_prefix('[')?.strip_suffix(']')
}

fn recap_line(line: &str) -> Option<(String, HostRecap)> {
    let (host, counters) = line.split_once(" : ")?;
    let host = host.trim();
    if host.is_empty() {
        return None;
    }

    let mut recap = HostRecap::default();
    let mut seen = false;
    for token in counters.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let Ok(value) = value.parse::<u32>() else {
            continue;
        };
        let slot = match key {
            "ok" => &mut recap.ok,
            "changed" => &mut recap.changed,
            "unreachable" => &mut recap.unreachable,
            "failed" => &mut recap.failed,
            "skipped" => &mut recap.skipped,
            "rescued" => &mut recap.rescued,
            "ignored" => &mut recap.ignored,
            _ => continue,
        };
        *slot = value;
        seen = true;
    }

    seen.then(|| (host.to_string(), recap))
}

fn host_events(line: &str) -> Vec<(String, EventKind)> {
    if let Some(rest) = line.strip_prefix("included: ") {
        return match rest.rsplit_once(" for ") {
            Some((_, hosts)) => hosts
                .split(',')
                .map(|h| clean_host(h.trim()))
                .filter(|h| !h.is_empty())
                .map(|h| (h, EventKind::Included))
                .collect(),
            None => Vec::new(),
        };
    }

    let Some((status, rest)) = line.split_once(": [") else {
        return Vec::new();
    };
    let Some((host, tail)) = rest.split_once(']') else {
        return Vec::new();
    };

    let kind = match status {
        "ok" => EventKind::Ok,
        "changed" => EventKind::Changed,
        "skipping" => EventKind::Skipped,
        "failed" => EventKind::Failed,
        "fatal" if tail.contains("UNREACHABLE!") => EventKind::Unreachable,
        "fatal" => EventKind::Failed,
        _ => return Vec::new(),
    };

    vec![(clean_host(host), kind)]
}

/// Drop the delegation suffix from `host -> delegate`.
fn clean_host(host: &str) -> String {
    host.split_once(" -> ")
        .map_or(host, |(h, _)| h)
        .trim()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
PLAY [Install docker] **********************************************************

TASK [Gathering Facts] *********************************************************
ok: [web-1]
fatal: [db-1]: UNREACHABLE! => {\"changed\": false, \"unreachable\": true}

TASK [Install docker] **********************************************************
included: docker for web-1

TASK [docker : Install packages] ***********************************************
changed: [web-1]

TASK [docker : Probe old daemon] ***********************************************
fatal: [web-1]: FAILED! => {\"changed\": false, \"msg\": \"not running\"}
...ignoring

TASK [docker : Copy config] ****************************************************
ok: [web-1 -> localhost]
skipping: [web-1] => (item=extra)

PLAY RECAP *********************************************************************
db-1                       : ok=0    changed=0    unreachable=1    failed=0    skipped=0    rescued=0    ignored=0
web-1                      : ok=4    changed=1    unreachable=0    failed=0    skipped=1    rescued=0    ignored=1
";

    #[test]
    fn test_parse_recap() {
        let t = Transcript::parse(OUTPUT);
        assert!(t.has_recap());
        assert_eq!(t.recap.len(), 2);
        assert!(t.recap["web-1"].is_clean());
        assert_eq!(t.recap["web-1"].ignored, 1);
        assert_eq!(t.recap["db-1"].unreachable, 1);
        assert!(!t.recap["db-1"].is_clean());
    }

    #[test]
    fn test_parse_events_track_play_and_role() {
        let t = Transcript::parse(OUTPUT);

        let unreachable = t
            .events
            .iter()
            .find(|e| e.host == "db-1")
            .unwrap();
        assert_eq!(unreachable.kind, EventKind::Unreachable);
        assert_eq!(unreachable.play.as_deref(), Some("Install docker"));
        assert_eq!(unreachable.role, None);

        let changed = t
            .events
            .iter()
            .find(|e| e.kind == EventKind::Changed)
            .unwrap();
        assert_eq!(changed.role.as_deref(), Some("docker"));
    }

    #[test]
    fn test_ignoring_clears_failure() {
        let t = Transcript::parse(OUTPUT);
        assert!(
            !t.events
                .iter()
                .any(|e| e.host == "web-1" && e.kind.is_failure())
        );
    }

    #[test]
    fn test_delegated_host_and_included() {
        let t = Transcript::parse(OUTPUT);
        assert!(t.events.iter().all(|e| e.host == "web-1" || e.host == "db-1"));
        assert!(t.events.iter().any(|e| e.kind == EventKind::Included));
        assert!(t.events.iter().any(|e| e.kind == EventKind::Skipped));
    }

    #[test]
    fn test_no_recap() {
        let t = Transcript::parse("ERROR! the playbook: main.yml could not be found\n");
        assert!(!t.has_recap());
        assert!(t.events.is_empty());
    }

    #[test]
    fn test_included_multiple_hosts() {
        let t = Transcript::parse("included: /r/nginx/tasks/ubuntu.yml for web-1, web-2\n");
        let hosts: Vec<_> = t.events.iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, vec!["web-1", "web-2"]);
    }
}
