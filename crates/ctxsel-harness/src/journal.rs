#![forbid(unsafe_code)]

//! Host event journal.
//!
//! Every structural operation and every consumer re-render is appended to a
//! shared journal. Tests dump it as JSONL (one object per line, tagged by
//! `event`) when an assertion fails so the run can be replayed by reading.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::error::Result;
use crate::host::NodeId;

/// One journaled host operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    MountGroup {
        node: NodeId,
        parent: NodeId,
    },
    MountProvider {
        node: NodeId,
        parent: NodeId,
        topic: u64,
        provider: u64,
    },
    MountConsumer {
        node: NodeId,
        parent: NodeId,
        topic: u64,
        selector: bool,
    },
    /// Logged after the render returns, so any `Rerender` it caused comes first.
    SetValue {
        node: NodeId,
        topic: u64,
        changed: bool,
        delivered: usize,
        panicked: usize,
    },
    Rerender {
        node: NodeId,
    },
    Unmount {
        node: NodeId,
        kind: &'static str,
    },
}

impl HostEvent {
    /// Serialize as a single JSON line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Append-only event log shared between the host and its re-render hooks.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Rc<RefCell<Vec<HostEvent>>>,
}

impl Journal {
    pub(crate) fn push(&self, event: HostEvent) {
        tracing::trace!(message = "host.event", event = ?event);
        self.events.borrow_mut().push(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Copy of every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    /// Number of `Rerender` events recorded for `node`.
    #[must_use]
    pub fn rerenders_of(&self, node: NodeId) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, HostEvent::Rerender { node: n } if *n == node))
            .count()
    }

    /// All events as JSONL, one per line, newline-terminated.
    pub fn to_jsonl(&self) -> Result<String> {
        let mut out = String::new();
        for event in self.events.borrow().iter() {
            out.push_str(&event.to_jsonl()?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let line = HostEvent::Unmount {
            node: NodeId::ROOT,
            kind: "group",
        }
        .to_jsonl()
        .expect("serializable");
        assert_eq!(line, r#"{"event":"unmount","node":0,"kind":"group"}"#);
    }

    #[test]
    fn jsonl_has_one_line_per_event() {
        let journal = Journal::default();
        journal.push(HostEvent::Rerender { node: NodeId::ROOT });
        journal.push(HostEvent::MountGroup {
            node: NodeId::ROOT,
            parent: NodeId::ROOT,
        });
        let out = journal.to_jsonl().expect("serializable");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let v: serde_json::Value = serde_json::from_str(line).expect("valid json");
            assert!(v.get("event").is_some());
        }
        assert_eq!(journal.rerenders_of(NodeId::ROOT), 1);
        journal.clear();
        assert!(journal.is_empty());
    }
}
