//! Session event capture for research runs.
//!
//! The core emits one event per state-machine transition; where those
//! events go (a jsonl file, a database, nowhere) is the sink's business.
//! Replayable session logs come from pointing [`JsonlTraceSink`] at a file.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One research-session event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PlanningCompleted {
        depth: u32,
        queries: Vec<String>,
        plan_chars: usize,
    },
    SearchBatchCompleted {
        depth: u32,
        queries: usize,
        new_sources: usize,
        total_sources: usize,
    },
    ReasoningCompleted {
        depth: u32,
        trace_chars: usize,
    },
    DecisionMade {
        depth: u32,
        is_complete: bool,
        reason: String,
    },
    DraftTurnCompleted {
        turn: u32,
        phase: String,
        draft_chars: usize,
        output_tokens: u32,
    },
    ResearchStopped {
        depth: u32,
        stop_reason: String,
        total_sources: usize,
    },
}

/// A timestamped event as written to the log.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTrace {
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

impl SessionTrace {
    pub fn now(event: SessionEvent) -> Self {
        Self {
            timestamp_ms: now_epoch_ms(),
            event,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: SessionTrace) -> Result<(), TraceError>;
}

#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<SessionTrace>,
}

pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    pub fn join(mut self) -> Result<(), TraceError> {
        let handle = self.handle.take();
        match handle {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("trace worker panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<SessionTrace>();
        let handle = std::thread::spawn(move || write_trace_loop(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: SessionTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_trace_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<SessionTrace>,
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Record an event on an optional sink, propagating sink failures.
pub(crate) fn record_event(
    sink: Option<&dyn TraceSink>,
    event: SessionEvent,
) -> Result<(), TraceError> {
    match sink {
        Some(sink) => sink.record(SessionTrace::now(event)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let trace = SessionTrace {
            timestamp_ms: 42,
            event: SessionEvent::DecisionMade {
                depth: 1,
                is_complete: true,
                reason: "covered".into(),
            },
        };
        let json = serde_json::to_string(&trace).unwrap();
        assert!(json.contains(r#""event":"decision_made""#));
        assert!(json.contains(r#""timestamp_ms":42"#));
    }
}
