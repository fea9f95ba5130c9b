use meridian::{JsonlTraceSink, SessionEvent, SessionTrace, TraceSink};
use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct TraceRow {
    timestamp_ms: i64,
    event: String,
    depth: u32,
}

#[test]
fn jsonl_trace_sink_writes_events_and_flushes_on_join() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.jsonl");

    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    sink.record(SessionTrace {
        timestamp_ms: 1,
        event: SessionEvent::PlanningCompleted {
            depth: 0,
            queries: vec!["first query".into()],
            plan_chars: 42,
        },
    })
    .unwrap();
    sink.record(SessionTrace {
        timestamp_ms: 2,
        event: SessionEvent::DecisionMade {
            depth: 0,
            is_complete: false,
            reason: "gaps remain".into(),
        },
    })
    .unwrap();

    drop(sink);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: TraceRow = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first.timestamp_ms, 1);
    assert_eq!(first.event, "planning_completed");
    assert_eq!(first.depth, 0);

    let second: TraceRow = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second.event, "decision_made");
}

#[test]
fn session_trace_now_stamps_wall_clock() {
    let trace = SessionTrace::now(SessionEvent::ReasoningCompleted {
        depth: 1,
        trace_chars: 10,
    });
    assert!(trace.timestamp_ms > 0);
}
