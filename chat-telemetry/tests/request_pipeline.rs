use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_telemetry::config::TelemetryConfig;
use chat_telemetry::guards::{ChatTurnFields, EmissionGuards, EmitOutcome, EventSink};
use chat_telemetry::primitives::{FeedbackValue, TelemetryEvent};
use chat_telemetry::publisher::{
    CollectorTransport, DeliveryResult, OutboundBatch, Publisher, PublisherState,
};
use chat_telemetry::scope::{
    RequestLifecycle, RequestScope, ScoredChunk, get_context, get_latency, set_latency,
    set_rag_info, snapshot_metrics,
};
use http::{HeaderMap, HeaderValue};
use serde_json::Value;

#[derive(Default)]
struct CountingSink {
    calls: AtomicUsize,
}

impl EventSink for CountingSink {
    fn enqueue(&self, _event: TelemetryEvent) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[derive(Default)]
struct CapturingTransport {
    bodies: Mutex<Vec<Value>>,
}

#[async_trait]
impl CollectorTransport for CapturingTransport {
    async fn deliver(&self, batch: &OutboundBatch) -> DeliveryResult<()> {
        let body = serde_json::from_slice(batch.body()).expect("envelope is json");
        self.bodies.lock().unwrap().push(body);
        Ok(())
    }
}

fn headers(trace: &str, turn: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-trace-id", HeaderValue::from_str(trace).unwrap());
    headers.insert("x-user-id", HeaderValue::from_static("user-7"));
    headers.insert("x-dept-id", HeaderValue::from_static("dept-2"));
    headers.insert("x-conversation-id", HeaderValue::from_static("conv-9"));
    headers.insert("x-turn-id", HeaderValue::from_str(turn).unwrap());
    headers
}

fn turn() -> ChatTurnFields {
    ChatTurnFields::new("policy_lookup", "rag", "hr").with_rag_used(true)
}

#[tokio::test]
async fn repeated_chat_turn_calls_enqueue_once() {
    let sink = Arc::new(CountingSink::default());
    let guards = EmissionGuards::new(sink.clone());
    let lifecycle = RequestLifecycle::new();

    for calls in [1, 2, 10] {
        let before = sink.calls.load(Ordering::SeqCst);
        lifecycle
            .run(&headers("trace-a", "1"), async {
                for _ in 0..calls {
                    guards.emit_chat_turn_once(turn());
                }
            })
            .await;
        assert_eq!(sink.calls.load(Ordering::SeqCst) - before, 1);
    }
}

#[tokio::test]
async fn unparsable_turn_header_suppresses_chat_turn() {
    let sink = Arc::new(CountingSink::default());
    let guards = EmissionGuards::new(sink.clone());

    let outcome = RequestLifecycle::new()
        .run(&headers("trace-a", "three"), async {
            guards.emit_chat_turn_once(turn())
        })
        .await;

    assert_eq!(outcome, EmitOutcome::MissingContext);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn state_does_not_leak_into_next_request() {
    let sink = Arc::new(CountingSink::default());
    let guards = EmissionGuards::new(sink.clone());
    let lifecycle = RequestLifecycle::new();

    let scope = RequestScope::new();
    scope
        .run(async {
            let request = lifecycle.begin(&headers("trace-a", "1")).unwrap();
            set_latency("retrieval", 25);
            set_rag_info("bm25", 3, vec![ScoredChunk::new("d", "c", 0.5)]);
            guards.emit_security_event_once("pii", "rule-1");
            drop(request);

            assert!(get_context().is_empty());
            assert!(snapshot_metrics().is_empty());
            assert!(RequestScope::guard_state().is_empty());

            let _next = lifecycle.begin(&HeaderMap::new()).unwrap();
            assert!(get_latency().is_empty());
            assert_eq!(
                guards.emit_security_event_once("pii", "rule-1"),
                EmitOutcome::MissingContext
            );
        })
        .await;

    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn interleaved_requests_keep_separate_state() {
    let sink = Arc::new(CountingSink::default());
    let guards = EmissionGuards::new(sink.clone());
    let lifecycle = RequestLifecycle::new();
    let (headers_a, headers_b) = (headers("trace-a", "1"), headers("trace-b", "2"));

    let first = lifecycle.run(&headers_a, async {
        set_latency("generation", 100);
        tokio::task::yield_now().await;
        let seen = (get_context().trace_id, get_latency().total_ms());
        guards.emit_chat_turn_once(turn());
        seen
    });
    let second = lifecycle.run(&headers_b, async {
        set_latency("generation", 7);
        tokio::task::yield_now().await;
        let seen = (get_context().trace_id, get_latency().total_ms());
        guards.emit_chat_turn_once(turn());
        seen
    });

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a, (Some("trace-a".to_owned()), 100));
    assert_eq!(b, (Some("trace-b".to_owned()), 7));
    assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn spawned_continuation_keeps_request_context() {
    let lifecycle = RequestLifecycle::new();

    let trace = lifecycle
        .run(&headers("trace-spawn", "4"), async {
            RequestScope::spawn(async { get_context().trace_id })
                .await
                .unwrap()
        })
        .await;

    assert_eq!(trace.as_deref(), Some("trace-spawn"));
}

#[tokio::test(start_paused = true)]
async fn events_reach_the_collector_in_one_envelope() {
    let transport = Arc::new(CapturingTransport::default());
    let config = TelemetryConfig::new("http://collector.internal")
        .with_batch_size(NonZeroUsize::new(20).unwrap())
        .with_flush_interval(Duration::from_millis(500))
        .with_source("chat-api");
    let publisher = Publisher::new(config, transport.clone()).unwrap();
    publisher.start().unwrap();
    let guards = EmissionGuards::new(Arc::new(publisher.clone()));
    let lifecycle = RequestLifecycle::new();

    lifecycle
        .run(&headers("trace-e2e", "5"), async {
            set_latency("retrieval", 30);
            set_latency("generation", 220);
            set_rag_info("hybrid", 2, vec![ScoredChunk::new("doc-4", "c-2", 0.77)]);
            guards.emit_chat_turn_once(turn());
            guards.emit_chat_turn_once(turn());
            guards.emit_security_event_once("prompt_injection", "pi-003");
            guards.emit_feedback_event_once(FeedbackValue::Like, "conv-9", 4);
        })
        .await;

    assert_eq!(publisher.queue_len(), 3);
    tokio::time::sleep(Duration::from_millis(600)).await;

    let bodies = transport.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let envelope = &bodies[0];
    assert_eq!(envelope["source"], "chat-api");
    let events = envelope["events"].as_array().unwrap();
    let kinds: Vec<_> = events.iter().map(|e| e["eventType"].as_str().unwrap()).collect();
    assert_eq!(kinds, ["CHAT_TURN", "SECURITY", "FEEDBACK"]);

    let chat = &events[0];
    assert_eq!(chat["traceId"], "trace-e2e");
    assert_eq!(chat["turnId"], 5);
    assert_eq!(chat["payload"]["latencyMsTotal"], 250);
    assert_eq!(chat["payload"]["ragInfo"]["sources"][0]["docId"], "doc-4");
    assert_eq!(events[1]["payload"]["blocked"], true);
    assert_eq!(events[2]["payload"]["feedback"], "like");

    publisher.stop().await;
    assert_eq!(publisher.state(), PublisherState::Stopped);
    assert_eq!(publisher.stats().events_delivered, 3);
}
