//! Drives simulated chat requests through the telemetry pipeline.
//!
//! Reads `TELEMETRY_*` variables from the environment. Without a collector
//! URL the publisher runs disabled and the guards only log what they would
//! have sent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chat_telemetry::config::TelemetryConfig;
use chat_telemetry::guards::{ChatTurnFields, EmissionGuards};
use chat_telemetry::primitives::FeedbackValue;
use chat_telemetry::publisher::Publisher;
use chat_telemetry::scope::{RequestLifecycle, ScoredChunk, set_latency, set_rag_info};
use clap::Parser;
use http::{HeaderMap, HeaderValue};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Simulate chat requests emitting telemetry")]
struct Args {
    /// Number of requests to simulate.
    #[arg(short = 'n', long, default_value_t = 5)]
    requests: u32,

    /// Collector base URL; overrides `TELEMETRY_COLLECTOR_URL`.
    #[arg(long)]
    collector_url: Option<String>,

    /// Conversation the simulated turns belong to.
    #[arg(long, default_value = "demo-conversation")]
    conversation: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = TelemetryConfig::from_env()?;
    if let Some(url) = args.collector_url.as_deref() {
        config = config.with_collector_url(url).with_enabled(true);
    }

    let publisher = Publisher::from_config(config)?;
    publisher.start()?;
    let guards = EmissionGuards::new(Arc::new(publisher.clone()));
    let lifecycle = RequestLifecycle::new();

    for turn in 1..=args.requests {
        let headers = request_headers(&args.conversation, turn)?;
        lifecycle
            .run(&headers, handle_chat(&guards, &args.conversation, turn))
            .await;
    }

    publisher.stop().await;
    let stats = publisher.stats();
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        delivered = stats.events_delivered,
        dropped = stats.events_dropped + stats.dropped_queue_full,
        "demo finished"
    );
    Ok(())
}

fn request_headers(conversation: &str, turn: u32) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("x-trace-id", HeaderValue::from_str(&format!("trace-{turn:04}"))?);
    headers.insert("x-user-id", HeaderValue::from_static("demo-user"));
    headers.insert("x-dept-id", HeaderValue::from_static("support"));
    headers.insert("x-conversation-id", HeaderValue::from_str(conversation)?);
    headers.insert("x-turn-id", HeaderValue::from(turn));
    Ok(headers)
}

async fn handle_chat(guards: &EmissionGuards, conversation: &str, turn: u32) {
    let retrieval_ms = 20 + u64::from(turn % 7) * 5;
    tokio::time::sleep(Duration::from_millis(retrieval_ms)).await;
    set_latency("retrieval", retrieval_ms);
    set_rag_info(
        "hybrid-bm25",
        3,
        vec![
            ScoredChunk::new("kb-returns", format!("c-{turn}"), 0.82),
            ScoredChunk::new("kb-shipping", "c-1", 0.47),
        ],
    );

    if turn % 4 == 0 {
        guards.emit_security_event_once("pii", "pii-email-001");
    }

    tokio::time::sleep(Duration::from_millis(40)).await;
    set_latency("generation", 40);

    let outcome = guards.emit_chat_turn_once(
        ChatTurnFields::new("order_status", "rag", "commerce")
            .with_rag_used(true)
            .with_pii_detected(turn % 4 == 0, false),
    );
    info!(turn, ?outcome, "chat turn handled");

    if turn > 1 {
        let feedback = if turn % 3 == 0 {
            FeedbackValue::Dislike
        } else {
            FeedbackValue::Like
        };
        guards.emit_feedback_event_once(feedback, conversation, i64::from(turn - 1));
    }
}
