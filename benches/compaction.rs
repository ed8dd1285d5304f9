//! Benchmarks for history compaction.
//!
//! Measures block classification and a full compaction pass over histories
//! of growing length, with a summarizer that answers instantly so only the
//! local work is timed.

use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use colloquy::agent::compaction::{classify, split_by_budget, HeuristicCounter};
use colloquy::agent::HistoryCompactor;
use colloquy::config::CompactionConfig;
use colloquy::error::Result;
use colloquy::executor::{SummaryRequest, Summarizer};
use colloquy::session::{Message, ToolCall};

struct InstantSummarizer;

#[async_trait]
impl Summarizer for InstantSummarizer {
    async fn invoke(&self, request: SummaryRequest) -> Result<Message> {
        Ok(Message::assistant(&format!(
            "summary of {} chars",
            request.older_messages.len()
        )))
    }
}

/// A conversation of `turns` exchanges, every third one using a tool.
fn history(turns: usize) -> Vec<Message> {
    let mut messages = vec![
        Message::system("You are a helpful AI assistant."),
        Message::user("Let's plan a trip."),
    ];
    for i in 0..turns {
        if i % 3 == 0 {
            let id = format!("call_{}", i);
            messages.push(Message::assistant_with_tools(
                "",
                vec![ToolCall::new(&id, "search", r#"{"query":"flights"}"#)],
            ));
            messages.push(Message::tool_result(&id, "three options found, cheapest on Tuesday"));
        }
        messages.push(Message::assistant(&format!("Here is step {} of the plan.", i)));
        messages.push(Message::user(&format!("Sounds good, what about step {}?", i + 1)));
    }
    messages
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_and_split");
    for turns in [10usize, 100, 1000] {
        let messages = history(turns);
        let tokens: Vec<u64> = messages.iter().map(HeuristicCounter::estimate).collect();
        group.bench_with_input(BenchmarkId::from_parameter(turns), &turns, |b, _| {
            b.iter(|| {
                let blocks = classify(black_box(messages.clone()), &tokens).unwrap_or_default();
                let body = blocks.into_iter().filter(|block| block.is_body()).collect();
                black_box(split_by_budget(body, 500))
            })
        });
    }
    group.finish();
}

fn bench_compact(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let compactor = HistoryCompactor::new(CompactionConfig::default(), Arc::new(InstantSummarizer))
        .unwrap();

    let mut group = c.benchmark_group("compact");
    for turns in [10usize, 100, 1000] {
        let messages = history(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &turns, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(compactor.compact(messages.clone()).await.unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_classify, bench_compact);
criterion_main!(benches);
