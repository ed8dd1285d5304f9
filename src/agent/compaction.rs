//! History compaction.
//!
//! When a conversation outgrows its token budget, the older part of the
//! history is condensed into a summary while the most recent exchanges are
//! kept verbatim. A pass runs in four steps:
//!
//! 1. **Token accounting**: a [`TokenCounter`] estimates each message. If the
//!    total fits under `max_tokens_before_summary`, nothing happens.
//! 2. **Block classification**: [`classify`] partitions the list into
//!    [`MessageBlock`]s so that an assistant tool request and its tool results
//!    are never separated.
//! 3. **Budget split**: [`split_by_budget`] walks the body newest to oldest
//!    and keeps whatever fits under `max_tokens_for_recent_messages`.
//! 4. **Summary generation**: the older blocks are rendered with
//!    [`render_blocks`] and handed to a [`Summarizer`].
//!
//! The split never stops early: a large block that does not fit is pushed to
//! "older", but smaller blocks further back can still land in "recent". The
//! recent set is therefore not always a contiguous suffix.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::CompactionConfig;
use crate::error::{ColloquyError, Result};
use crate::executor::{SummaryRequest, Summarizer};
use crate::log_component;
use crate::session::{Message, Role};

// ============================================================================
// Token counting
// ============================================================================

/// Per-message token estimation.
///
/// Must return exactly one estimate per input message, in order.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    async fn count(&self, messages: &[Message]) -> Result<Vec<u64>>;
}

/// Character-based estimate: roughly four characters per token.
///
/// Counts the role name, the content and, for assistant messages, every tool
/// call's name and arguments. Any non-empty message is at least one token.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicCounter;

impl HeuristicCounter {
    /// Estimate a single message.
    pub fn estimate(message: &Message) -> u64 {
        let mut chars = message.role.as_str().chars().count() + message.content.chars().count();
        if message.role == Role::Assistant {
            for call in message.tool_calls.iter().flatten() {
                chars += call.name.chars().count() + call.arguments.chars().count();
            }
        }
        let tokens = (chars / 4) as u64;
        if tokens == 0 && chars > 0 {
            1
        } else {
            tokens
        }
    }
}

#[async_trait]
impl TokenCounter for HeuristicCounter {
    async fn count(&self, messages: &[Message]) -> Result<Vec<u64>> {
        Ok(messages.iter().map(Self::estimate).collect())
    }
}

fn check_counts(messages: usize, counts: usize) -> Result<()> {
    if messages != counts {
        return Err(ColloquyError::Precondition(format!(
            "token count mismatch: {} messages, {} counts",
            messages, counts
        )));
    }
    Ok(())
}

// ============================================================================
// Blocks
// ============================================================================

/// Semantic role of a [`MessageBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The leading system message.
    System,
    /// The run of user messages opening the conversation.
    InitialUser,
    /// A summary left by an earlier compaction.
    PriorSummary,
    /// An assistant tool request plus the tool results answering it.
    ToolExchange,
    /// Any other single message.
    Singleton,
}

/// A contiguous run of messages that is kept or summarized as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBlock {
    pub kind: BlockKind,
    pub messages: Vec<Message>,
    pub tokens: u64,
}

impl MessageBlock {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            messages: Vec::new(),
            tokens: 0,
        }
    }

    fn single(kind: BlockKind, message: Message, tokens: u64) -> Self {
        let mut block = Self::new(kind);
        block.push(message, tokens);
        block
    }

    fn push(&mut self, message: Message, tokens: u64) {
        self.messages.push(message);
        self.tokens = self.tokens.saturating_add(tokens);
    }

    /// Whether this block may be split off into older/recent.
    pub fn is_body(&self) -> bool {
        matches!(self.kind, BlockKind::ToolExchange | BlockKind::Singleton)
    }
}

/// Partition `messages` into blocks.
///
/// Classification order: a leading system message, then the consecutive user
/// messages that follow it, then an assistant message tagged as a prior
/// summary. Everything after that is scanned left to right: an assistant
/// message with tool calls opens a tool exchange that absorbs the tool
/// messages immediately after it whose id matches one of its calls (or that
/// carry no id); all other messages become singletons.
///
/// Concatenating the blocks' messages gives back `messages` exactly.
///
/// # Errors
///
/// [`ColloquyError::Precondition`] if `tokens` is not parallel to `messages`.
pub fn classify(messages: Vec<Message>, tokens: &[u64]) -> Result<Vec<MessageBlock>> {
    check_counts(messages.len(), tokens.len())?;

    let mut items = messages
        .into_iter()
        .zip(tokens.iter().copied())
        .peekable();
    let mut blocks = Vec::new();

    if let Some((msg, tok)) = items.next_if(|(m, _)| m.role == Role::System) {
        blocks.push(MessageBlock::single(BlockKind::System, msg, tok));
    }

    let mut initial = MessageBlock::new(BlockKind::InitialUser);
    while let Some((msg, tok)) = items.next_if(|(m, _)| m.role == Role::User) {
        initial.push(msg, tok);
    }
    if !initial.messages.is_empty() {
        blocks.push(initial);
    }

    if let Some((msg, tok)) = items.next_if(|(m, _)| m.is_summary()) {
        blocks.push(MessageBlock::single(BlockKind::PriorSummary, msg, tok));
    }

    while let Some((msg, tok)) = items.next() {
        if msg.role != Role::Assistant || !msg.has_tool_calls() {
            blocks.push(MessageBlock::single(BlockKind::Singleton, msg, tok));
            continue;
        }

        let call_ids: HashSet<String> = msg.tool_call_ids().map(str::to_string).collect();
        let mut exchange = MessageBlock::single(BlockKind::ToolExchange, msg, tok);
        while let Some((result, tok)) = items.next_if(|(m, _)| {
            m.role == Role::Tool
                && match m.tool_call_id.as_deref() {
                    None | Some("") => true,
                    Some(id) => call_ids.contains(id),
                }
        }) {
            exchange.push(result, tok);
        }
        blocks.push(exchange);
    }

    Ok(blocks)
}

/// Split body blocks into `(older, recent)` under a recent-token budget.
///
/// Walks newest to oldest. A block that would push the running total past
/// `budget` goes to older; otherwise it goes to recent and its tokens count
/// against the budget. Both halves keep the original order.
///
/// # Example
/// ```
/// use colloquy::agent::compaction::{classify, split_by_budget};
/// use colloquy::session::Message;
///
/// let msgs = vec![Message::assistant("a"), Message::assistant("b"), Message::assistant("c")];
/// let blocks = classify(msgs, &[3, 4, 5]).unwrap();
/// let (older, recent) = split_by_budget(blocks, 10);
/// assert_eq!(older.len(), 1);
/// assert_eq!(recent.iter().map(|b| b.tokens).collect::<Vec<_>>(), vec![4, 5]);
/// ```
pub fn split_by_budget(
    body: Vec<MessageBlock>,
    budget: u64,
) -> (Vec<MessageBlock>, Vec<MessageBlock>) {
    let mut older = VecDeque::new();
    let mut recent = VecDeque::new();
    let mut recent_tokens: u64 = 0;

    for block in body.into_iter().rev() {
        if recent_tokens.saturating_add(block.tokens) > budget {
            older.push_front(block);
        } else {
            recent_tokens += block.tokens;
            recent.push_front(block);
        }
    }

    (older.into(), recent.into())
}

/// Render one message as summarizer input.
///
/// Format: `[role]` on its own line, then the content (if any), then for
/// assistant tool requests a `tool_call:` and `args:` line per call.
pub fn render_message(message: &Message) -> String {
    let mut out = format!("[{}]\n", message.role);
    if !message.content.is_empty() {
        out.push_str(&message.content);
        out.push('\n');
    }
    if message.role == Role::Assistant {
        for call in message.tool_calls.iter().flatten() {
            if !call.name.is_empty() {
                out.push_str("tool_call: ");
                out.push_str(&call.name);
                out.push('\n');
            }
            if !call.arguments.is_empty() {
                out.push_str("args: ");
                out.push_str(&call.arguments);
                out.push('\n');
            }
        }
    }
    out
}

/// Render blocks in order, each message followed by a blank line.
pub fn render_blocks<'a>(blocks: impl IntoIterator<Item = &'a MessageBlock>) -> String {
    let mut out = String::new();
    for block in blocks {
        for message in &block.messages {
            out.push_str(&render_message(message));
            out.push('\n');
        }
    }
    out
}

// ============================================================================
// Compactor
// ============================================================================

/// Outcome of one compaction pass.
#[derive(Debug, Clone)]
pub struct CompactionReport {
    /// The resulting history.
    pub messages: Vec<Message>,
    /// Estimated tokens of the input.
    pub total_tokens: u64,
    /// Body blocks routed to the summarizer.
    pub older_blocks: usize,
    /// Body blocks kept verbatim.
    pub recent_blocks: usize,
    /// The summarizer's reply, when it was called.
    pub summary: Option<Message>,
    /// Whether `messages` differs from the input.
    pub changed: bool,
}

impl CompactionReport {
    fn unchanged(messages: Vec<Message>, total_tokens: u64) -> Self {
        Self {
            messages,
            total_tokens,
            older_blocks: 0,
            recent_blocks: 0,
            summary: None,
            changed: false,
        }
    }
}

/// Token-budgeted history summarizer.
pub struct HistoryCompactor {
    config: CompactionConfig,
    counter: Arc<dyn TokenCounter>,
    summarizer: Arc<dyn Summarizer>,
}

impl HistoryCompactor {
    /// Create a compactor using the [`HeuristicCounter`].
    ///
    /// # Errors
    ///
    /// [`ColloquyError::Config`] if either token budget is zero.
    pub fn new(config: CompactionConfig, summarizer: Arc<dyn Summarizer>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            counter: Arc::new(HeuristicCounter),
            summarizer,
        })
    }

    /// Replace the token counter.
    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Run a pass and return the resulting history.
    pub async fn process_messages(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        Ok(self.compact(messages).await?.messages)
    }

    /// Run a pass and report what happened.
    ///
    /// With `splice_summary` enabled the result is
    /// `[system?] + [initial users] + summary + recent blocks`, where the
    /// summary also folds in any prior summary. With it disabled the input is
    /// returned as is and the summary is only reported.
    pub async fn compact(&self, messages: Vec<Message>) -> Result<CompactionReport> {
        if messages.is_empty() {
            return Ok(CompactionReport::unchanged(messages, 0));
        }

        let tokens = self.counter.count(&messages).await?;
        check_counts(messages.len(), tokens.len())?;

        let total: u64 = tokens.iter().fold(0u64, |acc, t| acc.saturating_add(*t));
        if total <= self.config.max_tokens_before_summary {
            debug!(
                tokens = total,
                threshold = self.config.max_tokens_before_summary,
                "History under budget, no compaction"
            );
            return Ok(CompactionReport::unchanged(messages, total));
        }

        let mut head = Vec::new();
        let mut prior_summary = None;
        let mut body = Vec::new();
        for block in classify(messages.clone(), &tokens)? {
            match block.kind {
                BlockKind::System | BlockKind::InitialUser => head.push(block),
                BlockKind::PriorSummary => prior_summary = Some(block),
                BlockKind::ToolExchange | BlockKind::Singleton => body.push(block),
            }
        }

        let (older, recent) = split_by_budget(body, self.config.max_tokens_for_recent_messages);
        if older.is_empty() {
            debug!(tokens = total, "Nothing old enough to summarize");
            return Ok(CompactionReport::unchanged(messages, total));
        }

        let older_messages = if self.config.splice_summary {
            render_blocks(prior_summary.iter().chain(older.iter()))
        } else {
            render_blocks(&older)
        };

        let summary = self
            .summarizer
            .invoke(SummaryRequest { older_messages })
            .await
            .map_err(|e| match e {
                ColloquyError::Summarizer(_) => e,
                other => ColloquyError::Summarizer(other.to_string()),
            })?;

        let mut report = CompactionReport {
            messages,
            total_tokens: total,
            older_blocks: older.len(),
            recent_blocks: recent.len(),
            summary: Some(summary.clone()),
            changed: false,
        };

        if !self.config.splice_summary {
            return Ok(report);
        }

        let mut compacted: Vec<Message> = head.into_iter().flat_map(|b| b.messages).collect();
        compacted.push(Message::summary(&summary.content));
        compacted.extend(recent.into_iter().flat_map(|b| b.messages));

        log_component!(
            info,
            "compaction",
            "History compacted",
            tokens = total,
            before = report.messages.len(),
            after = compacted.len()
        );
        report.messages = compacted;
        report.changed = true;
        Ok(report)
    }
}
