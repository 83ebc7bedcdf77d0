// reassembler.rs - Streaming Reply Reassembly
// Buffers raw chunks from a streaming generation response, decodes them into JSON lines,
// extracts the generated text and flushes it into a chain of Discord messages.
//
// Flush rules:
// - A write decision happens whenever `chunk_size` new characters have arrived, and once
//   more at end-of-stream for whatever is left.
// - If the current message would pass `max_message_length - chunk_size`, the unflushed
//   text spills into a new message (follow-up first, then replies). Otherwise the
//   current message is edited in place.
// - Only one flush runs at a time. Chunk arrival skips flushing while another flush is
//   active (that flush drains the queue), end-of-stream waits for it.

use std::collections::VecDeque;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::decoder::LineDecoder;
use super::sink::MessageSink;
use crate::error::BotResult;
use crate::service::{ChatResponse, GenerateResponse};

/// One JSON object of a streaming response that may carry generated text
pub trait StreamChunk: DeserializeOwned {
    fn into_text(self) -> Option<String>;
}

impl StreamChunk for GenerateResponse {
    fn into_text(self) -> Option<String> {
        Some(self.response).filter(|text| !text.is_empty())
    }
}

impl StreamChunk for ChatResponse {
    fn into_text(self) -> Option<String> {
        self.message
            .map(|message| message.content)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FlushConfig {
    pub max_message_length: usize,
    pub chunk_size: usize,
}

impl FlushConfig {
    // Leaves room for one more chunk before the next decision point
    fn spill_threshold(&self) -> usize {
        self.max_message_length.saturating_sub(self.chunk_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Receiving,
    FlushingFinal,
    Done,
}

/// Result of a completed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOutcome {
    /// Every piece of generated text, in order
    pub text: String,
    /// Messages in the outbound chain, the deferred reply included
    pub messages: usize,
    pub writes: usize,
    pub parse_errors: usize,
}

// Everything touched while flushing. Holding its lock is the "flushing" state.
struct ReplyState<H> {
    phase: StreamPhase,
    lines: LineDecoder,
    message: String,
    part: String,
    chain: Vec<H>,
    transcript: String,
    writes: usize,
    parse_errors: usize,
}

pub struct Reassembler<C, S: MessageSink> {
    sink: S,
    config: FlushConfig,
    pending: Mutex<VecDeque<Vec<u8>>>,
    state: Mutex<ReplyState<S::Handle>>,
    has_output: AtomicBool,
    _format: PhantomData<fn() -> C>,
}

impl<C: StreamChunk, S: MessageSink> Reassembler<C, S> {
    pub fn new(sink: S, config: FlushConfig) -> Self {
        Self {
            sink,
            config,
            pending: Mutex::new(VecDeque::new()),
            state: Mutex::new(ReplyState {
                phase: StreamPhase::Idle,
                lines: LineDecoder::default(),
                message: String::new(),
                part: String::new(),
                chain: Vec::new(),
                transcript: String::new(),
                writes: 0,
                parse_errors: 0,
            }),
            has_output: AtomicBool::new(false),
            _format: PhantomData,
        }
    }

    /// Whether anything has been written to the sink yet
    pub fn has_output(&self) -> bool {
        self.has_output.load(Ordering::Acquire)
    }

    /// Drive the reassembler from a byte stream until it ends. A transport error
    /// ends the stream; sink errors are returned.
    pub async fn relay<St, B, E>(&self, stream: St) -> BotResult<ReplyOutcome>
    where
        St: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        futures_util::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => self.on_chunk(bytes.as_ref()).await?,
                Err(e) => {
                    log::error!("[RELAY] Stream error, finishing with what arrived: {}", e);
                    break;
                }
            }
        }
        self.on_end().await
    }

    /// Queue a chunk and flush unless a flush is already running
    pub async fn on_chunk(&self, chunk: &[u8]) -> BotResult<()> {
        self.pending.lock().await.push_back(chunk.to_vec());

        loop {
            let mut state = match self.state.try_lock() {
                Ok(state) => state,
                // The active flush drains the queue
                Err(_) => return Ok(()),
            };

            match state.phase {
                StreamPhase::Done | StreamPhase::FlushingFinal => {
                    let dropped = self.pending.lock().await.len();
                    log::warn!("[RELAY] Ignoring {} chunk(s) received after end of stream", dropped);
                    self.pending.lock().await.clear();
                    return Ok(());
                }
                StreamPhase::Idle => state.phase = StreamPhase::Receiving,
                StreamPhase::Receiving => {}
            }

            self.drain(&mut state).await?;
            drop(state);

            // A chunk may have been queued after the drain finished but before the guard
            // was released; its own flush attempt was skipped.
            if self.pending.lock().await.is_empty() {
                return Ok(());
            }
        }
    }

    /// End-of-stream: wait for any running flush, drain everything and write what is left
    pub async fn on_end(&self) -> BotResult<ReplyOutcome> {
        let mut state = self.state.lock().await;

        if state.phase != StreamPhase::Done {
            state.phase = StreamPhase::FlushingFinal;
            self.drain(&mut state).await?;

            for line in state.lines.finish() {
                self.process_line(&mut state, &line).await?;
            }

            if !state.part.is_empty() {
                self.decide(&mut state).await?;
            }

            state.phase = StreamPhase::Done;
            log::debug!(
                "[RELAY] Stream finished: {} chars, {} message(s), {} write(s), {} parse error(s)",
                state.transcript.chars().count(),
                state.chain.len() + 1,
                state.writes,
                state.parse_errors
            );
        }

        Ok(ReplyOutcome {
            text: state.transcript.clone(),
            messages: if state.writes == 0 { 0 } else { state.chain.len() + 1 },
            writes: state.writes,
            parse_errors: state.parse_errors,
        })
    }

    async fn drain(&self, state: &mut ReplyState<S::Handle>) -> BotResult<()> {
        loop {
            let chunk = match self.pending.lock().await.pop_front() {
                Some(chunk) => chunk,
                None => return Ok(()),
            };
            for line in state.lines.feed(&chunk) {
                self.process_line(state, &line).await?;
            }
        }
    }

    async fn process_line(&self, state: &mut ReplyState<S::Handle>, line: &str) -> BotResult<()> {
        let text = match serde_json::from_str::<C>(line) {
            Ok(chunk) => chunk.into_text(),
            Err(e) => {
                state.parse_errors += 1;
                log::error!("[RELAY] Failed to parse JSON: {} (line: {:.120})", e, line);
                return Ok(());
            }
        };

        if let Some(text) = text {
            state.part.push_str(&text);
            state.message.push_str(&text);
            state.transcript.push_str(&text);

            if state.part.chars().count() >= self.config.chunk_size {
                self.decide(state).await?;
            }
        }
        Ok(())
    }

    // Spill into a new message or edit the current one
    async fn decide(&self, state: &mut ReplyState<S::Handle>) -> BotResult<()> {
        if state.message.chars().count() > self.config.spill_threshold() {
            self.spill(state).await?;
        } else {
            let content = state.message.clone();
            self.write_tail(state, &content).await?;
        }
        state.part.clear();
        Ok(())
    }

    // The tail already shows `message` minus `part`; `part` moves on to a new message
    async fn spill(&self, state: &mut ReplyState<S::Handle>) -> BotResult<()> {
        let shown_chars = state.message.chars().count() - state.part.chars().count();
        let mut pieces = hard_split(&state.part, self.config.max_message_length).into_iter();

        if shown_chars == 0 {
            // Nothing visible in the tail yet, fill it before opening a new message
            if let Some(first) = pieces.next() {
                self.write_tail(state, &first).await?;
                state.message = first;
            }
        }

        for piece in pieces {
            let handle = match state.chain.last() {
                None => self.sink.follow_up(&piece).await?,
                Some(tail) => self.sink.reply(tail, &piece).await?,
            };
            self.record_write(state);
            state.chain.push(handle);
            state.message = piece;
        }

        log::debug!("[RELAY] Spilled into message {}", state.chain.len() + 1);
        Ok(())
    }

    async fn write_tail(&self, state: &mut ReplyState<S::Handle>, content: &str) -> BotResult<()> {
        match state.chain.last_mut() {
            None => self.sink.edit_reply(content).await?,
            Some(tail) => self.sink.edit(tail, content).await?,
        }
        self.record_write(state);
        Ok(())
    }

    fn record_write(&self, state: &mut ReplyState<S::Handle>) {
        state.writes += 1;
        self.has_output.store(true, Ordering::Release);
    }
}

// Cut text into pieces of at most `max` characters
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}
