use std::collections::VecDeque;

use futures_util::stream::{self, LocalBoxStream};
use futures_util::StreamExt;
use log::warn;

use crate::error::{AssistantError, Result};
use crate::models::StreamFrame;
use crate::services::transport::ByteStream;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Delta {
        content: Option<String>,
        session_id: Option<String>,
    },
    Done,
}

/// Splits a byte stream into lines. Bytes are held until the newline
/// arrives, so a UTF-8 sequence cut between two chunks decodes intact.
#[derive(Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(decode(&line));
        }
        lines
    }

    /// Whatever is left once the body has ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode(&rest))
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Interpret one line of the event stream. Lines that aren't `data:` lines
/// (comments, `event:` fields, blank separators) yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<SseEvent>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();
    if data == DONE_SENTINEL {
        return Ok(Some(SseEvent::Done));
    }
    let frame: StreamFrame = serde_json::from_str(data)
        .map_err(|e| AssistantError::StreamParse(format!("{}: {}", e, data)))?;
    Ok(Some(SseEvent::Delta {
        content: frame.content().map(str::to_string),
        session_id: frame.session_id,
    }))
}

struct EventState {
    body: ByteStream,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Decode a response body into events. The stream ends after `[DONE]`,
/// after a transport error, or when the body runs out. Frames that fail
/// to parse are logged and skipped.
pub fn events(body: ByteStream) -> LocalBoxStream<'static, Result<SseEvent>> {
    let state = EventState {
        body,
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                match parse_line(&line) {
                    Ok(None) => continue,
                    Ok(Some(SseEvent::Done)) => {
                        state.pending.clear();
                        state.finished = true;
                        return Some((Ok(SseEvent::Done), state));
                    }
                    Ok(Some(event)) => return Some((Ok(event), state)),
                    Err(err) => {
                        warn!("skipping stream frame: {}", err);
                        continue;
                    }
                }
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.decoder.push(&chunk);
                    state.pending.extend(lines);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    if let Some(tail) = state.decoder.finish() {
                        state.pending.push_back(tail);
                    }
                }
            }
        }
    })
    .boxed_local()
}
