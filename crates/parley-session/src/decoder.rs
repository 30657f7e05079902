//! Chunk-boundary-agnostic frame decoder.
//!
//! The assistant backend answers in one of three shapes depending on which
//! path served the request:
//!
//! - **Delimited blocks**: SSE-style blocks separated by a blank line, each
//!   with optional `event:` and one or more `data:` lines
//! - **Delimited lines**: one JSON object per line, optionally prefixed by `data:`
//! - **Bare document**: the whole response is a single JSON object
//!
//! The decoder buffers text until it can tell which shape it is reading,
//! then commits to that interpretation for the rest of the session:
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ Undetermined │
//!                 └──────┬───────┘
//!        ┌───────────────┼────────────────┐
//!        ▼               ▼                ▼
//! ┌──────────────┐ ┌─────────────────┐ ┌────────────────┐
//! │ BareDocument │ │ DelimitedBlocks │ │ DelimitedLines │
//! └──────────────┘ └─────────────────┘ └────────────────┘
//! ```
//!
//! The transition is taken once, and only after a frame has been extracted
//! under the chosen interpretation. Nothing is consumed from the buffer
//! before that, so the frames produced never depend on where the network
//! happened to split the text.
//!
//! A buffer whose first line opens an object without closing it can only be
//! a pretty-printed bare document. It is never run through line or block
//! extraction, even when a nested object sits alone on a later line.

use serde_json::Value;

/// End-of-stream sentinel some backends send as a data payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// SSE field names recognised at the start of a line.
const SSE_FIELDS: [&str; 4] = ["data", "event", "id", "retry"];

/// One decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Event name from an `event:` line, if the block had one.
    pub event: Option<String>,
    /// The payload. Always a JSON object.
    pub payload: Value,
    /// True when the payload is the entire response (bare document form).
    pub whole_response: bool,
}

impl Frame {
    fn delimited(event: Option<String>, payload: Value) -> Self {
        Self {
            event,
            payload,
            whole_response: false,
        }
    }

    /// The `type` member of the payload, if present.
    #[must_use]
    pub fn type_tag(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }
}

/// Which wire shape the decoder has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// No frame extracted yet.
    #[default]
    Undetermined,
    /// The whole response was one JSON document.
    BareDocument,
    /// Blank-line-delimited blocks.
    DelimitedBlocks,
    /// Newline-delimited JSON.
    DelimitedLines,
}

/// Incremental decoder for one stream session.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    mode: DecodeMode,
    frames_emitted: usize,
    /// The first line opened a document; wait for it to close.
    awaiting_document: bool,
}

impl FrameDecoder {
    /// Create a decoder in the undetermined state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed interpretation.
    #[must_use]
    pub const fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Bytes currently held back waiting for a delimiter.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames produced so far.
    #[must_use]
    pub const fn frames_emitted(&self) -> usize {
        self.frames_emitted
    }

    /// Feed a chunk of text and return every frame it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<Frame> {
        if self.mode == DecodeMode::BareDocument {
            if !chunk.trim().is_empty() {
                tracing::debug!(len = chunk.len(), "Ignoring data after bare document");
            }
            return Vec::new();
        }

        self.buffer.extend(chunk.chars().filter(|c| *c != '\r'));

        let frames = match self.mode {
            DecodeMode::Undetermined if self.awaiting_document && !chunk.contains('}') => {
                Vec::new()
            }
            DecodeMode::Undetermined => self.detect(false),
            DecodeMode::DelimitedBlocks => self.drain(extract_blocks, false),
            DecodeMode::DelimitedLines => self.drain(extract_lines, false),
            DecodeMode::BareDocument => Vec::new(),
        };
        self.frames_emitted += frames.len();
        frames
    }

    /// Flush whatever is left at end of stream.
    ///
    /// A trailing block or line without its delimiter is emitted, and a
    /// still-undetermined buffer holding one complete JSON object is taken
    /// as a bare document.
    pub fn finish(&mut self) -> Vec<Frame> {
        let frames = match self.mode {
            DecodeMode::Undetermined => self.detect(true),
            DecodeMode::DelimitedBlocks => self.drain(extract_blocks, true),
            DecodeMode::DelimitedLines => self.drain(extract_lines, true),
            DecodeMode::BareDocument => Vec::new(),
        };
        if !self.buffer.trim().is_empty() {
            tracing::debug!(len = self.buffer.len(), "Discarding undecodable stream tail");
        }
        self.buffer.clear();
        self.frames_emitted += frames.len();
        frames
    }

    fn detect(&mut self, at_eof: bool) -> Vec<Frame> {
        if let Some(frame) = bare_document(&self.buffer) {
            tracing::debug!("Stream is a bare document");
            self.commit(DecodeMode::BareDocument);
            self.buffer.clear();
            return vec![frame];
        }

        if !self.awaiting_document && opens_document(&self.buffer, at_eof) {
            tracing::trace!("First line opens a document, buffering until it closes");
            self.awaiting_document = true;
        }
        if self.awaiting_document {
            if at_eof {
                tracing::debug!(len = self.buffer.len(), "Bare document never closed");
            }
            return Vec::new();
        }

        let Some(candidate) = classify(&self.buffer, at_eof) else {
            return Vec::new();
        };

        let extract = match candidate {
            DecodeMode::DelimitedBlocks => extract_blocks,
            _ => extract_lines,
        };
        let (frames, consumed) = extract(&self.buffer, at_eof);
        if !frames.is_empty() {
            self.commit(candidate);
            self.buffer.drain(..consumed);
        }
        frames
    }

    fn drain(&mut self, extract: Extractor, flush: bool) -> Vec<Frame> {
        let (frames, consumed) = extract(&self.buffer, flush);
        self.buffer.drain(..consumed);
        frames
    }

    fn commit(&mut self, mode: DecodeMode) {
        tracing::trace!(?mode, "Decoder committed to wire format");
        self.mode = mode;
    }
}

/// Pure extraction over a buffer: the frames found and how many bytes they used.
type Extractor = fn(&str, bool) -> (Vec<Frame>, usize);

// =============================================================================
// Format detection
// =============================================================================

/// A single JSON object with no string `type` member.
fn bare_document(buffer: &str) -> Option<Frame> {
    let trimmed = buffer.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let object = value.as_object()?;
    if object.get("type").and_then(Value::as_str).is_some() {
        return None;
    }
    Some(Frame {
        event: None,
        payload: value,
        whole_response: true,
    })
}

/// True when the first line starts an object it does not finish.
///
/// Undecidable until that line is complete.
fn opens_document(buffer: &str, at_eof: bool) -> bool {
    let rest = buffer.trim_start();
    if !rest.starts_with('{') {
        return false;
    }
    let first = match rest.find('\n') {
        Some(end) => &rest[..end],
        None if at_eof => rest,
        None => return false,
    };
    serde_json::from_str::<Value>(first.trim()).is_err()
}

/// Decide between the two delimited forms from complete lines only.
///
/// A first line that is not an SSE field means newline-delimited JSON. An
/// SSE-looking stream is blank-line-delimited unless its first `data:` line
/// holds a complete JSON value and is followed directly by another `data:`
/// line, which is how newline-delimited streams with a `data:` prefix look.
fn classify(buffer: &str, at_eof: bool) -> Option<DecodeMode> {
    let complete = if at_eof {
        buffer
    } else {
        &buffer[..=buffer.rfind('\n')?]
    };

    let mut lines = complete
        .split_terminator('\n')
        .skip_while(|line| line.trim().is_empty());
    let first = lines.next()?;
    if sse_field(first).is_none() {
        return Some(DecodeMode::DelimitedLines);
    }

    let mut pending_data: Option<&str> = None;
    for line in std::iter::once(first).chain(lines) {
        let field = sse_field(line);
        if let Some(payload) = pending_data {
            return Some(match field {
                Some(("data", _)) if is_complete_payload(payload) => DecodeMode::DelimitedLines,
                _ => DecodeMode::DelimitedBlocks,
            });
        }
        match field {
            Some(("data", value)) => pending_data = Some(value),
            None if line.trim().is_empty() => return Some(DecodeMode::DelimitedBlocks),
            _ => {}
        }
    }

    at_eof.then_some(DecodeMode::DelimitedBlocks)
}

fn is_complete_payload(payload: &str) -> bool {
    let trimmed = payload.trim();
    trimmed == DONE_SENTINEL || serde_json::from_str::<Value>(trimmed).is_ok()
}

/// Split an SSE line into field name and value.
///
/// Comment lines (leading `:`) report the empty field name.
fn sse_field(line: &str) -> Option<(&str, &str)> {
    if let Some(comment) = line.strip_prefix(':') {
        return Some(("", comment));
    }
    let (name, value) = line.split_once(':')?;
    if !SSE_FIELDS.contains(&name) {
        return None;
    }
    Some((name, value.strip_prefix(' ').unwrap_or(value)))
}

// =============================================================================
// Extraction
// =============================================================================

fn extract_blocks(buffer: &str, flush: bool) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut consumed = 0;

    loop {
        let rest = &buffer[consumed..];
        if let Some(end) = rest.find("\n\n") {
            frames.extend(parse_block(&rest[..end]));
            consumed += end + 2;
        } else {
            if flush {
                frames.extend(parse_block(rest));
                consumed = buffer.len();
            }
            break;
        }
    }

    (frames, consumed)
}

fn parse_block(block: &str) -> Option<Frame> {
    let mut event = None;
    let mut data = String::new();
    let mut saw_data = false;

    for line in block.split('\n') {
        match sse_field(line) {
            Some(("event", name)) => event = Some(name.trim().to_string()),
            Some(("data", value)) => {
                data.push_str(value);
                saw_data = true;
            }
            Some(_) => {}
            None if line.trim().is_empty() => {}
            None => tracing::debug!(line, "Ignoring unrecognised line in block"),
        }
    }

    if !saw_data {
        return None;
    }
    parse_payload(event, &data)
}

fn extract_lines(buffer: &str, flush: bool) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut consumed = 0;

    while let Some(end) = buffer[consumed..].find('\n') {
        frames.extend(parse_line(&buffer[consumed..consumed + end]));
        consumed += end + 1;
    }
    if flush && consumed < buffer.len() {
        frames.extend(parse_line(&buffer[consumed..]));
        consumed = buffer.len();
    }

    (frames, consumed)
}

fn parse_line(line: &str) -> Option<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match sse_field(line) {
        Some(("data", value)) => parse_payload(None, value),
        Some(_) => None,
        None => parse_payload(None, line),
    }
}

fn parse_payload(event: Option<String>, data: &str) -> Option<Frame> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == DONE_SENTINEL {
        tracing::trace!("Suppressing end-of-stream sentinel");
        return None;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(payload @ Value::Object(_)) => Some(Frame::delimited(event, payload)),
        Ok(_) => {
            tracing::debug!(data, "Dropping non-object frame payload");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, data, "Dropping malformed frame payload");
            None
        }
    }
}
