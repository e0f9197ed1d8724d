//! Incremental `multipart/form-data` decoding
//!
//! [`MultipartParser`] is a push state machine: each [`write`](MultipartParser::write)
//! consumes one inbound chunk and appends [`MultipartEvent`]s, keeping its
//! position across calls so boundaries, header lines and part bodies may be
//! split anywhere. Part data is emitted as zero-copy slices of the chunk,
//! except for bytes that looked like the start of a boundary and turned out
//! not to be, which are replayed from a small lookbehind buffer.
//!
//! [`FormDataDecoder`] sits on top and turns header events into
//! [`PartMetadata`].

use crate::{ClientError, Result};
use bytes::Bytes;
use std::collections::HashMap;

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const HYPHEN: u8 = b'-';
const COLON: u8 = b':';
const SPACE: u8 = b' ';

/// Parser position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserState {
    /// Before the first boundary
    Preamble,
    /// At the start of a header line
    HeaderFieldStart,
    /// Inside a header name
    HeaderField,
    /// After the colon, skipping spaces
    HeaderValueStart,
    /// Inside a header value
    HeaderValue,
    /// Expecting the LF that ends a header line
    HeaderEnd,
    /// Expecting the LF of the blank line that ends the header block
    HeadersEnd,
    /// First byte of a part body
    PartDataStart,
    /// Inside a part body
    PartData,
    /// Closing boundary seen
    End,
    /// Malformed input; nothing more is consumed
    Failed,
}

/// Low-level parser events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MultipartEvent {
    /// A part begins
    PartBegin,
    /// Bytes of a header name (may arrive in several pieces)
    HeaderField(Bytes),
    /// Bytes of a header value (may arrive in several pieces)
    HeaderValue(Bytes),
    /// One header line is complete
    HeaderEnd,
    /// The header block of the current part is complete
    HeadersEnd,
    /// Raw bytes of the current part body
    PartData(Bytes),
    /// The current part ended
    PartEnd,
    /// The closing boundary was seen
    End,
}

#[derive(Clone, Copy, Debug, Default)]
struct Flags {
    part_boundary: bool,
    last_boundary: bool,
}

/// Boundary-driven multipart state machine
#[derive(Debug)]
pub struct MultipartParser {
    /// `\r\n--` followed by the boundary token
    boundary: Vec<u8>,
    lookbehind: Vec<u8>,
    state: ParserState,
    index: usize,
    flags: Flags,
    header_field_mark: Option<usize>,
    header_value_mark: Option<usize>,
    part_data_mark: Option<usize>,
    bytes_supplied: u64,
    bytes_consumed: u64,
}

impl MultipartParser {
    /// Create a parser for the given boundary token (without leading dashes)
    pub fn new(boundary: &str) -> Result<Self> {
        if boundary.is_empty() || boundary.len() > 200 {
            return Err(ClientError::Decode(format!(
                "invalid multipart boundary length {}",
                boundary.len()
            )));
        }
        let mut full = Vec::with_capacity(boundary.len() + 4);
        full.extend_from_slice(b"\r\n--");
        full.extend_from_slice(boundary.as_bytes());
        let lookbehind = vec![0; full.len() + 2];

        Ok(Self {
            boundary: full,
            lookbehind,
            state: ParserState::Preamble,
            // The first boundary may appear without its leading CRLF
            index: 2,
            flags: Flags::default(),
            header_field_mark: None,
            header_value_mark: None,
            part_data_mark: None,
            bytes_supplied: 0,
            bytes_consumed: 0,
        })
    }

    /// Current state
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Total bytes handed to [`write`](Self::write)
    pub fn bytes_supplied(&self) -> u64 {
        self.bytes_supplied
    }

    /// Total bytes accepted by [`write`](Self::write)
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    fn fail(&mut self, at: usize) -> usize {
        self.state = ParserState::Failed;
        at
    }

    /// Consume one chunk, appending events to `events`.
    ///
    /// Returns the number of bytes consumed. Anything less than
    /// `chunk.len()` means the input was malformed at that offset, and the
    /// parser refuses further input.
    pub fn write(&mut self, chunk: &Bytes, events: &mut Vec<MultipartEvent>) -> usize {
        let consumed = self.write_inner(chunk, events);
        self.bytes_supplied += chunk.len() as u64;
        self.bytes_consumed += consumed as u64;
        consumed
    }

    fn write_inner(&mut self, chunk: &Bytes, events: &mut Vec<MultipartEvent>) -> usize {
        let len = chunk.len();
        let boundary_len = self.boundary.len();
        let mut i = 0;

        while i < len {
            let c = chunk[i];
            match self.state {
                ParserState::Failed => return i,
                ParserState::Preamble => {
                    if self.index == boundary_len {
                        if c == HYPHEN {
                            self.flags.last_boundary = true;
                        } else if c != CR {
                            return self.fail(i);
                        }
                        self.index += 1;
                    } else if self.index == boundary_len + 1 {
                        if self.flags.last_boundary && c == HYPHEN {
                            events.push(MultipartEvent::End);
                            self.state = ParserState::End;
                            self.flags = Flags::default();
                        } else if !self.flags.last_boundary && c == LF {
                            self.index = 0;
                            events.push(MultipartEvent::PartBegin);
                            self.state = ParserState::HeaderFieldStart;
                        } else {
                            return self.fail(i);
                        }
                    } else {
                        if c != self.boundary[self.index] {
                            self.index = 0;
                        }
                        if c == self.boundary[self.index] {
                            self.index += 1;
                        }
                    }
                }
                ParserState::HeaderFieldStart => {
                    self.state = ParserState::HeaderField;
                    self.header_field_mark = Some(i);
                    self.index = 0;
                    continue;
                }
                ParserState::HeaderField => {
                    if c == CR {
                        self.header_field_mark = None;
                        self.state = ParserState::HeadersEnd;
                    } else {
                        self.index += 1;
                        if c == COLON {
                            if self.index == 1 {
                                // empty header name
                                return self.fail(i);
                            }
                            emit_mark(&mut self.header_field_mark, chunk, i, events, MultipartEvent::HeaderField);
                            self.state = ParserState::HeaderValueStart;
                        } else if !is_token_char(c) {
                            return self.fail(i);
                        }
                    }
                }
                ParserState::HeaderValueStart => {
                    if c != SPACE {
                        self.header_value_mark = Some(i);
                        self.state = ParserState::HeaderValue;
                        continue;
                    }
                }
                ParserState::HeaderValue => {
                    if c == CR {
                        emit_mark(&mut self.header_value_mark, chunk, i, events, MultipartEvent::HeaderValue);
                        events.push(MultipartEvent::HeaderEnd);
                        self.state = ParserState::HeaderEnd;
                    }
                }
                ParserState::HeaderEnd => {
                    if c != LF {
                        return self.fail(i);
                    }
                    self.state = ParserState::HeaderFieldStart;
                }
                ParserState::HeadersEnd => {
                    if c != LF {
                        return self.fail(i);
                    }
                    events.push(MultipartEvent::HeadersEnd);
                    self.state = ParserState::PartDataStart;
                }
                ParserState::PartDataStart => {
                    self.state = ParserState::PartData;
                    self.part_data_mark = Some(i);
                    continue;
                }
                ParserState::PartData => {
                    let prev_index = self.index;

                    if self.index < boundary_len {
                        if self.boundary[self.index] == c {
                            if self.index == 0 {
                                emit_mark(&mut self.part_data_mark, chunk, i, events, MultipartEvent::PartData);
                            }
                            self.index += 1;
                        } else {
                            self.index = 0;
                        }
                    } else if self.index == boundary_len {
                        self.index += 1;
                        if c == CR {
                            self.flags.part_boundary = true;
                        } else if c == HYPHEN {
                            self.flags.last_boundary = true;
                        } else {
                            self.index = 0;
                        }
                    } else if self.index == boundary_len + 1 {
                        if self.flags.part_boundary && c == LF {
                            self.index = 0;
                            self.flags = Flags::default();
                            events.push(MultipartEvent::PartEnd);
                            events.push(MultipartEvent::PartBegin);
                            self.state = ParserState::HeaderFieldStart;
                            i += 1;
                            continue;
                        } else if self.flags.last_boundary && c == HYPHEN {
                            self.index = 0;
                            self.flags = Flags::default();
                            events.push(MultipartEvent::PartEnd);
                            events.push(MultipartEvent::End);
                            self.state = ParserState::End;
                            i += 1;
                            continue;
                        } else {
                            self.index = 0;
                        }
                    }

                    if self.index > 0 {
                        self.lookbehind[self.index - 1] = c;
                    } else if prev_index > 0 {
                        // A partial boundary match failed: its bytes were body data
                        self.flags = Flags::default();
                        events.push(MultipartEvent::PartData(Bytes::copy_from_slice(
                            &self.lookbehind[..prev_index],
                        )));
                        self.part_data_mark = Some(i);
                        // Reconsider the current byte as body data or a new match
                        continue;
                    }
                }
                ParserState::End => {}
            }
            i += 1;
        }

        flush_mark(&mut self.header_field_mark, chunk, events, MultipartEvent::HeaderField);
        flush_mark(&mut self.header_value_mark, chunk, events, MultipartEvent::HeaderValue);
        flush_mark(&mut self.part_data_mark, chunk, events, MultipartEvent::PartData);

        len
    }

    /// Signal the end of the inbound stream.
    ///
    /// A body whose last part is terminated by a boundary without the final
    /// `--` is accepted; anything else short of [`ParserState::End`] is an
    /// error.
    pub fn finish(&mut self, events: &mut Vec<MultipartEvent>) -> Result<()> {
        if self.bytes_consumed != self.bytes_supplied {
            return Err(ClientError::Decode(format!(
                "multipart decoder consumed {} of {} bytes",
                self.bytes_consumed, self.bytes_supplied
            )));
        }
        match self.state {
            ParserState::End => Ok(()),
            // The last part was already closed by the boundary that led here
            ParserState::HeaderFieldStart if self.index == 0 => {
                events.push(MultipartEvent::End);
                self.state = ParserState::End;
                Ok(())
            }
            ParserState::PartData if self.index == self.boundary.len() => {
                events.push(MultipartEvent::PartEnd);
                events.push(MultipartEvent::End);
                self.state = ParserState::End;
                Ok(())
            }
            state => Err(ClientError::Decode(format!(
                "stream ended before the closing boundary (state {:?})",
                state
            ))),
        }
    }
}

/// RFC 7230 `tchar`, the bytes allowed in a header name
fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
}

/// Emit the marked range up to `end` and clear the mark
fn emit_mark(
    mark: &mut Option<usize>,
    chunk: &Bytes,
    end: usize,
    events: &mut Vec<MultipartEvent>,
    event: fn(Bytes) -> MultipartEvent,
) {
    if let Some(start) = mark.take() {
        if start < end {
            events.push(event(chunk.slice(start..end)));
        }
    }
}

/// Emit the marked range to the end of the chunk; the mark carries over to
/// the start of the next chunk
fn flush_mark(
    mark: &mut Option<usize>,
    chunk: &Bytes,
    events: &mut Vec<MultipartEvent>,
    event: fn(Bytes) -> MultipartEvent,
) {
    if let Some(start) = *mark {
        if start < chunk.len() {
            events.push(event(chunk.slice(start..)));
        }
        *mark = Some(0);
    }
}

/// Metadata of the part currently being decoded
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartMetadata {
    /// Form field name from `Content-Disposition`
    pub name: Option<String>,
    /// Unescaped client file name from `Content-Disposition`
    pub filename: Option<String>,
    /// `Content-Type` of the part
    pub mime: Option<String>,
    /// All part headers, names lower-cased
    pub headers: HashMap<String, String>,
}

/// Form-level events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormEvent {
    /// A part begins; any earlier metadata is stale
    PartBegin,
    /// All headers of the current part were read
    Headers(PartMetadata),
    /// Raw bytes of the current part body
    Data(Bytes),
    /// The current part ended
    PartEnd,
    /// The body ended
    End,
}

/// Decodes `multipart/form-data` into part metadata and raw part data
#[derive(Debug)]
pub struct FormDataDecoder {
    parser: MultipartParser,
    field: Vec<u8>,
    value: Vec<u8>,
    part: PartMetadata,
    scratch: Vec<MultipartEvent>,
}

impl FormDataDecoder {
    /// Create a decoder for the given boundary token
    pub fn new(boundary: &str) -> Result<Self> {
        Ok(Self {
            parser: MultipartParser::new(boundary)?,
            field: Vec::new(),
            value: Vec::new(),
            part: PartMetadata::default(),
            scratch: Vec::new(),
        })
    }

    /// Underlying parser
    pub fn parser(&self) -> &MultipartParser {
        &self.parser
    }

    /// Consume one chunk; returns the number of bytes consumed
    pub fn write(&mut self, chunk: &Bytes, out: &mut Vec<FormEvent>) -> usize {
        let mut scratch = std::mem::take(&mut self.scratch);
        let consumed = self.parser.write(chunk, &mut scratch);
        for event in scratch.drain(..) {
            self.translate(event, out);
        }
        self.scratch = scratch;
        consumed
    }

    /// Signal the end of the inbound stream
    pub fn finish(&mut self, out: &mut Vec<FormEvent>) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = self.parser.finish(&mut scratch);
        for event in scratch.drain(..) {
            self.translate(event, out);
        }
        self.scratch = scratch;
        result
    }

    fn translate(&mut self, event: MultipartEvent, out: &mut Vec<FormEvent>) {
        match event {
            MultipartEvent::PartBegin => {
                self.part = PartMetadata::default();
                self.field.clear();
                self.value.clear();
                out.push(FormEvent::PartBegin);
            }
            MultipartEvent::HeaderField(b) => self.field.extend_from_slice(&b),
            MultipartEvent::HeaderValue(b) => self.value.extend_from_slice(&b),
            MultipartEvent::HeaderEnd => {
                let field = String::from_utf8_lossy(&self.field).to_lowercase();
                let value = String::from_utf8_lossy(&self.value).into_owned();

                if field == "content-disposition" {
                    if let Some(name) = disposition_param(&value, "name") {
                        self.part.name = Some(name);
                    }
                    self.part.filename = disposition_filename(&value);
                } else if field == "content-type" {
                    self.part.mime = Some(value.clone());
                }
                self.part.headers.insert(field, value);

                self.field.clear();
                self.value.clear();
            }
            MultipartEvent::HeadersEnd => out.push(FormEvent::Headers(self.part.clone())),
            MultipartEvent::PartData(b) => out.push(FormEvent::Data(b)),
            MultipartEvent::PartEnd => out.push(FormEvent::PartEnd),
            MultipartEvent::End => out.push(FormEvent::End),
        }
    }
}

/// Value of a quoted `key="..."` parameter in a header value
fn disposition_param(value: &str, key: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let needle = format!("{}=\"", key);
    let mut from = 0;
    while let Some(pos) = lower[from..].find(&needle) {
        let start = from + pos;
        let at_param_start = start == 0
            || matches!(lower.as_bytes()[start - 1], b';' | b' ' | b'\t');
        let value_start = start + needle.len();
        if at_param_start {
            let end = value[value_start..].find('"')? + value_start;
            return (end > value_start).then(|| value[value_start..end].to_string());
        }
        from = value_start;
    }
    None
}

/// Client file name from a `Content-Disposition` value.
///
/// The quoted value runs to the first quote followed by `; ` or the end of
/// the header, so a raw quote inside the name survives.
pub fn disposition_filename(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let start = lower.find("filename=\"")? + "filename=\"".len();
    let rest = &value[start..];

    let mut end = None;
    for (pos, _) in rest.match_indices('"') {
        let after = &rest[pos + 1..];
        if after.is_empty() || after.starts_with("; ") {
            end = Some(pos);
            break;
        }
    }
    Some(unescape_filename(&rest[..end?]))
}

/// Strip any client path prefix, then undo the `%22` and `&#NNNN;` escapes
/// browsers apply to file names.
pub fn unescape_filename(raw: &str) -> String {
    let base = match raw.rfind(['\\', '/']) {
        Some(pos) => &raw[pos + 1..],
        None => raw,
    };
    let quoted = base.replace("%22", "\"");
    decode_numeric_references(&quoted)
}

fn decode_numeric_references(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find("&#") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 2..];
        let digits = tail.bytes().take_while(|b| b.is_ascii_digit()).count();
        let decoded = (digits > 0 && tail[digits..].starts_with(';'))
            .then(|| tail[..digits].parse::<u32>().ok().and_then(char::from_u32))
            .flatten();
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[digits + 1..];
            }
            None => {
                out.push_str("&#");
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Boundary token from a `multipart/form-data` content type, if it is one.
///
/// Accepts both `boundary=token` and `boundary="token"`.
pub fn boundary_from_content_type(content_type: &str) -> Result<Option<String>> {
    let mut params = content_type.split(';');
    let essence = params.next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case("multipart/form-data") {
        return Ok(None);
    }
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            if !value.is_empty() {
                return Ok(Some(value.to_string()));
            }
        }
    }
    Err(ClientError::Decode(
        "multipart/form-data without boundary".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDARY: &str = "----WebKitFormBoundary7MA4YWxkTrZu0gW";

    fn form_body(payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"C:\\Users\\me\\photo.jpg\"\r\n");
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    /// Payload full of near-boundary sequences and binary noise
    fn tricky_payload() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"\r\n--");
        payload.extend_from_slice(&BOUNDARY.as_bytes()[..10]);
        payload.extend_from_slice(b"\r\r\n\n--");
        payload.extend_from_slice(BOUNDARY.as_bytes());
        payload.extend_from_slice(b"x\r\n");
        payload.extend((0..=255u8).cycle().take(700));
        payload.extend_from_slice(b"\r\n-");
        payload
    }

    fn decode_chunks(chunks: &[&[u8]]) -> (Vec<FormEvent>, Result<()>) {
        let mut decoder = FormDataDecoder::new(BOUNDARY).unwrap();
        let mut events = Vec::new();
        for chunk in chunks {
            let chunk = Bytes::copy_from_slice(chunk);
            let consumed = decoder.write(&chunk, &mut events);
            assert_eq!(consumed, chunk.len());
        }
        let result = decoder.finish(&mut events);
        (events, result)
    }

    fn collect_data(events: &[FormEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                FormEvent::Data(b) => Some(b.as_ref()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    fn split_at_sizes(body: &[u8], size: usize) -> Vec<&[u8]> {
        body.chunks(size).collect()
    }

    #[test]
    fn test_single_chunk() {
        let payload = b"hello world".to_vec();
        let body = form_body(&payload);
        let (events, result) = decode_chunks(&[&body]);

        result.unwrap();
        assert_eq!(collect_data(&events), payload);
        assert_eq!(events.first(), Some(&FormEvent::PartBegin));
        assert_eq!(events.last(), Some(&FormEvent::End));

        let part = events
            .iter()
            .find_map(|e| match e {
                FormEvent::Headers(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(part.name.as_deref(), Some("file"));
        assert_eq!(part.filename.as_deref(), Some("photo.jpg"));
        assert_eq!(part.mime.as_deref(), Some("image/jpeg"));
        assert!(part.headers.contains_key("content-disposition"));
    }

    #[test]
    fn test_every_chunk_size_preserves_payload() {
        let payload = tricky_payload();
        let body = form_body(&payload);
        for size in 1..=body.len() {
            let (events, result) = decode_chunks(&split_at_sizes(&body, size));
            result.unwrap();
            assert_eq!(collect_data(&events), payload, "chunk size {}", size);
        }
    }

    #[test]
    fn test_every_two_way_split() {
        let payload = tricky_payload();
        let body = form_body(&payload);
        for at in 0..=body.len() {
            let (head, tail) = body.split_at(at);
            let (events, result) = decode_chunks(&[head, tail]);
            result.unwrap();
            assert_eq!(collect_data(&events), payload, "split at {}", at);
        }
    }

    #[test]
    fn test_multiple_parts_reset_metadata() {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"title\"\r\n\r\n");
        body.extend_from_slice(b"My photo");
        body.extend_from_slice(format!("\r\n--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n");
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(b"\x00\x01\x02");
        body.extend_from_slice(format!("\r\n--{}--", BOUNDARY).as_bytes());

        let (events, result) = decode_chunks(&split_at_sizes(&body, 7));
        result.unwrap();

        let parts: Vec<PartMetadata> = events
            .iter()
            .filter_map(|e| match e {
                FormEvent::Headers(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name.as_deref(), Some("title"));
        assert_eq!(parts[0].filename, None);
        assert_eq!(parts[0].mime, None);
        assert_eq!(parts[1].filename.as_deref(), Some("a.bin"));
        assert_eq!(collect_data(&events), b"My photo\x00\x01\x02");
        assert_eq!(
            events.iter().filter(|e| **e == FormEvent::PartEnd).count(),
            2
        );
    }

    #[test]
    fn test_preamble_is_skipped() {
        let mut body = b"This is a preamble.\r\n".to_vec();
        body.extend_from_slice(&form_body(b"data"));
        let (events, result) = decode_chunks(&[&body]);
        result.unwrap();
        assert_eq!(collect_data(&events), b"data");
    }

    #[test]
    fn test_malformed_header_reports_short_consume() {
        let mut parser = MultipartParser::new("xyz").unwrap();
        let mut events = Vec::new();
        let chunk = Bytes::from_static(b"--xyz\r\nBad Header!: value\r\n\r\n");
        let consumed = parser.write(&chunk, &mut events);

        assert!(consumed < chunk.len());
        assert_eq!(parser.state(), ParserState::Failed);
        assert!(parser.finish(&mut events).is_err());
    }

    #[test]
    fn test_truncated_body_fails_finish() {
        let body = form_body(b"payload");
        let (_, result) = decode_chunks(&[&body[..body.len() / 2]]);
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_missing_final_dashes_accepted() {
        let mut body = Vec::new();
        body.extend_from_slice(b"--xyz\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n");
        body.extend_from_slice(b"value\r\n--xyz");
        let mut parser = MultipartParser::new("xyz").unwrap();
        let mut events = Vec::new();
        assert_eq!(parser.write(&Bytes::from(body.clone()), &mut events), body.len());
        parser.finish(&mut events).unwrap();
        assert_eq!(events.last(), Some(&MultipartEvent::End));
    }

    #[test]
    fn test_trailing_boundary_without_dashes_closes_once() {
        let body = Bytes::from_static(
            b"--xyz\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue\r\n--xyz\r\n",
        );
        let mut parser = MultipartParser::new("xyz").unwrap();
        let mut events = Vec::new();
        assert_eq!(parser.write(&body, &mut events), body.len());
        parser.finish(&mut events).unwrap();

        assert_eq!(events.iter().filter(|e| **e == MultipartEvent::PartEnd).count(), 1);
        assert_eq!(events.last(), Some(&MultipartEvent::End));
        assert_eq!(parser.state(), ParserState::End);
    }

    #[test]
    fn test_header_names_accept_token_characters() {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n");
        body.extend_from_slice(b"Content-MD5: Q2hlY2sgSW50ZWdyaXR5IQ==\r\n");
        body.extend_from_slice(b"X-Part-1: first\r\n");
        body.extend_from_slice(b"X_Odd.Name~2: ok\r\n\r\n");
        body.extend_from_slice(b"contents");
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let (events, result) = decode_chunks(&split_at_sizes(&body, 5));
        result.unwrap();
        assert_eq!(collect_data(&events), b"contents");

        let part = events
            .iter()
            .find_map(|e| match e {
                FormEvent::Headers(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(part.headers.get("content-md5").map(String::as_str), Some("Q2hlY2sgSW50ZWdyaXR5IQ=="));
        assert_eq!(part.headers.get("x-part-1").map(String::as_str), Some("first"));
        assert_eq!(part.headers.get("x_odd.name~2").map(String::as_str), Some("ok"));
    }

    #[test]
    fn test_filename_unescaping() {
        assert_eq!(
            disposition_filename("form-data; name=\"f\"; filename=\"a%22b&#8217;c\"").as_deref(),
            Some("a\"b\u{2019}c")
        );
        assert_eq!(unescape_filename("C:\\fakepath\\report.pdf"), "report.pdf");
        assert_eq!(unescape_filename("dir/sub/x.txt"), "x.txt");
        assert_eq!(unescape_filename("a&#bad;b&#65;"), "a&#bad;bA");
    }

    #[test]
    fn test_filename_with_raw_quote() {
        assert_eq!(
            disposition_filename("form-data; filename=\"say \"hi\".txt\"; name=\"f\"").as_deref(),
            Some("say \"hi\".txt")
        );
        assert_eq!(disposition_filename("form-data; name=\"f\""), None);
    }

    #[test]
    fn test_name_ignores_filename_param() {
        assert_eq!(
            disposition_param("form-data; filename=\"x.txt\"; name=\"upload\"", "name").as_deref(),
            Some("upload")
        );
    }

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=abc123").unwrap().as_deref(),
            Some("abc123")
        );
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"quoted token\"")
                .unwrap()
                .as_deref(),
            Some("quoted token")
        );
        assert_eq!(boundary_from_content_type("application/octet-stream").unwrap(), None);
        assert!(boundary_from_content_type("multipart/form-data").is_err());
    }

    proptest! {
        #[test]
        fn prop_arbitrary_chunking_preserves_payload(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..16),
        ) {
            let body = form_body(&payload);
            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(body.len() + 1)).collect();
            points.push(0);
            points.push(body.len());
            points.sort_unstable();
            points.dedup();
            let chunks: Vec<&[u8]> = points.windows(2).map(|w| &body[w[0]..w[1]]).collect();

            let (events, result) = decode_chunks(&chunks);
            prop_assert!(result.is_ok());
            prop_assert_eq!(collect_data(&events), payload);
        }
    }
}
