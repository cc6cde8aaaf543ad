//! Server-sent event decoding for OpenAI-compatible streaming responses.

use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use super::traits::FragmentStream;
use crate::error::ProviderError;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded record of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data: ` line.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental line decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and drain every complete record.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }

        events
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();

    if payload.is_empty() {
        None
    } else if payload == DONE_SENTINEL {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChatResponse {
    #[serde(default)]
    pub(crate) choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub(crate) delta: StreamDelta,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub(crate) content: Option<String>,
}

/// Text carried by one `data:` payload.
///
/// `Ok(None)` for chunks without content; `Err` for payloads that are not
/// valid chunk JSON.
pub fn delta_content(payload: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: StreamChatResponse = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

type Body<B, E> = Pin<Box<dyn Stream<Item = Result<B, E>> + Send>>;

struct BodyState<B, E> {
    provider: String,
    body: Option<Body<B, E>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

impl<B, E> BodyState<B, E> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Done => {
                    // Nothing after the sentinel is parsed; release the connection.
                    self.body = None;
                    return;
                }
                SseEvent::Data(payload) => match delta_content(&payload) {
                    Ok(Some(content)) => self.pending.push_back(content),
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(
                            provider = %self.provider,
                            %error,
                            "Skipping malformed stream chunk"
                        );
                    }
                },
            }
        }
    }
}

/// Turn a streaming response body into a [`FragmentStream`].
///
/// The stream is pull-driven: the body is only read when the consumer asks
/// for the next fragment.
pub fn fragments_from_body<S, B, E>(provider: &str, body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = BodyState {
        provider: provider.to_string(),
        body: Some(Box::pin(body) as Body<B, E>),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }

            let body = state.body.as_mut()?;
            let next = body.next().await;
            match next {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(chunk.as_ref());
                    state.absorb(events);
                }
                Some(Err(error)) => {
                    state.body = None;
                    let error =
                        ProviderError::new(&state.provider, format!("stream read failed: {error}"));
                    return Some((Err(error), state));
                }
                None => {
                    state.body = None;
                    let events = state.decoder.finish();
                    state.absorb(events);
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn body(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<&'static [u8], std::io::Error>> + Send + 'static {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes())))
    }

    fn chunk(content: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":{content:?}}}}}]}}\n\n")
    }

    #[test]
    fn decoder_basic_data_line() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"a\":1}\n\n");
        assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".into())]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn decoder_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: ping\nid: 3\ndata: x\n");
        assert_eq!(events, vec![SseEvent::Data("x".into())]);
    }

    #[test]
    fn decoder_done_sentinel() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: [DONE]\n\n");
        assert_eq!(events, vec![SseEvent::Done]);
    }

    #[test]
    fn decoder_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\r\n\r\ndata: [DONE]\r\n");
        assert_eq!(events, vec![SseEvent::Data("one".into()), SseEvent::Done]);
    }

    #[test]
    fn decoder_requires_data_field_at_line_start() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"   data: [DONE]\n").is_empty());
        assert!(decoder.feed(b"\tdata: x\n").is_empty());
        assert_eq!(decoder.feed(b"data: x\n"), vec![SseEvent::Data("x".into())]);
    }

    #[test]
    fn decoder_keeps_incomplete_line_until_finish() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: par").is_empty());
        assert!(decoder.has_pending());
        assert!(decoder.feed(b"tial").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Data("partial".into())]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn decoder_joins_split_utf8() {
        let line = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&line[..split]).is_empty());
        assert_eq!(
            decoder.feed(&line[split..]),
            vec![SseEvent::Data("héllo".into())]
        );
    }

    #[test]
    fn delta_content_reads_first_choice() {
        let payload = r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        assert_eq!(delta_content(payload).unwrap(), Some("Hi".into()));
    }

    #[test]
    fn delta_content_empty_or_absent_is_none() {
        assert_eq!(
            delta_content(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap(),
            None
        );
        assert_eq!(
            delta_content(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap(),
            None
        );
        assert_eq!(delta_content(r#"{"choices":[]}"#).unwrap(), None);
    }

    #[test]
    fn delta_content_rejects_garbage() {
        assert!(delta_content("{not json").is_err());
    }

    #[tokio::test]
    async fn fragments_follow_emission_order() {
        let a = chunk("Hel");
        let b = chunk("lo");
        let raw: &'static str = Box::leak(format!("{a}{b}data: [DONE]\n\n").into_boxed_str());
        let fragments: Vec<String> = fragments_from_body("test", body(vec![raw]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn fragments_skip_malformed_chunk() {
        let good = Box::leak(chunk("ok").into_boxed_str());
        let tail = Box::leak(chunk("!").into_boxed_str());
        let fragments: Vec<String> =
            fragments_from_body("test", body(vec![good, "data: {broken\n\n", tail]))
                .try_collect()
                .await
                .unwrap();
        assert_eq!(fragments, vec!["ok", "!"]);
    }

    #[tokio::test]
    async fn fragments_stop_at_done_sentinel() {
        let first = Box::leak(chunk("kept").into_boxed_str());
        let after = Box::leak(chunk("dropped").into_boxed_str());
        let fragments: Vec<String> =
            fragments_from_body("test", body(vec![first, "data: [DONE]\n\n", after]))
                .try_collect()
                .await
                .unwrap();
        assert_eq!(fragments, vec!["kept"]);
    }

    #[tokio::test]
    async fn fragments_flush_trailing_record_without_newline() {
        let raw = r#"data: {"choices":[{"delta":{"content":"end"}}]}"#;
        let fragments: Vec<String> = fragments_from_body("test", body(vec![raw]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(fragments, vec!["end"]);
    }

    #[tokio::test]
    async fn read_failure_ends_stream_with_error() {
        let good = Box::leak(chunk("partial").into_boxed_str());
        let items: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(good.as_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"data: never\n"),
        ];
        let collected: Vec<Result<String, ProviderError>> =
            fragments_from_body("deepseek", stream::iter(items)).collect().await;

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].as_deref(), Ok("partial"));
        let err = collected[1].clone().unwrap_err();
        assert_eq!(err.provider, "deepseek");
        assert!(err.message.contains("reset"));
    }
}
