use crate::error::CompletionError;
use crate::format::{LeadingNewlinePolicy, format_completion};
use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;

pub const DONE_SENTINEL: &str = "[DONE]";

pub type TextStream = Pin<Box<dyn Stream<Item = Result<Bytes, CompletionError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closed,
    Errored,
}

/// Turns reassembled SSE events into formatted text fragments.
///
/// Runtime-free: callers push events and receive fragments. The machine stays
/// `Open` until the `[DONE]` sentinel (or end of input via [`finish`]) closes
/// it, or a malformed event errors it. Terminal states ignore further input.
///
/// [`finish`]: CompletionStream::finish
#[derive(Debug)]
pub struct CompletionStream {
    policy: LeadingNewlinePolicy,
    emitted: usize,
    state: StreamState,
}

impl Default for CompletionStream {
    fn default() -> Self {
        Self::with_policy(LeadingNewlinePolicy::default())
    }
}

impl CompletionStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: LeadingNewlinePolicy) -> Self {
        Self {
            policy,
            emitted: 0,
            state: StreamState::Open,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Feeds one event, returning the fragment it produces. `None` means the
    /// event was the sentinel, was suppressed, or arrived after a terminal state.
    pub fn push_event(&mut self, event: &Event) -> Result<Option<Bytes>, CompletionError> {
        if self.state != StreamState::Open {
            return Ok(None);
        }
        if let Some(interval) = event.retry {
            tracing::debug!(?interval, "upstream sent reconnect interval");
        }
        if event.data.trim() == DONE_SENTINEL {
            self.state = StreamState::Closed;
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&event.data).map_err(|err| {
            self.state = StreamState::Errored;
            CompletionError::MalformedEvent(err.to_string())
        })?;
        let text = format_completion(&value);
        if self.policy.should_suppress(&text, self.emitted) {
            tracing::debug!(emitted = self.emitted, "suppressing leading newline fragment");
            return Ok(None);
        }
        self.emitted += 1;
        Ok(Some(Bytes::from(text)))
    }

    /// Marks natural end of input. A stream that ends without the sentinel is
    /// treated as complete.
    pub fn finish(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Closed;
        }
    }

    pub fn abort(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Errored;
        }
    }
}

/// Drives `machine` from an upstream byte stream, reassembling SSE events
/// across chunk boundaries.
///
/// The body is polled only when the consumer asks for the next fragment, and
/// dropping the returned stream drops the body, so a consumer that stops
/// reading also stops the upstream transfer.
pub fn text_stream<S, B, E>(body: S, machine: CompletionStream) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<CompletionError> + std::fmt::Display + Send + 'static,
{
    let events = Box::pin(body.eventsource());
    Box::pin(stream::unfold((events, machine), |(mut events, mut machine)| async move {
        loop {
            if machine.state() != StreamState::Open {
                return None;
            }
            let item = match events.next().await {
                Some(Ok(event)) => machine.push_event(&event).transpose(),
                Some(Err(EventStreamError::Transport(err))) => {
                    machine.abort();
                    Some(Err(err.into()))
                }
                Some(Err(err)) => {
                    machine.abort();
                    Some(Err(CompletionError::MalformedEvent(err.to_string())))
                }
                None => {
                    machine.finish();
                    return None;
                }
            };
            if let Some(item) = item {
                return Some((item, (events, machine)));
            }
        }
    }))
}

/// Concatenates every fragment of `stream`, stopping at the first error.
pub async fn collect_text(mut stream: TextStream) -> Result<String, CompletionError> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        let piece = std::str::from_utf8(&fragment)
            .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;
        text.push_str(piece);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use serde_json::json;
    use std::time::Duration;

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({"choices":[{"delta":{"content":content},"index":0}]})
        )
    }

    fn body_of(contents: &[&str]) -> String {
        let mut body: String = contents.iter().map(|c| delta(c)).collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn event(data: &str) -> Event {
        Event {
            event: "message".to_string(),
            data: data.to_string(),
            id: String::new(),
            retry: None,
        }
    }

    fn chunked(chunks: &[&[u8]]) -> TextStream {
        let items: Vec<Result<Bytes, CompletionError>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        text_stream(stream::iter(items), CompletionStream::new())
    }

    /// Drains an always-ready stream without a runtime.
    fn drain(stream: TextStream) -> (Vec<String>, Option<String>) {
        let items = stream
            .collect::<Vec<_>>()
            .now_or_never()
            .expect("in-memory stream is always ready");
        let mut texts = Vec::new();
        let mut error = None;
        for item in items {
            match item {
                Ok(b) => texts.push(String::from_utf8(b.to_vec()).expect("utf8 fragment")),
                Err(err) => error = Some(err.to_string()),
            }
        }
        (texts, error)
    }

    fn run_chunks(chunks: &[&[u8]]) -> (Vec<String>, Option<String>) {
        drain(chunked(chunks))
    }

    #[test]
    fn fragments_independent_of_chunk_boundaries() {
        let body = body_of(&["\n\n", "\n", "Hé", "llo", "\n", " wörld"]);
        let bytes = body.as_bytes();
        let (expected, error) = run_chunks(&[bytes]);
        assert!(error.is_none());
        // "\n\n" formats to an empty fragment, which counts as emitted.
        assert_eq!(expected, vec!["", "Hé", "llo", "\n", " wörld"]);

        for split in 1..bytes.len() {
            let got = run_chunks(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(got, (expected.clone(), None), "split at {split}");
        }
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(run_chunks(&singles).0, expected);
        let sevens: Vec<&[u8]> = bytes.chunks(7).collect();
        assert_eq!(run_chunks(&sevens).0, expected);
    }

    #[test]
    fn empty_chunks_do_not_change_crlf_reassembly() {
        let body = format!(
            "data: {}\r\n\r\ndata: {}\r\n\r\ndata: [DONE]\r\n\r\n",
            json!({"choices":[{"delta":{"content":"x"}}]}),
            json!({"choices":[{"delta":{"content":"y"}}]})
        );
        let bytes = body.as_bytes();
        let expected = run_chunks(&[bytes]);
        assert_eq!(expected, (vec!["x".to_string(), "y".to_string()], None));

        for (idx, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'\r') {
            let split = idx + 1;
            let got = run_chunks(&[&bytes[..split], b"", &bytes[split..]]);
            assert_eq!(got, expected, "empty chunk after byte {split}");
        }
    }

    #[test]
    fn carriage_return_split_by_empty_chunk_matches_unsplit() {
        let a = format!("data: {}\r", json!({"choices":[{"delta":{"content":"x"}}]}));
        let b = "\ndata: [DONE]\r\n\r\n";
        let unsplit = run_chunks(&[format!("{a}{b}").as_bytes()]);
        assert_eq!(run_chunks(&[a.as_bytes(), b.as_bytes()]), unsplit);
        assert_eq!(run_chunks(&[a.as_bytes(), b"", b.as_bytes()]), unsplit);
    }

    #[test]
    fn pure_newline_prefix_is_dropped_until_two_emitted() {
        let body = body_of(&["\n", "\n", "foo", "\n", "bar"]);
        let (got, _) = run_chunks(&[body.as_bytes()]);
        assert_eq!(got, vec!["foo", "bar"]);
    }

    #[test]
    fn sentinel_stops_processing_rest_of_chunk() {
        let body = format!("{}data: [DONE]\n\n{}", delta("kept"), delta("dropped"));
        let (got, error) = run_chunks(&[body.as_bytes()]);
        assert_eq!(got, vec!["kept"]);
        assert!(error.is_none());
    }

    #[test]
    fn terminal_states_ignore_later_events() {
        let mut machine = CompletionStream::new();
        assert_eq!(
            machine.push_event(&event(DONE_SENTINEL)).expect("sentinel"),
            None
        );
        assert_eq!(machine.state(), StreamState::Closed);
        let late = event(&json!({"choices":[{"delta":{"content":"late"}}]}).to_string());
        assert_eq!(machine.push_event(&late).expect("after close"), None);
        assert_eq!(machine.emitted(), 0);
    }

    #[test]
    fn malformed_event_errors_the_machine() {
        let mut machine = CompletionStream::new();
        let err = machine.push_event(&event("{not json")).expect_err("malformed");
        assert!(err.to_string().starts_with("malformed stream event"));
        assert_eq!(machine.state(), StreamState::Errored);
    }

    #[test]
    fn malformed_event_errors_without_emitting_later_fragments() {
        let body = format!("{}data: {{not json\n\n{}", delta("ok"), delta("after"));
        let (got, error) = run_chunks(&[body.as_bytes()]);
        assert_eq!(got, vec!["ok"]);
        assert!(error.expect("stream error").starts_with("malformed stream event"));
    }

    #[test]
    fn reconnect_directives_produce_nothing() {
        let body = format!("retry: 1000\n\n{}{}", delta("\n"), delta("x"));
        let (got, error) = run_chunks(&[body.as_bytes()]);
        assert_eq!(got, vec!["x"]);
        assert!(error.is_none());

        let mut machine = CompletionStream::new();
        let mut with_retry = event(&json!({"choices":[{"delta":{"content":"z"}}]}).to_string());
        with_retry.retry = Some(Duration::from_millis(1000));
        assert_eq!(
            machine.push_event(&with_retry).expect("push"),
            Some(Bytes::from("z"))
        );
        assert_eq!(machine.emitted(), 1);
    }

    #[test]
    fn empty_deltas_are_emitted_and_counted() {
        let body = format!(
            "data: {}\n\n{}{}",
            json!({"choices":[{"delta":{"role":"assistant"}}]}),
            delta("a"),
            delta("\n")
        );
        let (got, _) = run_chunks(&[body.as_bytes()]);
        assert_eq!(got, vec!["", "a", "\n"]);
    }

    #[test]
    fn finish_closes_open_stream() {
        let mut machine = CompletionStream::new();
        machine.finish();
        assert_eq!(machine.state(), StreamState::Closed);
        machine.abort();
        assert_eq!(machine.state(), StreamState::Closed);
    }

    #[test]
    fn text_stream_stops_pulling_after_sentinel() {
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![
            Ok(Bytes::from(delta("a"))),
            Ok(Bytes::from(format!("{}data: [DONE]\n\n", delta("b")))),
            Err(CompletionError::Transport("should never be polled".to_string())),
        ];
        let text = collect_text(text_stream(stream::iter(chunks), CompletionStream::new()))
            .now_or_never()
            .expect("ready")
            .expect("collect");
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn text_stream_ends_quietly_without_sentinel() {
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![Ok(Bytes::from(delta("only")))];
        let text = collect_text(text_stream(stream::iter(chunks), CompletionStream::new()))
            .await
            .expect("collect");
        assert_eq!(text, "only");
    }

    #[tokio::test]
    async fn text_stream_surfaces_errors_after_prior_fragments() {
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![
            Ok(Bytes::from(delta("first"))),
            Ok(Bytes::from("data: oops\n\n")),
            Ok(Bytes::from(delta("never"))),
        ];
        let mut out = text_stream(stream::iter(chunks), CompletionStream::new());
        assert_eq!(out.next().await.expect("item").expect("fragment"), "first");
        let err = out.next().await.expect("item").expect_err("malformed");
        assert!(matches!(err, CompletionError::MalformedEvent(_)));
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn transport_errors_end_the_stream() {
        let chunks: Vec<Result<Bytes, CompletionError>> = vec![
            Ok(Bytes::from(delta("x"))),
            Err(CompletionError::Transport("connection reset".to_string())),
        ];
        let mut out = text_stream(stream::iter(chunks), CompletionStream::new());
        assert_eq!(out.next().await.expect("item").expect("fragment"), "x");
        match out.next().await {
            Some(Err(CompletionError::Transport(msg))) => assert!(msg.contains("reset")),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(out.next().await.is_none());
    }
}
