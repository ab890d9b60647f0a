use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::models::OpenRouterStreamChunk;
use crate::providers::types::StreamEvent;

/// Consume an SSE byte stream of `data: <json>` frames and forward text
/// deltas through `tx`, in arrival order, until the `[DONE]` sentinel.
/// Malformed frames are skipped without aborting the stream. Generic over
/// the byte source so the framing logic is testable without a live
/// response.
pub async fn parse_sse_stream<S, E>(mut stream: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut byte_buf: Vec<u8> = Vec::new();
    let mut buffer = String::new();

    while let Some(chunk_result) = stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error(format!("Stream error: {}", e)))
                    .await;
                return;
            }
        };

        byte_buf.extend_from_slice(&bytes);

        // Decode as much valid UTF-8 as possible from the byte buffer
        let decoded = match std::str::from_utf8(&byte_buf) {
            Ok(s) => {
                let decoded = s.to_string();
                byte_buf.clear();
                decoded
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to == 0 {
                    continue;
                }
                let decoded = std::str::from_utf8(&byte_buf[..valid_up_to])
                    .unwrap()
                    .to_string();
                byte_buf.drain(..valid_up_to);
                decoded
            }
        };

        // Normalize CRLF to LF
        let chunk = decoded.replace("\r\n", "\n");
        buffer.push_str(&chunk);

        // Process complete SSE events (delimited by double newline)
        while let Some(event_end) = buffer.find("\n\n") {
            let event_text = buffer[..event_end].to_string();
            buffer.drain(..event_end + 2);

            for line in event_text.lines() {
                let payload = if let Some(p) = line.strip_prefix("data: ") {
                    p
                } else if let Some(p) = line.strip_prefix("data:") {
                    p
                } else {
                    // Comment lines (": OPENROUTER PROCESSING") and anything
                    // else that is not a data frame.
                    continue;
                };

                if payload.trim() == "[DONE]" {
                    let _ = tx.send(StreamEvent::Done).await;
                    return;
                }

                match serde_json::from_str::<OpenRouterStreamChunk>(payload) {
                    Ok(chunk) => {
                        if let Some(content) = chunk
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.as_ref())
                        {
                            if !content.is_empty()
                                && tx.send(StreamEvent::Token(content.clone())).await.is_err()
                            {
                                return; // receiver dropped
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse SSE data frame: {}", e);
                    }
                }
            }
        }
    }

    // Stream ended without a [DONE] sentinel; finish the turn anyway.
    let _ = tx.send(StreamEvent::Done).await;
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn frame(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n",
            text
        )
    }

    async fn collect(chunks: Vec<&str>) -> Vec<StreamEvent> {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, Infallible>(Bytes::from(c.to_string()))),
        );
        let (tx, mut rx) = mpsc::channel(64);
        parse_sse_stream(stream, tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn tokens(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_scripted_frames_concatenate() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n",
            frame("Hel"),
            frame("lo"),
            frame(" world")
        );
        let events = collect(vec![&body]).await;
        assert_eq!(tokens(&events), "Hello world");
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let body = format!("{}data: [DONE]\n\n", frame("Hello"));
        let (a, b) = body.split_at(17);
        let events = collect(vec![a, b]).await;
        assert_eq!(tokens(&events), "Hello");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let body = format!(
            "{}data: {{not json}}\n\n{}data: [DONE]\n\n",
            frame("a"),
            frame("b")
        );
        let events = collect(vec![&body]).await;
        assert_eq!(tokens(&events), "ab");
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_done_emitted_without_sentinel() {
        let body = frame("tail");
        let events = collect(vec![&body]).await;
        assert_eq!(tokens(&events), "tail");
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_crlf_framing() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n";
        let events = collect(vec![body]).await;
        assert_eq!(tokens(&events), "ok");
    }

    #[tokio::test]
    async fn test_comment_lines_ignored() {
        let body = format!(": OPENROUTER PROCESSING\n\n{}data: [DONE]\n\n", frame("hi"));
        let events = collect(vec![&body]).await;
        assert_eq!(tokens(&events), "hi");
    }

    #[tokio::test]
    async fn test_multibyte_utf8_split_across_chunks() {
        // "é" is two bytes; split the byte stream between them.
        let body = format!("{}data: [DONE]\n\n", frame("café"));
        let bytes = body.into_bytes();
        let mid = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let halves = vec![
            Bytes::from(bytes[..mid].to_vec()),
            Bytes::from(bytes[mid..].to_vec()),
        ];
        let stream =
            futures::stream::iter(halves.into_iter().map(Ok::<_, Infallible>));
        let (tx, mut rx) = mpsc::channel(64);
        parse_sse_stream(stream, tx).await;

        let mut out = String::new();
        while let Ok(event) = rx.try_recv() {
            if let StreamEvent::Token(t) = event {
                out.push_str(&t);
            }
        }
        assert_eq!(out, "café");
    }
}
