//! Incremental SSE stream decoding for completion responses.
//!
//! The response body arrives as a byte stream in arbitrarily sized chunks.
//! Complete lines are split off at newlines, `data:` payloads are parsed, and
//! every content delta is forwarded in arrival order over an event channel.
//! Decoding is a single forward pass over one connection; it is not
//! restartable.

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::constants::{REPETITION_PENALTY, STOP_SEQUENCE, TEMPERATURE, TOP_K, TOP_P};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Handles one `data:` payload. Returns true when decoding must stop: the
/// `[DONE]` sentinel, or a payload that is not valid JSON. A parsed record
/// with no `choices[0].delta.content` path is a no-op, not an error.
fn handle_data_payload(
    payload: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send((StreamMessage::End, stream_id));
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.first() {
                if let Some(content) = &choice.delta.content {
                    let _ = tx.send((StreamMessage::Chunk(content.clone()), stream_id));
                }
            }
            false
        }
        Err(e) => {
            if payload.trim().is_empty() {
                return false;
            }

            let _ = tx.send((
                StreamMessage::Error(format!("malformed stream payload: {e}")),
                stream_id,
            ));
            let _ = tx.send((StreamMessage::End, stream_id));
            true
        }
    }
}

fn process_sse_line(
    line: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx, stream_id))
        .unwrap_or(false)
}

/// Folds one raw byte chunk into the line buffer and processes every complete
/// line it yields. Returns true when the stream has terminated and no further
/// chunks may be read.
fn decode_chunk(
    buffer: &mut Vec<u8>,
    chunk: &[u8],
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    buffer.extend_from_slice(chunk);

    while let Some(newline_pos) = memchr(b'\n', buffer) {
        let should_end = match std::str::from_utf8(&buffer[..newline_pos]) {
            Ok(line) => process_sse_line(line.trim(), tx, stream_id),
            Err(e) => {
                tracing::warn!("skipping non-UTF-8 stream line: {e}");
                false
            }
        };
        buffer.drain(..=newline_pos);
        if should_end {
            return true;
        }
    }

    false
}

/// Collapses a non-success response body to a single diagnostic line,
/// preferring the provider's own error message when the body is JSON.
fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary = value
            .pointer("/error/message")
            .or_else(|| value.pointer("/message"))
            .and_then(|v| v.as_str());
        if let Some(summary) = summary {
            return summary.split_whitespace().collect::<Vec<_>>().join(" ");
        }
    }

    trimmed.to_string()
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

/// Issues completion requests and decodes their streamed responses on a
/// spawned task, delivering events tagged with the stream id. Every exit path
/// except cancellation emits `End`, so a consumer waiting on the channel is
/// never left with a dangling exchange.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                model,
                api_messages,
                cancel_token,
                stream_id,
            } = params;

            let request = ChatRequest {
                model,
                messages: api_messages,
                temperature: TEMPERATURE,
                top_p: TOP_P,
                top_k: TOP_K,
                repetition_penalty: REPETITION_PENALTY,
                stop: vec![STOP_SEQUENCE.to_string()],
                stream: true,
            };

            tokio::select! {
                _ = async {
                    let chat_url = construct_api_url(&base_url, "chat/completions");
                    match client
                        .post(chat_url)
                        .header("Content-Type", "application/json")
                        .header("Authorization", format!("Bearer {api_key}"))
                        .json(&request)
                        .send()
                        .await
                    {
                        Ok(response) => {
                            if !response.status().is_success() {
                                let status = response.status().as_u16();
                                let body = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| "<no body>".to_string());
                                let _ = tx_clone.send((
                                    StreamMessage::Error(format!(
                                        "request failed with status {status}: {}",
                                        summarize_error_body(&body)
                                    )),
                                    stream_id,
                                ));
                                let _ = tx_clone.send((StreamMessage::End, stream_id));
                                return;
                            }

                            let mut stream = response.bytes_stream();
                            let mut buffer: Vec<u8> = Vec::new();

                            while let Some(chunk) = stream.next().await {
                                if cancel_token.is_cancelled() {
                                    return;
                                }

                                match chunk {
                                    Ok(chunk_bytes) => {
                                        if decode_chunk(
                                            &mut buffer,
                                            &chunk_bytes,
                                            &tx_clone,
                                            stream_id,
                                        ) {
                                            return;
                                        }
                                    }
                                    Err(e) => {
                                        let _ = tx_clone.send((
                                            StreamMessage::Error(format!(
                                                "response stream unreadable: {e}"
                                            )),
                                            stream_id,
                                        ));
                                        let _ = tx_clone.send((StreamMessage::End, stream_id));
                                        return;
                                    }
                                }
                            }

                            // Stream ended naturally (connection closed).
                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                        }
                        Err(e) => {
                            let _ = tx_clone.send((
                                StreamMessage::Error(format!("request failed: {e}")),
                                stream_id,
                            ));
                            let _ = tx_clone.send((StreamMessage::End, stream_id));
                        }
                    }
                } => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, message: StreamMessage, stream_id: u64) {
        let _ = self.tx.send((message, stream_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>) -> Vec<StreamMessage> {
        let mut received = Vec::new();
        while let Ok((message, _)) = rx.try_recv() {
            received.push(message);
        }
        received
    }

    fn chunks_of(received: &[StreamMessage]) -> Vec<&str> {
        received
            .iter()
            .filter_map(|m| match m {
                StreamMessage::Chunk(content) => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let (service, mut rx) = ChatStreamService::new();
        let variants = [
            (
                r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
                "Hello",
                "data: [DONE]",
            ),
            (
                r#"data:{"choices":[{"delta":{"content":"World"}}]}"#,
                "World",
                "data:[DONE]",
            ),
        ];

        for (index, (chunk_line, expected_chunk, done_line)) in variants.iter().enumerate() {
            let stream_id = (index + 1) as u64;

            assert!(!process_sse_line(chunk_line, &service.tx, stream_id));
            let (message, received_id) = rx.try_recv().expect("expected chunk message");
            assert_eq!(received_id, stream_id);
            match message {
                StreamMessage::Chunk(content) => assert_eq!(content, *expected_chunk),
                other => panic!("expected chunk message, got {:?}", other),
            }

            assert!(process_sse_line(done_line, &service.tx, stream_id));
            let (message, received_id) = rx.try_recv().expect("expected end message");
            assert_eq!(received_id, stream_id);
            assert!(matches!(message, StreamMessage::End));
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn deltas_are_reassembled_across_arbitrary_chunk_boundaries() {
        let (service, mut rx) = ChatStreamService::new();
        let mut buffer = Vec::new();

        // One SSE record split mid-JSON, followed by a second record and the
        // sentinel sharing a chunk.
        let parts: [&[u8]; 3] = [
            br#"data: {"choices":[{"del"#,
            br#"ta":{"content":"He"}}]}"#,
            b"\ndata: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\ndata: [DONE]\n",
        ];

        let mut ended = false;
        for part in parts {
            ended = decode_chunk(&mut buffer, part, &service.tx, 1);
            if ended {
                break;
            }
        }
        assert!(ended);

        let received = drain(&mut rx);
        assert_eq!(chunks_of(&received), ["He", "llo"]);
        assert!(matches!(received.last(), Some(StreamMessage::End)));
    }

    #[test]
    fn done_sentinel_stops_processing_of_later_lines_in_the_same_chunk() {
        let (service, mut rx) = ChatStreamService::new();
        let mut buffer = Vec::new();

        let chunk = b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n";
        assert!(decode_chunk(&mut buffer, chunk, &service.tx, 7));

        let received = drain(&mut rx);
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], StreamMessage::End));
    }

    #[test]
    fn record_without_delta_path_is_a_noop_and_decoding_continues() {
        let (service, mut rx) = ChatStreamService::new();
        let mut buffer = Vec::new();

        let chunk = b"data: {}\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n";
        assert!(!decode_chunk(&mut buffer, chunk, &service.tx, 3));

        let received = drain(&mut rx);
        assert_eq!(chunks_of(&received), ["ok"]);
        assert_eq!(received.len(), 1);
    }

    #[test]
    fn missing_path_segments_yield_no_delta() {
        let (service, mut rx) = ChatStreamService::new();

        for line in [
            r#"data: {"choices":[]}"#,
            r#"data: {"choices":[{}]}"#,
            r#"data: {"choices":[{"delta":{}}]}"#,
            r#"data: {"choices":[{"delta":{"content":null}}]}"#,
        ] {
            assert!(!process_sse_line(line, &service.tx, 1));
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_payload_aborts_the_stream() {
        let (service, mut rx) = ChatStreamService::new();
        let mut buffer = Vec::new();

        let chunk = b"data: not json at all\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
        assert!(decode_chunk(&mut buffer, chunk, &service.tx, 5));

        let received = drain(&mut rx);
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], StreamMessage::Error(_)));
        assert!(matches!(received[1], StreamMessage::End));
    }

    #[test]
    fn blank_lines_and_unprefixed_lines_are_discarded() {
        let (service, mut rx) = ChatStreamService::new();
        let mut buffer = Vec::new();

        let chunk = b"\n  \nevent: ping\ndata: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n";
        assert!(!decode_chunk(&mut buffer, chunk, &service.tx, 2));

        let received = drain(&mut rx);
        assert_eq!(chunks_of(&received), ["hi"]);
    }

    #[test]
    fn non_utf8_line_is_skipped_without_ending_the_stream() {
        let (service, mut rx) = ChatStreamService::new();
        let mut buffer = Vec::new();

        let mut chunk: Vec<u8> = vec![0xff, 0xfe, b'\n'];
        chunk.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n");
        assert!(!decode_chunk(&mut buffer, &chunk, &service.tx, 4));

        let received = drain(&mut rx);
        assert_eq!(chunks_of(&received), ["ok"]);
    }

    #[test]
    fn summarize_error_body_prefers_provider_message() {
        let raw = r#"{"error":{"message":"model   overloaded","type":"invalid_request_error"}}"#;
        assert_eq!(summarize_error_body(raw), "model overloaded");

        assert_eq!(summarize_error_body("  plain failure  "), "plain failure");
        assert_eq!(summarize_error_body("   "), "<empty body>");
    }
}
