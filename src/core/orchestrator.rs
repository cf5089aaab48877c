//! Drives a completion exchange from user submit to stream end.
//!
//! The orchestrator owns the transcript, the idle/awaiting-response status,
//! and the id of the single open assistant message. `begin_send` opens an
//! exchange and produces the outbound payload; every event the stream task
//! emits is folded back in through `handle_stream_message`, which is the only
//! place transcript mutation happens once a stream is running.

use tokio_util::sync::CancellationToken;

use crate::api::ChatMessage;
use crate::core::chat_stream::StreamMessage;
use crate::core::history::HistoryStore;
use crate::core::transcript::Transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    AwaitingResponse,
}

/// An opened exchange, ready to hand to the stream task.
pub struct PendingExchange {
    pub api_messages: Vec<ChatMessage>,
    pub stream_id: u64,
    pub cancel_token: CancellationToken,
}

pub struct Orchestrator {
    transcript: Transcript,
    history: HistoryStore,
    status: SessionStatus,
    open_message_id: Option<u64>,
    current_stream_id: u64,
    cancel_token: Option<CancellationToken>,
}

impl Orchestrator {
    pub fn new(history: HistoryStore) -> Self {
        let transcript = history.load();
        Self {
            transcript,
            history,
            status: SessionStatus::Idle,
            open_message_id: None,
            current_stream_id: 0,
            cancel_token: None,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.status == SessionStatus::AwaitingResponse
    }

    /// Opens a new exchange: appends the user turn, flips the status, and
    /// opens an empty assistant message to receive deltas. Returns the
    /// outbound payload, which includes the user turn just appended and
    /// excludes only the empty placeholder. Blank input or an exchange
    /// already in flight yields None and leaves the transcript untouched.
    pub fn begin_send(&mut self, user_text: &str) -> Option<PendingExchange> {
        let trimmed = user_text.trim();
        if trimmed.is_empty() || self.status == SessionStatus::AwaitingResponse {
            return None;
        }

        self.transcript.push_user(trimmed);
        self.status = SessionStatus::AwaitingResponse;
        let open_id = self.transcript.push_assistant("");
        self.open_message_id = Some(open_id);

        let api_messages = self
            .transcript
            .messages()
            .iter()
            .filter(|m| m.id != open_id)
            .map(|m| ChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        self.persist();

        self.current_stream_id += 1;
        let cancel_token = CancellationToken::new();
        self.cancel_token = Some(cancel_token.clone());

        Some(PendingExchange {
            api_messages,
            stream_id: self.current_stream_id,
            cancel_token,
        })
    }

    /// Folds one stream event back into the session. Events tagged with a
    /// superseded stream id are dropped. `End` always returns the status to
    /// idle and closes the open message, whatever came before it.
    pub fn handle_stream_message(&mut self, message: StreamMessage, stream_id: u64) {
        if stream_id != self.current_stream_id {
            return;
        }

        match message {
            StreamMessage::Chunk(content) => {
                if let Some(open_id) = self.open_message_id {
                    if !self.transcript.apply_delta(open_id, &content) {
                        tracing::warn!(open_id, "delta arrived for an unknown message");
                    }
                    self.persist();
                }
            }
            StreamMessage::Error(detail) => {
                // Failures never surface in the transcript; the open message
                // keeps whatever partial content it has accumulated.
                tracing::error!("completion stream failed: {detail}");
            }
            StreamMessage::End => {
                self.open_message_id = None;
                self.cancel_token = None;
                self.status = SessionStatus::Idle;
                self.persist();
            }
        }
    }

    /// Replaces the transcript with the seed greeting. The UI gates this
    /// behind a yes/no confirmation.
    pub fn reset_transcript(&mut self) {
        let greeting = self.history.greeting().to_string();
        self.transcript.reset(&greeting);
        self.persist();
    }

    /// Cancels an in-flight stream at shutdown.
    pub fn shutdown(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.history.save(&self.transcript) {
            tracing::error!("{e}");
        }
    }
}
