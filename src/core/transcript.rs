//! The conversation transcript: an ordered message sequence with in-place
//! content growth for the single open streaming message.

use crate::core::message::{Message, Role};

/// Owns the ordered message list and message-id allocation.
///
/// Insertion order is display order is chronological order. The transcript is
/// never empty; a seeded greeting exists before any user interaction.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
}

impl Transcript {
    /// A fresh transcript containing only the seed greeting.
    pub fn seeded(greeting: &str) -> Self {
        let mut transcript = Self {
            messages: Vec::new(),
            next_id: 1,
        };
        transcript.push(Role::Assistant, greeting);
        transcript
    }

    /// Rebuilds a transcript from persisted messages. Id allocation resumes
    /// above the highest loaded id. An empty list falls back to the seed.
    pub fn from_messages(messages: Vec<Message>, greeting: &str) -> Self {
        if messages.is_empty() {
            return Self::seeded(greeting);
        }
        let next_id = messages.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        Self { messages, next_id }
    }

    fn push(&mut self, role: Role, content: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message::new(id, role, content));
        id
    }

    pub fn push_user(&mut self, content: &str) -> u64 {
        self.push(Role::User, content)
    }

    pub fn push_assistant(&mut self, content: &str) -> u64 {
        self.push(Role::Assistant, content)
    }

    /// Appends `delta` to the content of the message with `id`. Returns false
    /// when no such message exists; other messages are never affected.
    pub fn apply_delta(&mut self, id: u64, delta: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// Discards all history and reseeds with a single greeting message.
    pub fn reset(&mut self, greeting: &str) {
        self.messages.clear();
        self.next_id = 1;
        self.push(Role::Assistant, greeting);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_transcript_has_one_assistant_greeting() {
        let transcript = Transcript::seeded("Hello!");
        assert_eq!(transcript.len(), 1);
        let seed = &transcript.messages()[0];
        assert!(seed.is_assistant());
        assert_eq!(seed.content, "Hello!");
    }

    #[test]
    fn pushes_preserve_insertion_order() {
        let mut transcript = Transcript::seeded("hi");
        transcript.push_user("first");
        transcript.push_assistant("second");
        transcript.push_user("third");

        let contents: Vec<&str> = transcript
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["hi", "first", "second", "third"]);
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut transcript = Transcript::seeded("hi");
        let a = transcript.push_user("a");
        let b = transcript.push_assistant("");
        assert!(b > a);

        let ids: Vec<u64> = transcript.messages().iter().map(|m| m.id).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
    }

    #[test]
    fn apply_delta_appends_to_the_target_only() {
        let mut transcript = Transcript::seeded("hi");
        transcript.push_user("question");
        let open_id = transcript.push_assistant("");

        assert!(transcript.apply_delta(open_id, "He"));
        assert!(transcript.apply_delta(open_id, "llo"));

        assert_eq!(transcript.last().unwrap().content, "Hello");
        assert_eq!(transcript.messages()[0].content, "hi");
        assert_eq!(transcript.messages()[1].content, "question");
    }

    #[test]
    fn apply_delta_with_unknown_id_is_a_reported_miss() {
        let mut transcript = Transcript::seeded("hi");
        assert!(!transcript.apply_delta(999, "lost"));
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].content, "hi");
    }

    #[test]
    fn reset_discards_history_and_reseeds() {
        let mut transcript = Transcript::seeded("hi");
        transcript.push_user("one");
        transcript.push_assistant("two");

        transcript.reset("fresh start");

        assert_eq!(transcript.len(), 1);
        let seed = transcript.last().unwrap();
        assert!(seed.is_assistant());
        assert_eq!(seed.content, "fresh start");
    }

    #[test]
    fn reloaded_transcript_resumes_id_allocation_above_loaded_ids() {
        let mut transcript = Transcript::seeded("hi");
        transcript.push_user("one");
        let persisted = transcript.messages().to_vec();

        let mut reloaded = Transcript::from_messages(persisted, "hi");
        let next = reloaded.push_user("two");
        assert!(reloaded.messages().iter().filter(|m| m.id == next).count() == 1);
        assert!(next > reloaded.messages()[1].id);
    }

    #[test]
    fn empty_persisted_list_falls_back_to_seed() {
        let transcript = Transcript::from_messages(Vec::new(), "seed");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].content, "seed");
    }
}
