//! Bounded buffer of recent turns.

use loom_core::{Conversation, Message, Role};

/// The most recent turns of a conversation, available without search.
///
/// When the buffer grows past its capacity, system messages are kept and
/// the oldest non-system messages are dropped.
#[derive(Clone, Debug)]
pub struct WorkingMemory {
    conversation: Conversation,
    capacity: usize,
}

impl WorkingMemory {
    /// Empty buffer holding up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            conversation: Conversation::default(),
            capacity,
        }
    }

    /// Buffer seeded from `conversation`, trimmed to `capacity`.
    pub fn with_conversation(capacity: usize, conversation: Conversation) -> Self {
        let mut memory = Self {
            conversation,
            capacity,
        };
        memory.enforce_capacity();
        memory
    }

    /// Append a message, evicting if over capacity.
    pub fn add(&mut self, message: Message) {
        self.conversation.messages.push(message);
        self.enforce_capacity();
    }

    /// Record an exchange: the user input, then the model output. Empty
    /// sides are skipped. Returns what was added.
    pub fn save_context(&mut self, input: &str, output: &str) -> Vec<Message> {
        let added = exchange_messages(input, output);
        for message in &added {
            self.add(message.clone());
        }
        added
    }

    /// Drop every message. The model name survives.
    pub fn clear(&mut self) {
        self.conversation.messages.clear();
    }

    /// Keep only messages matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&Message) -> bool) {
        self.conversation.messages.retain(keep);
    }

    /// Buffered messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    /// The buffer as a conversation value.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.conversation.messages.len()
    }

    /// Nothing buffered.
    pub fn is_empty(&self) -> bool {
        self.conversation.messages.is_empty()
    }

    /// The buffer rendered as prompt history.
    pub fn history(&self) -> String {
        format_history(self.messages())
    }

    fn enforce_capacity(&mut self) {
        let messages = &mut self.conversation.messages;
        if messages.len() <= self.capacity {
            return;
        }

        let system_count = messages.iter().filter(|m| m.role == Role::System).count();
        let keep_recent = self.capacity.saturating_sub(system_count);
        let non_system = messages.len() - system_count;
        let mut to_drop = non_system.saturating_sub(keep_recent);

        let mut system = Vec::with_capacity(system_count);
        let mut rest = Vec::with_capacity(non_system);
        for message in messages.drain(..) {
            if message.role == Role::System {
                system.push(message);
            } else if to_drop > 0 {
                to_drop -= 1;
            } else {
                rest.push(message);
            }
        }
        system.extend(rest);
        *messages = system;
    }
}

/// User and assistant messages for one exchange, skipping empty sides.
pub(crate) fn exchange_messages(input: &str, output: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !input.is_empty() {
        messages.push(Message::user(input));
    }
    if !output.is_empty() {
        messages.push(Message::assistant(output));
    }
    messages
}

/// Render messages as `Human:` / `AI:` / `System:` prompt lines.
///
/// Tool output shows as `Tool (name):` and errors as `Error:`. Tool
/// progress lines are transient and left out.
pub fn format_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|message| match message.role {
            Role::User => Some(format!("Human: {}", message.content)),
            Role::Assistant => Some(format!("AI: {}", message.content)),
            Role::System => Some(format!("System: {}", message.content)),
            Role::Tool => Some(format!(
                "Tool ({}): {}",
                message.tool_name.as_deref().unwrap_or_default(),
                message.content
            )),
            Role::Error => Some(format!("Error: {}", message.content)),
            Role::ToolProgress => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn contents(memory: &WorkingMemory) -> Vec<&str> {
        memory.messages().iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn keeps_everything_under_capacity() {
        let mut memory = WorkingMemory::new(3);
        memory.add(Message::user("a"));
        memory.add(Message::assistant("b"));
        assert_eq!(contents(&memory), ["a", "b"]);
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn evicts_oldest_non_system() {
        let mut memory = WorkingMemory::new(3);
        for c in ["a", "b", "c", "d"] {
            memory.add(Message::user(c));
        }
        assert_eq!(contents(&memory), ["b", "c", "d"]);
    }

    #[test]
    fn system_messages_survive_eviction() {
        let mut memory = WorkingMemory::new(3);
        memory.add(Message::system("rules"));
        for c in ["a", "b", "c", "d"] {
            memory.add(Message::user(c));
        }
        assert_eq!(contents(&memory), ["rules", "c", "d"]);
    }

    #[test]
    fn system_messages_move_to_front() {
        let mut memory = WorkingMemory::new(2);
        memory.add(Message::user("a"));
        memory.add(Message::system("late rules"));
        memory.add(Message::user("b"));
        assert_eq!(contents(&memory), ["late rules", "b"]);
    }

    #[test]
    fn more_systems_than_capacity_keeps_only_systems() {
        let mut memory = WorkingMemory::new(1);
        memory.add(Message::system("s1"));
        memory.add(Message::system("s2"));
        memory.add(Message::user("u"));
        assert_eq!(contents(&memory), ["s1", "s2"]);
    }

    #[test]
    fn seeded_conversation_is_trimmed() {
        let conversation = Conversation::with_system("m", "sys")
            .add_message(Message::user("1"))
            .add_message(Message::user("2"))
            .add_message(Message::user("3"));
        let memory = WorkingMemory::with_conversation(2, conversation);
        assert_eq!(contents(&memory), ["sys", "3"]);
        assert_eq!(memory.conversation().model, "m");
    }

    #[test]
    fn save_context_skips_empty_sides() {
        let mut memory = WorkingMemory::new(10);
        let added = memory.save_context("question", "");
        assert_eq!(added.len(), 1);
        let added = memory.save_context("again", "answer");
        assert_eq!(added.len(), 2);
        assert_eq!(contents(&memory), ["question", "again", "answer"]);
        assert!(memory.messages()[2].is_assistant());
    }

    #[test]
    fn clear_empties_buffer() {
        let mut memory = WorkingMemory::with_conversation(5, Conversation::new("m"));
        memory.add(Message::user("x"));
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.conversation().model, "m");
    }

    #[test]
    fn history_format() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::tool_result("ls", "a.txt"),
            Message::tool_progress("bash", "ls"),
            Message::error("oops"),
        ];
        assert_eq!(
            format_history(&messages),
            "System: be brief\nHuman: hi\nAI: hello\nTool (ls): a.txt\nError: oops"
        );
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_unless_all_system(
            roles in proptest::collection::vec(any::<bool>(), 0..40),
            capacity in 1usize..10,
        ) {
            let mut memory = WorkingMemory::new(capacity);
            for (i, is_system) in roles.iter().enumerate() {
                let content = format!("m{i}");
                memory.add(if *is_system { Message::system(content) } else { Message::user(&content) });
            }
            let systems = roles.iter().filter(|s| **s).count();
            prop_assert!(memory.len() <= capacity.max(systems));
            prop_assert_eq!(
                memory.messages().iter().filter(|m| m.is_system()).count(),
                systems
            );
        }
    }
}
