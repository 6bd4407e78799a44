use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const PROMPT_HEADER: &str =
    "The following is a conversation between a user and an empathetic assistant:\n";
const USER_PREFIX: &str = "User:";
const ASSISTANT_PREFIX: &str = "Assistant:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Bounded chat history; the oldest message is dropped once full
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: VecDeque<Message>,
    max_history: usize,
}

impl Conversation {
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            messages: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    pub fn push_user(&mut self, content: &str) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.push(Role::Assistant, content);
    }

    fn push(&mut self, role: Role, content: &str) {
        if self.messages.len() >= self.max_history {
            self.messages.pop_front();
        }
        self.messages.push_back(Message {
            role,
            content: content.to_string(),
        });
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn assistant_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::Assistant).count()
    }

    /// Render the history as a plain-text transcript ending in an open assistant turn
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::from(PROMPT_HEADER);
        for message in &self.messages {
            let prefix = match message.role {
                Role::User => USER_PREFIX,
                Role::Assistant => ASSISTANT_PREFIX,
            };
            prompt.push_str(prefix);
            prompt.push(' ');
            prompt.push_str(&message.content);
            prompt.push('\n');
        }
        prompt.push('\n');
        prompt.push_str(ASSISTANT_PREFIX);
        prompt
    }
}

fn starts_turn(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with(USER_PREFIX) || line.starts_with(ASSISTANT_PREFIX)
}

/// Collect lines up to the next speaker label. A turn that opens with a user
/// label holds no assistant text.
fn take_turn<'a>(first: &'a str, rest: impl Iterator<Item = &'a str>) -> String {
    if first.trim_start().starts_with(USER_PREFIX) {
        return String::new();
    }
    let mut turn = vec![first];
    turn.extend(rest.take_while(|line| !starts_turn(line)));
    turn.join("\n").trim().to_string()
}

/// Pull the new assistant reply out of a model completion.
///
/// Models either echo the prompt, echo a reformatted transcript, or return only
/// the continuation. `prior_assistant_turns` is the number of assistant messages
/// already present in `prompt`, which locates the new reply in an echoed transcript.
pub fn extract_reply(prompt: &str, generated: &str, prior_assistant_turns: usize) -> Option<String> {
    let reply = if let Some(continuation) = generated.strip_prefix(prompt) {
        let mut lines = continuation.lines();
        let first = lines.next().unwrap_or_default();
        take_turn(first, lines)
    } else {
        let lines: Vec<&str> = generated.lines().collect();
        let assistant_lines: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.trim_start().starts_with(ASSISTANT_PREFIX))
            .map(|(idx, _)| idx)
            .collect();

        match assistant_lines
            .get(prior_assistant_turns)
            .or(assistant_lines.last())
        {
            Some(&idx) => {
                let first = lines[idx].trim_start()[ASSISTANT_PREFIX.len()..].trim_start();
                take_turn(first, lines[idx + 1..].iter().copied())
            }
            // Bare continuation without any labels
            None => {
                let mut lines = generated.lines();
                let first = lines.next().unwrap_or_default();
                take_turn(first, lines)
            }
        }
    };

    if reply.is_empty() {
        None
    } else {
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prompt() {
        let mut conversation = Conversation::new(10);
        conversation.push_user("I slept badly.");
        conversation.push_assistant("That sounds hard.");
        conversation.push_user("Work was better.");

        assert_eq!(
            conversation.render_prompt(),
            "The following is a conversation between a user and an empathetic assistant:\n\
             User: I slept badly.\n\
             Assistant: That sounds hard.\n\
             User: Work was better.\n\
             \n\
             Assistant:"
        );
        assert_eq!(conversation.assistant_turns(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut conversation = Conversation::new(3);
        for i in 0..5 {
            conversation.push_user(&format!("entry {}", i));
        }
        assert_eq!(conversation.len(), 3);
        let first = conversation.messages().next().unwrap();
        assert_eq!(first.content, "entry 2");
    }

    #[test]
    fn test_extract_from_echoed_prompt() {
        let mut conversation = Conversation::new(10);
        conversation.push_user("Rough day.");
        let prompt = conversation.render_prompt();
        let generated = format!("{} I'm sorry it was rough.\nUser: thanks\nAssistant: sure", prompt);

        assert_eq!(
            extract_reply(&prompt, &generated, 0).as_deref(),
            Some("I'm sorry it was rough.")
        );
    }

    #[test]
    fn test_extract_skips_earlier_assistant_turns() {
        let mut conversation = Conversation::new(10);
        conversation.push_user("Monday");
        conversation.push_assistant("Old reply");
        conversation.push_user("Tuesday");
        let prompt = conversation.render_prompt();
        // Echo with different whitespace so the prefix does not match exactly
        let generated = "User: Monday\nAssistant: Old reply\nUser: Tuesday\nAssistant: New reply\nUser: more";

        assert_eq!(extract_reply(&prompt, generated, 1).as_deref(), Some("New reply"));
    }

    #[test]
    fn test_extract_bare_continuation() {
        let prompt = "ignored";
        assert_eq!(
            extract_reply(prompt, " You seem tired.\nTake it easy.\nUser: ok", 0).as_deref(),
            Some("You seem tired.\nTake it easy.")
        );
    }

    #[test]
    fn test_extract_user_turn_is_not_a_reply() {
        assert_eq!(extract_reply("prompt", "User: how are you?", 0), None);
        assert_eq!(extract_reply("prompt", "  User: again\nmore text", 0), None);

        let mut conversation = Conversation::new(10);
        conversation.push_user("Hi");
        let prompt = conversation.render_prompt();
        assert_eq!(extract_reply(&prompt, &format!("{} User: hijacked", prompt), 0), None);
    }

    #[test]
    fn test_extract_empty_reply() {
        let mut conversation = Conversation::new(10);
        conversation.push_user("Hello");
        let prompt = conversation.render_prompt();

        assert_eq!(extract_reply(&prompt, &prompt, 0), None);
        assert_eq!(extract_reply(&prompt, "   ", 0), None);
        assert_eq!(extract_reply(&prompt, &format!("{}\nUser: again", prompt), 0), None);
    }
}
