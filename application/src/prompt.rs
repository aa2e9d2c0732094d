use domain::models::{ChatMessage, Document, Role};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "The files returned in this retrieval pipeline are markdown notes from an Obsidian vault.
Items are formatted as a to-do list. For example:
    - [ ] means that a task still needs to be done
    - [x] means that the task has been completed

When asked about to-do items, ignore completed tasks and only return uncompleted tasks.";

pub const CONTEXT_DIVIDER: &str = "----------------";
pub const DOCUMENT_BOUNDARY: &str = "\n\n---\n\n";

/// A chat prompt: one system message holding the instruction and the
/// retrieved notes, then one user message holding the question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    messages: Vec<ChatMessage>,
}

impl Prompt {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system(&self) -> &str {
        self.content_of(Role::System)
    }

    pub fn user(&self) -> &str {
        self.content_of(Role::User)
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    /// Plain text form, one `[role]` header per message.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("[{}]\n{}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn content_of(&self, role: Role) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Build the prompt for `question`. Document contents go in verbatim and in
/// the given order; the question is not trimmed or rewritten.
pub fn assemble<'a, I>(instruction: &str, documents: I, question: &str) -> Prompt
where
    I: IntoIterator<Item = &'a Document>,
{
    let context = documents
        .into_iter()
        .map(Document::content)
        .collect::<Vec<_>>()
        .join(DOCUMENT_BOUNDARY);
    let system = format!("{instruction}\n{CONTEXT_DIVIDER}\n{context}");

    Prompt {
        messages: vec![ChatMessage::system(system), ChatMessage::user(question)],
    }
}
