//! Prompt assembly: combine the user's input with one context source.
//!
//! Every assistant mode builds its prompt through a [`ContextAssembler`]. The
//! passthrough variant sends the input as typed; the others embed persisted
//! memory, retrieved documents, or a compiled persona template.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::index::DocumentIndex;
use crate::langfuse::{ChatMessage, PromptSource};
use crate::memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    /// The persona template could not be fetched. Recoverable: the session
    /// reports it and waits for the next input.
    #[error("unable to get prompt template '{name}' (label '{label}'): {reason}")]
    TemplateUnavailable {
        name: String,
        label: String,
        reason: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Produce the final prompt for one user input.
#[async_trait]
pub trait ContextAssembler: Send + Sync {
    async fn assemble(&self, input: &str) -> Result<String, AssembleError>;
}

/// Sends the input unchanged.
pub struct Passthrough;

#[async_trait]
impl ContextAssembler for Passthrough {
    async fn assemble(&self, input: &str) -> Result<String, AssembleError> {
        Ok(input.to_string())
    }
}

/// Embeds the persona's memory file ahead of the question.
pub struct MemoryContext {
    store: MemoryStore,
    max_chars: usize,
}

impl MemoryContext {
    /// `max_chars` bounds how much of the memory tail is embedded; 0 embeds all of it.
    pub fn new(store: MemoryStore, max_chars: usize) -> Self {
        Self { store, max_chars }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

pub fn memory_prompt(memory: &str, question: &str) -> String {
    format!(
        "You are my personal assistant. Here is your current memory：\n{memory}\n\nMy question is：{question}\n\nPlease respond to me based on your memory.\n"
    )
}

#[async_trait]
impl ContextAssembler for MemoryContext {
    async fn assemble(&self, input: &str) -> Result<String, AssembleError> {
        let memory = self.store.read_recent(self.max_chars)?;
        tracing::debug!(memory_chars = memory.chars().count(), "memory loaded for prompt");
        Ok(memory_prompt(&memory, input))
    }
}

/// Embeds the nearest documents from a similarity index.
pub struct DocumentContext<I> {
    index: I,
    top_k: usize,
    separator: String,
}

impl<I: DocumentIndex> DocumentContext<I> {
    pub fn new(index: I, top_k: usize, separator: impl Into<String>) -> Self {
        Self {
            index,
            top_k,
            separator: separator.into(),
        }
    }
}

pub fn document_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a professional assistant. Here is the document content：\n\n【RAG Search Result】\n{context}\n\nBased on the above, answer the question：{question}\n"
    )
}

#[async_trait]
impl<I: DocumentIndex + Send + Sync> ContextAssembler for DocumentContext<I> {
    async fn assemble(&self, input: &str) -> Result<String, AssembleError> {
        let documents = self.index.query(input, self.top_k)?;
        tracing::debug!(retrieved = documents.len(), "documents retrieved");
        Ok(document_prompt(&documents.join(&self.separator), input))
    }
}

/// Compiles a labeled remote template with the user's question.
pub struct PersonaContext {
    prompts: Arc<dyn PromptSource>,
    name: String,
    label: String,
    variable: String,
}

impl PersonaContext {
    pub fn new(
        prompts: Arc<dyn PromptSource>,
        name: impl Into<String>,
        label: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        Self {
            prompts,
            name: name.into(),
            label: label.into(),
            variable: variable.into(),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> AssembleError {
        AssembleError::TemplateUnavailable {
            name: self.name.clone(),
            label: self.label.clone(),
            reason: reason.into(),
        }
    }
}

/// Flatten role-tagged messages into one plain-text prompt. Only system and
/// user messages are kept, in their original order.
pub fn messages_to_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        match message.role.as_str() {
            "system" => prompt.push_str(&format!("[System]\n{}\n", message.content)),
            "user" => prompt.push_str(&format!("[User]\n{}\n", message.content)),
            _ => {}
        }
    }
    prompt
}

#[async_trait]
impl ContextAssembler for PersonaContext {
    async fn assemble(&self, input: &str) -> Result<String, AssembleError> {
        let template = match self.prompts.get_prompt(&self.name, &self.label).await {
            Ok(Some(template)) => template,
            Ok(None) => return Err(self.unavailable("no template carries this label")),
            Err(e) => return Err(self.unavailable(format!("{e:#}"))),
        };

        let variables = HashMap::from([(self.variable.clone(), input.to_string())]);
        let messages = template.compile(&variables);
        Ok(messages_to_prompt(&messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StaticIndex;
    use crate::langfuse::{PromptBody, PromptTemplate};
    use tempfile::TempDir;

    struct FixedPrompts(Option<PromptTemplate>);

    #[async_trait]
    impl PromptSource for FixedPrompts {
        async fn get_prompt(&self, _name: &str, _label: &str) -> anyhow::Result<Option<PromptTemplate>> {
            Ok(self.0.clone())
        }
    }

    struct OfflinePrompts;

    #[async_trait]
    impl PromptSource for OfflinePrompts {
        async fn get_prompt(&self, _name: &str, _label: &str) -> anyhow::Result<Option<PromptTemplate>> {
            anyhow::bail!("connection refused")
        }
    }

    fn jung_template() -> PromptTemplate {
        PromptTemplate {
            name: "carl_jung".into(),
            version: 2,
            labels: vec!["production".into()],
            body: PromptBody::Chat(vec![
                ChatMessage::new("system", "You are Carl Jung."),
                ChatMessage::new("assistant", "I am listening."),
                ChatMessage::new("user", "{{user_input}}"),
            ]),
        }
    }

    #[tokio::test]
    async fn passthrough_is_identity() {
        let prompt = Passthrough.assemble("  as typed ").await.unwrap();
        assert_eq!(prompt, "  as typed ");
    }

    #[tokio::test]
    async fn memory_prompt_embeds_memory_verbatim() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path(), "general").unwrap();
        store.append_exchange("my cat?", "Miso").unwrap();

        let prompt = MemoryContext::new(store, 0).assemble("what is my cat called?").await.unwrap();

        assert!(prompt.starts_with("You are my personal assistant."));
        assert!(prompt.contains("\n[Question] my cat?\n[Response] Miso\n"));
        assert!(prompt.contains("My question is：what is my cat called?"));
    }

    #[tokio::test]
    async fn document_prompt_joins_in_rank_order() {
        let index = StaticIndex(vec!["A".into(), "B".into(), "C".into(), "D".into()]);
        let prompt = DocumentContext::new(index, 3, "\n---\n").assemble("q").await.unwrap();

        assert!(prompt.contains("A\n---\nB\n---\nC"));
        assert!(!prompt.contains('D'));
        assert!(prompt.contains("answer the question：q"));
    }

    #[tokio::test]
    async fn persona_flattens_system_and_user_only() {
        let context = PersonaContext::new(
            Arc::new(FixedPrompts(Some(jung_template()))),
            "carl_jung",
            "production",
            "user_input",
        );
        let prompt = context.assemble("What do dreams mean?").await.unwrap();
        assert_eq!(
            prompt,
            "[System]\nYou are Carl Jung.\n[User]\nWhat do dreams mean?\n"
        );
    }

    #[tokio::test]
    async fn persona_missing_template_is_recoverable() {
        let context = PersonaContext::new(
            Arc::new(FixedPrompts(None)),
            "carl_jung",
            "production",
            "user_input",
        );
        let err = context.assemble("hi").await.unwrap_err();
        assert!(matches!(err, AssembleError::TemplateUnavailable { ref name, .. } if name == "carl_jung"));
    }

    #[tokio::test]
    async fn persona_store_outage_is_recoverable() {
        let context = PersonaContext::new(Arc::new(OfflinePrompts), "carl_jung", "production", "user_input");
        let err = context.assemble("hi").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
