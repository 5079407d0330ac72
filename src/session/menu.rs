//! Main menu: dispatches to the assistant loops until the user quits.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;

use super::assistants::{
    direct_assistant, document_assistant, memory_assistant, persona_assistant,
    persona_display_name,
};
use super::{is_exit, Console, MENU_EXIT_KEYWORDS};
use crate::archive::Archiver;
use crate::config::ParleyConfig;
use crate::context::{MemoryContext, PersonaContext};
use crate::gateway::Generator;
use crate::index::DocumentIndex;
use crate::langfuse::PromptSource;
use crate::memory::MemoryStore;

/// Opens a named document collection for the document assistant.
pub type IndexOpener<'a> =
    Box<dyn Fn(&str) -> Result<Box<dyn DocumentIndex + Send + Sync>> + 'a>;

/// Everything the assistants need, wired once in `main`.
pub struct Menu<'a> {
    generator: &'a dyn Generator,
    prompts: Arc<dyn PromptSource>,
    config: &'a ParleyConfig,
    archiver: Archiver,
    open_index: IndexOpener<'a>,
}

impl<'a> Menu<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        prompts: Arc<dyn PromptSource>,
        config: &'a ParleyConfig,
        open_index: IndexOpener<'a>,
    ) -> Self {
        Self {
            generator,
            prompts,
            config,
            archiver: Archiver::new(config.resolved_archive_dir()),
            open_index,
        }
    }

    fn banner(&self) -> String {
        format!(
            "\n🧭 Please select assistant mode：\n\
             0. 🗣️ Chat with {}\n\
             1. 🧍 General Life Assistant\n\
             2. 📄 Document Content Assistant\n\
             3. 🧑‍💼 Chat with {}\n\
             Type 'exit' to quit",
            self.config.model.model,
            persona_display_name(&self.config.persona.name),
        )
    }

    /// Run until an exit keyword or end of input.
    pub async fn run<R: BufRead, W: Write>(&self, console: &mut Console<R, W>) -> Result<()> {
        loop {
            console.say(&self.banner())?;
            let Some(choice) = console.ask("> ")? else {
                break;
            };
            if is_exit(&choice, MENU_EXIT_KEYWORDS) {
                console.say("👋 Goodbye!")?;
                break;
            }

            let choice = choice.trim().to_lowercase();
            tracing::debug!(choice = %choice, "menu selection");
            let summary = match choice.as_str() {
                "0" => direct_assistant(console, self.generator, &self.config.model.model).await?,
                "1" => {
                    let store = MemoryStore::open(
                        self.config.resolved_memory_dir(),
                        &self.config.memory.persona,
                    )?;
                    let context = MemoryContext::new(store, self.config.memory.max_prompt_chars);
                    memory_assistant(console, self.generator, &context).await?
                }
                "2" => {
                    document_assistant(
                        console,
                        self.generator,
                        |name: &str| (self.open_index)(name),
                        self.config.retrieval.top_k,
                        &self.config.retrieval.separator,
                        &self.archiver,
                    )
                    .await?
                }
                "3" => {
                    let persona = &self.config.persona;
                    let context = PersonaContext::new(
                        Arc::clone(&self.prompts),
                        &persona.name,
                        &persona.label,
                        &persona.variable,
                    );
                    let display = persona_display_name(&persona.name);
                    persona_assistant(console, self.generator, &context, &display, &persona.name)
                        .await?
                }
                _ => {
                    console.say("❌ Invalid option, please enter 0/1/2/3 or exit")?;
                    continue;
                }
            };
            tracing::info!(
                mode = %choice,
                turns = summary.turns,
                skipped = summary.skipped,
                "returned to menu"
            );
        }
        Ok(())
    }
}
