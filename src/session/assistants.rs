//! The four assistant modes reachable from the main menu.

use std::io::{BufRead, Write};

use anyhow::Result;

use super::{is_exit, run_loop, AfterReply, Console, LoopSetup, LoopSummary, LOOP_EXIT_KEYWORDS};
use crate::archive::Archiver;
use crate::context::{DocumentContext, MemoryContext, Passthrough, PersonaContext};
use crate::gateway::Generator;
use crate::index::DocumentIndex;

/// Archive category for document answers.
pub const DOCUMENT_ARCHIVE_CATEGORY: &str = "askdoc";

/// Option 0: talk to the model directly.
pub async fn direct_assistant<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    generator: &dyn Generator,
    model: &str,
) -> Result<LoopSummary> {
    let question = format!("🗣️ Chat with {model} (type 'menu' to return to main menu):");
    let tags = [model];
    let setup = LoopSetup {
        question: &question,
        reply_header: "🤖 Assistant Reply:",
        tags: &tags,
        echo_prompt: false,
        after: AfterReply::Nothing,
    };
    run_loop(console, generator, &Passthrough, &setup).await
}

/// Option 1: answer from the persona's memory, offering to remember each exchange.
pub async fn memory_assistant<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    generator: &dyn Generator,
    context: &MemoryContext,
) -> Result<LoopSummary> {
    let setup = LoopSetup {
        question: "🧍 You say:",
        reply_header: "🤖 Assistant：",
        tags: &["personal"],
        echo_prompt: false,
        after: AfterReply::OfferMemory(context.store()),
    };
    run_loop(console, generator, context, &setup).await
}

/// Option 2: answer from a document collection chosen at entry.
///
/// `open_index` resolves the collection name. If it fails the error is shown
/// and control returns to the menu without entering the loop.
pub async fn document_assistant<R, W, I, F>(
    console: &mut Console<R, W>,
    generator: &dyn Generator,
    open_index: F,
    top_k: usize,
    separator: &str,
    archiver: &Archiver,
) -> Result<LoopSummary>
where
    R: BufRead,
    W: Write,
    I: DocumentIndex + Send + Sync,
    F: FnOnce(&str) -> Result<I>,
{
    let Some(name) = console.ask("\n📄 Please enter the vector DB Name to use:\n> ")? else {
        return Ok(LoopSummary::default());
    };
    let name = name.trim();
    if name.is_empty() || is_exit(name, LOOP_EXIT_KEYWORDS) {
        return Ok(LoopSummary::default());
    }

    let index = match open_index(name) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(collection = name, error = %e, "cannot open document collection");
            console.say(&format!("❌ {e:#}"))?;
            return Ok(LoopSummary::default());
        }
    };

    let context = DocumentContext::new(index, top_k, separator);
    let setup = LoopSetup {
        question: "📄 Question (or type 'menu' to return to main menu):",
        reply_header: "🧠 Document Assistant Reply：",
        tags: &["doc_search"],
        echo_prompt: false,
        after: AfterReply::Archive(archiver, DOCUMENT_ARCHIVE_CATEGORY),
    };
    run_loop(console, generator, &context, &setup).await
}

/// Option 3: answer through a persona template from the prompt store.
pub async fn persona_assistant<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    generator: &dyn Generator,
    context: &PersonaContext,
    display_name: &str,
    tag: &str,
) -> Result<LoopSummary> {
    console.say(&format!(
        "\n🧠 You can now ask {display_name} questions (type 'menu' to return to main menu):"
    ))?;
    let tags = [tag];
    let setup = LoopSetup {
        question: "🧑‍💼 Your question:",
        reply_header: "",
        tags: &tags,
        echo_prompt: true,
        after: AfterReply::Nothing,
    };
    run_loop(console, generator, context, &setup).await
}

/// Display form of a persona template name: `carl_jung` → `Carl Jung`.
pub fn persona_display_name(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_title_cases_words() {
        assert_eq!(persona_display_name("carl_jung"), "Carl Jung");
        assert_eq!(persona_display_name("marcus-aurelius"), "Marcus Aurelius");
        assert_eq!(persona_display_name("socrates"), "Socrates");
    }
}
