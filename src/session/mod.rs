//! Interactive read-eval-print loops.
//!
//! Every loop follows `AWAITING_INPUT → (EXIT | PROCESSING) → AWAITING_INPUT`.
//! Terminal I/O goes through a [`Console`] so loops run the same against a
//! real terminal and against in-memory buffers.

pub mod assistants;
pub mod menu;

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::archive::Archiver;
use crate::context::{AssembleError, ContextAssembler};
use crate::gateway::Generator;
use crate::memory::MemoryStore;

/// Keywords that leave the main menu.
pub const MENU_EXIT_KEYWORDS: &[&str] = &["exit", "quit"];

/// Keywords that leave an assistant loop and return to the menu.
pub const LOOP_EXIT_KEYWORDS: &[&str] = &["exit", "quit", "menu"];

/// Case-insensitive exact match against `keywords`, ignoring surrounding whitespace.
pub fn is_exit(input: &str, keywords: &[&str]) -> bool {
    let input = input.trim();
    keywords.iter().any(|k| input.eq_ignore_ascii_case(k))
}

/// Line-oriented terminal.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `prompt` and read one line. `None` at end of input.
    pub fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read from terminal")?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }

    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

/// What happens after a reply is printed.
pub enum AfterReply<'a> {
    Nothing,
    /// Ask before appending the exchange to memory.
    OfferMemory(&'a MemoryStore),
    /// Archive every exchange under a category.
    Archive(&'a Archiver, &'a str),
}

/// Static description of one assistant loop.
pub struct LoopSetup<'a> {
    pub question: &'a str,
    pub reply_header: &'a str,
    pub tags: &'a [&'a str],
    /// Print the assembled prompt before calling the model.
    pub echo_prompt: bool,
    pub after: AfterReply<'a>,
}

/// Counters returned when a loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Inputs answered by the model.
    pub turns: usize,
    /// Inputs abandoned because the context could not be assembled.
    pub skipped: usize,
    pub memory_updates: usize,
    pub archived: usize,
}

/// Drive one assistant loop until an exit keyword or end of input.
///
/// Gateway faults propagate; a missing persona template only skips the
/// current input.
pub async fn run_loop<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    generator: &dyn Generator,
    assembler: &dyn ContextAssembler,
    setup: &LoopSetup<'_>,
) -> Result<LoopSummary> {
    let mut summary = LoopSummary::default();

    loop {
        let Some(input) = console.ask(&format!("\n{}\n> ", setup.question))? else {
            break;
        };
        if is_exit(&input, LOOP_EXIT_KEYWORDS) {
            break;
        }

        let prompt = match assembler.assemble(&input).await {
            Ok(prompt) => prompt,
            Err(e @ AssembleError::TemplateUnavailable { .. }) => {
                tracing::warn!(error = %e, "skipping input, prompt template unavailable");
                console.say(&format!("❌ {e}. Please check the Langfuse settings."))?;
                summary.skipped += 1;
                continue;
            }
            Err(AssembleError::Other(e)) => return Err(e),
        };

        if setup.echo_prompt {
            console.say(&prompt)?;
        }

        let response = generator.generate(&prompt, setup.tags).await?;
        summary.turns += 1;
        if setup.reply_header.is_empty() {
            console.say(&response)?;
        } else {
            console.say(&format!("\n{}\n{response}", setup.reply_header))?;
        }

        match &setup.after {
            AfterReply::Nothing => {}
            AfterReply::OfferMemory(store) => {
                let answer = console.ask("⚙️ Add to memory? (y/n): ")?.unwrap_or_default();
                if answer.trim().eq_ignore_ascii_case("y") {
                    store.append_exchange(&input, &response)?;
                    summary.memory_updates += 1;
                    console.say("✅ Added to memory")?;
                }
            }
            AfterReply::Archive(archiver, category) => {
                let path = archiver.archive(&input, &response, category)?;
                summary.archived += 1;
                console.say(&format!("✅ Saved as {}", path.display()))?;
            }
        }
    }

    tracing::debug!(?summary, "assistant loop finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn exit_keywords_match_case_insensitively() {
        assert!(is_exit("MENU", LOOP_EXIT_KEYWORDS));
        assert!(is_exit(" Quit \n", LOOP_EXIT_KEYWORDS));
        assert!(!is_exit("menu please", LOOP_EXIT_KEYWORDS));
        assert!(!is_exit("menu", MENU_EXIT_KEYWORDS));
        assert!(is_exit("Exit", MENU_EXIT_KEYWORDS));
    }

    #[test]
    fn console_reads_lines_and_detects_eof() {
        let mut console = Console::new(Cursor::new("hello\r\n\nlast"), Vec::new());
        assert_eq!(console.ask("> ").unwrap().as_deref(), Some("hello"));
        assert_eq!(console.ask("> ").unwrap().as_deref(), Some(""));
        assert_eq!(console.ask("> ").unwrap().as_deref(), Some("last"));
        assert_eq!(console.ask("> ").unwrap(), None);
        let out = String::from_utf8(console.into_output()).unwrap();
        assert_eq!(out, "> > > > ");
    }
}
