//! Per-persona conversational memory: an append-only plain-text file.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only memory file for one persona, at `<dir>/<persona>.txt`.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    /// Open the memory file for `persona`, creating the directory and an empty
    /// file if they do not exist yet.
    pub fn open(dir: impl AsRef<Path>, persona: &str) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create memory directory {}", dir.display()))?;

        let path = dir.join(format!("{persona}.txt"));
        if !path.exists() {
            std::fs::File::create(&path)
                .with_context(|| format!("failed to create memory file {}", path.display()))?;
            tracing::info!(path = %path.display(), "created empty memory file");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entire memory text.
    pub fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read memory file {}", self.path.display()))
    }

    /// Memory text bounded to the last `max_chars` characters, cut forward to
    /// the next line start so no entry begins mid-line. `0` means unbounded.
    pub fn read_recent(&self, max_chars: usize) -> Result<String> {
        let memory = self.read()?;
        Ok(tail_chars(&memory, max_chars).to_string())
    }

    /// Append one confirmed exchange.
    pub fn append_exchange(&self, question: &str, response: &str) -> Result<()> {
        let entry = format_entry(question, response);
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open memory file {}", self.path.display()))?;
        file.write_all(entry.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), bytes = entry.len(), "memory appended");
        Ok(())
    }
}

/// The exact text appended for one exchange.
pub fn format_entry(question: &str, response: &str) -> String {
    format!("\n[Question] {question}\n[Response] {response}\n")
}

/// Start of every entry written by [`format_entry`].
const ENTRY_MARKER: &str = "\n[Question] ";

/// Last `max_chars` characters, advanced to the first whole entry. Text
/// without entry markers is advanced to the next line instead.
fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return text;
    }
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(total - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[start..];
    let at_line_start = text[..start].ends_with('\n');
    if at_line_start && tail.starts_with(&ENTRY_MARKER[1..]) {
        return tail;
    }
    if let Some(at) = tail.find(ENTRY_MARKER) {
        return &tail[at..];
    }
    match tail.find('\n') {
        Some(nl) if start > 0 && !text[..start].ends_with('\n') => &tail[nl..],
        _ => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_empty_file() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path().join("memory"), "general").unwrap();
        assert!(store.path().exists());
        assert!(store.path().ends_with("general.txt"));
        assert_eq!(store.read().unwrap(), "");
    }

    #[test]
    fn open_keeps_existing_content() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("general.txt"), "old notes").unwrap();
        let store = MemoryStore::open(tmp.path(), "general").unwrap();
        assert_eq!(store.read().unwrap(), "old notes");
    }

    #[test]
    fn append_adds_exact_entry() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path(), "general").unwrap();
        std::fs::write(store.path(), "seed").unwrap();

        store.append_exchange("Q", "R").unwrap();

        assert_eq!(store.read().unwrap(), "seed\n[Question] Q\n[Response] R\n");
    }

    #[test]
    fn tail_unbounded_and_short_text() {
        assert_eq!(tail_chars("abc", 0), "abc");
        assert_eq!(tail_chars("abc", 10), "abc");
    }

    #[test]
    fn tail_starts_on_line_boundary() {
        let text = "first line\nsecond line\nthird";
        let tail = tail_chars(text, 14);
        assert_eq!(tail, "\nthird");
    }

    #[test]
    fn tail_starts_at_whole_entry() {
        let text = [
            format_entry("first dream?", "a house\nwith many rooms"),
            format_entry("second dream?", "a river\nthen a bridge\nthen the sea"),
            format_entry("third dream?", "a tower"),
        ]
        .concat();
        let third = format_entry("third dream?", "a tower");
        // Cut in the middle of the second response.
        let max = third.chars().count() + 12;

        let tail = tail_chars(&text, max);
        assert_eq!(tail, third);
        assert!(tail.starts_with("\n[Question] "));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "记忆\n梦境分析";
        let tail = tail_chars(text, 5);
        assert_eq!(tail, "\n梦境分析");
    }
}
