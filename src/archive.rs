//! Writes prompt/response pairs to timestamped markdown files for later review.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Archives exchanges under one directory as `<category>_<YYYYMMDD_HHMMSS>.md`.
#[derive(Debug, Clone)]
pub struct Archiver {
    dir: PathBuf,
}

impl Archiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive one exchange stamped with the current local time.
    pub fn archive(&self, prompt: &str, response: &str, category: &str) -> Result<PathBuf> {
        self.archive_at(prompt, response, category, Local::now().naive_local())
    }

    /// Archive with an explicit timestamp. A second exchange in the same
    /// second gets a `_1`, `_2`, ... suffix instead of overwriting the first.
    pub fn archive_at(
        &self,
        prompt: &str,
        response: &str,
        category: &str,
        at: NaiveDateTime,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create archive directory {}", self.dir.display()))?;

        let stem = format!("{category}_{}", at.format("%Y%m%d_%H%M%S"));
        let path = self.free_path(&stem);

        std::fs::write(&path, render(prompt, response))
            .with_context(|| format!("failed to write archive file {}", path.display()))?;
        tracing::info!(path = %path.display(), category, "exchange archived");
        Ok(path)
    }

    fn free_path(&self, stem: &str) -> PathBuf {
        let first = self.dir.join(format!("{stem}.md"));
        if !first.exists() {
            return first;
        }
        (1u32..)
            .map(|n| self.dir.join(format!("{stem}_{n}.md")))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

fn render(prompt: &str, response: &str) -> String {
    format!("=== 📝 PROMPT ===\n{prompt}\n\n=== 🧠 RESPONSE ===\n{response}")
}
