//! Chunk progress display

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over chunks; hidden unless status display was requested
#[derive(Debug, Clone)]
pub struct ChunkProgress {
    bar: ProgressBar,
}

impl ChunkProgress {
    pub fn new(total: usize, visible: bool) -> Self {
        if !visible {
            return Self::hidden();
        }

        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta}) {msg}")
        {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn advance(&self, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_still_counts() {
        let progress = ChunkProgress::new(3, false);
        progress.advance("ZJets");
        progress.advance("Data");
        assert_eq!(progress.position(), 2);
        progress.finish("done");
    }
}
