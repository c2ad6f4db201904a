//! Running transcript of a conversation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Model,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => f.write_str("You"),
            Speaker::Model => f.write_str("AI"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub at: SystemTime,
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

/// Ordered log of transcript lines. Kept across sessions of one controller.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line. Blank text is ignored; returns the stored entry otherwise.
    pub fn push(&mut self, speaker: Speaker, text: &str) -> Option<&TranscriptEntry> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.to_string(),
            at: SystemTime::now(),
        });
        self.entries.last()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Lines formatted as `You: …` / `AI: …`, one per line.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Speaker::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::from_str::<Speaker>("\"model\"").unwrap(),
            Speaker::Model
        );
    }

    #[test]
    fn test_push_trims_and_skips_blank_lines() {
        let mut transcript = Transcript::new();
        assert!(transcript.push(Speaker::User, "   ").is_none());
        let entry = transcript.push(Speaker::User, "  hello  ").unwrap();
        assert_eq!(entry.text, "hello");
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn test_render_prefixes_speaker() {
        let mut transcript = Transcript::new();
        transcript.push(Speaker::User, "What is ISO 9001?");
        transcript.push(Speaker::Model, "A quality management standard.");
        assert_eq!(
            transcript.render(),
            "You: What is ISO 9001?\nAI: A quality management standard."
        );
    }
}
