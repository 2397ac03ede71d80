//! Splits an LLM token stream into complete sentences for TTS submission.
//!
//! Sentence-terminal punctuation covers both ASCII (`.`, `!`, `?`) and
//! Chinese full-width forms (`。`, `！`, `？`, `…`), with a whitespace
//! fallback so a very long clause without punctuation still yields a
//! sentence rather than buffering forever.

const TERMINALS: &[char] = &['.', '!', '?', '。', '！', '？', '…'];
const WHITESPACE_FALLBACK_CHARS: usize = 120;

#[derive(Default)]
pub struct SentenceAccumulator {
    buf: String,
}

impl SentenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next text chunk; returns zero or more completed sentences
    /// in emission order.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();

        loop {
            match self.find_boundary() {
                Some(idx) => {
                    let sentence: String = self.buf.drain(..idx).collect();
                    let sentence = sentence.trim().to_string();
                    if !sentence.is_empty() {
                        out.push(sentence);
                    }
                }
                None => break,
            }
        }
        out
    }

    /// Flush whatever remains as a final sentence (called at LLM stream end).
    pub fn finish(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buf);
        let trimmed = remainder.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn find_boundary(&self) -> Option<usize> {
        if let Some((idx, ch)) = self
            .buf
            .char_indices()
            .find(|(_, c)| TERMINALS.contains(c))
        {
            return Some(idx + ch.len_utf8());
        }
        if self.buf.chars().count() >= WHITESPACE_FALLBACK_CHARS {
            if let Some(idx) = self.buf.rfind(char::is_whitespace) {
                return Some(idx + 1);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_ascii_terminal_punctuation() {
        let mut acc = SentenceAccumulator::new();
        let sentences = acc.push("Hello there. How are you");
        assert_eq!(sentences, vec!["Hello there."]);
        assert_eq!(acc.finish(), Some("How are you".to_string()));
    }

    #[test]
    fn splits_on_chinese_terminal_punctuation() {
        let mut acc = SentenceAccumulator::new();
        let sentences = acc.push("你好吗？还好");
        assert_eq!(sentences, vec!["你好吗？"]);
        assert_eq!(acc.finish(), Some("还好".to_string()));
    }

    #[test]
    fn accumulates_across_multiple_pushes() {
        let mut acc = SentenceAccumulator::new();
        assert!(acc.push("Hel").is_empty());
        assert!(acc.push("lo wor").is_empty());
        let sentences = acc.push("ld!");
        assert_eq!(sentences, vec!["Hello world!"]);
    }

    #[test]
    fn finish_on_empty_buffer_returns_none() {
        let mut acc = SentenceAccumulator::new();
        acc.push("Done.");
        acc.finish();
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn whitespace_fallback_bounds_unterminated_clauses() {
        let mut acc = SentenceAccumulator::new();
        let long_clause = "word ".repeat(30);
        let sentences = acc.push(&long_clause);
        assert!(!sentences.is_empty());
        assert!(sentences[0].len() <= long_clause.len());
    }

    #[test]
    fn multiple_terminals_in_one_chunk_yield_multiple_sentences() {
        let mut acc = SentenceAccumulator::new();
        let sentences = acc.push("One. Two! Three?");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
    }
}
