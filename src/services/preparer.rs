//! Turns raw documents into embeddable fragments.

use crate::error::ValidationError;
use crate::models::{Document, Fragment, IngestionConfig};
use crate::utils::{has_meaningful_content, strip_markup};

/// Normalizes and splits documents ahead of embedding.
///
/// Fragments are bounded by a character budget so each one fits the embedding
/// service's input limit; long documents are split at natural break points
/// with a small overlap between consecutive fragments.
#[derive(Debug, Clone)]
pub struct TextPreparer {
    max_fragment_chars: usize,
    overlap: usize,
}

impl TextPreparer {
    /// Create a new preparer with the given configuration.
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            max_fragment_chars: config.max_fragment_chars.max(1),
            overlap: config.fragment_overlap,
        }
    }

    /// Create a preparer with default settings.
    pub fn with_defaults() -> Self {
        Self::new(&IngestionConfig::default())
    }

    /// Prepare a document for embedding.
    ///
    /// Returns `ValidationError` for documents with missing fields or no
    /// meaningful content after markup stripping; callers skip those and
    /// report them in the run summary.
    pub fn prepare(&self, document: &Document) -> Result<Vec<Fragment>, ValidationError> {
        if document.id.trim().is_empty() {
            return Err(ValidationError {
                id: document.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        if document.reference.trim().is_empty() {
            return Err(ValidationError {
                id: document.id.clone(),
                reason: "empty reference".to_string(),
            });
        }

        let cleaned = strip_markup(&document.text);
        if !has_meaningful_content(&cleaned) {
            return Err(ValidationError {
                id: document.id.clone(),
                reason: "no meaningful content".to_string(),
            });
        }

        let fragments = self
            .split(&cleaned)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Fragment::new(document, index as u32, text))
            .collect();

        Ok(fragments)
    }

    /// Split cleaned text into fragments of at most `max_fragment_chars`.
    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total <= self.max_fragment_chars {
            return vec![text.to_string()];
        }

        let mut fragments = Vec::new();
        let mut start = 0;

        while start < total {
            let end = (start + self.max_fragment_chars).min(total);
            let adjusted_end = self.find_break_point(&chars, end, total);

            let fragment: String = chars[start..adjusted_end].iter().collect();
            if has_meaningful_content(&fragment) {
                fragments.push(fragment.trim().to_string());
            }

            if adjusted_end >= total {
                break;
            }

            // Resume from where this fragment actually ended, minus the
            // overlap, so text after an early break point is never skipped.
            // `find_break_point` always returns a position past `start`, and
            // the clamp keeps the window moving even with a large overlap.
            start = adjusted_end
                .saturating_sub(self.overlap)
                .clamp(start + 1, adjusted_end);
        }

        fragments
    }

    /// Find a natural break point near the target end position.
    fn find_break_point(&self, chars: &[char], target_end: usize, total: usize) -> usize {
        if target_end >= total {
            return total;
        }

        // Look for a break within the last 20% of the fragment
        let search_start = target_end.saturating_sub(self.max_fragment_chars / 5);
        let search_range = &chars[search_start..target_end];

        // Priority: paragraph break > newline > sentence end > space
        let mut best_break = None;
        let mut last_newline = None;
        let mut last_sentence = None;
        let mut last_space = None;

        for (i, c) in search_range.iter().enumerate() {
            let pos = search_start + i;
            match c {
                '\n' => {
                    if i > 0 && search_range.get(i.saturating_sub(1)) == Some(&'\n') {
                        best_break = Some(pos + 1);
                    }
                    last_newline = Some(pos + 1);
                }
                '.' | '!' | '?' => {
                    if search_range.get(i + 1).is_some_and(|c| c.is_whitespace()) {
                        last_sentence = Some(pos + 1);
                    }
                }
                ' ' | '\t' => {
                    last_space = Some(pos + 1);
                }
                _ => {}
            }
        }

        best_break
            .or(last_newline)
            .or(last_sentence)
            .or(last_space)
            .unwrap_or(target_end)
    }
}
