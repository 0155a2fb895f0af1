//! # Segmentador de Sentenças
//!
//! Produz as sentenças candidatas sobre `Document.text`. Cada sentença guarda seus
//! offsets em **caracteres** no texto original, os mesmos usados pelos registros `.so`,
//! para que o filtro compare spans diretamente.
//!
//! ## Modos
//!
//! - **Unicode**: limites de sentença do UAX #29 (`unicode-segmentation`), com espaços
//!   aparados e junção de falsos limites após abreviações científicas ("Fig.", "et al.").
//! - **Line**: cada linha não vazia é uma sentença. Útil para textos já pré-segmentados.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use nxml_core::segmenter::{segment, SegmenterMode};
//!
//! let index = segment("As shown in Fig. 2, cells grew. Growth stopped.", SegmenterMode::Unicode);
//! assert_eq!(index.len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::document::{Sentence, SentenceIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterMode {
    #[default]
    Unicode,
    Line,
}

/// Abreviações comuns em artigos científicos que não encerram sentença.
const ABBREVIATIONS: &[&str] = &[
    "fig.", "figs.", "al.", "e.g.", "i.e.", "vs.", "cf.", "ca.", "approx.", "dr.",
    "prof.", "ref.", "refs.", "no.", "eq.", "eqs.", "tab.", "sect.", "vol.", "pp.",
    "resp.", "suppl.", "sp.", "spp.",
];

/// Segmenta o texto no modo indicado.
pub fn segment(text: &str, mode: SegmenterMode) -> SentenceIndex {
    let spans = match mode {
        SegmenterMode::Unicode => unicode_spans(text),
        SegmenterMode::Line => line_spans(text),
    };

    let mut cursor = CharCursor::new(text);
    spans
        .into_iter()
        .map(|(start, end)| {
            let begin = cursor.advance_to(start);
            let end = cursor.advance_to(end);
            Sentence::new(begin, end)
        })
        .collect()
}

/// Spans em bytes, já aparados, dos limites UAX #29.
fn unicode_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for (start, raw) in text.split_sentence_bound_indices() {
        let Some((start, end)) = trim_span(start, raw) else {
            continue;
        };

        if let Some(last) = spans.last_mut() {
            let gap = &text[last.1..start];
            if !gap.contains('\n') && ends_with_abbreviation(&text[last.0..last.1]) {
                last.1 = end;
                continue;
            }
        }
        spans.push((start, end));
    }
    spans
}

fn line_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if let Some(span) = trim_span(offset, line) {
            spans.push(span);
        }
        offset += line.len();
    }
    spans
}

/// Remove espaços das bordas; `None` se não sobrar nada.
fn trim_span(start: usize, raw: &str) -> Option<(usize, usize)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = raw.len() - raw.trim_start().len();
    Some((start + lead, start + lead + trimmed.len()))
}

fn ends_with_abbreviation(sentence: &str) -> bool {
    let Some(last_word) = sentence.split_whitespace().last() else {
        return false;
    };
    let last_word = last_word.trim_start_matches(|c: char| c == '(' || c == '[');
    let lower = last_word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Converte offsets de byte crescentes em offsets de caractere sem reescanear o texto.
struct CharCursor<'t> {
    text: &'t str,
    byte: usize,
    chars: usize,
}

impl<'t> CharCursor<'t> {
    fn new(text: &'t str) -> Self {
        Self { text, byte: 0, chars: 0 }
    }

    fn advance_to(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            // fora de ordem: recomeça do início
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(text: &'a str, index: &SentenceIndex) -> Vec<&'a str> {
        index
            .iter()
            .map(|s| {
                let start = text.char_indices().nth(s.begin).map(|(b, _)| b).unwrap_or(text.len());
                let end = text.char_indices().nth(s.end).map(|(b, _)| b).unwrap_or(text.len());
                &text[start..end]
            })
            .collect()
    }

    #[test]
    fn test_unicode_basic() {
        let text = "Cells were grown. They divided rapidly.";
        let index = segment(text, SegmenterMode::Unicode);
        assert_eq!(texts(text, &index), vec!["Cells were grown.", "They divided rapidly."]);
        assert_eq!(index.as_slice()[1], Sentence::new(18, 39));
    }

    #[test]
    fn test_abbreviation_merge() {
        let text = "This was reported by Smith et al. The result held.";
        let index = segment(text, SegmenterMode::Unicode);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_newline_breaks_sentences() {
        let text = "Introduction\nWe study proteins.\n\nMethods\nWe used mice.";
        let index = segment(text, SegmenterMode::Unicode);
        assert_eq!(
            texts(text, &index),
            vec!["Introduction", "We study proteins.", "Methods", "We used mice."]
        );
    }

    #[test]
    fn test_char_offsets_with_multibyte() {
        let text = "Über α-Zellen. Zweiter Satz.";
        let index = segment(text, SegmenterMode::Unicode);
        assert_eq!(index.len(), 2);
        assert_eq!(index.as_slice()[0], Sentence::new(0, 14));
        assert_eq!(index.as_slice()[1], Sentence::new(15, 28));
    }

    #[test]
    fn test_line_mode() {
        let text = "  first line  \n\nsecond line\n";
        let index = segment(text, SegmenterMode::Line);
        assert_eq!(texts(text, &index), vec!["first line", "second line"]);
        assert_eq!(index.as_slice()[0], Sentence::new(2, 12));
    }

    #[test]
    fn test_empty_text() {
        assert!(segment("", SegmenterMode::Unicode).is_empty());
        assert!(segment("   \n ", SegmenterMode::Line).is_empty());
    }
}
