//! # Filtro de Sentenças
//!
//! Remove do índice de sentenças tudo o que não está nas regiões "legíveis" do artigo
//! (e, opcionalmente, nas caixas flutuantes).
//!
//! ## Algoritmo
//! 1. Documento sentinela (`id == skip_id`): nada a fazer, o índice passa intacto.
//! 2. Calcula a máscara de manutenção como função pura ([`SentenceFilter::keep_mask`]):
//!    `legível(s)`, ou `legível(s) || flutuante(s)` quando `keep_floats`.
//! 3. Só então aplica as remoções, numa segunda passada sobre o índice.
//!
//! Sentenças que não estão cobertas pelo span do documento (`[0, len]`) não fazem
//! parte da visão deste documento e não são removidas.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, SentenceIndex};
use crate::region::RegionClassifier;

/// Id reservado que marca um documento para passar sem filtragem.
pub const DEFAULT_SKIP_ID: &str = "skip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Mantém também as sentenças de legendas e figuras.
    pub keep_floats: bool,
    pub skip_id: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keep_floats: false,
            skip_id: DEFAULT_SKIP_ID.to_string(),
        }
    }
}

/// Resultado de uma filtragem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FilterOutcome {
    /// Documento sentinela; o índice não foi tocado.
    Skipped,
    Filtered { kept: usize, dropped: usize },
}

pub struct SentenceFilter {
    config: FilterConfig,
}

impl SentenceFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn is_skipped(&self, document: &Document) -> bool {
        document.id == self.config.skip_id
    }

    /// `true` na posição de cada sentença que deve ser mantida. Não muta nada.
    pub fn keep_mask(&self, document: &Document, sentences: &SentenceIndex) -> Vec<bool> {
        let regions = RegionClassifier::new(document);
        sentences
            .iter()
            .map(|s| {
                regions.is_readable(s.begin, s.end)
                    || (self.config.keep_floats && regions.is_float(s.begin, s.end))
            })
            .collect()
    }

    /// Aplica o filtro ao índice de sentenças do documento.
    pub fn apply(&self, document: &Document, sentences: &mut SentenceIndex) -> FilterOutcome {
        if self.is_skipped(document) {
            debug!("documento '{}' marcado para pular a filtragem", document.id);
            return FilterOutcome::Skipped;
        }

        let keep = self.keep_mask(document, sentences);
        let doc_len = document.char_len();
        let drop: Vec<bool> = sentences
            .iter()
            .zip(&keep)
            .map(|(s, &kept)| !kept && s.end <= doc_len)
            .collect();

        let dropped = sentences.remove_marked(&drop);
        let kept = sentences.len();
        debug!(
            "documento '{}': {} sentenças mantidas, {} removidas",
            document.id, kept, dropped
        );
        FilterOutcome::Filtered { kept, dropped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::document::{Passage, PassageKind, Sentence};
    use crate::record::parse_records;

    fn scenario() -> (Document, SentenceIndex) {
        let text = "TITLEABSTRACTBODYFIG";
        let so = "T1\tfront 0 5\t\nT2\tabstract 5 13\t\nT3\tbody 13 17\t\nT4\tfig 17 20\t";
        let mut doc = Document::new(text);
        assemble(&mut doc, &parse_records(so).records);
        let sentences = SentenceIndex::new(vec![
            Sentence::new(0, 5),
            Sentence::new(5, 13),
            Sentence::new(13, 17),
            Sentence::new(17, 20),
        ]);
        (doc, sentences)
    }

    fn filter(keep_floats: bool) -> SentenceFilter {
        SentenceFilter::new(FilterConfig { keep_floats, ..FilterConfig::default() })
    }

    #[test]
    fn test_end_to_end_without_floats() {
        let (doc, mut sentences) = scenario();
        let outcome = filter(false).apply(&doc, &mut sentences);
        assert_eq!(outcome, FilterOutcome::Filtered { kept: 3, dropped: 1 });
        assert_eq!(
            sentences.as_slice(),
            &[Sentence::new(0, 5), Sentence::new(5, 13), Sentence::new(13, 17)]
        );
    }

    #[test]
    fn test_end_to_end_with_floats() {
        let (doc, mut sentences) = scenario();
        let outcome = filter(true).apply(&doc, &mut sentences);
        assert_eq!(outcome, FilterOutcome::Filtered { kept: 4, dropped: 0 });
        assert_eq!(sentences.len(), 4);
    }

    #[test]
    fn test_skip_sentinel_leaves_index_untouched() {
        let (mut doc, sentences) = scenario();
        doc.id = DEFAULT_SKIP_ID.to_string();
        doc.passages.clear();
        let mut index = sentences.clone();
        let outcome = filter(false).apply(&doc, &mut index);
        assert_eq!(outcome, FilterOutcome::Skipped);
        assert_eq!(index, sentences);
    }

    #[test]
    fn test_partial_overlap_is_dropped() {
        let mut doc = Document::new("0123456789");
        doc.passages.push(Passage::new(PassageKind::Body, 2, 8, "body"));
        let mut index = SentenceIndex::new(vec![Sentence::new(0, 4), Sentence::new(3, 6)]);
        filter(false).apply(&doc, &mut index);
        assert_eq!(index.as_slice(), &[Sentence::new(3, 6)]);
    }

    #[test]
    fn test_keep_mask_is_pure() {
        let (doc, sentences) = scenario();
        let before = sentences.clone();
        let mask = filter(false).keep_mask(&doc, &sentences);
        assert_eq!(mask, vec![true, true, true, false]);
        assert_eq!(sentences, before);
    }

    #[test]
    fn test_sentences_outside_document_span_are_untouched() {
        let mut doc = Document::new("abc");
        doc.passages.push(Passage::new(PassageKind::Body, 0, 3, "body"));
        let mut index = SentenceIndex::new(vec![Sentence::new(0, 3), Sentence::new(2, 9)]);
        let outcome = filter(false).apply(&doc, &mut index);
        assert_eq!(outcome, FilterOutcome::Filtered { kept: 2, dropped: 0 });
    }

    #[test]
    fn test_empty_inputs() {
        let doc = Document::new("");
        let mut index = SentenceIndex::default();
        let outcome = filter(true).apply(&doc, &mut index);
        assert_eq!(outcome, FilterOutcome::Filtered { kept: 0, dropped: 0 });

        let mut doc = Document::new("texto sem passagens");
        doc.id = "123".into();
        let mut index = SentenceIndex::new(vec![Sentence::new(0, 5)]);
        filter(false).apply(&doc, &mut index);
        assert!(index.is_empty());
    }
}
