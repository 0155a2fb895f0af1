//! # Classificador de Regiões
//!
//! Decide, a partir das passagens montadas, se um span está numa região **legível**
//! (front, abstract, body, ref-list) e/ou numa região **flutuante** (caption, fig).
//!
//! Um span se qualifica apenas por contenção total num contêiner do tipo certo;
//! sobreposição parcial não conta. As duas respostas são independentes: uma legenda
//! dentro do body é legível e flutuante ao mesmo tempo, e quem combina as duas é o
//! [`SentenceFilter`](crate::filter::SentenceFilter).

use serde::{Deserialize, Serialize};

use crate::document::{Document, Passage};

/// Veredito do classificador para um span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub readable: bool,
    pub float: bool,
}

/// Predicados de região sobre as passagens de um documento. Varredura linear por consulta.
pub struct RegionClassifier<'a> {
    passages: &'a [Passage],
}

impl<'a> RegionClassifier<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { passages: &document.passages }
    }

    pub fn readable_passages(&self) -> impl Iterator<Item = &'a Passage> + 'a {
        let passages = self.passages;
        passages.iter().filter(|p| p.kind.is_readable())
    }

    pub fn float_passages(&self) -> impl Iterator<Item = &'a Passage> + 'a {
        let passages = self.passages;
        passages.iter().filter(|p| p.kind.is_float())
    }

    pub fn is_readable(&self, begin: usize, end: usize) -> bool {
        self.readable_passages().any(|p| p.contains_span(begin, end))
    }

    pub fn is_float(&self, begin: usize, end: usize) -> bool {
        self.float_passages().any(|p| p.contains_span(begin, end))
    }

    pub fn region(&self, begin: usize, end: usize) -> Region {
        Region {
            readable: self.is_readable(begin, end),
            float: self.is_float(begin, end),
        }
    }
}
