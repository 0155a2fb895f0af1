//! # Montador de Documentos
//!
//! Consome a sequência ordenada de [`SpanRecord`]s de um artigo e muta a casca do
//! [`Document`] numa **única passada da esquerda para a direita**, sem retrocesso.
//!
//! ## Despacho
//!
//! | balde                     | ação                                                        |
//! |---------------------------|-------------------------------------------------------------|
//! | `Container(kind)`         | anexa `Passage(kind, begin, end, {type})`                   |
//! | `Formatting(kind)`        | anexa `Annotation(kind, {type}, [Location(begin, end-begin)])` |
//! | `ArticleId`               | mescla `{valor_de_codes: texto, type: article-id}` nos infons; pmid define o id |
//! | `Other(_)`                | ignorado                                                    |
//!
//! Cada registro carrega seus próprios offsets absolutos, então passagens e anotações
//! são anexadas na ordem de chegada. A hierarquia é reconstruída depois, por contenção
//! de intervalos (ver [`region`](crate::region)).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Annotation, Document, Passage};
use crate::error::{NxmlError, Result};
use crate::record::{RecordType, SpanRecord};

/// O que um registro produziu no documento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Passage,
    Annotation,
    Identifier,
    Ignored,
}

/// Contadores da montagem de um documento.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub passages: usize,
    pub annotations: usize,
    pub identifiers: usize,
    /// Registros com tipo fora dos baldes conhecidos.
    pub ignored: usize,
    /// Registros rejeitados (span inválido ou `article-id` sem `chave=valor`).
    pub invalid: usize,
}

impl AssemblyStats {
    /// Pelo menos uma passagem contêiner foi anexada.
    pub fn is_well_formed(&self) -> bool {
        self.passages > 0
    }
}

/// Acumulador de uma montagem em andamento.
///
/// Detém o `&mut Document` durante toda a passada; ao terminar ([`Assembler::finish`])
/// o documento volta a ser somente leitura para o resto do pipeline.
pub struct Assembler<'a> {
    document: &'a mut Document,
    char_len: usize,
    stats: AssemblyStats,
}

impl<'a> Assembler<'a> {
    pub fn new(document: &'a mut Document) -> Self {
        let char_len = document.char_len();
        Self {
            document,
            char_len,
            stats: AssemblyStats::default(),
        }
    }

    /// Aplica um registro. Erros são por registro: o chamador pode seguir adiante.
    pub fn push(&mut self, record: &SpanRecord) -> Result<Applied> {
        match &record.kind {
            RecordType::Other(_) => {
                self.stats.ignored += 1;
                Ok(Applied::Ignored)
            }
            RecordType::Container(kind) => {
                self.check_span(record)?;
                self.document
                    .passages
                    .push(Passage::new(*kind, record.begin, record.end, &record.type_name));
                self.stats.passages += 1;
                Ok(Applied::Passage)
            }
            RecordType::Formatting(kind) => {
                self.check_span(record)?;
                self.document
                    .annotations
                    .push(Annotation::new(*kind, record.begin, record.end));
                self.stats.annotations += 1;
                Ok(Applied::Annotation)
            }
            RecordType::ArticleId => {
                self.check_span(record)?;
                self.merge_identifier(record)
            }
        }
    }

    fn check_span(&mut self, record: &SpanRecord) -> Result<()> {
        if record.begin > record.end || record.end > self.char_len {
            self.stats.invalid += 1;
            return Err(NxmlError::InvalidSpan {
                begin: record.begin,
                end: record.end,
                len: self.char_len,
            });
        }
        Ok(())
    }

    /// `codes` tem a forma `pub-id-type=pmid`; o **valor** vira a chave do infon.
    fn merge_identifier(&mut self, record: &SpanRecord) -> Result<Applied> {
        let key = match record.codes.split('=').nth(1) {
            Some(key) if !key.is_empty() => key,
            _ => {
                self.stats.invalid += 1;
                return Err(NxmlError::MalformedRecord {
                    line: 0,
                    reason: format!(
                        "article-id {} sem 'chave=valor' em codes: {:?}",
                        record.id, record.codes
                    ),
                });
            }
        };

        let infons = &mut self.document.infons;
        infons.insert(key.to_string(), record.text.clone());
        infons.insert("type".to_string(), "article-id".to_string());
        if key.contains("pmid") {
            self.document.id = record.text.clone();
        }
        self.stats.identifiers += 1;
        Ok(Applied::Identifier)
    }

    pub fn stats(&self) -> AssemblyStats {
        self.stats
    }

    pub fn finish(self) -> AssemblyStats {
        self.stats
    }
}

/// Monta o documento a partir de todos os registros, recuperando erros por registro.
pub fn assemble<'r, I>(document: &mut Document, records: I) -> AssemblyStats
where
    I: IntoIterator<Item = &'r SpanRecord>,
{
    let mut assembler = Assembler::new(document);
    for record in records {
        if let Err(e) = assembler.push(record) {
            debug!("registro {} descartado: {}", record.id, e);
        }
    }
    assembler.finish()
}
