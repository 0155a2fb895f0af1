//! # nxml-core: Montagem e Filtragem de Artigos Convertidos de NXML
//!
//! Este crate transforma a saída do conversor NXML→texto (um `.txt` com o texto puro do
//! artigo e um `.so` com os registros de span) em documentos estruturados, e descarta as
//! sentenças que não pertencem ao conteúdo legível do artigo (título, resumo, corpo,
//! referências).
//!
//! ## Arquitetura do Sistema
//!
//! O dado flui em estágios, cada um consumindo a saída do anterior:
//!
//! 1.  **Registros** ([`record`]): cada linha do `.so` vira um [`SpanRecord`] tipado.
//! 2.  **Montagem** ([`assembler`]): os registros viram passagens, anotações de formatação
//!     e identificadores do [`Document`].
//! 3.  **Segmentação** ([`segmenter`]): o texto é dividido em sentenças candidatas.
//! 4.  **Regiões** ([`region`]): cada span é classificado como legível e/ou flutuante
//!     (legendas e figuras).
//! 5.  **Filtragem** ([`filter`]): o [`SentenceFilter`] remove as sentenças fora das regiões mantidas.
//! 6.  **Saída** ([`bioc`]): o documento final é gravado em BioC XML ou JSON.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use nxml_core::{NxmlPipeline, PipelineConfig};
//!
//! let text = "A title\nBody sentence.\nFigure 1 caption.";
//! let records = "T1\tfront 0 7\t\nT2\tbody 8 22\t\nT3\tcaption 23 40\t";
//!
//! let pipeline = NxmlPipeline::new(PipelineConfig::default());
//! let result = pipeline.process(text, records);
//!
//! // front e body ficam; a legenda não é conteúdo legível
//! assert_eq!(result.sentences.len(), 2);
//! assert_eq!(result.sentences.as_slice()[1].begin, 8);
//! ```
//!
//! ## Módulos Principais
//!
//! - [`pipeline`]: Orquestrador que conecta todos os estágios e processa lotes em paralelo.
//! - [`reader`]: Descoberta dos arquivos de entrada e retomada de lotes.
//! - [`config`]: Configuração carregada de JSON.

pub mod assembler;
pub mod bioc;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod region;
pub mod segmenter;

pub use assembler::{assemble, Assembler, AssemblyStats};
pub use bioc::{BiocDocument, BiocFormat};
pub use config::PipelineConfig;
pub use document::{Annotation, Document, FormatKind, Passage, PassageKind, Sentence, SentenceIndex};
pub use error::{NxmlError, Result};
pub use filter::{FilterConfig, FilterOutcome, SentenceFilter};
pub use pipeline::{BatchSummary, NxmlPipeline, PipelineEvent, ProcessedDocument};
pub use reader::{BiocReader, ExistingOutputs, Nxml2TxtReader};
pub use record::{parse_records, SpanRecord};
pub use region::{Region, RegionClassifier};
pub use segmenter::{segment, SegmenterMode};
