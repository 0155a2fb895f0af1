//! # Erros do pipeline NXML
//!
//! Taxonomia de falhas. Os erros por registro (`MalformedRecord`, `InvalidSpan`)
//! são recuperados localmente pelo parser e pelo montador; os erros por documento
//! (`MissingCompanionFile`, `UnsupportedSerializationFormat`) abortam apenas aquele
//! documento, nunca o lote inteiro.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NxmlError {
    /// Linha do arquivo `.so` que não segue `id \t "tipo início fim" \t [texto] \t [códigos]`.
    #[error("registro malformado na linha {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// Span com `begin > end` ou fora dos limites do texto.
    #[error("span inválido [{begin}, {end}) para texto de {len} caracteres")]
    InvalidSpan { begin: usize, end: usize, len: usize },

    /// Arquivo de texto sem o `.so` correspondente (ou vice-versa).
    #[error("arquivo companheiro ausente: {}", .0.display())]
    MissingCompanionFile(PathBuf),

    /// Formato de serialização diferente de `xml` ou `json`.
    #[error("formato de serialização não suportado: {0} (use xml ou json)")]
    UnsupportedSerializationFormat(String),

    #[error("erro de I/O: {0}")]
    Io(#[from] io::Error),

    #[error("erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("erro de XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Entrada bem formada mas que não descreve um documento BioC.
    #[error("documento BioC inválido: {0}")]
    InvalidBioc(String),
}

pub type Result<T> = std::result::Result<T, NxmlError>;
