//! # Parser de Registros de Offset (`.so`)
//!
//! Cada linha do arquivo companheiro descreve um span tipado do texto bruto:
//!
//! ```text
//! id \t "tipo início fim" \t [texto] \t [códigos]
//! ```
//!
//! O tipo é resolvido **uma única vez**, aqui, para o enum fechado [`RecordType`]. O
//! montador despacha por `match` sobre esse enum em vez de comparar strings repetidamente.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use nxml_core::record::{parse_record, RecordType};
//! use nxml_core::document::PassageKind;
//!
//! let rec = parse_record("T1\tsec 10 42\t", 1).unwrap();
//! assert_eq!(rec.kind, RecordType::Container(PassageKind::Section));
//! assert_eq!((rec.begin, rec.end), (10, 42));
//! assert_eq!(rec.text, "");
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{FormatKind, PassageKind};
use crate::error::{NxmlError, Result};

/// Balde de tipo de um registro, resolvido no parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "bucket", content = "kind", rename_all = "snake_case")]
pub enum RecordType {
    /// Seções de alto nível e subestruturas: viram [`Passage`](crate::document::Passage).
    Container(PassageKind),
    /// Formatação inline: vira [`Annotation`](crate::document::Annotation).
    Formatting(FormatKind),
    /// Identificador do artigo (pmid, pmc, doi...), mesclado nos infons do documento.
    ArticleId,
    /// Qualquer outro tipo. Ignorado na montagem.
    Other(String),
}

impl RecordType {
    pub fn resolve(token: &str) -> Self {
        if let Some(kind) = PassageKind::from_record_type(token) {
            return RecordType::Container(kind);
        }
        if let Some(kind) = FormatKind::from_record_type(token) {
            return RecordType::Formatting(kind);
        }
        if token == "article-id" {
            return RecordType::ArticleId;
        }
        RecordType::Other(token.to_string())
    }
}

/// Um registro já validado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub id: String,
    pub kind: RecordType,
    /// Token de tipo exatamente como veio no arquivo (vai para `infons.type`).
    pub type_name: String,
    pub begin: usize,
    pub end: usize,
    pub text: String,
    pub codes: String,
}

/// Faz o parse de uma linha. `line_no` é usado apenas nas mensagens de erro.
pub fn parse_record(line: &str, line_no: usize) -> Result<SpanRecord> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return Err(malformed(line_no, "menos de 3 campos separados por tab"));
    }

    let type_offsets: Vec<&str> = fields[1].split_whitespace().collect();
    let [type_name, begin, end] = type_offsets.as_slice() else {
        return Err(malformed(
            line_no,
            format!("segundo campo não é 'tipo início fim': {:?}", fields[1]),
        ));
    };

    let begin: usize = begin
        .parse()
        .map_err(|_| malformed(line_no, format!("início não numérico: {begin:?}")))?;
    let end: usize = end
        .parse()
        .map_err(|_| malformed(line_no, format!("fim não numérico: {end:?}")))?;

    Ok(SpanRecord {
        id: fields[0].to_string(),
        kind: RecordType::resolve(type_name),
        type_name: type_name.to_string(),
        begin,
        end,
        text: fields[2].to_string(),
        codes: fields.get(3).map(|s| s.to_string()).unwrap_or_default(),
    })
}

fn malformed(line: usize, reason: impl Into<String>) -> NxmlError {
    NxmlError::MalformedRecord { line, reason: reason.into() }
}

/// Resultado do parse de um arquivo `.so` inteiro.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecords {
    /// Registros válidos, na ordem do arquivo.
    pub records: Vec<SpanRecord>,
    /// Linhas descartadas por estarem malformadas.
    pub malformed: usize,
}

/// Faz o parse de todas as linhas, pulando (e contando) as malformadas.
/// Linhas vazias não contam como malformadas.
pub fn parse_records(content: &str) -> ParsedRecords {
    let mut parsed = ParsedRecords::default();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(line, i + 1) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                debug!("{}", e);
                parsed.malformed += 1;
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_record() {
        let rec = parse_record("T7\tarticle-id 0 0\t12345678\tpub-id-type=pmid", 1).unwrap();
        assert_eq!(rec.id, "T7");
        assert_eq!(rec.kind, RecordType::ArticleId);
        assert_eq!(rec.type_name, "article-id");
        assert_eq!(rec.text, "12345678");
        assert_eq!(rec.codes, "pub-id-type=pmid");
    }

    #[test]
    fn test_parse_defaults() {
        let rec = parse_record("T1\tp 5 9\t", 1).unwrap();
        assert_eq!(rec.kind, RecordType::Container(PassageKind::Paragraph));
        assert_eq!(rec.text, "");
        assert_eq!(rec.codes, "");
    }

    #[test]
    fn test_resolve_buckets() {
        assert_eq!(RecordType::resolve("italic"), RecordType::Formatting(FormatKind::Italic));
        assert_eq!(RecordType::resolve("ref-list"), RecordType::Container(PassageKind::RefList));
        assert_eq!(RecordType::resolve("xref"), RecordType::Other("xref".to_string()));
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_record("T1", 1).is_err());
        assert!(parse_record("T1\tsec 1 2", 2).is_err());
        assert!(parse_record("T1\tsec 1\tx", 2).is_err());
        assert!(parse_record("T1\tsec 1 2 3\tx", 3).is_err());
        assert!(parse_record("T1\tsec a 2\tx", 4).is_err());
        assert!(parse_record("T1\tsec -1 2\tx", 5).is_err());
        match parse_record("T1\tbody", 9) {
            Err(NxmlError::MalformedRecord { line, .. }) => assert_eq!(line, 9),
            other => panic!("esperava MalformedRecord, obteve {:?}", other),
        }
    }

    #[test]
    fn test_crlf_is_stripped() {
        let rec = parse_record("T1\tbold 1 4\tabc\r", 1).unwrap();
        assert_eq!(rec.text, "abc");
    }

    #[test]
    fn test_parse_records_skips_malformed() {
        let content = "T1\tfront 0 5\tTITLE\nlixo\n\nT2\tbody 5 10\tBODY.\n";
        let parsed = parse_records(content);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.malformed, 1);
        assert_eq!(parsed.records[1].type_name, "body");
    }
}
