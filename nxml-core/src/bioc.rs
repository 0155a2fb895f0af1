//! # Serialização BioC (XML e JSON)
//!
//! Formato de intercâmbio para persistir e recarregar um documento montado junto com o
//! seu índice de sentenças. [`BiocDocument`] é a visão serializável de
//! ([`Document`], [`SentenceIndex`]); todos os campos do modelo são preservados e o tipo
//! da passagem/anotação é recuperado de `infons.type` na leitura.
//!
//! ## Formato XML
//!
//! ```xml
//! <collection>
//!   <source>nxml2txt</source>
//!   <document>
//!     <id>12345</id>
//!     <infon key="pmid">12345</infon>
//!     <text>...</text>
//!     <passage><infon key="type">body</infon><offset>13</offset><length>4</length></passage>
//!     <annotation><infon key="type">italic</infon><location offset="37" length="6"/></annotation>
//!     <sentence><offset>0</offset><length>5</length></sentence>
//!   </document>
//! </collection>
//! ```
//!
//! Também é lido o BioC padrão (ex: PMC), em que o documento não tem `<text>`: cada
//! passagem traz o próprio `<text>`, sentenças e anotações vêm aninhadas nela e o
//! `<length>` pode faltar. O texto do documento é recomposto pelos offsets das passagens.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{
    Annotation, Document, FormatKind, Infons, Location, Passage, PassageKind, Sentence,
    SentenceIndex,
};
use crate::error::{NxmlError, Result};

/// Formatos de intercâmbio suportados.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiocFormat {
    Xml,
    #[default]
    Json,
}

impl BiocFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            BiocFormat::Xml => "xml",
            BiocFormat::Json => "json",
        }
    }

    /// Deduz o formato pela extensão do arquivo.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        ext.parse()
    }
}

impl FromStr for BiocFormat {
    type Err = NxmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(BiocFormat::Xml),
            "json" => Ok(BiocFormat::Json),
            _ => Err(NxmlError::UnsupportedSerializationFormat(s.to_string())),
        }
    }
}

impl fmt::Display for BiocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Passagem BioC. Na saída própria traz `length`; no BioC padrão traz `text` e o
/// comprimento é derivado dele.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiocPassage {
    #[serde(default)]
    pub infons: Infons,
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Sentenças aninhadas (BioC padrão).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sentences: Vec<BiocSentence>,
    /// Anotações aninhadas (BioC padrão).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<BiocAnnotation>,
}

impl BiocPassage {
    /// `length` explícito ou, na falta dele, o número de caracteres de `text`.
    pub fn length(&self) -> usize {
        self.length.unwrap_or_else(|| char_count(self.text.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiocAnnotation {
    #[serde(default)]
    pub infons: Infons,
    #[serde(default)]
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiocSentence {
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl BiocSentence {
    pub fn length(&self) -> usize {
        self.length.unwrap_or_else(|| char_count(self.text.as_deref()))
    }
}

fn char_count(text: Option<&str>) -> usize {
    text.map_or(0, |t| t.chars().count())
}

/// Maior intervalo entre passagens preenchido com espaços ao recompor o texto.
const MAX_GAP: usize = 1 << 16;

/// Documento BioC: documento montado + sentenças sobreviventes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiocDocument {
    pub id: String,
    #[serde(default)]
    pub infons: Infons,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub passages: Vec<BiocPassage>,
    #[serde(default)]
    pub annotations: Vec<BiocAnnotation>,
    #[serde(default)]
    pub sentences: Vec<BiocSentence>,
}

impl BiocDocument {
    pub fn from_parts(document: &Document, sentences: &SentenceIndex) -> Self {
        Self {
            id: document.id.clone(),
            infons: document.infons.clone(),
            text: document.text.clone(),
            passages: document
                .passages
                .iter()
                .map(|p| BiocPassage {
                    infons: p.infons.clone(),
                    offset: p.begin,
                    length: Some(p.len()),
                    ..Default::default()
                })
                .collect(),
            annotations: document
                .annotations
                .iter()
                .map(|a| BiocAnnotation {
                    infons: a.infons.clone(),
                    locations: a.locations.clone(),
                })
                .collect(),
            sentences: sentences
                .iter()
                .map(|s| BiocSentence {
                    offset: s.begin,
                    length: Some(s.end - s.begin),
                    text: None,
                })
                .collect(),
        }
    }

    /// Reconstrói o modelo.
    ///
    /// Sentenças e anotações aninhadas em passagens são achatadas no nível do documento.
    /// Sem texto no documento, ele é recomposto a partir dos textos das passagens.
    /// Falha se algum `infons.type` de passagem for desconhecido ou se algum span
    /// ultrapassar o texto. Anotações de tipo desconhecido são ignoradas.
    pub fn into_parts(self) -> Result<(Document, SentenceIndex)> {
        let text = if self.text.is_empty() {
            rebuild_text(&self.passages)?
        } else {
            self.text
        };
        let mut document = Document::new(text);
        document.id = self.id;
        document.infons = self.infons;
        let char_len = document.char_len();

        let mut annotations = self.annotations;
        let mut sentences = self.sentences;

        for p in self.passages {
            let type_name = p.infons.get("type").map(String::as_str).unwrap_or_default();
            let kind = PassageKind::from_record_type(type_name).ok_or_else(|| {
                NxmlError::InvalidBioc(format!("passagem com tipo desconhecido: {type_name:?}"))
            })?;
            let end = span_end(p.offset, p.length(), char_len)?;
            annotations.extend(p.annotations);
            sentences.extend(p.sentences);
            document.passages.push(Passage {
                kind,
                begin: p.offset,
                end,
                infons: p.infons,
            });
        }

        for a in annotations {
            let type_name = a.infons.get("type").map(String::as_str).unwrap_or_default();
            let Some(kind) = FormatKind::from_record_type(type_name) else {
                debug!("anotação com tipo {:?} ignorada", type_name);
                continue;
            };
            for loc in &a.locations {
                span_end(loc.offset, loc.length, char_len)?;
            }
            document.annotations.push(Annotation {
                kind,
                infons: a.infons,
                locations: a.locations,
            });
        }

        let sentences = sentences
            .into_iter()
            .map(|s| -> Result<Sentence> {
                Ok(Sentence::new(s.offset, span_end(s.offset, s.length(), char_len)?))
            })
            .collect::<Result<SentenceIndex>>()?;
        Ok((document, sentences))
    }
}

/// Fim do span `[offset, offset + length)`, se couber em `char_len`.
fn span_end(offset: usize, length: usize, char_len: usize) -> Result<usize> {
    match offset.checked_add(length) {
        Some(end) if end <= char_len => Ok(end),
        _ => Err(NxmlError::InvalidSpan {
            begin: offset,
            end: offset.saturating_add(length),
            len: char_len,
        }),
    }
}

/// Texto do documento a partir das passagens, com espaços nos intervalos entre offsets.
fn rebuild_text(passages: &[BiocPassage]) -> Result<String> {
    let mut ordered: Vec<(usize, &str)> = passages
        .iter()
        .filter_map(|p| p.text.as_deref().map(|t| (p.offset, t)))
        .collect();
    ordered.sort_by_key(|(offset, _)| *offset);

    let mut text = String::new();
    let mut len = 0;
    for (offset, passage_text) in ordered {
        if offset < len {
            return Err(NxmlError::InvalidBioc(format!(
                "passagem no offset {offset} sobrepõe a anterior (fim em {len})"
            )));
        }
        let gap = offset - len;
        if gap > MAX_GAP {
            return Err(NxmlError::InvalidBioc(format!(
                "intervalo de {gap} caracteres antes da passagem no offset {offset}"
            )));
        }
        text.extend(std::iter::repeat(' ').take(gap));
        text.push_str(passage_text);
        len = offset + passage_text.chars().count();
    }
    Ok(text)
}

pub fn encode(document: &BiocDocument, format: BiocFormat) -> Result<String> {
    match format {
        BiocFormat::Json => Ok(serde_json::to_string_pretty(document)?),
        BiocFormat::Xml => to_xml(document),
    }
}

pub fn decode(content: &str, format: BiocFormat) -> Result<BiocDocument> {
    match format {
        BiocFormat::Json => Ok(serde_json::from_str(content)?),
        BiocFormat::Xml => from_xml(content),
    }
}

pub fn write_document(path: &Path, document: &BiocDocument, format: BiocFormat) -> Result<()> {
    fs::write(path, encode(document, format)?)?;
    Ok(())
}

pub fn read_document(path: &Path, format: BiocFormat) -> Result<BiocDocument> {
    let content = fs::read_to_string(path)?;
    decode(&content, format)
}

// === XML ===

fn to_xml(document: &BiocDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("collection")))?;
    leaf(&mut writer, "source", "nxml2txt")?;
    writer.write_event(Event::Start(BytesStart::new("document")))?;

    leaf(&mut writer, "id", &document.id)?;
    infons(&mut writer, &document.infons)?;
    leaf(&mut writer, "text", &document.text)?;

    for p in &document.passages {
        writer.write_event(Event::Start(BytesStart::new("passage")))?;
        infons(&mut writer, &p.infons)?;
        leaf(&mut writer, "offset", &p.offset.to_string())?;
        if let Some(length) = p.length {
            leaf(&mut writer, "length", &length.to_string())?;
        }
        if let Some(text) = &p.text {
            leaf(&mut writer, "text", text)?;
        }
        for s in &p.sentences {
            sentence(&mut writer, s)?;
        }
        for a in &p.annotations {
            annotation(&mut writer, a)?;
        }
        writer.write_event(Event::End(BytesEnd::new("passage")))?;
    }

    for a in &document.annotations {
        annotation(&mut writer, a)?;
    }

    for s in &document.sentences {
        sentence(&mut writer, s)?;
    }

    writer.write_event(Event::End(BytesEnd::new("document")))?;
    writer.write_event(Event::End(BytesEnd::new("collection")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| NxmlError::InvalidBioc(format!("XML gerado não é UTF-8: {e}")))
}

fn leaf(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn infons(writer: &mut Writer<Vec<u8>>, infons: &Infons) -> Result<()> {
    for (key, value) in infons {
        writer
            .create_element("infon")
            .with_attribute(("key", key.as_str()))
            .write_text_content(BytesText::new(value))?;
    }
    Ok(())
}

fn annotation(writer: &mut Writer<Vec<u8>>, a: &BiocAnnotation) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("annotation")))?;
    infons(writer, &a.infons)?;
    for loc in &a.locations {
        let offset = loc.offset.to_string();
        let length = loc.length.to_string();
        writer
            .create_element("location")
            .with_attributes([("offset", offset.as_str()), ("length", length.as_str())])
            .write_empty()?;
    }
    writer.write_event(Event::End(BytesEnd::new("annotation")))?;
    Ok(())
}

fn sentence(writer: &mut Writer<Vec<u8>>, s: &BiocSentence) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("sentence")))?;
    leaf(writer, "offset", &s.offset.to_string())?;
    if let Some(length) = s.length {
        leaf(writer, "length", &length.to_string())?;
    }
    if let Some(text) = &s.text {
        leaf(writer, "text", text)?;
    }
    writer.write_event(Event::End(BytesEnd::new("sentence")))?;
    Ok(())
}

/// Lê o primeiro `<document>` do XML.
fn from_xml(content: &str) -> Result<BiocDocument> {
    let mut reader = Reader::from_str(content);

    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut infon_key: Option<String> = None;

    let mut document: Option<BiocDocument> = None;
    let mut passage: Option<BiocPassage> = None;
    let mut annotation: Option<BiocAnnotation> = None;
    let mut sentence: Option<BiocSentence> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "document" => document = Some(BiocDocument::default()),
                    "passage" => passage = Some(BiocPassage::default()),
                    "annotation" => annotation = Some(BiocAnnotation::default()),
                    "sentence" => sentence = Some(BiocSentence::default()),
                    "infon" => infon_key = Some(attribute(&e, b"key")?.unwrap_or_default()),
                    "location" => push_location(&e, annotation.as_mut())?,
                    _ => {}
                }
                text.clear();
                stack.push(name);
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"location" => push_location(&e, annotation.as_mut())?,
                b"infon" => {
                    let key = attribute(&e, b"key")?.unwrap_or_default();
                    let parent = stack.last().map(String::as_str).unwrap_or_default();
                    let target = infon_target(parent, &mut document, &mut passage, &mut annotation);
                    if let Some(infons) = target {
                        infons.insert(key, String::new());
                    }
                }
                _ => {}
            },
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    return Err(NxmlError::InvalidBioc("tag de fechamento sem abertura".into()));
                };
                let parent = stack.last().map(String::as_str).unwrap_or_default();
                let value = std::mem::take(&mut text);

                match (name.as_str(), parent) {
                    ("id", "document") => {
                        if let Some(doc) = document.as_mut() {
                            doc.id = value;
                        }
                    }
                    ("text", "document") => {
                        if let Some(doc) = document.as_mut() {
                            doc.text = value;
                        }
                    }
                    ("infon", _) => {
                        let key = infon_key.take().unwrap_or_default();
                        let target = infon_target(parent, &mut document, &mut passage, &mut annotation);
                        if let Some(infons) = target {
                            infons.insert(key, value);
                        }
                    }
                    ("offset", "passage") => {
                        if let Some(p) = passage.as_mut() {
                            p.offset = parse_number("offset", &value)?;
                        }
                    }
                    ("length", "passage") => {
                        if let Some(p) = passage.as_mut() {
                            p.length = Some(parse_number("length", &value)?);
                        }
                    }
                    ("text", "passage") => {
                        if let Some(p) = passage.as_mut() {
                            p.text = Some(value);
                        }
                    }
                    ("offset", "sentence") => {
                        if let Some(s) = sentence.as_mut() {
                            s.offset = parse_number("offset", &value)?;
                        }
                    }
                    ("length", "sentence") => {
                        if let Some(s) = sentence.as_mut() {
                            s.length = Some(parse_number("length", &value)?);
                        }
                    }
                    ("text", "sentence") => {
                        if let Some(s) = sentence.as_mut() {
                            s.text = Some(value);
                        }
                    }
                    ("passage", _) => {
                        if let (Some(doc), Some(p)) = (document.as_mut(), passage.take()) {
                            doc.passages.push(p);
                        }
                    }
                    ("annotation", _) => {
                        if let Some(a) = annotation.take() {
                            match (passage.as_mut(), document.as_mut()) {
                                (Some(p), _) => p.annotations.push(a),
                                (None, Some(doc)) => doc.annotations.push(a),
                                (None, None) => {}
                            }
                        }
                    }
                    ("sentence", _) => {
                        if let Some(s) = sentence.take() {
                            match (passage.as_mut(), document.as_mut()) {
                                (Some(p), _) => p.sentences.push(s),
                                (None, Some(doc)) => doc.sentences.push(s),
                                (None, None) => {}
                            }
                        }
                    }
                    ("document", _) => break,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    document.ok_or_else(|| NxmlError::InvalidBioc("nenhum elemento <document> encontrado".into()))
}

/// Infons do elemento que contém o `<infon>`. Infons de sentenças e relações são descartados.
fn infon_target<'a>(
    parent: &str,
    document: &'a mut Option<BiocDocument>,
    passage: &'a mut Option<BiocPassage>,
    annotation: &'a mut Option<BiocAnnotation>,
) -> Option<&'a mut Infons> {
    match parent {
        "annotation" => annotation.as_mut().map(|a| &mut a.infons),
        "passage" => passage.as_mut().map(|p| &mut p.infons),
        "document" => document.as_mut().map(|d| &mut d.infons),
        _ => None,
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn push_location(e: &BytesStart<'_>, annotation: Option<&mut BiocAnnotation>) -> Result<()> {
    let offset = attribute(e, b"offset")?.unwrap_or_default();
    let length = attribute(e, b"length")?.unwrap_or_default();
    let location = Location {
        offset: parse_number("offset", &offset)?,
        length: parse_number("length", &length)?,
    };
    if let Some(a) = annotation {
        a.locations.push(location);
    }
    Ok(())
}

fn parse_number(field: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| NxmlError::InvalidBioc(format!("{field} não numérico: {value:?}")))
}
