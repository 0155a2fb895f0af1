//! # Modelo de Documento
//!
//! Representação estruturada de um artigo científico reconstruída a partir da lista
//! plana de spans produzida pelo conversor NXML→texto.
//!
//! ## Árvore implícita
//!
//! Os [`Passage`]s ficam numa lista plana, na ordem de chegada. Não existem ponteiros
//! pai/filho: uma passagem B está aninhada em A se e somente se
//! `A.begin <= B.begin && B.end <= A.end`. A consulta de contenção é feita sob demanda
//! (ver [`Passage::contains`]), o que mantém o modelo como uma arena de registros por valor.
//!
//! ## Offsets
//!
//! Todos os offsets são em **caracteres** (escalares Unicode) do texto original, intervalos
//! semiabertos `[begin, end)`. Use [`Document::slice`] para recuperar o texto de um span.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadados livres chave→valor (ordenados, para comparação e serialização determinísticas).
pub type Infons = BTreeMap<String, String>;

/// Tipos de passagem (contêiner) reconhecidos.
///
/// As quatro primeiras formam a região "legível" do artigo; `Caption` e `Figure`
/// formam a região "flutuante".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassageKind {
    Front,
    Abstract,
    Body,
    RefList,
    Title,
    Subtitle,
    Section,
    Paragraph,
    Caption,
    Figure,
}

impl PassageKind {
    /// Resolve o token de tipo do arquivo `.so` (ex: `"sec"`, `"p"`, `"fig"`).
    pub fn from_record_type(s: &str) -> Option<Self> {
        match s {
            "front" => Some(PassageKind::Front),
            "abstract" => Some(PassageKind::Abstract),
            "body" => Some(PassageKind::Body),
            "ref-list" => Some(PassageKind::RefList),
            "title" => Some(PassageKind::Title),
            "subtitle" => Some(PassageKind::Subtitle),
            "sec" | "section" => Some(PassageKind::Section),
            "p" => Some(PassageKind::Paragraph),
            "caption" => Some(PassageKind::Caption),
            "fig" => Some(PassageKind::Figure),
            _ => None,
        }
    }

    /// Token canônico usado no arquivo `.so`.
    pub fn record_type(&self) -> &'static str {
        match self {
            PassageKind::Front => "front",
            PassageKind::Abstract => "abstract",
            PassageKind::Body => "body",
            PassageKind::RefList => "ref-list",
            PassageKind::Title => "title",
            PassageKind::Subtitle => "subtitle",
            PassageKind::Section => "sec",
            PassageKind::Paragraph => "p",
            PassageKind::Caption => "caption",
            PassageKind::Figure => "fig",
        }
    }

    /// Front, abstract, body e lista de referências.
    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            PassageKind::Front | PassageKind::Abstract | PassageKind::Body | PassageKind::RefList
        )
    }

    /// Legendas e figuras (caixas flutuantes).
    pub fn is_float(&self) -> bool {
        matches!(self, PassageKind::Caption | PassageKind::Figure)
    }
}

/// Formatação inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Bold,
    Italic,
    Subscript,
    Superscript,
}

impl FormatKind {
    pub fn from_record_type(s: &str) -> Option<Self> {
        match s {
            "bold" => Some(FormatKind::Bold),
            "italic" => Some(FormatKind::Italic),
            "sub" => Some(FormatKind::Subscript),
            "sup" => Some(FormatKind::Superscript),
            _ => None,
        }
    }

    pub fn record_type(&self) -> &'static str {
        match self {
            FormatKind::Bold => "bold",
            FormatKind::Italic => "italic",
            FormatKind::Subscript => "sub",
            FormatKind::Superscript => "sup",
        }
    }
}

/// Um span contêiner do documento (seção, parágrafo, título, legenda...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub kind: PassageKind,
    /// Offset inicial em caracteres (inclusivo).
    pub begin: usize,
    /// Offset final em caracteres (exclusivo).
    pub end: usize,
    /// Carrega ao menos `type` com o token original do registro.
    pub infons: Infons,
}

impl Passage {
    pub fn new(kind: PassageKind, begin: usize, end: usize, record_type: &str) -> Self {
        let mut infons = Infons::new();
        infons.insert("type".to_string(), record_type.to_string());
        Self { kind, begin, end, infons }
    }

    /// `[begin, end)` está inteiramente dentro desta passagem.
    pub fn contains_span(&self, begin: usize, end: usize) -> bool {
        self.begin <= begin && end <= self.end
    }

    /// Aninhamento implícito: `other` está contida nesta passagem.
    pub fn contains(&self, other: &Passage) -> bool {
        self.contains_span(other.begin, other.end)
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Sub-span coberto por uma anotação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub offset: usize,
    pub length: usize,
}

impl Location {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Anotação de formatação inline (negrito, itálico, sub/sobrescrito).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: FormatKind,
    pub infons: Infons,
    pub locations: Vec<Location>,
}

impl Annotation {
    pub fn new(kind: FormatKind, begin: usize, end: usize) -> Self {
        let mut infons = Infons::new();
        infons.insert("type".to_string(), kind.record_type().to_string());
        Self {
            kind,
            infons,
            locations: vec![Location { offset: begin, length: end - begin }],
        }
    }
}

/// Um artigo.
///
/// Criado uma vez por par de arquivos, mutado apenas pelo
/// [`Assembler`](crate::assembler::Assembler) e somente lido depois disso.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Vazio até que um `article-id` do tipo pmid seja montado.
    pub id: String,
    pub text: String,
    pub infons: Infons,
    pub passages: Vec<Passage>,
    pub annotations: Vec<Annotation>,
}

impl Document {
    /// Casca vazia: id indefinido, texto carregado, sem passagens nem anotações.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            infons: Infons::new(),
            passages: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Tamanho do texto em caracteres (limite superior dos offsets).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Texto do span `[begin, end)` em caracteres. Retorna `None` fora dos limites.
    pub fn slice(&self, begin: usize, end: usize) -> Option<&str> {
        if begin > end {
            return None;
        }
        let start = char_to_byte(&self.text, begin)?;
        let stop = char_to_byte(&self.text, end)?;
        Some(&self.text[start..stop])
    }

    pub fn infon(&self, key: &str) -> Option<&str> {
        self.infons.get(key).map(String::as_str)
    }
}

/// Converte um offset em caracteres para o índice de byte correspondente.
pub(crate) fn char_to_byte(text: &str, char_offset: usize) -> Option<usize> {
    if char_offset == 0 {
        return Some(0);
    }
    match text.char_indices().nth(char_offset) {
        Some((byte, _)) => Some(byte),
        None if text.chars().count() == char_offset => Some(text.len()),
        None => None,
    }
}

/// Sentença candidata produzida pelo segmentador externo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sentence {
    pub begin: usize,
    pub end: usize,
}

impl Sentence {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }
}

/// Índice de sentenças de um documento.
///
/// Não pertence ao [`Document`]: o filtro apenas lê as sentenças e remove as que
/// não se qualificam.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentenceIndex {
    sentences: Vec<Sentence>,
}

impl SentenceIndex {
    pub fn new(sentences: Vec<Sentence>) -> Self {
        Self { sentences }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sentence> {
        self.sentences.iter()
    }

    pub fn as_slice(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn push(&mut self, sentence: Sentence) {
        self.sentences.push(sentence);
    }

    /// Remove as sentenças cuja posição está marcada em `drop`. `drop` deve ter o mesmo
    /// tamanho do índice; posições excedentes são mantidas.
    pub(crate) fn remove_marked(&mut self, drop: &[bool]) -> usize {
        let before = self.sentences.len();
        let mut marks = drop.iter();
        self.sentences
            .retain(|_| !marks.next().copied().unwrap_or(false));
        before - self.sentences.len()
    }
}

impl<'a> IntoIterator for &'a SentenceIndex {
    type Item = &'a Sentence;
    type IntoIter = std::slice::Iter<'a, Sentence>;

    fn into_iter(self) -> Self::IntoIter {
        self.sentences.iter()
    }
}

impl FromIterator<Sentence> for SentenceIndex {
    fn from_iter<I: IntoIterator<Item = Sentence>>(iter: I) -> Self {
        Self { sentences: iter.into_iter().collect() }
    }
}
