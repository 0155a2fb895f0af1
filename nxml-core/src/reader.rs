//! # Leitores de Entrada
//!
//! - [`Nxml2TxtReader`]: encontra os pares `artigo.txt` + `artigo.so` produzidos pelo
//!   conversor NXML→texto (recursivamente, a partir de um diretório de entrada).
//! - [`BiocReader`]: encontra documentos BioC já serializados (`.xml` / `.json`).
//! - [`ExistingOutputs`]: identificadores já presentes no diretório de saída, para que um
//!   lote interrompido possa ser retomado sem reprocessar o que já foi escrito.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::bioc::{read_document, BiocDocument, BiocFormat};
use crate::error::{NxmlError, Result};

/// Extensões consideradas ao varrer o diretório de saída.
const OUTPUT_EXTENSIONS: &[&str] = &["xml", "txt", "json", "tsv"];

/// Prefixo do nome do arquivo até o primeiro `_` ou `.`: `"12345_filtered.json"` → `"12345"`.
fn id_prefix(file_name: &str) -> Option<&str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"^(.*?)[_.]").expect("regex válida"));
    re.captures(file_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Lista recursivamente os arquivos com alguma das extensões, em ordem estável.
fn list_files(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
            {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Identificadores que já têm saída escrita.
#[derive(Debug, Clone, Default)]
pub struct ExistingOutputs {
    ids: HashSet<String>,
}

impl ExistingOutputs {
    /// Varre `output_dir`, criando-o se ainda não existir.
    pub fn scan(output_dir: &Path) -> Result<Self> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir)?;
        }
        let ids = list_files(output_dir, OUTPUT_EXTENSIONS)?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .filter_map(id_prefix)
            .map(str::to_string)
            .collect();
        Ok(Self { ids })
    }

    pub fn contains(&self, id: &str) -> bool {
        !id.is_empty() && self.ids.contains(id)
    }

    pub fn insert(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Um par de arquivos companheiros descoberto no diretório de entrada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub txt_path: PathBuf,
    pub so_path: PathBuf,
    /// Caminho do `.txt` relativo ao diretório de entrada.
    pub relative_path: String,
    /// Prefixo do nome do arquivo; nomeia a saída quando o documento não tem pmid.
    pub stem: String,
}

/// Conteúdo bruto de um artigo, pronto para montagem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArticle {
    pub text: String,
    pub records: String,
    pub relative_path: String,
}

impl DocumentSource {
    /// Lê os dois arquivos sem nenhuma transformação (offsets dependem disso).
    pub fn read(&self) -> Result<RawArticle> {
        if !self.so_path.exists() {
            return Err(NxmlError::MissingCompanionFile(self.so_path.clone()));
        }
        Ok(RawArticle {
            text: fs::read_to_string(&self.txt_path)?,
            records: fs::read_to_string(&self.so_path)?,
            relative_path: self.relative_path.clone(),
        })
    }
}

/// Descobre os pares `.txt`/`.so` sob um diretório.
pub struct Nxml2TxtReader {
    input_dir: PathBuf,
}

impl Nxml2TxtReader {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self { input_dir: input_dir.into() }
    }

    /// Um item por artigo. Arquivos sem companheiro viram `MissingCompanionFile`
    /// para que o chamador registre e siga adiante.
    pub fn discover(&self) -> Result<Vec<Result<DocumentSource>>> {
        let files = list_files(&self.input_dir, &["txt", "so"])?;
        let present: HashSet<&PathBuf> = files.iter().collect();
        let mut sources = Vec::new();

        for path in &files {
            match path.extension().and_then(|e| e.to_str()) {
                Some("txt") => {
                    let so_path = path.with_extension("so");
                    if !present.contains(&so_path) {
                        sources.push(Err(NxmlError::MissingCompanionFile(so_path)));
                        continue;
                    }
                    sources.push(Ok(self.source_for(path, so_path)));
                }
                Some("so") => {
                    let txt_path = path.with_extension("txt");
                    if !present.contains(&txt_path) {
                        sources.push(Err(NxmlError::MissingCompanionFile(txt_path)));
                    }
                }
                _ => {}
            }
        }
        debug!("{} artigos descobertos em {}", sources.len(), self.input_dir.display());
        Ok(sources)
    }

    fn source_for(&self, txt_path: &Path, so_path: PathBuf) -> DocumentSource {
        let relative_path = txt_path
            .strip_prefix(&self.input_dir)
            .unwrap_or(txt_path)
            .to_string_lossy()
            .replace('\\', "/");
        let file_name = txt_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = id_prefix(&file_name).unwrap_or(&file_name).to_string();
        DocumentSource {
            txt_path: txt_path.to_path_buf(),
            so_path,
            relative_path,
            stem,
        }
    }
}

/// Descobre e lê documentos BioC de um diretório.
pub struct BiocReader {
    input_dir: PathBuf,
    format: BiocFormat,
}

impl BiocReader {
    pub fn new(input_dir: impl Into<PathBuf>, format: BiocFormat) -> Self {
        Self { input_dir: input_dir.into(), format }
    }

    /// Arquivos com a extensão do formato configurado.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        Ok(list_files(&self.input_dir, &[self.format.extension()])?)
    }

    pub fn read(&self, path: &Path) -> Result<BiocDocument> {
        read_document(path, self.format)
    }
}
