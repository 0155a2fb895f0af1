//! # Pipeline NXML: Orquestrador com Eventos Observáveis
//!
//! Conecta os estágios de um documento (parse dos registros → montagem → segmentação →
//! classificação de regiões → filtragem) e emite um [`PipelineEvent`] a cada passo via
//! canal (`mpsc`), permitindo que o servidor WebSocket transmita o progresso em tempo real.
//!
//! Para lotes, [`NxmlPipeline::run_batch`] processa documentos independentes em paralelo
//! com o `rayon`: cada worker é dono exclusivo do seu [`Document`], sem estado mutável
//! compartilhado entre documentos.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex, PoisonError};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assembler::{assemble, AssemblyStats};
use crate::bioc::{write_document, BiocDocument};
use crate::config::PipelineConfig;
use crate::document::{Document, SentenceIndex};
use crate::error::{NxmlError, Result};
use crate::filter::{FilterOutcome, SentenceFilter};
use crate::reader::{BiocReader, DocumentSource, ExistingOutputs, Nxml2TxtReader, RawArticle};
use crate::record::parse_records;
use crate::region::{Region, RegionClassifier};
use crate::segmenter::segment;

/// Intervalo de documentos entre mensagens de progresso no lote.
const PROGRESS_EVERY: usize = 1000;

/// Eventos emitidos durante o processamento de um documento.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// **Passo 1**: arquivo `.so` lido; linhas malformadas foram puladas.
    RecordsParsed { total: usize, malformed: usize },
    /// **Passo 2**: documento montado.
    DocumentAssembled {
        id: String,
        stats: AssemblyStats,
    },
    /// **Passo 3**: sentenças candidatas produzidas pelo segmentador.
    SegmentationDone { total: usize },
    /// **Passo 4**: veredito de uma sentença.
    SentenceClassified {
        index: usize,
        begin: usize,
        end: usize,
        region: Region,
        kept: bool,
    },
    /// Documento sentinela: a filtragem foi pulada.
    Skipped { id: String },
    /// **Conclusão**: documento final e estatísticas.
    Done {
        result: ProcessedDocument,
        processing_ms: u64,
    },
    /// **Falha**: erro irrecuperável para este documento.
    Error { message: String },
}

/// Resultado do processamento de um documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub document: Document,
    /// Sentenças que sobreviveram ao filtro.
    pub sentences: SentenceIndex,
    pub assembly: AssemblyStats,
    pub malformed: usize,
    pub outcome: FilterOutcome,
}

impl ProcessedDocument {
    pub fn to_bioc(&self) -> BiocDocument {
        BiocDocument::from_parts(&self.document, &self.sentences)
    }
}

/// Contadores de um lote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    /// Saída já existente (retomada).
    pub skipped_existing: usize,
    /// Arquivo companheiro ausente.
    pub skipped_missing: usize,
    /// Outro documento do mesmo lote já gravou a mesma saída.
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub sentences_kept: usize,
    pub sentences_dropped: usize,
    pub malformed_records: usize,
}

impl BatchSummary {
    fn merge(mut self, other: BatchSummary) -> BatchSummary {
        self.processed += other.processed;
        self.skipped_existing += other.skipped_existing;
        self.skipped_missing += other.skipped_missing;
        self.skipped_duplicate += other.skipped_duplicate;
        self.failed += other.failed;
        self.sentences_kept += other.sentences_kept;
        self.sentences_dropped += other.sentences_dropped;
        self.malformed_records += other.malformed_records;
        self
    }
}

/// O pipeline principal.
///
/// # Modos de Uso
/// - **Sync**: [`process`](NxmlPipeline::process) para chamadas diretas.
/// - **Streaming**: [`process_streaming`](NxmlPipeline::process_streaming) para UIs reativas.
/// - **Lote**: [`run_batch`](NxmlPipeline::run_batch) e
///   [`run_bioc_batch`](NxmlPipeline::run_bioc_batch) para diretórios inteiros.
pub struct NxmlPipeline {
    config: PipelineConfig,
    filter: SentenceFilter,
}

impl NxmlPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let filter = SentenceFilter::new(config.filter_config());
        Self { config, filter }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processa um artigo de forma síncrona.
    pub fn process(&self, text: &str, records: &str) -> ProcessedDocument {
        let (tx, rx) = mpsc::channel();
        self.process_streaming(text, records, tx);
        rx.into_iter()
            .find_map(|event| match event {
                PipelineEvent::Done { result, .. } => Some(result),
                _ => None,
            })
            .unwrap_or_else(|| self.run(Document::new(text), records, None))
    }

    /// Executa o pipeline enviando eventos de progresso pelo canal `tx`.
    ///
    /// # Fluxo de Eventos
    /// 1. `RecordsParsed`
    /// 2. `DocumentAssembled`
    /// 3. `SegmentationDone`
    /// 4. `SentenceClassified` (uma por sentença) ou `Skipped` para o sentinela
    /// 5. `Done`
    pub fn process_streaming(&self, text: &str, records: &str, tx: mpsc::Sender<PipelineEvent>) {
        let start = Instant::now();
        let result = self.run(Document::new(text), records, Some(&tx));
        let _ = tx.send(PipelineEvent::Done {
            result,
            processing_ms: start.elapsed().as_millis() as u64,
        });
    }

    /// Processa um artigo lido do disco, registrando o caminho relativo nos infons.
    pub fn process_article(&self, article: &RawArticle) -> ProcessedDocument {
        let mut document = Document::new(article.text.as_str());
        document
            .infons
            .insert("relative-source-path".to_string(), article.relative_path.clone());
        self.run(document, &article.records, None)
    }

    /// Filtra um documento já montado (ex: lido de BioC). Sem sentenças, segmenta o texto.
    pub fn filter_loaded(&self, document: Document, mut sentences: SentenceIndex) -> ProcessedDocument {
        if sentences.is_empty() {
            sentences = segment(&document.text, self.config.segmenter);
        }
        let outcome = self.filter.apply(&document, &mut sentences);
        ProcessedDocument {
            document,
            sentences,
            assembly: AssemblyStats::default(),
            malformed: 0,
            outcome,
        }
    }

    fn run(
        &self,
        mut document: Document,
        records: &str,
        tx: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> ProcessedDocument {
        let emit = |event: PipelineEvent| {
            if let Some(tx) = tx {
                let _ = tx.send(event);
            }
        };

        // === Passo 1: Registros ===
        let parsed = parse_records(records);
        emit(PipelineEvent::RecordsParsed {
            total: parsed.records.len(),
            malformed: parsed.malformed,
        });

        // === Passo 2: Montagem ===
        let assembly = assemble(&mut document, &parsed.records);
        emit(PipelineEvent::DocumentAssembled {
            id: document.id.clone(),
            stats: assembly,
        });

        // === Passo 3: Segmentação ===
        let mut sentences = segment(&document.text, self.config.segmenter);
        emit(PipelineEvent::SegmentationDone { total: sentences.len() });

        // === Passo 4: Classificação (só para observação; a decisão é do filtro) ===
        if tx.is_some() {
            if self.filter.is_skipped(&document) {
                emit(PipelineEvent::Skipped { id: document.id.clone() });
            } else {
                let regions = RegionClassifier::new(&document);
                let keep = self.filter.keep_mask(&document, &sentences);
                for (index, (s, kept)) in sentences.iter().zip(keep).enumerate() {
                    emit(PipelineEvent::SentenceClassified {
                        index,
                        begin: s.begin,
                        end: s.end,
                        region: regions.region(s.begin, s.end),
                        kept,
                    });
                }
            }
        }

        // === Passo 5: Filtragem ===
        let outcome = self.filter.apply(&document, &mut sentences);

        ProcessedDocument {
            document,
            sentences,
            assembly,
            malformed: parsed.malformed,
            outcome,
        }
    }

    /// Processa todos os pares `.txt`/`.so` de `reader` e grava BioC em `output_dir`.
    ///
    /// Erros por documento (companheiro ausente, I/O, formato) são registrados e contados;
    /// nunca interrompem o lote.
    pub fn run_batch(&self, reader: &Nxml2TxtReader, output_dir: &Path) -> Result<BatchSummary> {
        let existing = ExistingOutputs::scan(output_dir)?;
        let sources = reader.discover()?;
        info!(
            "{} entradas encontradas, {} saídas já existentes",
            sources.len(),
            existing.len()
        );

        let claims = OutputClaims::default();
        let counter = AtomicUsize::new(0);
        let summary = self.in_pool(|| {
            sources
                .par_iter()
                .map(|source| {
                    let summary = match source {
                        Ok(source) => self.batch_one(source, &existing, &claims, output_dir),
                        Err(e) => {
                            warn!("{}", e);
                            BatchSummary { skipped_missing: 1, ..Default::default() }
                        }
                    };
                    report_progress(&counter);
                    summary
                })
                .reduce(BatchSummary::default, BatchSummary::merge)
        });

        info!("lote concluído: {:?}", summary);
        Ok(summary)
    }

    fn batch_one(
        &self,
        source: &DocumentSource,
        existing: &ExistingOutputs,
        claims: &OutputClaims,
        output_dir: &Path,
    ) -> BatchSummary {
        let article = match source.read() {
            Ok(article) => article,
            Err(e) => {
                warn!("{}: {}", source.relative_path, e);
                let mut summary = BatchSummary::default();
                match e {
                    NxmlError::MissingCompanionFile(_) => summary.skipped_missing = 1,
                    _ => summary.failed = 1,
                }
                return summary;
            }
        };

        // o nome da saída só é conhecido depois da montagem (pmid)
        let result = self.process_article(&article);
        let name = output_name(&result.document.id, &source.stem);
        if existing.contains(name) {
            debug!("saída {} já existe, pulando {}", name, source.relative_path);
            return BatchSummary { skipped_existing: 1, ..Default::default() };
        }

        let mut summary = self.write_result(&result, name, claims, output_dir);
        summary.malformed_records = result.malformed;
        summary
    }

    /// Lê documentos BioC de `reader`, filtra e grava em `output_dir` no formato configurado.
    pub fn run_bioc_batch(&self, reader: &BiocReader, output_dir: &Path) -> Result<BatchSummary> {
        let existing = ExistingOutputs::scan(output_dir)?;
        let paths = reader.discover()?;
        info!("{} documentos BioC encontrados", paths.len());

        let claims = OutputClaims::default();
        let counter = AtomicUsize::new(0);
        let summary = self.in_pool(|| {
            paths
                .par_iter()
                .map(|path| {
                    let summary = self.bioc_one(reader, path, &existing, &claims, output_dir);
                    report_progress(&counter);
                    summary
                })
                .reduce(BatchSummary::default, BatchSummary::merge)
        });

        info!("lote BioC concluído: {:?}", summary);
        Ok(summary)
    }

    fn bioc_one(
        &self,
        reader: &BiocReader,
        path: &Path,
        existing: &ExistingOutputs,
        claims: &OutputClaims,
        output_dir: &Path,
    ) -> BatchSummary {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let loaded = reader.read(path).and_then(|bioc| {
            let name = output_name(&bioc.id, &stem).to_string();
            if existing.contains(&name) {
                return Ok(None);
            }
            bioc.into_parts().map(|(document, sentences)| Some((document, sentences, name)))
        });

        match loaded {
            Ok(Some((document, sentences, name))) => {
                let result = self.filter_loaded(document, sentences);
                self.write_result(&result, &name, claims, output_dir)
            }
            Ok(None) => {
                debug!("saída para {} já existe, pulando", path.display());
                BatchSummary { skipped_existing: 1, ..Default::default() }
            }
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                BatchSummary { failed: 1, ..Default::default() }
            }
        }
    }

    fn write_result(
        &self,
        result: &ProcessedDocument,
        name: &str,
        claims: &OutputClaims,
        output_dir: &Path,
    ) -> BatchSummary {
        if !claims.claim(name) {
            warn!("saída {} já gravada por outro documento do lote, pulando", name);
            return BatchSummary { skipped_duplicate: 1, ..Default::default() };
        }
        let path = output_dir.join(format!("{name}.{}", self.config.format.extension()));
        match write_document(&path, &result.to_bioc(), self.config.format) {
            Ok(()) => {
                let (kept, dropped) = match result.outcome {
                    FilterOutcome::Filtered { kept, dropped } => (kept, dropped),
                    FilterOutcome::Skipped => (result.sentences.len(), 0),
                };
                BatchSummary {
                    processed: 1,
                    sentences_kept: kept,
                    sentences_dropped: dropped,
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!("falha ao gravar {}: {}", path.display(), e);
                BatchSummary { failed: 1, ..Default::default() }
            }
        }
    }

    /// Roda `op` num pool dedicado quando `workers` está configurado.
    fn in_pool<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        let Some(workers) = self.config.workers else {
            return op();
        };
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(op),
            Err(e) => {
                warn!("não foi possível criar pool com {} workers: {}", workers, e);
                op()
            }
        }
    }
}

impl Default for NxmlPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

/// Nome-base da saída: o id do documento, ou o nome do arquivo de entrada quando o id
/// está vazio ou não pode ser usado como nome de arquivo.
fn output_name<'a>(id: &'a str, fallback: &'a str) -> &'a str {
    if id.is_empty() {
        return fallback;
    }
    if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        warn!("id {:?} não serve como nome de arquivo, usando {:?}", id, fallback);
        return fallback;
    }
    id
}

/// Nomes de saída já reservados no lote corrente.
#[derive(Default)]
struct OutputClaims(Mutex<HashSet<String>>);

impl OutputClaims {
    /// `false` se o nome já foi reservado por outro documento.
    fn claim(&self, name: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string())
    }
}

fn report_progress(counter: &AtomicUsize) {
    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
    if n % PROGRESS_EVERY == 0 {
        info!("Processando o {}º documento", n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bioc::{read_document, BiocFormat};
    use crate::document::Sentence;
    use std::fs;

    const TEXT: &str = "TITLE\nAbstract here.\nBody text.\nFigure caption.";
    const RECORDS: &str = "T1\tfront 0 5\t\n\
                           T2\tabstract 6 20\t\n\
                           T3\tbody 21 31\t\n\
                           T4\tcaption 32 47\t\n\
                           T5\tarticle-id 0 0\t777\tpub-id-type=pmid";

    fn pipeline(keep_floats: bool) -> NxmlPipeline {
        NxmlPipeline::new(PipelineConfig { keep_floats, ..PipelineConfig::default() })
    }

    #[test]
    fn test_process_drops_caption() {
        let result = pipeline(false).process(TEXT, RECORDS);
        assert_eq!(result.document.id, "777");
        assert_eq!(result.outcome, FilterOutcome::Filtered { kept: 3, dropped: 1 });
        assert_eq!(
            result.sentences.as_slice(),
            &[Sentence::new(0, 5), Sentence::new(6, 20), Sentence::new(21, 31)]
        );
    }

    #[test]
    fn test_process_keeps_caption_with_floats() {
        let result = pipeline(true).process(TEXT, RECORDS);
        assert_eq!(result.outcome, FilterOutcome::Filtered { kept: 4, dropped: 0 });
    }

    #[test]
    fn test_events_streaming() {
        let (tx, rx) = mpsc::channel();
        pipeline(false).process_streaming(TEXT, RECORDS, tx);
        let events: Vec<PipelineEvent> = rx.try_iter().collect();

        assert!(matches!(&events[0], PipelineEvent::RecordsParsed { total: 5, malformed: 0 }));
        assert!(matches!(&events[1], PipelineEvent::DocumentAssembled { .. }));
        assert!(matches!(&events[2], PipelineEvent::SegmentationDone { total: 4 }));
        let classified = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::SentenceClassified { .. }))
            .count();
        assert_eq!(classified, 4);
        assert!(matches!(events.last().unwrap(), PipelineEvent::Done { .. }));
    }

    #[test]
    fn test_skip_sentinel_passes_through() {
        let records = format!("{}\nT6\tarticle-id 0 0\tskip\tpub-id-type=pmid", RECORDS);
        let (tx, rx) = mpsc::channel();
        pipeline(false).process_streaming(TEXT, &records, tx);
        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::Skipped { .. })));
        match events.last().unwrap() {
            PipelineEvent::Done { result, .. } => {
                assert_eq!(result.outcome, FilterOutcome::Skipped);
                assert_eq!(result.sentences.len(), 4);
            }
            other => panic!("esperava Done, obteve {:?}", other),
        }
    }

    #[test]
    fn test_empty_records() {
        let result = pipeline(false).process(TEXT, "");
        assert!(!result.assembly.is_well_formed());
        assert!(result.sentences.is_empty());
    }

    #[test]
    fn test_run_batch_writes_and_resumes() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a.txt"), TEXT).unwrap();
        fs::write(input.path().join("a.so"), RECORDS).unwrap();
        fs::write(input.path().join("b.txt"), "no companion").unwrap();
        fs::write(input.path().join("c.txt"), "Body only.").unwrap();
        fs::write(input.path().join("c.so"), "T1\tbody 0 10\t\nlixo").unwrap();

        let config = PipelineConfig { format: BiocFormat::Xml, workers: Some(2), ..Default::default() };
        let pipeline = NxmlPipeline::new(config);
        let reader = Nxml2TxtReader::new(input.path());

        let summary = pipeline.run_batch(&reader, output.path()).unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped_missing, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.malformed_records, 1);
        assert_eq!(summary.sentences_dropped, 1);

        let written = read_document(&output.path().join("777.xml"), BiocFormat::Xml).unwrap();
        assert_eq!(written.infons.get("relative-source-path").map(String::as_str), Some("a.txt"));
        assert_eq!(written.sentences.len(), 3);
        assert!(output.path().join("c.xml").exists());

        // segunda execução: tudo já existe
        let again = pipeline.run_batch(&reader, output.path()).unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.skipped_existing, 2);
    }

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("777", "a"), "777");
        assert_eq!(output_name("", "a"), "a");
        assert_eq!(output_name("../evil", "a"), "a");
        assert_eq!(output_name("x/y", "a"), "a");
        assert_eq!(output_name("x\\y", "a"), "a");
        assert_eq!(output_name("..", "a"), "a");
    }

    #[test]
    fn test_run_batch_resumes_by_assembled_id() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        // o arquivo se chama 777, mas o pmid montado é 888
        fs::write(input.path().join("777.txt"), TEXT).unwrap();
        fs::write(input.path().join("777.so"), RECORDS.replace("777", "888")).unwrap();
        fs::write(output.path().join("777.xml"), "<collection/>").unwrap();

        let config = PipelineConfig { format: BiocFormat::Xml, ..Default::default() };
        let summary = NxmlPipeline::new(config)
            .run_batch(&Nxml2TxtReader::new(input.path()), output.path())
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped_existing, 0);
        assert!(output.path().join("888.xml").exists());
    }

    #[test]
    fn test_run_batch_duplicate_ids_written_once() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for stem in ["a", "b", "c"] {
            fs::write(input.path().join(format!("{stem}.txt")), TEXT).unwrap();
            fs::write(input.path().join(format!("{stem}.so")), RECORDS).unwrap();
        }

        let config = PipelineConfig { workers: Some(3), ..Default::default() };
        let summary = NxmlPipeline::new(config)
            .run_batch(&Nxml2TxtReader::new(input.path()), output.path())
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped_duplicate, 2);
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 1);
        assert!(read_document(&output.path().join("777.json"), BiocFormat::Json).is_ok());
    }

    #[test]
    fn test_run_batch_unsafe_id_uses_input_name() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        let output = root.path().join("out");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&output).unwrap();
        let records = RECORDS.replace("\t777\t", "\t../evil\t");
        fs::write(input.join("x.txt"), TEXT).unwrap();
        fs::write(input.join("x.so"), records).unwrap();

        let summary = pipeline(false).run_batch(&Nxml2TxtReader::new(&input), &output).unwrap();
        assert_eq!(summary.processed, 1);
        assert!(output.join("x.json").exists());
        assert!(!root.path().join("evil.json").exists());
    }

    #[test]
    fn test_run_bioc_batch() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let assembled = pipeline(true).process(TEXT, RECORDS);
        let bioc = assembled.to_bioc();
        write_document(&input.path().join("777.json"), &bioc, BiocFormat::Json).unwrap();

        let reader = BiocReader::new(input.path(), BiocFormat::Json);
        let summary = pipeline(false).run_bioc_batch(&reader, output.path()).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.sentences_kept, 3);
        assert_eq!(summary.sentences_dropped, 1);
    }
}
