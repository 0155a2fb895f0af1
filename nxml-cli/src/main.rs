//! CLI de processamento em lote: lê artigos convertidos de NXML, filtra as sentenças e
//! grava os documentos em BioC.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nxml_core::{
    segment, BiocDocument, BiocFormat, BiocReader, Nxml2TxtReader, NxmlPipeline, PipelineConfig,
    SegmenterMode,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "nxml")]
#[command(about = "Montagem e filtragem de sentenças de artigos NXML")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Origem dos documentos de entrada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// Pares `.txt` + `.so` do conversor NXML→texto
    Nxml,
    /// Documentos BioC XML já montados
    Xml,
    /// Documentos BioC JSON já montados
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Processa um diretório inteiro e grava um documento BioC por artigo
    Filter {
        /// Diretório de entrada (varrido recursivamente)
        #[arg(short, long)]
        input: PathBuf,
        /// Diretório de saída (criado se não existir; saídas existentes são puladas)
        #[arg(short, long)]
        output: PathBuf,
        /// Mantém também as sentenças de legendas e figuras
        #[arg(long)]
        keep_floats: bool,
        /// Formato de saída: xml ou json
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,
        #[arg(long, value_enum, default_value = "nxml")]
        input_format: InputFormat,
        /// Segmentador de sentenças
        #[arg(long, value_enum)]
        segmenter: Option<Segmenter>,
        /// Arquivo JSON de configuração; as flags acima têm precedência
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Número de threads (padrão: uma por núcleo)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Monta um único artigo e imprime o documento como JSON
    Inspect {
        #[arg(long)]
        txt: PathBuf,
        #[arg(long)]
        so: PathBuf,
        /// Aplica também o filtro de sentenças
        #[arg(long)]
        filter: bool,
        /// Mantém também as sentenças de legendas e figuras
        #[arg(long)]
        keep_floats: bool,
        /// Segmentador de sentenças
        #[arg(long, value_enum)]
        segmenter: Option<Segmenter>,
        /// Arquivo JSON de configuração; as flags acima têm precedência
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Segmenter {
    Unicode,
    Line,
}

impl From<Segmenter> for SegmenterMode {
    fn from(value: Segmenter) -> Self {
        match value {
            Segmenter::Unicode => SegmenterMode::Unicode,
            Segmenter::Line => SegmenterMode::Line,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Filter {
            input,
            output,
            keep_floats,
            format,
            input_format,
            segmenter,
            config,
            workers,
        } => {
            let mut config = load_config(config.as_deref())?;
            if keep_floats {
                config.keep_floats = true;
            }
            if let Some(format) = format {
                config.format = format.parse()?;
            }
            if let Some(segmenter) = segmenter {
                config.segmenter = segmenter.into();
            }
            if workers.is_some() {
                config.workers = workers;
            }
            cmd_filter(&input, &output, input_format, config)
        }
        Commands::Inspect { txt, so, filter, keep_floats, segmenter, config } => {
            let mut config = load_config(config.as_deref())?;
            if keep_floats {
                config.keep_floats = true;
            }
            if let Some(segmenter) = segmenter {
                config.segmenter = segmenter.into();
            }
            cmd_inspect(&txt, &so, filter, config)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("falha ao ler a configuração {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_filter(input: &Path, output: &Path, input_format: InputFormat, config: PipelineConfig) -> Result<()> {
    if !input.is_dir() {
        anyhow::bail!("diretório de entrada não encontrado: {}", input.display());
    }

    info!(
        "Filtrando {} → {} (entrada: {:?}, saída: {}, keep_floats: {})",
        input.display(),
        output.display(),
        input_format,
        config.format,
        config.keep_floats
    );

    let pipeline = NxmlPipeline::new(config);
    let summary = match input_format {
        InputFormat::Nxml => pipeline.run_batch(&Nxml2TxtReader::new(input), output),
        InputFormat::Xml => pipeline.run_bioc_batch(&BiocReader::new(input, BiocFormat::Xml), output),
        InputFormat::Json => pipeline.run_bioc_batch(&BiocReader::new(input, BiocFormat::Json), output),
    }
    .context("falha no processamento em lote")?;

    println!(
        "{} processados, {} já existentes, {} sem companheiro, {} duplicados, {} com falha",
        summary.processed,
        summary.skipped_existing,
        summary.skipped_missing,
        summary.skipped_duplicate,
        summary.failed
    );
    println!(
        "{} sentenças mantidas, {} removidas, {} registros malformados",
        summary.sentences_kept, summary.sentences_dropped, summary.malformed_records
    );
    Ok(())
}

fn cmd_inspect(txt: &Path, so: &Path, filter: bool, config: PipelineConfig) -> Result<()> {
    let text = fs::read_to_string(txt).with_context(|| format!("falha ao ler {}", txt.display()))?;
    let records = fs::read_to_string(so).with_context(|| format!("falha ao ler {}", so.display()))?;

    let document = inspect(&text, &records, filter, config);
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn inspect(text: &str, records: &str, filter: bool, config: PipelineConfig) -> BiocDocument {
    let segmenter = config.segmenter;
    let result = NxmlPipeline::new(config).process(text, records);
    info!(
        "{} passagens, {} anotações, {} registros malformados",
        result.assembly.passages, result.assembly.annotations, result.malformed
    );

    // sem --filter, mostra todas as sentenças candidatas
    if filter {
        result.to_bioc()
    } else {
        BiocDocument::from_parts(&result.document, &segment(&result.document.text, segmenter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_filter_args() {
        let cli = Cli::parse_from([
            "nxml", "filter", "-i", "in", "-o", "out", "--keep-floats", "--format", "xml",
            "--input-format", "json", "--workers", "4",
        ]);
        match cli.command {
            Commands::Filter { input, keep_floats, format, input_format, workers, .. } => {
                assert_eq!(input, PathBuf::from("in"));
                assert!(keep_floats);
                assert_eq!(format.as_deref(), Some("xml"));
                assert_eq!(input_format, InputFormat::Json);
                assert_eq!(workers, Some(4));
            }
            _ => panic!("esperava o subcomando filter"),
        }
    }

    #[test]
    fn test_parse_inspect_args() {
        let cli = Cli::parse_from([
            "nxml", "inspect", "--txt", "a.txt", "--so", "a.so", "--filter", "--keep-floats",
            "--segmenter", "line", "-c", "cfg.json",
        ]);
        match cli.command {
            Commands::Inspect { filter, keep_floats, segmenter, config, .. } => {
                assert!(filter);
                assert!(keep_floats);
                assert!(matches!(segmenter, Some(Segmenter::Line)));
                assert_eq!(config, Some(PathBuf::from("cfg.json")));
            }
            _ => panic!("esperava o subcomando inspect"),
        }
    }

    #[test]
    fn test_inspect_honors_keep_floats() {
        let text = "Body sentence.\nFigure 1 caption.";
        let records = "T1\tbody 0 14\t\nT2\tcaption 15 32\t";

        let dropped = inspect(text, records, true, PipelineConfig::default());
        assert_eq!(dropped.sentences.len(), 1);

        let config = PipelineConfig { keep_floats: true, ..PipelineConfig::default() };
        let kept = inspect(text, records, true, config);
        assert_eq!(kept.sentences.len(), 2);

        let unfiltered = inspect(text, records, false, PipelineConfig::default());
        assert_eq!(unfiltered.sentences.len(), 2);
    }

    #[test]
    fn test_load_config_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
