//! # Configuração do Pipeline
//!
//! Todos os campos têm padrão, então um JSON parcial (ou nenhum) é suficiente:
//!
//! ```json
//! { "keep_floats": true, "format": "xml" }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bioc::BiocFormat;
use crate::error::Result;
use crate::filter::{FilterConfig, DEFAULT_SKIP_ID};
use crate::segmenter::SegmenterMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Mantém as sentenças de legendas e figuras além das regiões legíveis.
    pub keep_floats: bool,
    /// Id sentinela que faz o filtro deixar o documento passar intacto.
    pub skip_id: String,
    pub segmenter: SegmenterMode,
    /// Formato de saída (e de entrada, quando se lê BioC).
    pub format: BiocFormat,
    /// Tamanho do pool do rayon no processamento em lote. `None` = padrão do rayon.
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keep_floats: false,
            skip_id: DEFAULT_SKIP_ID.to_string(),
            segmenter: SegmenterMode::default(),
            format: BiocFormat::default(),
            workers: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            keep_floats: self.keep_floats,
            skip_id: self.skip_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(!config.keep_floats);
        assert_eq!(config.skip_id, "skip");
        assert_eq!(config.segmenter, SegmenterMode::Unicode);
        assert_eq!(config.format, BiocFormat::Json);
    }

    #[test]
    fn test_partial_json() {
        let config =
            PipelineConfig::from_json_str(r#"{"keep_floats": true, "format": "xml", "segmenter": "line"}"#)
                .unwrap();
        assert!(config.keep_floats);
        assert_eq!(config.format, BiocFormat::Xml);
        assert_eq!(config.segmenter, SegmenterMode::Line);
        assert_eq!(config.skip_id, "skip");
        assert!(config.filter_config().keep_floats);
    }

    #[test]
    fn test_invalid_json() {
        assert!(PipelineConfig::from_json_str(r#"{"format": "tsv"}"#).is_err());
    }
}
