use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::container::DEFAULT_MAX_ENTRY_BYTES;
use crate::extract::{Dispatcher, FileFormat};
use crate::message::CfbMessageParser;
use crate::pdf::{PdfExtractService, PdfPool, DEFAULT_PORTFOLIO_MAX_CHARS};
use crate::search::{Highlight, SearchEngine, DEFAULT_CONTEXT_LENGTH};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Maximum file size in bytes per lower-case extension.
    #[serde(default)]
    pub limits: BTreeMap<String, u64>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

fn default_formats() -> Vec<String> {
    FileFormat::ALL
        .iter()
        .map(|f| f.extension().to_string())
        .collect()
}
fn default_max_entry_bytes() -> u64 {
    DEFAULT_MAX_ENTRY_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_attachment_depth")]
    pub max_attachment_depth: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Log a warning when a batch has more top-level files than this. Unset by default.
    #[serde(default)]
    pub warn_file_count: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_attachment_depth: default_max_attachment_depth(),
            max_files: default_max_files(),
            warn_file_count: None,
        }
    }
}

fn default_max_concurrency() -> usize {
    8
}
fn default_max_attachment_depth() -> usize {
    4
}
fn default_max_files() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    #[serde(default = "default_pdf_workers")]
    pub workers: usize,
    #[serde(default = "default_portfolio_max_chars")]
    pub portfolio_max_chars: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            workers: default_pdf_workers(),
            portfolio_max_chars: default_portfolio_max_chars(),
        }
    }
}

fn default_pdf_workers() -> usize {
    2
}
fn default_portfolio_max_chars() -> usize {
    DEFAULT_PORTFOLIO_MAX_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    #[serde(default = "default_highlight_open")]
    pub highlight_open: String,
    #[serde(default = "default_highlight_close")]
    pub highlight_close: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            context_length: default_context_length(),
            highlight_open: default_highlight_open(),
            highlight_close: default_highlight_close(),
        }
    }
}

impl SearchConfig {
    pub fn highlight(&self) -> Highlight {
        Highlight {
            open: self.highlight_open.clone(),
            close: self.highlight_close.clone(),
        }
    }
}

fn default_context_length() -> usize {
    DEFAULT_CONTEXT_LENGTH
}
fn default_highlight_open() -> String {
    "<b>".to_string()
}
fn default_highlight_close() -> String {
    "</b>".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

impl Config {
    /// Enabled formats, parsed from `extract.formats`.
    pub fn formats(&self) -> Result<Vec<FileFormat>> {
        self.extract
            .formats
            .iter()
            .map(|name| {
                name.parse::<FileFormat>()
                    .with_context(|| format!("extract.formats: unknown format '{}'", name))
            })
            .collect()
    }

    /// Dispatcher over the enabled formats with the default PDF and message readers.
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        let pdf = PdfPool::new(
            Arc::new(PdfExtractService),
            self.pdf.workers,
            self.pdf.portfolio_max_chars,
        );
        Ok(Dispatcher::new(
            self.formats()?,
            self.extract.max_entry_bytes,
            pdf,
            Arc::new(CfbMessageParser),
        ))
    }

    pub fn search_engine(&self) -> SearchEngine {
        SearchEngine::new(self.search.context_length).with_highlight(self.search.highlight())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.limits = config
        .limits
        .into_iter()
        .map(|(ext, limit)| (ext.to_lowercase(), limit))
        .collect();

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    config.formats()?;

    if config.extract.max_entry_bytes == 0 {
        anyhow::bail!("extract.max_entry_bytes must be > 0");
    }

    if config.pipeline.max_concurrency == 0 {
        anyhow::bail!("pipeline.max_concurrency must be > 0");
    }

    if config.pipeline.max_files == 0 {
        anyhow::bail!("pipeline.max_files must be > 0");
    }

    if config.pdf.workers == 0 {
        anyhow::bail!("pdf.workers must be > 0");
    }

    if config.search.context_length == 0 {
        anyhow::bail!("search.context_length must be > 0");
    }

    Ok(())
}
