//! Ingestion pipeline orchestration.
//!
//! Drives the dispatcher over a batch of [`SourceFile`]s and classifies every
//! file as success, failure or skip. Extraction runs concurrently on a bounded
//! `JoinSet`; classification happens in the single driver loop as tasks
//! complete, so the [`Session`] is only ever mutated from one place.
//!
//! Attachments of `.msg` files re-enter the same loop through an explicit work
//! queue, bounded by a nesting depth and a per-batch file cap.

use regex::Regex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, LazyLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ExtractError;
use crate::extract::{Dispatcher, Extracted, FileFormat};
use crate::message::Attachment;
use crate::models::{
    content_hash, file_extension, Document, FailureKind, FileOutcome, IngestReport, Outcome,
    SkipReason, SourceFile,
};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::session::Session;

static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*\n\s*\n\s*").expect("static pattern"));

/// Collapses runs of three or more newlines (and the whitespace around them)
/// to a single blank line.
pub fn normalize_text(text: &str) -> String {
    BLANK_LINE_RUN.replace_all(text, "\n\n").into_owned()
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_concurrency: usize,
    pub max_attachment_depth: usize,
    pub max_files: usize,
    /// Batches with more top-level files than this log a warning.
    pub warn_file_count: Option<usize>,
    /// Maximum size in bytes per lower-case extension.
    pub limits: BTreeMap<String, u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let pipeline = crate::config::PipelineConfig::default();
        Self {
            max_concurrency: pipeline.max_concurrency,
            max_attachment_depth: pipeline.max_attachment_depth,
            max_files: pipeline.max_files,
            warn_file_count: pipeline.warn_file_count,
            limits: BTreeMap::new(),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.pipeline.max_concurrency,
            max_attachment_depth: config.pipeline.max_attachment_depth,
            max_files: config.pipeline.max_files,
            warn_file_count: config.pipeline.warn_file_count,
            limits: config.limits.clone(),
        }
    }

    pub fn exceeds_file_warning(&self, count: usize) -> bool {
        self.warn_file_count.is_some_and(|threshold| count > threshold)
    }
}

type TaskResult = (SourceFile, FileFormat, Result<Extracted, ExtractError>);

pub struct Pipeline {
    dispatcher: Dispatcher,
    options: PipelineOptions,
    progress: Arc<dyn IngestProgressReporter>,
}

impl Pipeline {
    pub fn new(
        dispatcher: Dispatcher,
        options: PipelineOptions,
        progress: Arc<dyn IngestProgressReporter>,
    ) -> Self {
        Self {
            dispatcher,
            options,
            progress,
        }
    }

    pub fn from_config(
        config: &Config,
        progress: Arc<dyn IngestProgressReporter>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.dispatcher()?,
            PipelineOptions::from_config(config),
            progress,
        ))
    }

    /// Ingests `files` (and any attachments they carry) into `session`.
    ///
    /// Every file, attachments included, ends with exactly one outcome in the
    /// returned report. Per-file errors never abort the batch. Once `cancel`
    /// fires, files that have not started are skipped; in-flight extractions
    /// still finish and are classified.
    pub async fn ingest(
        &self,
        session: &mut Session,
        files: Vec<SourceFile>,
        cancel: &CancellationToken,
    ) -> IngestReport {
        if self.options.exceeds_file_warning(files.len()) {
            tracing::warn!(
                files = files.len(),
                threshold = ?self.options.warn_file_count,
                "large number of files; ingest may be slow"
            );
        }
        let mut batch = Batch {
            report: IngestReport::default(),
            total: files.len() as u64,
            admitted: 0,
        };
        self.progress.report(IngestProgressEvent::Queued { total: batch.total });

        let mut backlog: VecDeque<SourceFile> = files.into();
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let max_concurrency = self.options.max_concurrency.max(1);

        loop {
            while tasks.len() < max_concurrency {
                let Some(file) = backlog.pop_front() else {
                    break;
                };
                match self.admit(&file, &mut batch, cancel) {
                    Ok(format) => self.spawn(&mut tasks, file, format),
                    Err(outcome) => {
                        let format = FileFormat::from_file_name(&file.key);
                        self.record(session, &mut batch, &file, format, outcome, String::new());
                    }
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((file, format, result)) => {
                    let attachments = self.classify(session, &mut batch, file, format, result);
                    if !attachments.is_empty() {
                        batch.total += attachments.len() as u64;
                        self.progress
                            .report(IngestProgressEvent::Queued { total: batch.total });
                        backlog.extend(attachments);
                    }
                }
                // The task body only awaits a nested handle, so this is a runtime shutdown.
                Err(e) => tracing::warn!(error = %e, "ingest task aborted"),
            }
        }

        tracing::info!(
            processed = batch.report.outcomes.len(),
            succeeded = batch.report.succeeded().count(),
            failed = batch.report.failed().count(),
            skipped = batch.report.skipped().count(),
            "ingest finished"
        );
        batch.report
    }

    /// Checks that run before any extraction work is scheduled.
    fn admit(
        &self,
        file: &SourceFile,
        batch: &mut Batch,
        cancel: &CancellationToken,
    ) -> Result<FileFormat, Outcome> {
        let skip = |reason| Outcome::Skipped { reason };

        if cancel.is_cancelled() {
            return Err(skip(SkipReason::Cancelled));
        }
        batch.admitted += 1;
        if file.depth > self.options.max_attachment_depth
            || batch.admitted > self.options.max_files
        {
            return Err(skip(SkipReason::ExpansionLimit));
        }

        let format = self
            .dispatcher
            .resolve(&file.key)
            .map_err(|_| skip(SkipReason::UnsupportedExtension))?;

        if let Some(&limit) = self.options.limits.get(format.extension()) {
            if file.size > limit {
                return Err(skip(SkipReason::OverSizeLimit));
            }
        }
        Ok(format)
    }

    fn spawn(&self, tasks: &mut JoinSet<TaskResult>, file: SourceFile, format: FileFormat) {
        let dispatcher = self.dispatcher.clone();
        let bytes = Arc::clone(&file.bytes);
        tasks.spawn(async move {
            let handle = tokio::spawn(async move { dispatcher.extract(format, bytes).await });
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ExtractError::WorkerPanicked(e.to_string())),
            };
            (file, format, result)
        });
    }

    /// Classifies a finished extraction and returns the attachments to queue.
    fn classify(
        &self,
        session: &mut Session,
        batch: &mut Batch,
        file: SourceFile,
        format: FileFormat,
        result: Result<Extracted, ExtractError>,
    ) -> Vec<SourceFile> {
        let extracted = match result {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!(key = %file.key, error = %e, "extraction failed");
                let kind = match e {
                    ExtractError::PortfolioUnsupported => FailureKind::PortfolioUnsupported,
                    _ => FailureKind::ExtractionFailure,
                };
                let outcome = Outcome::Failed {
                    kind,
                    detail: e.to_string(),
                };
                self.record(session, batch, &file, Some(format), outcome, String::new());
                return Vec::new();
            }
        };

        let text = normalize_text(&extracted.text);
        let hash = content_hash(&text);
        if let Some(original) = session.find_duplicate(&file.key, &text, &hash) {
            tracing::debug!(key = %file.key, original, "duplicate");
            let outcome = Outcome::Skipped {
                reason: SkipReason::Duplicate,
            };
            self.record(session, batch, &file, Some(format), outcome, String::new());
            return Vec::new();
        }

        if format == FileFormat::Pdf && text.trim().is_empty() {
            let outcome = Outcome::Skipped {
                reason: SkipReason::NoTextContent,
            };
            self.record(session, batch, &file, Some(format), outcome, String::new());
            return Vec::new();
        }

        self.record(session, batch, &file, Some(format), Outcome::Success, text);
        attachment_files(&file, extracted.attachments)
    }

    fn record(
        &self,
        session: &mut Session,
        batch: &mut Batch,
        file: &SourceFile,
        format: Option<FileFormat>,
        outcome: Outcome,
        text: String,
    ) {
        tracing::debug!(key = %file.key, depth = file.depth, %outcome, "classified");
        let extension = file.extension();

        match &outcome {
            Outcome::Success => session.store_success(Document::new(
                file.key.clone(),
                text,
                format,
                extension.clone(),
                outcome.clone(),
            )),
            Outcome::Skipped {
                reason: SkipReason::Duplicate,
            } => {}
            _ => session.upsert(Document::new(
                file.key.clone(),
                String::new(),
                format,
                extension.clone(),
                outcome.clone(),
            )),
        }

        batch.report.outcomes.push(FileOutcome {
            key: file.key.clone(),
            extension,
            depth: file.depth,
            parent: file.parent.clone(),
            outcome,
        });
        self.progress.report(IngestProgressEvent::Processed {
            key: file.key.clone(),
            n: batch.report.outcomes.len() as u64,
            total: batch.total,
        });
    }
}

struct Batch {
    report: IngestReport,
    total: u64,
    /// Files that have passed the cancellation check, counted against `max_files`.
    admitted: usize,
}

/// Turns a message's attachments into source files one level deeper.
///
/// Keys are unique within the message: a repeated name gets the attachment's
/// 1-based position appended to its stem.
fn attachment_files(parent: &SourceFile, attachments: Vec<Attachment>) -> Vec<SourceFile> {
    let mut used = HashSet::new();
    attachments
        .into_iter()
        .enumerate()
        .map(|(i, attachment)| {
            let base = sanitize_attachment_name(&attachment.file_name, i + 1);
            let mut name = base.clone();
            let mut n = i + 1;
            while !used.insert(name.clone()) {
                name = numbered_name(&base, n);
                n += 1;
            }
            let mut file = SourceFile::new(format!("{}/{}", parent.key, name), attachment.content);
            file.depth = parent.depth + 1;
            file.parent = Some(parent.key.clone());
            file
        })
        .collect()
}

/// `report.pdf` with `n = 2` becomes `report-2.pdf`.
fn numbered_name(name: &str, n: usize) -> String {
    match file_extension(name) {
        Some(_) => {
            let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
            format!("{}-{}.{}", stem, n, ext)
        }
        None => format!("{}-{}", name, n),
    }
}

fn sanitize_attachment_name(name: &str, n: usize) -> String {
    let name = name.trim().replace(['/', '\\'], "_");
    if name.is_empty() {
        format!("attachment-{}", n)
    } else {
        name
    }
}
