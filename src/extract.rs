//! Format dispatch: turns a file's bytes into plain text.
//!
//! The extension of a file name selects a [`FileFormat`]; each format maps to
//! exactly one reader. Container, HTML and message readers are CPU-bound and
//! run on the blocking pool; PDFs go through the shared [`PdfPool`].

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use crate::container::{self, ContainerKind};
use crate::error::ExtractError;
use crate::message::{Attachment, MessageParser};
use crate::models::file_extension;
use crate::pdf::PdfPool;

/// Every format docsift can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Docx,
    Htm,
    Html,
    Msg,
    Pdf,
    Pptx,
    Txt,
    Xlsx,
}

impl FileFormat {
    pub const ALL: [FileFormat; 8] = [
        FileFormat::Docx,
        FileFormat::Htm,
        FileFormat::Html,
        FileFormat::Msg,
        FileFormat::Pdf,
        FileFormat::Pptx,
        FileFormat::Txt,
        FileFormat::Xlsx,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        file_extension(name).and_then(|ext| Self::from_extension(&ext))
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Docx => "docx",
            FileFormat::Htm => "htm",
            FileFormat::Html => "html",
            FileFormat::Msg => "msg",
            FileFormat::Pdf => "pdf",
            FileFormat::Pptx => "pptx",
            FileFormat::Txt => "txt",
            FileFormat::Xlsx => "xlsx",
        }
    }
}

impl FromStr for FileFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileFormat::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExtractError::UnsupportedExtension(s.to_string()))
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Text extracted from one file, plus any files it carried.
#[derive(Debug, Default)]
pub struct Extracted {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl From<String> for Extracted {
    fn from(text: String) -> Self {
        Self {
            text,
            attachments: Vec::new(),
        }
    }
}

/// Routes each file to the reader for its format.
#[derive(Clone)]
pub struct Dispatcher {
    enabled: BTreeSet<FileFormat>,
    max_entry_bytes: u64,
    pdf: PdfPool,
    messages: Arc<dyn MessageParser>,
}

impl Dispatcher {
    pub fn new(
        enabled: impl IntoIterator<Item = FileFormat>,
        max_entry_bytes: u64,
        pdf: PdfPool,
        messages: Arc<dyn MessageParser>,
    ) -> Self {
        Self {
            enabled: enabled.into_iter().collect(),
            max_entry_bytes,
            pdf,
            messages,
        }
    }

    /// The enabled format for `name`, or `UnsupportedExtension`.
    pub fn resolve(&self, name: &str) -> Result<FileFormat, ExtractError> {
        let ext = file_extension(name).unwrap_or_default();
        match FileFormat::from_extension(&ext) {
            Some(format) if self.enabled.contains(&format) => Ok(format),
            _ => Err(ExtractError::UnsupportedExtension(ext)),
        }
    }

    pub async fn extract(
        &self,
        format: FileFormat,
        bytes: Arc<[u8]>,
    ) -> Result<Extracted, ExtractError> {
        match format {
            FileFormat::Docx => self.extract_container(bytes, ContainerKind::Docx).await,
            FileFormat::Xlsx => self.extract_container(bytes, ContainerKind::Xlsx).await,
            FileFormat::Pptx => self.extract_container(bytes, ContainerKind::Pptx).await,
            FileFormat::Txt => Ok(decode_text(&bytes).into()),
            FileFormat::Htm | FileFormat::Html => {
                blocking(move || html_to_text(&decode_text(&bytes)))
                    .await
                    .map(Extracted::from)
            }
            FileFormat::Pdf => self.pdf.extract(bytes).await.map(Extracted::from),
            FileFormat::Msg => {
                let parser = Arc::clone(&self.messages);
                let message = blocking(move || parser.parse(&bytes)).await?;
                Ok(Extracted {
                    text: message.body,
                    attachments: message.attachments,
                })
            }
        }
    }

    async fn extract_container(
        &self,
        bytes: Arc<[u8]>,
        kind: ContainerKind,
    ) -> Result<Extracted, ExtractError> {
        let max_entry_bytes = self.max_entry_bytes;
        blocking(move || container::extract_zip(&bytes, kind, max_entry_bytes))
            .await
            .map(Extracted::from)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::WorkerPanicked(e.to_string()))?
}

/// Decodes file bytes as text, honouring UTF-8 and UTF-16 byte order marks.
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("static pattern"));
static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("static pattern"));

/// Body text content of an HTML document with scripts removed.
pub fn html_to_text(html: &str) -> Result<String, ExtractError> {
    let body =
        scraper::Selector::parse("body").map_err(|e| ExtractError::Html(e.to_string()))?;
    let stripped = SCRIPT_BLOCK.replace_all(html, "");
    let document = scraper::Html::parse_document(&stripped);
    let text: String = document
        .select(&body)
        .next()
        .map(|body| body.text().collect())
        .unwrap_or_default();
    Ok(NEWLINE_RUN.replace_all(&text, "\n").into_owned())
}
