//! Text extraction from zip-based Office containers (DOCX, XLSX, PPTX).
//!
//! Each container kind names the internal XML parts that carry user-visible
//! text. Matching parts are read in central-directory order and handed to the
//! matching [`RunExtractor`](crate::markup::RunExtractor).

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::io::{Cursor, Read};
use std::sync::LazyLock;

use crate::error::ExtractError;
use crate::markup::{RunExtractor, PRESENTATION, SPREADSHEET, WORDPROCESSING};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Read access to the entries of an archive.
///
/// Implementations release their underlying resources on drop, so a container
/// is closed on every exit path of [`extract_parts`].
pub trait Container {
    /// Entry names in enumeration order.
    fn entry_names(&self) -> Vec<String>;
    /// Reads one entry and decodes it as UTF-8 (lossily).
    fn read_entry_text(&mut self, name: &str) -> Result<String, ExtractError>;
}

/// [`Container`] backed by an in-memory zip archive.
pub struct ZipContainer<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
    max_entry_bytes: u64,
}

impl<'a> ZipContainer<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, ExtractError> {
        Self::with_entry_limit(bytes, DEFAULT_MAX_ENTRY_BYTES)
    }

    pub fn with_entry_limit(bytes: &'a [u8], max_entry_bytes: u64) -> Result<Self, ExtractError> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(ExtractError::container)?;
        Ok(Self {
            archive,
            max_entry_bytes,
        })
    }
}

impl Container for ZipContainer<'_> {
    fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    fn read_entry_text(&mut self, name: &str) -> Result<String, ExtractError> {
        let entry = self
            .archive
            .by_name(name)
            .map_err(ExtractError::container)?;
        let mut out = Vec::new();
        entry
            .take(self.max_entry_bytes)
            .read_to_end(&mut out)
            .map_err(ExtractError::container)?;
        if out.len() as u64 >= self.max_entry_bytes {
            return Err(ExtractError::Container(format!(
                "ZIP entry {} exceeds size limit ({} bytes)",
                name, self.max_entry_bytes
            )));
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Selects the entries of a container that carry text.
#[derive(Debug)]
pub struct PartSelector {
    exact: &'static [&'static str],
    patterns: GlobSet,
}

impl PartSelector {
    /// `patterns` are globs whose `*` never crosses a `/`. Only built from the
    /// per-kind statics below, so a bad pattern fails the first extraction of that kind.
    fn new(exact: &'static [&'static str], patterns: &[&str]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .expect("part patterns are static and valid");
            builder.add(glob);
        }
        Self {
            exact,
            patterns: builder.build().expect("part patterns are static and valid"),
        }
    }

    pub fn is_relevant(&self, entry_name: &str) -> bool {
        self.exact.contains(&entry_name) || self.patterns.is_match(entry_name)
    }
}

static DOCX_PARTS: LazyLock<PartSelector> = LazyLock::new(|| {
    PartSelector::new(
        &[
            "word/document.xml",
            "word/footnotes.xml",
            "word/endnotes.xml",
            "word/comments.xml",
        ],
        &[],
    )
});

static XLSX_PARTS: LazyLock<PartSelector> = LazyLock::new(|| {
    PartSelector::new(
        &["xl/workbook.xml", "xl/sharedStrings.xml"],
        &["xl/worksheets/*.xml"],
    )
});

static PPTX_PARTS: LazyLock<PartSelector> = LazyLock::new(|| {
    PartSelector::new(
        &[],
        &[
            "ppt/slides/*.xml",
            "ppt/notesSlides/*.xml",
            "ppt/comments/*.xml",
        ],
    )
});

/// The Office Open XML flavours docsift reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Docx,
    Xlsx,
    Pptx,
}

impl ContainerKind {
    pub fn parts(self) -> &'static PartSelector {
        match self {
            ContainerKind::Docx => &DOCX_PARTS,
            ContainerKind::Xlsx => &XLSX_PARTS,
            ContainerKind::Pptx => &PPTX_PARTS,
        }
    }

    pub fn runs(self) -> &'static RunExtractor {
        match self {
            ContainerKind::Docx => &WORDPROCESSING,
            ContainerKind::Xlsx => &SPREADSHEET,
            ContainerKind::Pptx => &PRESENTATION,
        }
    }
}

/// Concatenated text of every relevant part, in enumeration order.
///
/// A part without text runs contributes nothing.
pub fn extract_parts<C: Container>(
    container: &mut C,
    selector: &PartSelector,
    runs: &RunExtractor,
) -> Result<String, ExtractError> {
    let mut out = String::new();
    for name in container.entry_names() {
        if !selector.is_relevant(&name) {
            continue;
        }
        let xml = container.read_entry_text(&name)?;
        out.push_str(&runs.extract(&xml));
    }
    Ok(out)
}

pub fn extract_from_container<C: Container>(
    container: &mut C,
    kind: ContainerKind,
) -> Result<String, ExtractError> {
    extract_parts(container, kind.parts(), kind.runs())
}

/// Opens `bytes` as a zip archive and extracts `kind`'s text.
pub fn extract_zip(
    bytes: &[u8],
    kind: ContainerKind,
    max_entry_bytes: u64,
) -> Result<String, ExtractError> {
    let mut container = ZipContainer::with_entry_limit(bytes, max_entry_bytes)?;
    extract_from_container(&mut container, kind)
}
