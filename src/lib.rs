//! # docsift
//!
//! Plain-text extraction, deduplication and regex search over office documents.
//!
//! docsift reads DOCX, XLSX, PPTX, PDF, Outlook MSG, HTML and plain-text files,
//! turns each into linear text, keeps one copy of every distinct document in
//! an in-memory [`Session`](session::Session), and searches that corpus with
//! case-insensitive regular expressions, returning highlighted snippets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐   ┌──────────┐
//! │ connector_fs│──▶│   ingest     │──▶│  session  │──▶│  search  │
//! │ files/dirs  │   │ JoinSet+queue│   │ docs+dedup│   │ snippets │
//! └─────────────┘   └──────┬───────┘   └───────────┘   └──────────┘
//!                          │
//!                    ┌─────▼──────┐
//!                    │  extract   │ container · markup · pdf · message
//!                    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsift extract report.docx              # print one file's text
//! docsift ingest ./mail --json             # classify a folder
//! docsift search "invoice\s+\d+" ./mail    # snippets with <b>highlights</b>
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Filesystem scanning |
//! | [`container`] | Zip container part selection and reading |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Format dispatch |
//! | [`ingest`] | Concurrent ingestion pipeline |
//! | [`markup`] | Run-tag text extraction from XML |
//! | [`message`] | Outlook message parsing |
//! | [`models`] | Core data types |
//! | [`pdf`] | PDF text through a bounded worker pool |
//! | [`progress`] | Ingest progress reporting |
//! | [`search`] | Regex search, snippets and highlighted views |
//! | [`session`] | Per-session corpus and dedup index |

pub mod config;
pub mod connector_fs;
pub mod container;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod markup;
pub mod message;
pub mod models;
pub mod pdf;
pub mod progress;
pub mod search;
pub mod session;
