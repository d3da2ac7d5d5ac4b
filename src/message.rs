//! Outlook `.msg` parsing.
//!
//! An Outlook message is an OLE compound file. Message properties live in
//! streams named `__substg1.0_<tag><type>`; each attachment is a storage
//! `__attach_version1.0_#XXXXXXXX` holding its own property streams.

use serde::Serialize;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use crate::error::ExtractError;

const BODY_UNICODE: &str = "__substg1.0_1000001F";
const BODY_ANSI: &str = "__substg1.0_1000001E";
const ATTACH_PREFIX: &str = "__attach_version1.0_#";
const ATTACH_LONG_NAME: &str = "__substg1.0_3707001F";
const ATTACH_SHORT_NAME: &str = "__substg1.0_3704001F";
const ATTACH_DISPLAY_NAME: &str = "__substg1.0_3001001F";
const ATTACH_MIME: &str = "__substg1.0_370E001F";
const ATTACH_DATA: &str = "__substg1.0_37010102";

/// A file carried inside a message.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// Body text and binary attachments of one message.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Parses an email message into its body and attachments.
pub trait MessageParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedMessage, ExtractError>;
}

/// [`MessageParser`] for Outlook compound-file messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct CfbMessageParser;

impl MessageParser for CfbMessageParser {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedMessage, ExtractError> {
        let mut file =
            cfb::CompoundFile::open(Cursor::new(bytes)).map_err(ExtractError::message)?;
        let root = Path::new("/");

        let body = match read_unicode(&mut file, &root.join(BODY_UNICODE))? {
            Some(body) => body,
            None => read_stream(&mut file, &root.join(BODY_ANSI))?
                .map(|raw| String::from_utf8_lossy(&raw).trim_end_matches('\0').to_string())
                .unwrap_or_default(),
        };

        let mut storages: Vec<PathBuf> = file
            .read_root_storage()
            .filter(|entry| entry.is_storage() && entry.name().starts_with(ATTACH_PREFIX))
            .map(|entry| entry.path().to_path_buf())
            .collect();
        storages.sort();

        let mut attachments = Vec::with_capacity(storages.len());
        for storage in storages {
            // Embedded messages and OLE objects carry no data stream.
            let Some(content) = read_stream(&mut file, &storage.join(ATTACH_DATA))? else {
                continue;
            };
            let mut file_name = None;
            for prop in [ATTACH_LONG_NAME, ATTACH_DISPLAY_NAME, ATTACH_SHORT_NAME] {
                if let Some(name) = read_unicode(&mut file, &storage.join(prop))? {
                    if !name.trim().is_empty() {
                        file_name = Some(name);
                        break;
                    }
                }
            }
            attachments.push(Attachment {
                file_name: file_name.unwrap_or_default(),
                mime_type: read_unicode(&mut file, &storage.join(ATTACH_MIME))?,
                content,
            });
        }

        Ok(ParsedMessage { body, attachments })
    }
}

fn read_stream<F: Read + Seek>(
    file: &mut cfb::CompoundFile<F>,
    path: &Path,
) -> Result<Option<Vec<u8>>, ExtractError> {
    if !file.is_stream(path) {
        return Ok(None);
    }
    let mut stream = file.open_stream(path).map_err(ExtractError::message)?;
    let mut out = Vec::new();
    stream.read_to_end(&mut out).map_err(ExtractError::message)?;
    Ok(Some(out))
}

/// Reads a `PT_UNICODE` (UTF-16LE) property stream.
fn read_unicode<F: Read + Seek>(
    file: &mut cfb::CompoundFile<F>,
    path: &Path,
) -> Result<Option<String>, ExtractError> {
    Ok(read_stream(file, path)?.map(|raw| {
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
            .trim_end_matches('\0')
            .to_string()
    }))
}
