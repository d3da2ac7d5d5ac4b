//! Multi-format extraction and ingestion through the default readers.
//!
//! Fixtures are built in memory: zip containers with `zip::ZipWriter`, Outlook
//! messages with `cfb`, and a hand-assembled single-page PDF.

use std::io::{Cursor, Write};
use std::sync::Arc;

use docsift::config::Config;
use docsift::extract::FileFormat;
use docsift::ingest::Pipeline;
use docsift::models::{FailureKind, Outcome, SkipReason, SourceFile};
use docsift::progress::NoProgress;
use docsift::search::Corpus;
use docsift::session::Session;
use tokio_util::sync::CancellationToken;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        for (name, content) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn docx_with_body(body: &str) -> Vec<u8> {
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"{}\"><w:body>{}</w:body></w:document>",
        W_NS, body
    );
    zip_with(&[
        ("[Content_Types].xml", "<Types/>"),
        ("word/document.xml", &xml),
    ])
}

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn msg_with(body: &str, attachments: &[(&str, &[u8])]) -> Vec<u8> {
    let mut file = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    file.create_stream("/__substg1.0_1000001F")
        .unwrap()
        .write_all(&utf16(body))
        .unwrap();
    for (i, (name, data)) in attachments.iter().enumerate() {
        let storage = format!("/__attach_version1.0_#{:08X}", i);
        file.create_storage(&storage).unwrap();
        file.create_stream(format!("{}/__substg1.0_3707001F", storage))
            .unwrap()
            .write_all(&utf16(name))
            .unwrap();
        file.create_stream(format!("{}/__substg1.0_37010102", storage))
            .unwrap()
            .write_all(data)
            .unwrap();
    }
    file.flush().unwrap();
    file.into_inner().into_inner()
}

/// Minimal valid PDF whose only page shows `phrase`.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

async fn extract(name: &str, bytes: Vec<u8>) -> String {
    let dispatcher = Config::default().dispatcher().unwrap();
    let format = dispatcher.resolve(name).unwrap();
    dispatcher
        .extract(format, Arc::from(bytes))
        .await
        .unwrap()
        .text
}

fn pipeline(config: &Config) -> Pipeline {
    Pipeline::from_config(config, Arc::new(NoProgress)).unwrap()
}

#[tokio::test]
async fn docx_paragraphs_become_lines() {
    let body = "<w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space=\"preserve\">line</w:t></w:r></w:p>\
                <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>";
    let text = extract("memo.docx", docx_with_body(body)).await;
    assert_eq!(text, "First line\nSecond & last\n");
}

#[tokio::test]
async fn docx_tracked_deletions_are_dropped() {
    let body = "<w:p><w:r><w:t>Keep</w:t></w:r>\
                <w:del w:id=\"1\"><w:r><w:delText>removed clause</w:delText></w:r></w:del>\
                <w:ins w:id=\"2\"><w:r><w:t>added clause</w:t></w:r></w:ins></w:p>\
                <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
    let text = extract("redline.docx", docx_with_body(body)).await;
    assert!(text.contains("Keep added clause"));
    assert!(text.contains("cell"));
    assert!(!text.contains("removed"));
}

#[tokio::test]
async fn docx_without_runs_is_empty_text() {
    let text = extract("blank.docx", docx_with_body("<w:p/><w:sectPr/>")).await;
    assert_eq!(text, "");
}

#[tokio::test]
async fn xlsx_reads_shared_strings_and_sheets() {
    let bytes = zip_with(&[
        (
            "xl/sharedStrings.xml",
            "<sst><si><t>Region</t></si><si><t>North</t></si></sst>",
        ),
        (
            "xl/worksheets/sheet1.xml",
            "<worksheet><sheetData><row><c t=\"inlineStr\"><is><t>inline total</t></is></c></row></sheetData></worksheet>",
        ),
        ("xl/styles.xml", "<styleSheet><t>not a cell</t></styleSheet>"),
    ]);
    let text = extract("q3.xlsx", bytes).await;
    assert!(text.contains("Region"));
    assert!(text.contains("North"));
    assert!(text.contains("inline total"));
    assert!(!text.contains("not a cell"));
}

#[tokio::test]
async fn pptx_reads_slides_and_notes() {
    let bytes = zip_with(&[
        (
            "ppt/slides/slide1.xml",
            "<p:sld><a:p><a:r><a:t>Roadmap</a:t></a:r></a:p></p:sld>",
        ),
        (
            "ppt/notesSlides/notesSlide1.xml",
            "<p:notes><a:p><a:r><a:t>speaker notes</a:t></a:r></a:p></p:notes>",
        ),
    ]);
    let text = extract("deck.pptx", bytes).await;
    assert!(text.contains("Roadmap"));
    assert!(text.contains("speaker notes"));
}

#[tokio::test]
async fn pdf_text_is_extracted() {
    let text = extract("phrase.pdf", minimal_pdf_with_phrase("quarterly review phrase")).await;
    assert!(text.contains("quarterly review phrase"), "got: {:?}", text);
}

#[tokio::test]
async fn msg_with_two_attachments_yields_three_documents() {
    let docx = docx_with_body("<w:p><w:r><w:t>attached contract</w:t></w:r></w:p>");
    let msg = msg_with(
        "Please review the attachments.",
        &[("contract.docx", &docx), ("notes.txt", b"call notes")],
    );

    let config = Config::default();
    let mut session = Session::new();
    let report = pipeline(&config)
        .ingest(
            &mut session,
            vec![SourceFile::new("inbox/review.msg", msg)],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.succeeded().count(), 3, "{:?}", report.outcomes);
    assert_eq!(
        session.text("inbox/review.msg"),
        Some("Please review the attachments.")
    );
    assert_eq!(
        session.text("inbox/review.msg/contract.docx"),
        Some("attached contract\n")
    );
    assert_eq!(session.text("inbox/review.msg/notes.txt"), Some("call notes"));
}

#[tokio::test]
async fn corrupt_files_fail_without_stopping_the_batch() {
    let config = Config::default();
    let mut session = Session::new();
    let files = vec![
        SourceFile::new("bad.pdf", b"not a valid pdf".to_vec()),
        SourceFile::new("bad.docx", b"not a zip".to_vec()),
        SourceFile::new("good.txt", "fine"),
    ];
    let report = pipeline(&config)
        .ingest(&mut session, files, &CancellationToken::new())
        .await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcome_of("good.txt"), Some(&Outcome::Success));
    for key in ["bad.pdf", "bad.docx"] {
        assert!(matches!(
            report.outcome_of(key),
            Some(Outcome::Failed {
                kind: FailureKind::ExtractionFailure,
                ..
            })
        ));
        assert_eq!(session.text(key), Some(""));
    }
}

#[tokio::test]
async fn disabled_formats_are_unsupported() {
    let mut config = Config::default();
    config.extract.formats = vec!["txt".into()];
    let mut session = Session::new();
    let report = pipeline(&config)
        .ingest(
            &mut session,
            vec![SourceFile::new("page.html", "<p>hi</p>")],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(
        report.outcome_of("page.html"),
        Some(&Outcome::Skipped {
            reason: SkipReason::UnsupportedExtension
        })
    );
}

#[tokio::test]
async fn html_and_txt_share_a_search_corpus() {
    let config = Config::default();
    let mut session = Session::new();
    let files = vec![
        SourceFile::new(
            "site/index.html",
            "<html><body><h1>Invoice 42</h1><script>invoice()</script></body></html>",
        ),
        SourceFile::new("notes.txt", "see invoice 42 for details"),
    ];
    pipeline(&config)
        .ingest(&mut session, files, &CancellationToken::new())
        .await;

    let results = config.search_engine().search(&session, r"invoice\s+42").unwrap();
    let keys: Vec<&str> = results.matches().iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, ["site/index.html", "notes.txt"]);
    let snippet = results.snippet(&session, &results.matches()[0]).unwrap();
    assert_eq!(snippet, "<b>Invoice 42</b>");
    assert_eq!(FileFormat::from_file_name("site/index.html"), Some(FileFormat::Html));
}
