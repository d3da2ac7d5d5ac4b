//! Pattern-based text extraction from XML parts.
//!
//! This is a deliberate heuristic rather than a conformant OOXML parser: text
//! runs are located with regular expressions, so truncated or malformed XML
//! simply yields fewer matches instead of an error. It is much cheaper than a
//! full parse for the large `document.xml` / `sharedStrings.xml` parts found in
//! real files.
//!
//! Tracked-change deletions live in `<w:delText>` rather than `<w:t>`, so they
//! never match the run tag. Tracked insertions wrap ordinary `<w:t>` runs in
//! `<w:ins>` and are therefore kept.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// How extracted runs are split into lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping<'a> {
    /// Runs inside each element with this tag form one line (e.g. `w:p`).
    Paragraph(&'a str),
    /// All runs of the fragment form one line.
    Unit,
}

/// Compiled run (and optional paragraph) patterns for one markup dialect.
#[derive(Debug)]
pub struct RunExtractor {
    run: Regex,
    paragraph: Option<Regex>,
}

/// Matches `<tag>` or `<tag attr="...">` through the next `</tag>`.
///
/// The name must be followed by whitespace or `>`, so `t` does not match
/// `<tableParts>` and `w:t` does not match `<w:tbl>` or `<w:tab/>`. A `/`
/// anywhere before `>` excludes self-closing tags.
fn element_pattern(tag: &str) -> Regex {
    let tag = regex::escape(tag);
    Regex::new(&format!(r"(?s)<{tag}(?:\s[^>/]{{0,200}})?>(.*?)</{tag}>"))
        .expect("escaped tag name always yields a valid pattern")
}

impl RunExtractor {
    pub fn new(tag: &str, grouping: Grouping<'_>) -> Self {
        Self {
            run: element_pattern(tag),
            paragraph: match grouping {
                Grouping::Paragraph(p) => Some(element_pattern(p)),
                Grouping::Unit => None,
            },
        }
    }

    /// Linear text of `xml`: runs joined by a space, one line per group.
    pub fn extract(&self, xml: &str) -> String {
        let mut out = String::new();
        match &self.paragraph {
            Some(paragraph) => {
                for group in paragraph.captures_iter(xml) {
                    self.push_line(&mut out, &group[1]);
                }
            }
            None => self.push_line(&mut out, xml),
        }
        out
    }

    fn push_line(&self, out: &mut String, fragment: &str) {
        let mut any = false;
        for run in self.run.captures_iter(fragment) {
            let inner = &run[1];
            if inner.is_empty() {
                continue;
            }
            if any {
                out.push(' ');
            }
            out.push_str(&decode_entities(inner));
            any = true;
        }
        if any {
            out.push('\n');
        }
    }
}

/// Word-processing runs grouped per `w:p` paragraph.
pub static WORDPROCESSING: LazyLock<RunExtractor> =
    LazyLock::new(|| RunExtractor::new("w:t", Grouping::Paragraph("w:p")));

/// Spreadsheet shared strings, inline strings and sheet names.
pub static SPREADSHEET: LazyLock<RunExtractor> =
    LazyLock::new(|| RunExtractor::new("t", Grouping::Unit));

/// DrawingML text runs used by slides, notes and comments.
pub static PRESENTATION: LazyLock<RunExtractor> =
    LazyLock::new(|| RunExtractor::new("a:t", Grouping::Unit));

/// One-shot form for ad hoc tags; prefer the shared statics for hot paths.
pub fn extract_paragraph_text(xml: &str, tag: &str, grouping: Grouping<'_>) -> String {
    RunExtractor::new(tag, grouping).extract(xml)
}

fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_lines() {
        let xml = r#"<w:body><w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve">world</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t></w:r></w:p></w:body>"#;
        assert_eq!(WORDPROCESSING.extract(xml), "Hello world\nSecond\n");
    }

    #[test]
    fn deleted_text_is_dropped_inserted_text_kept() {
        let xml = concat!(
            "<w:p>",
            "<w:r><w:t>kept</w:t></w:r>",
            "<w:del><w:r><w:delText>removed</w:delText></w:r></w:del>",
            "<w:ins><w:r><w:t>added</w:t></w:r></w:ins>",
            "</w:p>"
        );
        let text = WORDPROCESSING.extract(xml);
        assert_eq!(text, "kept added\n");
        assert!(!text.contains("removed"));
    }

    #[test]
    fn similar_tag_names_do_not_match() {
        let xml = "<w:p><w:tbl><w:tc>cell</w:tc></w:tbl><w:tab/><w:r><w:t>run</w:t></w:r></w:p>";
        assert_eq!(WORDPROCESSING.extract(xml), "run\n");

        let sheet = "<worksheet><tableParts count=\"1\"/><si><t>alpha</t></si><si><t>beta</t></si></worksheet>";
        assert_eq!(SPREADSHEET.extract(sheet), "alpha beta\n");
    }

    #[test]
    fn self_closing_and_empty_runs_are_skipped() {
        let xml = "<a:p><a:t/><a:t></a:t><a:t>Slide title</a:t></a:p>";
        assert_eq!(PRESENTATION.extract(xml), "Slide title\n");
    }

    #[test]
    fn no_runs_yields_empty_string() {
        assert_eq!(WORDPROCESSING.extract("<w:document><w:body/></w:document>"), "");
        assert_eq!(SPREADSHEET.extract("<workbook><sheets/></workbook>"), "");
        assert_eq!(PRESENTATION.extract(""), "");
    }

    #[test]
    fn truncated_xml_degrades_without_error() {
        let xml = "<w:p><w:r><w:t>complete</w:t></w:r></w:p><w:p><w:r><w:t>trunc";
        assert_eq!(WORDPROCESSING.extract(xml), "complete\n");
    }

    #[test]
    fn entities_are_decoded() {
        let xml = "<si><t>Fish &amp; Chips &lt;3 &#169;</t></si>";
        assert_eq!(SPREADSHEET.extract(xml), "Fish & Chips <3 \u{a9}\n");
    }

    #[test]
    fn ad_hoc_tag_extraction() {
        let xml = "<root><item name=\"x\">one</item><item>two</item></root>";
        assert_eq!(extract_paragraph_text(xml, "item", Grouping::Unit), "one two\n");
    }
}
