//! Markdown block scanning on top of `pulldown-cmark`.
//!
//! Only top-level block structure matters to the interface parser: headings,
//! paragraphs, lists, tables and code. Everything except code and heading text
//! is taken verbatim from the source range of the block, so inline markup and
//! table pipes survive for label matching and schema inference.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

/// A top-level markdown block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    /// Source lines, trimmed, so labels can be anchored per line.
    Paragraph(Vec<String>),
    List(Vec<String>),
    /// Rows as written, `| a | b |`.
    Table(Vec<String>),
    Code { info: String, body: String },
}

impl Block {
    /// Text of the block as it should appear inside a field value.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Heading { text, .. } => text.clone(),
            Self::Paragraph(lines) | Self::List(lines) | Self::Table(lines) => lines.join("\n"),
            Self::Code { body, .. } => body.clone(),
        }
    }
}

/// Splits a markdown document into top-level blocks.
///
/// Setext headings, quotes and HTML blocks come back as paragraphs; only ATX
/// headings (`### Title`) shape the hierarchy. An unterminated code fence runs
/// to the end of the document.
#[must_use]
pub fn scan_blocks(document: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut events = Parser::new_ext(document, Options::ENABLE_TABLES).into_offset_iter();

    while let Some((event, range)) = events.next() {
        let Event::Start(tag) = event else {
            continue;
        };
        let inner = inner_text(&mut events);
        let source = document.get(range).unwrap_or_default();

        blocks.push(match tag {
            Tag::Heading { level, .. } if source.trim_start().starts_with('#') => {
                Block::Heading {
                    level: level as u8,
                    text: inner.trim().to_string(),
                }
            }
            Tag::CodeBlock(kind) => Block::Code {
                info: match kind {
                    CodeBlockKind::Fenced(info) => info.trim().to_string(),
                    CodeBlockKind::Indented => String::new(),
                },
                body: inner.trim_end_matches('\n').to_string(),
            },
            Tag::Table(_) => Block::Table(source_lines(source, str::trim)),
            Tag::List(_) => Block::List(source_lines(source, str::trim_end)),
            _ => Block::Paragraph(source_lines(source, str::trim)),
        });
    }
    blocks
}

/// Consumes events up to the end of the block that just started and returns
/// its literal text.
fn inner_text<'a, I>(events: &mut I) -> String
where
    I: Iterator<Item = (Event<'a>, Range<usize>)>,
{
    let mut depth = 1usize;
    let mut text = String::new();
    for (event, _) in events.by_ref() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Text(value) | Event::Code(value) => text.push_str(&value),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn source_lines(source: &str, shape: fn(&str) -> &str) -> Vec<String> {
    source
        .lines()
        .map(|line| shape(line.trim_end_matches('\r')))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
