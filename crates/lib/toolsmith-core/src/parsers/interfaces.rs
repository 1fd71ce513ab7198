use std::{error::Error, fmt, path::Path, sync::LazyLock};

use regex::Regex;
use toolsmith_store::models::InterfaceRecord;
use tracing::debug;

use super::markdown::{Block, scan_blocks};

/// Options for parsing interface documentation.
#[derive(Debug, Clone)]
pub struct InterfaceParseOptions {
    /// Heading level of the category slot; the next two levels are the
    /// sub-category and third-category slots.
    pub base_level: u8,
    /// Categories whose leaves are never emitted. Compared case-insensitively.
    pub denylist: Vec<String>,
}

impl Default for InterfaceParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceParseOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_level: 3,
            denylist: vec!["手续费".to_string(), "fees".to_string()],
        }
    }

    #[must_use]
    pub const fn with_base_level(mut self, base_level: u8) -> Self {
        self.base_level = base_level;
        self
    }

    #[must_use]
    pub fn with_denylist<I, S>(mut self, denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denylist = denylist.into_iter().map(Into::into).collect();
        self
    }

    fn depth_of(&self, level: u8) -> Option<usize> {
        let depth = level.checked_sub(self.base_level)?;
        (depth < 3).then_some(usize::from(depth))
    }

    fn is_denied(&self, category: &str) -> bool {
        let category = category.trim().to_lowercase();
        self.denylist
            .iter()
            .any(|entry| entry.trim().to_lowercase() == category)
    }
}

/// Why a heading did not produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Denylisted,
    NoFields,
    NoInterfaceName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denylisted => write!(f, "category is denylisted"),
            Self::NoFields => write!(f, "no recognized field content"),
            Self::NoInterfaceName => write!(f, "no derivable interface name"),
        }
    }
}

/// A leaf heading that was dropped, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSkip {
    pub heading: String,
    pub reason: SkipReason,
}

/// Output from parsing interface documentation.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub records: Vec<InterfaceRecord>,
    pub skipped: Vec<ParseSkip>,
}

/// Error type for interface parsing. Parsing itself never fails; only the
/// file and task wrappers do.
#[derive(Debug)]
pub struct InterfaceParseError {
    message: String,
}

impl InterfaceParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for InterfaceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interface parse error: {}", self.message)
    }
}

impl Error for InterfaceParseError {}

impl From<std::io::Error> for InterfaceParseError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<tokio::task::JoinError> for InterfaceParseError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    InterfaceName,
    TargetUrl,
    Description,
    LimitInfo,
    InputParams,
    OutputParams,
    Example,
    DataExample,
}

// Longer labels first so the alternation never stops at a prefix.
const LABELS: &[(&str, Field)] = &[
    ("interface example", Field::Example),
    ("interface name", Field::InterfaceName),
    ("interface", Field::InterfaceName),
    ("接口示例", Field::Example),
    ("接口", Field::InterfaceName),
    ("target address", Field::TargetUrl),
    ("target url", Field::TargetUrl),
    ("target", Field::TargetUrl),
    ("目标地址", Field::TargetUrl),
    ("description", Field::Description),
    ("描述", Field::Description),
    ("usage limit", Field::LimitInfo),
    ("limits", Field::LimitInfo),
    ("limit", Field::LimitInfo),
    ("使用限制", Field::LimitInfo),
    ("限量", Field::LimitInfo),
    ("input parameters", Field::InputParams),
    ("input params", Field::InputParams),
    ("input", Field::InputParams),
    ("输入参数", Field::InputParams),
    ("output parameters", Field::OutputParams),
    ("output params", Field::OutputParams),
    ("output", Field::OutputParams),
    ("输出参数", Field::OutputParams),
    ("call example", Field::Example),
    ("example", Field::Example),
    ("data example", Field::DataExample),
    ("sample output", Field::DataExample),
    ("数据示例", Field::DataExample),
];

static LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = LABELS
        .iter()
        .map(|(label, _)| regex::escape(label))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(
        r"(?i)^\s*(?:\*\*)?({alternation})(?:\*\*)?\s*(?:[:：](?:\*\*)?\s*(.*?)\s*)?$"
    );
    Regex::new(&pattern).expect("valid label pattern")
});

static HEADING_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*[:：]\s*([a-z_][a-z0-9_]*)$").expect("valid heading pattern")
});

static CALL_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[A-Za-z_]\w*\s*=\s*)?(?:[A-Za-z_]\w*\.)*([A-Za-z_]\w*)\s*\(")
        .expect("valid call pattern")
});

fn match_label(line: &str) -> Option<(Field, String)> {
    let captures = LABEL_LINE.captures(line)?;
    let label = captures.get(1)?.as_str().to_lowercase();
    let field = LABELS
        .iter()
        .find(|(candidate, _)| *candidate == label)
        .map(|(_, field)| *field)?;
    let rest = captures
        .get(2)
        .map(|value| value.as_str().to_string())
        .unwrap_or_default();
    Some((field, rest))
}

#[derive(Default)]
struct FieldValues {
    seen: bool,
    interface_name: Option<String>,
    target_url: Option<String>,
    description: Option<String>,
    limit_info: Option<String>,
    input_params: Option<String>,
    output_params: Option<String>,
    example: Option<String>,
    data_example: Option<String>,
}

impl FieldValues {
    fn set(&mut self, field: Field, parts: &[String]) {
        self.seen = true;
        let text = parts.join("\n").trim().to_string();
        let value = (!text.is_empty()).then_some(text);
        let slot = match field {
            Field::InterfaceName => &mut self.interface_name,
            Field::TargetUrl => &mut self.target_url,
            Field::Description => &mut self.description,
            Field::LimitInfo => &mut self.limit_info,
            Field::InputParams => &mut self.input_params,
            Field::OutputParams => &mut self.output_params,
            Field::Example => &mut self.example,
            Field::DataExample => &mut self.data_example,
        };
        *slot = value;
    }
}

/// Collects labeled fields from the blocks of one leaf region.
fn extract_fields(region: &[Block]) -> FieldValues {
    let mut values = FieldValues::default();
    let mut preamble: Vec<String> = Vec::new();
    let mut current: Option<Field> = None;
    let mut buffer: Vec<String> = Vec::new();

    for block in region {
        match block {
            Block::Paragraph(lines) => {
                let mut loose: Vec<&str> = Vec::new();
                for line in lines {
                    if let Some((field, rest)) = match_label(line) {
                        push_loose(&mut loose, current, &mut buffer, &mut preamble);
                        if let Some(open) = current.take() {
                            values.set(open, &buffer);
                        }
                        buffer.clear();
                        if !rest.is_empty() {
                            buffer.push(rest);
                        }
                        current = Some(field);
                    } else {
                        loose.push(line.as_str());
                    }
                }
                push_loose(&mut loose, current, &mut buffer, &mut preamble);
            }
            Block::Heading { .. } => {}
            other => {
                let text = other.text();
                if current.is_some() {
                    buffer.push(text);
                } else {
                    preamble.push(text);
                }
            }
        }
    }

    if let Some(open) = current {
        values.set(open, &buffer);
    }
    if values.description.is_none() {
        let text = preamble.join("\n").trim().to_string();
        if !text.is_empty() {
            values.description = Some(text);
        }
    }
    values
}

fn push_loose(
    loose: &mut Vec<&str>,
    current: Option<Field>,
    buffer: &mut Vec<String>,
    preamble: &mut Vec<String>,
) {
    if loose.is_empty() {
        return;
    }
    let text = loose.join("\n");
    loose.clear();
    if current.is_some() {
        buffer.push(text);
    } else {
        preamble.push(text);
    }
}

/// Splits `Title: snake_identifier` leaf headings. The title stays in the slot.
fn split_heading(text: &str) -> (String, Option<String>) {
    HEADING_IDENTIFIER.captures(text.trim()).map_or_else(
        || (text.trim().to_string(), None),
        |captures| {
            (
                captures[1].trim().to_string(),
                Some(captures[2].to_string()),
            )
        },
    )
}

/// Call identifier at the start of an example, skipping `print` and imports.
fn example_identifier(example: &str) -> Option<String> {
    example
        .lines()
        .filter_map(|line| CALL_IDENTIFIER.captures(line))
        .map(|captures| captures[1].to_string())
        .find(|name| name != "print")
}

/// Parser for markdown interface documentation.
pub struct InterfaceParser;

impl InterfaceParser {
    /// Parses a markdown document into interface records.
    ///
    /// Leaves without usable content are reported in `ParseOutput::skipped`;
    /// the parse itself never fails.
    #[must_use]
    pub fn parse(document: &str, options: &InterfaceParseOptions) -> ParseOutput {
        let blocks = scan_blocks(document);
        let headings: Vec<(usize, usize, &str)> = blocks
            .iter()
            .enumerate()
            .filter_map(|(index, block)| match block {
                Block::Heading { level, text } => options
                    .depth_of(*level)
                    .map(|depth| (index, depth, text.as_str())),
                _ => None,
            })
            .collect();

        let mut output = ParseOutput::default();
        let mut slots: [Option<String>; 3] = [None, None, None];

        for (position, &(index, depth, text)) in headings.iter().enumerate() {
            let next = headings.get(position + 1);
            let is_leaf = next.is_none_or(|&(_, next_depth, _)| next_depth <= depth);
            let (title, heading_name) = if is_leaf {
                split_heading(text)
            } else {
                (text.trim().to_string(), None)
            };
            slots[depth] = Some(title);
            for slot in slots.iter_mut().skip(depth + 1) {
                *slot = None;
            }
            if !is_leaf {
                continue;
            }

            let category = slots[0].clone().unwrap_or_default();
            if options.is_denied(&category) {
                debug!(heading = text, "skipping denylisted category");
                output.skipped.push(ParseSkip {
                    heading: text.to_string(),
                    reason: SkipReason::Denylisted,
                });
                continue;
            }

            let end = next.map_or(blocks.len(), |&(next_index, _, _)| next_index);
            let fields = extract_fields(&blocks[index + 1..end]);
            if !fields.seen {
                debug!(heading = text, "skipping heading without fields");
                output.skipped.push(ParseSkip {
                    heading: text.to_string(),
                    reason: SkipReason::NoFields,
                });
                continue;
            }

            let interface_name = fields
                .interface_name
                .as_deref()
                .and_then(|value| value.lines().next())
                .map(|value| value.trim().trim_matches('`').trim().to_string())
                .filter(|value| !value.is_empty())
                .or(heading_name)
                .or_else(|| fields.example.as_deref().and_then(example_identifier));
            let Some(interface_name) = interface_name else {
                debug!(heading = text, "skipping heading without interface name");
                output.skipped.push(ParseSkip {
                    heading: text.to_string(),
                    reason: SkipReason::NoInterfaceName,
                });
                continue;
            };

            output.records.push(InterfaceRecord {
                category,
                sub_category: slots[1].clone(),
                third_category: slots[2].clone(),
                interface_name,
                target_url: fields.target_url,
                description: fields.description,
                limit_info: fields.limit_info,
                input_params: fields.input_params,
                output_params: fields.output_params,
                example: fields.example,
                data_example: fields.data_example,
            });
        }

        output
    }

    /// Parses a document on a blocking task.
    ///
    /// # Errors
    /// Returns `InterfaceParseError` if the blocking task fails.
    pub async fn parse_async(
        document: String,
        options: InterfaceParseOptions,
    ) -> Result<ParseOutput, InterfaceParseError> {
        Ok(tokio::task::spawn_blocking(move || Self::parse(&document, &options)).await?)
    }

    /// Parses a document from a file path asynchronously.
    ///
    /// # Errors
    /// Returns `InterfaceParseError` if the file cannot be read.
    pub async fn parse_file(
        path: impl AsRef<Path>,
        options: InterfaceParseOptions,
    ) -> Result<ParseOutput, InterfaceParseError> {
        let document = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse_async(document, options).await
    }
}
