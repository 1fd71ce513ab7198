//! Code generation collaborator boundary.
//!
//! The orchestrator hands a [`SynthesisPrompt`] to an injected
//! [`CodeGenerator`] and receives module source back. The source is treated as
//! untrusted text; nothing here runs or checks it.

mod chat;

use std::{error::Error, fmt, fmt::Write as _};

use futures::future::BoxFuture;
use toolsmith_store::models::{InputSchema, InterfaceRecord};

pub use chat::{
    ChatCompletionsConfig,
    ChatCompletionsGenerator,
    DEFAULT_BASE_URL,
    DEFAULT_MODEL,
    DEFAULT_TEMPERATURE,
    extract_code,
};

/// Produces module source for one interface.
pub trait CodeGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        prompt: &'a SynthesisPrompt,
    ) -> BoxFuture<'a, Result<String, GenerationError>>;
}

#[derive(Debug)]
pub enum GenerationError {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    Malformed(String),
    EmptyResponse,
    MissingApiKey,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => write!(f, "generation request failed: {err}"),
            Self::Status { status, body } => {
                write!(f, "generation service answered {status}: {body}")
            }
            Self::Malformed(message) => write!(f, "malformed generation response: {message}"),
            Self::EmptyResponse => write!(f, "generation service returned no code"),
            Self::MissingApiKey => write!(f, "generation API key is not configured"),
        }
    }
}

impl Error for GenerationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Everything the collaborator is told about one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisPrompt {
    pub tool_name: String,
    pub interface_name: String,
    pub category_path: String,
    pub description: Option<String>,
    pub limit_info: Option<String>,
    pub input_params: Option<String>,
    pub output_params: Option<String>,
    pub example: Option<String>,
    pub input_schema: InputSchema,
}

fn or_none(value: Option<&str>) -> &str {
    value.unwrap_or("none")
}

impl SynthesisPrompt {
    #[must_use]
    pub fn new(
        record: &InterfaceRecord,
        tool_name: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            interface_name: record.interface_name.clone(),
            category_path: record.category_path(),
            description: record.description.clone(),
            limit_info: record.limit_info.clone(),
            input_params: record.input_params.clone(),
            output_params: record.output_params.clone(),
            example: record.example.clone(),
            input_schema,
        }
    }

    /// Renders the user message sent to the collaborator.
    #[must_use]
    pub fn render(&self) -> String {
        let parameters = if self.input_schema.is_empty() {
            "(none)".to_string()
        } else {
            self.input_schema
                .properties
                .iter()
                .map(|(name, property)| {
                    let required = if self.input_schema.required.contains(name) {
                        ", required"
                    } else {
                        ""
                    };
                    format!("{name}: {:?}{required}", property.kind)
                })
                .collect::<Vec<_>>()
                .join("; ")
        };

        let mut text = String::new();
        let _ = writeln!(
            text,
            "Write a Python module that implements the data interface described below."
        );
        let _ = writeln!(text);
        let _ = writeln!(text, "Interface name: {}", self.interface_name);
        let _ = writeln!(text, "Category: {}", self.category_path);
        let _ = writeln!(text, "Description: {}", or_none(self.description.as_deref()));
        let _ = writeln!(text, "Usage limits: {}", or_none(self.limit_info.as_deref()));
        let _ = writeln!(text, "Input parameters:\n{}", or_none(self.input_params.as_deref()));
        let _ = writeln!(text, "Output parameters:\n{}", or_none(self.output_params.as_deref()));
        let _ = writeln!(text, "Worked example:\n{}", or_none(self.example.as_deref()));
        let _ = writeln!(text, "Inferred parameters: {parameters}");
        let _ = writeln!(text);
        let _ = writeln!(text, "Requirements:");
        for rule in [
            "Call the library the worked example uses; do not scrape or re-implement the data \
             source.",
            "Define `async def execute(**params)` as the entry point. Accept the interface's \
             parameters by name.",
            "`execute` returns a list of dicts, one per record. Convert data frames with \
             `to_dict(orient=\"records\")`.",
            "`execute` raises on failure. Never return an empty list to hide an error.",
            "Define a synchronous `test()` that calls `asyncio.run(execute(...))` with the literal \
             arguments of the worked example and returns the result. It must not catch \
             exceptions.",
            "Include type hints and short comments.",
            "Add an `if __name__ == \"__main__\":` block that prints one call of \
             `execute`; it must not call `test()`.",
            "Return only the Python source, with no explanation around it.",
        ] {
            let _ = writeln!(text, "* {rule}");
        }
        text
    }
}
