use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};
use surrealdb::Connection;
use toolsmith_store::schema::make_tool_name;
use tracing::{info, warn};

use crate::parsers::{InterfaceParseOptions, InterfaceParser};
use crate::source::DocumentSource;

use super::{ControlError, ToolsmithControlPlane};

/// Input payload for an ingestion run: inline markdown or a source location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedHeading {
    pub heading: String,
    pub reason: String,
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub source: Option<String>,
    pub record_count: usize,
    pub skipped: Vec<SkippedHeading>,
    /// Interfaces dropped because an earlier record maps to the same tool name.
    pub duplicates: Vec<String>,
}

impl<C: Connection> ToolsmithControlPlane<C> {
    /// Parses a markdown document and replaces the stored interface set.
    ///
    /// # Errors
    /// Returns `ControlError` if the parse task fails or the store write fails.
    pub async fn ingest_document(
        &self,
        document: String,
        options: InterfaceParseOptions,
    ) -> Result<IngestReport, ControlError> {
        let parsed = InterfaceParser::parse_async(document, options).await?;

        let skipped: Vec<SkippedHeading> = parsed
            .skipped
            .iter()
            .map(|skip| {
                warn!(heading = %skip.heading, reason = %skip.reason, "heading skipped");
                SkippedHeading {
                    heading: skip.heading.clone(),
                    reason: skip.reason.to_string(),
                }
            })
            .collect();

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let mut records = Vec::with_capacity(parsed.records.len());
        for record in parsed.records {
            let Some(tool_name) = make_tool_name(&record.interface_name) else {
                continue;
            };
            if seen.insert(tool_name) {
                records.push(record);
            } else {
                warn!(interface = %record.interface_name, "duplicate interface dropped");
                duplicates.push(record.interface_name);
            }
        }

        let record_count = self.interfaces().replace_all(records).await?;
        info!(
            records = record_count,
            skipped = skipped.len(),
            duplicates = duplicates.len(),
            "interface snapshot replaced"
        );
        Ok(IngestReport {
            source: None,
            record_count,
            skipped,
            duplicates,
        })
    }

    /// Fetches a document from `source` and ingests it.
    ///
    /// # Errors
    /// Returns `ControlError` if the fetch, parse, or store write fails.
    pub async fn ingest_source(
        &self,
        source: &DocumentSource,
        options: InterfaceParseOptions,
        fetch_timeout: Duration,
    ) -> Result<IngestReport, ControlError> {
        let document = source.fetch(fetch_timeout).await?;
        let mut report = self.ingest_document(document, options).await?;
        report.source = Some(source.to_string());
        Ok(report)
    }

    /// Ingests either the inline document or the source named in `request`.
    ///
    /// # Errors
    /// Returns `ControlError` if the request names neither or both inputs, or
    /// if ingestion fails.
    pub async fn ingest(
        &self,
        request: IngestRequest,
        options: InterfaceParseOptions,
        fetch_timeout: Duration,
    ) -> Result<IngestReport, ControlError> {
        match (request.document, request.source) {
            (Some(document), None) => self.ingest_document(document, options).await,
            (None, Some(source)) if !source.trim().is_empty() => {
                self.ingest_source(&DocumentSource::parse(&source), options, fetch_timeout)
                    .await
            }
            (Some(_), Some(_)) => Err(ControlError::InvalidRequest(
                "provide either document or source, not both".to_string(),
            )),
            _ => Err(ControlError::InvalidRequest(
                "document or source is required".to_string(),
            )),
        }
    }
}
