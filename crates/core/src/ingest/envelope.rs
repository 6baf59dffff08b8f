//! Unwrapping of the JSONP-style response envelope.
//!
//! The endpoint answers with `<prefix>(<json>)<suffix>`. Two extraction strategies are
//! supported:
//!
//! - [`EnvelopeStrategy::FirstLast`]: first `(` to last `)`. Fragile: a `)` anywhere in
//!   the suffix, or an envelope without a closing call, yields a wrong or failed slice.
//! - [`EnvelopeStrategy::Balanced`]: first `(` to the `)` that balances it, skipping over
//!   JSON string literals, so parentheses inside cell text never end the document early.

use crate::ingest::error::{IngestError, IngestResult};
use crate::ingest::types::{ParsedTable, QueryResponse, Row};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvelopeStrategy {
    #[default]
    Balanced,
    FirstLast,
}

impl EnvelopeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::FirstLast => "first_last",
        }
    }
}

impl FromStr for EnvelopeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "first_last" | "first-last" => Ok(Self::FirstLast),
            other => anyhow::bail!("unknown envelope strategy: {other}"),
        }
    }
}

/// Returns the text between the envelope's parentheses, or `None` when no pair exists.
pub fn extract_payload(text: &str, strategy: EnvelopeStrategy) -> Option<&str> {
    let (start, end) = match strategy {
        EnvelopeStrategy::FirstLast => first_last_span(text)?,
        EnvelopeStrategy::Balanced => balanced_span(text)?,
    };
    Some(text[start + 1..end].trim())
}

fn first_last_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('(')?;
    let end = text.rfind(')')?;
    if end <= start {
        return None;
    }
    Some((start, end))
}

fn balanced_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('(')?;
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset));
                }
            }
            _ => {}
        }
    }

    None
}

/// Unwraps the envelope and decodes the embedded query response into a [`ParsedTable`].
pub fn parse(text: &str, strategy: EnvelopeStrategy) -> IngestResult<ParsedTable> {
    let payload = extract_payload(text, strategy).ok_or_else(|| {
        IngestError::Format(format!(
            "no parenthesised JSON document in response envelope (strategy={})",
            strategy.as_str()
        ))
    })?;

    let response = serde_json::from_str::<QueryResponse>(payload)
        .map_err(|e| IngestError::Format(format!("embedded document is not valid JSON: {e}")))?;

    if response.status.as_deref() == Some("error") {
        let reasons = response
            .errors
            .iter()
            .map(|issue| {
                issue
                    .detailed_message
                    .as_deref()
                    .or(issue.reason.as_deref())
                    .unwrap_or("unknown")
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(IngestError::Format(format!(
            "query endpoint reported an error: {reasons}"
        )));
    }

    let rows = response
        .table
        .ok_or_else(|| IngestError::Format("response has no table".to_string()))?
        .rows
        .ok_or_else(|| IngestError::Format("table has no rows array".to_string()))?;

    let table = ParsedTable {
        rows: rows.into_iter().map(Row::from).collect(),
    };
    tracing::debug!(
        rows = table.rows.len(),
        strategy = strategy.as_str(),
        "parsed query response"
    );
    Ok(table)
}
