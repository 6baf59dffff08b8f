pub mod columns;

pub use columns::{ColumnMap, SheetLayout};

use crate::domain::{
    ActivityPoint, NormalizedDataset, RevenuePoint, SourceBreakdown, SummaryMetrics,
};
use crate::ingest::error::{IngestError, IngestResult};
use crate::ingest::types::{ParsedTable, Row};
use std::str::FromStr;

/// How conversion and win rates are read. Both variants match a sheet version seen upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RateSignPolicy {
    /// Use the cell as-is, negative values included.
    #[default]
    PassThrough,
    /// Use the absolute value.
    NonNegative,
}

impl RateSignPolicy {
    pub fn apply(&self, rate: f64) -> f64 {
        match self {
            Self::PassThrough => rate,
            Self::NonNegative => rate.abs(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::NonNegative => "non_negative",
        }
    }
}

impl FromStr for RateSignPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass_through" | "passthrough" => Ok(Self::PassThrough),
            "non_negative" | "abs" => Ok(Self::NonNegative),
            other => anyhow::bail!("unknown rate sign policy: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub columns: ColumnMap,
    pub rate_sign: RateSignPolicy,
}

pub fn normalize(
    table: &ParsedTable,
    options: &NormalizeOptions,
) -> IngestResult<NormalizedDataset> {
    if table.is_empty() {
        return Err(IngestError::EmptyDataset);
    }
    let cols = &options.columns;

    let summary = summary_from_row(&table.rows[0], options);

    let mut revenue_trend = Vec::new();
    let mut activity = Vec::new();
    let mut source_breakdown = Vec::new();

    for row in &table.rows {
        if let Some(label) = row.cell(cols.period_label).label() {
            if let Some(amount) = row.cell(cols.revenue_amount).value.as_number() {
                revenue_trend.push(RevenuePoint {
                    period_label: label.clone(),
                    amount,
                });
            }
            if let Some(count) = row.cell(cols.activity_count).value.as_number() {
                activity.push(ActivityPoint {
                    period_label: label,
                    count,
                });
            }
        }

        if let Some(entry) = breakdown_from_row(row, options) {
            source_breakdown.push(entry);
        }
    }

    tracing::debug!(
        rows = table.rows.len(),
        revenue_points = revenue_trend.len(),
        activity_points = activity.len(),
        sources = source_breakdown.len(),
        "normalized sheet rows"
    );

    Ok(NormalizedDataset {
        summary,
        revenue_trend,
        activity,
        source_breakdown,
    })
}

fn summary_from_row(row: &Row, options: &NormalizeOptions) -> SummaryMetrics {
    let cols = &options.columns;
    SummaryMetrics {
        total_opportunities: row.cell(cols.total_opportunities).value.as_count(),
        qualified_conversations: row.cell(cols.qualified_conversations).value.as_count(),
        converted_clients: row.cell(cols.converted_clients).value.as_count(),
        conversion_rate: options
            .rate_sign
            .apply(row.cell(cols.conversion_rate).value.number_or_zero()),
        total_revenue: row.cell(cols.total_revenue).value.number_or_zero(),
        // Downstream per-client figures divide by this.
        active_client_load: row.cell(cols.active_client_load).value.as_count().max(1),
    }
}

fn breakdown_from_row(row: &Row, options: &NormalizeOptions) -> Option<SourceBreakdown> {
    let cols = &options.columns;
    let source_name = row.cell(cols.source_name).label()?;
    let win_rate = row.cell(cols.source_win_rate).value.as_number()?;

    Some(SourceBreakdown {
        source_name,
        qualified_count: row.cell(cols.source_qualified).value.as_count(),
        converted_count: row.cell(cols.source_converted).value.as_count(),
        win_rate: options.rate_sign.apply(win_rate),
        attributed_revenue: row
            .cell(cols.source_attributed_revenue)
            .value
            .number_or_zero()
            .max(0.0),
    })
}
