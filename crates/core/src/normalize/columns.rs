//! Column offsets of the dashboard sheet.
//!
//! Offsets are a contract with one specific sheet layout, not with header names. When the
//! sheet gains or moves a column, add a new [`SheetLayout`] instead of editing an old one.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub total_opportunities: usize,
    pub qualified_conversations: usize,
    pub converted_clients: usize,
    pub conversion_rate: usize,
    pub total_revenue: usize,
    pub activity_count: usize,
    pub period_label: usize,
    pub revenue_amount: usize,
    pub source_name: usize,
    pub source_qualified: usize,
    pub source_converted: usize,
    pub source_win_rate: usize,
    pub source_attributed_revenue: usize,
    pub active_client_load: usize,
}

const BASE: ColumnMap = ColumnMap {
    total_opportunities: 0,
    qualified_conversations: 1,
    converted_clients: 2,
    conversion_rate: 3,
    total_revenue: 4,
    activity_count: 5,
    period_label: 6,
    revenue_amount: 7,
    source_name: 8,
    source_qualified: 9,
    source_converted: 10,
    source_win_rate: 11,
    source_attributed_revenue: 12,
    active_client_load: 13,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SheetLayout {
    /// Original sheet: client load one column further right, after a spacer column.
    V1,
    #[default]
    V2,
}

impl SheetLayout {
    pub fn columns(&self) -> ColumnMap {
        match self {
            Self::V1 => ColumnMap {
                active_client_load: 14,
                ..BASE
            },
            Self::V2 => BASE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl FromStr for SheetLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => anyhow::bail!("unknown sheet layout: {other}"),
        }
    }
}

impl Default for ColumnMap {
    fn default() -> Self {
        SheetLayout::default().columns()
    }
}
