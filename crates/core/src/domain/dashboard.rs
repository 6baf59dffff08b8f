use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Headline figures read from the first sheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_opportunities: u64,
    pub qualified_conversations: u64,
    pub converted_clients: u64,
    /// Nominally in [0, 1]; the sheet does not enforce it.
    pub conversion_rate: f64,
    pub total_revenue: f64,
    /// Never 0.
    pub active_client_load: u64,
}

impl SummaryMetrics {
    pub fn revenue_per_active_client(&self) -> f64 {
        self.total_revenue / self.active_client_load.max(1) as f64
    }

    pub fn qualification_rate(&self) -> f64 {
        if self.total_opportunities == 0 {
            return 0.0;
        }
        self.qualified_conversations as f64 / self.total_opportunities as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub period_label: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPoint {
    pub period_label: String,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub source_name: String,
    pub qualified_count: u64,
    pub converted_count: u64,
    pub win_rate: f64,
    pub attributed_revenue: f64,
}

/// Everything one normalize call produces. Data only enters a snapshot as a whole dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDataset {
    pub summary: SummaryMetrics,
    pub revenue_trend: Vec<RevenuePoint>,
    pub activity: Vec<ActivityPoint>,
    pub source_breakdown: Vec<SourceBreakdown>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    #[default]
    Idle,
    Fetching,
    Success,
    Failed,
}

/// What the presentation layer sees. Published whole; never edited after publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub snapshot_id: Option<Uuid>,
    pub summary: Option<SummaryMetrics>,
    pub revenue_trend: Vec<RevenuePoint>,
    pub activity: Vec<ActivityPoint>,
    pub source_breakdown: Vec<SourceBreakdown>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub loading: bool,
    pub error: Option<String>,
    pub phase: RefreshPhase,
}

impl DashboardSnapshot {
    /// Successor of `self` while a pass is running. Data and error stay visible.
    pub fn fetching(&self, at: DateTime<Utc>) -> Self {
        Self {
            loading: true,
            phase: RefreshPhase::Fetching,
            last_attempt: Some(at),
            ..self.clone()
        }
    }

    /// Fresh snapshot built from one successful pass.
    pub fn published(dataset: NormalizedDataset, snapshot_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            snapshot_id: Some(snapshot_id),
            summary: Some(dataset.summary),
            revenue_trend: dataset.revenue_trend,
            activity: dataset.activity,
            source_breakdown: dataset.source_breakdown,
            last_updated: Some(at),
            last_attempt: Some(at),
            loading: false,
            error: None,
            phase: RefreshPhase::Success,
        }
    }

    /// Successor of `self` after a failed pass: last good data kept, error attached.
    pub fn failed(&self, message: impl Into<String>) -> Self {
        Self {
            loading: false,
            error: Some(message.into()),
            phase: RefreshPhase::Failed,
            ..self.clone()
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match self.last_updated {
            Some(at) => now - at > max_age,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dataset(revenue: f64) -> NormalizedDataset {
        NormalizedDataset {
            summary: SummaryMetrics {
                total_opportunities: 40,
                qualified_conversations: 10,
                converted_clients: 4,
                conversion_rate: 0.4,
                total_revenue: revenue,
                active_client_load: 4,
            },
            revenue_trend: vec![RevenuePoint {
                period_label: "Jan".to_string(),
                amount: revenue,
            }],
            activity: vec![],
            source_breakdown: vec![],
        }
    }

    #[test]
    fn derived_metrics_use_client_floor() {
        let mut summary = dataset(1000.0).summary;
        assert_eq!(summary.revenue_per_active_client(), 250.0);
        assert_eq!(summary.qualification_rate(), 0.25);

        summary.active_client_load = 0;
        summary.total_opportunities = 0;
        assert_eq!(summary.revenue_per_active_client(), 1000.0);
        assert_eq!(summary.qualification_rate(), 0.0);
    }

    #[test]
    fn failure_keeps_previous_data() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let good = DashboardSnapshot::published(dataset(1000.0), Uuid::new_v4(), at);

        let later = at + chrono::Duration::minutes(5);
        let failed = good.fetching(later).failed("transport error: boom");

        assert_eq!(failed.summary, good.summary);
        assert_eq!(failed.revenue_trend, good.revenue_trend);
        assert_eq!(failed.snapshot_id, good.snapshot_id);
        assert_eq!(failed.last_updated, Some(at));
        assert_eq!(failed.last_attempt, Some(later));
        assert!(!failed.loading);
        assert_eq!(failed.phase, RefreshPhase::Failed);
        assert_eq!(failed.error.as_deref(), Some("transport error: boom"));
    }

    #[test]
    fn publish_clears_error() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let failed = DashboardSnapshot::default().fetching(at).failed("boom");
        assert!(failed.summary.is_none());

        let next = DashboardSnapshot::published(dataset(5.0), Uuid::new_v4(), at);
        assert!(next.error.is_none());
        assert!(!next.loading);
        assert_eq!(next.phase, RefreshPhase::Success);
    }

    #[test]
    fn staleness_is_measured_from_last_success() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let snap = DashboardSnapshot::published(dataset(1.0), Uuid::new_v4(), at);
        let max_age = chrono::Duration::minutes(10);
        assert!(!snap.is_stale(at + chrono::Duration::minutes(5), max_age));
        assert!(snap.is_stale(at + chrono::Duration::minutes(11), max_age));
        assert!(DashboardSnapshot::default().is_stale(at, max_age));
    }
}
