pub mod dashboard;

pub use dashboard::{
    ActivityPoint, DashboardSnapshot, NormalizedDataset, RefreshPhase, RevenuePoint,
    SourceBreakdown, SummaryMetrics,
};
