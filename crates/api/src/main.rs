use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use salesdash_core::domain::DashboardSnapshot;
use salesdash_core::refresh::{RefreshOutcome, RefreshScheduler};

/// Snapshots older than two refresh periods are flagged as stale.
const STALE_AFTER_INTERVALS: u32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = salesdash_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let scheduler = match RefreshScheduler::from_settings(&settings) {
        Ok(scheduler) => Arc::new(scheduler),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            return Err(e);
        }
    };
    let stale_after =
        chrono::Duration::from_std(settings.refresh_interval()? * STALE_AFTER_INTERVALS)?;
    scheduler.start();

    let state = AppState {
        scheduler: scheduler.clone(),
        stale_after,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/refresh", post(refresh_dashboard))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    scheduler: Arc<RefreshScheduler>,
    stale_after: chrono::Duration,
}

#[derive(Debug, Serialize)]
struct ApiDashboard {
    stale: bool,
    revenue_per_active_client: Option<f64>,
    qualification_rate: Option<f64>,
    snapshot: DashboardSnapshot,
}

impl ApiDashboard {
    fn new(snapshot: DashboardSnapshot, stale_after: chrono::Duration) -> Self {
        Self {
            stale: snapshot.is_stale(chrono::Utc::now(), stale_after),
            revenue_per_active_client: snapshot
                .summary
                .as_ref()
                .map(|s| s.revenue_per_active_client()),
            qualification_rate: snapshot.summary.as_ref().map(|s| s.qualification_rate()),
            snapshot,
        }
    }
}

async fn get_dashboard(State(state): State<AppState>) -> Json<ApiDashboard> {
    Json(ApiDashboard::new(state.scheduler.snapshot(), state.stale_after))
}

async fn refresh_dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiDashboard>, StatusCode> {
    match state.scheduler.refresh_now().await {
        RefreshOutcome::Published { .. } | RefreshOutcome::Failed(_) => {
            let snapshot = state.scheduler.snapshot();
            Ok(Json(ApiDashboard::new(snapshot, state.stale_after)))
        }
        RefreshOutcome::Skipped => Err(StatusCode::CONFLICT),
        RefreshOutcome::Discarded => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &salesdash_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesdash_core::domain::RefreshPhase;
    use salesdash_core::ingest::{IngestError, IngestResult, SheetSource};
    use salesdash_core::refresh::PipelineOptions;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn body(revenue: f64) -> String {
        let doc = serde_json::json!({
            "table": { "rows": [
                { "c": [
                    {"v": 40}, {"v": 10}, {"v": 4}, {"v": 0.4}, {"v": revenue},
                    {"v": 3}, {"v": "Jan"}, {"v": revenue}, {"v": "Referral"},
                    {"v": 10}, {"v": 4}, {"v": 0.4}, {"v": revenue}, {"v": 4}
                ]}
            ]}
        });
        format!("google.visualization.Query.setResponse({doc});")
    }

    struct QueuedSource {
        responses: Mutex<VecDeque<IngestResult<String>>>,
    }

    #[async_trait::async_trait]
    impl SheetSource for QueuedSource {
        fn source_name(&self) -> &'static str {
            "queued"
        }

        async fn fetch(&self) -> IngestResult<String> {
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(IngestError::Transport("no response queued".into())))
        }
    }

    struct HeldSource {
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl SheetSource for HeldSource {
        fn source_name(&self) -> &'static str {
            "held"
        }

        async fn fetch(&self) -> IngestResult<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(body(10.0))
        }
    }

    fn state(source: Arc<dyn SheetSource>) -> AppState {
        let scheduler =
            RefreshScheduler::new(source, PipelineOptions::default(), Duration::from_secs(300));
        AppState {
            scheduler: Arc::new(scheduler),
            stale_after: chrono::Duration::minutes(10),
        }
    }

    fn queued(responses: Vec<IngestResult<String>>) -> AppState {
        state(Arc::new(QueuedSource {
            responses: Mutex::new(responses.into()),
        }))
    }

    #[tokio::test]
    async fn dashboard_before_first_refresh_is_empty_and_stale() {
        let Json(dashboard) = get_dashboard(State(queued(vec![]))).await;
        assert!(dashboard.stale);
        assert_eq!(dashboard.snapshot.phase, RefreshPhase::Idle);
        assert!(dashboard.snapshot.summary.is_none());
        assert_eq!(dashboard.revenue_per_active_client, None);
    }

    #[tokio::test]
    async fn refresh_returns_published_snapshot_with_derived_metrics() {
        let state = queued(vec![Ok(body(2000.0))]);

        let Json(dashboard) = refresh_dashboard(State(state.clone())).await.unwrap();
        assert!(!dashboard.stale);
        assert_eq!(dashboard.snapshot.phase, RefreshPhase::Success);
        assert_eq!(dashboard.revenue_per_active_client, Some(500.0));
        assert_eq!(dashboard.qualification_rate, Some(0.25));
        assert_eq!(dashboard.snapshot.source_breakdown.len(), 1);

        let Json(read_back) = get_dashboard(State(state)).await;
        assert_eq!(read_back.snapshot, dashboard.snapshot);
    }

    #[tokio::test]
    async fn failed_refresh_is_ok_with_error_and_previous_data() {
        let state = queued(vec![
            Ok(body(2000.0)),
            Err(IngestError::Transport("sheet endpoint HTTP 500".into())),
        ]);

        let Json(good) = refresh_dashboard(State(state.clone())).await.unwrap();
        let Json(failed) = refresh_dashboard(State(state)).await.unwrap();

        assert_eq!(failed.snapshot.phase, RefreshPhase::Failed);
        assert!(!failed.snapshot.loading);
        assert!(failed.snapshot.error.as_deref().unwrap().contains("HTTP 500"));
        assert_eq!(failed.snapshot.snapshot_id, good.snapshot.snapshot_id);
        assert_eq!(failed.snapshot.summary, good.snapshot.summary);
        assert_eq!(failed.snapshot.revenue_trend, good.snapshot.revenue_trend);
    }

    #[tokio::test]
    async fn overlapping_refresh_is_conflict() {
        let source = Arc::new(HeldSource {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let state = state(source.clone());

        let first = tokio::spawn(refresh_dashboard(State(state.clone())));
        source.entered.notified().await;

        let second = refresh_dashboard(State(state.clone())).await;
        assert_eq!(second.unwrap_err(), StatusCode::CONFLICT);

        source.release.notify_one();
        let Json(dashboard) = first.await.unwrap().unwrap();
        assert_eq!(dashboard.snapshot.phase, RefreshPhase::Success);
    }

    #[tokio::test]
    async fn refresh_after_shutdown_is_unavailable() {
        let state = queued(vec![Ok(body(1.0))]);
        state.scheduler.stop();

        let res = refresh_dashboard(State(state)).await;
        assert_eq!(res.unwrap_err(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await, "ok");
    }
}
