use clap::Parser;
use anyhow::Context;
use salesdash_core::domain::RefreshPhase;
use salesdash_core::refresh::{RefreshOutcome, RefreshScheduler};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "salesdash_worker")]
struct Args {
    /// Run a single refresh pass, print the snapshot as JSON and exit.
    #[arg(long)]
    once: bool,
}

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

    let args = Args::parse();

    let scheduler = RefreshScheduler::from_settings(&settings)?;

    if args.once {
        return run_once(&scheduler).await;
    }

    let mut updates = scheduler.subscribe();
    scheduler.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                match snapshot.phase {
                    RefreshPhase::Success => tracing::info!(
                        snapshot_id = ?snapshot.snapshot_id,
                        revenue_points = snapshot.revenue_trend.len(),
                        sources = snapshot.source_breakdown.len(),
                        "dashboard snapshot refreshed"
                    ),
                    RefreshPhase::Failed => tracing::warn!(
                        error = snapshot.error.as_deref().unwrap_or_default(),
                        showing_snapshot_id = ?snapshot.snapshot_id,
                        "dashboard refresh failed"
                    ),
                    RefreshPhase::Idle | RefreshPhase::Fetching => {}
                }
            }
        }
    }

    scheduler.stop();
    Ok(())
}

async fn run_once(scheduler: &RefreshScheduler) -> anyhow::Result<()> {
    match scheduler.refresh_now().await {
        RefreshOutcome::Published { snapshot_id } => {
            let json = serde_json::to_string_pretty(&scheduler.snapshot())
                .context("serialize dashboard snapshot failed")?;
            println!("{json}");
            tracing::info!(%snapshot_id, "one-shot refresh complete");
            Ok(())
        }
        RefreshOutcome::Failed(err) => {
            let err = anyhow::Error::new(err).context("one-shot refresh failed");
            sentry_anyhow::capture_anyhow(&err);
            Err(err)
        }
        other => anyhow::bail!("one-shot refresh did not run: {other:?}"),
    }
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
