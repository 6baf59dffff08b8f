pub mod domain;
pub mod ingest;
pub mod normalize;
pub mod refresh;

pub mod config {
    use crate::ingest::envelope::EnvelopeStrategy;
    use crate::normalize::{NormalizeOptions, RateSignPolicy, SheetLayout};
    use crate::refresh::PipelineOptions;
    use anyhow::Context;
    use std::time::Duration;

    /// Query endpoint of the dashboard tab, rendered as JSON.
    pub const DEFAULT_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/1p8vGk3QmZr7TnYc2LwXe5HsUa9DfJ0oKbRiN4yVtE6M/gviz/tq?tqx=out:json&sheet=Dashboard";

    pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub sheet_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub refresh_interval_secs: Option<String>,
        pub sheet_layout: Option<String>,
        pub rate_sign_policy: Option<String>,
        pub envelope_strategy: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sheet_url: std::env::var("SHEET_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                refresh_interval_secs: std::env::var("REFRESH_INTERVAL_SECS").ok(),
                sheet_layout: std::env::var("SHEET_LAYOUT").ok(),
                rate_sign_policy: std::env::var("RATE_SIGN_POLICY").ok(),
                envelope_strategy: std::env::var("ENVELOPE_STRATEGY").ok(),
            })
        }

        pub fn sheet_url(&self) -> &str {
            self.sheet_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SHEET_URL)
        }

        pub fn refresh_interval(&self) -> anyhow::Result<Duration> {
            let Some(raw) = non_empty(&self.refresh_interval_secs) else {
                return Ok(Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS));
            };
            let secs = raw
                .parse::<u64>()
                .with_context(|| format!("REFRESH_INTERVAL_SECS must be an integer (got {raw})"))?;
            anyhow::ensure!(secs > 0, "REFRESH_INTERVAL_SECS must be positive");
            Ok(Duration::from_secs(secs))
        }

        pub fn pipeline_options(&self) -> anyhow::Result<PipelineOptions> {
            let layout = match non_empty(&self.sheet_layout) {
                Some(s) => s.parse::<SheetLayout>().context("invalid SHEET_LAYOUT")?,
                None => SheetLayout::default(),
            };
            let rate_sign = match non_empty(&self.rate_sign_policy) {
                Some(s) => s.parse::<RateSignPolicy>().context("invalid RATE_SIGN_POLICY")?,
                None => RateSignPolicy::default(),
            };
            let envelope = match non_empty(&self.envelope_strategy) {
                Some(s) => s
                    .parse::<EnvelopeStrategy>()
                    .context("invalid ENVELOPE_STRATEGY")?,
                None => EnvelopeStrategy::default(),
            };

            Ok(PipelineOptions {
                envelope,
                normalize: NormalizeOptions {
                    columns: layout.columns(),
                    rate_sign,
                },
            })
        }
    }

    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_apply_when_unset() {
            let settings = Settings::default();
            assert_eq!(settings.sheet_url(), DEFAULT_SHEET_URL);
            assert_eq!(settings.refresh_interval().unwrap(), Duration::from_secs(300));
            assert_eq!(settings.pipeline_options().unwrap(), PipelineOptions::default());
        }

        #[test]
        fn overrides_are_parsed() {
            let settings = Settings {
                sheet_url: Some("http://localhost:9000/tq".to_string()),
                refresh_interval_secs: Some("60".to_string()),
                sheet_layout: Some("v1".to_string()),
                rate_sign_policy: Some("non_negative".to_string()),
                envelope_strategy: Some("first_last".to_string()),
                ..Default::default()
            };
            assert_eq!(settings.sheet_url(), "http://localhost:9000/tq");
            assert_eq!(settings.refresh_interval().unwrap(), Duration::from_secs(60));

            let options = settings.pipeline_options().unwrap();
            assert_eq!(options.envelope, EnvelopeStrategy::FirstLast);
            assert_eq!(options.normalize.columns.active_client_load, 14);
            assert_eq!(options.normalize.rate_sign, RateSignPolicy::NonNegative);
        }

        #[test]
        fn invalid_values_are_errors() {
            let zero = Settings {
                refresh_interval_secs: Some("0".to_string()),
                ..Default::default()
            };
            assert!(zero.refresh_interval().is_err());

            let layout = Settings {
                sheet_layout: Some("v9".to_string()),
                ..Default::default()
            };
            let err = layout.pipeline_options().unwrap_err();
            assert!(format!("{err:#}").contains("SHEET_LAYOUT"));
        }
    }
}
