//! Run settings and command line configuration.

use crate::classifier::{BatchClassifier, DEFAULT_BATCH_SIZE};
use crate::graph::ChartStyle;
use crate::report::ColorScheme;
use std::num::NonZeroUsize;

/// Row cap applied by the dashboard profile.
pub const DASHBOARD_MAX_ROWS: usize = 1000;

const DASHBOARD_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(50).unwrap();

/// Largest upload accepted by the web front end (16 MiB).
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// A presentation profile: how big the batches are, whether rows are capped,
/// and how the report is colored and charted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "web", derive(clap::ValueEnum))]
pub enum Profile {
    /// Batches of 32, no row cap, fixed palette, pie chart
    #[default]
    Classic,
    /// Batches of 50, at most 1000 rows, generated hues, donut chart
    Dashboard,
}

/// Everything a single classification run needs besides the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSettings {
    pub batch_size: NonZeroUsize,
    pub max_rows: Option<usize>,
    pub colors: ColorScheme,
    pub chart: ChartStyle,
}

impl RunSettings {
    pub fn classifier(&self) -> BatchClassifier {
        BatchClassifier::new(self.batch_size).with_row_limit(self.max_rows)
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Profile::Classic.settings()
    }
}

impl Profile {
    pub fn settings(self) -> RunSettings {
        match self {
            Profile::Classic => RunSettings {
                batch_size: DEFAULT_BATCH_SIZE,
                max_rows: None,
                colors: ColorScheme::Palette,
                chart: ChartStyle::Pie,
            },
            Profile::Dashboard => RunSettings {
                batch_size: DASHBOARD_BATCH_SIZE,
                max_rows: Some(DASHBOARD_MAX_ROWS),
                colors: ColorScheme::Hues,
                chart: ChartStyle::Donut,
            },
        }
    }
}

#[cfg(feature = "web")]
pub use cli::{ModelArgs, RunArgs, ServerConfig};

#[cfg(feature = "web")]
mod cli {
    use super::{MAX_UPLOAD_BYTES, Profile, RunSettings};
    use crate::model::{DEFAULT_MODEL_URL, HttpModelLoader, LoadPolicy, ModelHandle};
    use clap::{Args, Parser};
    use std::net::SocketAddr;
    use std::num::NonZeroUsize;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    /// Where the emotion model lives and how it is loaded.
    #[derive(Args, Clone, Debug)]
    pub struct ModelArgs {
        /// Text-classification inference endpoint
        #[arg(long, env = "EMOTION_MODEL_URL", default_value = DEFAULT_MODEL_URL)]
        pub model_url: String,

        /// Bearer token for the inference endpoint
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        pub model_token: Option<String>,

        /// Load the model once and reuse it, or load it for every run
        #[arg(long, env = "EMOTION_MODEL_LOAD", value_enum, default_value_t = LoadPolicy::Once)]
        pub load_policy: LoadPolicy,

        /// Per-request timeout for the inference endpoint, in seconds
        #[arg(long, env = "EMOTION_MODEL_TIMEOUT", default_value_t = 30)]
        pub model_timeout: u64,
    }

    impl ModelArgs {
        pub fn handle(&self) -> ModelHandle {
            let loader = HttpModelLoader {
                url: self.model_url.clone(),
                token: self.model_token.clone(),
                timeout: Duration::from_secs(self.model_timeout),
            };
            ModelHandle::new(Arc::new(loader), self.load_policy)
        }
    }

    /// Profile selection plus per-setting overrides.
    #[derive(Args, Clone, Debug)]
    pub struct RunArgs {
        /// Presentation profile
        #[arg(long, env = "EMOTION_PROFILE", value_enum, default_value_t = Profile::Classic)]
        pub profile: Profile,

        /// Override the profile's batch size
        #[arg(long, env = "EMOTION_BATCH_SIZE")]
        pub batch_size: Option<NonZeroUsize>,

        /// Override the profile's row cap
        #[arg(long, env = "EMOTION_MAX_ROWS")]
        pub max_rows: Option<usize>,
    }

    impl RunArgs {
        pub fn settings(&self) -> RunSettings {
            let mut settings = self.profile.settings();
            if let Some(batch_size) = self.batch_size {
                settings.batch_size = batch_size;
            }
            if let Some(max_rows) = self.max_rows {
                settings.max_rows = Some(max_rows);
            }
            settings
        }
    }

    /// Web server configuration.
    #[derive(Parser, Clone, Debug)]
    #[command(name = "emotion-web")]
    #[command(about = "Upload a spreadsheet and get an emotion report for one column", long_about = None)]
    pub struct ServerConfig {
        /// Address to listen on
        #[arg(long, env = "EMOTION_BIND", default_value = "127.0.0.1:3000")]
        pub bind: SocketAddr,

        /// Directory uploaded spreadsheets are kept in until classified
        #[arg(long, env = "EMOTION_UPLOAD_DIR", default_value = "uploads")]
        pub upload_dir: PathBuf,

        /// Largest accepted upload, in bytes
        #[arg(long, env = "EMOTION_MAX_UPLOAD_BYTES", default_value_t = MAX_UPLOAD_BYTES)]
        pub max_upload_bytes: usize,

        #[command(flatten)]
        pub model: ModelArgs,

        #[command(flatten)]
        pub run: RunArgs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "web")]
    use crate::model::LoadPolicy;

    #[test]
    fn classic_profile() {
        let settings = Profile::Classic.settings();
        assert_eq!(settings.batch_size.get(), 32);
        assert_eq!(settings.max_rows, None);
        assert_eq!(settings.colors, ColorScheme::Palette);
        assert_eq!(settings.chart, ChartStyle::Pie);
    }

    #[test]
    fn dashboard_profile() {
        let settings = Profile::Dashboard.settings();
        assert_eq!(settings.batch_size.get(), 50);
        assert_eq!(settings.max_rows, Some(1000));
        assert_eq!(settings.colors, ColorScheme::Hues);
        assert_eq!(settings.chart, ChartStyle::Donut);

        let classifier = settings.classifier();
        assert!(classifier.check_row_limit(1000).is_ok());
        assert!(classifier.check_row_limit(1001).is_err());
    }

    #[cfg(feature = "web")]
    #[test]
    fn overrides_apply_on_top_of_profile() {
        use clap::Parser;

        let config = ServerConfig::try_parse_from([
            "emotion-web",
            "--profile",
            "dashboard",
            "--batch-size",
            "8",
            "--load-policy",
            "per-call",
        ])
        .unwrap();

        let settings = config.run.settings();
        assert_eq!(settings.batch_size.get(), 8);
        assert_eq!(settings.max_rows, Some(1000));
        assert_eq!(config.model.load_policy, LoadPolicy::PerCall);
        assert_eq!(config.max_upload_bytes, MAX_UPLOAD_BYTES);
    }

    #[cfg(feature = "web")]
    #[test]
    fn zero_batch_size_is_rejected() {
        use clap::Parser;

        assert!(ServerConfig::try_parse_from(["emotion-web", "--batch-size", "0"]).is_err());
    }
}
