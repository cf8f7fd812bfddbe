use archive_search_core::{
    Backoff, ElasticsearchStore, FieldBoost, MatchOperator, MatchSettings, RetryPolicy,
    StoreError, DEFAULT_PAGE_SIZE,
};
use clap::{Args, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Elasticsearch base URL
    #[arg(long = "es-url", env = "ES_HOST", default_value = "http://localhost:9200")]
    pub es_url: String,

    /// Index holding the PDF documents
    #[arg(long, env = "ES_INDEX", default_value = "pdf_documents")]
    pub index: String,

    /// Per-request timeout against the store, in seconds
    #[arg(long, env = "ES_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Connection attempts made at startup
    #[arg(long, env = "CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: u32,

    /// Delay between connection attempts, in milliseconds
    #[arg(long, env = "CONNECT_BACKOFF_MS", default_value_t = 2_000)]
    pub connect_backoff_ms: u64,

    /// Double the delay after every failed attempt, up to this many milliseconds
    #[arg(long, env = "CONNECT_BACKOFF_MAX_MS")]
    pub connect_backoff_max_ms: Option<u64>,
}

impl StoreArgs {
    pub fn build_store(&self) -> Result<ElasticsearchStore, StoreError> {
        ElasticsearchStore::connect_to(
            &self.es_url,
            &self.index,
            Duration::from_secs(self.request_timeout_secs.max(1)),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let initial = Duration::from_millis(self.connect_backoff_ms);
        let backoff = match self.connect_backoff_max_ms {
            Some(max) => Backoff::Exponential {
                initial,
                max: Duration::from_millis(max),
            },
            None => Backoff::Fixed(initial),
        };

        RetryPolicy {
            max_attempts: self.connect_attempts.max(1),
            backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OperatorArg {
    And,
    Or,
}

impl From<OperatorArg> for MatchOperator {
    fn from(value: OperatorArg) -> Self {
        match value {
            OperatorArg::And => MatchOperator::And,
            OperatorArg::Or => MatchOperator::Or,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct MatchArgs {
    /// Results per page
    #[arg(long, env = "PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u64,

    /// How query terms combine
    #[arg(long, value_enum, default_value = "or")]
    pub match_operator: OperatorArg,

    /// Minimum share of terms that must match, e.g. 75%; "none" disables it
    #[arg(long, default_value = "75%")]
    pub minimum_should_match: String,

    /// Boost applied to title matches
    #[arg(long, default_value_t = 2.0)]
    pub title_boost: f32,
}

impl MatchArgs {
    pub fn settings(&self) -> MatchSettings {
        let title = if (self.title_boost - 1.0).abs() < f32::EPSILON {
            FieldBoost::new("title")
        } else {
            FieldBoost::boosted("title", self.title_boost)
        };

        let minimum = self.minimum_should_match.trim();
        MatchSettings {
            fields: vec![title, FieldBoost::new("content")],
            operator: self.match_operator.into(),
            minimum_should_match: (!minimum.is_empty() && !minimum.eq_ignore_ascii_case("none"))
                .then(|| minimum.to_string()),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address the HTTP API listens on
    #[arg(long, env = "API_ADDRESS", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Directory PDFs are served from
    #[arg(long, env = "PDF_ROOT")]
    pub pdf_root: Option<PathBuf>,

    /// Bearer token required by the bulk endpoint
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Origins allowed by CORS
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://frontend:3000"
    )]
    pub cors_origins: Vec<String>,

    #[command(flatten)]
    pub matching: MatchArgs,
}
