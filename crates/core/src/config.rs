use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `PHASE_BUILDER__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub campaign_id: Option<i64>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Session credentials attached to every request as
/// `X-Auth-Token`, `X-User-Email` and `X-Company-Id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company_id: String,
}

// Default functions
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            campaign_id: None,
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.email.is_empty() && !self.company_id.is_empty()
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("PHASE_BUILDER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Resource root for one campaign, e.g.
    /// `http://localhost:3000/api/v1/campaigns/42`.
    pub fn campaign_root(&self, campaign_id: i64) -> String {
        format!(
            "{}/api/v1/campaigns/{}",
            self.api.base_url.trim_end_matches('/'),
            campaign_id
        )
    }
}
