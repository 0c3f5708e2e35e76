use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `GREEKDASH__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: i64,
}

/// Payment provider credentials and webhook secret.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_billing_secret_key")]
    pub secret_key: String,
    #[serde(default = "default_webhook_secret")]
    pub webhook_secret: String,
    #[serde(default = "default_checkout_success_url")]
    pub checkout_success_url: String,
    #[serde(default = "default_checkout_cancel_url")]
    pub checkout_cancel_url: String,
    #[serde(default = "default_portal_return_url")]
    pub portal_return_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_key")]
    pub api_key: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    #[serde(default = "default_account_sid")]
    pub account_sid: String,
    #[serde(default = "default_auth_token")]
    pub auth_token: String,
    #[serde(default = "default_from_number")]
    pub from_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

// Default functions
fn default_node_id() -> String {
    "greekdash-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_session_ttl_hours() -> i64 {
    24
}
fn default_billing_secret_key() -> String {
    "sk_test_placeholder".to_string()
}
fn default_webhook_secret() -> String {
    "whsec_placeholder".to_string()
}
fn default_checkout_success_url() -> String {
    "https://app.greekdash.io/billing/success".to_string()
}
fn default_checkout_cancel_url() -> String {
    "https://app.greekdash.io/billing/cancelled".to_string()
}
fn default_portal_return_url() -> String {
    "https://app.greekdash.io/settings/billing".to_string()
}
fn default_email_api_key() -> String {
    "re_test_placeholder".to_string()
}
fn default_from_email() -> String {
    "no-reply@greekdash.io".to_string()
}
fn default_from_name() -> String {
    "GreekDash".to_string()
}
fn default_account_sid() -> String {
    "AC_placeholder".to_string()
}
fn default_auth_token() -> String {
    "twilio_auth_placeholder".to_string()
}
fn default_from_number() -> String {
    "+15550000000".to_string()
}
fn default_batch_size() -> usize {
    25
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            secret_key: default_billing_secret_key(),
            webhook_secret: default_webhook_secret(),
            checkout_success_url: default_checkout_success_url(),
            checkout_cancel_url: default_checkout_cancel_url(),
            portal_return_url: default_portal_return_url(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: default_email_api_key(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: default_account_sid(),
            auth_token: default_auth_token(),
            from_number: default_from_number(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            session: SessionConfig::default(),
            billing: BillingConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("GREEKDASH")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
