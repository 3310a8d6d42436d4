use std::sync::OnceLock;

use serde::Deserialize;

fn default_port() -> u16 {
    80
}

fn default_node_env() -> String {
    "development".to_string()
}

fn default_upstream_ws_url() -> String {
    "wss://prod.augmentos.cloud/tpa-ws".to_string()
}

/// Process environment. `PACKAGE_NAME` and `AUGMENTOS_API_KEY` are required;
/// everything else has a default. Missing required variables are the only
/// fatal startup error.
#[derive(Debug, Deserialize)]
pub struct Env {
    pub package_name: String,
    pub augmentos_api_key: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_node_env")]
    pub node_env: String,
    /// JSON descriptor of default user settings.
    #[serde(default)]
    pub settings_path: Option<String>,
    #[serde(default = "default_upstream_ws_url")]
    pub upstream_ws_url: String,
}

impl Env {
    pub fn is_production(&self) -> bool {
        self.node_env == "production"
    }
}

static ENV: OnceLock<Env> = OnceLock::new();

pub fn env() -> &'static Env {
    ENV.get_or_init(|| {
        let _ = dotenvy::dotenv();
        envy::from_env().expect("PACKAGE_NAME and AUGMENTOS_API_KEY must be set")
    })
}
