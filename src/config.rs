use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use url::Url;

use crate::credential::Credential;
use crate::gemini::{DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL, DEFAULT_PROBE_MODEL};

const DEFAULT_PORT: u16 = 3000;
const ENV_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub port: u16,
    pub secret_key: Option<String>,
    pub data_dir: PathBuf,
    pub api_base: String,
    pub image_model: String,
    pub probe_model: String,
    pub env_credential: Option<Credential>,
    pub host_key_file: Option<PathBuf>,
    pub host_select_command: Option<String>,
}

impl StudioConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match var("STUDIO_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("STUDIO_PORT is not a valid port: {raw}"))?,
            None => DEFAULT_PORT,
        };

        let data_dir = var("STUDIO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let api_base = var("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        validate_base_url(&api_base)?;

        let env_credential = ENV_KEY_VARS
            .iter()
            .find_map(|name| var(*name))
            .and_then(Credential::new);

        Ok(Self {
            port,
            secret_key: var("SECRET_KEY"),
            data_dir,
            api_base,
            image_model: var("STUDIO_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.into()),
            probe_model: var("STUDIO_PROBE_MODEL").unwrap_or_else(|| DEFAULT_PROBE_MODEL.into()),
            env_credential,
            host_key_file: var("STUDIO_HOST_KEY_FILE").map(PathBuf::from),
            host_select_command: var("STUDIO_HOST_SELECT_CMD"),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn mcp_path(&self) -> String {
        match self.secret_key.as_deref() {
            Some(value) => format!("/{value}/mcp"),
            None => "/mcp".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    let mut base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("studio-vision");
    base
}

fn validate_base_url(raw: &str) -> Result<()> {
    let parsed = Url::parse(raw).with_context(|| format!("GEMINI_API_BASE is not a URL: {raw}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(anyhow!("GEMINI_API_BASE must be http or https, got {scheme}")),
    }
}
