//! Studio Vision: restyle a photo with a studio preset through a hosted
//! image model, with the API key lifecycle handled server-side.

pub mod config;
pub mod credential;
pub mod data_url;
pub mod error;
pub mod gemini;
pub mod image_processing;
pub mod mcp_server;
pub mod presets;
pub mod session;
pub mod storage;
pub mod transform;
pub mod web_pages;

pub use error::{Result, StudioError};

use std::sync::Arc;

use config::StudioConfig;
use credential::{EnvFileHost, KeyManager};
use gemini::GeminiApi;
use session::Studio;
use storage::LocalFileStorage;
use transform::Transformer;

/// Wires storage, key manager and transformation client from a config.
pub fn build_studio(config: &StudioConfig) -> Arc<Studio> {
    let api = Arc::new(
        GeminiApi::new(config.api_base.clone()).with_probe_model(config.probe_model.clone()),
    );
    let storage = Arc::new(LocalFileStorage::new(config.data_dir.clone()));

    let mut keys = KeyManager::new(storage, api.clone())
        .with_env_credential(config.env_credential.clone());
    if let Some(path) = &config.host_key_file {
        keys = keys.with_host(Arc::new(EnvFileHost::new(
            path.clone(),
            config.host_select_command.clone(),
        )));
    }

    let transformer = Transformer::new(Arc::new(keys), api).with_model(config.image_model.clone());
    Arc::new(Studio::new(transformer))
}
