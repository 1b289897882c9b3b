use std::path::PathBuf;

use tracing::warn;

pub const IMAGES_DIR: &str = "images/";
pub const OUTPUT_FILE: &str = "output.json";

pub const MODEL: &str = "gpt-4o-mini";
pub const TEMPERATURE: f32 = 0.0;
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const API_KEY_VAR: &str = "OPENAI_API_KEY";

pub struct PipelineConfig {
    pub images_dir: PathBuf,
    pub output_file: PathBuf,
    pub endpoint: String,
    pub api_key: Option<String>,
    /// `None` sizes the pool to the host CPU count.
    pub workers: Option<usize>,
}

impl PipelineConfig {
    /// Compiled-in paths plus the provider credential. A `.env` file in the
    /// working directory is loaded first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        if api_key.is_none() {
            warn!("{API_KEY_VAR} is not set; every image will fail at the structuring step");
        }

        PipelineConfig {
            images_dir: PathBuf::from(IMAGES_DIR),
            output_file: PathBuf::from(OUTPUT_FILE),
            endpoint: OPENAI_ENDPOINT.to_string(),
            api_key,
            workers: None,
        }
    }
}
