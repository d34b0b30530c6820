use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;

/// Prefix of the environment variables overriding the configuration
pub const ENV_PREFIX: &str = "GRABCLIP";

/// Prefer an mp4 video with an m4a audio track so that the merged file stays mp4
pub const DEFAULT_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Settings that rarely change between two runs.
///
/// Loaded from, by increasing priority: the defaults, the config file,
/// the `GRABCLIP_*` environment variables. Command line flags come last.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub out_dir: PathBuf,

    /// The extractor format selector
    pub format: String,

    /// The extractor output filename template, relative to `out_dir`
    pub output_template: String,

    /// Extractor program to use instead of looking for `yt-dlp` and `youtube-dl`
    pub ytdl_program: Option<String>,

    pub ffmpeg_program: Option<String>,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_env(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("out_dir", ".")
            .and_then(|b| b.set_default("format", DEFAULT_FORMAT))
            .and_then(|b| b.set_default("output_template", DEFAULT_OUTPUT_TEMPLATE))
            .into_diagnostic()?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(true));
        }

        builder
            .add_source(env)
            .build()
            .and_then(Config::try_deserialize)
            .into_diagnostic()
            .wrap_err("Could not load the configuration")
    }
}
