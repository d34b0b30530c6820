use std::{io::BufRead, path::PathBuf};

use clap::Parser;
use indoc::indoc;
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::warn;

use crate::{
    actors::Job,
    config::Settings,
    types::{Timestamp, TrimRange},
};

macro_rules! arg_env {
    ($v:literal) => {
        concat!("GRABCLIP_", $v)
    };
}

const AFTER_HELP: &str = indoc! {"
    Examples:
      grabclip https://www.youtube.com/watch?v=dQw4w9WgXcQ
      grabclip --rename intro --trim --start 0:05 --end 1:30 <URL>

    Timestamps are written [[HH:]MM:]SS[.mmm].
    Requires yt-dlp (or youtube-dl) and ffmpeg to be installed.
"};

/// Wrapper-tool around `yt-dlp` to download a web video,
/// optionally rename it and trim it to a time range.
#[derive(Parser, Debug)]
#[command(version, after_help = AFTER_HELP)]
pub struct Args {
    /// The URLs of the videos to download.
    /// Asked interactively when none is given
    pub urls: Vec<String>,

    /// The path to the output directory
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// New name for the downloaded file. The original extension is kept when none is given.
    /// Only usable with a single URL
    #[arg(long)]
    pub rename: Option<String>,

    /// Trim the downloaded file to the range given by --start and --end
    #[arg(long, requires = "start")]
    pub trim: bool,

    /// Where the trimmed video starts
    #[arg(long)]
    pub start: Option<Timestamp>,

    /// Where the trimmed video ends. Until the end of the video when not set
    #[arg(long)]
    pub end: Option<Timestamp>,

    /// The extractor format selector
    #[arg(long)]
    pub format: Option<String>,

    /// Path to a TOML configuration file
    #[arg(long, env = arg_env!("CONFIG_FILE"))]
    pub config: Option<PathBuf>,

    /// Do not show the progress bar
    #[arg(long, env = arg_env!("NO_PROGRESS"))]
    pub no_progress: bool,

    /// Show more logs. Can be repeated
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only show errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Apply the command line overrides on top of the loaded settings
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(out) = &self.out {
            settings.out_dir = out.clone();
        }
        if let Some(format) = &self.format {
            settings.format = format.clone();
        }
    }

    /// The trim range, when trimming is enabled
    pub fn trim_range(&self) -> Result<Option<TrimRange>> {
        if !self.trim {
            if self.start.is_some() || self.end.is_some() {
                warn!("--start and --end are ignored without --trim");
            }
            return Ok(None);
        }

        let start = self
            .start
            .ok_or_else(|| miette!("--trim needs a --start timestamp"))?;
        TrimRange::new(start, self.end).map(Some)
    }

    /// Build the jobs for the worker.
    ///
    /// `urls` are the ones from the command line or the prompt.
    pub fn jobs(&self, urls: Vec<String>) -> Result<Vec<Job>> {
        let urls = validate_urls(urls)?;

        if self.rename.is_some() && urls.len() > 1 {
            return Err(miette!("--rename can only be used with a single URL"));
        }

        let trim = self.trim_range()?;
        Ok(urls
            .into_iter()
            .map(|url| Job {
                url,
                rename: self.rename.clone(),
                trim,
            })
            .collect())
    }
}

/// Trim the URLs and refuse empty ones
pub fn validate_urls(urls: Vec<String>) -> Result<Vec<String>> {
    let urls: Vec<String> = urls.into_iter().map(|url| url.trim().to_owned()).collect();

    if urls.is_empty() || urls.iter().any(String::is_empty) {
        return Err(miette!("Please enter a valid URL"));
    }

    Ok(urls)
}

/// Ask for a URL on the given input, one line.
pub fn prompt_url<R: BufRead>(mut input: R) -> Result<String> {
    eprint!("Enter video URL: ");

    let mut line = String::new();
    input
        .read_line(&mut line)
        .into_diagnostic()
        .wrap_err("Could not read the URL")?;

    Ok(line.trim().to_owned())
}
