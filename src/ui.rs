use std::{
    io::{IsTerminal, Write},
    path::PathBuf,
};

use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use tracing::debug;

use crate::actors::Update;

/// A line for the status display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Info(String),
    Success(String),
    Error(String),
}

/// Visible state of the interface, fed by the worker updates.
#[derive(Debug, Default)]
pub struct StatusBoard {
    percent: f64,
    current_title: Option<String>,
    completed: Vec<PathBuf>,
    failed: Vec<(String, String)>,
}

impl StatusBoard {
    /// Apply an update and return the status line to show for it, if any.
    pub fn apply(&mut self, update: Update) -> Option<StatusLine> {
        match update {
            Update::Started { url, title } => {
                debug!("Started {url}");
                self.percent = 0.0;
                let line = StatusLine::Info(format!("Downloading: {title}"));
                self.current_title = Some(title);
                Some(line)
            }
            Update::Progress(percent) => {
                self.percent = percent.clamp(0.0, 100.0);
                None
            }
            Update::Status(text) => Some(StatusLine::Info(text)),
            Update::Completed(path) => {
                self.percent = 100.0;
                self.current_title = None;
                let line = StatusLine::Success(format!("Downloaded: {}", path.display()));
                self.completed.push(path);
                Some(line)
            }
            Update::Failed { url, message } => {
                self.current_title = None;
                let line = StatusLine::Error(format!("Error: {message}"));
                self.failed.push((url, message));
                Some(line)
            }
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn current_title(&self) -> Option<&str> {
        self.current_title.as_deref()
    }

    pub fn completed(&self) -> &[PathBuf] {
        &self.completed
    }

    pub fn failed(&self) -> &[(String, String)] {
        &self.failed
    }
}

/// Renders the board on the terminal: a progress bar and status lines on stderr.
pub struct TerminalUi {
    bar: ProgressBar,
    colors: bool,
}

impl TerminalUi {
    pub fn new(show_progress: bool) -> Result<Self> {
        let colors = std::io::stderr().is_terminal();

        let bar = if show_progress {
            let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {wide_msg}")
                    .into_diagnostic()?
                    .progress_chars("=> "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        Ok(Self { bar, colors })
    }

    /// Process the worker updates until the worker closes its channel.
    ///
    /// Runs on the thread that owns the terminal.
    pub fn run(&self, updates: Receiver<Update>) -> StatusBoard {
        let mut board = StatusBoard::default();

        for update in updates {
            let line = board.apply(update);

            // The bar is whole percents, rounding down so 100 means done
            self.bar.set_position(board.percent().floor() as u64);
            self.bar
                .set_message(board.current_title().unwrap_or_default().to_owned());

            if let Some(line) = line {
                self.print(&line);
            }
        }

        debug!("Update channel closed");
        self.bar.finish_and_clear();
        board
    }

    pub fn print(&self, line: &StatusLine) {
        let text = match (line, self.colors) {
            (StatusLine::Info(text), _) => text.clone(),
            (StatusLine::Success(text), true) => text.green().to_string(),
            (StatusLine::Error(text), true) => text.red().to_string(),
            (StatusLine::Success(text) | StatusLine::Error(text), false) => text.clone(),
        };

        // Print above the bar instead of through it
        self.bar.suspend(|| {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{text}");
        });
    }
}
