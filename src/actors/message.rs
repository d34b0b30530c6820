use std::path::PathBuf;

use crate::types::TrimRange;

/// A unit of work for the download worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub url: String,
    pub rename: Option<String>,
    pub trim: Option<TrimRange>,
}

/// Messages posted by the worker to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Metadata is known and the download is about to start
    Started { url: String, title: String },

    /// Download progress of the current job, in percent
    Progress(f64),

    /// Free-form status text
    Status(String),

    /// The job is done and its file is at the given path
    Completed(PathBuf),

    /// The job failed, the worker moves on to the next one
    Failed { url: String, message: String },
}
