use std::fmt::Display;

use serde::Deserialize;

/// What the extractor knows about a video before downloading it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub title: String,
    pub ext: String,

    /// Duration in seconds, absent for live streams and some extractors
    #[serde(default)]
    pub duration: Option<f64>,
}

impl Display for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({}, {})", self.title, self.id, self.ext)?;
        if let Some(duration) = self.duration {
            write!(f, " {duration:.0}s")?;
        }
        Ok(())
    }
}
