use std::{fmt::Display, str::FromStr, sync::OnceLock};

use miette::miette;
use regex::Regex;

/// A position in a media stream, with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    millis: u64,
}

/// Accepts `SS`, `MM:SS` and `HH:MM:SS`, each with an optional fraction.
fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:(?P<h>\d+):)?(?P<m>\d+):)?(?P<s>\d+)(?:\.(?P<frac>\d{1,3}))?$")
            .expect("timestamp pattern is valid")
    })
}

impl Timestamp {
    pub fn from_seconds(secs: u64) -> Self {
        Self {
            millis: secs * 1000,
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.millis as f64 / 1000.0
    }
}

impl FromStr for Timestamp {
    type Err = Box<dyn std::error::Error + Sync + Send>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let cap = timestamp_regex()
            .captures(s)
            .ok_or_else(|| format!("Invalid timestamp '{s}', expected [[HH:]MM:]SS[.mmm]"))?;

        // The pattern only lets digits through, parsing can only overflow
        let field = |name| -> Result<u64, Self::Err> {
            cap.name(name)
                .map_or(Ok(0), |m| Ok(m.as_str().parse::<u64>()?))
        };

        let hours = field("h")?;
        let minutes = field("m")?;
        let seconds = field("s")?;

        // Only the leading field may overflow its unit
        if cap.name("m").is_some() && seconds >= 60 {
            return Err(Box::from(format!("Invalid timestamp '{s}': seconds must be below 60")));
        }
        if cap.name("h").is_some() && minutes >= 60 {
            return Err(Box::from(format!("Invalid timestamp '{s}': minutes must be below 60")));
        }

        // Right-pad the fraction so that ".5" means 500ms
        let millis = match cap.name("frac") {
            Some(m) => format!("{:0<3}", m.as_str()).parse::<u64>()?,
            None => 0,
        };

        let millis = hours
            .checked_mul(60)
            .and_then(|total| total.checked_add(minutes))
            .and_then(|total| total.checked_mul(60))
            .and_then(|total| total.checked_add(seconds))
            .and_then(|total| total.checked_mul(1000))
            .and_then(|total| total.checked_add(millis))
            .ok_or_else(|| format!("Invalid timestamp '{s}': too large"))?;

        Ok(Self { millis })
    }
}

impl Display for Timestamp {
    /// Format understood by ffmpeg's `-ss` and `-to`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total_secs = self.millis / 1000;
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            total_secs / 3600,
            (total_secs / 60) % 60,
            total_secs % 60,
            self.millis % 1000
        )
    }
}

/// The part of a stream to keep when trimming.
///
/// When there is no end, the clip continues until the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimRange {
    start: Timestamp,
    end: Option<Timestamp>,
}

impl TrimRange {
    pub fn new(start: Timestamp, end: Option<Timestamp>) -> miette::Result<Self> {
        if let Some(end) = end {
            if end <= start {
                return Err(miette!(
                    "The trim end ({end}) must come after the trim start ({start})"
                ));
            }
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }
}

impl Display for TrimRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end {
            Some(end) => write!(f, "{} - {}", self.start, end),
            None => write!(f, "{} - END", self.start),
        }
    }
}
