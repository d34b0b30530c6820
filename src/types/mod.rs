mod metadata;
mod timestamp;

pub use metadata::Metadata;
pub use timestamp::{Timestamp, TrimRange};
