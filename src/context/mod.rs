//! Context extraction: focus lines with their neighbours.

mod bundle;
mod extractor;
mod timestamp;

pub use bundle::ContextBundle;
pub use extractor::ContextExtractor;
pub use timestamp::TimestampSniffer;
