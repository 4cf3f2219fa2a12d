//! Record normalization for the log stream.
//!
//! - `record`: the raw push-delivered record shape and the normalized output
//! - `grok`: named sub-patterns + composite format compiled into a matcher
//! - `convert`: the per-record fallback chain producing normalized output

pub mod convert;
pub mod grok;
pub mod record;

pub use convert::{ConvertSettings, RecordConverter};
pub use grok::{FieldExtractor, GrokError};
pub use record::{Batch, NormalizedRecord, RawRecord, RecordBody};
