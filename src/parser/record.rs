use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Output field names.
pub const FLD_TIMESTAMP: &str = "@timestamp";
pub const FLD_TYPE: &str = "type";
pub const FLD_LAMBDA_TYPE: &str = "lambda.log.type";
pub const FLD_LAMBDA_RECORD: &str = "lambda.record";
pub const FLD_MESSAGE: &str = "message";
pub const FLD_MESSAGE_NESTED: &str = "message_nested";
pub const FLD_FUNCTION_NAME: &str = "function_name";
pub const FLD_AWS_REGION: &str = "aws_region";

/// Marker value stored under `type` in every normalized record.
pub const EXTENSION_TYPE: &str = "lambda-extension-logs";

/// One push-delivered group of raw records. Delivered atomically; intra-batch
/// order is preserved end-to-end.
pub type Batch = Vec<RawRecord>;

/// One log record exactly as the Logs API delivers it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub time: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub record: RecordBody,
}

/// The two shapes the `record` field arrives in: free text for function
/// output, an arbitrary JSON value for platform records.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordBody {
    Text(String),
    Structured(Value),
}

impl RecordBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }
}

/// A normalized record: an ordered field-name → value mapping ready to be
/// serialized as one NDJSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    fields: Map<String, Value>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serializes the record as a single JSON document (one NDJSON line).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }
}
