use super::grok::FieldExtractor;
use super::record::{
    Batch, EXTENSION_TYPE, FLD_AWS_REGION, FLD_FUNCTION_NAME, FLD_LAMBDA_RECORD, FLD_LAMBDA_TYPE,
    FLD_MESSAGE, FLD_MESSAGE_NESTED, FLD_TIMESTAMP, FLD_TYPE, NormalizedRecord, RawRecord,
    RecordBody,
};
use serde_json::Value;
use tracing::{debug, error, warn};

/// Read-only conversion configuration, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct ConvertSettings {
    /// JSON object of named sub-patterns, e.g. `{"app":"cool app"}`.
    pub grok_patterns: Option<String>,
    /// Composite format string wiring the sub-patterns together.
    pub logs_format: Option<String>,
    /// Static fields injected into every record; always win on name collision.
    pub custom_fields: Vec<(String, String)>,
    /// Merge top-level keys of a JSON-object message instead of nesting it.
    pub flatten_nested_message: bool,
    pub function_name: Option<String>,
    pub aws_region: Option<String>,
}

/// Turns one raw record into exactly one normalized record.
///
/// Conversion never fails: every error path degrades to the next fallback
/// tier, down to storing the verbatim input under `message`.
pub struct RecordConverter {
    extractor: Option<FieldExtractor>,
    settings: ConvertSettings,
}

impl RecordConverter {
    pub fn new(settings: ConvertSettings) -> Self {
        let extractor = match (&settings.grok_patterns, &settings.logs_format) {
            (Some(patterns), Some(format)) => match FieldExtractor::compile(patterns, format) {
                Ok(extractor) => Some(extractor),
                Err(err) => {
                    error!(%err, "field extraction disabled: pattern rules failed to compile");
                    None
                }
            },
            (None, None) => None,
            _ => {
                warn!(
                    "field extraction disabled: pattern rules and logs format must both be set"
                );
                None
            }
        };
        Self {
            extractor,
            settings,
        }
    }

    pub fn extraction_enabled(&self) -> bool {
        self.extractor.is_some()
    }

    /// Converts one raw record through the fallback chain.
    pub fn convert(&self, raw: &RawRecord) -> NormalizedRecord {
        let mut out = NormalizedRecord::new();
        out.insert(FLD_TIMESTAMP, Value::String(raw.time.clone()));
        out.insert(FLD_TYPE, Value::String(EXTENSION_TYPE.to_string()));
        out.insert(FLD_LAMBDA_TYPE, Value::String(raw.record_type.clone()));

        match &raw.record {
            RecordBody::Structured(value) => {
                // Non-text payloads pass through verbatim, no extraction.
                out.insert(FLD_LAMBDA_RECORD, value.clone());
            }
            RecordBody::Text(text) => self.convert_text(text, &mut out),
        }

        // Host identity, then custom fields: custom fields always win.
        if let Some(function_name) = &self.settings.function_name {
            out.insert(FLD_FUNCTION_NAME, Value::String(function_name.clone()));
        }
        if let Some(region) = &self.settings.aws_region {
            out.insert(FLD_AWS_REGION, Value::String(region.clone()));
        }
        for (key, value) in &self.settings.custom_fields {
            out.insert(key.clone(), Value::String(value.clone()));
        }

        out
    }

    fn convert_text(&self, text: &str, out: &mut NormalizedRecord) {
        if let Some(extractor) = &self.extractor {
            let fields = extractor.extract(text);
            if !fields.is_empty() {
                for (name, value) in fields {
                    // Each extracted value is independently re-probed: a JSON
                    // object is stored parsed, anything else stays a string.
                    match probe_json_object(&value) {
                        Some(object) => out.insert(name, object),
                        None => out.insert(name, Value::String(value)),
                    }
                }
                return;
            }
            debug!("pattern did not match, falling back to message probe");
        }

        match probe_json_object(text) {
            Some(Value::Object(object)) if self.settings.flatten_nested_message => {
                for (key, value) in object {
                    out.insert(key, value);
                }
            }
            Some(object) => out.insert(FLD_MESSAGE_NESTED, object),
            None => out.insert(FLD_MESSAGE, Value::String(text.to_string())),
        }
    }

    /// Converts a whole batch into a newline-delimited payload of independent
    /// JSON documents, preserving intra-batch order.
    pub fn convert_batch(&self, batch: &Batch) -> String {
        let mut lines = Vec::with_capacity(batch.len());
        for raw in batch {
            match self.convert(raw).to_json_line() {
                Ok(line) => lines.push(line),
                // Unreachable for string-keyed JSON trees, but never panic
                // on a log record.
                Err(err) => error!(%err, "failed to serialize normalized record"),
            }
        }
        lines.join("\n")
    }
}

/// Returns the parsed value only when the input is a JSON object.
fn probe_json_object(input: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(input) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_text(time: &str, record_type: &str, text: &str) -> RawRecord {
        RawRecord {
            time: time.to_string(),
            record_type: record_type.to_string(),
            record: RecordBody::Text(text.to_string()),
        }
    }

    #[test]
    fn plain_text_keeps_trailing_newline() {
        let converter = RecordConverter::new(ConvertSettings::default());
        let out = converter.convert(&raw_text("T", "function", "hello\n"));
        assert_eq!(out.get(FLD_MESSAGE), Some(&json!("hello\n")));
    }

    #[test]
    fn structured_record_passes_through_verbatim() {
        let converter = RecordConverter::new(ConvertSettings::default());
        let raw = RawRecord {
            time: "T".to_string(),
            record_type: "platform.report".to_string(),
            record: RecordBody::Structured(json!({"metrics": {"durationMs": 12.3}})),
        };
        let out = converter.convert(&raw);
        assert_eq!(
            out.get(FLD_LAMBDA_RECORD),
            Some(&json!({"metrics": {"durationMs": 12.3}}))
        );
        assert!(!out.contains(FLD_MESSAGE));
    }

    #[test]
    fn json_array_message_is_not_an_object() {
        let converter = RecordConverter::new(ConvertSettings::default());
        let out = converter.convert(&raw_text("T", "function", "[1,2,3]"));
        assert_eq!(out.get(FLD_MESSAGE), Some(&json!("[1,2,3]")));
        assert!(!out.contains(FLD_MESSAGE_NESTED));
    }

    #[test]
    fn extracted_json_object_value_is_stored_parsed() {
        let settings = ConvertSettings {
            grok_patterns: Some(r#"{"any":".*"}"#.to_string()),
            logs_format: Some("payload=%{any:payload}".to_string()),
            ..ConvertSettings::default()
        };
        let converter = RecordConverter::new(settings);
        let out = converter.convert(&raw_text("T", "function", r#"payload={"a":1}"#));
        assert_eq!(out.get("payload"), Some(&json!({"a": 1})));
    }

    #[test]
    fn compile_failure_disables_extraction_without_panicking() {
        let settings = ConvertSettings {
            grok_patterns: Some("not json".to_string()),
            logs_format: Some("%{x:y}".to_string()),
            ..ConvertSettings::default()
        };
        let converter = RecordConverter::new(settings);
        assert!(!converter.extraction_enabled());
        let out = converter.convert(&raw_text("T", "function", "hello"));
        assert_eq!(out.get(FLD_MESSAGE), Some(&json!("hello")));
    }

    #[test]
    fn batch_payload_is_newline_delimited_in_order() {
        let converter = RecordConverter::new(ConvertSettings::default());
        let batch = vec![
            raw_text("T1", "function", "first"),
            raw_text("T2", "function", "second"),
        ];
        let payload = converter.convert_batch(&batch);
        let lines: Vec<&str> = payload.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("first"));
        assert!(lines[1].contains("second"));
        // Independent documents, never a JSON array.
        assert!(!payload.starts_with('['));
    }
}
