use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// Sub-pattern references deeper than this are rejected as cyclic.
const MAX_EXPANSION_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum GrokError {
    #[error("pattern rule set is not a JSON object of name → pattern: {0}")]
    InvalidRuleSet(#[from] serde_json::Error),
    #[error("format references unknown sub-pattern %{{{0}}}")]
    UnknownPattern(String),
    #[error("sub-pattern expansion exceeded depth {MAX_EXPANSION_DEPTH} while expanding '{0}' (cyclic reference?)")]
    ExpansionTooDeep(String),
    #[error("compiled pattern is not a valid regex: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Compiled matcher for a set of named sub-patterns wired together by one
/// composite format string.
///
/// Format syntax follows grok: `%{name}` splices a sub-pattern in place,
/// `%{name:field}` additionally captures what it matched under `field`.
/// Sub-patterns may reference each other; cycles and unknown names fail
/// compilation. Matching is unanchored substring search, so trailing
/// unconsumed input is fine.
#[derive(Debug)]
pub struct FieldExtractor {
    regex: Regex,
}

impl FieldExtractor {
    /// Compiles a rule set given as a JSON object (name → pattern) plus the
    /// composite format string. Compilation failure is a configuration-time
    /// error: callers report it once and run without extraction.
    pub fn compile(rules_json: &str, format: &str) -> Result<Self, GrokError> {
        let rules: HashMap<String, String> = serde_json::from_str(rules_json)?;
        Self::compile_rules(&rules, format)
    }

    pub fn compile_rules(rules: &HashMap<String, String>, format: &str) -> Result<Self, GrokError> {
        let pattern = expand(format, rules, 0)?;
        // Duplicate capture names are rejected here by the regex crate.
        let regex = Regex::new(&pattern)?;
        Ok(Self { regex })
    }

    /// Applies the matcher and returns the named captures that participated
    /// in the match. Non-match and zero named captures both come back as an
    /// empty map; the caller treats that as "extraction yielded nothing".
    pub fn extract(&self, input: &str) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        let Some(caps) = self.regex.captures(input) else {
            return fields;
        };
        for name in self.regex.capture_names().flatten() {
            if let Some(matched) = caps.name(name) {
                fields.insert(name.to_string(), matched.as_str().to_string());
            }
        }
        fields
    }
}

/// Recursively replaces `%{name}` / `%{name:field}` references with their
/// sub-pattern definitions, turning captures into regex named groups.
fn expand(
    template: &str,
    rules: &HashMap<String, String>,
    depth: usize,
) -> Result<String, GrokError> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(GrokError::ExpansionTooDeep(template.to_string()));
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference: keep it literal.
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let reference = &after[..end];
        let (name, capture) = match reference.split_once(':') {
            Some((name, field)) => (name, Some(field)),
            None => (reference, None),
        };
        let pattern = rules
            .get(name)
            .ok_or_else(|| GrokError::UnknownPattern(name.to_string()))?;
        let expanded = expand(pattern, rules, depth + 1)?;
        match capture {
            Some(field) => {
                out.push_str("(?P<");
                out.push_str(field);
                out.push('>');
                out.push_str(&expanded);
                out.push(')');
            }
            None => {
                out.push_str("(?:");
                out.push_str(&expanded);
                out.push(')');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
