use crate::collector::DEFAULT_LISTENER_PORT;
use crate::parser::ConvertSettings;
use clap::Parser;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid listener URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Extension log level surface. The host-facing names include `fatal` and
/// `panic`, which both map onto the `error` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// Lenient parse: an unknown value falls back to the default instead of
    /// aborting. Returns whether a fallback happened so the caller can warn
    /// once logging is up.
    pub fn parse_lenient(value: &str) -> (Self, bool) {
        match value.to_lowercase().as_str() {
            "debug" => (Self::Debug, false),
            "info" => (Self::Info, false),
            "warn" => (Self::Warn, false),
            "error" => (Self::Error, false),
            "fatal" => (Self::Fatal, false),
            "panic" => (Self::Panic, false),
            _ => (Self::default(), true),
        }
    }

    /// The `tracing` filter directive this level maps to.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Fatal | Self::Panic => "error",
        }
    }
}

/// Startup configuration, environment-sourced with CLI overrides for local
/// runs. Validated once; read-only afterwards.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Ships the host's log stream to a remote listener", long_about = None)]
pub struct Config {
    /// Shipping token of the logs account
    #[arg(long, env = "LOGZIO_LOGS_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Listener endpoint URL logs are shipped to
    #[arg(long, env = "LOGZIO_LISTENER")]
    pub listener: String,

    /// Extension log level (debug/info/warn/error/fatal/panic)
    #[arg(long, env = "LOGS_EXT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Named sub-patterns as a JSON object, e.g. {"app":"cool app"}
    #[arg(long, env = "GROK_PATTERNS")]
    pub grok_patterns: Option<String>,

    /// Composite format string wiring the sub-patterns, e.g. "%{app:my_app}"
    #[arg(long, env = "LOGS_FORMAT")]
    pub logs_format: Option<String>,

    /// Static fields injected into every record, as k=v,k=v
    #[arg(long, env = "CUSTOM_FIELDS")]
    pub custom_fields: Option<String>,

    /// Merge top-level keys of a JSON message instead of nesting it
    #[arg(long, env = "FLATTEN_NESTED_MESSAGE", default_value = "false")]
    pub flatten_nested_message: String,

    /// Also subscribe to platform log records
    #[arg(long, env = "ENABLE_PLATFORM_LOGS", default_value = "false")]
    pub enable_platform_logs: String,

    /// Port the local push endpoint listens on
    #[arg(long, default_value_t = DEFAULT_LISTENER_PORT)]
    pub port: u16,

    /// Verbose transport logging in the shipper
    #[arg(long)]
    pub verbose_shipping: bool,

    /// Function name injected into every record (reserved host variable)
    #[arg(long, env = "AWS_LAMBDA_FUNCTION_NAME", hide = true)]
    pub function_name: Option<String>,

    /// Region injected into every record (reserved host variable)
    #[arg(long, env = "AWS_REGION", hide = true)]
    pub aws_region: Option<String>,
}

impl Config {
    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Self::try_parse_from(args)
            .map_err(|err| ConfigError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "shipping token must not be empty".to_string(),
            ));
        }
        Url::parse(&self.listener).map_err(|err| ConfigError::InvalidUrl {
            url: self.listener.clone(),
            reason: err.to_string(),
        })?;
        Ok(())
    }

    pub fn log_level(&self) -> (LogLevel, bool) {
        LogLevel::parse_lenient(&self.log_level)
    }

    /// Lenient boolean: only a case-insensitive "true" enables flattening.
    pub fn flatten_nested_message(&self) -> bool {
        self.flatten_nested_message.eq_ignore_ascii_case("true")
    }

    /// Lenient boolean with warning: anything unparseable keeps the default.
    pub fn enable_platform_logs(&self) -> (bool, bool) {
        match self.enable_platform_logs.to_lowercase().parse::<bool>() {
            Ok(enabled) => (enabled, false),
            Err(_) => (false, !self.enable_platform_logs.is_empty()),
        }
    }

    /// Log types the subscription asks the host for.
    pub fn subscription_types(&self) -> Vec<&'static str> {
        let (platform_logs, _) = self.enable_platform_logs();
        if platform_logs {
            vec!["platform", "function"]
        } else {
            vec!["function"]
        }
    }

    /// Parses the `k=v,k=v` custom field list, skipping malformed pairs.
    /// Returns the pairs and the rejected fragments for the caller to warn
    /// about.
    pub fn custom_fields(&self) -> (Vec<(String, String)>, Vec<String>) {
        let mut fields = Vec::new();
        let mut rejected = Vec::new();
        let Some(raw) = &self.custom_fields else {
            return (fields, rejected);
        };
        for pair in raw.split(',') {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    fields.push((key.to_string(), value.to_string()));
                }
                _ => rejected.push(pair.to_string()),
            }
        }
        (fields, rejected)
    }

    pub fn convert_settings(&self) -> ConvertSettings {
        let (custom_fields, _) = self.custom_fields();
        ConvertSettings {
            grok_patterns: self.grok_patterns.clone(),
            logs_format: self.logs_format.clone(),
            custom_fields,
            flatten_nested_message: self.flatten_nested_message(),
            function_name: self.function_name.clone(),
            aws_region: self.aws_region.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "lambda-log-shipper",
            "--token",
            "secret",
            "--listener",
            "https://listener.example:8071",
        ]
    }

    #[test]
    fn minimal_config_is_valid() {
        let config = Config::from_args_and_env(base_args()).unwrap();
        assert_eq!(config.port, DEFAULT_LISTENER_PORT);
        assert_eq!(config.log_level().0, LogLevel::Info);
        assert!(!config.flatten_nested_message());
        assert_eq!(config.subscription_types(), vec!["function"]);
    }

    #[test]
    #[serial_test::serial]
    fn environment_variables_fill_missing_args() {
        // set_var is unsafe in edition 2024; fine here since the test is
        // serialized against the other env-sensitive ones.
        unsafe {
            std::env::set_var("LOGZIO_LOGS_TOKEN", "env-token");
            std::env::set_var("LOGZIO_LISTENER", "https://listener.example:8071");
        }
        let config = Config::from_args_and_env(vec!["lambda-log-shipper"]).unwrap();
        unsafe {
            std::env::remove_var("LOGZIO_LOGS_TOKEN");
            std::env::remove_var("LOGZIO_LISTENER");
        }
        assert_eq!(config.token, "env-token");
        assert_eq!(config.listener, "https://listener.example:8071");
    }

    #[test]
    #[serial_test::serial]
    fn missing_listener_is_fatal() {
        let result = Config::from_args_and_env(vec![
            "lambda-log-shipper",
            "--token",
            "secret",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_listener_url_is_fatal() {
        let mut args = base_args();
        args[4] = "not a url";
        assert!(matches!(
            Config::from_args_and_env(args),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut args = base_args();
        args.extend(["--log-level", "loud"]);
        let config = Config::from_args_and_env(args).unwrap();
        let (level, fell_back) = config.log_level();
        assert_eq!(level, LogLevel::Info);
        assert!(fell_back);
    }

    #[test]
    fn fatal_and_panic_map_to_error_filter() {
        assert_eq!(LogLevel::Fatal.as_filter(), "error");
        assert_eq!(LogLevel::Panic.as_filter(), "error");
    }

    #[test]
    fn custom_fields_skip_malformed_pairs() {
        let mut args = base_args();
        args.extend(["--custom-fields", "env=prod,broken,team=infra,=nokey"]);
        let config = Config::from_args_and_env(args).unwrap();
        let (fields, rejected) = config.custom_fields();
        assert_eq!(
            fields,
            vec![
                ("env".to_string(), "prod".to_string()),
                ("team".to_string(), "infra".to_string()),
            ]
        );
        assert_eq!(rejected, vec!["broken".to_string(), "=nokey".to_string()]);
    }

    #[test]
    fn platform_logs_toggle_extends_subscription() {
        let mut args = base_args();
        args.extend(["--enable-platform-logs", "true"]);
        let config = Config::from_args_and_env(args).unwrap();
        assert_eq!(config.subscription_types(), vec!["platform", "function"]);
    }

    #[test]
    fn unparseable_platform_toggle_keeps_default_with_warning() {
        let mut args = base_args();
        args.extend(["--enable-platform-logs", "yes please"]);
        let config = Config::from_args_and_env(args).unwrap();
        let (enabled, fell_back) = config.enable_platform_logs();
        assert!(!enabled);
        assert!(fell_back);
    }

    #[test]
    fn flatten_toggle_is_case_insensitive_strict_true() {
        let mut args = base_args();
        args.extend(["--flatten-nested-message", "TRUE"]);
        let config = Config::from_args_and_env(args).unwrap();
        assert!(config.flatten_nested_message());

        let mut args = base_args();
        args.extend(["--flatten-nested-message", "1"]);
        let config = Config::from_args_and_env(args).unwrap();
        assert!(!config.flatten_nested_message());
    }
}
