use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, PartialEq)]
/// Output format of the gateway logger.
pub enum LoggerConfigFormat {
  /// Minimal, compact logs. Focuses on the essential parts of the log
  /// message and its fields, suited for production environments.
  #[serde(rename = "compact")]
  #[schemars(title = "compact")]
  Compact,

  /// Verbose output with well-formatted fields and context, for development
  /// and debugging.
  #[serde(rename = "pretty")]
  #[schemars(title = "pretty")]
  Pretty,

  /// JSON logs, for log aggregators and analysis systems.
  #[serde(rename = "json")]
  #[schemars(title = "json")]
  Json,
}

fn default_filter() -> String {
  "info".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, PartialEq)]
pub struct LoggerConfig {
  /// The format to use for logging.
  #[serde(default = "LoggerConfig::default_format")]
  pub format: LoggerConfigFormat,

  /// An `env_filter`-style directive string, e.g. `info` or
  /// `switchboard=debug,info`.
  #[serde(default = "default_filter")]
  pub filter: String,
}

impl LoggerConfig {
  fn default_format() -> LoggerConfigFormat {
    LoggerConfigFormat::Compact
  }
}

impl Default for LoggerConfig {
  fn default() -> Self {
    LoggerConfig {
      format: LoggerConfig::default_format(),
      filter: default_filter(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deserializes_with_defaults() {
    let config: LoggerConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.format, LoggerConfigFormat::Compact);
    assert_eq!(config.filter, "info");

    let config: LoggerConfig =
      serde_json::from_str(r#"{"format":"json","filter":"debug"}"#).unwrap();
    assert_eq!(config.format, LoggerConfigFormat::Json);
    assert_eq!(config.filter, "debug");
  }
}
