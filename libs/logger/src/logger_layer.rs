use crate::config::LoggerConfigFormat;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;
use tracing_subscriber::{fmt, Layer};

/// Builds the subscriber layer for the configured format and filter.
pub fn build_logger(
  format: &LoggerConfigFormat,
  filter: &str,
) -> Result<Box<dyn Layer<Registry> + Send + Sync>, tracing_subscriber::filter::ParseError> {
  let filter = EnvFilter::try_new(filter)?;

  Ok(match format {
    LoggerConfigFormat::Json => fmt::Layer::<Registry>::default()
      .json()
      .with_ansi(false)
      .with_filter(filter)
      .boxed(),
    LoggerConfigFormat::Pretty => fmt::Layer::<Registry>::default()
      .pretty()
      .with_filter(filter)
      .boxed(),
    LoggerConfigFormat::Compact => fmt::Layer::<Registry>::default()
      .compact()
      .with_filter(filter)
      .boxed(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_a_layer_for_every_format() {
    for format in [
      LoggerConfigFormat::Compact,
      LoggerConfigFormat::Pretty,
      LoggerConfigFormat::Json,
    ] {
      assert!(build_logger(&format, "info").is_ok());
    }
  }

  #[test]
  fn rejects_invalid_filter_directives() {
    assert!(build_logger(&LoggerConfigFormat::Compact, "no=such=filter").is_err());
  }
}
