//! File and environment settings for container defaults.
//!
//! ```toml
//! # barstack.toml
//! width = 100
//! refresh_rate = "80ms"
//! ```
//!
//! Every key can be overridden with a `BARSTACK_` environment variable, e.g.
//! `BARSTACK_REFRESH_RATE=250ms`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::{Error, Result};
use crate::progress::{ProgressBuilder, DEFAULT_REFRESH_RATE, DEFAULT_WIDTH};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Line width used when the terminal width cannot be read.
    pub width: usize,
    /// Time between frames, e.g. "120ms".
    pub refresh_rate: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            refresh_rate: format!("{}ms", DEFAULT_REFRESH_RATE.as_millis()),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus `BARSTACK_*` environment variables.
    ///
    /// A file that cannot be opened is an [`Error::Io`]; one that does not
    /// parse is an [`Error::Config`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            fs::metadata(path)?;
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("BARSTACK"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn refresh_rate(&self) -> Result<Duration> {
        parse_duration(&self.refresh_rate)
    }

    /// Apply these settings to a container builder.
    pub fn apply(&self, builder: ProgressBuilder) -> Result<ProgressBuilder> {
        Ok(builder
            .width(self.width)
            .refresh_rate(self.refresh_rate()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_container_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.width, DEFAULT_WIDTH);
        assert_eq!(settings.refresh_rate().unwrap(), DEFAULT_REFRESH_RATE);
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "width = 100").unwrap();
        writeln!(file, "refresh_rate = \"80ms\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.width, 100);
        assert_eq!(settings.refresh_rate().unwrap(), Duration::from_millis(80));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "width = 60").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.width, 60);
        assert_eq!(settings.refresh_rate, Settings::default().refresh_rate);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(Some(&dir.path().join("barstack.toml")));
        match result {
            Err(Error::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected an I/O error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "width = ").unwrap();

        let result = Settings::load(Some(file.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn bad_refresh_rate_is_reported() {
        let settings = Settings {
            refresh_rate: "fast".to_string(),
            ..Default::default()
        };
        assert!(settings.refresh_rate().is_err());
    }
}
