//! Configuration for dterm.
//!
//! Settings are read from `~/.dterm/config.toml` (or the file given with
//! `--config`). Every key is optional:
//!
//! ```toml
//! # How the screen size is found: auto, direct, fallback
//! geometry = "auto"
//!
//! # Glyph drawn at the start of each row
//! filler = "~"
//!
//! # Ctrl+<quit_key> ends the session
//! quit_key = "q"
//!
//! # Raw-mode read timeout in tenths of a second (1-255)
//! read_timeout = 1
//!
//! # trace, debug, info, warn, error, off
//! log_level = "info"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

use crate::core::geometry::GeometryStrategy;
use crate::error::{Error, Result};

/// Main configuration, as written in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geometry: String,
    pub filler: String,
    pub quit_key: String,
    pub read_timeout: u8,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geometry: "auto".to_string(),
            filler: "~".to_string(),
            quit_key: "q".to_string(),
            read_timeout: 1,
            log_level: "info".to_string(),
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub strategy: GeometryStrategy,
    pub filler: char,
    pub quit_key: u8,
    pub read_timeout: u8,
    pub log_level: LevelFilter,
}

impl Config {
    /// Read a config file. A missing file is `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Config(format!("{}: {}", path.display(), e))),
        };
        Self::parse(&content)
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check every value and convert it to the type the session uses.
    pub fn settings(&self) -> Result<Settings> {
        Ok(Settings {
            strategy: self.geometry_strategy()?,
            filler: self.filler_char()?,
            quit_key: self.quit_key()?,
            read_timeout: self.read_timeout()?,
            log_level: self.log_level()?,
        })
    }

    pub fn geometry_strategy(&self) -> Result<GeometryStrategy> {
        GeometryStrategy::by_name(&self.geometry).ok_or_else(|| {
            Error::Config(format!(
                "unknown geometry strategy {:?} (expected auto, direct or fallback)",
                self.geometry
            ))
        })
    }

    /// Exactly one printable character.
    pub fn filler_char(&self) -> Result<char> {
        let mut chars = self.filler.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => Ok(c),
            _ => Err(Error::Config(format!(
                "filler must be a single printable character, got {:?}",
                self.filler
            ))),
        }
    }

    /// An ASCII letter, used together with Ctrl.
    pub fn quit_key(&self) -> Result<u8> {
        match self.quit_key.as_bytes() {
            [b] if b.is_ascii_alphabetic() => Ok(b.to_ascii_lowercase()),
            _ => Err(Error::Config(format!(
                "quit_key must be a single letter, got {:?}",
                self.quit_key
            ))),
        }
    }

    pub fn read_timeout(&self) -> Result<u8> {
        // VMIN = 0 with VTIME = 0 would make every read return at once.
        if self.read_timeout == 0 {
            return Err(Error::Config("read_timeout must be at least 1".to_string()));
        }
        Ok(self.read_timeout)
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| Error::Config(format!("unknown log level {:?}", self.log_level)))
    }
}

/// `~/.dterm`
pub fn dterm_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".dterm"))
}

/// `~/.dterm/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dterm_dir().map(|dir| dir.join("config.toml"))
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dterm-{}-{}.toml", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let settings = Config::default().settings().unwrap();
        assert_eq!(
            settings,
            Settings {
                strategy: GeometryStrategy::Auto,
                filler: '~',
                quit_key: b'q',
                read_timeout: 1,
                log_level: LevelFilter::INFO,
            }
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("geometry = \"Fallback\"\nread_timeout = 5\n").unwrap();
        assert_eq!(config.filler, "~");
        assert_eq!(config.quit_key, "q");

        let settings = config.settings().unwrap();
        assert_eq!(settings.strategy, GeometryStrategy::Fallback);
        assert_eq!(settings.read_timeout, 5);
    }

    #[test]
    fn test_strategy_names_case_insensitive() {
        for (name, expected) in [
            ("AUTO", GeometryStrategy::Auto),
            ("Direct", GeometryStrategy::Direct),
            ("fallback", GeometryStrategy::Fallback),
        ] {
            let config = Config {
                geometry: name.to_string(),
                ..Config::default()
            };
            assert_eq!(config.geometry_strategy().unwrap(), expected);
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad = [
            Config {
                geometry: "guess".to_string(),
                ..Config::default()
            },
            Config {
                filler: "ab".to_string(),
                ..Config::default()
            },
            Config {
                filler: String::new(),
                ..Config::default()
            },
            Config {
                quit_key: "1".to_string(),
                ..Config::default()
            },
            Config {
                read_timeout: 0,
                ..Config::default()
            },
            Config {
                log_level: "loud".to_string(),
                ..Config::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.settings(), Err(Error::Config(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_quit_key_is_lowercased() {
        let config = Config {
            quit_key: "X".to_string(),
            ..Config::default()
        };
        assert_eq!(config.quit_key().unwrap(), b'x');
    }

    #[test]
    fn test_read_missing_file() {
        let path = std::env::temp_dir().join("dterm-does-not-exist/config.toml");
        assert_eq!(Config::read(&path).unwrap(), None);
    }

    #[test]
    fn test_read_file() {
        let path = scratch_file("read", "filler = \".\"\nlog_level = \"debug\"\n");
        let config = Config::read(&path).unwrap().unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.filler_char().unwrap(), '.');
        assert_eq!(config.log_level().unwrap(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_read_invalid_file() {
        let path = scratch_file("invalid", "read_timeout = \"soon\"\n");
        let result = Config::read(&path);
        fs::remove_file(&path).unwrap();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("read_timeout"), "{}", msg),
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
