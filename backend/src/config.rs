//! Runtime settings
//!
//! Read from the environment after `.env` is loaded (the binary calls
//! `dotenvy::dotenv()` first):
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CONVERTER_DATA_DIR` (or `DATA_DIR`) | `./data` |
//!
//! Input files live in `<data>/in`, outputs in `<data>/out` and spec files
//! in `<data>/config`.

use std::path::{Path, PathBuf};

pub const DATA_DIR_VAR: &str = "CONVERTER_DATA_DIR";
pub const FALLBACK_DATA_DIR_VAR: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl Settings {
    /// Settings rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            input_dir: data_dir.join("in"),
            output_dir: data_dir.join("out"),
            config_dir: data_dir.join("config"),
            data_dir,
        }
    }

    /// Settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Settings from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = [DATA_DIR_VAR, FALLBACK_DATA_DIR_VAR]
            .iter()
            .filter_map(|key| lookup(key))
            .find(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        Self::new(data_dir)
    }

    /// Use a different spec directory.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Create the in/out/config directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.input_dir, &self.output_dir, &self.config_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Input directory for a spec's `default_directory`.
    pub fn input_path(&self, directory: &str) -> PathBuf {
        join_optional(&self.input_dir, directory)
    }

    /// Output directory for a spec's `default_directory`.
    pub fn output_path(&self, directory: &str) -> PathBuf {
        join_optional(&self.output_dir, directory)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

fn join_optional(base: &Path, directory: &str) -> PathBuf {
    if directory.is_empty() {
        base.to_path_buf()
    } else {
        base.join(directory)
    }
}
