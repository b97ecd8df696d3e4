//! Run configuration for toymix
//!
//! Stored as YAML. Default location: `<config dir>/toymix/config.yaml`
//! (e.g. `~/.config/toymix/config.yaml` on Linux). Command line flags
//! override what the file says.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toymix_core::allocator::ShortagePolicy;
use toymix_core::FINAL_SAMPLE_RATE;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Rate of every rendered file (Hz)
    pub sample_rate: u32,
    /// Behaviour when a request cannot be fully satisfied
    pub shortage_policy: ShortagePolicy,
    /// Render the files of one request on the rayon pool
    pub parallel_render: bool,
    /// Seed for noise selection and shuffling; entropy when unset
    pub seed: Option<u64>,
    /// Name of the run log written into the destination folder
    pub log_file_name: String,
    /// Request slots read per recipe row
    pub max_request_slots: usize,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            sample_rate: FINAL_SAMPLE_RATE,
            shortage_policy: ShortagePolicy::Abort,
            parallel_render: false,
            seed: None,
            log_file_name: String::from("log.txt"),
            max_request_slots: 10,
        }
    }
}

impl MixConfig {
    /// Replace unusable values with defaults
    pub fn validate(&mut self) {
        let defaults = Self::default();
        if self.sample_rate == 0 {
            log::warn!("MixConfig: sample_rate 0 is invalid, using {}", defaults.sample_rate);
            self.sample_rate = defaults.sample_rate;
        }
        if self.max_request_slots == 0 {
            self.max_request_slots = defaults.max_request_slots;
        }
        let name = Path::new(&self.log_file_name);
        if self.log_file_name.trim().is_empty() || name.components().count() != 1 {
            log::warn!(
                "MixConfig: log_file_name {:?} must be a plain file name, using {}",
                self.log_file_name,
                defaults.log_file_name
            );
            self.log_file_name = defaults.log_file_name;
        }
    }
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toymix")
        .join("config.yaml")
}

/// Load and validate the configuration; missing or broken files give defaults
pub fn load_config(path: &Path) -> MixConfig {
    let mut config: MixConfig = toymix_core::config::load_config(path);
    config.validate();
    log::info!(
        "load_config: rate {} Hz, shortage policy {:?}, parallel {}",
        config.sample_rate,
        config.shortage_policy,
        config.parallel_render
    );
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MixConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.shortage_policy, ShortagePolicy::Abort);
        assert!(!config.parallel_render);
        assert_eq!(config.seed, None);
        assert_eq!(config.log_file_name, "log.txt");
        assert_eq!(config.max_request_slots, 10);
    }

    #[test]
    fn test_partial_yaml() {
        let config: MixConfig = serde_yaml::from_str("shortage_policy: cap\nseed: 42\n").unwrap();
        assert_eq!(config.shortage_policy, ShortagePolicy::Cap);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.sample_rate, 16000);
    }

    #[test]
    fn test_validation_restores_defaults() {
        let mut config = MixConfig {
            sample_rate: 0,
            max_request_slots: 0,
            log_file_name: "../escape.txt".to_string(),
            ..MixConfig::default()
        };
        config.validate();
        assert_eq!(config, MixConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "parallel_render: true\nmax_request_slots: 4\n").unwrap();
        let config = load_config(&path);
        assert!(config.parallel_render);
        assert_eq!(config.max_request_slots, 4);
    }

    #[test]
    fn test_default_path_ends_in_toymix() {
        assert!(default_config_path().ends_with("toymix/config.yaml"));
    }
}
