use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::event::ParticleMode;

/// How output index files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    /// Only the run number
    Short,
    /// Run number and run name
    #[default]
    Default,
    /// Run number, run name, date and time
    Full,
}

/// Structure representing the application configuration. Contains pathing and run information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub glob_pattern: String,
    pub base_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub naming: NamingScheme,
    pub replace: bool,
    pub particle: ParticleMode,
    pub ignore_tdc_tables: bool,
    pub tdc_chunk_size: usize,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. The output path will be empty/invalid
    fn default() -> Self {
        Self {
            glob_pattern: String::from("*"),
            base_path: None,
            output_path: PathBuf::from("None"),
            naming: NamingScheme::Default,
            replace: false,
            particle: ParticleMode::EP,
            ignore_tdc_tables: false,
            tdc_chunk_size: 10_000,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Get the path to the output index file for a given file stem
    pub fn get_output_file_name(&self, stem: &str) -> Result<PathBuf, ConfigError> {
        let output_file_path: PathBuf = self.output_path.join(format!("{stem}.yml"));
        if self.output_path.exists() {
            Ok(output_file_path)
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    /// Should an existing output file be kept rather than rebuilt
    pub fn should_skip(&self, output_file: &Path) -> bool {
        output_file.is_file() && !self.replace
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml() {
        let yaml = "glob_pattern: '*.txt'\n\
                    base_path: /data/metro\n\
                    output_path: /tmp\n\
                    naming: full\n\
                    replace: true\n\
                    particle: EI\n\
                    ignore_tdc_tables: false\n\
                    tdc_chunk_size: 500\n\
                    n_threads: 4\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.naming, NamingScheme::Full);
        assert_eq!(config.particle, ParticleMode::EI);
        assert_eq!(config.base_path, Some(PathBuf::from("/data/metro")));
        assert!(config.is_n_threads_valid());

        let round_trip: Config =
            serde_yaml::from_str(&serde_yaml::to_string(&Config::default()).unwrap()).unwrap();
        assert_eq!(round_trip.glob_pattern, "*");
        assert_eq!(round_trip.naming, NamingScheme::Default);
    }

    #[test]
    fn test_output_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let output = config.get_output_file_name("0012_neon").unwrap();
        assert_eq!(output, dir.path().join("0012_neon.yml"));
        assert!(!config.should_skip(&output));

        std::fs::write(&output, "").unwrap();
        assert!(config.should_skip(&output));

        let missing = Config::default();
        assert!(matches!(
            missing.get_output_file_name("1"),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
