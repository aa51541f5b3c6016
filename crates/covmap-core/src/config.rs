use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use covmap_parser::{FieldMod, PrepOptions, RowFilter};

use crate::error::{PipelineError, Result};
use crate::render::MapFormat;

pub const CONFIG_ENV_VAR: &str = "COVMAP_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "covmap.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathsConfig,
    pub run: RunToggles,
    pub prep: PrepConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub county_population: PathBuf,
    pub state_population: PathBuf,
    pub county_cases: PathBuf,
    pub state_cases: PathBuf,
    pub nyt_series: PathBuf,
    pub region_reference: PathBuf,
    pub county_shapes: PathBuf,
    pub state_shapes: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("rawdata"),
            out_dir: PathBuf::from("out"),
            county_population: PathBuf::from("CountyPop2019.csv"),
            state_population: PathBuf::from("StatePop2020.csv"),
            county_cases: PathBuf::from("jhu_counties.csv"),
            state_cases: PathBuf::from("jhu_states.csv"),
            nyt_series: PathBuf::from("us_counties.csv"),
            region_reference: PathBuf::from("UT_multi-county_regions.csv"),
            county_shapes: PathBuf::from("geojson-counties-fips.json"),
            state_shapes: PathBuf::from("geojson-states-fips.json"),
        }
    }
}

/// Which sources a run processes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunToggles {
    pub county: bool,
    pub state: bool,
    pub nyt: bool,
}

impl Default for RunToggles {
    fn default() -> Self {
        Self {
            county: true,
            state: true,
            nyt: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrepConfig {
    pub filters: Vec<String>,
    pub map_format: MapFormat,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            filters: RowFilter::ALL.iter().map(|rule| rule.key().to_string()).collect(),
            map_format: MapFormat::Svg,
        }
    }
}

impl Config {
    /// Resolve the config path (explicit flag, then the COVMAP_CONFIG
    /// environment variable, then ./covmap.toml) and load it. A missing
    /// implicit file falls back to the defaults; a missing explicit one is
    /// an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(PipelineError::Validation(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Self::from_path(path);
        }

        let candidate = env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        if candidate.exists() {
            Self::from_path(&candidate)
        } else {
            info!(
                path = %candidate.display(),
                "no config file found, using defaults"
            );
            Ok(Self::default())
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Relative file names resolve against `data_dir`; absolute paths pass
    /// through untouched.
    pub fn data_path(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.paths.data_dir.join(name)
        }
    }

    pub fn out_path(&self, name: &str) -> PathBuf {
        self.paths.out_dir.join(name)
    }

    pub fn county_population_path(&self) -> PathBuf {
        self.data_path(&self.paths.county_population)
    }

    pub fn state_population_path(&self) -> PathBuf {
        self.data_path(&self.paths.state_population)
    }

    pub fn county_cases_path(&self) -> PathBuf {
        self.data_path(&self.paths.county_cases)
    }

    pub fn state_cases_path(&self) -> PathBuf {
        self.data_path(&self.paths.state_cases)
    }

    pub fn nyt_series_path(&self) -> PathBuf {
        self.data_path(&self.paths.nyt_series)
    }

    pub fn region_reference_path(&self) -> PathBuf {
        self.data_path(&self.paths.region_reference)
    }

    pub fn county_shapes_path(&self) -> PathBuf {
        self.data_path(&self.paths.county_shapes)
    }

    pub fn state_shapes_path(&self) -> PathBuf {
        self.data_path(&self.paths.state_shapes)
    }

    /// Translate the configured filter keys into prep options; unknown keys
    /// are skipped with a warning rather than failing the run.
    pub fn prep_options(&self) -> PrepOptions {
        let mut filters = Vec::new();
        for key in &self.prep.filters {
            match RowFilter::from_key(key) {
                Some(rule) => filters.push(rule),
                None => warn!(key = key.as_str(), "unknown prep filter key skipped"),
            }
        }
        PrepOptions {
            filters,
            mods: FieldMod::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod unit {
    use super::*;
    use covmap_parser::RowFilter;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml("").expect("empty config parses");
        assert_eq!(config.paths.data_dir, PathBuf::from("rawdata"));
        assert!(config.run.county);
        assert!(config.run.state);
        assert!(!config.run.nyt);
        assert_eq!(config.prep.filters.len(), RowFilter::ALL.len());
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            [paths]
            data_dir = "/data/covid"

            [run]
            nyt = true

            [prep]
            filters = ["puerto_rico", "bogus"]
            map_format = "png"
            "#,
        )
        .expect("partial config parses");

        assert_eq!(config.paths.data_dir, PathBuf::from("/data/covid"));
        assert!(config.run.nyt);
        assert!(config.run.county);
        assert_eq!(config.prep.map_format, MapFormat::Png);

        let options = config.prep_options();
        assert_eq!(options.filters, vec![RowFilter::PuertoRico]);
    }

    #[test]
    fn relative_paths_resolve_against_data_dir() {
        let config = Config::default();
        assert_eq!(
            config.county_cases_path(),
            PathBuf::from("rawdata/jhu_counties.csv")
        );
        assert_eq!(
            config.data_path(Path::new("/abs/file.csv")),
            PathBuf::from("/abs/file.csv")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[paths]\nbogus = \"x\"\n").is_err());
    }
}
