use std::env;
use std::fs;
use std::str::FromStr;

use dotenv::dotenv;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::chunk::Biome;
use crate::err::StoreError;

pub const DEFAULT_POOL_SIZE: usize = 64;
pub const DEFAULT_BLOCK_STATES: u32 = 1 << 15;
pub const DEFAULT_BIOMES: u32 = 64;

/// Settings the store consumes but does not own. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How many idle edits the pool keeps.
    pub pool_size: usize,
    /// Size of the global block-state registry.
    pub block_state_count: u32,
    /// Size of the global biome registry.
    pub biome_count: u32,
    /// Biome written for cells an edit leaves unset.
    pub default_biome: Biome,
    pub initial_min_section: i32,
    pub initial_max_section: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            block_state_count: DEFAULT_BLOCK_STATES,
            biome_count: DEFAULT_BIOMES,
            default_biome: 0,
            initial_min_section: 0,
            initial_max_section: 15,
        }
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, StoreError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StoreError::InvalidConfig(format!("{key}={raw:?} cannot be parsed"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(StoreError::InvalidConfig(format!("{key}: {e}"))),
    }
}

impl StoreConfig {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /**
     * Reads the `CHUNKSTORE_*` environment variables, after loading a `.env` file if there is one.
     * `CHUNKSTORE_CONFIG` may name a JSON file that provides the base values.
     */
    pub fn from_env() -> Result<Self, StoreError> {
        if dotenv().is_ok() {
            debug!("Loaded .env file");
        }
        let mut config = match env::var("CHUNKSTORE_CONFIG") {
            Ok(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            Err(env::VarError::NotPresent) => StoreConfig::default(),
            Err(e) => return Err(StoreError::InvalidConfig(format!("CHUNKSTORE_CONFIG: {e}"))),
        };
        if let Some(v) = env_value("CHUNKSTORE_POOL_SIZE")? {
            config.pool_size = v;
        }
        if let Some(v) = env_value("CHUNKSTORE_BLOCK_STATES")? {
            config.block_state_count = v;
        }
        if let Some(v) = env_value("CHUNKSTORE_BIOMES")? {
            config.biome_count = v;
        }
        if let Some(v) = env_value("CHUNKSTORE_DEFAULT_BIOME")? {
            config.default_biome = v;
        }
        if let Some(v) = env_value("CHUNKSTORE_MIN_SECTION")? {
            config.initial_min_section = v;
        }
        if let Some(v) = env_value("CHUNKSTORE_MAX_SECTION")? {
            config.initial_max_section = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.pool_size == 0 {
            return Err(StoreError::InvalidConfig("pool_size must be at least 1".into()));
        }
        // RESERVED, AIR, CAVE_AIR and VOID_AIR always exist
        if self.block_state_count < 4 {
            return Err(StoreError::InvalidConfig(format!(
                "block_state_count {} is smaller than the reserved ordinals",
                self.block_state_count
            )));
        }
        if self.biome_count == 0 {
            return Err(StoreError::InvalidConfig("biome_count must be at least 1".into()));
        }
        if self.default_biome as u32 >= self.biome_count {
            return Err(StoreError::InvalidConfig(format!(
                "default_biome {} is outside the registry of {}",
                self.default_biome, self.biome_count
            )));
        }
        if self.initial_min_section > self.initial_max_section {
            return Err(StoreError::InvalidConfig(format!(
                "section range {}..={} is inverted",
                self.initial_min_section, self.initial_max_section
            )));
        }
        if self.initial_max_section - self.initial_min_section > 255 {
            warn!(
                "Initial section range {}..={} is unusually tall",
                self.initial_min_section, self.initial_max_section
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = StoreConfig::from_json(r#"{ "pool_size": 8, "initial_min_section": -4 }"#).unwrap();
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.initial_min_section, -4);
        assert_eq!(config.block_state_count, DEFAULT_BLOCK_STATES);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            StoreConfig::from_json(r#"{ "pool_size": 0 }"#),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(r#"{ "initial_min_section": 3, "initial_max_section": 2 }"#),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(r#"{ "default_biome": 70 }"#),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            StoreConfig::from_json("{ pool_size: }"),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn env_values_parse() {
        env::set_var("CHUNKSTORE_TEST_ONLY_VALUE", " 12 ");
        assert_eq!(env_value::<usize>("CHUNKSTORE_TEST_ONLY_VALUE").unwrap(), Some(12));
        env::set_var("CHUNKSTORE_TEST_ONLY_VALUE", "twelve");
        assert!(env_value::<usize>("CHUNKSTORE_TEST_ONLY_VALUE").is_err());
        env::remove_var("CHUNKSTORE_TEST_ONLY_VALUE");
        assert_eq!(env_value::<usize>("CHUNKSTORE_TEST_ONLY_VALUE").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn config_path_must_be_unicode() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        env::set_var("CHUNKSTORE_CONFIG", OsStr::from_bytes(&[b'c', 0x80]));
        let result = StoreConfig::from_env();
        env::remove_var("CHUNKSTORE_CONFIG");
        assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    }
}
