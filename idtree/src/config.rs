//! Tree configuration.
//!
//! This module loads the settings of the `idtree` binary from environment
//! variables.
//!
//! # Environment Variables
//!
//! - `IDTREE_DATA_FILE`: Path of the page file (default: `./idtree.dat`)
//! - `IDTREE_CACHE_CAPACITY`: Most nodes kept resident; `0` means unbounded
//!   (default: unbounded)
//! - `IDTREE_LEAF_ORDER`: Most key/value pairs per leaf (default: page-derived)
//! - `IDTREE_INTERNAL_ORDER`: Most separators per internal node
//!   (default: page-derived)
//!
//! # Invariants
//!
//! - `cache_capacity`, when set, is at least `MIN_CACHE_CAPACITY`
//! - `orders` always fit one page per node

use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::btree::{CacheConfig, INTERNAL_ORDER, LEAF_ORDER, MIN_CACHE_CAPACITY, Orders};

/// Tree configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()`:
/// - `cache_capacity` is `None` or at least `MIN_CACHE_CAPACITY`
/// - both orders lie in `[Orders::MIN_ORDER, page-derived maximum]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Path of the page file.
    pub data_file: PathBuf,
    /// Most nodes kept resident; `None` keeps every node resident.
    pub cache_capacity: Option<NonZeroUsize>,
    /// Node capacities.
    pub orders: Orders,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(Self::DEFAULT_DATA_FILE),
            cache_capacity: None,
            orders: Orders::PAGE,
        }
    }
}

impl TreeConfig {
    /// Default page file path.
    pub const DEFAULT_DATA_FILE: &'static str = "./idtree.dat";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `IDTREE_CACHE_CAPACITY` is not a number, or is nonzero and below `MIN_CACHE_CAPACITY`
    /// - `IDTREE_LEAF_ORDER` or `IDTREE_INTERNAL_ORDER` is not a number or out of range
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_file = lookup("IDTREE_DATA_FILE")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DATA_FILE), PathBuf::from);
        let cache_capacity = Self::load_cache_capacity(lookup("IDTREE_CACHE_CAPACITY").as_deref())?;
        let orders = Self::load_orders(
            lookup("IDTREE_LEAF_ORDER").as_deref(),
            lookup("IDTREE_INTERNAL_ORDER").as_deref(),
        )?;

        Ok(Self {
            data_file,
            cache_capacity,
            orders,
        })
    }

    /// The cache configuration these settings describe.
    #[must_use]
    pub const fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            orders: self.orders,
        }
    }

    /// Parse the cache capacity.
    ///
    /// Returns `None` if not set or zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a number or is below the minimum.
    fn load_cache_capacity(value: Option<&str>) -> Result<Option<NonZeroUsize>, ConfigError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let capacity = parse_usize("IDTREE_CACHE_CAPACITY", value)?;
        if capacity != 0 && capacity < MIN_CACHE_CAPACITY {
            return Err(ConfigError::InvalidValue {
                name: "IDTREE_CACHE_CAPACITY".to_string(),
                message: format!("{capacity} is below the minimum of {MIN_CACHE_CAPACITY}"),
            });
        }
        Ok(NonZeroUsize::new(capacity))
    }

    /// Parse the node orders, each defaulting to its page-derived maximum.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is not a number or out of range.
    fn load_orders(leaf: Option<&str>, internal: Option<&str>) -> Result<Orders, ConfigError> {
        let leaf = match leaf {
            Some(value) => check_order("IDTREE_LEAF_ORDER", value, LEAF_ORDER)?,
            None => LEAF_ORDER,
        };
        let internal = match internal {
            Some(value) => check_order("IDTREE_INTERNAL_ORDER", value, INTERNAL_ORDER)?,
            None => INTERNAL_ORDER,
        };

        Orders::new(leaf, internal).ok_or_else(|| ConfigError::InvalidValue {
            name: "IDTREE_LEAF_ORDER".to_string(),
            message: format!("orders {leaf}/{internal} out of range"),
        })
    }
}

fn parse_usize(name: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a non-negative integer"),
        })
}

fn check_order(name: &str, value: &str, max: usize) -> Result<usize, ConfigError> {
    let order = parse_usize(name, value)?;
    if !(Orders::MIN_ORDER..=max).contains(&order) {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("{order} is outside {}..={max}", Orders::MIN_ORDER),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<TreeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        TreeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).expect("defaults");
        assert_eq!(config, TreeConfig::default());
        assert_eq!(config.data_file, PathBuf::from("./idtree.dat"));
        assert_eq!(config.cache_capacity, None);
        assert_eq!(config.orders, Orders::PAGE);
    }

    #[test]
    fn test_all_values_set() {
        let config = load(&[
            ("IDTREE_DATA_FILE", "/tmp/tree.dat"),
            ("IDTREE_CACHE_CAPACITY", "64"),
            ("IDTREE_LEAF_ORDER", "16"),
            ("IDTREE_INTERNAL_ORDER", "8"),
        ])
        .expect("valid config");

        assert_eq!(config.data_file, PathBuf::from("/tmp/tree.dat"));
        assert_eq!(config.cache_capacity, NonZeroUsize::new(64));
        assert_eq!(config.orders, Orders::new(16, 8).expect("orders"));

        let cache = config.cache_config();
        assert_eq!(cache.capacity, NonZeroUsize::new(64));
        assert_eq!(cache.orders.leaf(), 16);
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let config = load(&[("IDTREE_CACHE_CAPACITY", "0")]).expect("valid config");
        assert_eq!(config.cache_capacity, None);
    }

    #[test]
    fn test_capacity_below_minimum() {
        let result = load(&[("IDTREE_CACHE_CAPACITY", "3")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "IDTREE_CACHE_CAPACITY"
        ));
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(load(&[("IDTREE_CACHE_CAPACITY", "lots")]).is_err());
        assert!(load(&[("IDTREE_LEAF_ORDER", "-4")]).is_err());
        assert!(load(&[("IDTREE_LEAF_ORDER", "2")]).is_err());
        assert!(load(&[("IDTREE_INTERNAL_ORDER", "100000")]).is_err());
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
