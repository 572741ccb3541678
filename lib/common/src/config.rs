//! Shared identifiers and runtime configuration for the transaction manager.

#![allow(dead_code)]

use ::config::{ConfigBuilder, Environment, File, FileFormat};
use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};
use shrinkwraprs::Shrinkwrap;
use std::fmt;
use thiserror::Error;
use typed_builder::TypedBuilder;

/// The number of replica sites in the default topology. Even-indexed variables are
/// replicated at every site; odd-indexed variables are homed at a single site.
pub const NUM_SITES: u32 = 10;

/// The number of variables in the default topology, indexed 1..=20.
pub const NUM_VARIABLES: u32 = 20;

/// Every variable `xi` starts with the committed value `10 * i` at the origin timestamp.
pub const INITIAL_VALUE_FACTOR: i64 = 10;

/// Unique identifier for a transaction. Transaction ids come from the command
/// stream (`begin(T3)` names transaction 3) and are not required to be dense.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Shrinkwrap,
)]
pub struct TxnId(pub u32);

impl TxnId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for TxnId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Unique identifier for a replica site, 1-based.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Shrinkwrap,
)]
pub struct SiteId(pub u32);

impl SiteId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for SiteId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a variable, 1-based (`x1`..`x20` in the default topology).
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Shrinkwrap,
)]
pub struct VariableId(pub u32);

impl VariableId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Even-indexed variables are replicated at every site.
    pub fn is_replicated(&self) -> bool {
        self.0 % 2 == 0
    }
}

impl From<u32> for VariableId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Unique identifier for an operation within a run. Operation ids are handed out
/// by the manager in arrival order and never reused.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Shrinkwrap,
)]
pub struct OpId(pub u64);

impl OpId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for OpId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Logical timestamp. Timestamps order transaction starts and variable commits;
/// they are ticks of a [`crate::LogicalClock`], never wall-clock readings, so two
/// commands arriving back-to-back can never collide.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Shrinkwrap,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The origin timestamp carried by every variable's initial committed value.
    pub const ORIGIN: Timestamp = Timestamp(0);

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Timestamp {
    fn from(ts: u64) -> Self {
        Self(ts)
    }
}

#[derive(Debug, Error, Clone)]
pub enum SystemConfigError {
    #[error("invalid configuration source")]
    InvalidConfig,
    #[error("topology must have at least one site and one variable")]
    EmptyTopology,
}

/// Runtime topology configuration.
///
/// The defaults reproduce the canonical layout (10 sites, 20 variables). A TOML
/// file and `REPLDB__`-prefixed environment variables may override them, e.g.
/// `REPLDB__NUM_SITES=4`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, Setters, TypedBuilder,
)]
#[getset(get = "pub", set = "pub")]
pub struct SystemConfig {
    pub num_sites: u32,
    pub num_variables: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_sites: NUM_SITES,
            num_variables: NUM_VARIABLES,
        }
    }
}

impl SystemConfig {
    // Load configuration from a given file (optional) and the environment
    pub fn load_from_file_and_env(file_path: &str) -> Result<Self, SystemConfigError> {
        dotenv::dotenv().ok();
        let builder = ConfigBuilder::<::config::builder::DefaultState>::default()
            .set_default("num_sites", NUM_SITES as i64)
            .map_err(|_| SystemConfigError::InvalidConfig)?
            .set_default("num_variables", NUM_VARIABLES as i64)
            .map_err(|_| SystemConfigError::InvalidConfig)?
            .add_source(File::new(file_path, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("REPLDB").separator("__"))
            .build()
            .map_err(|_| SystemConfigError::InvalidConfig)?;

        let config = builder
            .try_deserialize::<SystemConfig>()
            .map_err(|_| SystemConfigError::InvalidConfig)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SystemConfigError> {
        if self.num_sites == 0 || self.num_variables == 0 {
            return Err(SystemConfigError::EmptyTopology);
        }
        Ok(())
    }

    /// The committed value every variable carries at the origin timestamp.
    pub fn initial_value(&self, var: VariableId) -> i64 {
        INITIAL_VALUE_FACTOR * i64::from(var.as_u32())
    }

    /// The single site an odd-indexed variable is homed at.
    pub fn home_site(&self, var: VariableId) -> SiteId {
        SiteId::new(var.as_u32() % self.num_sites + 1)
    }
}

#[cfg(test)]
mod id_tests {
    use super::*;

    #[test]
    fn display_matches_protocol_text() {
        assert_eq!(TxnId::new(3).to_string(), "T3");
        assert_eq!(VariableId::new(14).to_string(), "x14");
        assert_eq!(SiteId::new(7).to_string(), "7");
    }

    #[test]
    fn replication_parity() {
        assert!(VariableId::new(2).is_replicated());
        assert!(VariableId::new(20).is_replicated());
        assert!(!VariableId::new(1).is_replicated());
        assert!(!VariableId::new(19).is_replicated());
    }

    #[test]
    fn timestamps_order() {
        assert!(Timestamp::ORIGIN < Timestamp::from(1));
        assert!(Timestamp::from(41) < Timestamp::from(42));
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_reproduce_canonical_topology() {
        let config = SystemConfig::default();
        assert_eq!(config.num_sites, 10);
        assert_eq!(config.num_variables, 20);
        assert_eq!(config.initial_value(VariableId::new(7)), 70);
    }

    #[test]
    fn odd_variables_are_homed_by_modulus() {
        let config = SystemConfig::default();
        assert_eq!(config.home_site(VariableId::new(1)), SiteId::new(2));
        assert_eq!(config.home_site(VariableId::new(9)), SiteId::new(10));
        assert_eq!(config.home_site(VariableId::new(11)), SiteId::new(2));
    }

    #[test]
    fn load_valid_config_from_file() {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
            num_sites = 4
            num_variables = 8
        "#
        )
        .unwrap();
        let config_path = temp_file.path().to_str().unwrap();

        let config = SystemConfig::load_from_file_and_env(config_path).unwrap();
        assert_eq!(config.num_sites, 4);
        assert_eq!(config.num_variables, 8);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            SystemConfig::load_from_file_and_env("definitely/not/a/real/path.toml").unwrap();
        assert_eq!(config, SystemConfig::default());
    }

    #[test]
    fn empty_topology_is_rejected() {
        let config = SystemConfig::builder().num_sites(0).num_variables(20).build();
        assert!(config.validate().is_err());
    }
}
