// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Scheduler options.
mod scheduler_config {
    pub const SECTION_NAME: &str = "eventgen";
    // Deepest frame stack a thread may build before delegation fails.
    pub const MAX_FRAME_DEPTH: &str = "max_frame_depth";
    // Whether the default value sink echoes values reaching the top of a thread.
    pub const REPORT_VALUES: &str = "report_values";
    // Fallback log specification when RUST_LOG is not set.
    pub const LOG_LEVEL: &str = "log_level";

    pub const DEFAULT_MAX_FRAME_DEPTH: usize = crate::scheduler::thread::DEFAULT_MAX_FRAME_DEPTH;
    pub const DEFAULT_REPORT_VALUES: bool = true;
    pub const DEFAULT_LOG_LEVEL: &str = "warn";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::parse(&config_s)
    }

    /// Parses a configuration document.
    pub fn parse(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = YamlLoader::load_from_str(config_s)?;
        match &config[..] {
            [c] => Ok(Self(c.clone())),
            _ => {
                let cause: String = format!("wrong number of config objects (n={:?})", config.len());
                error!("parse(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }

    fn get_scheduler_config(&self) -> Option<&Yaml> {
        match self.0.index(scheduler_config::SECTION_NAME) {
            section @ Yaml::Hash(_) => Some(section),
            _ => None,
        }
    }

    /// Reads the maximum frame depth from the environment first, then the configuration document.
    pub fn max_frame_depth(&self) -> Result<usize, Fail> {
        let depth: usize = if let Some(depth) = Self::get_typed_env_option(scheduler_config::MAX_FRAME_DEPTH)? {
            depth
        } else {
            match self.get_scheduler_config() {
                Some(section) => Self::get_int_option(section, scheduler_config::MAX_FRAME_DEPTH)?
                    .unwrap_or(scheduler_config::DEFAULT_MAX_FRAME_DEPTH),
                None => scheduler_config::DEFAULT_MAX_FRAME_DEPTH,
            }
        };

        if depth == 0 {
            let cause: &str = "frame depth must be positive";
            error!("max_frame_depth(): {}", cause);
            return Err(Fail::new(libc::EINVAL, cause));
        }
        Ok(depth)
    }

    pub fn report_values(&self) -> Result<bool, Fail> {
        if let Some(report) = Self::get_typed_env_option(scheduler_config::REPORT_VALUES)? {
            return Ok(report);
        }
        match self.get_scheduler_config() {
            Some(section) => Ok(Self::get_bool_option(section, scheduler_config::REPORT_VALUES)?
                .unwrap_or(scheduler_config::DEFAULT_REPORT_VALUES)),
            None => Ok(scheduler_config::DEFAULT_REPORT_VALUES),
        }
    }

    pub fn log_level(&self) -> Result<String, Fail> {
        if let Some(level) = Self::get_typed_env_option(scheduler_config::LOG_LEVEL)? {
            return Ok(level);
        }
        match self.get_scheduler_config() {
            Some(section) => match section.index(scheduler_config::LOG_LEVEL) {
                Yaml::BadValue => Ok(scheduler_config::DEFAULT_LOG_LEVEL.to_string()),
                Yaml::String(level) => Ok(level.clone()),
                _ => {
                    let message: String = format!("parameter {} has unexpected type", scheduler_config::LOG_LEVEL);
                    Err(Fail::new(libc::EINVAL, message.as_str()))
                },
            },
            None => Ok(scheduler_config::DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    //======================================================================================================================
    // Static Functions
    //======================================================================================================================

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Reads an optional integer, verifying that the destination type may hold it.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<Option<T>, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => Ok(None),
            Yaml::Integer(val) => match T::try_from(*val) {
                Ok(val) => Ok(Some(val)),
                _ => {
                    let message: String = format!("parameter \"{}\" is out of range", index);
                    Err(Fail::new(libc::ERANGE, message.as_str()))
                },
            },
            _ => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Reads an optional boolean.
    fn get_bool_option(yaml: &Yaml, index: &str) -> Result<Option<bool>, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => Ok(None),
            Yaml::Boolean(val) => Ok(Some(*val)),
            _ => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Config {
    fn default() -> Self {
        Self(Yaml::Null)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
