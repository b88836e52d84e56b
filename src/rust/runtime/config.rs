// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::{
        Fail,
        ResultCode,
    },
    limits,
};
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
    time::Duration,
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
    pub const SECTION_NAME: &str = "ukern";
    // Number of cores that run fibers.
    pub const NUM_CORES: &str = "num_cores";
    // Ceiling on concurrently live fibers.
    pub const MAX_THREADS: &str = "max_threads";
    // Stack size used when the caller asks for the default.
    pub const DEFAULT_STACK_SIZE: &str = "default_stack_size";
    // Longest time an idle core sleeps before re-checking its queues.
    pub const IDLE_TIMEOUT_MICROS: &str = "idle_timeout_micros";
    // Whether fibers are pinned to the host CPU matching their core.
    pub const PIN_CORES: &str = "pin_cores";
}

/// Prefix of environment variables that override configuration file values.
const ENV_PREFIX: &str = "UKERN_";

//======================================================================================================================
// Structures
//======================================================================================================================

/// Configuration file contents.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

/// Resolved, validated scheduler parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub num_cores: usize,
    pub max_threads: usize,
    pub default_stack_size: usize,
    pub idle_timeout: Duration,
    pub pin_cores: bool,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        let mut file: File = match File::open(config_path) {
            Ok(file) => file,
            Err(e) => {
                let cause: String = format!("cannot open configuration file (path={:?}, error={:?})", config_path, e);
                error!("new(): {}", cause);
                return Err(Fail::new(ResultCode::ValueOutOfRange, &cause));
            },
        };
        if let Err(e) = file.read_to_string(&mut config_s) {
            let cause: String = format!("cannot read configuration file (path={:?}, error={:?})", config_path, e);
            error!("new(): {}", cause);
            return Err(Fail::new(ResultCode::ValueOutOfRange, &cause));
        }
        Self::from_yaml_str(&config_s)
    }

    /// Parses configuration text into a [Config] object.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("malformed configuration (error={:?})", e);
                error!("from_yaml_str(): {}", cause);
                return Err(Fail::new(ResultCode::ValueOutOfRange, &cause));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            &[ref c] => c,
            _ => return Err(Fail::new(ResultCode::ValueOutOfRange, "Wrong number of config objects")),
        };

        Ok(Self(config_obj.clone()))
    }

    fn get_scheduler_config(&self) -> Option<&Yaml> {
        let section: &Yaml = self.0.index(scheduler_config::SECTION_NAME);
        match section {
            Yaml::Hash(_) => Some(section),
            _ => None,
        }
    }

    /// Reads the "number of cores" parameter from the environment variable first and then the underlying
    /// configuration file.
    pub fn num_cores(&self) -> Result<Option<usize>, Fail> {
        self.get_usize_option(scheduler_config::NUM_CORES)
    }

    /// Reads the "maximum number of threads" parameter.
    pub fn max_threads(&self) -> Result<Option<usize>, Fail> {
        self.get_usize_option(scheduler_config::MAX_THREADS)
    }

    /// Reads the "default stack size" parameter.
    pub fn default_stack_size(&self) -> Result<Option<usize>, Fail> {
        self.get_usize_option(scheduler_config::DEFAULT_STACK_SIZE)
    }

    /// Reads the "idle timeout" parameter.
    pub fn idle_timeout(&self) -> Result<Option<Duration>, Fail> {
        Ok(self
            .get_usize_option(scheduler_config::IDLE_TIMEOUT_MICROS)?
            .map(|micros| Duration::from_micros(micros as u64)))
    }

    /// Reads the "pin cores" parameter.
    pub fn pin_cores(&self) -> Result<Option<bool>, Fail> {
        if let Some(pin) = Self::get_typed_env_option(scheduler_config::PIN_CORES)? {
            return Ok(Some(pin));
        }
        match self.get_scheduler_config() {
            Some(section) => Self::get_typed_option(section, scheduler_config::PIN_CORES, &Yaml::as_bool),
            None => Ok(None),
        }
    }

    /// Resolves every scheduler parameter, falling back to built-in defaults for missing ones, and validates the
    /// result.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig, Fail> {
        let defaults: SchedulerConfig = SchedulerConfig::default();
        let config: SchedulerConfig = SchedulerConfig {
            num_cores: self.num_cores()?.unwrap_or(defaults.num_cores),
            max_threads: self.max_threads()?.unwrap_or(defaults.max_threads),
            default_stack_size: self.default_stack_size()?.unwrap_or(defaults.default_stack_size),
            idle_timeout: self.idle_timeout()?.unwrap_or(defaults.idle_timeout),
            pin_cores: self.pin_cores()?.unwrap_or(defaults.pin_cores),
        };
        config.validate()?;
        Ok(config)
    }

    //==================================================================================================================
    // Static Functions
    //==================================================================================================================

    fn get_usize_option(&self, index: &str) -> Result<Option<usize>, Fail> {
        if let Some(value) = Self::get_typed_env_option(index)? {
            return Ok(Some(value));
        }
        match self.get_scheduler_config() {
            Some(section) => Self::get_int_option(section, index),
            None => Ok(None),
        }
    }

    /// Index `yaml` to find the value at `index`, validating that the receiver returns Some(_) if it exists.
    fn get_typed_option<'a, T, Fn>(yaml: &'a Yaml, index: &str, receiver: Fn) -> Result<Option<T>, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        match yaml.index(index) {
            Yaml::BadValue => Ok(None),
            option => match receiver(option) {
                Some(value) => Ok(Some(value)),
                None => {
                    let message: String = format!("parameter {} has unexpected type", index);
                    Err(Fail::new(ResultCode::ValueOutOfRange, message.as_str()))
                },
            },
        }
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        let name: String = format!("{}{}", ENV_PREFIX, index.to_uppercase());
        if let Ok(var) = ::std::env::var(&name) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("environment variable {} has unexpected type", name);
                return Err(Fail::new(ResultCode::ValueOutOfRange, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Similar to `get_typed_option` using `Yaml::as_i64` as the receiver, but additionally verifies that the
    /// destination type may hold the i64 value.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<Option<T>, Fail> {
        match Self::get_typed_option(yaml, index, &Yaml::as_i64)? {
            None => Ok(None),
            Some(val) => match T::try_from(val) {
                Ok(val) => Ok(Some(val)),
                _ => {
                    let message: String = format!("parameter \"{}\" is out of range", index);
                    Err(Fail::new(ResultCode::ValueOutOfRange, message.as_str()))
                },
            },
        }
    }
}

impl SchedulerConfig {
    /// Checks that every parameter is within the limits the scheduler supports.
    pub fn validate(&self) -> Result<(), Fail> {
        if self.num_cores == 0 || self.num_cores > limits::MAX_CORES {
            let cause: String = format!("number of cores out of range (num_cores={})", self.num_cores);
            error!("validate(): {}", cause);
            return Err(Fail::new(ResultCode::ValueOutOfRange, &cause));
        }
        if self.max_threads == 0 || self.max_threads > limits::MAX_THREADS {
            let cause: String = format!("maximum number of threads out of range (max_threads={})", self.max_threads);
            error!("validate(): {}", cause);
            return Err(Fail::new(ResultCode::ValueOutOfRange, &cause));
        }
        if self.default_stack_size < limits::MIN_STACK_SIZE || self.default_stack_size % limits::STACK_ALIGNMENT != 0 {
            let cause: String = format!("invalid default stack size (size={})", self.default_stack_size);
            error!("validate(): {}", cause);
            return Err(Fail::new(ResultCode::InvalidStackSize, &cause));
        }
        if self.idle_timeout.is_zero() {
            return Err(Fail::new(ResultCode::ValueOutOfRange, "idle timeout must not be zero"));
        }
        Ok(())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_cores: 4,
            max_threads: 128,
            default_stack_size: 256 * 1024,
            idle_timeout: Duration::from_millis(1),
            pin_cores: false,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
