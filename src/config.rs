// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Node configuration
//!
//! Values are layered: built in defaults, then the TOML file, then `CPVISOR__` prefixed
//!   environment variables (`CPVISOR__SUPERVISOR__GRACE_PERIOD_MS=10000`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::args::Flags;
use crate::procs::{BackoffPolicy, SupervisorConfig};
use crate::Error;

pub const ENV_PREFIX: &str = "CPVISOR";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Staging root, binaries are placed in `<data_dir>/bin`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where the kubeconfigs and certificates of the components live
    #[serde(default = "default_cert_root")]
    pub cert_root: PathBuf,

    /// Bundle the binaries are extracted from when not yet staged
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,

    #[serde(default)]
    pub scheduler: ComponentConfig,

    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ComponentConfig {
    /// Additional flags passed to the binary
    #[serde(default)]
    pub extra_args: Flags,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_factor: f64,
    /// Uptime after which a crash no longer counts towards the backoff
    pub min_uptime_ms: u64,
    pub grace_period_ms: u64,
    pub max_restarts: Option<u32>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();

        Self {
            backoff_initial_ms: defaults.backoff.initial.as_millis() as u64,
            backoff_max_ms: defaults.backoff.max.as_millis() as u64,
            backoff_factor: defaults.backoff.factor,
            min_uptime_ms: defaults.backoff.reset_after.as_millis() as u64,
            grace_period_ms: defaults.grace_period.as_millis() as u64,
            max_restarts: defaults.max_restarts,
        }
    }
}

impl From<&SupervisorSettings> for SupervisorConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            backoff: BackoffPolicy {
                initial: Duration::from_millis(settings.backoff_initial_ms),
                max: Duration::from_millis(settings.backoff_max_ms),
                factor: settings.backoff_factor,
                reset_after: Duration::from_millis(settings.min_uptime_ms),
            },
            grace_period: Duration::from_millis(settings.grace_period_ms),
            max_restarts: settings.max_restarts,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/cpvisor")
}

fn default_cert_root() -> PathBuf {
    PathBuf::from("/var/lib/cpvisor/pki")
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from("/usr/libexec/cpvisor")
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cert_root: default_cert_root(),
            bundle_dir: default_bundle_dir(),
            scheduler: ComponentConfig::default(),
            supervisor: SupervisorSettings::default(),
        }
    }
}

impl ClusterConfig {
    /// Loads the configuration, a missing file leaves the defaults in place
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: ClusterConfig = settings.try_deserialize()?;
        config.validate()?;

        info!("Configuration loaded");
        debug!("Final configuration: {:#?}", config);
        Ok(config)
    }

    /// Parses a TOML document, without consulting the environment
    pub fn from_toml(toml: &str) -> Result<Self, Error> {
        let config: ClusterConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let s = &self.supervisor;

        if s.backoff_initial_ms == 0 || s.backoff_max_ms == 0 {
            return Err("supervisor backoff delays must be positive".into());
        }
        if s.backoff_initial_ms > s.backoff_max_ms {
            return Err(format!(
                "supervisor backoff_initial_ms ({}) exceeds backoff_max_ms ({})",
                s.backoff_initial_ms, s.backoff_max_ms
            )
            .into());
        }
        if !(s.backoff_factor >= 1.0) {
            return Err(format!(
                "supervisor backoff_factor must be at least 1.0, got {}",
                s.backoff_factor
            )
            .into());
        }

        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::from(&self.supervisor)
    }
}
