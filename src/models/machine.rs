//! Machine launch model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// Guest memory, normalized to MiB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySize {
    megabytes: u64,
}

impl MemorySize {
    pub fn from_megabytes(megabytes: u64) -> Result<Self> {
        if megabytes == 0 {
            return Err(Error::Validation("memory must be at least 1 MiB".into()));
        }
        Ok(Self { megabytes })
    }

    pub fn megabytes(&self) -> u64 {
        self.megabytes
    }
}

impl FromStr for MemorySize {
    type Err = Error;

    /// A bare number is GiB; `M`/`MB`/`MiB` and `G`/`GB`/`GiB` suffixes are
    /// honored.
    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);

        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("'memory' must be a number, got '{}'", s)))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Validation(format!(
                "'memory' must be positive, got '{}'",
                s
            )));
        }

        let factor = match unit.to_ascii_lowercase().as_str() {
            "" | "g" | "gb" | "gib" => 1024.0,
            "m" | "mb" | "mib" => 1.0,
            other => {
                return Err(Error::Validation(format!(
                    "unknown memory unit '{}'",
                    other
                )))
            }
        };

        Self::from_megabytes((value * factor).floor() as u64)
    }
}

impl std::fmt::Display for MemorySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}MB", self.megabytes)
    }
}

/// Raw start-machine request as submitted by a form
#[derive(Debug, Clone, Default)]
pub struct StartMachine {
    pub name: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub disk_name: Option<String>,
    pub install_medium: Option<PathBuf>,
}

/// Validated launch parameters
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSpec {
    pub name: String,
    pub cpu_count: u32,
    pub memory: MemorySize,
    pub disk_name: String,
    pub install_medium: Option<PathBuf>,
}

impl MachineSpec {
    pub fn new(name: impl Into<String>, disk_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpu_count: 1,
            memory: MemorySize { megabytes: 1024 },
            disk_name: disk_name.into(),
            install_medium: None,
        }
    }

    pub fn with_cpus(mut self, count: u32) -> Self {
        self.cpu_count = count;
        self
    }

    pub fn with_memory(mut self, memory: MemorySize) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_install_medium(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_medium = Some(path.into());
        self
    }
}
