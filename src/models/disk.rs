//! Disk image model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::{Error, Result};

/// Image formats the disk utility is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Raw,
    Qcow2,
    Vmdk,
    Vdi,
    Vhdx,
}

impl DiskFormat {
    pub const ALL: [DiskFormat; 5] = [
        DiskFormat::Raw,
        DiskFormat::Qcow2,
        DiskFormat::Vmdk,
        DiskFormat::Vdi,
        DiskFormat::Vhdx,
    ];

    /// Name understood by `qemu-img -f` / `-O`
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Vmdk => "vmdk",
            DiskFormat::Vdi => "vdi",
            DiskFormat::Vhdx => "vhdx",
        }
    }
}

impl std::fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiskFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        DiskFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnsupportedFormat(wanted.to_string()))
    }
}

/// A size or count as it arrives from a client: JSON number or text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(f64),
    Text(String),
}

impl Quantity {
    pub fn is_blank(&self) -> bool {
        matches!(self, Quantity::Text(s) if s.trim().is_empty())
    }
}

impl From<f64> for Quantity {
    fn from(n: f64) -> Self {
        Quantity::Number(n)
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity::Text(s.to_string())
    }
}

/// Positive size in GiB, rendered the way `qemu-img` expects (`10G`, `1.5G`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gigabytes(f64);

impl Gigabytes {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Validation(format!(
                "size must be a positive number of gigabytes, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn parse(field: &str, quantity: &Quantity) -> Result<Self> {
        let value = match quantity {
            Quantity::Number(n) => *n,
            Quantity::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                Error::Validation(format!("'{}' must be a number, got '{}'", field, s))
            })?,
        };
        Self::new(value).map_err(|_| {
            Error::Validation(format!(
                "'{}' must be a positive number of gigabytes, got {}",
                field, value
            ))
        })
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Size argument for `qemu-img`, e.g. `10G`
    pub fn to_arg(&self) -> String {
        format!("{}G", self)
    }
}

impl std::fmt::Display for Gigabytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.0}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Raw create-disk request, validated by the service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDisk {
    pub name: Option<String>,
    pub size: Option<Quantity>,
    pub format: Option<String>,
}

/// Inspection result. All four fields are always present; anything the
/// tool did not report is an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub image: String,
    pub file_format: String,
    pub virtual_size: String,
    pub disk_size: String,
}

impl DiskInfo {
    /// Project `qemu-img info` human output onto the four reported fields
    pub fn from_info_output(stdout: &str) -> Self {
        let mut fields: HashMap<String, String> = HashMap::new();
        for line in stdout.trim().lines() {
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        let mut take = |key: &str| fields.remove(key).unwrap_or_default();
        Self {
            image: take("image"),
            file_format: take("file format"),
            virtual_size: take("virtual size"),
            disk_size: take("disk size"),
        }
    }

    /// Exact capacity from a value like `10 GiB (10737418240 bytes)`
    pub fn virtual_size_bytes(&self) -> Option<u64> {
        let open = self.virtual_size.rfind('(')?;
        let inner = self.virtual_size[open + 1..].trim_end_matches(')');
        inner.strip_suffix("bytes")?.trim().parse().ok()
    }
}
