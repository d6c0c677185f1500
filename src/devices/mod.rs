//! Device abstraction over the supported camera models. Each model knows
//! how to pull its own firmware image and hardware details off the wire.

pub mod maygion_mips;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Result;
use crate::net::Endpoint;

/// USB descriptor identity of the onboard image sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_class: u8,
}

/// Operations every supported camera model provides.
pub trait Device {
    /// Stream the raw flash contents into `out`. `progress` receives
    /// `(bytes_so_far, total_bytes)` during the transfer and a final call
    /// with [`crate::net::PROGRESS_DONE`] as the total.
    fn get_firmware(
        &mut self,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<()>;

    /// Total flash size in bytes.
    fn get_flash_info(&mut self) -> Result<u64>;

    /// USB identity of the camera sensor module.
    fn get_camera_info(&mut self) -> Result<CameraInfo>;
}

/// Camera models the tool can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    MaygionMips,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 1] = [DeviceKind::MaygionMips];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::MaygionMips => "maygion-mips",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeviceKind::MaygionMips => "MayGion MIPS camera",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DeviceKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown device type: {s:?}"))
    }
}

/// Open a driver for `kind` at `endpoint`.
pub fn open(kind: DeviceKind, endpoint: &Endpoint) -> Box<dyn Device> {
    match kind {
        DeviceKind::MaygionMips => Box::new(maygion_mips::MaygionMips::new(endpoint)),
    }
}
