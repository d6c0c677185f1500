//! Driver for MayGion MIPS-based IP cameras. Firmware comes off the
//! device over its FTP service account; flash layout and sensor identity
//! are scraped from the unauthenticated telnet shell.

use std::io::Write;

use tracing::debug;

use super::{CameraInfo, Device};
use crate::error::{Error, Result};
use crate::net::ftp::FtpClient;
use crate::net::telnet::TelnetShell;
use crate::net::{Endpoint, PROGRESS_DONE};

/// Server header the camera's web interface announces itself with
pub const SERVER_SIGNATURE: &str = "WebServer(IPCamera_Logo)";

/// Status page that reports firmware details, guarded by the admin login
pub const STATUS_PAGE: &str = "/sysinfo.xml";

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";

/// Built-in FTP service account, the same on every unit
pub const FTP_USERNAME: &str = "MayGion";
pub const FTP_PASSWORD: &str = "maygion.com";

/// Where the firmware keeps its configuration file
pub const CONFIG_DIR: &str = "/tmp/eye/app";
pub const CONFIG_FILE: &str = "cs.ini";

const FIRMWARE_DIR: &str = "/dev";
const FIRMWARE_FILE: &str = "mtdblock0";

const CAMERA_INFO_COMMAND: &str =
    "cat /sys/class/video4linux/video0/device/../idVendor ; \
     cat /sys/class/video4linux/video0/device/../idProduct ; \
     cat /sys/class/video4linux/video0/device/bInterfaceClass";

pub struct MaygionMips {
    endpoint: Endpoint,
    ftp: FtpClient,
}

impl MaygionMips {
    pub fn new(endpoint: &Endpoint) -> Self {
        MaygionMips {
            ftp: FtpClient::new(endpoint),
            endpoint: endpoint.clone(),
        }
    }

    /// Fallible body of `get_firmware`. The caller closes the FTP session
    /// whatever the outcome.
    fn download_flash(
        &mut self,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<()> {
        if !self.ftp.login(FTP_USERNAME, FTP_PASSWORD)? {
            return Err(Error::Protocol("Unable to log in to device via FTP.".into()));
        }
        let flash_len = self.get_flash_info()?;

        let mut sized = |done: u64, total: u64| {
            if total == PROGRESS_DONE {
                progress(done, total);
            } else {
                progress(done, flash_len);
            }
        };
        self.ftp.download(FIRMWARE_DIR, FIRMWARE_FILE, out, &mut sized)
    }
}

impl Device for MaygionMips {
    /// Dump the whole flash by retrieving `/dev/mtdblock0` over FTP. The
    /// flash size is looked up first so progress callbacks carry a real
    /// total instead of the zero FTP reports.
    fn get_firmware(
        &mut self,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<()> {
        let result = self.download_flash(out, progress);
        self.ftp.close();
        result
    }

    fn get_flash_info(&mut self) -> Result<u64> {
        let mut shell = TelnetShell::connect(&self.endpoint)?;
        let output = shell.exec("cat /proc/mtd", "/proc/mtd\r\n")?;
        shell.logout()?;
        let size = parse_mtd_table(&output)?;
        debug!("mtd0 size {size:#x} ({size} bytes)");
        Ok(size)
    }

    fn get_camera_info(&mut self) -> Result<CameraInfo> {
        let mut shell = TelnetShell::connect(&self.endpoint)?;
        let output = shell.exec(CAMERA_INFO_COMMAND, "Class\r\n")?;
        shell.logout()?;
        parse_usb_descriptors(&output)
    }
}

/// Size of `mtd0` from the `/proc/mtd` partition table. The whole flash is
/// exposed as `mtd0`, so its size is the firmware image size.
fn parse_mtd_table(output: &str) -> Result<u64> {
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());
    let header = lines.next().unwrap_or("");
    if header.split_whitespace().next() != Some("dev:") {
        return Err(Error::Protocol("Unable to get MTD info.".into()));
    }
    let mut fields = lines.next().unwrap_or("").split_whitespace();
    if fields.next() != Some("mtd0:") {
        return Err(Error::Protocol("mtdblock0 doesn't exist!".into()));
    }
    fields
        .next()
        .and_then(|token| u64::from_str_radix(token, 16).ok())
        .ok_or_else(|| Error::Protocol("malformed mtd0 size".into()))
}

/// Three hex values in the order the scrape command prints them: vendor id,
/// product id, interface class.
fn parse_usb_descriptors(output: &str) -> Result<CameraInfo> {
    let mut tokens = output.split_whitespace();
    let vendor = tokens.next().and_then(|t| u16::from_str_radix(t, 16).ok());
    let product = tokens.next().and_then(|t| u16::from_str_radix(t, 16).ok());
    let class = tokens.next().and_then(|t| u8::from_str_radix(t, 16).ok());
    match (vendor, product, class) {
        (Some(vendor_id), Some(product_id), Some(interface_class)) => Ok(CameraInfo {
            vendor_id,
            product_id,
            interface_class,
        }),
        _ => Err(Error::Protocol(format!(
            "unable to read USB descriptors from {output:?}"
        ))),
    }
}
