pub mod devices;
pub mod error;
pub mod identify;
pub mod net;
#[cfg(test)]
mod test_utils;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum, error::ErrorKind};
use serde::Serialize;

use devices::{CameraInfo, DeviceKind};
use error::Error;
use identify::{Identifier, IdentifyReport};
use net::{Endpoint, PROGRESS_DONE};

const EXIT_OK: u8 = 0;
const EXIT_BAD_ARGS: u8 = 1;
const EXIT_ACTION_FAILED: u8 = 2;

const SERIAL_BAUD: u32 = 115_200;

/// USB interface class of UVC video devices
const USB_CLASS_VIDEO: u8 = 0x0e;

/// Flash size and sensor pairing of the hardware revision we can vouch for
const KNOWN_FLASH_SIZE: u64 = 0x400000;
const KNOWN_SENSOR_VENDOR: u16 = 0x0c45;
const KNOWN_SENSOR_PRODUCT: u16 = 0x6360;

#[derive(Parser, Debug)]
#[command(name = "ipcam-toolkit")]
#[command(about = "Identify IP cameras on the network and dump their firmware")]
struct Cli {
    /// Work out what kind of device is at the host
    #[arg(short, long)]
    identify: bool,

    /// Query hardware details of a known device
    #[arg(short, long)]
    query: bool,

    /// Copy the device's flash contents into this file
    #[arg(short, long, value_name = "FILE")]
    dump_firmware: Option<PathBuf>,

    /// List the supported device types and exit
    #[arg(long)]
    list_types: bool,

    /// Device type, as printed by --identify or --list-types
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    device_type: Option<DeviceKind>,

    /// Hostname or IP address of the device
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Web interface port, when it is known not to be on the usual one
    #[arg(short, long)]
    port: Option<u16>,

    /// Serial port the device is connected to (COM1, /dev/ttyUSB0, etc.)
    #[arg(short, long, value_name = "DEV")]
    serial: Option<String>,

    /// Show more detail (can specify twice for even more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Debug, Serialize)]
struct QueryReport {
    flash_size: u64,
    camera: CameraInfo,
    model: String,
    firmware_id: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(parse_error_code(&err));
        }
    };
    init_logging(cli.verbose);

    if cli.list_types {
        for kind in DeviceKind::ALL {
            println!("{kind}\t{}", kind.description());
        }
        return ExitCode::from(EXIT_OK);
    }

    if cli.host.is_none() && cli.serial.is_none() {
        eprintln!("a hostname or serial port must be specified.");
        return ExitCode::from(EXIT_BAD_ARGS);
    }

    // Open the serial port if one was given. No current model drives it
    // beyond the initial open.
    let _serial = match &cli.serial {
        Some(path) => match serialport::new(path.as_str(), SERIAL_BAUD).open() {
            Ok(port) => Some(port),
            Err(err) => {
                eprintln!("unable to open serial port {path}: {err}");
                return ExitCode::from(EXIT_BAD_ARGS);
            }
        },
        None => None,
    };

    let mut endpoint = Endpoint::new(cli.host.clone().unwrap_or_default());
    if let Some(port) = cli.port {
        endpoint = endpoint.with_http_port(port);
    }

    let mut device_type = cli.device_type;
    let mut failed = false;

    if cli.identify {
        let report = Identifier::new(endpoint.clone()).run();
        print_identify_report(cli.output, &report);
        if report.device.is_none() {
            eprintln!("Unable to identify device!");
        }
        if device_type.is_none() {
            device_type = report.device;
        }
    }

    if cli.query {
        let Some(kind) = device_type else {
            eprintln!("--type missing or invalid.");
            return ExitCode::from(EXIT_BAD_ARGS);
        };
        if let Err(err) = run_query(&endpoint, kind, cli.output) {
            eprintln!("Device query failed: {err}");
            failed = true;
        }
    }

    if let Some(path) = &cli.dump_firmware {
        let Some(kind) = device_type else {
            eprintln!("--type missing or invalid.");
            return ExitCode::from(EXIT_BAD_ARGS);
        };
        if let Err(err) = run_dump(&endpoint, kind, path) {
            eprintln!("Download failed: {err}");
            failed = true;
        }
    }

    if failed {
        return ExitCode::from(EXIT_ACTION_FAILED);
    }
    ExitCode::from(EXIT_OK)
}

/// Exit status for a parse failure. Help and version requests arrive as
/// parse errors too, but they are not failures.
fn parse_error_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_OK,
        _ => EXIT_BAD_ARGS,
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn print_identify_report(output: OutputFormat, report: &IdentifyReport) {
    match output {
        OutputFormat::Json => print_json(report),
        OutputFormat::Human => {
            match report.device {
                Some(kind) => println!("device_type={kind}"),
                None => println!("device_type=unknown"),
            }
            if let Some(creds) = &report.credentials {
                println!("admin_username={}", creds.username);
                println!("admin_password={}", creds.password);
            }
            if let Some(port) = report.http_port {
                println!("http_port={port}");
            }
        }
    }
}

fn run_query(endpoint: &Endpoint, kind: DeviceKind, output: OutputFormat) -> error::Result<()> {
    let mut device = devices::open(kind, endpoint);
    let flash_size = device.get_flash_info()?;
    let camera = device.get_camera_info()?;
    let report = QueryReport {
        model: model_name(kind, flash_size, camera),
        firmware_id: firmware_id(kind, flash_size, camera),
        flash_size,
        camera,
    };

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Human => {
            println!("flash_size={}", report.flash_size);
            println!("camera_usb_vendor={:04x}", report.camera.vendor_id);
            println!("camera_usb_product={:04x}", report.camera.product_id);
            println!("camera_usb_class={:02x}", report.camera.interface_class);
            println!("model={}", report.model);
            println!("fwid={}", report.firmware_id);
        }
    }

    if !is_known_model(flash_size, camera) {
        eprintln!();
        eprintln!();
        eprintln!(" >>> This camera is an unknown model!  Please get in touch!");
        eprintln!("http://www.openipcam.com/forum/");
    }
    Ok(())
}

fn run_dump(endpoint: &Endpoint, kind: DeviceKind, path: &Path) -> error::Result<()> {
    let mut device = devices::open(kind, endpoint);
    let mut file = File::create(path).map_err(|err| {
        Error::Transport(io::Error::new(
            err.kind(),
            format!("unable to create {}: {err}", path.display()),
        ))
    })?;
    device.get_firmware(&mut file, &mut |done, total| {
        show_progress("Downloading firmware", done, total)
    })?;
    println!("Saved to {}", path.display());
    Ok(())
}

fn print_json<T: Serialize>(report: &T) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("unable to encode report: {err}"),
    }
}

/// Redraw a one-line progress meter on stderr, finishing the line once the
/// final callback arrives.
fn show_progress(message: &str, done: u64, total: u64) {
    let mut stderr = io::stderr();
    let _ = render_progress(&mut stderr, message, done, total);
    let _ = stderr.flush();
}

/// A zero total means the size is not known yet, so the percentage is
/// left off.
fn render_progress(out: &mut dyn Write, message: &str, done: u64, total: u64) -> io::Result<()> {
    if total == PROGRESS_DONE {
        return writeln!(out);
    }
    if total > 0 {
        write!(out, "\r{message}: {done} bytes read ({}%)", done * 100 / total)
    } else {
        write!(out, "\r{message}: {done} bytes read")
    }
}

fn is_known_model(flash_size: u64, camera: CameraInfo) -> bool {
    flash_size == KNOWN_FLASH_SIZE
        && camera.vendor_id == KNOWN_SENSOR_VENDOR
        && camera.product_id == KNOWN_SENSOR_PRODUCT
}

fn model_name(kind: DeviceKind, flash_size: u64, camera: CameraInfo) -> String {
    if is_known_model(flash_size, camera) {
        format!("{kind}-1.0")
    } else {
        format!("{kind}-ver_unknown")
    }
}

fn firmware_id(kind: DeviceKind, flash_size: u64, camera: CameraInfo) -> String {
    let sensor = if camera.interface_class == USB_CLASS_VIDEO {
        "uvc"
    } else {
        "unknown_image_sensor"
    };
    format!("{kind}-{}mb-{sensor}", flash_size >> 20)
}
