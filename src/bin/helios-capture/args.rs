use std::{ffi::OsString, path::PathBuf};

use clap::value_t;
use helios::{
    cli::{interval, run_duration, OutputLayout},
    fatal::{FatalHandler, LogAndAbort, RebootHost},
    schedule::{FailurePolicy, ScheduleConfig},
    sink::SinkConfig,
    transport::SerialConfig,
};
use helios::{args_parser, flag, opt};

const EXAMPLES: &str = "EXAMPLES:
    Record every 1 hour 15 minutes and 30 seconds
        helios-capture -H 1 -M 15 -S 30

    Record every 15 minutes for 24 hours
        helios-capture --minutes 15 --duration 24

    Record from /dev/video1 and /dev/ttyACM1
        helios-capture --device /dev/video1 --serial-port /dev/ttyACM1

    Capture a single image
        helios-capture --capture-single-image

    Save only raw counts, no images
        helios-capture --save-raw-only --no-image-save";

pub struct Args {
    pub device: String,
    pub serial_port: String,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub save_dir: PathBuf,
    pub img_dir: Option<String>,
    pub csv_dir: Option<String>,
    pub mean_temps_file: Option<String>,
    pub image_prefix: String,
    pub duration: f64,
    pub capture_single_image: bool,
    pub display_countdown: bool,
    pub print_serial: bool,
    pub save_raw_only: bool,
    pub no_image_save: bool,
    pub save_kelvin: bool,
    pub skip_failed_captures: bool,
    pub reboot_on_fatal: bool,
}

impl Args {
    pub fn from_cmd_line() -> Args {
        Args::from_iter_safe(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    pub fn from_iter_safe<I, T>(args: I) -> clap::Result<Args>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = args_parser!("helios-capture")
            .about("Record radiometric data at regular intervals from an ICI Helios LWIR camera.")
            .after_help(EXAMPLES)
            .arg(
                opt!("device")
                    .short("d")
                    .default_value("/dev/video0")
                    .help("Path to the camera video device"),
            )
            .arg(
                opt!("serial port")
                    .short("p")
                    .default_value("/dev/ttyACM0")
                    .help("Serial port used to send commands to the camera"),
            )
            .arg(
                opt!("hours")
                    .short("H")
                    .default_value("0")
                    .help("Hours to wait between captures"),
            )
            .arg(
                opt!("minutes")
                    .short("M")
                    .default_value("0")
                    .help("Minutes to wait between captures"),
            )
            .arg(
                opt!("seconds")
                    .short("S")
                    .default_value("0")
                    .help("Seconds to wait between captures"),
            )
            .arg(
                opt!("save dir")
                    .default_value("data")
                    .help("Directory to save images and csv files to"),
            )
            .arg(opt!("img dir").help(
                "Child directory of save-dir for radiometric TIFFs (default: save-dir itself)",
            ))
            .arg(
                opt!("csv dir")
                    .help("Child directory of save-dir for csv files (default: save-dir itself)"),
            )
            .arg(opt!("mean temps file").help(
                "File inside save-dir to append per-frame mean temperatures to. Not written if unset",
            ))
            .arg(
                opt!("image prefix")
                    .default_value("thermal_image")
                    .help("File name prefix of the radiometric TIFFs"),
            )
            .arg(
                opt!("duration")
                    .allow_hyphen_values(true)
                    .default_value("-1")
                    .help("Hours to keep capturing for. Negative runs until interrupted"),
            )
            .arg(flag!("capture single image").help(
                "Capture once and exit. Interval and duration are ignored",
            ))
            .arg(flag!("display countdown").help("Display a countdown until the next capture"))
            .arg(flag!("print serial").help("Log serial commands and replies"))
            .arg(flag!("save raw only").help(
                "Only save raw counts; temperatures can be derived from them afterwards",
            ))
            .arg(flag!("no image save").help("Do not save radiometric TIFFs"))
            .arg(flag!("save kelvin").help("Also save temperatures in Kelvin"))
            .arg(flag!("skip failed captures").help(
                "Keep running when a capture fails after all retries",
            ))
            .arg(flag!("reboot on fatal").help(
                "Reboot the host when the serial port cannot be opened",
            ))
            .get_matches_from_safe(args)?;

        let optional = |name: &str| matches.value_of(name).map(String::from);

        Ok(Args {
            device: value_t!(matches, "device", String)?,
            serial_port: value_t!(matches, "serial port", String)?,
            hours: value_t!(matches, "hours", u64)?,
            minutes: value_t!(matches, "minutes", u64)?,
            seconds: value_t!(matches, "seconds", u64)?,
            save_dir: value_t!(matches, "save dir", PathBuf)?,
            img_dir: optional("img dir"),
            csv_dir: optional("csv dir"),
            mean_temps_file: optional("mean temps file"),
            image_prefix: value_t!(matches, "image prefix", String)?,
            duration: value_t!(matches, "duration", f64)?,
            capture_single_image: matches.is_present("capture single image"),
            display_countdown: matches.is_present("display countdown"),
            print_serial: matches.is_present("print serial"),
            save_raw_only: matches.is_present("save raw only"),
            no_image_save: matches.is_present("no image save"),
            save_kelvin: matches.is_present("save kelvin"),
            skip_failed_captures: matches.is_present("skip failed captures"),
            reboot_on_fatal: matches.is_present("reboot on fatal"),
        })
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(
            &self.save_dir,
            self.img_dir.as_deref(),
            self.csv_dir.as_deref(),
        )
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            path: self.serial_port.clone(),
            echo: self.print_serial,
            ..Default::default()
        }
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            interval: interval(self.hours, self.minutes, self.seconds),
            run_duration: run_duration(self.duration),
            single_shot: self.capture_single_image,
            countdown: self.display_countdown && !self.capture_single_image,
            on_capture_failure: if self.skip_failed_captures {
                FailurePolicy::SkipCycle
            } else {
                FailurePolicy::Abort
            },
            ..Default::default()
        }
    }

    pub fn sink_config(&self, layout: &OutputLayout) -> SinkConfig {
        SinkConfig {
            csv_dir: layout.csv_dir.clone(),
            image_dir: layout.img_dir.clone(),
            mean_temps_file: self
                .mean_temps_file
                .as_ref()
                .map(|f| layout.save_dir.join(f)),
            raw_only: self.save_raw_only,
            save_image: !self.no_image_save,
            save_kelvin: self.save_kelvin,
            image_prefix: self.image_prefix.clone(),
        }
    }

    pub fn fatal_handler(&self) -> Box<dyn FatalHandler> {
        if self.reboot_on_fatal {
            Box::new(RebootHost::default())
        } else {
            Box::new(LogAndAbort)
        }
    }
}
