//! Writing capture results to disk.
//!
//! Per capture, with `<ts>` formatted as `%Y%m%d_%H%M%S`:
//!
//! - `raw_temp_data_<ts>.csv`: raw counts, integers
//! - `temp_data_celsius_<ts>.csv`: Celsius, two decimals
//!   (skipped in raw-only mode)
//! - `temp_data_kelvin_<ts>.csv`: Kelvin, two decimals
//!   (only when enabled, never in raw-only mode)
//! - `<prefix>_<ts>.tiff`: single band 32-bit float Celsius,
//!   uncompressed, one strip (unless image saving is off)
//!
//! and optionally one row appended to a running file of
//! frame means.
use std::{
    fmt::Display,
    fs::{self, File, OpenOptions},
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::info;
use ndarray::Array2;
use serde_derive::*;
use tiff::encoder::{colortype::Gray32Float, TiffEncoder};

use crate::radiometry::{FrameMeans, RawFrame, TemperatureFrame};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const MEAN_TEMPS_HEADER: [&str; 4] = ["timestamp", "raw", "kelvin", "celsius"];

/// One capture cycle's worth of data.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub timestamp: DateTime<Local>,
    pub raw: RawFrame,
    pub temperatures: TemperatureFrame,
    pub means: FrameMeans,
}

impl CaptureRecord {
    pub fn new(timestamp: DateTime<Local>, raw: RawFrame) -> Self {
        let temperatures = TemperatureFrame::from_raw(&raw);
        let means = FrameMeans::compute(&raw, &temperatures);
        CaptureRecord {
            timestamp,
            raw,
            temperatures,
            means,
        }
    }

    pub fn stamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

pub trait RecordSink {
    /// Persists `record`, returning the files written.
    fn persist(&mut self, record: &CaptureRecord) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub csv_dir: PathBuf,
    pub image_dir: PathBuf,
    pub mean_temps_file: Option<PathBuf>,
    pub raw_only: bool,
    pub save_image: bool,
    pub save_kelvin: bool,
    pub image_prefix: String,
}

impl SinkConfig {
    /// Everything in `dir`, Celsius CSV and TIFF enabled.
    pub fn in_dir<P: Into<PathBuf>>(dir: P) -> Self {
        let dir = dir.into();
        SinkConfig {
            csv_dir: dir.clone(),
            image_dir: dir,
            mean_temps_file: None,
            raw_only: false,
            save_image: true,
            save_kelvin: false,
            image_prefix: "thermal_image".into(),
        }
    }
}

pub struct FileSink {
    config: SinkConfig,
}

impl FileSink {
    /// Creates the output directories and, if it does not
    /// exist yet, the mean temperature file with its header.
    pub fn new(config: SinkConfig) -> Result<Self> {
        for dir in [&config.csv_dir, &config.image_dir].iter() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating output directory {}", dir.display()))?;
        }

        if let Some(path) = &config.mean_temps_file {
            info!("saving mean temps to {}", path.display());
            if !path.exists() {
                let mut wtr = csv::WriterBuilder::new()
                    .terminator(csv::Terminator::Any(b'\n'))
                    .from_path(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                wtr.write_record(&MEAN_TEMPS_HEADER)?;
                wtr.flush()?;
            }
        }

        Ok(FileSink { config })
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    fn append_means(&self, path: &Path, record: &CaptureRecord) -> Result<()> {
        #[derive(Serialize)]
        struct MeanRow {
            timestamp: String,
            raw: f64,
            kelvin: f64,
            celsius: f64,
        }

        let FrameMeans {
            raw,
            kelvin,
            celsius,
        } = record.means;
        info!(
            "mean temps - raw counts ({:.2}), kelvin ({:.2}), celsius ({:.2})",
            raw, kelvin, celsius
        );

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        wtr.serialize(MeanRow {
            timestamp: record.stamp(),
            raw,
            kelvin,
            celsius,
        })?;
        wtr.flush()?;
        Ok(())
    }
}

impl RecordSink for FileSink {
    fn persist(&mut self, record: &CaptureRecord) -> Result<Vec<PathBuf>> {
        let stamp = record.stamp();
        let cfg = &self.config;
        let mut written = vec![];

        if cfg.save_image {
            let path = cfg
                .image_dir
                .join(format!("{}_{}.tiff", cfg.image_prefix, stamp));
            write_float_tiff(&path, &record.temperatures.celsius)?;
            info!("saved radiometric image {}", path.display());
            written.push(path);
        }

        if let Some(path) = &cfg.mean_temps_file {
            self.append_means(path, record)?;
        }

        let path = cfg.csv_dir.join(format!("raw_temp_data_{}.csv", stamp));
        write_csv(&path, &record.raw, |v| v.to_string())?;
        info!("saved raw temp data {}", path.display());
        written.push(path);

        if !cfg.raw_only {
            let path = cfg.csv_dir.join(format!("temp_data_celsius_{}.csv", stamp));
            write_csv(&path, &record.temperatures.celsius, two_decimals)?;
            info!("saved temperature data in celsius {}", path.display());
            written.push(path);

            if cfg.save_kelvin {
                let path = cfg.csv_dir.join(format!("temp_data_kelvin_{}.csv", stamp));
                write_csv(&path, &record.temperatures.kelvin, two_decimals)?;
                info!("saved temperature data in kelvin {}", path.display());
                written.push(path);
            }
        }

        Ok(written)
    }
}

fn two_decimals<T: Display>(v: &T) -> String {
    format!("{:.2}", v)
}

/// One CSV line per image row, no header.
pub fn write_csv<T, F>(path: &Path, data: &Array2<T>, fmt: F) -> Result<()>
where
    F: Fn(&T) -> String,
{
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in data.outer_iter() {
        wtr.write_record(row.iter().map(&fmt))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Single band float32 TIFF, uncompressed, in a single strip
/// so the whole image is one contiguous block.
pub fn write_float_tiff(path: &Path, data: &Array2<f32>) -> Result<()> {
    let (ht, wid) = data.dim();
    let pixels: Vec<f32> = data.iter().copied().collect();

    let writer = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray32Float>(wid as u32, ht as u32)?;
    image.rows_per_strip(ht as u32)?;
    image.write_data(&pixels)?;
    Ok(())
}
