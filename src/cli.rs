//! Helpers to parse CLI arguments in the accompanying
//! binary.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
pub use clap::{App, Arg};
pub use inflector::Inflector;
use log::info;

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! flag {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .takes_value(false)
    }};
}

/// Where captures are written.
///
/// Image and CSV directories are children of `save_dir`,
/// or `save_dir` itself when not given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub save_dir: PathBuf,
    pub img_dir: PathBuf,
    pub csv_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(save_dir: &Path, img_dir: Option<&str>, csv_dir: Option<&str>) -> Self {
        let child = |sub: Option<&str>| match sub {
            Some(sub) => save_dir.join(sub),
            None => save_dir.to_path_buf(),
        };
        OutputLayout {
            save_dir: save_dir.to_path_buf(),
            img_dir: child(img_dir),
            csv_dir: child(csv_dir),
        }
    }

    pub fn create(&self) -> Result<()> {
        info!("save_dir : {}", self.save_dir.display());
        for (name, dir) in [
            ("save_dir", &self.save_dir),
            ("img_dir", &self.img_dir),
            ("csv_dir", &self.csv_dir),
        ]
        .iter()
        {
            fs::create_dir_all(dir).with_context(|| format!("creating {} {}", name, dir.display()))?;
            if *dir != &self.save_dir {
                info!("{:<9}: {}", name, dir.display());
            }
        }
        Ok(())
    }
}

pub fn interval(hours: u64, minutes: u64, seconds: u64) -> Duration {
    Duration::from_secs(hours * 3600 + minutes * 60 + seconds)
}

/// Run duration from a number of hours; zero or negative
/// means run until interrupted.
pub fn run_duration(hours: f64) -> Option<Duration> {
    if hours > 0. && hours.is_finite() {
        Some(Duration::from_secs_f64(hours * 3600.))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn layout_defaults_to_save_dir() {
        let layout = OutputLayout::new(Path::new("data"), None, Some("csv"));
        assert_eq!(layout.img_dir, PathBuf::from("data"));
        assert_eq!(layout.csv_dir, PathBuf::from("data/csv"));
    }

    #[test]
    fn layout_creates_child_dirs() {
        let root = TempDir::new().unwrap();
        let save = root.path().join("save");
        let layout = OutputLayout::new(&save, Some("images"), Some("csv"));
        layout.create().unwrap();
        assert!(save.join("images").is_dir());
        assert!(save.join("csv").is_dir());
    }

    #[test]
    fn durations() {
        assert_eq!(interval(1, 15, 30), Duration::from_secs(4530));
        assert_eq!(run_duration(-1.), None);
        assert_eq!(run_duration(0.), None);
        assert_eq!(run_duration(0.5), Some(Duration::from_secs(1800)));
    }
}
