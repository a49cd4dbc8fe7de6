//! Functions to compute temperature from raw sensor values.
//!
//! The Helios reports Y16 counts that map to Kelvin through
//! a two-piece linear calibration. The breakpoint and the
//! coefficients are fixed for the sensor model and must stay
//! exact so that new data lines up with historical records.
use ndarray::{Array2, Zip};

/// Raw counts at or below this value use the low-range line.
pub const RAW_BREAKPOINT: u16 = 7300;

pub const CELSIUS_OFFSET: f32 = 273.15;

/// Unconverted 16-bit sensor output, `(rows, cols)`.
pub type RawFrame = Array2<u16>;

// kelvin = (raw + 7000) / 30        raw <= 7300
// kelvin = (raw - 3300) / 15        raw >  7300
#[inline]
pub fn kelvin_from_raw(raw: u16) -> f32 {
    let raw = raw as f64;
    let kelvin = if raw <= RAW_BREAKPOINT as f64 {
        (raw + 7000.0) / 30.0
    } else {
        (raw - 3300.0) / 15.0
    };
    kelvin as f32
}

#[inline]
pub fn celsius_from_kelvin(kelvin: f32) -> f32 {
    kelvin - CELSIUS_OFFSET
}

pub fn to_kelvin(raw: &RawFrame) -> Array2<f32> {
    Zip::from(raw).par_map_collect(|&r| kelvin_from_raw(r))
}

pub fn to_celsius(kelvin: &Array2<f32>) -> Array2<f32> {
    kelvin.mapv(celsius_from_kelvin)
}

/// Temperatures derived from one [`RawFrame`].
#[derive(Debug, Clone)]
pub struct TemperatureFrame {
    pub kelvin: Array2<f32>,
    pub celsius: Array2<f32>,
}

impl TemperatureFrame {
    pub fn from_raw(raw: &RawFrame) -> Self {
        let kelvin = to_kelvin(raw);
        let celsius = to_celsius(&kelvin);
        TemperatureFrame { kelvin, celsius }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.kelvin.dim()
    }
}

/// Frame-wide means, as logged to the mean temperature file.
///
/// Sums are accumulated in `f64`, so means of large frames
/// carry no float32 rounding drift. Logs written by float32
/// tooling may differ from these in the last digits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMeans {
    pub raw: f64,
    pub kelvin: f64,
    pub celsius: f64,
}

impl FrameMeans {
    pub fn compute(raw: &RawFrame, temps: &TemperatureFrame) -> Self {
        FrameMeans {
            raw: mean(raw.iter().map(|&v| v as f64)),
            kelvin: mean(temps.kelvin.iter().map(|&v| v as f64)),
            celsius: mean(temps.celsius.iter().map(|&v| v as f64)),
        }
    }
}

fn mean<I: ExactSizeIterator<Item = f64>>(values: I) -> f64 {
    let len = values.len();
    if len == 0 {
        return f64::NAN;
    }
    values.sum::<f64>() / len as f64
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn breakpoint_selects_branch() {
        let low = kelvin_from_raw(7300);
        let high = kelvin_from_raw(7301);
        assert!((low - 476.667).abs() < 1e-3, "{}", low);
        assert!((high - 266.733).abs() < 1e-3, "{}", high);
        assert_eq!(low, ((7300.0f64 + 7000.0) / 30.0) as f32);
        assert_eq!(high, ((7301.0f64 - 3300.0) / 15.0) as f32);
    }

    #[test]
    fn every_count_converts_to_a_finite_temperature() {
        for raw in 0..=u16::MAX {
            let k = kelvin_from_raw(raw);
            let c = celsius_from_kelvin(k);
            assert!(k.is_finite() && c.is_finite(), "raw {}", raw);
            assert_eq!(c, k - 273.15);
        }
    }

    #[test]
    fn frame_conversion_is_elementwise() {
        let raw = arr2(&[[0u16, 7300], [7301, u16::MAX]]);
        let temps = TemperatureFrame::from_raw(&raw);
        assert_eq!(temps.dim(), (2, 2));
        for ((idx, &r), &k) in raw.indexed_iter().zip(temps.kelvin.iter()) {
            assert_eq!(k, kelvin_from_raw(r));
            assert_eq!(temps.celsius[idx], k - CELSIUS_OFFSET);
        }
    }

    #[test]
    fn means_do_not_drift_on_full_frames() {
        let raw = RawFrame::from_elem((512, 640), 8300);
        let temps = TemperatureFrame::from_raw(&raw);
        let means = FrameMeans::compute(&raw, &temps);
        assert_eq!(means.raw, 8300.0);
        assert_eq!(means.kelvin, kelvin_from_raw(8300) as f64);
        assert_eq!(means.celsius, (kelvin_from_raw(8300) - CELSIUS_OFFSET) as f64);
    }

    #[test]
    fn means_average_every_pixel() {
        // 8300 -> 333.333K, 9300 -> 400K
        let raw = arr2(&[[8300u16, 9300]]);
        let temps = TemperatureFrame::from_raw(&raw);
        let means = FrameMeans::compute(&raw, &temps);
        assert_eq!(means.raw, 8800.0);
        assert!((means.kelvin - 366.6667).abs() < 1e-3);
        assert!((means.celsius - (366.6667 - 273.15)).abs() < 1e-3);
    }
}
