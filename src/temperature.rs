use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TemperatureReading;

const MIN_C: f64 = 5.0;
const MAX_C: f64 = 25.0;
const MIN_F: f64 = 41.0;
const MAX_F: f64 = 77.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "\u{00b0}C",
            TemperatureUnit::Fahrenheit => "\u{00b0}F",
        }
    }

    /// One dial tick.
    pub fn step(&self) -> f64 {
        match self {
            TemperatureUnit::Celsius => 0.5,
            TemperatureUnit::Fahrenheit => 1.0,
        }
    }

    /// Target used when nothing is known about a zone yet.
    pub fn default_target(&self) -> f64 {
        match self {
            TemperatureUnit::Celsius => 20.0,
            TemperatureUnit::Fahrenheit => 68.0,
        }
    }

    fn bounds(&self) -> (f64, f64) {
        match self {
            TemperatureUnit::Celsius => (MIN_C, MAX_C),
            TemperatureUnit::Fahrenheit => (MIN_F, MAX_F),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Reading with both scales filled in from a value in `unit`.
pub fn build(value: f64, unit: TemperatureUnit) -> TemperatureReading {
    match unit {
        TemperatureUnit::Celsius => TemperatureReading {
            celsius: Some(value),
            fahrenheit: Some(celsius_to_fahrenheit(value)),
        },
        TemperatureUnit::Fahrenheit => TemperatureReading {
            celsius: Some(fahrenheit_to_celsius(value)),
            fahrenheit: Some(value),
        },
    }
}

/// Value of `reading` in `unit`; 0 when absent.
pub fn read(reading: Option<&TemperatureReading>, unit: TemperatureUnit) -> f64 {
    let Some(reading) = reading else {
        return 0.0;
    };
    match unit {
        TemperatureUnit::Celsius => reading.celsius.unwrap_or(0.0),
        TemperatureUnit::Fahrenheit => reading.fahrenheit.unwrap_or(0.0),
    }
}

pub fn format(value: f64, unit: TemperatureUnit) -> String {
    format!("{value:.1}{}", unit.symbol())
}

/// Position of `value` on the controller's 0..=100 bar.
pub fn indicator_percent(value: f64, unit: TemperatureUnit) -> f64 {
    let (min, max) = unit.bounds();
    ((value - min) / (max - min) * 100.0).clamp(0.0, 100.0)
}

pub fn clamp(value: f64, unit: TemperatureUnit) -> f64 {
    let (min, max) = unit.bounds();
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_are_inverse() {
        assert!((celsius_to_fahrenheit(21.0) - 69.8).abs() < 1e-9);
        assert!((fahrenheit_to_celsius(celsius_to_fahrenheit(18.5)) - 18.5).abs() < 1e-9);
    }

    #[test]
    fn build_fills_both_scales() {
        let t = build(77.0, TemperatureUnit::Fahrenheit);
        assert_eq!(t.fahrenheit, Some(77.0));
        assert!((t.celsius.unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn read_missing_is_zero() {
        assert_eq!(read(None, TemperatureUnit::Celsius), 0.0);
        let partial = TemperatureReading { celsius: Some(20.0), fahrenheit: None };
        assert_eq!(read(Some(&partial), TemperatureUnit::Fahrenheit), 0.0);
        assert_eq!(read(Some(&partial), TemperatureUnit::Celsius), 20.0);
    }

    #[test]
    fn format_uses_one_decimal() {
        assert_eq!(format(21.0, TemperatureUnit::Celsius), "21.0\u{00b0}C");
        assert_eq!(format(70.24, TemperatureUnit::Fahrenheit), "70.2\u{00b0}F");
    }

    #[test]
    fn indicator_is_clamped() {
        assert_eq!(indicator_percent(15.0, TemperatureUnit::Celsius), 50.0);
        assert_eq!(indicator_percent(2.0, TemperatureUnit::Celsius), 0.0);
        assert_eq!(indicator_percent(90.0, TemperatureUnit::Fahrenheit), 100.0);
    }

    #[test]
    fn clamp_respects_unit_bounds() {
        assert_eq!(clamp(30.0, TemperatureUnit::Celsius), 25.0);
        assert_eq!(clamp(30.0, TemperatureUnit::Fahrenheit), 41.0);
        assert_eq!(clamp(70.0, TemperatureUnit::Fahrenheit), 70.0);
    }
}
