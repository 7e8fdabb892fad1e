//! Temperature representation
//!
//! Temperatures are stored as nanokelvins in a plain `i64`, the same
//! driver-native representation the DS18B20 stack hands back. The integer
//! form keeps multi-probe averaging exact; Celsius and Fahrenheit are
//! derived views. PID arithmetic runs on the Fahrenheit view.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use els_error::ElsinoreError;

/// Nanokelvins at 0 °C
const ZERO_CELSIUS_NK: i64 = 273_150_000_000;

/// Nanokelvins per degree
const NK_PER_DEGREE: f64 = 1_000_000_000.0;

/// A temperature, stored as nanokelvins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(i64);

impl Temperature {
    /// Construct from a raw nanokelvin value (as persisted)
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw nanokelvin value (for persistence and exact averaging)
    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn from_celsius(celsius: f64) -> Self {
        Self((celsius * NK_PER_DEGREE).round() as i64 + ZERO_CELSIUS_NK)
    }

    pub fn from_fahrenheit(fahrenheit: f64) -> Self {
        Self::from_celsius((fahrenheit - 32.0) / 1.8)
    }

    /// Construct from millidegrees Celsius, the unit the w1 sysfs files use
    pub fn from_millicelsius(millicelsius: i64) -> Self {
        Self(millicelsius * 1_000_000 + ZERO_CELSIUS_NK)
    }

    pub fn celsius(self) -> f64 {
        (self.0 - ZERO_CELSIUS_NK) as f64 / NK_PER_DEGREE
    }

    pub fn fahrenheit(self) -> f64 {
        self.celsius() * 1.8 + 32.0
    }

    /// Exact mean over a set of readings, summing the integer representation
    /// before dividing. Returns `None` for an empty set.
    pub fn mean<I: IntoIterator<Item = Temperature>>(readings: I) -> Option<Temperature> {
        let mut total: i64 = 0;
        let mut count: i64 = 0;
        for reading in readings {
            total += reading.raw();
            count += 1;
        }
        if count == 0 {
            None
        } else {
            Some(Temperature(total / count))
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = format!("{:.3}", self.celsius());
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
        write!(f, "{}°C", text)
    }
}

impl FromStr for Temperature {
    type Err = ElsinoreError;

    /// Parse `<value><C|F>`, case insensitive, optional `°` before the unit
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ElsinoreError::InvalidTemperature(s.to_string());

        let (value_part, unit) = trimmed
            .char_indices()
            .last()
            .map(|(i, c)| (&trimmed[..i], c))
            .ok_or_else(invalid)?;
        let value_part = value_part.trim_end().trim_end_matches('°').trim_end();
        let value: f64 = value_part.parse().map_err(|_| invalid())?;

        match unit.to_ascii_uppercase() {
            'C' => Ok(Temperature::from_celsius(value)),
            'F' => Ok(Temperature::from_fahrenheit(value)),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_celsius_and_fahrenheit() {
        let t: Temperature = "35C".parse().unwrap();
        assert_eq!(t.celsius(), 35.0);

        let t: Temperature = "95f".parse().unwrap();
        assert!((t.celsius() - 35.0).abs() < 1e-9);

        let t: Temperature = "36.5°C".parse().unwrap();
        assert!((t.celsius() - 36.5).abs() < 1e-9);

        let t: Temperature = "-5c".parse().unwrap();
        assert!((t.celsius() + 5.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Temperature>().is_err());
        assert!("35".parse::<Temperature>().is_err());
        assert!("hotC".parse::<Temperature>().is_err());
        assert!("35K".parse::<Temperature>().is_err());
    }

    #[test]
    fn fahrenheit_view_matches_known_points() {
        assert_eq!(Temperature::from_celsius(0.0).fahrenheit(), 32.0);
        assert_eq!(Temperature::from_celsius(100.0).fahrenheit(), 212.0);
        assert_eq!(Temperature::from_celsius(35.0).fahrenheit(), 95.0);
    }

    #[test]
    fn mean_is_exact_over_the_integer_representation() {
        let a = Temperature::from_celsius(35.0);
        let b = Temperature::from_celsius(37.0);
        let avg = Temperature::mean([a, b]).unwrap();
        assert_eq!(avg.celsius(), 36.0);

        assert!(Temperature::mean(std::iter::empty()).is_none());
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Temperature::from_celsius(35.0).to_string(), "35°C");
        assert_eq!(Temperature::from_celsius(36.5).to_string(), "36.5°C");
    }

    #[test]
    fn millicelsius_round_trips() {
        let t = Temperature::from_millicelsius(23_625);
        assert!((t.celsius() - 23.625).abs() < 1e-9);
    }
}
