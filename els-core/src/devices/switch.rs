//! Switches
//!
//! A switch is a thin wrapper around one output pin that users toggle
//! directly. When `inverted` is set the observed "on" state corresponds to
//! a low pin level, for relays that energise on low.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::devices::outpin::OutPin;
use crate::hw::gpio::Level;
use els_error::Result;

/// The user-visible state of a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    On,
    Off,
}

impl SwitchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchMode::On => "on",
            SwitchMode::Off => "off",
        }
    }
}

/// Partial update for a switch; `id` absent means "create"
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSettingsInput {
    pub id: Option<String>,
    pub name: Option<String>,
    pub gpio: Option<String>,
    pub inverted: Option<bool>,
    pub state: Option<SwitchMode>,
}

/// A named on/off output pin with optional logical inversion
#[derive(Debug)]
pub struct Switch {
    pub id: i64,
    pub inverted: bool,
    pub output: OutPin,
}

impl Switch {
    pub fn new(id: i64, output: OutPin, inverted: bool) -> Self {
        Self {
            id,
            inverted,
            output,
        }
    }

    pub fn name(&self) -> &str {
        &self.output.friendly_name
    }

    pub fn gpio(&self) -> &str {
        self.output.identifier()
    }

    /// Switch on; with inversion the pin goes low
    pub fn on(&mut self, now: Instant) -> Result<()> {
        if self.inverted {
            self.output.turn_off(now)?;
        } else {
            self.output.turn_on(now)?;
        }
        Ok(())
    }

    /// Switch off; with inversion the pin goes high
    pub fn off(&mut self, now: Instant) -> Result<()> {
        if self.inverted {
            self.output.turn_on(now)?;
        } else {
            self.output.turn_off(now)?;
        }
        Ok(())
    }

    /// The observed state, derived from the hardware level
    pub fn state(&mut self) -> SwitchMode {
        if self.output.read_level() == Some(self.on_level()) {
            SwitchMode::On
        } else {
            SwitchMode::Off
        }
    }

    /// Force the switch off
    pub fn reset(&mut self, now: Instant) -> Result<()> {
        self.off(now)
    }

    fn on_level(&self) -> Level {
        if self.inverted {
            Level::Low
        } else {
            Level::High
        }
    }
}
