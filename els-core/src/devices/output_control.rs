//! Output control
//!
//! Translates one signed duty cycle into on/off transitions on a heat pin
//! and a cool pin over a cycle-time window. Positive duty drives heat,
//! negative drives cool, zero drives both off. The on-phase of a partial
//! duty lasts `|cycle_time * duty| / 100` seconds, timed from the pin's own
//! transition stamps.
//!
//! GPIO failures during a tick are logged per pin and never abort the
//! toggle loop; pin-resolution failures during reassignment are returned so
//! a bad configuration change can be refused.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::devices::outpin::{OutPin, Reassign};
use crate::hw::gpio::{GpioDriver, PinClaims};
use els_error::Result;

/// A heat/cool output pair driven from a signed duty cycle
#[derive(Debug, Default)]
pub struct OutputControl {
    pub heat_output: Option<OutPin>,
    pub cool_output: Option<OutPin>,
    /// Signed percentage in [-100, 100]
    pub duty_cycle: i64,
    /// Length of one full on+off window, in seconds
    pub cycle_time: i64,
}

impl OutputControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the heat and cool outputs at new identifiers, acquiring and
    /// releasing pins as needed. An empty identifier means "no pin for this
    /// direction".
    pub fn reassign_pins(
        &mut self,
        heat_gpio: &str,
        cool_gpio: &str,
        driver: &Arc<dyn GpioDriver>,
        claims: &PinClaims,
        now: Instant,
    ) -> Result<()> {
        Self::reassign_one(&mut self.heat_output, heat_gpio, "Heating", driver, claims, now)?;
        Self::reassign_one(&mut self.cool_output, cool_gpio, "Cooling", driver, claims, now)?;
        Ok(())
    }

    fn reassign_one(
        slot: &mut Option<OutPin>,
        gpio: &str,
        friendly_name: &str,
        driver: &Arc<dyn GpioDriver>,
        claims: &PinClaims,
        now: Instant,
    ) -> Result<()> {
        let gpio = gpio.trim();
        match slot {
            None if !gpio.is_empty() => {
                *slot = Some(OutPin::new(gpio, friendly_name, driver.clone(), claims.clone())?);
            }
            Some(pin) => {
                if pin.reassign(gpio, now)? == Reassign::Removed {
                    *slot = None;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Drive both pins low
    pub fn reset(&mut self, now: Instant) {
        force_off(&mut self.heat_output, now);
        force_off(&mut self.cool_output, now);
    }

    /// Drive both pins low and give their identifier claims back
    pub fn teardown(&mut self, now: Instant) {
        self.reset(now);
        if let Some(pin) = &mut self.heat_output {
            pin.release();
        }
        if let Some(pin) = &mut self.cool_output {
            pin.release();
        }
        self.heat_output = None;
        self.cool_output = None;
    }

    /// Evaluate the duty cycle against the pin transition stamps and apply
    /// any transition that is due. Called at fine granularity by the toggle
    /// loop.
    pub fn tick(&mut self, now: Instant) {
        let on_seconds = ((self.cycle_time * self.duty_cycle).abs() as f64) / 100.0;

        if on_seconds == 0.0 {
            force_off(&mut self.heat_output, now);
            force_off(&mut self.cool_output, now);
        } else if self.duty_cycle == 100 {
            force_off(&mut self.cool_output, now);
            if force_on(&mut self.heat_output, now) {
                debug!("Turning on heat output for 100% duty cycle");
            }
        } else if self.duty_cycle == -100 {
            force_off(&mut self.heat_output, now);
            if force_on(&mut self.cool_output, now) {
                debug!("Turning on cool output for -100% duty cycle");
            }
        } else if self.duty_cycle > 0 {
            force_off(&mut self.cool_output, now);
            Self::slice(&mut self.heat_output, on_seconds, self.cycle_time, now);
        } else {
            force_off(&mut self.heat_output, now);
            Self::slice(&mut self.cool_output, on_seconds, self.cycle_time, now);
        }
    }

    /// Time-slice one direction: on for `on_seconds`, off for the remainder
    /// of the window. A pin with no stamp yet is driven off to establish
    /// one.
    fn slice(slot: &mut Option<OutPin>, on_seconds: f64, cycle_time: i64, now: Instant) {
        let Some(pin) = slot else { return };

        if let Some(on_time) = pin.on_time() {
            let elapsed = now.duration_since(on_time).as_secs_f64();
            if elapsed > on_seconds {
                debug!("{} turning off after {:.2}s", pin.friendly_name, elapsed);
                drive_off(pin, now);
            }
        } else if let Some(off_time) = pin.off_time() {
            let elapsed = now.duration_since(off_time).as_secs_f64();
            let off_seconds = cycle_time as f64 - on_seconds;
            if elapsed >= off_seconds {
                debug!("{} turning on after {:.2}s", pin.friendly_name, elapsed);
                drive_on(pin, now);
            }
        } else {
            drive_off(pin, now);
        }
    }
}

fn force_off(slot: &mut Option<OutPin>, now: Instant) {
    if let Some(pin) = slot {
        drive_off(pin, now);
    }
}

fn force_on(slot: &mut Option<OutPin>, now: Instant) -> bool {
    match slot {
        Some(pin) => drive_on(pin, now),
        None => false,
    }
}

fn drive_on(pin: &mut OutPin, now: Instant) -> bool {
    match pin.turn_on(now) {
        Ok(changed) => changed,
        Err(e) => {
            warn!("Failed to turn {} on: {}", pin.friendly_name, e);
            false
        }
    }
}

fn drive_off(pin: &mut OutPin, now: Instant) -> bool {
    match pin.turn_off(now) {
        Ok(changed) => changed,
        Err(e) => {
            warn!("Failed to turn {} off: {}", pin.friendly_name, e);
            false
        }
    }
}
