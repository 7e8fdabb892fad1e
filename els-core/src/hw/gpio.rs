//! GPIO driver seam
//!
//! Output pins are resolved by name ("GPIO21") through a [`GpioDriver`].
//! On a Raspberry Pi the driver is backed by rppal; tests and machines
//! without a GPIO header use [`MemoryGpio`], which keeps pin levels in
//! shared atomics.
//!
//! [`PinClaims`] tracks which identifiers are owned by an output control or
//! a switch. Identifiers are compared case-insensitively, so "gpio21" and
//! "GPIO21" collide.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use els_error::{ElsinoreError, Result};

/// Logic level of a digital output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// A resolved output pin handle
pub trait GpioPin: Send {
    /// Drive the pin to the given level
    fn write(&mut self, level: Level) -> Result<()>;

    /// Read the pin level back
    fn read(&self) -> Level;
}

/// Resolves pin identifiers to hardware handles
pub trait GpioDriver: Send + Sync {
    /// Resolve an identifier such as "GPIO21" to a pin handle, or `None`
    /// when no such pin exists on this host
    fn resolve(&self, identifier: &str) -> Option<Box<dyn GpioPin>>;
}

/// Parse the numeric part of a pin identifier ("GPIO21", "gpio21", "21")
fn pin_number(identifier: &str) -> Option<u8> {
    let digits = identifier
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

// ============================================================================
// rppal-backed driver
// ============================================================================

/// GPIO driver backed by the Broadcom SoC via rppal
pub struct RppalGpio {
    gpio: rppal::gpio::Gpio,
}

impl RppalGpio {
    pub fn new() -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new()
            .map_err(|e| ElsinoreError::hardware(format!("failed to open GPIO: {e}")))?;
        Ok(Self { gpio })
    }
}

impl GpioDriver for RppalGpio {
    fn resolve(&self, identifier: &str) -> Option<Box<dyn GpioPin>> {
        let number = pin_number(identifier)?;
        let pin = self.gpio.get(number).ok()?.into_output();
        Some(Box::new(RppalPin { pin }))
    }
}

struct RppalPin {
    pin: rppal::gpio::OutputPin,
}

impl GpioPin for RppalPin {
    fn write(&mut self, level: Level) -> Result<()> {
        match level {
            Level::High => self.pin.set_high(),
            Level::Low => self.pin.set_low(),
        }
        Ok(())
    }

    fn read(&self) -> Level {
        if self.pin.is_set_high() {
            Level::High
        } else {
            Level::Low
        }
    }
}

// ============================================================================
// Memory-backed driver
// ============================================================================

/// In-memory GPIO driver. Resolves any identifier of the form `GPIO<n>` and
/// shares the level per identifier, so a test can observe what a device
/// wrote. Used by the test suite and as a fallback when no GPIO hardware is
/// present.
#[derive(Default)]
pub struct MemoryGpio {
    levels: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl MemoryGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current level of an identifier, if any pin was ever resolved for it
    pub fn level_of(&self, identifier: &str) -> Option<Level> {
        let levels = self.levels.lock().unwrap();
        levels.get(&identifier.to_ascii_uppercase()).map(|cell| {
            if cell.load(Ordering::SeqCst) {
                Level::High
            } else {
                Level::Low
            }
        })
    }
}

impl GpioDriver for MemoryGpio {
    fn resolve(&self, identifier: &str) -> Option<Box<dyn GpioPin>> {
        pin_number(identifier)?;
        if !identifier.trim().to_ascii_uppercase().starts_with("GPIO") {
            return None;
        }
        let mut levels = self.levels.lock().unwrap();
        let cell = levels
            .entry(identifier.to_ascii_uppercase())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        Some(Box::new(MemoryPin { level: cell }))
    }
}

struct MemoryPin {
    level: Arc<AtomicBool>,
}

impl GpioPin for MemoryPin {
    fn write(&mut self, level: Level) -> Result<()> {
        self.level.store(level == Level::High, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> Level {
        if self.level.load(Ordering::SeqCst) {
            Level::High
        } else {
            Level::Low
        }
    }
}

// ============================================================================
// Pin claims
// ============================================================================

/// The set of GPIO identifiers currently owned by an output control or a
/// switch. Cloning shares the underlying set.
#[derive(Clone, Default)]
pub struct PinClaims {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl PinClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the identifier is owned by any pin
    pub fn in_use(&self, identifier: &str) -> bool {
        self.claimed
            .lock()
            .unwrap()
            .contains(&identifier.trim().to_ascii_uppercase())
    }

    /// Claim an identifier, failing with `PinBusy` when already owned
    pub fn claim(&self, identifier: &str) -> Result<()> {
        let key = identifier.trim().to_ascii_uppercase();
        let mut claimed = self.claimed.lock().unwrap();
        if !claimed.insert(key) {
            return Err(ElsinoreError::PinBusy(identifier.trim().to_string()));
        }
        Ok(())
    }

    /// Release an identifier. Releasing an unclaimed identifier is a no-op.
    pub fn release(&self, identifier: &str) {
        self.claimed
            .lock()
            .unwrap()
            .remove(&identifier.trim().to_ascii_uppercase());
    }
}
