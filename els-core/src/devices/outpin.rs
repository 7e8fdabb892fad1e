//! Output pins
//!
//! An [`OutPin`] is one named digital output together with the instant of
//! its last transition. Exactly one of `on_time` / `off_time` is set once
//! the pin has ever been driven; the duty-cycle logic in
//! [`crate::devices::output_control`] reads those stamps to decide when the
//! next transition is due.
//!
//! Transitions are debounced: turning on a pin that is already on (stamp
//! set and hardware reads high) is a no-op. A failed read-back after
//! driving high is retried once and then logged, it does not fail the
//! caller.

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::hw::gpio::{GpioDriver, GpioPin, Level, PinClaims};
use els_error::{ElsinoreError, Result};

/// What a reassignment did with the pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassign {
    /// The pin keeps (or changed) its identifier
    Kept,
    /// The identifier was cleared; the owner should drop the pin
    Removed,
}

/// One named digital output with transition timestamps
pub struct OutPin {
    identifier: String,
    pub friendly_name: String,
    handle: Option<Box<dyn GpioPin>>,
    on_time: Option<Instant>,
    off_time: Option<Instant>,
    driver: Arc<dyn GpioDriver>,
    claims: PinClaims,
}

impl OutPin {
    /// Create a pin, claiming its identifier. Fails with `PinBusy` when the
    /// identifier is already owned elsewhere.
    pub fn new(
        identifier: &str,
        friendly_name: &str,
        driver: Arc<dyn GpioDriver>,
        claims: PinClaims,
    ) -> Result<Self> {
        claims.claim(identifier)?;
        Ok(Self {
            identifier: identifier.trim().to_string(),
            friendly_name: friendly_name.to_string(),
            handle: None,
            on_time: None,
            off_time: None,
            driver,
            claims,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn on_time(&self) -> Option<Instant> {
        self.on_time
    }

    pub fn off_time(&self) -> Option<Instant> {
        self.off_time
    }

    fn ensure_handle(&mut self) -> Result<&mut Box<dyn GpioPin>> {
        if self.handle.is_none() {
            self.handle = self.driver.resolve(&self.identifier);
        }
        self.handle
            .as_mut()
            .ok_or_else(|| ElsinoreError::PinUnresolvable(self.identifier.clone()))
    }

    /// Drive the pin high and stamp the transition. Returns `Ok(false)` when
    /// the pin was already on.
    pub fn turn_on(&mut self, now: Instant) -> Result<bool> {
        let already_on = self.on_time.is_some();
        let friendly_name = self.friendly_name.clone();
        let handle = self.ensure_handle()?;

        if already_on && handle.read() == Level::High {
            return Ok(false);
        }

        handle.write(Level::High)?;
        if handle.read() != Level::High {
            warn!("Failed to turn {} on, retrying", friendly_name);
            handle.write(Level::High)?;
            if handle.read() != Level::High {
                warn!("Failed to turn {} on", friendly_name);
            }
        }

        self.off_time = None;
        self.on_time = Some(now);
        Ok(true)
    }

    /// Drive the pin low and stamp the transition. Returns `Ok(false)` when
    /// the pin was already off.
    pub fn turn_off(&mut self, now: Instant) -> Result<bool> {
        let already_off = self.off_time.is_some();
        let handle = self.ensure_handle()?;

        if already_off && handle.read() == Level::Low {
            return Ok(false);
        }

        handle.write(Level::Low)?;
        self.on_time = None;
        self.off_time = Some(now);
        Ok(true)
    }

    /// Make sure the hardware handle exists and force the pin low.
    /// Fails with `PinUnresolvable` when the identifier maps to no pin.
    pub fn reset(&mut self, now: Instant) -> Result<()> {
        if self.identifier.is_empty() {
            if self.handle.is_some() {
                self.turn_off(now)?;
            }
            return Ok(());
        }

        self.ensure_handle()?;
        self.turn_off(now)?;
        Ok(())
    }

    /// Re-point the pin at a new identifier.
    ///
    /// An empty identifier resets the pin and asks the owner to drop it. A
    /// changed identifier resets the old pin, then claims the new one,
    /// failing with `PinBusy` when it is owned elsewhere.
    pub fn reassign(&mut self, new_identifier: &str, now: Instant) -> Result<Reassign> {
        let new_identifier = new_identifier.trim();

        if new_identifier.is_empty() {
            if let Err(e) = self.reset(now) {
                warn!("Reset of {} before removal failed: {}", self.identifier, e);
            }
            self.claims.release(&self.identifier);
            return Ok(Reassign::Removed);
        }

        if !self.identifier.eq_ignore_ascii_case(new_identifier) {
            if let Err(e) = self.reset(now) {
                warn!("Reset of {} before reassign failed: {}", self.identifier, e);
            }
            if self.claims.in_use(new_identifier) {
                return Err(ElsinoreError::PinBusy(new_identifier.to_string()));
            }
            self.claims.release(&self.identifier);
            self.claims.claim(new_identifier)?;
            self.identifier = new_identifier.to_string();
            self.handle = None;
            self.reset(now)?;
        }

        Ok(Reassign::Kept)
    }

    /// The current hardware level, if the pin resolves
    pub fn read_level(&mut self) -> Option<Level> {
        self.ensure_handle().ok().map(|handle| handle.read())
    }

    /// Give the identifier claim back. Call when the owning device is
    /// destroyed.
    pub fn release(&mut self) {
        self.claims.release(&self.identifier);
    }
}

impl std::fmt::Debug for OutPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutPin")
            .field("identifier", &self.identifier)
            .field("friendly_name", &self.friendly_name)
            .field("on_time", &self.on_time)
            .field("off_time", &self.off_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::gpio::MemoryGpio;

    fn pin_on(driver: &Arc<MemoryGpio>, claims: &PinClaims, id: &str) -> OutPin {
        OutPin::new(id, id, driver.clone() as Arc<dyn GpioDriver>, claims.clone()).unwrap()
    }

    #[test]
    fn exactly_one_stamp_after_first_drive() {
        let driver = Arc::new(MemoryGpio::new());
        let claims = PinClaims::new();
        let mut pin = pin_on(&driver, &claims, "GPIO21");

        assert!(pin.on_time().is_none() && pin.off_time().is_none());

        let t0 = Instant::now();
        assert!(pin.turn_on(t0).unwrap());
        assert!(pin.on_time().is_some() && pin.off_time().is_none());
        assert_eq!(driver.level_of("GPIO21"), Some(Level::High));

        let t1 = t0 + std::time::Duration::from_secs(1);
        assert!(pin.turn_off(t1).unwrap());
        assert!(pin.on_time().is_none() && pin.off_time() == Some(t1));
        assert_eq!(driver.level_of("GPIO21"), Some(Level::Low));
    }

    #[test]
    fn repeated_transitions_are_debounced() {
        let driver = Arc::new(MemoryGpio::new());
        let claims = PinClaims::new();
        let mut pin = pin_on(&driver, &claims, "GPIO21");

        let t0 = Instant::now();
        assert!(pin.turn_on(t0).unwrap());
        let stamped = pin.on_time();

        // Second call with a later instant changes nothing
        assert!(!pin.turn_on(t0 + std::time::Duration::from_secs(5)).unwrap());
        assert_eq!(pin.on_time(), stamped);
    }

    #[test]
    fn reset_fails_for_unresolvable_identifiers() {
        let driver = Arc::new(MemoryGpio::new());
        let claims = PinClaims::new();
        let mut pin = pin_on(&driver, &claims, "NotAPin");
        assert!(matches!(
            pin.reset(Instant::now()),
            Err(ElsinoreError::PinUnresolvable(_))
        ));
    }

    #[test]
    fn reassign_to_empty_marks_removal() {
        let driver = Arc::new(MemoryGpio::new());
        let claims = PinClaims::new();
        let mut pin = pin_on(&driver, &claims, "GPIO21");
        pin.turn_on(Instant::now()).unwrap();

        assert_eq!(pin.reassign("", Instant::now()).unwrap(), Reassign::Removed);
        assert_eq!(driver.level_of("GPIO21"), Some(Level::Low));
        assert!(!claims.in_use("GPIO21"));
    }

    #[test]
    fn reassign_collision_fails_with_pin_busy() {
        let driver = Arc::new(MemoryGpio::new());
        let claims = PinClaims::new();
        let _other = pin_on(&driver, &claims, "GPIO20");
        let mut pin = pin_on(&driver, &claims, "GPIO21");

        assert!(matches!(
            pin.reassign("GPIO20", Instant::now()),
            Err(ElsinoreError::PinBusy(_))
        ));

        // A clean identifier works and swaps the claims over
        assert_eq!(
            pin.reassign("GPIO22", Instant::now()).unwrap(),
            Reassign::Kept
        );
        assert!(!claims.in_use("GPIO21"));
        assert!(claims.in_use("GPIO22"));
    }

    #[test]
    fn same_identifier_reassign_is_a_no_op() {
        let driver = Arc::new(MemoryGpio::new());
        let claims = PinClaims::new();
        let mut pin = pin_on(&driver, &claims, "GPIO21");
        pin.turn_on(Instant::now()).unwrap();

        assert_eq!(
            pin.reassign("gpio21", Instant::now()).unwrap(),
            Reassign::Kept
        );
        // Not reset: the stamp survives
        assert!(pin.on_time().is_some());
    }
}
