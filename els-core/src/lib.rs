//! Elsinore Core Library
//!
//! The control subsystem of the Elsinore brewery daemon:
//!
//! - **Temperature controllers**: named closed loops that aggregate 1-Wire
//!   probe readings and compute a signed heat/cool duty cycle (PID, manual
//!   or off).
//! - **Output control**: a heat/cool pin pair driven from that duty cycle
//!   over a configurable cycle-time window.
//! - **Switches**: user-exposed on/off pins with optional inversion.
//! - **Registry**: the process-wide set of controllers, switches and claimed
//!   GPIO identifiers, backed by the SQLite store.
//!
//! # Module Structure
//!
//! - `hw/` - Hardware access (GPIO driver seam, 1-Wire bus, probe cache)
//! - `devices/` - Output pins, output control, switches, controllers
//! - `data/` - SQLite store and record types

// Grouped modules
pub mod data;
pub mod devices;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod registry;
pub mod runtime;
pub mod settings;
pub mod temperature;

// Re-export primary types
pub use devices::controller::{
    ControllerMode, ControllerSettingsInput, HysteresisSettings, HysteriaSettingsInput,
    ManualSettings, ManualSettingsInput, PidSettings, PidSettingsInput, ProbeRef,
    TemperatureController,
};
pub use devices::outpin::OutPin;
pub use devices::output_control::OutputControl;
pub use devices::switch::{Switch, SwitchMode, SwitchSettingsInput};
pub use hw::gpio::{GpioDriver, GpioPin, Level, MemoryGpio, PinClaims, RppalGpio};
pub use hw::probe::{ProbeCache, ProbeReading};
pub use registry::Registry;
pub use runtime::Runtime;
pub use settings::{SettingsInput, SystemSettings};
pub use temperature::Temperature;

pub use data::store::Database;
pub use els_error::{ElsinoreError, Result};
