//! Hardware access
//!
//! - `gpio` - the GPIO driver seam (rppal-backed on a Pi, memory-backed in tests)
//! - `onewire` - 1-Wire bus enumeration and DS18B20 reads via the w1 sysfs
//! - `probe` - the process-wide probe reading cache

pub mod gpio;
pub mod onewire;
pub mod probe;
