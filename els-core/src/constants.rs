//! Shared constants for timing, history and default configuration

/// Timing constants for the scheduler and control loops
pub mod timing {
    use std::time::Duration;

    /// How often the 1-Wire bus is scanned and every probe refreshed
    pub const PROBE_READ_INTERVAL: Duration = Duration::from_secs(5);

    /// How often the supervisor checks for controllers that need a loop
    pub const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(1);

    /// How often a running controller recomputes its duty cycle
    pub const CONTROLLER_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

    /// How often an output control re-evaluates its pin states
    pub const OUTPUT_TOGGLE_INTERVAL: Duration = Duration::from_millis(10);

    /// Minimum gap between two duty-cycle calculations, in milliseconds.
    /// Anything shorter would blow up the derivative term.
    pub const MIN_CALCULATION_INTERVAL_MS: f64 = 100.0;
}

/// History bounds
pub mod history {
    /// Maximum number of averaged readings a controller keeps
    pub const MAX_LAST_READINGS: usize = 5;
}

/// Filesystem paths
pub mod paths {
    /// Where the Linux w1 subsystem exposes enumerated 1-Wire slaves
    pub const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";
}

/// Default configuration values
pub mod defaults {
    /// Brewery name written to the settings row on first startup
    pub const BREWERY_NAME: &str = "Elsinore";

    /// Database path (without extension) when none is given
    pub const DB_NAME: &str = "elsinore";

    /// API port when none is given
    pub const PORT: &str = "8080";

    /// Physical address of the injected test probe
    pub const TEST_PROBE_ADDRESS: &str = "ARealAddress";

    /// Numeric bus address of the injected test probe
    pub const TEST_PROBE_ID: u64 = 12345;
}
