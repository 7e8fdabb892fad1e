//! Temperature controllers
//!
//! A temperature controller owns a set of probes (by physical address), a
//! mode, a set point and three optional settings records (PID, manual,
//! hysteresis). Every update cycle it refreshes its probe readings from the
//! cache, averages them, and drives its output control according to the
//! mode:
//!
//! - `off` - duty cycle 0
//! - `manual` - duty/cycle copied from the manual settings
//! - `auto` - PID against the set point, clamped to [-100, 100]
//! - `hysteria` - persisted but reserved; drives no output
//!
//! The PID runs on the Fahrenheit view of the temperatures and uses the
//! *heat* coefficient set for both directions. That matches the original
//! controller this was ported from and is a known limitation; the cool set
//! still contributes its cycle time when the output goes negative.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::constants::history::MAX_LAST_READINGS;
use crate::constants::timing::MIN_CALCULATION_INTERVAL_MS;
use crate::devices::output_control::OutputControl;
use crate::hw::gpio::{GpioDriver, PinClaims};
use crate::hw::probe::ProbeCache;
use crate::temperature::Temperature;
use els_error::{ElsinoreError, Result};

/// Operating mode of a temperature controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerMode {
    #[default]
    Off,
    Auto,
    Manual,
    Hysteria,
}

impl ControllerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerMode::Off => "off",
            ControllerMode::Auto => "auto",
            ControllerMode::Manual => "manual",
            ControllerMode::Hysteria => "hysteria",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ControllerMode::Off),
            "auto" => Some(ControllerMode::Auto),
            "manual" => Some(ControllerMode::Manual),
            "hysteria" => Some(ControllerMode::Hysteria),
            _ => None,
        }
    }
}

/// PID coefficients for one output direction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidSettings {
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
    /// Length of one output window in seconds
    pub cycle_time: i64,
    /// Minimum delay between output transitions in seconds
    pub delay: i64,
    pub configured: bool,
    /// GPIO identifier driving this direction, empty for none
    pub gpio: String,
}

/// Fixed duty settings for manual mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSettings {
    pub duty_cycle: i64,
    pub cycle_time: i64,
    pub configured: bool,
}

/// Thresholds for hysteresis mode (reserved)
#[derive(Debug, Clone, Default)]
pub struct HysteresisSettings {
    pub max_temp: Option<Temperature>,
    pub min_temp: Option<Temperature>,
    /// Minimum output on-time in seconds
    pub min_time: i64,
    pub configured: bool,
}

/// A probe owned by a controller, with its cached reading
#[derive(Debug, Clone)]
pub struct ProbeRef {
    pub phys_addr: String,
    pub friendly_name: String,
    pub reading: Temperature,
    pub updated: DateTime<Utc>,
}

impl ProbeRef {
    pub fn new(phys_addr: &str, friendly_name: &str) -> Self {
        Self {
            phys_addr: phys_addr.to_string(),
            friendly_name: friendly_name.to_string(),
            reading: Temperature::default(),
            updated: Utc::now(),
        }
    }
}

// ============================================================================
// Partial-update inputs
// ============================================================================

/// Every field is independently optional; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PidSettingsInput {
    pub configured: Option<bool>,
    pub cycle_time: Option<i64>,
    pub delay: Option<i64>,
    pub proportional: Option<f64>,
    pub integral: Option<f64>,
    pub derivative: Option<f64>,
    pub gpio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSettingsInput {
    pub configured: Option<bool>,
    pub cycle_time: Option<i64>,
    pub duty_cycle: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HysteriaSettingsInput {
    pub configured: Option<bool>,
    /// Turn the cooling output on past this temperature
    pub max_temp: Option<String>,
    /// Turn the heating output on below this temperature
    pub min_temp: Option<String>,
    pub min_time: Option<i64>,
}

/// Partial update for a whole controller
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSettingsInput {
    pub id: String,
    pub name: Option<String>,
    pub mode: Option<ControllerMode>,
    pub cool_settings: Option<PidSettingsInput>,
    pub heat_settings: Option<PidSettingsInput>,
    pub hysteria_settings: Option<HysteriaSettingsInput>,
    pub manual_settings: Option<ManualSettingsInput>,
    /// Temperature string; empty clears the set point
    pub set_point: Option<String>,
}

impl PidSettings {
    pub fn apply(&mut self, input: &PidSettingsInput) {
        if let Some(configured) = input.configured {
            self.configured = configured;
        }
        if let Some(cycle_time) = input.cycle_time {
            self.cycle_time = cycle_time;
        }
        if let Some(delay) = input.delay {
            self.delay = delay;
        }
        if let Some(proportional) = input.proportional {
            self.proportional = proportional;
        }
        if let Some(integral) = input.integral {
            self.integral = integral;
        }
        if let Some(derivative) = input.derivative {
            self.derivative = derivative;
        }
        if let Some(gpio) = &input.gpio {
            self.gpio = gpio.clone();
        }
    }
}

impl ManualSettings {
    pub fn apply(&mut self, input: &ManualSettingsInput) {
        if let Some(configured) = input.configured {
            self.configured = configured;
        }
        if let Some(cycle_time) = input.cycle_time {
            self.cycle_time = cycle_time;
        }
        if let Some(duty_cycle) = input.duty_cycle {
            self.duty_cycle = duty_cycle;
        }
    }
}

impl HysteresisSettings {
    pub fn apply(&mut self, input: &HysteriaSettingsInput) -> Result<()> {
        if let Some(configured) = input.configured {
            self.configured = configured;
        }
        if let Some(max_temp) = &input.max_temp {
            self.max_temp = Some(max_temp.parse()?);
        }
        if let Some(min_temp) = &input.min_temp {
            self.min_temp = Some(min_temp.parse()?);
        }
        if let Some(min_time) = input.min_time {
            self.min_time = min_time;
        }
        Ok(())
    }
}

// ============================================================================
// The controller
// ============================================================================

/// A named closed-loop temperature controller
pub struct TemperatureController {
    pub id: i64,
    pub name: String,
    pub mode: ControllerMode,
    pub probes: Vec<ProbeRef>,
    pub heat_settings: PidSettings,
    pub cool_settings: PidSettings,
    pub manual_settings: ManualSettings,
    pub hysteresis_settings: HysteresisSettings,
    pub set_point: Option<Temperature>,

    /// Rolling window of the last averaged readings
    pub last_readings: VecDeque<Temperature>,
    /// The duty currently applied
    pub duty_cycle: i64,
    /// The duty the PID last produced
    pub calculated_duty: i64,
    pub output_control: Option<OutputControl>,

    /// Whether a scheduler loop is driving this controller
    pub running: bool,
    stop_tx: Option<watch::Sender<bool>>,

    previous_calculation_time: Option<Instant>,
    total_diff: f64,
    prev_diff: f64,
}

impl TemperatureController {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            mode: ControllerMode::Off,
            probes: Vec::new(),
            heat_settings: PidSettings::default(),
            cool_settings: PidSettings::default(),
            manual_settings: ManualSettings::default(),
            hysteresis_settings: HysteresisSettings::default(),
            set_point: None,
            last_readings: VecDeque::with_capacity(MAX_LAST_READINGS),
            duty_cycle: 0,
            calculated_duty: 0,
            output_control: None,
            running: false,
            stop_tx: None,
            previous_calculation_time: None,
            total_diff: 0.0,
            prev_diff: 0.0,
        }
    }

    /// Attach a probe. Idempotent for an address this controller already
    /// owns; cross-controller ownership is checked by the registry.
    pub fn add_probe(&mut self, probe: ProbeRef) {
        if self
            .probes
            .iter()
            .any(|existing| existing.phys_addr == probe.phys_addr)
        {
            return;
        }
        self.probes.push(probe);
    }

    /// Detach a probe by address
    pub fn remove_probe(&mut self, phys_addr: &str) -> Result<()> {
        let before = self.probes.len();
        self.probes.retain(|probe| probe.phys_addr != phys_addr);
        if self.probes.len() == before {
            return Err(ElsinoreError::not_found(format!(
                "could not find a probe with address {phys_addr}"
            )));
        }
        Ok(())
    }

    /// The exact mean over the attached probes' readings
    pub fn average_temperature(&self) -> Option<Temperature> {
        Temperature::mean(self.probes.iter().map(|probe| probe.reading))
    }

    /// One update cycle: refresh readings, extend the rolling window, then
    /// drive the output control according to the mode. A controller with no
    /// probes is inert.
    pub fn update_output(&mut self, cache: &ProbeCache, now: Instant) {
        if self.probes.is_empty() {
            return;
        }

        for probe in &mut self.probes {
            if let Some(reading) = cache.get(&probe.phys_addr) {
                probe.reading = reading.reading;
                probe.updated = reading.updated;
            }
        }

        let Some(average) = self.average_temperature() else {
            return;
        };
        while self.last_readings.len() >= MAX_LAST_READINGS {
            self.last_readings.pop_front();
        }
        self.last_readings.push_back(average);

        match self.mode {
            ControllerMode::Off => {
                if let Some(control) = &mut self.output_control {
                    control.duty_cycle = 0;
                }
            }
            ControllerMode::Manual => {
                if self.manual_settings.configured {
                    if let Some(control) = &mut self.output_control {
                        control.duty_cycle = self.manual_settings.duty_cycle;
                        control.cycle_time = self.manual_settings.cycle_time;
                    }
                }
            }
            ControllerMode::Auto => {
                let duty = self.calculate(average, now);
                self.calculated_duty = duty;
                self.duty_cycle = duty;

                let heat = &self.heat_settings;
                let cool = &self.cool_settings;
                let cycle_time = match (heat.configured, cool.configured) {
                    (true, true) => {
                        if duty >= 0 {
                            heat.cycle_time
                        } else {
                            cool.cycle_time
                        }
                    }
                    (true, false) => heat.cycle_time,
                    (false, true) => cool.cycle_time,
                    (false, false) => self
                        .output_control
                        .as_ref()
                        .map(|control| control.cycle_time)
                        .unwrap_or_default(),
                };

                if let Some(control) = &mut self.output_control {
                    control.duty_cycle = duty;
                    control.cycle_time = cycle_time;
                }
            }
            ControllerMode::Hysteria => {
                // Reserved mode: accepted and persisted, drives no output yet
            }
        }
    }

    /// Compute the new duty cycle from the averaged temperature.
    ///
    /// The very first call only records the calculation instant. With no
    /// set point, or less than 100 ms since the previous calculation, the
    /// current duty is returned unchanged.
    pub fn calculate(&mut self, average: Temperature, now: Instant) -> i64 {
        let Some(previous) = self.previous_calculation_time else {
            self.previous_calculation_time = Some(now);
            return self.duty_cycle;
        };

        let Some(set_point) = self.set_point else {
            return self.duty_cycle;
        };

        let delta_ms = now.duration_since(previous).as_millis() as f64;
        if delta_ms < MIN_CALCULATION_INTERVAL_MS {
            return self.duty_cycle;
        }

        let target = set_point.fahrenheit() - average.fahrenheit();
        self.total_diff = (self.total_diff + target) * delta_ms;
        let current_err = (target - self.prev_diff) / delta_ms;

        let mut output = self.heat_settings.proportional * target
            + self.heat_settings.integral * self.total_diff
            + self.heat_settings.derivative * current_err;

        self.prev_diff = target;
        self.previous_calculation_time = Some(now);

        if output > 100.0 {
            output = 100.0;
        } else if output < -100.0 {
            output = -100.0;
        }
        output as i64
    }

    /// Apply a partial settings update, then build, update or tear down the
    /// output control depending on whether either direction has a GPIO.
    pub fn apply_settings(
        &mut self,
        input: &ControllerSettingsInput,
        driver: &Arc<dyn GpioDriver>,
        claims: &PinClaims,
        now: Instant,
    ) -> Result<()> {
        if let Some(cool) = &input.cool_settings {
            self.cool_settings.apply(cool);
        }
        if let Some(heat) = &input.heat_settings {
            self.heat_settings.apply(heat);
        }
        if let Some(manual) = &input.manual_settings {
            self.manual_settings.apply(manual);
        }
        if let Some(hysteria) = &input.hysteria_settings {
            self.hysteresis_settings.apply(hysteria)?;
        }
        if let Some(name) = &input.name {
            self.name = name.clone();
        }
        if let Some(mode) = input.mode {
            self.mode = mode;
        }
        if let Some(set_point) = &input.set_point {
            if set_point.trim().is_empty() {
                self.set_point = None;
            } else {
                self.set_point = Some(set_point.parse()?);
            }
        }

        self.rebuild_output_control(driver, claims, now)
    }

    /// Build, re-pin or tear down the output control to match the settings
    pub fn rebuild_output_control(
        &mut self,
        driver: &Arc<dyn GpioDriver>,
        claims: &PinClaims,
        now: Instant,
    ) -> Result<()> {
        let heat_gpio = self.heat_settings.gpio.clone();
        let cool_gpio = self.cool_settings.gpio.clone();

        if !heat_gpio.trim().is_empty() || !cool_gpio.trim().is_empty() {
            if self.output_control.is_none() {
                info!("Turning on output control for {}", self.name);
            } else {
                debug!("Updating output control for {}", self.name);
            }
            let control = self.output_control.get_or_insert_with(OutputControl::new);
            control.reassign_pins(&heat_gpio, &cool_gpio, driver, claims, now)?;
            control.duty_cycle = self.manual_settings.duty_cycle;
            control.cycle_time = self.heat_settings.cycle_time;
        } else if let Some(mut control) = self.output_control.take() {
            info!("Turning off output control for {}", self.name);
            control.teardown(now);
        }
        Ok(())
    }

    /// Create the stop channel for this controller's scheduler loop
    pub fn stop_channel(&mut self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.stop_tx = Some(tx);
        rx
    }

    /// Ask the scheduler loop to reset the outputs and exit
    pub fn signal_stop(&self) {
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(true);
        }
    }
}

impl std::fmt::Debug for TemperatureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemperatureController")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("probes", &self.probes.len())
            .field("duty_cycle", &self.duty_cycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::gpio::MemoryGpio;
    use std::time::Duration;

    fn controller_with_probe(celsius: f64) -> (TemperatureController, ProbeCache) {
        let cache = ProbeCache::new();
        cache.ensure("ARealAddress", 12345);
        cache.update("ARealAddress", Temperature::from_celsius(celsius));

        let mut controller = TemperatureController::new(1, "sample");
        controller.add_probe(ProbeRef::new("ARealAddress", "ARealAddress"));
        (controller, cache)
    }

    #[test]
    fn rolling_window_is_bounded_at_five() {
        let (mut controller, cache) = controller_with_probe(35.0);

        for i in 1..=5 {
            controller.update_output(&cache, Instant::now());
            assert_eq!(controller.last_readings.len(), i);
        }

        // A sixth update drops the oldest entry
        cache.update("ARealAddress", Temperature::from_celsius(36.0));
        controller.update_output(&cache, Instant::now());
        assert_eq!(controller.last_readings.len(), 5);
        assert_eq!(controller.last_readings[4].celsius(), 36.0);
    }

    #[test]
    fn average_spans_all_probes() {
        let (mut controller, cache) = controller_with_probe(35.0);
        cache.ensure("AnotherRealAddress", 54321);
        cache.update("AnotherRealAddress", Temperature::from_celsius(37.0));
        controller.add_probe(ProbeRef::new("AnotherRealAddress", ""));

        controller.update_output(&cache, Instant::now());
        assert_eq!(controller.average_temperature().unwrap().celsius(), 36.0);
    }

    #[test]
    fn first_calculation_only_records_the_instant() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let average = Temperature::from_celsius(35.0);

        let t0 = Instant::now();
        assert_eq!(controller.calculate(average, t0), 0);
        assert_eq!(controller.previous_calculation_time, Some(t0));
    }

    #[test]
    fn sub_sample_calls_change_nothing() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let average = Temperature::from_celsius(35.0);

        let t0 = Instant::now();
        controller.calculate(average, t0);
        controller.set_point = Some(Temperature::from_celsius(36.0));
        controller.heat_settings.proportional = 10.0;

        assert_eq!(controller.calculate(average, t0 + Duration::from_millis(99)), 0);
        assert_eq!(controller.previous_calculation_time, Some(t0));
    }

    /// P=10, set point 36 °C, average 35 °C: target is 1.8 °F, output 18
    #[test]
    fn proportional_term() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let average = Temperature::from_celsius(35.0);

        let t0 = Instant::now();
        controller.calculate(average, t0);
        controller.heat_settings.proportional = 10.0;
        controller.set_point = Some(Temperature::from_celsius(36.0));

        let output = controller.calculate(average, t0 + Duration::from_millis(201));
        assert_eq!(output, 18);
    }

    #[test]
    fn output_clamps_at_one_hundred() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let average = Temperature::from_celsius(35.0);

        let t0 = Instant::now();
        controller.calculate(average, t0);
        controller.heat_settings.proportional = 10.0;
        controller.set_point = Some(Temperature::from_celsius(100.0));

        let output = controller.calculate(average, t0 + Duration::from_millis(201));
        assert_eq!(output, 100);
    }

    #[test]
    fn output_clamps_at_negative_one_hundred() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let average = Temperature::from_celsius(35.0);

        let t0 = Instant::now();
        controller.calculate(average, t0);
        controller.heat_settings.proportional = 10.0;
        controller.set_point = Some(Temperature::from_celsius(-40.0));

        let output = controller.calculate(average, t0 + Duration::from_millis(201));
        assert_eq!(output, -100);
    }

    /// With I=0.1 and a fresh integral sum, a second 201 ms step yields 54
    #[test]
    fn integral_term_accumulates() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let average = Temperature::from_celsius(35.0);

        let t0 = Instant::now();
        controller.calculate(average, t0);
        controller.heat_settings.proportional = 10.0;
        controller.heat_settings.integral = 0.0;
        controller.set_point = Some(Temperature::from_celsius(36.0));

        let output = controller.calculate(average, t0 + Duration::from_millis(201));
        assert_eq!(output, 18);

        controller.total_diff = 0.0;
        controller.heat_settings.integral = 0.1;
        let output = controller.calculate(average, t0 + Duration::from_millis(402));
        assert_eq!(output, 54);
    }

    #[test]
    fn no_set_point_returns_current_duty() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let average = Temperature::from_celsius(35.0);

        let t0 = Instant::now();
        controller.calculate(average, t0);
        controller.heat_settings.proportional = 10.0;

        let output = controller.calculate(average, t0 + Duration::from_millis(201));
        assert_eq!(output, 0);
    }

    fn gpio_env() -> (Arc<dyn GpioDriver>, PinClaims) {
        (Arc::new(MemoryGpio::new()), PinClaims::new())
    }

    #[test]
    fn auto_mode_with_only_heat_uses_heat_cycle_time() {
        let (mut controller, cache) = controller_with_probe(35.0);
        let (driver, claims) = gpio_env();

        controller.mode = ControllerMode::Auto;
        controller.heat_settings = PidSettings {
            configured: true,
            cycle_time: 12,
            proportional: 1.0,
            gpio: "GPIO21".into(),
            ..Default::default()
        };
        controller.set_point = Some(Temperature::from_celsius(40.0));
        controller
            .rebuild_output_control(&driver, &claims, Instant::now())
            .unwrap();

        controller.update_output(&cache, Instant::now());
        assert_eq!(controller.output_control.as_ref().unwrap().cycle_time, 12);
    }

    #[test]
    fn auto_mode_with_only_cool_uses_cool_cycle_time() {
        let (mut controller, cache) = controller_with_probe(35.0);
        let (driver, claims) = gpio_env();

        controller.mode = ControllerMode::Auto;
        controller.cool_settings = PidSettings {
            configured: true,
            cycle_time: 13,
            proportional: 1.0,
            gpio: "GPIO20".into(),
            ..Default::default()
        };
        controller.set_point = Some(Temperature::from_celsius(40.0));
        controller
            .rebuild_output_control(&driver, &claims, Instant::now())
            .unwrap();

        controller.update_output(&cache, Instant::now());
        assert_eq!(controller.output_control.as_ref().unwrap().cycle_time, 13);
    }

    #[test]
    fn manual_mode_copies_the_manual_settings() {
        let (mut controller, cache) = controller_with_probe(35.0);
        let (driver, claims) = gpio_env();

        controller.mode = ControllerMode::Manual;
        controller.heat_settings.gpio = "GPIO21".into();
        controller.manual_settings = ManualSettings {
            duty_cycle: 90,
            cycle_time: 14,
            configured: true,
        };
        controller
            .rebuild_output_control(&driver, &claims, Instant::now())
            .unwrap();

        controller.update_output(&cache, Instant::now());
        let control = controller.output_control.as_ref().unwrap();
        assert_eq!(control.duty_cycle, 90);
        assert_eq!(control.cycle_time, 14);
    }

    #[test]
    fn off_mode_zeroes_the_duty() {
        let (mut controller, cache) = controller_with_probe(35.0);
        let (driver, claims) = gpio_env();

        controller.heat_settings.gpio = "GPIO21".into();
        controller
            .rebuild_output_control(&driver, &claims, Instant::now())
            .unwrap();
        controller.output_control.as_mut().unwrap().duty_cycle = 90;

        controller.mode = ControllerMode::Off;
        controller.update_output(&cache, Instant::now());
        assert_eq!(controller.output_control.as_ref().unwrap().duty_cycle, 0);
    }

    #[test]
    fn controller_without_probes_is_inert() {
        let mut controller = TemperatureController::new(1, "empty");
        let cache = ProbeCache::new();
        controller.mode = ControllerMode::Auto;
        controller.update_output(&cache, Instant::now());
        assert!(controller.last_readings.is_empty());
    }

    #[test]
    fn apply_settings_builds_and_tears_down_the_output_control() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let (driver, claims) = gpio_env();

        let input = ControllerSettingsInput {
            id: "1".into(),
            name: None,
            mode: Some(ControllerMode::Manual),
            cool_settings: None,
            heat_settings: Some(PidSettingsInput {
                configured: Some(true),
                cycle_time: Some(4),
                gpio: Some("GPIO21".into()),
                ..Default::default()
            }),
            hysteria_settings: None,
            manual_settings: Some(ManualSettingsInput {
                configured: Some(true),
                cycle_time: Some(4),
                duty_cycle: Some(50),
            }),
            set_point: Some("36C".into()),
        };
        controller
            .apply_settings(&input, &driver, &claims, Instant::now())
            .unwrap();

        assert!(controller.output_control.is_some());
        assert_eq!(controller.mode, ControllerMode::Manual);
        assert_eq!(controller.set_point.unwrap().celsius(), 36.0);
        assert!(claims.in_use("GPIO21"));

        // Clearing the gpio and the set point tears the control down
        let clear = ControllerSettingsInput {
            id: "1".into(),
            name: None,
            mode: None,
            cool_settings: None,
            heat_settings: Some(PidSettingsInput {
                gpio: Some("".into()),
                ..Default::default()
            }),
            hysteria_settings: None,
            manual_settings: None,
            set_point: Some("".into()),
        };
        controller
            .apply_settings(&clear, &driver, &claims, Instant::now())
            .unwrap();

        assert!(controller.output_control.is_none());
        assert!(controller.set_point.is_none());
        assert!(!claims.in_use("GPIO21"));
    }

    #[test]
    fn apply_settings_rejects_bad_temperatures() {
        let (mut controller, _cache) = controller_with_probe(35.0);
        let (driver, claims) = gpio_env();

        let input = ControllerSettingsInput {
            id: "1".into(),
            name: None,
            mode: None,
            cool_settings: None,
            heat_settings: None,
            hysteria_settings: None,
            manual_settings: None,
            set_point: Some("warm".into()),
        };
        let result = controller.apply_settings(&input, &driver, &claims, Instant::now());
        assert!(matches!(result, Err(ElsinoreError::InvalidTemperature(_))));
    }
}
