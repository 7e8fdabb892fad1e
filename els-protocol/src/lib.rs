//! Remote API types
//!
//! The wire contract between the daemon and its clients: a tagged request
//! enum covering every query and mutation, a status-tagged response
//! envelope, and the DTOs the dispatcher renders core state into.
//!
//! Requests are JSON objects of the form
//! `{"op": "assignProbe", "params": {"name": "...", "address": "..."}}`;
//! responses carry `{"status": "ok", ...}` or
//! `{"status": "error", "message": "..."}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use els_core::devices::controller::TemperatureController;
use els_core::devices::switch::Switch;
use els_core::hw::probe::ProbeReading;
use els_core::settings::SystemSettings;

// Inputs are defined next to the devices that consume them; re-export them
// as part of the wire contract.
pub use els_core::devices::controller::{
    ControllerMode, ControllerSettingsInput, HysteriaSettingsInput, ManualSettings,
    ManualSettingsInput, PidSettings, PidSettingsInput,
};
pub use els_core::devices::switch::{SwitchMode, SwitchSettingsInput};
pub use els_core::settings::SettingsInput;

/// Every operation the API exposes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "params", rename_all = "camelCase")]
pub enum ApiRequest {
    // Queries
    Probe { address: String },
    ProbeList { available: Option<bool> },
    FetchProbes { addresses: Vec<String> },
    TemperatureControllers { name: Option<String> },
    Switches,
    Settings,

    // Mutations
    AssignProbe { name: String, address: String },
    RemoveProbeFromTemperatureController { address: String },
    UpdateTemperatureController { settings: ControllerSettingsInput },
    DeleteTemperatureController { id: String },
    ModifySwitch { settings: SwitchSettingsInput },
    ToggleSwitch { id: String, mode: SwitchMode },
    DeleteSwitch { id: String },
    UpdateSettings { settings: SettingsInput },
}

impl ApiRequest {
    pub fn type_name(&self) -> &'static str {
        match self {
            ApiRequest::Probe { .. } => "Probe",
            ApiRequest::ProbeList { .. } => "ProbeList",
            ApiRequest::FetchProbes { .. } => "FetchProbes",
            ApiRequest::TemperatureControllers { .. } => "TemperatureControllers",
            ApiRequest::Switches => "Switches",
            ApiRequest::Settings => "Settings",
            ApiRequest::AssignProbe { .. } => "AssignProbe",
            ApiRequest::RemoveProbeFromTemperatureController { .. } => {
                "RemoveProbeFromTemperatureController"
            }
            ApiRequest::UpdateTemperatureController { .. } => "UpdateTemperatureController",
            ApiRequest::DeleteTemperatureController { .. } => "DeleteTemperatureController",
            ApiRequest::ModifySwitch { .. } => "ModifySwitch",
            ApiRequest::ToggleSwitch { .. } => "ToggleSwitch",
            ApiRequest::DeleteSwitch { .. } => "DeleteSwitch",
            ApiRequest::UpdateSettings { .. } => "UpdateSettings",
        }
    }
}

/// Response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ApiResponse {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

impl ApiResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse::Error {
            message: message.into(),
        }
    }
}

/// Payload of a successful response; exactly one field is populated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes: Option<Vec<ProbeDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controllers: Option<Vec<ControllerDto>>,
    #[serde(rename = "switch", skip_serializing_if = "Option::is_none")]
    pub switch_state: Option<SwitchDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switches: Option<Vec<SwitchDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DeletedControllerDto>,
}

impl ResponseData {
    pub fn none() -> Self {
        Self::default()
    }
    pub fn probe(probe: ProbeDto) -> Self {
        Self {
            probe: Some(probe),
            ..Self::default()
        }
    }
    pub fn probes(probes: Vec<ProbeDto>) -> Self {
        Self {
            probes: Some(probes),
            ..Self::default()
        }
    }
    pub fn controller(controller: ControllerDto) -> Self {
        Self {
            controller: Some(controller),
            ..Self::default()
        }
    }
    pub fn controllers(controllers: Vec<ControllerDto>) -> Self {
        Self {
            controllers: Some(controllers),
            ..Self::default()
        }
    }
    pub fn switch(switch: SwitchDto) -> Self {
        Self {
            switch_state: Some(switch),
            ..Self::default()
        }
    }
    pub fn switches(switches: Vec<SwitchDto>) -> Self {
        Self {
            switches: Some(switches),
            ..Self::default()
        }
    }
    pub fn settings(settings: SettingsDto) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }
    pub fn deleted(deleted: DeletedControllerDto) -> Self {
        Self {
            deleted: Some(deleted),
            ..Self::default()
        }
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// A physical probe and its current reading
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeDto {
    pub phys_addr: String,
    pub reading: String,
    pub updated: DateTime<Utc>,
}

impl ProbeDto {
    pub fn from_reading(reading: &ProbeReading) -> Self {
        Self {
            phys_addr: reading.phys_addr.clone(),
            reading: reading.reading.to_string(),
            updated: reading.updated,
        }
    }
}

/// A probe as owned by a controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeDetailDto {
    pub phys_addr: String,
    pub name: String,
    pub reading: String,
    pub updated: DateTime<Utc>,
}

/// Hysteresis thresholds rendered as temperature strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HysteriaSettingsDto {
    pub max_temp: Option<String>,
    pub min_temp: Option<String>,
    pub min_time: i64,
    pub configured: bool,
}

/// A temperature controller and everything a client needs to render it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerDto {
    pub id: String,
    pub name: String,
    pub mode: ControllerMode,
    pub set_point: Option<String>,
    pub duty_cycle: i64,
    pub calculated_duty: i64,
    pub temp_probe_details: Vec<ProbeDetailDto>,
    pub heat_settings: PidSettings,
    pub cool_settings: PidSettings,
    pub manual_settings: ManualSettings,
    pub hysteria_settings: HysteriaSettingsDto,
}

impl ControllerDto {
    pub fn from_controller(controller: &TemperatureController) -> Self {
        Self {
            id: controller.id.to_string(),
            name: controller.name.clone(),
            mode: controller.mode,
            set_point: controller.set_point.map(|t| t.to_string()),
            duty_cycle: controller.duty_cycle,
            calculated_duty: controller.calculated_duty,
            temp_probe_details: controller
                .probes
                .iter()
                .map(|probe| ProbeDetailDto {
                    phys_addr: probe.phys_addr.clone(),
                    name: probe.friendly_name.clone(),
                    reading: probe.reading.to_string(),
                    updated: probe.updated,
                })
                .collect(),
            heat_settings: controller.heat_settings.clone(),
            cool_settings: controller.cool_settings.clone(),
            manual_settings: controller.manual_settings.clone(),
            hysteria_settings: HysteriaSettingsDto {
                max_temp: controller
                    .hysteresis_settings
                    .max_temp
                    .map(|t| t.to_string()),
                min_temp: controller
                    .hysteresis_settings
                    .min_temp
                    .map(|t| t.to_string()),
                min_time: controller.hysteresis_settings.min_time,
                configured: controller.hysteresis_settings.configured,
            },
        }
    }
}

/// A switch and its observed state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchDto {
    pub id: String,
    pub name: String,
    pub gpio: String,
    pub state: SwitchMode,
    pub inverted: bool,
}

impl SwitchDto {
    pub fn from_switch(switch: &mut Switch) -> Self {
        Self {
            id: switch.id.to_string(),
            name: switch.name().to_string(),
            gpio: switch.gpio().to_string(),
            state: switch.state(),
            inverted: switch.inverted,
        }
    }
}

/// The brewery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDto {
    pub brewery_name: String,
}

impl SettingsDto {
    pub fn from_settings(settings: &SystemSettings) -> Self {
        Self {
            brewery_name: settings.brewery_name.clone(),
        }
    }
}

/// Result of deleting a controller: the freed probe addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedControllerDto {
    pub id: String,
    pub temperature_probes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_round_trip_through_json() {
        let json = r#"{"op":"assignProbe","params":{"name":"kettle","address":"28-0316a4d1fca2"}}"#;
        let request: ApiRequest = serde_json::from_str(json).unwrap();
        match &request {
            ApiRequest::AssignProbe { name, address } => {
                assert_eq!(name, "kettle");
                assert_eq!(address, "28-0316a4d1fca2");
            }
            other => panic!("unexpected request: {other:?}"),
        }
        assert_eq!(request.type_name(), "AssignProbe");

        let json = r#"{"op":"switches"}"#;
        let request: ApiRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(request, ApiRequest::Switches));
    }

    #[test]
    fn update_request_accepts_partial_settings() {
        let json = r#"{
            "op": "updateTemperatureController",
            "params": {"settings": {
                "id": "1",
                "mode": "auto",
                "setPoint": "36C",
                "heatSettings": {"proportional": 10.0, "gpio": "GPIO21"}
            }}
        }"#;
        let request: ApiRequest = serde_json::from_str(json).unwrap();
        let ApiRequest::UpdateTemperatureController { settings } = request else {
            panic!("wrong variant");
        };
        assert_eq!(settings.id, "1");
        assert_eq!(settings.mode, Some(ControllerMode::Auto));
        assert_eq!(settings.set_point.as_deref(), Some("36C"));
        let heat = settings.heat_settings.unwrap();
        assert_eq!(heat.proportional, Some(10.0));
        assert_eq!(heat.gpio.as_deref(), Some("GPIO21"));
        assert!(heat.integral.is_none());
        assert!(settings.cool_settings.is_none());
    }

    #[test]
    fn error_envelope_serializes_with_status_tag() {
        let response = ApiResponse::error("gpio 'GPIO21' is already in use");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""status":"error""#));
        assert!(json.contains("GPIO21"));

        let response = ApiResponse::Ok(ResponseData::settings(SettingsDto {
            brewery_name: "Elsinore".into(),
        }));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""status":"ok""#));
        assert!(json.contains(r#""breweryName":"Elsinore""#));
        // Unpopulated payload fields stay off the wire
        assert!(!json.contains("controllers"));
    }
}
