//! Controller and switch registry
//!
//! The single source of truth for the process: every temperature
//! controller, every switch and every claimed GPIO identifier. Lookups
//! check the in-memory list first and fall back to the store, hydrating on
//! a miss; every mutation is written back to the store before it returns.
//!
//! Invariants enforced here:
//! - a probe address belongs to at most one controller,
//! - controller names and switch names are unique,
//! - a GPIO identifier has at most one owner across controllers and
//!   switches.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::data::store::{ControllerRecord, Database, ProbeRow, SwitchRecord};
use crate::devices::controller::{
    ControllerSettingsInput, ProbeRef, TemperatureController,
};
use crate::devices::outpin::OutPin;
use crate::devices::switch::{Switch, SwitchMode, SwitchSettingsInput};
use crate::hw::gpio::{GpioDriver, PinClaims};
use els_error::{ElsinoreError, Result};

pub type SharedController = Arc<Mutex<TemperatureController>>;
pub type SharedSwitch = Arc<Mutex<Switch>>;

/// The process-wide registry of controllers and switches
pub struct Registry {
    db: Arc<Database>,
    gpio: Arc<dyn GpioDriver>,
    claims: PinClaims,
    controllers: RwLock<Vec<SharedController>>,
    switches: RwLock<Vec<SharedSwitch>>,
}

impl Registry {
    pub fn new(db: Arc<Database>, gpio: Arc<dyn GpioDriver>) -> Self {
        Self {
            db,
            gpio,
            claims: PinClaims::new(),
            controllers: RwLock::new(Vec::new()),
            switches: RwLock::new(Vec::new()),
        }
    }

    pub fn claims(&self) -> &PinClaims {
        &self.claims
    }

    /// Hydrate every persisted controller and switch into memory. Called
    /// once at startup.
    pub async fn load_persisted(&self) -> Result<()> {
        for record in self.db.load_controllers()? {
            let controller = self.hydrate(record).await;
            self.controllers.write().await.push(controller);
        }

        for record in self.db.load_switches()? {
            match self.hydrate_switch(&record) {
                Ok(switch) => self.switches.write().await.push(Arc::new(Mutex::new(switch))),
                Err(e) => warn!("Could not restore switch '{}': {}", record.name, e),
            }
        }

        let controllers = self.controllers.read().await.len();
        let switches = self.switches.read().await.len();
        info!("Loaded {} controllers and {} switches", controllers, switches);
        Ok(())
    }

    async fn hydrate(&self, record: ControllerRecord) -> SharedController {
        let mut controller = TemperatureController::new(record.id, &record.name);
        controller.mode = record.mode;
        controller.set_point = record.set_point;
        controller.heat_settings = record.heat_settings;
        controller.cool_settings = record.cool_settings;
        controller.manual_settings = record.manual_settings;
        controller.hysteresis_settings = record.hysteresis_settings;
        for probe in record.probes {
            controller.add_probe(ProbeRef::new(&probe.phys_addr, &probe.friendly_name));
        }

        if let Err(e) =
            controller.rebuild_output_control(&self.gpio, &self.claims, Instant::now())
        {
            warn!(
                "Could not restore output control for '{}': {}",
                controller.name, e
            );
        }

        Arc::new(Mutex::new(controller))
    }

    fn hydrate_switch(&self, record: &SwitchRecord) -> Result<Switch> {
        let pin = OutPin::new(
            &record.gpio,
            &record.name,
            self.gpio.clone(),
            self.claims.clone(),
        )?;
        Ok(Switch::new(record.id, pin, record.inverted))
    }

    fn record_of(controller: &TemperatureController) -> ControllerRecord {
        ControllerRecord {
            id: controller.id,
            name: controller.name.clone(),
            mode: controller.mode,
            set_point: controller.set_point,
            heat_settings: controller.heat_settings.clone(),
            cool_settings: controller.cool_settings.clone(),
            manual_settings: controller.manual_settings.clone(),
            hysteresis_settings: controller.hysteresis_settings.clone(),
            probes: controller
                .probes
                .iter()
                .map(|probe| ProbeRow {
                    phys_addr: probe.phys_addr.clone(),
                    friendly_name: probe.friendly_name.clone(),
                })
                .collect(),
        }
    }

    /// Persist the current state of a controller
    pub async fn persist(&self, controller: &SharedController) -> Result<()> {
        let record = Self::record_of(&*controller.lock().await);
        self.db.save_controller(&record)
    }

    // ========================================================================
    // Controller lookups
    // ========================================================================

    /// Snapshot of every known controller
    pub async fn controllers(&self) -> Vec<SharedController> {
        self.controllers.read().await.clone()
    }

    pub async fn find_controller_by_name(&self, name: &str) -> Option<SharedController> {
        for controller in self.controllers.read().await.iter() {
            if controller.lock().await.name == name {
                return Some(controller.clone());
            }
        }

        // Fall back to the store
        let record = self.db.load_controller_by_name(name).ok().flatten()?;
        let controller = self.hydrate(record).await;
        self.controllers.write().await.push(controller.clone());
        Some(controller)
    }

    pub async fn find_controller_by_id(&self, id: i64) -> Option<SharedController> {
        for controller in self.controllers.read().await.iter() {
            if controller.lock().await.id == id {
                return Some(controller.clone());
            }
        }

        let record = self.db.load_controller_by_id(id).ok().flatten()?;
        let controller = self.hydrate(record).await;
        self.controllers.write().await.push(controller.clone());
        Some(controller)
    }

    /// The controller owning a probe address, if any
    pub async fn find_controller_for_probe(&self, phys_addr: &str) -> Option<SharedController> {
        for controller in self.controllers.read().await.iter() {
            if controller
                .lock()
                .await
                .probes
                .iter()
                .any(|probe| probe.phys_addr == phys_addr)
            {
                return Some(controller.clone());
            }
        }
        None
    }

    // ========================================================================
    // Controller mutations
    // ========================================================================

    /// Create a controller (or find the one with this name) and attach the
    /// probe to it. Fails with `ProbeOwned` when the probe belongs to a
    /// different controller; re-attaching to the same controller is a
    /// no-op.
    pub async fn create_controller(
        &self,
        name: &str,
        probe: ProbeRef,
    ) -> Result<SharedController> {
        let owner = self.find_controller_for_probe(&probe.phys_addr).await;
        let existing = self.find_controller_by_name(name).await;

        if let Some(owner) = owner {
            return match &existing {
                Some(named) if Arc::ptr_eq(&owner, named) => Ok(owner),
                _ => {
                    let controller = owner.lock().await.name.clone();
                    Err(ElsinoreError::ProbeOwned {
                        probe: probe.phys_addr,
                        controller,
                    })
                }
            };
        }

        let controller = match existing {
            Some(controller) => controller,
            None => {
                let id = self.db.insert_controller(name)?;
                info!("Created temperature controller '{}' ({})", name, id);
                let controller = Arc::new(Mutex::new(TemperatureController::new(id, name)));
                self.controllers.write().await.push(controller.clone());
                controller
            }
        };

        controller.lock().await.add_probe(probe);
        self.persist(&controller).await?;
        Ok(controller)
    }

    /// Apply a partial settings update to the controller the input names
    pub async fn update_controller(
        &self,
        input: &ControllerSettingsInput,
    ) -> Result<SharedController> {
        let id: i64 = input
            .id
            .parse()
            .map_err(|_| ElsinoreError::not_found(format!("no controller could be found for: {}", input.id)))?;
        let controller = self
            .find_controller_by_id(id)
            .await
            .ok_or_else(|| ElsinoreError::not_found(format!("no controller could be found for: {}", input.id)))?;

        controller
            .lock()
            .await
            .apply_settings(input, &self.gpio, &self.claims, Instant::now())?;
        self.persist(&controller).await?;
        Ok(controller)
    }

    /// Detach a probe from whichever controller owns it
    pub async fn remove_probe(&self, phys_addr: &str) -> Result<SharedController> {
        let controller = self
            .find_controller_for_probe(phys_addr)
            .await
            .ok_or_else(|| {
                ElsinoreError::not_found(format!("no controller could be found for {phys_addr}"))
            })?;

        controller.lock().await.remove_probe(phys_addr)?;
        self.persist(&controller).await?;
        Ok(controller)
    }

    /// Delete a controller: stop its loop, tear down its outputs, remove it
    /// from the store. Returns the freed probe addresses.
    pub async fn delete_controller(&self, id: i64) -> Result<Vec<String>> {
        let controller = self.find_controller_by_id(id).await.ok_or_else(|| {
            ElsinoreError::not_found(format!("failed to find a controller to delete for: {id}"))
        })?;

        let freed = {
            let mut guard = controller.lock().await;
            guard.signal_stop();
            if let Some(mut control) = guard.output_control.take() {
                control.teardown(Instant::now());
            }
            guard
                .probes
                .iter()
                .map(|probe| probe.phys_addr.clone())
                .collect::<Vec<_>>()
        };

        self.db.delete_controller(id)?;
        let mut controllers = self.controllers.write().await;
        let mut index = 0;
        while index < controllers.len() {
            if Arc::ptr_eq(&controllers[index], &controller) {
                controllers.swap_remove(index);
            } else {
                index += 1;
            }
        }

        info!("Deleted temperature controller {}", id);
        Ok(freed)
    }

    // ========================================================================
    // Switches
    // ========================================================================

    pub async fn switches(&self) -> Vec<SharedSwitch> {
        self.switches.read().await.clone()
    }

    pub async fn find_switch_by_id(&self, id: i64) -> Option<SharedSwitch> {
        for switch in self.switches.read().await.iter() {
            if switch.lock().await.id == id {
                return Some(switch.clone());
            }
        }
        None
    }

    /// Create a switch, checking for the name or the GPIO already existing
    pub async fn create_switch(&self, gpio: &str, name: &str) -> Result<SharedSwitch> {
        for switch in self.switches.read().await.iter() {
            if switch.lock().await.name().eq_ignore_ascii_case(name) {
                return Err(ElsinoreError::NameTaken(name.to_string()));
            }
        }

        let pin = OutPin::new(gpio, name, self.gpio.clone(), self.claims.clone())?;
        let id = match self.db.insert_switch(name, gpio, false) {
            Ok(id) => id,
            Err(e) => {
                let mut pin = pin;
                pin.release();
                return Err(e);
            }
        };

        let switch = Arc::new(Mutex::new(Switch::new(id, pin, false)));
        self.switches.write().await.push(switch.clone());
        info!("Created switch '{}' on {}", name, gpio);
        Ok(switch)
    }

    /// Create or update a switch from a partial settings input
    pub async fn modify_switch(&self, input: &SwitchSettingsInput) -> Result<SharedSwitch> {
        let switch = match &input.id {
            None => {
                let gpio = input.gpio.as_deref().map(str::trim).unwrap_or("");
                let name = input.name.as_deref().map(str::trim).unwrap_or("");
                let mut missing = Vec::new();
                if gpio.is_empty() {
                    missing.push("GPIO is required when creating a new switch");
                }
                if name.is_empty() {
                    missing.push("Name is required when creating a new switch");
                }
                if !missing.is_empty() {
                    return Err(ElsinoreError::invalid_input(missing.join("\n")));
                }
                self.create_switch(gpio, name).await?
            }
            Some(id) => {
                let id: i64 = id.parse().map_err(|_| {
                    ElsinoreError::not_found(format!("no switch with id: {id} found"))
                })?;
                self.find_switch_by_id(id).await.ok_or_else(|| {
                    ElsinoreError::not_found(format!("no switch with id: {id} found"))
                })?
            }
        };

        {
            let mut guard = switch.lock().await;
            if let Some(name) = &input.name {
                guard.output.friendly_name = name.clone();
            }
            if let Some(gpio) = &input.gpio {
                if gpio.trim().is_empty() {
                    return Err(ElsinoreError::invalid_input(
                        "a switch requires a GPIO".to_string(),
                    ));
                }
                guard.output.reassign(gpio, Instant::now())?;
            }
            if let Some(inverted) = input.inverted {
                guard.inverted = inverted;
            }
            if let Some(state) = input.state {
                match state {
                    SwitchMode::On => guard.on(Instant::now())?,
                    SwitchMode::Off => guard.off(Instant::now())?,
                }
            }

            self.db.save_switch(&SwitchRecord {
                id: guard.id,
                name: guard.name().to_string(),
                gpio: guard.gpio().to_string(),
                inverted: guard.inverted,
            })?;
        }

        Ok(switch)
    }

    /// Delete a switch, driving its pin off and releasing the claim
    pub async fn delete_switch(&self, id: i64) -> Result<()> {
        let switch = self
            .find_switch_by_id(id)
            .await
            .ok_or_else(|| ElsinoreError::not_found(format!("no switch found with id '{id}'")))?;

        {
            let mut guard = switch.lock().await;
            if let Err(e) = guard.reset(Instant::now()) {
                warn!("Could not reset switch '{}' on delete: {}", guard.name(), e);
            }
            guard.output.release();
        }

        self.db.delete_switch(id)?;
        let mut switches = self.switches.write().await;
        switches.retain(|candidate| !Arc::ptr_eq(candidate, &switch));
        info!("Deleted switch {}", id);
        Ok(())
    }

    /// Turn every switch off. Part of safe shutdown; output control pins
    /// are handled by their controller loops.
    pub async fn shutdown_all_switches(&self) {
        let switches = self.switches().await;
        if switches.is_empty() {
            info!("No switches to shut down");
            return;
        }
        info!("Shutting down {} switches", switches.len());
        for switch in switches {
            let mut guard = switch.lock().await;
            if let Err(e) = guard.off(Instant::now()) {
                warn!("Failed to turn switch '{}' off: {}", guard.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::controller::ControllerMode;
    use crate::hw::gpio::MemoryGpio;

    fn registry() -> Registry {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        Registry::new(db, Arc::new(MemoryGpio::new()))
    }

    fn probe(addr: &str) -> ProbeRef {
        ProbeRef::new(addr, addr)
    }

    #[tokio::test]
    async fn a_probe_belongs_to_at_most_one_controller() {
        let registry = registry();

        registry
            .create_controller("sample", probe("ARealAddress"))
            .await
            .unwrap();

        // Attaching the same probe to another name is refused
        let err = registry
            .create_controller("sample_2", probe("ARealAddress"))
            .await
            .unwrap_err();
        assert!(matches!(err, ElsinoreError::ProbeOwned { .. }));

        // Re-attaching to the same controller is a no-op
        let again = registry
            .create_controller("sample", probe("ARealAddress"))
            .await
            .unwrap();
        assert_eq!(again.lock().await.probes.len(), 1);
    }

    #[tokio::test]
    async fn freed_probes_can_move_between_controllers() {
        let registry = registry();

        registry
            .create_controller("a", probe("28-000000000001"))
            .await
            .unwrap();
        registry.remove_probe("28-000000000001").await.unwrap();

        let b = registry
            .create_controller("b", probe("28-000000000001"))
            .await
            .unwrap();
        assert_eq!(b.lock().await.probes.len(), 1);
    }

    #[tokio::test]
    async fn detaching_restores_the_pre_attach_state() {
        let registry = registry();

        let controller = registry
            .create_controller("sample", probe("ARealAddress"))
            .await
            .unwrap();
        registry.remove_probe("ARealAddress").await.unwrap();

        assert!(controller.lock().await.probes.is_empty());
        assert!(registry
            .find_controller_for_probe("ARealAddress")
            .await
            .is_none());
        assert!(registry.remove_probe("ARealAddress").await.is_err());
    }

    #[tokio::test]
    async fn lookup_falls_back_to_the_store() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();

        {
            let registry = Registry::new(db.clone(), Arc::new(MemoryGpio::new()));
            let controller = registry
                .create_controller("sample", probe("ARealAddress"))
                .await
                .unwrap();
            let input = ControllerSettingsInput {
                id: controller.lock().await.id.to_string(),
                name: None,
                mode: Some(ControllerMode::Manual),
                cool_settings: None,
                heat_settings: None,
                hysteria_settings: None,
                manual_settings: None,
                set_point: Some("36C".into()),
            };
            registry.update_controller(&input).await.unwrap();
        }

        // A fresh registry over the same store hydrates on miss
        let registry = Registry::new(db, Arc::new(MemoryGpio::new()));
        let found = registry.find_controller_by_name("sample").await.unwrap();
        let guard = found.lock().await;
        assert_eq!(guard.mode, ControllerMode::Manual);
        assert_eq!(guard.set_point.unwrap().celsius(), 36.0);
        assert_eq!(guard.probes.len(), 1);
    }

    #[tokio::test]
    async fn delete_returns_the_freed_probes() {
        let registry = registry();
        let controller = registry
            .create_controller("sample", probe("ARealAddress"))
            .await
            .unwrap();
        let id = controller.lock().await.id;

        let freed = registry.delete_controller(id).await.unwrap();
        assert_eq!(freed, vec!["ARealAddress".to_string()]);
        assert!(registry.find_controller_by_name("sample").await.is_none());
    }

    #[tokio::test]
    async fn switch_names_and_pins_are_unique() {
        let registry = registry();
        registry.create_switch("GPIO18", "pump").await.unwrap();

        let err = registry.create_switch("GPIO19", "Pump").await.unwrap_err();
        assert!(matches!(err, ElsinoreError::NameTaken(_)));

        let err = registry.create_switch("GPIO18", "valve").await.unwrap_err();
        assert!(matches!(err, ElsinoreError::PinBusy(_)));
    }

    #[tokio::test]
    async fn pins_are_unique_across_controllers_and_switches() {
        let registry = registry();
        let controller = registry
            .create_controller("sample", probe("ARealAddress"))
            .await
            .unwrap();
        let input = ControllerSettingsInput {
            id: controller.lock().await.id.to_string(),
            name: None,
            mode: None,
            cool_settings: None,
            heat_settings: Some(crate::devices::controller::PidSettingsInput {
                gpio: Some("GPIO21".into()),
                ..Default::default()
            }),
            hysteria_settings: None,
            manual_settings: None,
            set_point: None,
        };
        registry.update_controller(&input).await.unwrap();

        let err = registry.create_switch("GPIO21", "pump").await.unwrap_err();
        assert!(matches!(err, ElsinoreError::PinBusy(_)));
    }

    #[tokio::test]
    async fn modify_switch_requires_name_and_gpio_on_create() {
        let registry = registry();
        let err = registry
            .modify_switch(&SwitchSettingsInput::default())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("GPIO is required"));
        assert!(message.contains("Name is required"));
    }

    #[tokio::test]
    async fn modify_switch_updates_and_toggles() {
        let registry = registry();
        let created = registry
            .modify_switch(&SwitchSettingsInput {
                id: None,
                name: Some("pump".into()),
                gpio: Some("GPIO18".into()),
                inverted: None,
                state: None,
            })
            .await
            .unwrap();
        let id = created.lock().await.id;

        let updated = registry
            .modify_switch(&SwitchSettingsInput {
                id: Some(id.to_string()),
                name: None,
                gpio: None,
                inverted: Some(true),
                state: Some(SwitchMode::On),
            })
            .await
            .unwrap();

        let mut guard = updated.lock().await;
        assert!(guard.inverted);
        assert_eq!(guard.state(), SwitchMode::On);
    }

    #[tokio::test]
    async fn deleting_a_switch_frees_its_pin() {
        let registry = registry();
        let switch = registry.create_switch("GPIO18", "pump").await.unwrap();
        let id = switch.lock().await.id;

        registry.delete_switch(id).await.unwrap();
        assert!(!registry.claims().in_use("GPIO18"));
        registry.create_switch("GPIO18", "valve").await.unwrap();
    }
}
