//! Periodic tasks
//!
//! Three cooperating task families share one process-wide shutdown channel:
//!
//! | Task | Period | Work |
//! |---|---|---|
//! | Probe read | 5 s | Scan the 1-Wire bus, refresh the probe cache |
//! | Supervisor | 1 s | Start a loop for every controller not yet running |
//! | Controller loop | 5 s / 10 ms | Update the duty cycle / toggle the outputs |
//!
//! Each controller loop also owns a per-controller stop channel, raised by
//! the registry when the controller is deleted. On either signal the loop
//! drives its outputs to safe (both pins off) before exiting.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, info, warn};

use els_core::constants::timing::{
    CONTROLLER_UPDATE_INTERVAL, OUTPUT_TOGGLE_INTERVAL, PROBE_READ_INTERVAL, SUPERVISOR_INTERVAL,
};
use els_core::hw::onewire;
use els_core::hw::probe::ProbeCache;
use els_core::registry::SharedController;
use els_core::runtime::Runtime;

/// Scan the bus and refresh every probe until shutdown. Bus I/O is sysfs
/// file reading, so it runs on the blocking pool.
pub async fn probe_read_loop(runtime: Arc<Runtime>, mut shutdown: watch::Receiver<bool>) {
    info!("Reading temps");
    let mut ticker = interval(PROBE_READ_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let probes = runtime.probes.clone();
                let refreshed = tokio::task::spawn_blocking(move || onewire::refresh(&probes)).await;
                if let Err(e) = refreshed {
                    warn!("Probe refresh task failed: {}", e);
                }
            }
            _ = shutdown.changed() => {
                info!("Probe read loop stopping");
                break;
            }
        }
    }
}

/// Watch for controllers that are not running yet and start a loop for
/// each. Drains every controller loop before returning, so awaiting this
/// task completes the safe-shutdown ordering.
pub async fn controller_supervisor(runtime: Arc<Runtime>, mut shutdown: watch::Receiver<bool>) {
    info!("Monitoring for temperature controller changes");
    let mut ticker = interval(SUPERVISOR_INTERVAL);
    let mut loops = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for controller in runtime.registry.controllers().await {
                    let mut guard = controller.lock().await;
                    if guard.running {
                        continue;
                    }
                    guard.running = true;
                    let stop = guard.stop_channel();
                    info!("Starting {}", guard.name);
                    drop(guard);

                    loops.spawn(controller_loop(
                        controller.clone(),
                        runtime.probes.clone(),
                        stop,
                        shutdown.clone(),
                    ));
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("Waiting for controller loops to stop");
    while loops.join_next().await.is_some() {}
}

/// One controller's loop: a slow tick recomputes the duty cycle, a fast
/// tick drives the output pins. Exits on the controller's stop signal or
/// global shutdown, resetting the outputs on the way out.
async fn controller_loop(
    controller: SharedController,
    probes: Arc<ProbeCache>,
    mut stop: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut update = interval(CONTROLLER_UPDATE_INTERVAL);
    let mut toggle = interval(OUTPUT_TOGGLE_INTERVAL);

    loop {
        tokio::select! {
            _ = update.tick() => {
                let mut guard = controller.lock().await;
                guard.update_output(&probes, Instant::now());
                debug!(
                    name = %guard.name,
                    duty = guard.duty_cycle,
                    "controller updated"
                );
            }
            _ = toggle.tick() => {
                let mut guard = controller.lock().await;
                if let Some(control) = &mut guard.output_control {
                    control.tick(Instant::now());
                }
            }
            _ = stop.changed() => break,
            _ = shutdown.changed() => break,
        }
    }

    let mut guard = controller.lock().await;
    if let Some(control) = &mut guard.output_control {
        control.reset(Instant::now());
    }
    guard.running = false;
    info!("Controller loop for {} stopped", guard.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use els_core::data::store::Database;
    use els_core::devices::controller::{ControllerSettingsInput, PidSettingsInput, ProbeRef};
    use els_core::hw::gpio::MemoryGpio;
    use els_core::temperature::Temperature;
    use std::time::Duration;

    async fn runtime() -> Arc<Runtime> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        Runtime::new(db, Arc::new(MemoryGpio::new())).unwrap()
    }

    #[tokio::test]
    async fn supervisor_starts_and_drains_controller_loops() {
        let rt = runtime().await;
        rt.probes.ensure("ARealAddress", 12345);
        rt.probes
            .update("ARealAddress", Temperature::from_celsius(35.0));

        let controller = rt
            .registry
            .create_controller("sample", ProbeRef::new("ARealAddress", ""))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(controller_supervisor(rt.clone(), shutdown_rx));

        // The supervisor's first tick marks the controller running
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(controller.lock().await.running);
        // The loop's first update tick filled the rolling window
        assert_eq!(controller.lock().await.last_readings.len(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), supervisor)
            .await
            .expect("supervisor should drain on shutdown")
            .unwrap();
        assert!(!controller.lock().await.running);
    }

    #[tokio::test]
    async fn deleting_a_running_controller_stops_its_loop_and_outputs() {
        let rt = runtime().await;
        rt.probes.ensure("ARealAddress", 12345);
        rt.probes
            .update("ARealAddress", Temperature::from_celsius(35.0));

        let controller = rt
            .registry
            .create_controller("sample", ProbeRef::new("ARealAddress", ""))
            .await
            .unwrap();
        let id = controller.lock().await.id;
        rt.registry
            .update_controller(&ControllerSettingsInput {
                id: id.to_string(),
                name: None,
                mode: None,
                cool_settings: None,
                heat_settings: Some(PidSettingsInput {
                    gpio: Some("GPIO21".into()),
                    ..Default::default()
                }),
                hysteria_settings: None,
                manual_settings: None,
                set_point: None,
            })
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(controller_supervisor(rt.clone(), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(controller.lock().await.running);

        rt.registry.delete_controller(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!controller.lock().await.running);
        assert!(!rt.registry.claims().in_use("GPIO21"));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), supervisor)
            .await
            .expect("supervisor should stop")
            .unwrap();
    }
}
