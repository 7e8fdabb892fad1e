//! HTTP API server
//!
//! A thin dispatcher over the registry and the probe cache. One POST
//! endpoint takes the tagged request enum and answers with the response
//! envelope; errors from the core map straight onto the error envelope.
//! CORS is wide open, matching the daemon's LAN-appliance role.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use els_core::runtime::Runtime;
use els_error::{ElsinoreError, Result};
use els_protocol::{
    ApiRequest, ApiResponse, ControllerDto, DeletedControllerDto, ProbeDto, ResponseData,
    SettingsDto, SwitchDto, SwitchMode,
};

/// Bind the API server and run it until shutdown
pub async fn serve(
    runtime: Arc<Runtime>,
    port: &str,
    playground: bool,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut router = Router::new()
        .route("/api", post(dispatch))
        .route("/health", get(health));
    if playground {
        router = router.route("/", get(console));
    }
    let app = router
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(runtime);

    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("API listening on http://0.0.0.0:{}/api", port);
    if playground {
        info!("Console on http://0.0.0.0:{}/", port);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn dispatch(
    State(runtime): State<Arc<Runtime>>,
    Json(request): Json<ApiRequest>,
) -> Json<ApiResponse> {
    let name = request.type_name();
    debug!("API request: {}", name);

    Json(match handle(runtime, request).await {
        Ok(data) => ApiResponse::Ok(data),
        Err(e) => {
            warn!("{} failed: {}", name, e);
            ApiResponse::error(e.to_string())
        }
    })
}

async fn handle(runtime: Arc<Runtime>, request: ApiRequest) -> Result<ResponseData> {
    match request {
        // ====================================================================
        // Queries
        // ====================================================================
        ApiRequest::Probe { address } => {
            let reading = runtime.probes.get(&address).ok_or_else(|| {
                ElsinoreError::not_found(format!("no device found for address {address}"))
            })?;
            Ok(ResponseData::probe(ProbeDto::from_reading(&reading)))
        }

        ApiRequest::ProbeList { available } => {
            let only_available = available.unwrap_or(false);
            let mut probes = Vec::new();
            for reading in runtime.probes.all() {
                if only_available
                    && runtime
                        .registry
                        .find_controller_for_probe(&reading.phys_addr)
                        .await
                        .is_some()
                {
                    continue;
                }
                probes.push(ProbeDto::from_reading(&reading));
            }
            probes.sort_by(|a, b| a.phys_addr.cmp(&b.phys_addr));
            Ok(ResponseData::probes(probes))
        }

        ApiRequest::FetchProbes { addresses } => {
            let mut probes = Vec::new();
            let mut missing = Vec::new();
            for address in addresses {
                match runtime.probes.get(&address) {
                    Some(reading) => probes.push(ProbeDto::from_reading(&reading)),
                    None => missing.push(address),
                }
            }
            if !missing.is_empty() {
                return Err(ElsinoreError::not_found(format!(
                    "no device(s) found for address(es): {}",
                    missing.join(", ")
                )));
            }
            Ok(ResponseData::probes(probes))
        }

        ApiRequest::TemperatureControllers { name } => {
            let controllers = match name {
                Some(name) => {
                    let controller =
                        runtime
                            .registry
                            .find_controller_by_name(&name)
                            .await
                            .ok_or_else(|| {
                                ElsinoreError::not_found(format!(
                                    "no controller could be found for {name}"
                                ))
                            })?;
                    vec![controller]
                }
                None => runtime.registry.controllers().await,
            };

            let mut dtos = Vec::with_capacity(controllers.len());
            for controller in controllers {
                dtos.push(ControllerDto::from_controller(&*controller.lock().await));
            }
            Ok(ResponseData::controllers(dtos))
        }

        ApiRequest::Switches => {
            let mut dtos = Vec::new();
            for switch in runtime.registry.switches().await {
                dtos.push(SwitchDto::from_switch(&mut *switch.lock().await));
            }
            Ok(ResponseData::switches(dtos))
        }

        ApiRequest::Settings => {
            let settings = runtime.settings.read().await;
            Ok(ResponseData::settings(SettingsDto::from_settings(
                &settings,
            )))
        }

        // ====================================================================
        // Mutations
        // ====================================================================
        ApiRequest::AssignProbe { name, address } => {
            let reading = runtime.probes.get(&address).ok_or_else(|| {
                ElsinoreError::not_found(format!("could not find a probe for {address}"))
            })?;
            let mut probe =
                els_core::devices::controller::ProbeRef::new(&reading.phys_addr, &reading.phys_addr);
            probe.reading = reading.reading;
            probe.updated = reading.updated;

            let controller = runtime.registry.create_controller(&name, probe).await?;
            let guard = controller.lock().await;
            Ok(ResponseData::controller(ControllerDto::from_controller(
                &*guard,
            )))
        }

        ApiRequest::RemoveProbeFromTemperatureController { address } => {
            let controller = runtime.registry.remove_probe(&address).await?;
            let guard = controller.lock().await;
            Ok(ResponseData::controller(ControllerDto::from_controller(
                &*guard,
            )))
        }

        ApiRequest::UpdateTemperatureController { settings } => {
            let controller = runtime.registry.update_controller(&settings).await?;
            let guard = controller.lock().await;
            Ok(ResponseData::controller(ControllerDto::from_controller(
                &*guard,
            )))
        }

        ApiRequest::DeleteTemperatureController { id } => {
            let numeric: i64 = id.parse().map_err(|_| {
                ElsinoreError::not_found(format!("failed to find a controller to delete for: {id}"))
            })?;
            let freed = runtime.registry.delete_controller(numeric).await?;
            Ok(ResponseData::deleted(DeletedControllerDto {
                id,
                temperature_probes: freed,
            }))
        }

        ApiRequest::ModifySwitch { settings } => {
            let switch = runtime.registry.modify_switch(&settings).await?;
            let mut guard = switch.lock().await;
            Ok(ResponseData::switch(SwitchDto::from_switch(&mut *guard)))
        }

        ApiRequest::ToggleSwitch { id, mode } => {
            let numeric: i64 = id
                .parse()
                .map_err(|_| ElsinoreError::not_found(format!("no switch found with id '{id}'")))?;
            let switch = runtime
                .registry
                .find_switch_by_id(numeric)
                .await
                .ok_or_else(|| {
                    ElsinoreError::not_found(format!("no switch found with id '{id}'"))
                })?;

            let mut guard = switch.lock().await;
            match mode {
                SwitchMode::On => guard.on(Instant::now())?,
                SwitchMode::Off => guard.off(Instant::now())?,
            }
            Ok(ResponseData::switch(SwitchDto::from_switch(&mut guard)))
        }

        ApiRequest::DeleteSwitch { id } => {
            let numeric: i64 = id
                .parse()
                .map_err(|_| ElsinoreError::not_found(format!("no switch found with id '{id}'")))?;
            runtime.registry.delete_switch(numeric).await?;
            Ok(ResponseData::none())
        }

        ApiRequest::UpdateSettings { settings } => {
            let mut current = runtime.settings.write().await;
            current.apply(&settings, &runtime.db)?;
            Ok(ResponseData::settings(SettingsDto::from_settings(
                &current,
            )))
        }
    }
}

/// A tiny request console for poking the API from a browser
async fn console() -> Html<&'static str> {
    Html(CONSOLE_PAGE)
}

const CONSOLE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Elsinore console</title>
<style>
  body { font-family: monospace; margin: 2em; background: #1d2021; color: #ebdbb2; }
  textarea { width: 100%; height: 12em; background: #282828; color: #ebdbb2; }
  pre { background: #282828; padding: 1em; white-space: pre-wrap; }
  button { padding: 0.5em 2em; }
</style>
</head>
<body>
<h1>Elsinore console</h1>
<p>POST a request to <code>/api</code>. Examples:</p>
<pre>{"op": "probeList", "params": {}}
{"op": "temperatureControllers", "params": {}}
{"op": "assignProbe", "params": {"name": "kettle", "address": "28-0316a4d1fca2"}}
{"op": "updateTemperatureController", "params": {"settings": {"id": "1", "mode": "auto", "setPoint": "66C"}}}</pre>
<textarea id="request">{"op": "probeList", "params": {}}</textarea>
<br><button onclick="send()">Send</button>
<pre id="response"></pre>
<script>
async function send() {
  const body = document.getElementById('request').value;
  const res = await fetch('/api', {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body,
  });
  document.getElementById('response').textContent =
    JSON.stringify(await res.json(), null, 2);
}
</script>
</body>
</html>
"#;
