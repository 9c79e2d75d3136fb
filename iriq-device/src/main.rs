//! `iriqd`: IriQ field device daemon
//!
//! Loads the device configuration, wires the sync engine to the board's
//! GPIO, ADC and network, and runs the control loop until the process is
//! killed. Only start-up can fail; once the loop runs every error is logged
//! and retried on the next scheduled tick.
//!
//! Environment:
//! - `IRIQ_CONFIG`: config file (default `/etc/iriq/device.json`)
//! - `IRIQ_API_KEY`: overrides `backend.api_key`
//! - `RUST_LOG`: log filter (default `info`)

mod adc;
mod gpio;
mod settings;

use std::sync::Arc;

use anyhow::Context;

use iriq_connectors::{FileCredentialStore, HttpConfig, UreqTransport};
use iriq_core::auth::{EdgeFunctionAuthenticator, StaticKeyAuthenticator};
use iriq_core::config::AuthStrategy;
use iriq_core::time::SystemTime;
use iriq_core::{
    Actuator, Authenticator, BackendClient, ControlLoop, DeviceConfig, RelayPolarity,
    SessionManager,
};

use crate::adc::IioProbe;
use crate::gpio::{SysfsPin, ThreadDelay};

const CREDENTIAL_NAMESPACE: &str = "credential";

fn authenticator(config: &DeviceConfig, transport: &Arc<UreqTransport>) -> Box<dyn Authenticator> {
    let transport = Arc::clone(transport);
    match config.auth.strategy {
        AuthStrategy::EdgeFunction => Box::new(
            EdgeFunctionAuthenticator::new(transport, &config.device_id, &config.backend.api_key)
                .device_type(&config.auth.device_type)
                .audit_log(config.auth.audit_log),
        ),
        AuthStrategy::StaticKey => {
            log::warn!("using the API key as bearer credential (degraded authentication)");
            Box::new(
                StaticKeyAuthenticator::new(transport, &config.device_id, &config.backend.api_key)
                    .audit_log(config.auth.audit_log),
            )
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = settings::config_path();
    let config = settings::load_from_env(&path)?;
    log::info!(
        "iriqd {} starting as {} (config {})",
        iriq_core::VERSION,
        config.device_id,
        path
    );

    let transport = Arc::new(
        UreqTransport::new(
            HttpConfig::new(&config.backend.base_url).timeout_secs(config.backend.timeout_secs),
        )
        .context("configuring HTTP transport")?,
    );
    let store = FileCredentialStore::new(&config.auth.state_dir, CREDENTIAL_NAMESPACE)
        .with_context(|| format!("preparing state directory {}", config.auth.state_dir))?;

    let session = SessionManager::new(
        Box::new(store),
        authenticator(&config, &transport),
        Box::new(SystemTime),
        config.auth.lease_ms,
    );
    let mut client = BackendClient::new(
        Arc::clone(&transport),
        session,
        &config.device_id,
        &config.backend.api_key,
        Box::new(SystemTime),
    )
    .upsert_order(config.backend.upsert_order)
    .owner_id(config.backend.owner_id.clone());

    // an unreachable backend at boot is not fatal
    if let Err(e) = client.session_mut().get_valid_credential() {
        log::warn!("initial authentication failed, continuing offline: {}", e);
    }

    let hardware = &config.hardware;
    let relay_idle_high = hardware.relay_polarity == RelayPolarity::ActiveLow;
    let relay =
        SysfsPin::output(hardware.relay_pin, relay_idle_high).context("exporting relay pin")?;
    let led = SysfsPin::output(hardware.led_pin, false).context("exporting LED pin")?;
    let actuator = Actuator::new(relay, led, ThreadDelay, hardware.actuator());
    let probe = IioProbe::new(hardware.adc_device, hardware.adc_channel);
    log::info!(
        "relay on gpio {} ({:?}), led on gpio {}, probe at {}",
        hardware.relay_pin,
        hardware.relay_polarity,
        hardware.led_pin,
        probe.path().display()
    );

    let mut control = ControlLoop::new(
        client,
        actuator,
        probe,
        hardware.sampler(),
        config.automatic_policy(),
        Box::new(SystemTime),
        &config.schedule,
        config.automatic.enabled_at_boot,
    );
    control.run()
}
