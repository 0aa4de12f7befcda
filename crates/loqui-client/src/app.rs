//! Client composition root.
//!
//! Builds the bus, the controller, and every integration from injected
//! ports, then runs until the shutdown future resolves. This is the only
//! place where concrete adapters meet; everything below it depends on
//! traits and events.

use std::sync::Arc;
use std::time::Duration;

use loqui_core::config::AppConfig;
use loqui_core::domain::session::SessionClock;
use loqui_core::paths::AppPaths;
use loqui_core::ports::{
    HardwareIdProvider, NetworkProbe, ScreenshotCapture, SpeechRecognizer,
};

use crate::audio_io::{InputCapture, OutputSink};
use crate::bus::{BusDriver, EventBus};
use crate::grpc::GrpcClientIntegration;
use crate::hardware::HardwareIdIntegration;
use crate::input::{attach_interrupt_bridge, InputIntegration, KeyTransition};
use crate::mode::ModeController;
use crate::network::NetworkMonitor;
use crate::permissions::{PermissionProbe, PermissionsMonitor};
use crate::playback::{AudioPlaybackHandle, PlaybackSettings};
use crate::recognition::RecognitionIntegration;
use crate::screenshot::ScreenshotIntegration;
use crate::speech_playback::PlaybackIntegration;

/// Every collaborator the client consumes, as trait objects.
pub struct ClientPorts {
    pub capture: Arc<dyn InputCapture>,
    pub playback: Arc<dyn OutputSink>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub screenshot: Arc<dyn ScreenshotCapture>,
    pub network_probe: Arc<dyn NetworkProbe>,
    pub hardware_id: Arc<dyn HardwareIdProvider>,
    pub permissions: Arc<dyn PermissionProbe>,
}

/// Build the default cpal-backed audio actors.
pub fn default_audio(
    config: &AppConfig,
    bus: Option<Arc<dyn loqui_core::ports::EventSink>>,
) -> Result<(Arc<dyn InputCapture>, Arc<dyn OutputSink>), crate::error::ClientError> {
    let device_cfg = &config.integrations.audio_device;

    let capture = crate::capture::AudioCaptureHandle::spawn(crate::capture::CaptureSettings {
        target_rate: config.audio.sample_rate,
        settle: Duration::from_millis(config.audio.device_switch.settle_ms),
        monitor_interval: Duration::from_secs_f64(device_cfg.monitoring_interval.max(0.1)),
        auto_switch: device_cfg.auto_switch_enabled,
    })?;

    let playback = AudioPlaybackHandle::spawn(
        PlaybackSettings {
            buffer_secs: config.audio.playback_buffer_sec,
            monitor_interval: Duration::from_secs_f64(device_cfg.monitoring_interval.max(0.1)),
            auto_switch: device_cfg.auto_switch_enabled,
        },
        bus,
    )?;

    Ok((Arc::new(capture), Arc::new(playback)))
}

/// Run the client until `shutdown` resolves.
///
/// The bus pair comes from the caller so that adapters built before this
/// call (the playback actor wants a sink for device-switch events) can
/// hold handles to it. `keys` feeds raw activation-key transitions from
/// whatever OS hook the embedder provides.
pub async fn run(
    config: AppConfig,
    paths: AppPaths,
    bus: EventBus,
    driver: BusDriver,
    ports: ClientPorts,
    keys: tokio::sync::mpsc::UnboundedReceiver<KeyTransition>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    // Controller and bridges.
    let controller = ModeController::new(bus.clone(), config.mode.clone(), Some(paths.state_file()));
    controller.attach();
    attach_interrupt_bridge(&bus);

    // Input classification.
    let input = InputIntegration::new(
        bus.clone(),
        Arc::new(SessionClock::new()),
        Duration::from_millis(config.keyboard.long_press_threshold_ms),
    );
    let input_task = tokio::spawn(input.run(keys));

    // Session integrations.
    RecognitionIntegration::new(
        bus.clone(),
        ports.capture,
        ports.recognizer,
        config.recognition.clone(),
    )
    .attach();

    ScreenshotIntegration::new(bus.clone(), ports.screenshot, paths.clone()).attach();

    GrpcClientIntegration::new(
        bus.clone(),
        config.integrations.grpc_client.clone(),
        config.network.clone(),
    )
    .attach();

    PlaybackIntegration::new(bus.clone(), ports.playback, config.audio.playback_sample_rate)
        .attach();

    HardwareIdIntegration::new(bus.clone(), ports.hardware_id, paths.hardware_id_file()).attach();

    // Environment monitors.
    let network_task = tokio::spawn(
        NetworkMonitor::new(
            bus.clone(),
            ports.network_probe,
            Duration::from_secs_f64(config.network.probe_interval_sec.max(0.5)),
        )
        .run(),
    );
    let permissions_task = tokio::spawn(
        PermissionsMonitor::new(
            bus.clone(),
            ports.permissions,
            config.integrations.permissions.clone(),
        )
        .run(),
    );

    tracing::info!("client running");
    let driver_task = tokio::spawn(driver.run());

    shutdown.await;
    tracing::info!("client shutting down");

    network_task.abort();
    permissions_task.abort();
    input_task.abort();
    bus.shutdown();
    let _ = driver_task.await;
}
