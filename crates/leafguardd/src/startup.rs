//! Resource acquisition and the daemon's run loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use leafguard_core::vision::open_source;
use leafguard_core::{
    actuator_from_config, ActivityLog, ActuationDispatcher, Actuator, ClassifierAdapter,
    FramePipeline, FrameSource, HttpClassifier, ImageClassifier, IrrigationController,
    IrrigationEngine, LeafguardConfig, SensorStore,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::server::{router, AppState};

/// Everything the daemon needs, acquired before any request is served.
pub struct Runtime {
    pub pipeline: FramePipeline,
    pub source: Box<dyn FrameSource>,
    pub controller: Arc<IrrigationController>,
    pub fps: u32,
}

/// Open the camera, connect both models and the actuator. Any failure here
/// aborts startup.
pub async fn acquire(config: &LeafguardConfig) -> Result<Runtime> {
    let source = open_source(&config.capture)
        .await
        .context("failed to open camera source")?;

    let timeout = Duration::from_millis(config.classifier.timeout_ms);
    let presence = HttpClassifier::new("presence", &config.classifier.presence_url, timeout)
        .context("failed to configure presence model client")?;
    let severity = HttpClassifier::new("severity", &config.classifier.severity_url, timeout)
        .context("failed to configure severity model client")?;

    let actuator =
        actuator_from_config(&config.actuation).context("failed to configure actuator")?;

    build(config, source, Arc::new(presence), Arc::new(severity), actuator).await
}

/// Wire the components together around already-acquired resources.
pub async fn build(
    config: &LeafguardConfig,
    source: Box<dyn FrameSource>,
    presence: Arc<dyn ImageClassifier>,
    severity: Arc<dyn ImageClassifier>,
    actuator: Arc<dyn Actuator>,
) -> Result<Runtime> {
    let adapter = ClassifierAdapter::connect(presence, severity, &config.vision)
        .await
        .context("classifier models unavailable")?;

    let activity = Arc::new(ActivityLog::from_config(&config.activity));
    let pipeline = FramePipeline::from_config(config, adapter, activity.clone());
    let controller = IrrigationController::new(
        IrrigationEngine::new(config.irrigation.clone()),
        Arc::new(SensorStore::from_config(&config.sensors)),
        pipeline.subscribe_verdict(),
        ActuationDispatcher::new(actuator),
        activity.clone(),
    );
    activity.info(format!("LeafGuard {} started", leafguard_core::VERSION));

    Ok(Runtime {
        pipeline,
        source,
        controller: Arc::new(controller),
        fps: config.capture.fps,
    })
}

/// Serve until `shutdown` resolves, then stop the frame loop and the pump.
pub async fn run<F>(runtime: Runtime, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let Runtime {
        pipeline,
        source,
        controller,
        fps,
    } = runtime;

    let (stop_tx, stop_rx) = watch::channel(false);
    let state = AppState::new(controller.clone(), pipeline.preview_feed(), stop_rx.clone());
    let frames = tokio::spawn(pipeline.run(source, fps, stop_rx));

    let addr = listener.local_addr().context("listener has no local address")?;
    info!(addr = %addr, "http server listening");

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutdown requested");
            stop_tx.send_replace(true);
        })
        .await
        .context("http server error");

    // The stop sender is dropped with the graceful future, so the frame
    // loop exits even if the server failed.
    if let Err(err) = frames.await {
        warn!(error = %err, "frame loop task failed");
    }

    let outcome = controller.shutdown(Utc::now()).await;
    if let Some(outcome) = outcome {
        info!(accepted = outcome.accepted, "pump stop sent");
    }
    served
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            _ => {
                warn!("failed to register signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}
