//! Actuation dispatch.
//!
//! Commands are fire-and-forget: a transport failure is recorded and logged,
//! never retried within the cycle. The next evaluation may re-trigger, bounded
//! by the engine cooldown. The dispatcher also tracks whether the pump may
//! still be running so shutdown can send an explicit stop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{ActuationConfig, ActuationMode};
use crate::domain::{ActuationOutcome, PumpAction, PumpCommand};
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("actuator misconfigured: {0}")]
    Misconfigured(String),
}

impl From<reqwest::Error> for ActuationError {
    fn from(err: reqwest::Error) -> Self {
        ActuationError::Transport(err.to_string())
    }
}

/// The remote pump, seen as "set pump state for duration".
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn send(&self, command: &PumpCommand) -> Result<(), ActuationError>;

    /// Whether `send` actually reaches the device. When it doesn't, the
    /// device ends each run on its own timer.
    fn reaches_device(&self) -> bool {
        true
    }
}

/// POSTs each command as JSON to the device.
pub struct HttpActuator {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpActuator {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ActuationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("leafguard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ActuationError::Misconfigured(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn send(&self, command: &PumpCommand) -> Result<(), ActuationError> {
        let response = self.client.post(&self.endpoint).json(command).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ActuationError::Transport(format!(
                "actuator returned {status}"
            )))
        }
    }
}

/// Used when the device drives the relay from the `/process` response.
/// Nothing is sent; the command is already on its way back to the caller.
#[derive(Debug, Default)]
pub struct ReplyActuator;

#[async_trait]
impl Actuator for ReplyActuator {
    async fn send(&self, command: &PumpCommand) -> Result<(), ActuationError> {
        debug!(command_id = %command.id, action = ?command.action, "command carried in reply");
        Ok(())
    }

    fn reaches_device(&self) -> bool {
        false
    }
}

/// Build the actuator for the configured topology.
pub fn actuator_from_config(config: &ActuationConfig) -> Result<Arc<dyn Actuator>, ActuationError> {
    match config.mode {
        ActuationMode::Reply => Ok(Arc::new(ReplyActuator)),
        ActuationMode::Push => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                ActuationError::Misconfigured("push mode requires an endpoint".into())
            })?;
            Ok(Arc::new(HttpActuator::new(
                endpoint,
                Duration::from_millis(config.timeout_ms),
            )?))
        }
    }
}

#[derive(Debug, Default)]
struct DispatchState {
    /// When the last accepted run command should have finished.
    active_until: Option<DateTime<Utc>>,
}

pub struct ActuationDispatcher {
    actuator: Arc<dyn Actuator>,
    state: Mutex<DispatchState>,
}

impl ActuationDispatcher {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            actuator,
            state: Mutex::new(DispatchState::default()),
        }
    }

    pub async fn dispatch(&self, command: PumpCommand) -> ActuationOutcome {
        let outcome = match self.actuator.send(&command).await {
            Ok(()) => {
                info!(
                    event = "pump.dispatched",
                    command_id = %command.id,
                    action = ?command.action,
                    duration_seconds = command.duration_seconds,
                );
                ActuationOutcome::accepted()
            }
            Err(err) => {
                METRICS.inc_dispatch_failures();
                obs::emit_dispatch_failed(&command, &err);
                ActuationOutcome::rejected(err)
            }
        };

        if outcome.accepted {
            self.lock().active_until = match command.action {
                PumpAction::Run => Some(command.ends_at()),
                PumpAction::Stop => None,
            };
        }
        outcome
    }

    pub fn reaches_device(&self) -> bool {
        self.actuator.reaches_device()
    }

    /// Whether the pump may still be running at `now`.
    pub fn pump_active(&self, now: DateTime<Utc>) -> bool {
        self.lock().active_until.is_some_and(|until| until > now)
    }

    /// Send an explicit stop if the pump may still be active.
    pub async fn shutdown(&self, now: DateTime<Utc>) -> Option<ActuationOutcome> {
        if !self.pump_active(now) {
            return None;
        }
        info!(event = "pump.shutdown_stop", "pump may be active, sending stop");
        Some(self.dispatch(PumpCommand::stop(now)).await)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
