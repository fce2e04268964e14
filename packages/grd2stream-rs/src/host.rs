//! Seams to the application hosting the pipeline.
//!
//! A GIS host supplies a layer store, a message bar, a map-click tool and a
//! yes/no dialog. The pipeline only talks to them through these traits; the
//! in-crate implementations cover headless use and tests.

use crate::error::{FlowlineError, Result};
use crate::types::{ParsedDataset, Schema, SeedPoint, StreamlineRecord};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

// =============================================================================
// STATUS MESSAGES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub title: String,
    pub text: String,
    pub severity: Severity,
    /// How long the host should keep the message visible, None for sticky
    pub timeout: Option<Duration>,
}

impl StatusMessage {
    pub fn new(severity: Severity, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            severity,
            timeout: None,
        }
    }

    pub fn info(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Info, title, text).with_timeout(Duration::from_secs(5))
    }

    pub fn success(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Success, title, text).with_timeout(Duration::from_secs(5))
    }

    pub fn warning(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, text).with_timeout(Duration::from_secs(10))
    }

    pub fn critical(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Critical, title, text)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Critical message for a failed run; tool stderr is kept verbatim
    pub fn from_error(error: &FlowlineError) -> Self {
        let text = match error {
            FlowlineError::ExternalToolFailed { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.clone()
            }
            other => other.to_string(),
        };
        Self::critical(error.title(), text)
    }
}

pub trait StatusReporter: Send + Sync {
    fn push(&self, message: StatusMessage);
}

/// Forwards status messages to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn push(&self, message: StatusMessage) {
        match message.severity {
            Severity::Info | Severity::Success => {
                log::info!("{}: {}", message.title, message.text)
            }
            Severity::Warning => log::warn!("{}: {}", message.title, message.text),
            Severity::Critical => log::error!("{}: {}", message.title, message.text),
        }
    }
}

/// Keeps every message, for hosts that render them later
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: Mutex<Vec<StatusMessage>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn has(&self, severity: Severity) -> bool {
        self.messages().iter().any(|m| m.severity == severity)
    }
}

impl StatusReporter for MemoryReporter {
    fn push(&self, message: StatusMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

// =============================================================================
// FEATURE SINK
// =============================================================================

/// Receives parsed streamlines; every load creates a new layer
pub trait FeatureSink: Send + Sync {
    /// Returns an identifier of the created layer
    fn load(&self, layer_name: &str, dataset: &ParsedDataset) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub schema: Schema,
    pub records: Vec<StreamlineRecord>,
}

impl Layer {
    pub fn feature_count(&self) -> usize {
        self.records.len()
    }
}

/// In-memory stand-in for a GIS project
#[derive(Debug, Default)]
pub struct MemoryLayerStore {
    layers: Mutex<Vec<Layer>>,
}

impl MemoryLayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> Vec<Layer> {
        self.layers.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.layers.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Layer> {
        self.layers
            .lock()
            .ok()
            .and_then(|l| l.iter().find(|layer| layer.id == id).cloned())
    }
}

impl FeatureSink for MemoryLayerStore {
    fn load(&self, layer_name: &str, dataset: &ParsedDataset) -> Result<String> {
        if dataset.is_empty() {
            return Err(FlowlineError::OutputMalformed(format!(
                "'{}' has no features",
                layer_name
            )));
        }

        let layer = Layer {
            id: dataset.id.clone(),
            name: layer_name.to_string(),
            schema: dataset.schema.clone(),
            records: dataset.records.clone(),
        };
        let id = layer.id.clone();
        self.layers
            .lock()
            .map_err(|_| FlowlineError::OutputMalformed("Layer store is poisoned".to_string()))?
            .push(layer);
        Ok(id)
    }
}

// =============================================================================
// COORDINATE PICKING
// =============================================================================

pub type PickHandler = Box<dyn FnMut(SeedPoint) + Send>;

/// Map-click style seed selection
pub trait CoordinatePicker: Send + Sync {
    fn activate(&self);

    /// Register `handler` for the next pick(s); dropping the subscription unregisters it
    fn on_pick(&self, handler: PickHandler) -> PickSubscription;

    fn deactivate(&self);
}

/// Keeps a pick handler registered until dropped or cancelled
#[must_use]
pub struct PickSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl PickSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to undo
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for PickSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Activate the picker and wait for one coordinate
///
/// Fails with `InvalidParameters` when the picker drops the handler without
/// ever reporting a point (the user cancelled).
pub async fn pick_seed(picker: &dyn CoordinatePicker) -> Result<SeedPoint> {
    let (tx, rx) = oneshot::channel();
    let mut tx = Some(tx);

    picker.activate();
    let subscription = picker.on_pick(Box::new(move |point| {
        if let Some(tx) = tx.take() {
            let _ = tx.send(point);
        }
    }));

    let picked = rx.await;
    subscription.cancel();
    picker.deactivate();

    let seed = picked.map_err(|_| {
        FlowlineError::InvalidParameters("A seed coordinate must be selected".to_string())
    })?;
    log::info!("Seed coordinate selected: ({}, {})", seed.x, seed.y);
    Ok(seed)
}

/// Picker that reports a coordinate known up front, or cancels when there is none
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPicker {
    seed: Option<SeedPoint>,
}

impl FixedPicker {
    pub fn new(seed: Option<SeedPoint>) -> Self {
        Self { seed }
    }
}

impl CoordinatePicker for FixedPicker {
    fn activate(&self) {}

    fn on_pick(&self, mut handler: PickHandler) -> PickSubscription {
        if let Some(seed) = self.seed {
            handler(seed);
        }
        PickSubscription::noop()
    }

    fn deactivate(&self) {}
}

// =============================================================================
// RETRY PROMPT
// =============================================================================

/// "Verification failed, retry the installation?"
pub trait RetryPrompt: Send + Sync {
    fn confirm_retry(&self, attempt: u32, error: &FlowlineError) -> bool;
}

impl<F> RetryPrompt for F
where
    F: Fn(u32, &FlowlineError) -> bool + Send + Sync,
{
    fn confirm_retry(&self, attempt: u32, error: &FlowlineError) -> bool {
        self(attempt, error)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRetry;

impl RetryPrompt for NeverRetry {
    fn confirm_retry(&self, _attempt: u32, _error: &FlowlineError) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRetry;

impl RetryPrompt for AlwaysRetry {
    fn confirm_retry(&self, attempt: u32, error: &FlowlineError) -> bool {
        log::warn!("Retrying installation (attempt {}): {}", attempt, error);
        true
    }
}
