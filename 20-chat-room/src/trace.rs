//! Observability sink for hub activity.
//!
//! The hub emits short human-readable events ("client joined", "sent to
//! client", ...) in the order they happen. Where those events go is up to the
//! embedder: nowhere ([`Off`]), into the `tracing` pipeline ([`Logging`]), or
//! into memory ([`Recorder`]).

use std::sync::{Arc, Mutex};

pub trait Tracer: Send + Sync {
    fn trace(&self, event: &str);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Off;

impl Tracer for Off {
    fn trace(&self, _event: &str) {}
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging;

impl Tracer for Logging {
    fn trace(&self, event: &str) {
        tracing::info!(target: "chat_room::trace", "{event}");
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Tracer for Recorder {
    fn trace(&self, event: &str) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.to_string());
    }
}

pub fn off() -> Arc<dyn Tracer> {
    Arc::new(Off)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_keeps_emission_order() {
        let recorder = Recorder::new();
        let tracer: Arc<dyn Tracer> = Arc::new(recorder.clone());

        tracer.trace("first");
        tracer.trace("second");

        assert_eq!(recorder.events(), vec!["first", "second"]);
    }

    #[test]
    fn off_tolerates_any_event() {
        let tracer = off();
        tracer.trace("ignored");
    }
}
