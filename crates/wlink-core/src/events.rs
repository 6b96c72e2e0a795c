//! Provider lifecycle events.

use std::sync::Arc;

use crate::listeners::{ListenerId, ListenerRegistry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(u64),
    Disconnect,
}

impl ProviderEvent {
    /// EIP-1193 event name.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::AccountsChanged(_) => "accountsChanged",
            ProviderEvent::ChainChanged(_) => "chainChanged",
            ProviderEvent::Disconnect => "disconnect",
        }
    }
}

pub type EventListener = dyn Fn(&ProviderEvent) + Send + Sync;

/// Fan-out of [`ProviderEvent`]s. Clones share listeners.
#[derive(Clone, Default, Debug)]
pub struct EventEmitter {
    listeners: Arc<ListenerRegistry<EventListener>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ProviderEvent) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn emit(&self, event: ProviderEvent) {
        tracing::debug!(event = event.name(), "emitting provider event");
        for listener in self.listeners.snapshot() {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_reaches_listeners_until_off() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = emitter.on(move |e| sink.lock().unwrap().push(e.clone()));
        emitter.emit(ProviderEvent::ChainChanged(8453));
        assert!(emitter.off(id));
        emitter.emit(ProviderEvent::Disconnect);

        assert_eq!(*seen.lock().unwrap(), vec![ProviderEvent::ChainChanged(8453)]);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ProviderEvent::AccountsChanged(vec![]).name(), "accountsChanged");
        assert_eq!(ProviderEvent::ChainChanged(1).name(), "chainChanged");
        assert_eq!(ProviderEvent::Disconnect.name(), "disconnect");
    }
}
