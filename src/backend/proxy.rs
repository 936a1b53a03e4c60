//! Recording proxy: feeds every dispatched step into an [`EventRegistry`].

use tracing::trace;

use super::{ReplayStep, StateBackend};
use crate::error::{Result, StochasticError};
use crate::registry::EventRegistry;

/// Wraps a backend and registers each step before forwarding it.
///
/// Arguments are registered as the addresses and hashes the backend sees, so
/// a recording made through the proxy is classified like a recording of the
/// real database.
#[derive(Debug)]
pub struct EventProxy<B> {
    inner: B,
    registry: EventRegistry,
}

impl<B: StateBackend> EventProxy<B> {
    pub fn new(inner: B) -> Self {
        Self::with_registry(inner, EventRegistry::new())
    }

    /// Continues recording into an existing registry.
    pub fn with_registry(inner: B, registry: EventRegistry) -> Self {
        Self { inner, registry }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_parts(self) -> (B, EventRegistry) {
        (self.inner, self.registry)
    }

    fn register(&mut self, step: &ReplayStep) -> Result<()> {
        let missing = |argument: &str| {
            StochasticError::MalformedModel(format!("{} step without {argument}", step.op))
        };
        match step.op.arity() {
            0 => {
                self.registry.register_op(step.op)?;
                if let Some(delta) = step.snapshot_delta {
                    self.registry.register_snapshot_delta(delta);
                }
            }
            1 => {
                let address = step.contract().ok_or_else(|| missing("address"))?;
                self.registry.register_address_op(step.op, &address)?;
            }
            2 => {
                let address = step.contract().ok_or_else(|| missing("address"))?;
                let key = step.storage_key().ok_or_else(|| missing("key"))?;
                self.registry.register_key_op(step.op, &address, &key)?;
            }
            _ => {
                let address = step.contract().ok_or_else(|| missing("address"))?;
                let key = step.storage_key().ok_or_else(|| missing("key"))?;
                let value = step.storage_value().ok_or_else(|| missing("value"))?;
                self.registry.register_value_op(step.op, &address, &key, &value)?;
            }
        }
        trace!(%step, "registered");
        Ok(())
    }
}

impl<B: StateBackend> StateBackend for EventProxy<B> {
    type Error = StochasticError;

    fn dispatch(&mut self, step: &ReplayStep) -> Result<()> {
        self.register(step)?;
        self.inner
            .dispatch(step)
            .map_err(|err| StochasticError::Backend(Box::new(err)))
    }

    fn prime(&mut self, num_contracts: u64) -> Result<()> {
        self.inner
            .prime(num_contracts)
            .map_err(|err| StochasticError::Backend(Box::new(err)))
    }

    fn name(&self) -> &'static str {
        "event-proxy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::operation::{ArgOp, Operation};

    fn opcode_id(opcode: &str) -> usize {
        opcode.parse::<ArgOp>().unwrap().encode()
    }

    #[test]
    fn test_steps_are_registered_and_forwarded() {
        let mut proxy = EventProxy::new(MemoryBackend::new(1));
        let steps = [
            ReplayStep::new(Operation::BeginTransaction),
            ReplayStep::new(Operation::CreateAccount).with_address(5),
            ReplayStep::new(Operation::SetState).with_address(5).with_key(1).with_value(9),
            ReplayStep::new(Operation::GetState).with_address(5).with_key(1),
            ReplayStep::new(Operation::EndTransaction),
        ];
        for step in &steps {
            proxy.dispatch(step).unwrap();
        }

        let registry = proxy.registry();
        assert_eq!(registry.num_events(), 5);
        assert_eq!(registry.frequency(opcode_id("CAn")), 1);
        assert_eq!(registry.frequency(opcode_id("SSpnn")), 1);
        assert_eq!(registry.frequency(opcode_id("GSpp")), 1);

        let (backend, _) = proxy.into_parts();
        assert_eq!(backend.stats().transactions, 1);
    }

    #[test]
    fn test_revert_delta_is_registered() {
        let mut proxy = EventProxy::new(MemoryBackend::new(2));
        for step in [
            ReplayStep::new(Operation::BeginTransaction),
            ReplayStep::new(Operation::Snapshot),
            ReplayStep::new(Operation::Snapshot),
            ReplayStep::new(Operation::RevertToSnapshot).with_snapshot_delta(1),
        ] {
            proxy.dispatch(&step).unwrap();
        }
        let ecdf = proxy.registry().snapshot_ecdf();
        assert_eq!(ecdf.last(), Some(&[1.0, 1.0]));
        assert!(ecdf.contains(&[0.0, 0.0]));
        assert!(ecdf.contains(&[1.0, 1.0]));
    }

    #[test]
    fn test_malformed_step_is_rejected_before_forwarding() {
        let mut proxy = EventProxy::new(MemoryBackend::new(3));
        assert!(proxy
            .dispatch(&ReplayStep::new(Operation::SetState).with_address(1))
            .is_err());
        assert_eq!(proxy.registry().num_events(), 0);
        assert_eq!(proxy.inner().stats().writes, 0);
    }

    #[test]
    fn test_backend_errors_are_wrapped() {
        let mut proxy = EventProxy::new(MemoryBackend::new(4));
        let err = proxy
            .dispatch(&ReplayStep::new(Operation::RevertToSnapshot).with_snapshot_delta(0))
            .unwrap_err();
        assert!(matches!(err, StochasticError::Backend(_)));
    }
}
