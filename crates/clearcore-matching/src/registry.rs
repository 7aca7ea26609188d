//! Instrument registry.
//!
//! Instruments are configured externally; the engine only consults the
//! registry to validate that a command's instrument is known and
//! tradable.

use std::collections::HashMap;

use clearcore_types::{ClearcoreError, Instrument, InstrumentId, Result};
use parking_lot::RwLock;

/// Shared, read-mostly registry of configured instruments.
#[derive(Debug, Default)]
pub struct InstrumentRegistry {
    instruments: RwLock<HashMap<InstrumentId, Instrument>>,
}

impl InstrumentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an instrument.
    pub fn register(&self, instrument: Instrument) {
        self.instruments.write().insert(instrument.id, instrument);
    }

    /// Look up an instrument by id.
    #[must_use]
    pub fn get(&self, id: InstrumentId) -> Option<Instrument> {
        self.instruments.read().get(&id).cloned()
    }

    /// Flip an instrument's tradable flag.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::UnknownInstrument`] if not registered.
    pub fn set_tradable(&self, id: InstrumentId, tradable: bool) -> Result<()> {
        let mut instruments = self.instruments.write();
        let instrument = instruments
            .get_mut(&id)
            .ok_or(ClearcoreError::UnknownInstrument(id))?;
        instrument.tradable = tradable;
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, id: InstrumentId) -> bool {
        self.instruments.read().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }
}
