//! Device slot registry
//!
//! Each device kind gets one registry: a fixed table of numbered slots,
//! guarded by a single lock that covers slot allocation only. The slot
//! index is the caller-visible device id and stays stable for as long as
//! the device is open; closed ids are reused first-fit.
//!
//! Initialization runs outside the registry lock so a slow or blocking
//! backend negotiation cannot stall slot operations on unrelated devices.
//! While it runs, the slot is parked in a reserved state that lookups
//! treat as empty, so a half-open device is never observable; on failure
//! the slot is reclaimed before the error returns.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{AudioError, Result};

/// A device the registry can open: anything with a fallible one-shot
/// initialization step.
pub trait SlotDevice: Send {
    fn initialize(&mut self) -> Result<()>;
}

enum Slot<D> {
    Empty,
    /// Reserved while `initialize` runs outside the registry lock.
    Initializing,
    Open(Arc<Mutex<D>>),
}

pub struct Registry<D> {
    slots: Mutex<Vec<Slot<D>>>,
    kind: &'static str,
}

impl<D: SlotDevice> Registry<D> {
    /// Create a registry with `capacity` slots. `kind` labels log lines.
    pub fn new(capacity: usize, kind: &'static str) -> Self {
        let slots = (0..capacity).map(|_| Slot::Empty).collect();
        Self {
            slots: Mutex::new(slots),
            kind,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of open devices.
    pub fn open_count(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| matches!(slot, Slot::Open(_)))
            .count()
    }

    /// Claim the first free slot, initialize `device` outside the
    /// registry lock, and return the slot index as the device id.
    ///
    /// If initialization fails the slot is freed again and the
    /// initialization error is returned.
    pub fn open(&self, device: D) -> Result<usize> {
        let id = {
            let mut slots = self.slots.lock();
            let id = slots
                .iter()
                .position(|slot| matches!(slot, Slot::Empty))
                .ok_or(AudioError::NoSlotsAvailable)?;
            slots[id] = Slot::Initializing;
            id
        };

        let device = Arc::new(Mutex::new(device));
        let result = device.lock().initialize();

        let mut slots = self.slots.lock();
        match result {
            Ok(()) => {
                slots[id] = Slot::Open(device);
                tracing::info!(kind = self.kind, id, "device opened");
                Ok(id)
            }
            Err(e) => {
                slots[id] = Slot::Empty;
                tracing::warn!(kind = self.kind, id, error = %e, "device initialization failed");
                Err(e)
            }
        }
    }

    /// Look up an open device by id.
    pub fn lookup(&self, id: usize) -> Result<Arc<Mutex<D>>> {
        let slots = self.slots.lock();
        match slots.get(id) {
            Some(Slot::Open(device)) => Ok(Arc::clone(device)),
            _ => Err(AudioError::InvalidDeviceId),
        }
    }

    /// Close an open device, running its teardown, and free the slot.
    pub fn close(&self, id: usize) -> Result<()> {
        let mut slots = self.slots.lock();
        match slots.get_mut(id) {
            Some(slot) if matches!(slot, Slot::Open(_)) => {
                // Dropping the slot's Arc runs the device teardown unless
                // a caller still holds a lookup reference
                *slot = Slot::Empty;
                tracing::info!(kind = self.kind, id, "device closed");
                Ok(())
            }
            _ => Err(AudioError::InvalidDeviceId),
        }
    }
}
