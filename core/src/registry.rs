// Copyright 2025 The micmgmt Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use crate::definitions::{parse_device_name, DeviceNumber};
use crate::errors::HandleError;
use crate::session::{DeviceProvider, SessionRef};

/// Opaque token naming one open device session.
///
/// A handle is a slot index plus the generation the slot had when the session was opened.
/// Closing a session bumps the slot generation, so every copy of an old handle stays
/// distinguishable from whatever later occupies the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle {
    slot: u32,
    generation: u32,
}

impl DeviceHandle {
    /// Packs the handle into a plain integer, e.g. for C callers.
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.slot)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            slot: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.to_raw())
    }
}

/// Registry events broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Opened { handle: DeviceHandle, device: DeviceNumber },
    Closed { handle: DeviceHandle, device: DeviceNumber },
}

enum SlotState {
    Free,
    /// Reserved by an `open` whose device I/O is still in flight.
    Opening(DeviceNumber),
    Open { device: DeviceNumber, session: SessionRef },
    /// Out of generations; never handed out again.
    Retired,
}

struct Slot {
    generation: u32,
    state: SlotState,
}

impl Slot {
    fn names_device(&self, device: DeviceNumber) -> bool {
        match self.state {
            SlotState::Free | SlotState::Retired => false,
            SlotState::Opening(d) | SlotState::Open { device: d, .. } => d == device,
        }
    }
}

/// Table of open device sessions.
///
/// At most one session per device number is open at any time. The internal lock only guards
/// the slot table; device I/O (`open_device`, `close`) always runs with the lock released.
pub struct HandleRegistry {
    provider: Arc<dyn DeviceProvider>,
    slots: Mutex<Vec<Slot>>,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl HandleRegistry {
    /// Create a registry with one slot per enumerated device.
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        let capacity = provider.device_count();
        Self::with_capacity(provider, capacity)
    }

    pub fn with_capacity(provider: Arc<dyn DeviceProvider>, capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(64);
        let slots = (0..capacity)
            .map(|_| Slot { generation: 0, state: SlotState::Free })
            .collect();
        Self {
            provider,
            slots: Mutex::new(slots),
            event_sender,
        }
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        // Every critical section leaves the table consistent, so a poisoned lock is still usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.slots().len()
    }

    pub fn device_count(&self) -> usize {
        self.provider.device_count()
    }

    pub fn device_name(&self, device: DeviceNumber) -> String {
        self.provider.device_number_to_name(device)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Open a session on `device` and return a handle to it.
    pub fn open(&self, device: DeviceNumber) -> Result<DeviceHandle, HandleError> {
        if !self.provider.is_device_available(device) {
            return Err(HandleError::NotFound(self.provider.device_number_to_name(device)));
        }

        let handle = self.reserve_slot(device)?;

        let session = match self.provider.open_device(device) {
            Ok(session) => SessionRef::from(session),
            Err(source) => {
                self.release_reservation(handle);
                return Err(HandleError::OpenFailed { device, source });
            }
        };

        {
            let mut slots = self.slots();
            let slot = &mut slots[handle.slot as usize];
            debug_assert!(matches!(slot.state, SlotState::Opening(d) if d == device));
            debug_assert_eq!(slot.generation, handle.generation);
            slot.state = SlotState::Open { device, session };
        }

        info!("Opened {} with handle {}", self.provider.device_number_to_name(device), handle);
        let _ = self.event_sender.send(RegistryEvent::Opened { handle, device });
        Ok(handle)
    }

    /// Open a device by its name, e.g. `mic0`.
    pub fn open_by_name(&self, name: &str) -> Result<DeviceHandle, HandleError> {
        let device = parse_device_name(self.provider.base_name(), name)
            .ok_or_else(|| HandleError::NotFound(name.to_string()))?;
        self.open(device)
    }

    fn reserve_slot(&self, device: DeviceNumber) -> Result<DeviceHandle, HandleError> {
        let mut slots = self.slots();
        if slots.iter().any(|slot| slot.names_device(device)) {
            return Err(HandleError::AlreadyOpen(device));
        }
        let capacity = slots.len();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| matches!(slot.state, SlotState::Free))
            .ok_or(HandleError::OutOfSlots(capacity))?;
        slot.state = SlotState::Opening(device);
        Ok(DeviceHandle {
            slot: index as u32,
            generation: slot.generation,
        })
    }

    fn release_reservation(&self, handle: DeviceHandle) {
        let mut slots = self.slots();
        let slot = &mut slots[handle.slot as usize];
        if slot.generation == handle.generation && matches!(slot.state, SlotState::Opening(_)) {
            slot.state = SlotState::Free;
        }
    }

    /// Close the session named by `handle`.
    ///
    /// The handle is retired before the device is released, so any later use of it,
    /// including a second close, fails with [`HandleError::InvalidHandle`].
    pub fn close(&self, handle: DeviceHandle) -> Result<(), HandleError> {
        let (device, session) = {
            let mut slots = self.slots();
            let slot = slots
                .get_mut(handle.slot as usize)
                .filter(|slot| slot.generation == handle.generation && !matches!(slot.state, SlotState::Retired))
                .ok_or(HandleError::InvalidHandle)?;
            if !matches!(slot.state, SlotState::Open { .. }) {
                return Err(HandleError::NotOpen);
            }
            let next = match slot.generation.checked_add(1) {
                Some(generation) => {
                    slot.generation = generation;
                    SlotState::Free
                }
                None => {
                    warn!("Handle slot {} ran out of generations and is retired", handle.slot);
                    SlotState::Retired
                }
            };
            match std::mem::replace(&mut slot.state, next) {
                SlotState::Open { device, session } => (device, session),
                _ => unreachable!("slot state checked above"),
            }
        };

        let name = session.device_name();
        if let Err(e) = session.close() {
            error!("Closing {} reported an error: {}", name, e);
        }
        info!("Closed {} (handle {})", name, handle);
        let _ = self.event_sender.send(RegistryEvent::Closed { handle, device });
        Ok(())
    }

    /// Resolve a handle to its open session.
    pub fn lookup(&self, handle: DeviceHandle) -> Result<SessionRef, HandleError> {
        let slots = self.slots();
        match slots.get(handle.slot as usize) {
            Some(Slot { generation, state: SlotState::Open { session, .. } })
                if *generation == handle.generation => Ok(session.clone()),
            _ => Err(HandleError::InvalidHandle),
        }
    }

    pub fn is_open(&self, device: DeviceNumber) -> bool {
        self.slots().iter().any(|slot| {
            matches!(slot.state, SlotState::Open { device: d, .. } if d == device)
        })
    }

    /// Handles of all currently open sessions, in slot order.
    pub fn open_handles(&self) -> Vec<(DeviceHandle, DeviceNumber)> {
        self.slots()
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot.state {
                SlotState::Open { device, .. } => Some((
                    DeviceHandle { slot: index as u32, generation: slot.generation },
                    device,
                )),
                _ => None,
            })
            .collect()
    }

    /// Close every open session. Returns the number of sessions closed.
    pub fn close_all(&self) -> usize {
        let handles = self.open_handles();
        let mut closed = 0;
        for (handle, _) in handles {
            if self.close(handle).is_ok() {
                closed += 1;
            }
        }
        if closed > 0 {
            debug!("Closed {} remaining session(s)", closed);
        }
        closed
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
