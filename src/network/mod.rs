use derive_more::{Display, From};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{device::Device, quantities::TimeSpan};

pub use self::link::{Link, LinkId};

pub mod link;

#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display(fmt = "device#{}", _0)]
pub struct DeviceId(usize);

impl DeviceId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("no device registered as {0}")]
    UnknownDevice(DeviceId),
    #[error("no device named {0:?}")]
    UnknownName(String),
    #[error("a device named {0:?} is already registered")]
    DuplicateName(String),
    #[error("{from} already has a link to {to}")]
    DuplicateLink { from: DeviceId, to: DeviceId },
    #[error("{0} cannot link to itself")]
    SelfLink(DeviceId),
    #[error("link delay {0} must be finite and not negative")]
    InvalidDelay(TimeSpan),
    #[error("slot {0} was reserved but never filled")]
    UnfilledSlot(DeviceId),
    #[error("slot {0} is already filled")]
    SlotFilled(DeviceId),
}

/// A device id handed out before its device exists, so that devices can
/// refer to each other regardless of registration order.
#[derive(Debug)]
pub struct DeviceSlot {
    id: DeviceId,
}

impl DeviceSlot {
    #[must_use]
    pub const fn id(&self) -> DeviceId {
        self.id
    }
}

/// The directed links of a topology, looked up by exact (from, to) pair.
#[derive(Debug, Default)]
pub struct Links {
    links: Vec<Link>,
    by_pair: FxHashMap<(DeviceId, DeviceId), LinkId>,
}

impl Links {
    #[must_use]
    pub fn get(&self, from: DeviceId, to: DeviceId) -> Option<&Link> {
        self.by_pair
            .get(&(from, to))
            .map(|id| &self.links[id.index()])
    }

    pub fn outgoing(&self, device: DeviceId) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(move |link| link.source() == device)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Registry of every device and link in a simulation.
#[derive(Debug, Default)]
pub struct Network {
    devices: Vec<Option<Box<dyn Device>>>,
    names: FxHashMap<String, DeviceId>,
    links: Links,
}

impl Network {
    #[must_use]
    pub fn new() -> Network {
        Network::default()
    }

    pub fn reserve(&mut self) -> DeviceSlot {
        let id = DeviceId(self.devices.len());
        self.devices.push(None);
        DeviceSlot { id }
    }

    /// Puts `device` into a reserved slot. On error the slot is left as it
    /// was, so it can be filled again.
    pub fn fill(
        &mut self,
        slot: &DeviceSlot,
        device: impl Device + 'static,
    ) -> Result<DeviceId, TopologyError> {
        let id = slot.id;
        let entry = self
            .devices
            .get_mut(id.0)
            .ok_or(TopologyError::UnknownDevice(id))?;
        if entry.is_some() {
            return Err(TopologyError::SlotFilled(id));
        }
        let name = device.name().to_owned();
        if self.names.contains_key(&name) {
            return Err(TopologyError::DuplicateName(name));
        }
        *entry = Some(Box::new(device));
        self.names.insert(name, id);
        Ok(id)
    }

    pub fn add_device(&mut self, device: impl Device + 'static) -> Result<DeviceId, TopologyError> {
        let slot = self.reserve();
        self.fill(&slot, device).map_err(|e| {
            self.devices.pop();
            e
        })
    }

    pub fn add_link(
        &mut self,
        from: DeviceId,
        to: DeviceId,
        delay: TimeSpan,
    ) -> Result<LinkId, TopologyError> {
        for device in [from, to] {
            if device.0 >= self.devices.len() {
                return Err(TopologyError::UnknownDevice(device));
            }
        }
        if from == to {
            return Err(TopologyError::SelfLink(from));
        }
        if !delay.is_valid_delay() {
            return Err(TopologyError::InvalidDelay(delay));
        }
        if self.links.by_pair.contains_key(&(from, to)) {
            return Err(TopologyError::DuplicateLink { from, to });
        }
        let id = LinkId::from(self.links.links.len());
        self.links.links.push(Link::new(id, from, to, delay));
        self.links.by_pair.insert((from, to), id);
        Ok(id)
    }

    /// Adds a link in each direction.
    pub fn connect(
        &mut self,
        a: DeviceId,
        b: DeviceId,
        delay: TimeSpan,
    ) -> Result<(LinkId, LinkId), TopologyError> {
        Ok((self.add_link(a, b, delay)?, self.add_link(b, a, delay)?))
    }

    #[must_use]
    pub fn link(&self, from: DeviceId, to: DeviceId) -> Option<&Link> {
        self.links.get(from, to)
    }

    pub fn links_from(&self, device: DeviceId) -> impl Iterator<Item = &Link> {
        self.links.outgoing(device)
    }

    #[must_use]
    pub const fn links(&self) -> &Links {
        &self.links
    }

    #[must_use]
    pub fn device(&self, id: DeviceId) -> Option<&dyn Device> {
        self.devices.get(id.0)?.as_deref()
    }

    #[must_use]
    pub fn device_id(&self, name: &str) -> Option<DeviceId> {
        self.names.get(name).copied()
    }

    pub fn lookup(&self, name: &str) -> Result<DeviceId, TopologyError> {
        self.device_id(name)
            .ok_or_else(|| TopologyError::UnknownName(name.to_owned()))
    }

    #[must_use]
    pub fn name(&self, id: DeviceId) -> Option<&str> {
        self.device(id).map(|device| device.name())
    }

    /// Names indexed by device id; unfilled slots get a placeholder.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        (0..self.devices.len())
            .map(|i| {
                self.name(DeviceId(i))
                    .map_or_else(|| DeviceId(i).to_string(), ToOwned::to_owned)
            })
            .collect_vec()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub(crate) fn check_filled(&self) -> Result<(), TopologyError> {
        match self.devices.iter().position(Option::is_none) {
            Some(i) => Err(TopologyError::UnfilledSlot(DeviceId(i))),
            None => Ok(()),
        }
    }

    /// Mutable access to one device alongside the (read-only) links.
    pub(crate) fn device_and_links(
        &mut self,
        id: DeviceId,
    ) -> Option<(&mut (dyn Device + 'static), &Links)> {
        let device = self.devices.get_mut(id.0)?.as_deref_mut()?;
        Some((device, &self.links))
    }
}
