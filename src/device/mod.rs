use std::{any::Any, fmt::Debug};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    network::{DeviceId, Link, Links},
    outcome::{DropReason, Observer, Outcome, OutcomeKind},
    packet::Packet,
    quantities::Time,
    scheduler::EventQueue,
    simulation::Event,
};

pub use self::{host::Host, router::Router, switch::Switch};

pub mod host;
pub mod router;
pub mod switch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Host,
    Switch,
    Router,
    Other,
}

/// Everything a device may touch while handling one event.
pub struct DeviceContext<'a> {
    time: Time,
    device: DeviceId,
    links: &'a Links,
    queue: &'a mut EventQueue<Event>,
    observer: &'a mut dyn Observer,
}

impl<'a> DeviceContext<'a> {
    pub(crate) fn new(
        time: Time,
        device: DeviceId,
        links: &'a Links,
        queue: &'a mut EventQueue<Event>,
        observer: &'a mut dyn Observer,
    ) -> DeviceContext<'a> {
        DeviceContext {
            time,
            device,
            links,
            queue,
            observer,
        }
    }

    #[must_use]
    pub const fn time(&self) -> Time {
        self.time
    }

    /// The device currently handling the event.
    #[must_use]
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    #[must_use]
    pub fn link_to(&self, to: DeviceId) -> Option<&Link> {
        self.links.get(self.device, to)
    }

    pub fn report(&mut self, kind: OutcomeKind) {
        self.observer.observe(&Outcome {
            time: self.time,
            device: self.device,
            kind,
        });
    }

    /// Puts `packet` on the link towards `to` and returns its arrival time.
    /// A missing link is reported as a drop and yields `None`.
    pub fn transmit(&mut self, to: DeviceId, packet: Packet) -> Option<Time> {
        let links = self.links;
        match links.get(self.device, to) {
            Some(link) => Some(link.transmit(packet, self.time, self.queue)),
            None => {
                self.report(OutcomeKind::Dropped {
                    packet,
                    reason: DropReason::LinkNotFound { to: Some(to) },
                });
                None
            }
        }
    }

    /// Delivers to `to` at the current time without any link, still going
    /// through the event queue.
    pub fn deliver_directly(&mut self, to: DeviceId, packet: Packet) -> Time {
        self.queue.push(
            self.time,
            Event::Deliver {
                from: self.device,
                to,
                packet,
            },
        );
        self.time
    }
}

/// A participant in the simulated network.
pub trait Device: Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    /// Originates `packet` from this device.
    fn send(&mut self, packet: Packet, context: &mut DeviceContext) -> Result<()>;

    /// Handles `packet` arriving over the link from `ingress`.
    fn receive(
        &mut self,
        packet: Packet,
        ingress: DeviceId,
        context: &mut DeviceContext,
    ) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}
