use std::{any::Any, collections::BTreeMap, net::Ipv4Addr};

use anyhow::Result;

use crate::{
    network::DeviceId,
    outcome::{DropReason, ForwardMode, OutcomeKind},
    packet::Packet,
};

use super::{Device, DeviceContext, DeviceKind};

/// Forwards by exact destination address match.
#[derive(Debug)]
pub struct Router {
    name: String,
    routes: BTreeMap<Ipv4Addr, DeviceId>,
    direct_fallback: bool,
}

impl Router {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Router {
        Router {
            name: name.into(),
            routes: BTreeMap::new(),
            direct_fallback: false,
        }
    }

    #[must_use]
    pub fn with_route(mut self, destination: Ipv4Addr, next_hop: DeviceId) -> Router {
        self.routes.insert(destination, next_hop);
        self
    }

    /// With the fallback on, a next hop without a link is handed the packet
    /// at zero delay instead of dropping it.
    #[must_use]
    pub fn with_direct_fallback(self, direct_fallback: bool) -> Router {
        Router {
            direct_fallback,
            ..self
        }
    }

    #[must_use]
    pub fn route(&self, destination: Ipv4Addr) -> Option<DeviceId> {
        self.routes.get(&destination).copied()
    }

    #[must_use]
    pub const fn routes(&self) -> &BTreeMap<Ipv4Addr, DeviceId> {
        &self.routes
    }

    fn forward(&self, packet: Packet, context: &mut DeviceContext) {
        let destination = packet.destination_ip;
        let Some(next_hop) = self.route(destination) else {
            context.report(OutcomeKind::Dropped {
                packet,
                reason: DropReason::NoRoute { destination },
            });
            return;
        };
        if context.link_to(next_hop).is_none() && self.direct_fallback {
            let arrival = context.deliver_directly(next_hop, packet.clone());
            context.report(OutcomeKind::Forwarded {
                packet,
                to: next_hop,
                mode: ForwardMode::Direct,
                arrival,
            });
            return;
        }
        if let Some(arrival) = context.transmit(next_hop, packet.clone()) {
            context.report(OutcomeKind::Forwarded {
                packet,
                to: next_hop,
                mode: ForwardMode::Routed,
                arrival,
            });
        }
    }
}

impl Device for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Router
    }

    fn send(&mut self, packet: Packet, context: &mut DeviceContext) -> Result<()> {
        self.forward(packet, context);
        Ok(())
    }

    fn receive(
        &mut self,
        packet: Packet,
        _ingress: DeviceId,
        context: &mut DeviceContext,
    ) -> Result<()> {
        self.forward(packet, context);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
