use std::{any::Any, collections::BTreeMap};

use anyhow::Result;
use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::{
    address::MacAddress,
    network::DeviceId,
    outcome::{ForwardMode, OutcomeKind},
    packet::Packet,
};

use super::{Device, DeviceContext, DeviceKind};

/// A learning L2 switch.
///
/// The static port table says which device each physical address hangs off
/// and doubles as the set of ports to flood to. The learned table is filled
/// in from the source address of every frame the switch sees.
#[derive(Debug)]
pub struct Switch {
    name: String,
    ports: BTreeMap<MacAddress, DeviceId>,
    learned: FxHashMap<MacAddress, DeviceId>,
}

impl Switch {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Switch {
        Switch {
            name: name.into(),
            ports: BTreeMap::new(),
            learned: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, address: MacAddress, device: DeviceId) -> Switch {
        self.ports.insert(address, device);
        self
    }

    #[must_use]
    pub const fn ports(&self) -> &BTreeMap<MacAddress, DeviceId> {
        &self.ports
    }

    #[must_use]
    pub fn learned(&self, address: MacAddress) -> Option<DeviceId> {
        self.learned.get(&address).copied()
    }

    fn learn(&mut self, packet: &Packet, ingress: Option<DeviceId>, context: &mut DeviceContext) {
        let address = packet.source_mac;
        let Some(port) = ingress.or_else(|| self.ports.get(&address).copied()) else {
            return;
        };
        if self.learned.insert(address, port) != Some(port) {
            context.report(OutcomeKind::Learned { address, port });
        }
    }

    fn forward(&mut self, packet: Packet, ingress: Option<DeviceId>, context: &mut DeviceContext) {
        self.learn(&packet, ingress, context);
        if let Some(port) = self.learned(packet.destination_mac) {
            // Already on the destination's segment.
            if Some(port) == ingress {
                return;
            }
            if let Some(arrival) = context.transmit(port, packet.clone()) {
                context.report(OutcomeKind::Forwarded {
                    packet,
                    to: port,
                    mode: ForwardMode::Unicast,
                    arrival,
                });
            }
            return;
        }
        let ingress = ingress.or_else(|| self.ports.get(&packet.source_mac).copied());
        let flood_to = self
            .ports
            .values()
            .copied()
            .unique()
            .filter(|&port| Some(port) != ingress)
            .collect_vec();
        for port in flood_to {
            if let Some(arrival) = context.transmit(port, packet.clone()) {
                context.report(OutcomeKind::Forwarded {
                    packet: packet.clone(),
                    to: port,
                    mode: ForwardMode::Flood,
                    arrival,
                });
            }
        }
    }
}

impl Device for Switch {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Switch
    }

    fn send(&mut self, packet: Packet, context: &mut DeviceContext) -> Result<()> {
        self.forward(packet, None, context);
        Ok(())
    }

    fn receive(
        &mut self,
        packet: Packet,
        ingress: DeviceId,
        context: &mut DeviceContext,
    ) -> Result<()> {
        self.forward(packet, Some(ingress), context);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
