use std::any::Any;

use anyhow::Result;

use crate::{
    layer::LayerStack,
    network::DeviceId,
    outcome::{DropReason, OutcomeKind},
    packet::Packet,
};

use super::{Device, DeviceContext, DeviceKind};

/// An endpoint with a protocol stack and a single next hop.
#[derive(Debug)]
pub struct Host {
    name: String,
    stack: LayerStack,
    next_hop: Option<DeviceId>,
    delivered: Vec<Packet>,
}

impl Host {
    #[must_use]
    pub fn new(name: impl Into<String>, stack: LayerStack) -> Host {
        Host {
            name: name.into(),
            stack,
            next_hop: None,
            delivered: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_next_hop(self, next_hop: DeviceId) -> Host {
        Host {
            next_hop: Some(next_hop),
            ..self
        }
    }

    #[must_use]
    pub const fn stack(&self) -> &LayerStack {
        &self.stack
    }

    #[must_use]
    pub const fn next_hop(&self) -> Option<DeviceId> {
        self.next_hop
    }

    /// Packets that made it through every layer, oldest first.
    #[must_use]
    pub fn delivered(&self) -> &[Packet] {
        &self.delivered
    }
}

impl Device for Host {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Host
    }

    fn send(&mut self, packet: Packet, context: &mut DeviceContext) -> Result<()> {
        let packet = self.stack.encapsulate(packet);
        let Some(next_hop) = self.next_hop else {
            context.report(OutcomeKind::Dropped {
                packet,
                reason: DropReason::LinkNotFound { to: None },
            });
            return Ok(());
        };
        if let Some(arrival) = context.transmit(next_hop, packet.clone()) {
            context.report(OutcomeKind::Sent {
                packet,
                to: next_hop,
                arrival,
            });
        }
        Ok(())
    }

    fn receive(
        &mut self,
        packet: Packet,
        _ingress: DeviceId,
        context: &mut DeviceContext,
    ) -> Result<()> {
        match self.stack.decapsulate(packet.clone()) {
            Ok(packet) => {
                self.delivered.push(packet.clone());
                context.report(OutcomeKind::Delivered { packet });
            }
            Err(mismatch) => context.report(OutcomeKind::Dropped {
                packet,
                reason: DropReason::AddressMismatch(mismatch),
            }),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use pretty_assertions::assert_eq;

    use crate::{
        address::MacAddress,
        device::{Device, DeviceContext},
        layer::{Layer, LayerStack},
        network::Network,
        outcome::{DropReason, OutcomeKind, TraceRecorder},
        packet::Packet,
        quantities::Time,
        scheduler::EventQueue,
    };

    use super::Host;

    fn mac(last: u8) -> MacAddress {
        MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, last)
    }

    fn host(last: u8) -> Host {
        Host::new(
            format!("host{last}"),
            LayerStack::new(vec![Layer::DataLink(mac(last)), Layer::Network(ip(last))]),
        )
    }

    fn stamped(payload: &str) -> Packet {
        Packet::new(payload, ip(2), mac(2))
            .with_source_mac(mac(1))
            .with_source_ip(ip(1))
    }

    #[test]
    fn next_hop_without_a_link_is_dropped() {
        let mut network = Network::new();
        let id = network.reserve().id();
        let peer = network.reserve().id();
        let mut host = host(1).with_next_hop(peer);
        let mut queue = EventQueue::new();
        let mut recorder = TraceRecorder::new();
        let mut context =
            DeviceContext::new(Time::SIM_START, id, network.links(), &mut queue, &mut recorder);
        host.send(Packet::new("hi", ip(2), mac(2)), &mut context).unwrap();

        assert_eq!(
            recorder
                .outcomes()
                .iter()
                .map(|outcome| outcome.kind.clone())
                .collect::<Vec<_>>(),
            vec![OutcomeKind::Dropped {
                packet: stamped("hi"),
                reason: DropReason::LinkNotFound { to: Some(peer) },
            }]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn missing_next_hop_is_dropped() {
        let mut network = Network::new();
        let id = network.reserve().id();
        let mut host = host(1);
        let mut queue = EventQueue::new();
        let mut recorder = TraceRecorder::new();
        let mut context =
            DeviceContext::new(Time::SIM_START, id, network.links(), &mut queue, &mut recorder);
        host.send(Packet::new("hi", ip(2), mac(2)), &mut context).unwrap();

        assert_eq!(recorder.outcomes().len(), 1);
        assert_eq!(
            recorder.outcomes()[0].kind,
            OutcomeKind::Dropped {
                packet: stamped("hi"),
                reason: DropReason::LinkNotFound { to: None },
            }
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn receive_delivers_or_rejects() {
        let mut network = Network::new();
        let sender = network.reserve().id();
        let id = network.reserve().id();
        let mut host = host(2);
        let mut queue = EventQueue::new();
        let mut recorder = TraceRecorder::new();
        let mut context =
            DeviceContext::new(Time::SIM_START, id, network.links(), &mut queue, &mut recorder);
        host.receive(stamped("for me"), sender, &mut context).unwrap();
        let stray = Packet::new("stray", ip(2), mac(3)).with_source_mac(mac(1));
        host.receive(stray, sender, &mut context).unwrap();

        assert_eq!(host.delivered().to_vec(), vec![stamped("for me")]);
        assert!(matches!(
            recorder.outcomes()[1].kind,
            OutcomeKind::Dropped {
                reason: DropReason::AddressMismatch(_),
                ..
            }
        ));
    }
}
