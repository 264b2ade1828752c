use std::{fmt::Display, net::Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, MacAddress},
    packet::Packet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    DataLink,
    Network,
}

impl Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::DataLink => write!(f, "data-link"),
            LayerKind::Network => write!(f, "network"),
        }
    }
}

/// A layer refused an inbound packet addressed to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMismatch {
    pub layer: LayerKind,
    pub expected: Address,
    pub actual: Address,
}

/// One protocol stage. Each variant owns exactly one address pair of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "address", rename_all = "snake_case")]
pub enum Layer {
    DataLink(MacAddress),
    Network(Ipv4Addr),
}

impl Layer {
    #[must_use]
    pub const fn kind(&self) -> LayerKind {
        match self {
            Layer::DataLink(_) => LayerKind::DataLink,
            Layer::Network(_) => LayerKind::Network,
        }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        match *self {
            Layer::DataLink(mac) => Address::Physical(mac),
            Layer::Network(ip) => Address::Logical(ip),
        }
    }

    /// Writes this layer's own address into the source field it owns.
    #[must_use]
    pub fn stamp(&self, packet: Packet) -> Packet {
        match *self {
            Layer::DataLink(mac) => packet.with_source_mac(mac),
            Layer::Network(ip) => packet.with_source_ip(ip),
        }
    }

    pub fn validate(&self, packet: &Packet) -> Result<(), AddressMismatch> {
        let actual = match self {
            Layer::DataLink(_) => Address::Physical(packet.destination_mac),
            Layer::Network(_) => Address::Logical(packet.destination_ip),
        };
        if actual == self.address() {
            Ok(())
        } else {
            Err(AddressMismatch {
                layer: self.kind(),
                expected: self.address(),
                actual,
            })
        }
    }
}

/// Layers ordered lowest to highest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerStack(Vec<Layer>);

impl LayerStack {
    #[must_use]
    pub fn new(layers: Vec<Layer>) -> LayerStack {
        LayerStack(layers)
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.0
    }

    /// Outgoing path: highest layer first.
    #[must_use]
    pub fn encapsulate(&self, packet: Packet) -> Packet {
        self.0
            .iter()
            .rev()
            .fold(packet, |packet, layer| layer.stamp(packet))
    }

    /// Incoming path: lowest layer first, stopping at the first layer that
    /// rejects the packet.
    pub fn decapsulate(&self, packet: Packet) -> Result<Packet, AddressMismatch> {
        for layer in &self.0 {
            layer.validate(&packet)?;
        }
        Ok(packet)
    }

    #[must_use]
    pub fn mac(&self) -> Option<MacAddress> {
        self.0.iter().find_map(|layer| match layer {
            Layer::DataLink(mac) => Some(*mac),
            Layer::Network(_) => None,
        })
    }

    #[must_use]
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.0.iter().find_map(|layer| match layer {
            Layer::Network(ip) => Some(*ip),
            Layer::DataLink(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use pretty_assertions::assert_eq;

    use crate::{
        address::{Address, MacAddress},
        packet::Packet,
    };

    use super::{AddressMismatch, Layer, LayerKind, LayerStack};

    const MAC_1: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
    const MAC_2: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x02]);
    const IP_1: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const IP_2: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

    fn stack(mac: MacAddress, ip: Ipv4Addr) -> LayerStack {
        LayerStack::new(vec![Layer::DataLink(mac), Layer::Network(ip)])
    }

    #[test]
    fn encapsulation_stamps_sources_only() {
        let sent = stack(MAC_1, IP_1).encapsulate(Packet::new("hello", IP_2, MAC_2));
        assert_eq!(
            sent,
            Packet {
                payload: "hello".to_owned(),
                source_ip: IP_1,
                destination_ip: IP_2,
                source_mac: MAC_1,
                destination_mac: MAC_2,
            }
        );
    }

    #[test]
    fn matching_receiver_accepts() {
        let sent = stack(MAC_1, IP_1).encapsulate(Packet::new("hello", IP_2, MAC_2));
        assert_eq!(stack(MAC_2, IP_2).decapsulate(sent.clone()), Ok(sent));
    }

    #[test]
    fn lowest_mismatch_stops_processing() {
        let other_mac = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x03]);
        let sent = stack(MAC_1, IP_1).encapsulate(Packet::new("hello", IP_1, MAC_2));
        // Both layers disagree; only the data-link layer gets to report it.
        assert_eq!(
            stack(other_mac, IP_2).decapsulate(sent),
            Err(AddressMismatch {
                layer: LayerKind::DataLink,
                expected: Address::Physical(other_mac),
                actual: Address::Physical(MAC_2),
            })
        );
    }

    #[test]
    fn network_mismatch() {
        let sent = stack(MAC_1, IP_1).encapsulate(Packet::new("hello", IP_2, MAC_2));
        let other_ip = Ipv4Addr::new(10, 0, 0, 9);
        assert_eq!(
            stack(MAC_2, other_ip).decapsulate(sent),
            Err(AddressMismatch {
                layer: LayerKind::Network,
                expected: Address::Logical(other_ip),
                actual: Address::Logical(IP_2),
            })
        );
    }

    #[test]
    fn lookups() {
        let s = stack(MAC_1, IP_1);
        assert_eq!(s.mac(), Some(MAC_1));
        assert_eq!(s.ip(), Some(IP_1));
        assert_eq!(LayerStack::default().ip(), None);
    }
}
