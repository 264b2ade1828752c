use std::{fmt::Display, net::Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::address::MacAddress;

/// A packet as it exists at one hop. Layers take it by value and hand back a
/// new one, so no two pending events ever share an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub payload: String,
    pub source_ip: Ipv4Addr,
    pub destination_ip: Ipv4Addr,
    pub source_mac: MacAddress,
    pub destination_mac: MacAddress,
}

impl Packet {
    /// An outgoing packet with its destination filled in and its source
    /// fields left for the sender's layers to stamp.
    #[must_use]
    pub fn new(
        payload: impl Into<String>,
        destination_ip: Ipv4Addr,
        destination_mac: MacAddress,
    ) -> Packet {
        Packet {
            payload: payload.into(),
            source_ip: Ipv4Addr::UNSPECIFIED,
            destination_ip,
            source_mac: MacAddress::UNSPECIFIED,
            destination_mac,
        }
    }

    #[must_use]
    pub fn with_source_ip(self, source_ip: Ipv4Addr) -> Packet {
        Packet { source_ip, ..self }
    }

    #[must_use]
    pub fn with_source_mac(self, source_mac: MacAddress) -> Packet {
        Packet { source_mac, ..self }
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({}): {:?}",
            self.source_ip, self.source_mac, self.destination_ip, self.destination_mac, self.payload
        )
    }
}
