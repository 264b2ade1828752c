use std::{collections::BTreeMap, net::Ipv4Addr};

use anyhow::{anyhow, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    address::MacAddress,
    device::{Host, Router, Switch},
    layer::{Layer, LayerStack},
    logging::Logger,
    network::{DeviceId, Network, TopologyError},
    outcome::Observer,
    packet::Packet,
    quantities::{milliseconds, Time, TimeSpan},
    scheduler::{Clock, FailurePolicy},
    simulation::Simulation,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceConfig {
    Host {
        name: String,
        layers: LayerStack,
        next_hop: Option<String>,
    },
    Switch {
        name: String,
        /// Physical address to the name of the device behind it.
        ports: BTreeMap<MacAddress, String>,
    },
    Router {
        name: String,
        routes: BTreeMap<Ipv4Addr, String>,
        #[serde(default)]
        direct_fallback: bool,
    },
}

impl DeviceConfig {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            DeviceConfig::Host { name, .. }
            | DeviceConfig::Switch { name, .. }
            | DeviceConfig::Router { name, .. } => name,
        }
    }
}

const fn bidirectional() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub from: String,
    pub to: String,
    pub delay: TimeSpan,
    #[serde(default = "bidirectional")]
    pub bidirectional: bool,
}

/// A packet handed to `device` at `at` after the start of the run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InjectionConfig {
    pub at: TimeSpan,
    pub device: String,
    pub payload: String,
    pub destination_ip: Ipv4Addr,
    pub destination_mac: MacAddress,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TopologyConfig {
    pub devices: Vec<DeviceConfig>,
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub injections: Vec<InjectionConfig>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Stop after this long; run until the queue drains if unset.
    #[serde(default)]
    pub horizon: Option<TimeSpan>,
}

impl Default for TopologyConfig {
    fn default() -> TopologyConfig {
        let mac = |last| MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last]);
        let ip = |last| Ipv4Addr::new(192, 168, 1, last);
        let host = |name: &str, last| DeviceConfig::Host {
            name: name.to_owned(),
            layers: LayerStack::new(vec![Layer::DataLink(mac(last)), Layer::Network(ip(last))]),
            next_hop: Some("switch1".to_owned()),
        };
        let link = |from: &str| LinkConfig {
            from: from.to_owned(),
            to: "switch1".to_owned(),
            delay: milliseconds(50.),
            bidirectional: true,
        };
        TopologyConfig {
            devices: vec![
                host("host1", 1),
                host("host2", 2),
                DeviceConfig::Switch {
                    name: "switch1".to_owned(),
                    ports: BTreeMap::from([
                        (mac(1), "host1".to_owned()),
                        (mac(2), "host2".to_owned()),
                    ]),
                },
            ],
            links: vec![link("host1"), link("host2")],
            injections: vec![InjectionConfig {
                at: TimeSpan::ZERO,
                device: "host1".to_owned(),
                payload: "Hello Network!!".to_owned(),
                destination_ip: ip(2),
                destination_mac: mac(2),
            }],
            failure_policy: FailurePolicy::Isolate,
            horizon: None,
        }
    }
}

impl TopologyConfig {
    /// Device names in registration order, so index `i` names `DeviceId` `i`.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|device| device.name().to_owned())
            .collect()
    }

    /// The time at which the run should stop, if any.
    #[must_use]
    pub fn end(&self) -> Option<Time> {
        self.horizon.map(Time::from_sim_start)
    }

    pub fn build_network(&self) -> Result<Network> {
        let mut network = Network::new();
        let mut ids = FxHashMap::default();
        let mut slots = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let slot = network.reserve();
            if ids.insert(device.name(), slot.id()).is_some() {
                return Err(TopologyError::DuplicateName(device.name().to_owned()).into());
            }
            slots.push(slot);
        }
        let lookup = |name: &str| -> Result<DeviceId> {
            ids.get(name)
                .copied()
                .ok_or_else(|| TopologyError::UnknownName(name.to_owned()).into())
        };

        for (slot, device) in slots.into_iter().zip(&self.devices) {
            match device {
                DeviceConfig::Host {
                    name,
                    layers,
                    next_hop,
                } => {
                    let mut host = Host::new(name.clone(), layers.clone());
                    if let Some(next_hop) = next_hop {
                        host = host.with_next_hop(lookup(next_hop)?);
                    }
                    network.fill(&slot, host)?;
                }
                DeviceConfig::Switch { name, ports } => {
                    let switch = ports
                        .iter()
                        .try_fold(Switch::new(name.clone()), |switch, (mac, device)| {
                            Ok::<_, anyhow::Error>(switch.with_port(*mac, lookup(device)?))
                        })?;
                    network.fill(&slot, switch)?;
                }
                DeviceConfig::Router {
                    name,
                    routes,
                    direct_fallback,
                } => {
                    let router = routes
                        .iter()
                        .try_fold(Router::new(name.clone()), |router, (ip, device)| {
                            Ok::<_, anyhow::Error>(router.with_route(*ip, lookup(device)?))
                        })?
                        .with_direct_fallback(*direct_fallback);
                    network.fill(&slot, router)?;
                }
            }
        }

        for LinkConfig {
            from,
            to,
            delay,
            bidirectional,
        } in &self.links
        {
            let (from, to) = (lookup(from)?, lookup(to)?);
            if *bidirectional {
                network.connect(from, to, *delay)?;
            } else {
                network.add_link(from, to, *delay)?;
            }
        }
        Ok(network)
    }

    /// Builds the network and schedules every injection.
    pub fn build<C, O, L>(&self, clock: C, observer: O, logger: L) -> Result<Simulation<C, O, L>>
    where
        C: Clock,
        O: Observer,
        L: Logger,
    {
        let network = self.build_network()?;
        let mut simulation =
            Simulation::with_parts(network, clock, self.failure_policy, observer, logger)?;
        for injection in &self.injections {
            let device = simulation.network().lookup(&injection.device)?;
            let packet = Packet::new(
                injection.payload.clone(),
                injection.destination_ip,
                injection.destination_mac,
            );
            simulation
                .send_at(Time::from_sim_start(injection.at), device, packet)
                .map_err(|e| anyhow!("injection into {}: {e}", injection.device))?;
        }
        Ok(simulation)
    }
}
