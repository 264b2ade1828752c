use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::{
    packet::Packet,
    quantities::{Time, TimeSpan},
    scheduler::EventQueue,
    simulation::Event,
};

use super::DeviceId;

#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display(fmt = "link#{}", _0)]
pub struct LinkId(usize);

impl LinkId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A one-way channel with a fixed propagation delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    id: LinkId,
    from: DeviceId,
    to: DeviceId,
    delay: TimeSpan,
}

impl Link {
    pub(super) const fn new(id: LinkId, from: DeviceId, to: DeviceId, delay: TimeSpan) -> Link {
        Link {
            id,
            from,
            to,
            delay,
        }
    }

    #[must_use]
    pub const fn id(&self) -> LinkId {
        self.id
    }

    #[must_use]
    pub const fn source(&self) -> DeviceId {
        self.from
    }

    #[must_use]
    pub const fn destination(&self) -> DeviceId {
        self.to
    }

    #[must_use]
    pub const fn delay(&self) -> TimeSpan {
        self.delay
    }

    /// Schedules delivery to the far end exactly `delay` after `now` and
    /// returns the arrival time.
    pub fn transmit(&self, packet: Packet, now: Time, queue: &mut EventQueue<Event>) -> Time {
        let arrival = now + self.delay;
        queue.push(
            arrival,
            Event::Deliver {
                from: self.from,
                to: self.to,
                packet,
            },
        );
        arrival
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::{
        address::MacAddress,
        network::DeviceId,
        packet::Packet,
        quantities::{milliseconds, Time},
        scheduler::EventQueue,
        simulation::Event,
    };

    use super::{Link, LinkId};

    fn packet(payload: &str) -> Packet {
        Packet::new(payload, Ipv4Addr::LOCALHOST, MacAddress::UNSPECIFIED)
    }

    #[test]
    fn arrives_after_exactly_the_delay() {
        let link = Link::new(
            LinkId::from(0),
            DeviceId::from(0),
            DeviceId::from(1),
            milliseconds(50.),
        );
        let mut queue = EventQueue::new();
        let sent_at = Time::from_sim_start(milliseconds(20.));
        let arrival = link.transmit(packet("a"), sent_at, &mut queue);
        assert_eq!(arrival, sent_at + milliseconds(50.));
        let (time, event) = queue.pop_next().unwrap();
        assert_eq!(time, arrival);
        assert_eq!(
            event,
            Event::Deliver {
                from: DeviceId::from(0),
                to: DeviceId::from(1),
                packet: packet("a"),
            }
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn same_link_keeps_send_order() {
        let link = Link::new(
            LinkId::from(0),
            DeviceId::from(0),
            DeviceId::from(1),
            milliseconds(5.),
        );
        let mut queue = EventQueue::new();
        for payload in ["first", "second", "third"] {
            link.transmit(packet(payload), Time::SIM_START, &mut queue);
        }
        let payloads: Vec<_> = std::iter::from_fn(|| queue.pop_next())
            .map(|(_, event)| match event {
                Event::Deliver { packet, .. } => packet.payload,
                Event::Inject { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(payloads, vec!["first", "second", "third"]);
    }
}
