use std::{fmt::Display, net::Ipv4Addr};

use serde::Serialize;

use crate::{
    address::MacAddress,
    layer::AddressMismatch,
    logging::Logger,
    network::DeviceId,
    packet::Packet,
    quantities::Time,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    /// The switch had learned where the destination lives.
    Unicast,
    /// Destination unknown to the switch: one copy per port except ingress.
    Flood,
    /// Router forwarded over the link to its next hop.
    Routed,
    /// Router handed the packet to a next hop it has no link to.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// No link from this device to `to`, or no next hop configured at all.
    LinkNotFound { to: Option<DeviceId> },
    AddressMismatch(AddressMismatch),
    NoRoute { destination: Ipv4Addr },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    Sent {
        packet: Packet,
        to: DeviceId,
        arrival: Time,
    },
    Delivered {
        packet: Packet,
    },
    Learned {
        address: MacAddress,
        port: DeviceId,
    },
    Forwarded {
        packet: Packet,
        to: DeviceId,
        mode: ForwardMode,
        arrival: Time,
    },
    Dropped {
        packet: Packet,
        #[serde(flatten)]
        reason: DropReason,
    },
    Failed {
        message: String,
    },
}

/// Something a device did or refused to do, as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub time: Time,
    pub device: DeviceId,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

impl Outcome {
    /// Renders the outcome using `names` (indexed by device id) for devices.
    #[must_use]
    pub fn display<'a>(&'a self, names: &'a [String]) -> impl Display + 'a {
        OutcomeDisplay {
            outcome: self,
            names,
            prefixed: true,
        }
    }

    /// Like `display`, without the leading time and device name.
    #[must_use]
    pub fn describe<'a>(&'a self, names: &'a [String]) -> impl Display + 'a {
        OutcomeDisplay {
            outcome: self,
            names,
            prefixed: false,
        }
    }
}

struct OutcomeDisplay<'a> {
    outcome: &'a Outcome,
    names: &'a [String],
    prefixed: bool,
}

impl OutcomeDisplay<'_> {
    fn name(&self, id: DeviceId) -> String {
        self.names
            .get(id.index())
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

impl Display for OutcomeDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Outcome { time, device, kind } = self.outcome;
        if self.prefixed {
            let millis = time.since_sim_start().milliseconds();
            write!(f, "{millis:>8.3}ms {}: ", self.name(*device))?;
        }
        match kind {
            OutcomeKind::Sent {
                packet,
                to,
                arrival,
            } => write!(
                f,
                "sent [{packet}] to {} arriving at {:.3}ms",
                self.name(*to),
                arrival.since_sim_start().milliseconds()
            ),
            OutcomeKind::Delivered { packet } => write!(f, "delivered [{packet}]"),
            OutcomeKind::Learned { address, port } => {
                write!(f, "learned {address} is behind {}", self.name(*port))
            }
            OutcomeKind::Forwarded {
                packet,
                to,
                mode,
                arrival,
            } => write!(
                f,
                "forwarded ({mode:?}) [{packet}] to {} arriving at {:.3}ms",
                self.name(*to),
                arrival.since_sim_start().milliseconds()
            ),
            OutcomeKind::Dropped { packet, reason } => {
                write!(f, "dropped [{packet}]: ")?;
                match reason {
                    DropReason::LinkNotFound { to: Some(to) } => {
                        write!(f, "no link to {}", self.name(*to))
                    }
                    DropReason::LinkNotFound { to: None } => write!(f, "no next hop"),
                    DropReason::AddressMismatch(mismatch) => write!(
                        f,
                        "{} layer expected {} but got {}",
                        mismatch.layer, mismatch.expected, mismatch.actual
                    ),
                    DropReason::NoRoute { destination } => write!(f, "no route to {destination}"),
                }
            }
            OutcomeKind::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Subscriber for outcomes. Rendering lives behind this trait.
pub trait Observer {
    fn observe(&mut self, outcome: &Outcome);
}

impl<'a, T> Observer for &'a mut T
where
    T: Observer,
{
    fn observe(&mut self, outcome: &Outcome) {
        T::observe(self, outcome);
    }
}

#[derive(Debug, Default)]
pub struct NothingObserver;

impl Observer for NothingObserver {
    fn observe(&mut self, _outcome: &Outcome) {}
}

/// Keeps every outcome in order.
#[derive(Debug, Default, Clone)]
pub struct TraceRecorder {
    outcomes: Vec<Outcome>,
}

impl TraceRecorder {
    #[must_use]
    pub fn new() -> TraceRecorder {
        TraceRecorder::default()
    }

    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }

    pub fn of_device(&self, device: DeviceId) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(move |outcome| outcome.device == device)
    }

    pub fn delivered(&self) -> impl Iterator<Item = (&Outcome, &Packet)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.kind {
            OutcomeKind::Delivered { packet } => Some((outcome, packet)),
            _ => None,
        })
    }

    pub fn dropped(&self) -> impl Iterator<Item = (&Outcome, &DropReason)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.kind {
            OutcomeKind::Dropped { reason, .. } => Some((outcome, reason)),
            _ => None,
        })
    }
}

impl Observer for TraceRecorder {
    fn observe(&mut self, outcome: &Outcome) {
        self.outcomes.push(outcome.clone());
    }
}

/// Renders each outcome as one log line.
#[derive(Debug)]
pub struct LoggingObserver<L> {
    logger: L,
    names: Vec<String>,
}

impl<L> LoggingObserver<L> {
    #[must_use]
    pub const fn new(logger: L, names: Vec<String>) -> LoggingObserver<L> {
        LoggingObserver { logger, names }
    }
}

impl<L> Observer for LoggingObserver<L>
where
    L: Logger,
{
    fn observe(&mut self, outcome: &Outcome) {
        log!(self.logger, "{}", outcome.display(&self.names));
    }
}

/// Sends every outcome to two observers.
#[derive(Debug, Default)]
pub struct Tee<A, B>(pub A, pub B);

impl<A, B> Observer for Tee<A, B>
where
    A: Observer,
    B: Observer,
{
    fn observe(&mut self, outcome: &Outcome) {
        self.0.observe(outcome);
        self.1.observe(outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::{
        address::MacAddress,
        logging::MemoryLogger,
        network::DeviceId,
        packet::Packet,
        quantities::{milliseconds, Time},
    };

    use super::{DropReason, LoggingObserver, Observer, Outcome, OutcomeKind, Tee, TraceRecorder};

    fn no_route(device: usize) -> Outcome {
        let destination = Ipv4Addr::new(10, 0, 0, 1);
        Outcome {
            time: Time::from_sim_start(milliseconds(50.)),
            device: DeviceId::from(device),
            kind: OutcomeKind::Dropped {
                packet: Packet::new("x", destination, MacAddress::UNSPECIFIED),
                reason: DropReason::NoRoute { destination },
            },
        }
    }

    #[test]
    fn recorder_filters() {
        let mut recorder = TraceRecorder::new();
        recorder.observe(&no_route(0));
        recorder.observe(&no_route(1));
        assert_eq!(recorder.of_device(DeviceId::from(1)).count(), 1);
        assert_eq!(recorder.dropped().count(), 2);
        assert_eq!(recorder.delivered().count(), 0);
    }

    #[test]
    fn logging_observer_uses_names() {
        let mut observer = Tee(
            LoggingObserver::new(MemoryLogger::default(), vec!["r1".to_owned()]),
            TraceRecorder::new(),
        );
        observer.observe(&no_route(0));
        assert_eq!(
            observer.0.logger.lines,
            vec![
                "  50.000ms r1: dropped [0.0.0.0 (00:00:00:00:00:00) -> 10.0.0.1 (00:00:00:00:00:00): \"x\"]: no route to 10.0.0.1"
                    .to_owned()
            ]
        );
        assert_eq!(observer.1.outcomes().len(), 1);
        assert_eq!(
            observer.1.outcomes()[0].describe(&[]).to_string(),
            "dropped [0.0.0.0 (00:00:00:00:00:00) -> 10.0.0.1 (00:00:00:00:00:00): \"x\"]: no route to 10.0.0.1"
        );
    }

    #[test]
    fn serializes_flat() {
        let json = serde_json::to_value(no_route(2)).unwrap();
        assert_eq!(json["kind"], "dropped");
        assert_eq!(json["reason"], "no_route");
        assert_eq!(json["destination"], "10.0.0.1");
        assert_eq!(json["device"], 2);
    }
}
