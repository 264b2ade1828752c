use anyhow::{Context, Result};
use derive_where::derive_where;
use serde::Serialize;

use crate::{
    device::{Device, DeviceContext},
    logging::{Logger, NothingLogger},
    network::{DeviceId, Network, TopologyError},
    outcome::{Observer, Outcome, OutcomeKind, TraceRecorder},
    packet::Packet,
    quantities::{Time, TimeSpan},
    scheduler::{Clock, EventHandler, EventQueue, FailurePolicy, RunSummary, Scheduler, VirtualClock},
};

/// Something scheduled to happen to a device. Devices are named by id and
/// resolved through the registry when the event fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// `packet` arrives at `to` over the link from `from`.
    Deliver {
        from: DeviceId,
        to: DeviceId,
        packet: Packet,
    },
    /// `device` originates `packet`.
    Inject { device: DeviceId, packet: Packet },
}

impl Event {
    /// The device that handles the event.
    #[must_use]
    pub const fn target(&self) -> DeviceId {
        match self {
            Event::Deliver { to, .. } => *to,
            Event::Inject { device, .. } => *device,
        }
    }
}

struct Dispatcher<'a, O, L> {
    network: &'a mut Network,
    observer: &'a mut O,
    logger: &'a mut L,
    current: Option<DeviceId>,
}

impl<O, L> EventHandler<Event> for Dispatcher<'_, O, L>
where
    O: Observer,
    L: Logger,
{
    fn handle(&mut self, time: Time, event: Event, queue: &mut EventQueue<Event>) -> Result<()> {
        log!(self.logger, "time = {}", time);
        let target = event.target();
        self.current = Some(target);
        let (device, links) = self
            .network
            .device_and_links(target)
            .ok_or(TopologyError::UnknownDevice(target))?;
        let mut context = DeviceContext::new(time, target, links, queue, &mut *self.observer);
        match event {
            Event::Deliver { from, packet, .. } => device.receive(packet, from, &mut context),
            Event::Inject { packet, .. } => device.send(packet, &mut context),
        }
        .with_context(|| format!("{} failed to handle a packet", device.name()))
    }

    fn failed(&mut self, time: Time, error: &anyhow::Error) {
        log!(self.logger, "{:#}", error);
        if let Some(device) = self.current {
            self.observer.observe(&Outcome {
                time,
                device,
                kind: OutcomeKind::Failed {
                    message: format!("{error:#}"),
                },
            });
        }
    }
}

/// A network together with the clock and queue driving it.
///
/// Every packet movement goes through the scheduler, so a run is a pure
/// function of the topology and the injected packets.
#[derive_where(Debug; C, L)]
pub struct Simulation<C = VirtualClock, O = TraceRecorder, L = NothingLogger> {
    network: Network,
    scheduler: Scheduler<Event, C>,
    #[derive_where(skip)]
    observer: O,
    logger: L,
}

impl Simulation {
    /// Virtual time, every outcome recorded, no logging, failures isolated.
    pub fn new(network: Network) -> Result<Simulation, TopologyError> {
        Simulation::with_parts(
            network,
            VirtualClock::new(),
            FailurePolicy::Isolate,
            TraceRecorder::new(),
            NothingLogger,
        )
    }
}

impl<C, O, L> Simulation<C, O, L>
where
    C: Clock,
    O: Observer,
    L: Logger,
{
    pub fn with_parts(
        network: Network,
        clock: C,
        policy: FailurePolicy,
        observer: O,
        logger: L,
    ) -> Result<Simulation<C, O, L>, TopologyError> {
        network.check_filled()?;
        Ok(Simulation {
            network,
            scheduler: Scheduler::new(clock, policy),
            observer,
            logger,
        })
    }

    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub const fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    #[must_use]
    pub fn into_observer(self) -> O {
        self.observer
    }

    #[must_use]
    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    /// Looks up a device by id and concrete type.
    #[must_use]
    pub fn device<T: Device + 'static>(&self, id: DeviceId) -> Option<&T> {
        self.network.device(id)?.as_any().downcast_ref()
    }

    /// Has `device` originate `packet` at the current time.
    pub fn send(&mut self, device: DeviceId, packet: Packet) -> Result<(), TopologyError> {
        self.send_after(TimeSpan::ZERO, device, packet)
    }

    pub fn send_after(
        &mut self,
        delay: TimeSpan,
        device: DeviceId,
        packet: Packet,
    ) -> Result<(), TopologyError> {
        if !delay.is_valid_delay() {
            return Err(TopologyError::InvalidDelay(delay));
        }
        self.send_at(self.now() + delay, device, packet)
    }

    /// Has `device` originate `packet` at `time`, which must not be in the
    /// past.
    pub fn send_at(
        &mut self,
        time: Time,
        device: DeviceId,
        packet: Packet,
    ) -> Result<(), TopologyError> {
        if self.network.device(device).is_none() {
            return Err(TopologyError::UnknownDevice(device));
        }
        let delay = time - self.now();
        if !delay.is_valid_delay() {
            return Err(TopologyError::InvalidDelay(delay));
        }
        self.scheduler.schedule_at(time, Event::Inject { device, packet });
        Ok(())
    }

    /// Fires events until nothing is left.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.run_while(|_| true)
    }

    /// Fires every event due at or before `end`. Later events stay queued and
    /// the clock is left at `end`.
    pub fn run_until(&mut self, end: Time) -> Result<RunSummary> {
        let summary = self.run_while(|time| time <= end)?;
        self.scheduler.advance_to(end);
        Ok(summary)
    }

    fn run_while(&mut self, keep_going: impl FnMut(Time) -> bool) -> Result<RunSummary> {
        let dispatcher = Dispatcher {
            network: &mut self.network,
            observer: &mut self.observer,
            logger: &mut self.logger,
            current: None,
        };
        self.scheduler.run_while(keep_going, dispatcher)
    }

    /// Discards every pending event, returning how many there were.
    pub fn cancel_pending(&mut self) -> usize {
        self.scheduler.cancel_all()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }
}
