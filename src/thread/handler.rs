//! # Summary
//!
//! This module defines the token handler, the state machine at the heart of
//! every ring member:
//!
//! ```text
//! Idle -> Holding -> [InCriticalSection] -> Forwarding -> Idle
//! ```
//!
//! The handler reads and clears its member's intent at the instant it starts
//! holding the token, runs the critical section if the intent was set, then
//! hands the token to its successor. While it holds the token or works in the
//! critical section it keeps listening for deliveries, and any token that
//! arrives then is a second live token: it is rejected and reported as a
//! protocol violation.
//!
//! The handler also owns its member's intent generator. At most one is
//! drawing at a time: a fresh generator is started after a critical section
//! only once the previous one has fired.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Timing;
use crate::error;
use crate::event::{Event, Observer};
use crate::internal::Rx;
use crate::message::{Ack, Reply, Token};
use crate::state::{Intent, Status};
use crate::thread::intent;
use crate::topology::Ring;
use crate::transport::Transport;

/// Deliveries from a predecessor, answered once the handler decides.
#[derive(Debug)]
pub enum In {
    Token(Token, oneshot::Sender<Reply>),
}

pub struct Handler<T> {
    /// Identity of this member
    id: usize,

    /// Next member in ring order
    successor: usize,

    /// Pending request for the critical section
    intent: Intent,

    /// Generator restarted after each critical section, if any
    schedule: Option<intent::Schedule>,

    /// Generator currently drawing, if any
    generator: Option<JoinHandle<()>>,

    timing: Timing,

    /// Outbound channel to the successor
    transport: T,

    /// Inbound deliveries
    rx: Rx<In>,

    observer: Observer,

    status: Status,
}

impl<T: Transport> Handler<T> {
    pub fn new(
        id: usize,
        ring: &Ring,
        intent: Intent,
        transport: T,
        rx: Rx<In>,
    ) -> Result<Self, error::Topology> {
        Ok(Handler {
            id,
            successor: ring.next(id)?,
            intent,
            schedule: None,
            generator: None,
            timing: Timing::default(),
            transport,
            rx,
            observer: Observer::none(),
            status: Status::Idle,
        })
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_schedule(mut self, schedule: Option<intent::Schedule>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Circulates the token until forwarding fails or every sender to this
    /// member is gone. The origin mints the ring's token after the startup
    /// delay. On a forwarding failure the handler stays in `Forwarding` and
    /// returns the failure, leaving the ring stalled.
    pub async fn run(mut self, origin: bool) -> Result<(), error::Error> {
        self.arm();
        let mut next = None;
        if origin {
            time::sleep(self.timing.startup).await;
            info!("{} injects the token", self.id);
            next = Some(Token::new(self.id));
        }
        loop {
            let token = match next.take() {
            | Some(token) => token,
            | None => match self.rx.recv().await {
                | Some(In::Token(token, reply)) => {
                    // Sender may have given up waiting; the token is ours regardless
                    reply.send(Reply::Ack(Ack::received())).ok();
                    token
                }
                | None => return Ok(()),
                },
            };
            self.receive(token);
            next = self.cycle(token).await?;
        }
    }

    fn receive(&mut self, token: Token) {
        debug_assert_eq!(self.status, Status::Idle);
        info!("{} received token from {}", self.id, token.holder);
        self.observer.emit(Event::Received {
            id: self.id,
            from: token.holder,
            sequence: token.sequence,
            at: time::Instant::now(),
        });
        self.transition(Status::Holding);
    }

    /// Runs one possession of the token. Returns the token again only when
    /// this member is its own successor.
    async fn cycle(&mut self, token: Token) -> Result<Option<Token>, error::Error> {
        let wanted = self.intent.take();
        self.pause(self.timing.hold).await;
        if wanted {
            self.critical_section().await;
        }
        self.forward(token).await
    }

    async fn critical_section(&mut self) {
        self.transition(Status::InCriticalSection);
        info!("{} entered critical section", self.id);
        self.observer.emit(Event::Entered { id: self.id, at: time::Instant::now() });

        self.pause(self.timing.critical_section).await;

        info!("{} exited critical section", self.id);
        self.observer.emit(Event::Exited { id: self.id, at: time::Instant::now() });

        self.pause(self.timing.cooldown).await;
        self.arm();
    }

    /// Starts the intent generator unless one is still drawing. A request
    /// raised from outside can be consumed while the generator runs, which
    /// leaves that generator in place.
    fn arm(&mut self) {
        let schedule = match self.schedule {
        | Some(schedule) => schedule,
        | None => return,
        };
        if let Some(generator) = &self.generator {
            if !generator.is_finished() {
                debug!("{} intent generator still drawing", self.id);
                return
            }
        }
        let generator = intent::Generator::new(
            self.id,
            self.intent.clone(),
            schedule,
            self.observer.clone(),
        );
        self.generator = Some(generator.spawn());
    }

    async fn forward(&mut self, token: Token) -> Result<Option<Token>, error::Error> {
        let to = self.successor;
        let token = token.pass(self.id);
        self.transition(Status::Forwarding);
        info!("{} sends token to {}", self.id, to);
        self.observer.emit(Event::Sent {
            from: self.id,
            to,
            sequence: token.sequence,
            at: time::Instant::now(),
        });

        if to == self.id {
            self.transition(Status::Idle);
            return Ok(Some(token))
        }

        match self.transport.send(to, token).await {
        | Ok(ack) => {
            debug!("{} acknowledged: {}", to, ack.message);
            self.transition(Status::Idle);
            Ok(None)
        }
        | Err(cause) => {
            error!("{} failed to forward token to {}: {}; ring stalled", self.id, to, cause);
            self.observer.emit(Event::Stalled {
                id: self.id,
                to,
                at: time::Instant::now(),
            });
            Err(error::Error::Forward { to, cause })
        }
        }
    }

    /// Waits out `duration`, rejecting any token delivered meanwhile.
    async fn pause(&mut self, duration: time::Duration) {
        let Handler { id, status, rx, observer, .. } = self;
        let sleep = time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return,
                Some(message) = rx.recv() => reject(*id, *status, observer, message),
            }
        }
    }

    fn transition(&mut self, status: Status) {
        trace!("{} {:?} -> {:?}", self.id, self.status, status);
        self.status = status;
    }
}

impl<T> Drop for Handler<T> {
    fn drop(&mut self) {
        if let Some(generator) = self.generator.take() {
            generator.abort();
        }
    }
}

fn reject(id: usize, status: Status, observer: &Observer, message: In) {
    let In::Token(token, reply) = message;
    let violation = error::Violation { id, status, token };
    error!("protocol invariant violated: {}", violation);
    observer.emit(Event::Violation {
        id,
        status,
        token,
        at: time::Instant::now(),
    });
    reply.send(Reply::Rejected(violation.to_string())).ok();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::JoinHandle;

    use super::*;
    use crate::internal;
    use crate::transport::Local;

    #[derive(Debug, PartialEq, Eq)]
    enum Step {
        Recv(usize),
        Send(usize, usize),
        Enter(usize),
        Exit(usize),
    }

    fn step(event: &Event) -> Option<Step> {
        match *event {
        | Event::Received { id, .. } => Some(Step::Recv(id)),
        | Event::Sent { from, to, .. } => Some(Step::Send(from, to)),
        | Event::Entered { id, .. } => Some(Step::Enter(id)),
        | Event::Exited { id, .. } => Some(Step::Exit(id)),
        | _ => None,
        }
    }

    /// Whole ring of handlers wired through the in-process transport.
    struct Sim {
        events: internal::Rx<Event>,
        intents: Vec<Intent>,
        transport: Local,
        pending: Vec<Handler<Local>>,
        running: Vec<JoinHandle<Result<(), error::Error>>>,
    }

    impl Sim {
        fn new(count: usize, schedule: Option<intent::Schedule>) -> Self {
            let ring = Ring::new(count).unwrap();
            let transport = Local::new();
            let (events, events_tx) = internal::new();
            let mut intents = Vec::new();
            let mut pending = Vec::new();
            for id in ring.members() {
                let (rx, tx) = internal::new();
                transport.connect(id, tx);
                let intent = Intent::default();
                intents.push(intent.clone());
                let handler = Handler::new(id, &ring, intent, transport.clone(), rx)
                    .unwrap()
                    .with_schedule(schedule)
                    .with_observer(Observer::new(events_tx.clone()));
                pending.push(handler);
            }
            Sim { events, intents, transport, pending, running: Vec::new() }
        }

        fn start(&mut self, origin: usize) {
            for handler in self.pending.drain(..) {
                let is_origin = handler.id == origin;
                self.running.push(tokio::spawn(handler.run(is_origin)));
            }
        }

        async fn next(&mut self) -> Event {
            self.events.recv().await.expect("event stream closed")
        }

        /// Collects protocol steps, skipping generator and fault events.
        async fn steps(&mut self, count: usize) -> Vec<Step> {
            let mut steps = Vec::with_capacity(count);
            while steps.len() < count {
                if let Some(step) = step(&self.next().await) {
                    steps.push(step);
                }
            }
            steps
        }
    }

    impl Drop for Sim {
        fn drop(&mut self) {
            self.running.iter().for_each(JoinHandle::abort);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn token_circulates_in_ring_order() {
        let mut sim = Sim::new(3, None);
        sim.start(0);
        let steps = sim.steps(9).await;
        assert_eq!(steps, vec![
            Step::Recv(0),
            Step::Send(0, 1),
            Step::Recv(1),
            Step::Send(1, 2),
            Step::Recv(2),
            Step::Send(2, 0),
            Step::Recv(0),
            Step::Send(0, 1),
            Step::Recv(1),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn origin_receives_its_own_token_first() {
        let mut sim = Sim::new(3, None);
        let start = time::Instant::now();
        sim.start(0);
        match sim.next().await {
        | Event::Received { id: 0, from: 0, sequence: 0, at } => {
            assert!(at - start >= Timing::default().startup);
        }
        | other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn intent_runs_critical_section_once_before_forwarding() {
        let timing = Timing::default();
        let mut sim = Sim::new(3, None);
        sim.intents[1].raise();
        sim.start(0);

        let mut received = None;
        let mut entered = None;
        let mut exited = None;
        let mut sent = None;
        while sent.is_none() {
            match sim.next().await {
            | Event::Received { id: 1, at, .. } => received = Some(at),
            | Event::Entered { id: 1, at } => entered = Some(at),
            | Event::Exited { id: 1, at } => exited = Some(at),
            | Event::Sent { from: 1, to: 2, at, .. } => sent = Some(at),
            | Event::Entered { id, .. } => panic!("{} entered without intent", id),
            | _ => (),
            }
        }
        let (received, entered, exited, sent) = (
            received.unwrap(),
            entered.unwrap(),
            exited.unwrap(),
            sent.unwrap(),
        );
        assert!(received <= entered && entered < exited && exited < sent);
        assert!(exited - entered >= timing.critical_section);
        assert!(sent - exited >= timing.cooldown);
        assert!(sent - received >= timing.hold + timing.critical_section + timing.cooldown);
        assert!(!sim.intents[1].is_raised());

        // Flag was consumed: the next visit passes straight through
        let steps = sim.steps(6).await;
        assert_eq!(steps, vec![
            Step::Recv(2),
            Step::Send(2, 0),
            Step::Recv(0),
            Step::Send(0, 1),
            Step::Recv(1),
            Step::Send(1, 2),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_intent_skips_critical_section_delay() {
        let timing = Timing::default();
        let mut sim = Sim::new(2, None);
        sim.start(0);
        let mut received = None;
        loop {
            match sim.next().await {
            | Event::Received { id: 1, at, .. } => received = Some(at),
            | Event::Sent { from: 1, at, .. } => {
                let held = at - received.unwrap();
                assert!(held >= timing.hold);
                assert!(held < timing.hold + timing.critical_section);
                break
            }
            | Event::Entered { .. } => panic!("entered without intent"),
            | _ => (),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_token_mutual_exclusion_and_fairness() {
        const COUNT: usize = 4;
        let schedule = intent::Schedule::default()
            .with_interval(Duration::from_secs(1))
            .with_odds(1, 0);
        let mut sim = Sim::new(COUNT, Some(schedule));
        sim.intents.iter().for_each(Intent::raise);
        sim.start(0);

        let mut holder: Option<usize> = None;
        let mut working: Option<usize> = None;
        let mut visits = Vec::new();
        let mut sections = 0;
        let mut last = time::Instant::now();
        while visits.len() < COUNT * 6 {
            let event = sim.next().await;
            assert!(event.at() >= last);
            last = event.at();
            match event {
            | Event::Received { id, .. } => {
                assert_eq!(holder, None, "{} received while another member holds", id);
                holder = Some(id);
                visits.push(id);
            }
            | Event::Sent { from, .. } => {
                assert_eq!(holder, Some(from));
                holder = None;
            }
            | Event::Entered { id, .. } => {
                assert_eq!(working, None, "{} entered during another section", id);
                assert_eq!(holder, Some(id));
                working = Some(id);
                sections += 1;
            }
            | Event::Exited { id, .. } => {
                assert_eq!(working, Some(id));
                working = None;
            }
            | Event::Violation { .. } | Event::Stalled { .. } => panic!("ring faulted"),
            | Event::Wanted { .. } => (),
            }
        }

        let expected = (0..COUNT).cycle().take(visits.len()).collect::<Vec<_>>();
        assert_eq!(visits, expected);
        assert!(sections >= COUNT);
    }

    #[tokio::test(start_paused = true)]
    async fn forward_failure_stalls_ring() {
        let mut sim = Sim::new(3, None);
        sim.transport.disconnect(2);
        sim.start(0);

        let steps = sim.steps(4).await;
        assert_eq!(steps, vec![
            Step::Recv(0),
            Step::Send(0, 1),
            Step::Recv(1),
            Step::Send(1, 2),
        ]);
        match sim.next().await {
        | Event::Stalled { id: 1, to: 2, .. } => (),
        | other => panic!("unexpected {:?}", other),
        }

        let stalled = sim.running.remove(1);
        match stalled.await.unwrap() {
        | Err(error::Error::Forward { to: 2, cause: error::Forward::Unreachable }) => (),
        | other => panic!("unexpected {:?}", other),
        }

        time::sleep(Duration::from_secs(600)).await;
        assert!(sim.events.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_successor_is_not_a_rejection() {
        let mut sim = Sim::new(3, None);
        // Member 2 stays registered but its handler never runs
        drop(sim.pending.remove(2));
        sim.start(0);

        loop {
            match sim.next().await {
            | Event::Stalled { id: 1, to: 2, .. } => break,
            | Event::Violation { .. } => panic!("stopped member reported as violation"),
            | _ => (),
            }
        }
        let stalled = sim.running.remove(1);
        match stalled.await.unwrap() {
        | Err(error::Error::Forward { to: 2, cause: error::Forward::Stopped }) => (),
        | other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_token_while_holding_is_rejected() {
        let mut sim = Sim::new(2, None);
        sim.start(0);
        match sim.next().await {
        | Event::Received { id: 0, .. } => (),
        | other => panic!("unexpected {:?}", other),
        }

        let duplicate = Token { holder: 1, sequence: 99 };
        match sim.transport.send(0, duplicate).await {
        | Err(error::Forward::Rejected(_)) => (),
        | other => panic!("unexpected {:?}", other),
        }
        match sim.next().await {
        | Event::Violation { id: 0, status: Status::Holding, token, .. } => {
            assert_eq!(token, duplicate);
        }
        | other => panic!("unexpected {:?}", other),
        }

        // The original token keeps circulating
        let steps = sim.steps(2).await;
        assert_eq!(steps, vec![Step::Send(0, 1), Step::Recv(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_token_during_critical_section_is_rejected() {
        let mut sim = Sim::new(2, None);
        sim.intents[0].raise();
        sim.start(0);
        loop {
            if let Event::Entered { id: 0, .. } = sim.next().await {
                break
            }
        }
        let duplicate = Token { holder: 1, sequence: 5 };
        assert!(sim.transport.send(0, duplicate).await.is_err());
        match sim.next().await {
        | Event::Violation { id: 0, status: Status::InCriticalSection, .. } => (),
        | other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_member_passes_token_to_itself() {
        let mut sim = Sim::new(1, None);
        sim.intents[0].raise();
        sim.start(0);
        let steps = sim.steps(6).await;
        assert_eq!(steps, vec![
            Step::Recv(0),
            Step::Enter(0),
            Step::Exit(0),
            Step::Send(0, 0),
            Step::Recv(0),
            Step::Send(0, 0),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn generator_restarts_after_critical_section() {
        let schedule = intent::Schedule::default().with_odds(1, 0);
        let mut sim = Sim::new(2, Some(schedule));
        sim.start(0);
        let mut wanted = 0;
        let mut sections = 0;
        while sections < 2 {
            match sim.next().await {
            | Event::Wanted { id: 1, .. } => {
                assert_eq!(wanted, sections, "generator fired twice before a section");
                wanted += 1;
            }
            | Event::Exited { id: 1, .. } => {
                assert_eq!(wanted, sections + 1);
                sections += 1;
            }
            | _ => (),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn external_request_does_not_start_second_generator() {
        let interval = Duration::from_secs(100);
        let schedule = intent::Schedule::default()
            .with_interval(interval)
            .with_odds(1, 0);
        let mut sim = Sim::new(1, Some(schedule));
        sim.intents[0].raise();
        let start = time::Instant::now();
        sim.start(0);

        time::sleep(interval * 10).await;
        let mut wanted = Vec::new();
        while let Some(event) = sim.events.try_recv() {
            if let Event::Wanted { at, .. } = event {
                wanted.push(at);
            }
        }

        // One chain of generators fires at most once per interval
        assert!(!wanted.is_empty());
        assert!(wanted.len() <= 10, "{} requests in {:?}", wanted.len(), start.elapsed());
        for pair in wanted.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }
}
