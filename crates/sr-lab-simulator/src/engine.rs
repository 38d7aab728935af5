//! Discrete-event simulation of two entities joined by an unreliable channel.
//!
//! Every handler runs to completion against an [`ActionBuffer`]; the buffered
//! packets, timer operations and deliveries are applied once it returns.

use crate::trace::SimulationReport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sr_lab_abstract::{Message, Packet, SimConfig, SystemContext, TransportProtocol};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Value the channel writes into a header field it corrupts.
const CORRUPT_HEADER_VALUE: i32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    PacketArrival {
        to: NodeId,
        packet: Packet,
    },
    TimerExpiry {
        node: NodeId,
        timer_id: u32,
        generation: u64,
    },
    AppSend {
        message: Message,
    },
}

#[derive(Debug)]
struct Event {
    time: u64,
    /// Insertion order; breaks ties between events scheduled for the same time.
    seq: u64,
    kind: EventType,
}

impl Event {
    /// `BinaryHeap` is a max-heap, so the earliest event must compare greatest.
    fn key(&self) -> Reverse<(u64, u64)> {
        Reverse((self.time, self.seq))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One line of the channel timeline kept in the report.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum TimerOp {
    Start { delay: u64, timer_id: u32 },
    Cancel { timer_id: u32 },
}

/// Side effects requested by one handler invocation.
#[derive(Default)]
struct ActionBuffer {
    packets: Vec<Packet>,
    // Call order matters: cancel followed by start must re-arm.
    timer_ops: Vec<TimerOp>,
    logs: Vec<String>,
    delivered: Vec<Message>,
    metrics: Vec<(String, f64)>,
}

/// The `SystemContext` an entity sees while one of its handlers runs.
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: u64,
}

impl SystemContext for ScopedContext<'_> {
    fn send_packet(&mut self, packet: Packet) {
        self.buffer.packets.push(packet);
    }

    fn start_timer(&mut self, delay: u64, timer_id: u32) {
        self.buffer.timer_ops.push(TimerOp::Start { delay, timer_id });
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.buffer.timer_ops.push(TimerOp::Cancel { timer_id });
    }

    fn deliver_message(&mut self, message: Message) {
        self.buffer.delivered.push(message);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_owned());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_owned(), value));
    }
}

/// One-shot deterministic faults keyed by sequence / ack number.
#[derive(Default)]
struct FaultPlan {
    drop_sender_seq: Vec<i32>,
    drop_receiver_ack: Vec<i32>,
    corrupt_sender_seq: Vec<i32>,
    corrupt_receiver_ack: Vec<i32>,
}

fn take_once(list: &mut Vec<i32>, value: i32) -> bool {
    match list.iter().position(|v| *v == value) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

/// What the channel decided to do with one packet.
enum Fate {
    Drop(&'static str),
    Deliver { corrupt: bool },
}

/// Reject channel parameters the simulator cannot run with.
pub fn validate_config(config: &SimConfig) -> anyhow::Result<()> {
    for (name, rate) in [("loss", config.loss_rate), ("corrupt", config.corrupt_rate)] {
        if !(0.0..=1.0).contains(&rate) {
            anyhow::bail!("{name} probability must be within [0, 1], got {rate}");
        }
    }
    if config.min_latency > config.max_latency {
        anyhow::bail!(
            "min_latency {} exceeds max_latency {}",
            config.min_latency,
            config.max_latency
        );
    }
    Ok(())
}

pub struct Simulator {
    time: u64,
    queue: BinaryHeap<Event>,
    next_seq: u64,

    config: SimConfig,
    rng: StdRng,

    pub sender: Box<dyn TransportProtocol>,
    pub receiver: Box<dyn TransportProtocol>,

    /// Messages handed to the application sink, in delivery order.
    pub delivered: Vec<Message>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,

    /// Samples pushed through `SystemContext::record_metric`, as
    /// `(time, value)` per metric name.
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    faults: FaultPlan,

    pub link_events: Vec<LinkEventSummary>,

    /// Bumped whenever a timer is cancelled or superseded; an expiry whose
    /// generation no longer matches is stale.
    timer_generations: HashMap<(NodeId, u32), u64>,
    running_timers: HashSet<(NodeId, u32)>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn TransportProtocol>,
        receiver: Box<dyn TransportProtocol>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            time: 0,
            queue: BinaryHeap::new(),
            next_seq: 0,
            config,
            rng,
            sender,
            receiver,
            delivered: Vec::new(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            metrics: HashMap::new(),
            faults: FaultPlan::default(),
            link_events: Vec::new(),
            timer_generations: HashMap::new(),
            running_timers: HashSet::new(),
        }
    }

    /// Drop the next sender packet carrying `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: i32) {
        self.faults.drop_sender_seq.push(seq);
    }

    /// Drop the next receiver ACK carrying `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: i32) {
        self.faults.drop_receiver_ack.push(ack);
    }

    /// Corrupt the next sender packet carrying `seq`.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: i32) {
        self.faults.corrupt_sender_seq.push(seq);
    }

    /// Corrupt the next receiver ACK carrying `ack`.
    pub fn add_corrupt_receiver_ack_once(&mut self, ack: i32) {
        self.faults.corrupt_receiver_ack.push(ack);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(Vec::as_slice)
    }

    fn schedule(&mut self, time: u64, kind: EventType) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event { time, seq, kind });
    }

    pub fn schedule_app_send(&mut self, time: u64, message: Message) {
        self.schedule(time, EventType::AppSend { message });
    }

    /// Application source: `count` messages, the i-th filled with the letter
    /// `'a' + i % 26`, inter-arrival times uniform on `[0, 2 * avg_interarrival]`.
    pub fn schedule_messages(&mut self, count: u32, avg_interarrival: u64) {
        let mut time = self.time;
        for i in 0..count {
            let gap = self.rng.random_range(0..=avg_interarrival.saturating_mul(2));
            time = time.saturating_add(gap);
            let letter = b'a' + (i % 26) as u8;
            self.schedule_app_send(time, Message::filled(letter));
        }
    }

    pub fn init(&mut self) {
        self.dispatch(NodeId::Sender, |entity, ctx| entity.init(ctx));
        self.dispatch(NodeId::Receiver, |entity, ctx| entity.init(ctx));
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.queue.len()
    }

    /// Process the next event. Returns false once the queue is empty or the
    /// next event lies beyond the configured time limit.
    pub fn step(&mut self) -> bool {
        if let (Some(limit), Some(next)) = (self.config.time_limit, self.peek_next_event_time())
            && next > limit
        {
            debug!("Time limit {} reached with {} events pending", limit, self.remaining_events());
            return false;
        }

        let Some(event) = self.queue.pop() else {
            return false;
        };
        self.time = event.time;
        debug!("t={} {:?}", self.time, event.kind);

        match event.kind {
            EventType::PacketArrival { to, packet } => {
                self.dispatch(to, |entity, ctx| entity.on_packet(ctx, packet));
            }
            EventType::TimerExpiry {
                node,
                timer_id,
                generation,
            } => {
                let key = (node, timer_id);
                if self.timer_generations.get(&key) != Some(&generation) {
                    debug!("[{:?}] stale expiry for timer {} ignored", node, timer_id);
                    return true;
                }
                self.running_timers.remove(&key);
                self.dispatch(node, |entity, ctx| entity.on_timer(ctx, timer_id));
            }
            EventType::AppSend { message } => {
                self.dispatch(NodeId::Sender, |entity, ctx| entity.on_app_data(ctx, message));
            }
        }
        true
    }

    /// Run one handler of `node` to completion, then apply its side effects.
    fn dispatch<F>(&mut self, node: NodeId, handler: F)
    where
        F: FnOnce(&mut dyn TransportProtocol, &mut dyn SystemContext),
    {
        let mut buffer = ActionBuffer::default();
        {
            let mut scoped = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            let ctx: &mut dyn SystemContext = &mut scoped;
            let entity: &mut dyn TransportProtocol = match node {
                NodeId::Sender => self.sender.as_mut(),
                NodeId::Receiver => self.receiver.as_mut(),
            };
            handler(entity, ctx);
        }
        self.apply_actions(node, buffer);
    }

    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            delivered: self.delivered.clone(),
            sender_packet_count: self.sender_packet_count,
            receiver_packet_count: self.receiver_packet_count,
            remaining_events: self.remaining_events(),
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    fn apply_timer_op(&mut self, node: NodeId, op: TimerOp) {
        match op {
            TimerOp::Cancel { timer_id } => {
                let key = (node, timer_id);
                if self.running_timers.remove(&key) {
                    *self.timer_generations.entry(key).or_insert(0) += 1;
                }
            }
            TimerOp::Start { delay, timer_id } => {
                let key = (node, timer_id);
                let generation = self.timer_generations.entry(key).or_insert(0);
                if !self.running_timers.insert(key) {
                    warn!(
                        "[{:?}] timer {} started while already running; replacing it",
                        node, timer_id
                    );
                    *generation += 1;
                }
                let generation = *generation;
                self.schedule(
                    self.time + delay,
                    EventType::TimerExpiry {
                        node,
                        timer_id,
                        generation,
                    },
                );
            }
        }
    }

    /// Overwrite part of the packet so that its checksum no longer matches.
    fn corrupt_packet(&mut self, packet: &mut Packet) {
        let roll: f64 = self.rng.random();
        if roll < 0.75 {
            packet.payload[0] = if packet.payload[0] == b'z' { b'Z' } else { b'z' };
        } else if roll < 0.875 {
            packet.seqnum = CORRUPT_HEADER_VALUE;
        } else {
            packet.acknum = CORRUPT_HEADER_VALUE;
        }
    }

    fn record_link_event(&mut self, description: String) {
        self.link_events.push(LinkEventSummary {
            time: self.time,
            description,
        });
    }

    /// Scripted faults first, then random loss and random corruption.
    fn channel_fate(&mut self, from: NodeId, packet: &Packet) -> Fate {
        let forced_corruption = match from {
            NodeId::Sender => {
                if take_once(&mut self.faults.drop_sender_seq, packet.seqnum) {
                    return Fate::Drop("scripted seq");
                }
                take_once(&mut self.faults.corrupt_sender_seq, packet.seqnum)
            }
            NodeId::Receiver if packet.is_ack() => {
                if take_once(&mut self.faults.drop_receiver_ack, packet.acknum) {
                    return Fate::Drop("scripted ack");
                }
                take_once(&mut self.faults.corrupt_receiver_ack, packet.acknum)
            }
            NodeId::Receiver => false,
        };

        if forced_corruption {
            return Fate::Deliver { corrupt: true };
        }
        if self.rng.random::<f64>() < self.config.loss_rate {
            return Fate::Drop("random loss");
        }
        Fate::Deliver {
            corrupt: self.rng.random::<f64>() < self.config.corrupt_rate,
        }
    }

    fn apply_actions(&mut self, node: NodeId, buffer: ActionBuffer) {
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for line in buffer.logs {
            info!("[{:?}] {}", node, line);
        }

        for message in buffer.delivered {
            let text = message.to_text();
            info!("[{:?}] delivered {:?}", node, text);
            self.record_link_event(format!("[{:?}] DELIVERED {:?} to application", node, text));
            self.delivered.push(message);
        }

        for op in buffer.timer_ops {
            self.apply_timer_op(node, op);
        }

        let peer = node.peer();
        for mut packet in buffer.packets {
            match node {
                NodeId::Sender => self.sender_packet_count += 1,
                NodeId::Receiver => self.receiver_packet_count += 1,
            }

            match self.channel_fate(node, &packet) {
                Fate::Drop(reason) => {
                    debug!("[{:?}->{:?}] dropped ({})", node, peer, reason);
                    self.record_link_event(format!(
                        "[{:?}->{:?}] DROP ({}) seq={} ack={}",
                        node, peer, reason, packet.seqnum, packet.acknum
                    ));
                    continue;
                }
                Fate::Deliver { corrupt: true } => {
                    self.record_link_event(format!(
                        "[{:?}->{:?}] CORRUPT seq={} ack={}",
                        node, peer, packet.seqnum, packet.acknum
                    ));
                    self.corrupt_packet(&mut packet);
                }
                Fate::Deliver { corrupt: false } => {}
            }

            let latency = self
                .rng
                .random_range(self.config.min_latency..=self.config.max_latency);
            self.record_link_event(format!(
                "[{:?}->{:?}] SEND seq={} ack={} (latency={})",
                node, peer, packet.seqnum, packet.acknum, latency
            ));
            self.schedule(
                self.time + latency,
                EventType::PacketArrival { to: peer, packet },
            );
        }
    }
}
