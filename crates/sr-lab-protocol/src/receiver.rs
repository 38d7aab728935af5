//! Selective-Repeat receive side.
//!
//! Every correctly received data packet is acknowledged individually. Packets
//! that land inside `[expected, expected + window_size)` are buffered; the
//! contiguous run starting at `expected` is delivered as soon as it exists.

use sr_lab_abstract::{
    CorruptPolicy, Message, Packet, ProtocolConfig, SeqNum, SystemContext, TransportProtocol,
};
use tracing::debug;

use crate::checksum;
use crate::error::{ArqError, ConfigError};
use crate::seq::SeqSpace;
use crate::stats::ReceiverStats;

pub struct SrReceiver {
    space: SeqSpace,
    policy: CorruptPolicy,
    expected: usize,
    /// Arrived-but-undelivered packets, keyed by sequence number.
    slots: Vec<Option<Packet>>,
    last_delivered: Option<SeqNum>,
    stats: ReceiverStats,
}

impl SrReceiver {
    pub fn new(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        let space = SeqSpace::from_config(config)?;
        Ok(Self {
            space,
            policy: config.corrupt_policy,
            expected: 0,
            slots: vec![None; space.size()],
            last_delivered: None,
            stats: ReceiverStats::default(),
        })
    }

    pub fn reset(&mut self) {
        self.expected = 0;
        self.slots.fill(None);
        self.last_delivered = None;
        self.stats = ReceiverStats::default();
    }

    pub fn expected(&self) -> SeqNum {
        self.space.seq(self.expected)
    }

    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Process an incoming data packet. Returns the number of messages
    /// delivered to the application as a result.
    pub fn accept(
        &mut self,
        ctx: &mut dyn SystemContext,
        packet: &Packet,
    ) -> Result<usize, ArqError> {
        if checksum::is_corrupted(packet) {
            self.stats.corrupted += 1;
            if self.policy == CorruptPolicy::ReAckLastDelivered
                && let Some(last) = self.last_delivered
            {
                self.send_ack(ctx, last);
            }
            return Err(ArqError::Corrupted {
                seqnum: packet.seqnum,
                acknum: packet.acknum,
            });
        }

        let Some(idx) = self.space.index(packet.seqnum) else {
            return Err(ArqError::SeqOutOfRange {
                seqnum: packet.seqnum,
                seq_space: self.space.size(),
            });
        };

        self.send_ack(ctx, packet.seqnum);

        let in_window = self.space.distance(self.expected, idx) < self.space.window();
        if in_window && self.slots[idx].is_none() {
            ctx.log(&format!("SR packet {} correctly received", packet.seqnum));
            self.slots[idx] = Some(*packet);
            self.stats.packets_received += 1;
        } else {
            ctx.log(&format!(
                "SR duplicate packet {} (expecting {})",
                packet.seqnum,
                self.expected()
            ));
            self.stats.duplicates += 1;
        }

        Ok(self.deliver_in_order(ctx))
    }

    fn send_ack(&mut self, ctx: &mut dyn SystemContext, acknum: SeqNum) {
        ctx.send_packet(checksum::seal(Packet::ack(acknum)));
        self.stats.acks_sent += 1;
    }

    fn deliver_in_order(&mut self, ctx: &mut dyn SystemContext) -> usize {
        let mut delivered = 0;
        while let Some(packet) = self.slots[self.expected].take() {
            ctx.deliver_message(packet.message());
            self.last_delivered = Some(packet.seqnum);
            self.expected = self.space.next(self.expected);
            delivered += 1;
        }
        if delivered > 0 {
            debug!(expected = self.expected, delivered, "receive window advanced");
        }
        self.stats.delivered += delivered as u64;
        delivered
    }
}

impl TransportProtocol for SrReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "SR receiver ready (window={}, seq space={})",
            self.space.window(),
            self.space.size()
        ));
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if let Err(err) = self.accept(ctx, &packet) {
            ctx.log(&format!("SR receiver rejecting packet: {err}"));
        }
        self.stats.publish(ctx, self.buffered());
    }

    // Unidirectional transfer: the receiver never originates data and
    // never arms a timer.
    fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}

    fn on_app_data(&mut self, _ctx: &mut dyn SystemContext, _message: Message) {}
}
