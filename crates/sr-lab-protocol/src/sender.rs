//! Selective-Repeat send side.
//!
//! [`SrSender`] keeps up to `window_size` data packets in flight. Each slot
//! of the sequence space is acknowledged individually; the window base only
//! moves once the packet sitting at it has been acknowledged, and then jumps
//! over every acknowledged slot behind it.
//!
//! ```text
//!   base                next_seq
//!    |                     |
//! ---+---------------------+-------------------> seq space (mod seq_space)
//!    |<---- in flight ---->|<--- sendable --->|
//!    |<------------- window_size ------------>|
//! ```

use sr_lab_abstract::{
    Message, Packet, ProtocolConfig, RetransmitPolicy, SeqNum, SystemContext, TransportProtocol,
};
use tracing::debug;

use crate::checksum;
use crate::error::{ArqError, ConfigError};
use crate::seq::SeqSpace;
use crate::stats::SenderStats;
use crate::timer::RetransmitTimer;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    /// Buffered copy of the sent packet; `None` means the slot is free.
    packet: Option<Packet>,
    acked: bool,
}

impl Slot {
    fn is_outstanding(&self) -> bool {
        self.packet.is_some() && !self.acked
    }
}

pub struct SrSender {
    space: SeqSpace,
    policy: RetransmitPolicy,
    base: usize,
    next_seq: usize,
    slots: Vec<Slot>,
    timer: RetransmitTimer,
    stats: SenderStats,
}

impl SrSender {
    pub fn new(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        let space = SeqSpace::from_config(config)?;
        Ok(Self {
            space,
            policy: config.retransmit_policy,
            base: 0,
            next_seq: 0,
            slots: vec![Slot::default(); space.size()],
            timer: RetransmitTimer::new(config.timeout),
            stats: SenderStats::default(),
        })
    }

    /// Return to the freshly initialized state.
    pub fn reset(&mut self) {
        self.base = 0;
        self.next_seq = 0;
        self.slots.fill(Slot::default());
        self.timer.reset();
        self.stats = SenderStats::default();
    }

    pub fn base(&self) -> SeqNum {
        self.space.seq(self.base)
    }

    pub fn next_seq(&self) -> SeqNum {
        self.space.seq(self.next_seq)
    }

    /// Sequence numbers handed out but not yet slid past.
    pub fn in_flight(&self) -> usize {
        self.space.distance(self.base, self.next_seq)
    }

    /// Sent-but-unacknowledged packets in the window.
    pub fn outstanding(&self) -> usize {
        self.space
            .run(self.base, self.in_flight())
            .filter(|&idx| self.slots[idx].is_outstanding())
            .count()
    }

    pub fn is_window_full(&self) -> bool {
        self.in_flight() >= self.space.window()
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Admit a new message into the window and put it on the wire.
    ///
    /// A full window rejects the message without touching window state; the
    /// application owns any retry.
    pub fn submit(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: &Message,
    ) -> Result<SeqNum, ArqError> {
        self.stats.messages_submitted += 1;
        if self.is_window_full() {
            self.stats.window_full_drops += 1;
            return Err(ArqError::WindowFull {
                window_size: self.space.window(),
            });
        }

        let was_idle = self.in_flight() == 0;
        let seqnum = self.space.seq(self.next_seq);
        let packet = checksum::seal(Packet::data(seqnum, message));
        self.slots[self.next_seq] = Slot {
            packet: Some(packet),
            acked: false,
        };

        ctx.log(&format!("SR send packet {seqnum}"));
        ctx.send_packet(packet);
        self.stats.packets_sent += 1;

        if was_idle {
            self.timer.start(ctx);
        }
        self.next_seq = self.space.next(self.next_seq);
        Ok(seqnum)
    }

    /// Process an incoming ACK. Returns how many positions the window slid.
    pub fn handle_ack(
        &mut self,
        ctx: &mut dyn SystemContext,
        packet: &Packet,
    ) -> Result<usize, ArqError> {
        if checksum::is_corrupted(packet) {
            self.stats.corrupted_acks += 1;
            return Err(ArqError::Corrupted {
                seqnum: packet.seqnum,
                acknum: packet.acknum,
            });
        }
        self.stats.acks_received += 1;

        let in_flight = self.in_flight();
        let idx = match self.space.index(packet.acknum) {
            Some(idx) if self.space.distance(self.base, idx) < in_flight => idx,
            _ => {
                self.stats.stale_acks += 1;
                return Err(ArqError::AckOutsideWindow {
                    acknum: packet.acknum,
                    base: self.base(),
                });
            }
        };

        if self.slots[idx].acked {
            self.stats.duplicate_acks += 1;
            return Err(ArqError::DuplicateAck {
                acknum: packet.acknum,
            });
        }
        self.slots[idx].acked = true;
        self.stats.new_acks += 1;
        ctx.log(&format!("SR ACK {} is not a duplicate", packet.acknum));

        let mut slid = 0;
        while self.base != self.next_seq && self.slots[self.base].acked {
            self.slots[self.base] = Slot::default();
            self.base = self.space.next(self.base);
            slid += 1;
        }
        if slid > 0 {
            debug!(base = self.base, slid, "send window advanced");
        }

        self.timer.stop(ctx);
        if self.outstanding() > 0 {
            self.timer.start(ctx);
        }
        Ok(slid)
    }

    /// Retransmit after the timer fired. Returns the number of packets resent.
    pub fn handle_timeout(&mut self, ctx: &mut dyn SystemContext) -> usize {
        let pending: Vec<usize> = self
            .space
            .run(self.base, self.in_flight())
            .filter(|&idx| self.slots[idx].is_outstanding())
            .collect();
        if pending.is_empty() {
            debug!("timeout with nothing outstanding");
            return 0;
        }

        let resend = match self.policy {
            RetransmitPolicy::AllOutstanding => &pending[..],
            RetransmitPolicy::OldestOnly => &pending[..1],
        };
        for &idx in resend {
            if let Some(packet) = self.slots[idx].packet {
                ctx.log(&format!("SR timeout, resending packet {}", packet.seqnum));
                ctx.send_packet(packet);
                self.stats.retransmissions += 1;
            }
        }

        self.timer.restart(ctx);
        resend.len()
    }
}

impl TransportProtocol for SrSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "SR sender ready (window={}, seq space={})",
            self.space.window(),
            self.space.size()
        ));
    }

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message) {
        if let Err(err) = self.submit(ctx, &message) {
            ctx.log(&format!("SR sender dropping message: {err}"));
        }
        self.stats.publish(ctx, self.in_flight());
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        match self.handle_ack(ctx, &packet) {
            Ok(slid) => debug!(acknum = packet.acknum, slid, "ACK accepted"),
            Err(err) => ctx.log(&format!("SR sender ignoring ACK: {err}")),
        }
        self.stats.publish(ctx, self.in_flight());
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        if !self.timer.expire(timer_id) {
            debug!(timer_id, "ignoring stale timer expiry");
            return;
        }
        self.handle_timeout(ctx);
        self.stats.publish(ctx, self.in_flight());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingContext, TimerOp};
    use crate::timer::RETRANSMIT_TIMER;
    use sr_lab_abstract::{EntityEvent, NOT_IN_USE};

    fn sender(window_size: usize, seq_space: usize) -> SrSender {
        let config = ProtocolConfig {
            window_size,
            seq_space,
            ..Default::default()
        };
        SrSender::new(&config).unwrap()
    }

    fn msg(byte: u8) -> Message {
        Message::filled(byte)
    }

    fn ack(acknum: SeqNum) -> Packet {
        checksum::seal(Packet::ack(acknum))
    }

    #[test]
    fn rejects_aliasing_sequence_space() {
        let config = ProtocolConfig {
            window_size: 6,
            seq_space: 7,
            ..Default::default()
        };
        assert!(matches!(
            SrSender::new(&config),
            Err(ConfigError::SequenceSpaceTooSmall { .. })
        ));
    }

    #[test]
    fn submit_builds_sealed_data_packet_and_starts_timer_once() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);

        assert_eq!(tx.submit(&mut ctx, &msg(b'a')), Ok(0));
        assert_eq!(tx.submit(&mut ctx, &msg(b'b')), Ok(1));

        assert_eq!(ctx.sent_seqnums(), vec![0, 1]);
        assert!(ctx.sent.iter().all(|p| p.acknum == NOT_IN_USE));
        assert!(ctx.sent.iter().all(|p| !checksum::is_corrupted(p)));
        assert_eq!(ctx.timer_ops, vec![TimerOp::Start(16, RETRANSMIT_TIMER)]);
        assert_eq!(tx.next_seq(), 2);
        assert_eq!(tx.outstanding(), 2);
    }

    #[test]
    fn full_window_rejects_without_touching_state() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(3, 6);
        for b in b"abc" {
            tx.submit(&mut ctx, &msg(*b)).unwrap();
        }
        let sent_before = ctx.sent.len();

        assert_eq!(
            tx.submit(&mut ctx, &msg(b'd')),
            Err(ArqError::WindowFull { window_size: 3 })
        );
        assert_eq!(ctx.sent.len(), sent_before);
        assert_eq!(tx.base(), 0);
        assert_eq!(tx.next_seq(), 3);
        assert_eq!(tx.stats().window_full_drops, 1);
    }

    #[test]
    fn selective_ack_holds_base_until_hole_fills() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        for b in b"abc" {
            tx.submit(&mut ctx, &msg(*b)).unwrap();
        }

        assert_eq!(tx.handle_ack(&mut ctx, &ack(1)), Ok(0));
        assert_eq!(tx.handle_ack(&mut ctx, &ack(2)), Ok(0));
        assert_eq!(tx.base(), 0);
        assert_eq!(tx.outstanding(), 1);

        assert_eq!(tx.handle_ack(&mut ctx, &ack(0)), Ok(3));
        assert_eq!(tx.base(), 3);
        assert_eq!(tx.outstanding(), 0);
        assert!(!tx.is_timer_running());
    }

    #[test]
    fn repeated_ack_is_idempotent() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        for b in b"ab" {
            tx.submit(&mut ctx, &msg(*b)).unwrap();
        }

        tx.handle_ack(&mut ctx, &ack(1)).unwrap();
        let ops_before = ctx.timer_ops.len();
        assert_eq!(
            tx.handle_ack(&mut ctx, &ack(1)),
            Err(ArqError::DuplicateAck { acknum: 1 })
        );
        assert_eq!(ctx.timer_ops.len(), ops_before);
        assert_eq!((tx.base(), tx.next_seq(), tx.outstanding()), (0, 2, 1));

        // Once slid past, the same ACK falls outside the window.
        tx.handle_ack(&mut ctx, &ack(0)).unwrap();
        assert_eq!(
            tx.handle_ack(&mut ctx, &ack(0)),
            Err(ArqError::AckOutsideWindow { acknum: 0, base: 2 })
        );
        assert_eq!((tx.base(), tx.next_seq()), (2, 2));
    }

    #[test]
    fn corrupted_ack_never_advances_base() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        tx.submit(&mut ctx, &msg(b'a')).unwrap();

        let mut bad = ack(0);
        bad.payload[3] = b'z';
        assert!(matches!(
            tx.handle_ack(&mut ctx, &bad),
            Err(ArqError::Corrupted { .. })
        ));
        let mut bad = ack(0);
        bad.acknum = 999_999;
        assert!(tx.handle_ack(&mut ctx, &bad).is_err());

        assert_eq!(tx.base(), 0);
        assert_eq!(tx.outstanding(), 1);
        assert_eq!(tx.stats().corrupted_acks, 2);
    }

    #[test]
    fn ack_for_unsent_sequence_is_ignored() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        tx.submit(&mut ctx, &msg(b'a')).unwrap();

        assert!(matches!(
            tx.handle_ack(&mut ctx, &ack(4)),
            Err(ArqError::AckOutsideWindow { .. })
        ));
        assert!(matches!(
            tx.handle_ack(&mut ctx, &ack(40)),
            Err(ArqError::AckOutsideWindow { .. })
        ));
        assert_eq!(tx.stats().stale_acks, 2);
    }

    #[test]
    fn full_wrap_returns_window_to_initial_shape() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);

        for round in 0..12u8 {
            let seq = tx.submit(&mut ctx, &msg(b'a' + round)).unwrap();
            assert_eq!(seq, SeqNum::from(round));
            tx.handle_ack(&mut ctx, &ack(seq)).unwrap();
        }

        assert_eq!(tx.base(), tx.next_seq());
        assert_eq!(tx.base(), 0);
        assert_eq!(tx.outstanding(), 0);
        assert!(tx.slots.iter().all(|s| s.packet.is_none() && !s.acked));
        assert_eq!(tx.submit(&mut ctx, &msg(b'm')), Ok(0));
    }

    #[test]
    fn window_bound_holds_across_wrap_with_holes() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        for round in 0..40u8 {
            let _ = tx.submit(&mut ctx, &msg(round));
            assert!(tx.outstanding() <= 6);
            assert!(tx.in_flight() <= 6);
            // Acknowledge everything except the base to keep a hole open,
            // then fill it every fourth round.
            let base = tx.base();
            for seq in ctx.take_sent().iter().map(|p| p.seqnum) {
                if seq != base || round % 4 == 0 {
                    let _ = tx.handle_ack(&mut ctx, &ack(seq));
                }
            }
            if round % 4 == 0 {
                let _ = tx.handle_ack(&mut ctx, &ack(base));
            }
        }
    }

    #[test]
    fn timeout_resends_every_outstanding_packet() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        tx.submit(&mut ctx, &msg(b'a')).unwrap();
        tx.submit(&mut ctx, &msg(b'b')).unwrap();
        ctx.take_sent();

        tx.on_timer(&mut ctx, RETRANSMIT_TIMER);
        assert_eq!(ctx.sent_seqnums(), vec![0, 1]);
        assert_eq!(tx.stats().retransmissions, 2);
        assert!(tx.is_timer_running());

        // An ACK for one of them must not suppress the other's resend.
        tx.handle_ack(&mut ctx, &ack(0)).unwrap();
        ctx.take_sent();
        tx.on_timer(&mut ctx, RETRANSMIT_TIMER);
        assert_eq!(ctx.sent_seqnums(), vec![1]);
        assert_eq!(tx.stats().retransmissions, 3);
    }

    #[test]
    fn timeout_skips_acked_holes() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        for b in b"abc" {
            tx.submit(&mut ctx, &msg(*b)).unwrap();
        }
        tx.handle_ack(&mut ctx, &ack(1)).unwrap();
        ctx.take_sent();

        assert_eq!(tx.handle_timeout(&mut ctx), 2);
        assert_eq!(ctx.sent_seqnums(), vec![0, 2]);
    }

    #[test]
    fn oldest_only_policy_resends_base() {
        let config = ProtocolConfig {
            retransmit_policy: RetransmitPolicy::OldestOnly,
            ..Default::default()
        };
        let mut ctx = RecordingContext::default();
        let mut tx = SrSender::new(&config).unwrap();
        for b in b"abc" {
            tx.submit(&mut ctx, &msg(*b)).unwrap();
        }
        ctx.take_sent();

        assert_eq!(tx.handle_timeout(&mut ctx), 1);
        assert_eq!(ctx.sent_seqnums(), vec![0]);
    }

    #[test]
    fn timeout_with_nothing_outstanding_is_noop() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        assert_eq!(tx.handle_timeout(&mut ctx), 0);
        tx.on_timer(&mut ctx, RETRANSMIT_TIMER);
        assert!(ctx.sent.is_empty());
        assert!(ctx.timer_ops.is_empty());
        assert_eq!(tx.stats().retransmissions, 0);
    }

    #[test]
    fn timer_tracks_outstanding_packets() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        tx.submit(&mut ctx, &msg(b'a')).unwrap();
        tx.submit(&mut ctx, &msg(b'b')).unwrap();

        tx.handle_ack(&mut ctx, &ack(0)).unwrap();
        assert!(tx.is_timer_running());
        tx.handle_ack(&mut ctx, &ack(1)).unwrap();
        assert!(!tx.is_timer_running());

        assert_eq!(
            ctx.timer_ops,
            vec![
                TimerOp::Start(16, RETRANSMIT_TIMER),
                TimerOp::Cancel(RETRANSMIT_TIMER),
                TimerOp::Start(16, RETRANSMIT_TIMER),
                TimerOp::Cancel(RETRANSMIT_TIMER),
            ]
        );
    }

    #[test]
    fn init_clears_previous_state() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(6, 12);
        tx.handle(&mut ctx, EntityEvent::NewMessage(msg(b'a')));
        tx.handle(&mut ctx, EntityEvent::NewMessage(msg(b'b')));

        tx.init(&mut ctx);
        assert_eq!((tx.base(), tx.next_seq(), tx.outstanding()), (0, 0, 0));
        assert!(!tx.is_timer_running());
        assert_eq!(tx.stats(), &SenderStats::default());
    }
}
