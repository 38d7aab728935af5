use serde::Serialize;
use sr_lab_abstract::SystemContext;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    pub messages_submitted: u64,
    pub window_full_drops: u64,
    pub packets_sent: u64,
    pub retransmissions: u64,
    pub acks_received: u64,
    pub new_acks: u64,
    pub duplicate_acks: u64,
    pub corrupted_acks: u64,
    pub stale_acks: u64,
}

impl SenderStats {
    pub fn publish(&self, ctx: &mut dyn SystemContext, in_flight: usize) {
        ctx.record_metric("sender.in_flight", in_flight as f64);
        ctx.record_metric("sender.packets_sent", self.packets_sent as f64);
        ctx.record_metric("sender.retransmissions", self.retransmissions as f64);
        ctx.record_metric("sender.window_full_drops", self.window_full_drops as f64);
        ctx.record_metric("sender.new_acks", self.new_acks as f64);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub duplicates: u64,
    pub corrupted: u64,
    pub delivered: u64,
    pub acks_sent: u64,
}

impl ReceiverStats {
    pub fn publish(&self, ctx: &mut dyn SystemContext, buffered: usize) {
        ctx.record_metric("receiver.buffered", buffered as f64);
        ctx.record_metric("receiver.packets_received", self.packets_received as f64);
        ctx.record_metric("receiver.corrupted", self.corrupted as f64);
        ctx.record_metric("receiver.delivered", self.delivered as f64);
    }
}
