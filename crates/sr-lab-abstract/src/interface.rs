use crate::packet::{Message, Packet};

/// The capability provided by the simulator to a protocol entity.
/// Entities call these methods to reach the channel, their timer and the
/// application layer.
pub trait SystemContext {
    /// Send a packet to the network (unreliable channel).
    fn send_packet(&mut self, packet: Packet);

    /// Start a timer.
    /// `timer_id` identifies the timer within this entity.
    /// `delay` is the duration in simulator time units.
    /// Starting a timer that is already running is not a supported input;
    /// cancel before start.
    fn start_timer(&mut self, delay: u64, timer_id: u32);

    /// Cancel a running timer. Cancelling an idle timer is a no-op.
    fn cancel_timer(&mut self, timer_id: u32);

    /// Deliver an in-order message to the application layer.
    fn deliver_message(&mut self, message: Message);

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);

    /// Current simulation time.
    fn now(&self) -> u64;

    /// Record a numeric metric (window occupancy, retransmissions, ...).
    fn record_metric(&mut self, _name: &str, _value: f64) {
        // Default no-op so non-visual environments don't need to care.
    }
}

/// One input delivered to an entity. The driver hands exactly one event at
/// a time to exactly one entity and the handler runs to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityEvent {
    NewMessage(Message),
    PacketArrived(Packet),
    TimerFired(u32),
}

/// The interface every protocol entity implements.
pub trait TransportProtocol {
    /// Called once before any other event.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a packet arrives from the network.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when a timer expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32);

    /// Called when the application layer wants to send a message reliably.
    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message);

    /// Single entry point over the tagged event type.
    fn handle(&mut self, ctx: &mut dyn SystemContext, event: EntityEvent) {
        match event {
            EntityEvent::NewMessage(message) => self.on_app_data(ctx, message),
            EntityEvent::PacketArrived(packet) => self.on_packet(ctx, packet),
            EntityEvent::TimerFired(timer_id) => self.on_timer(ctx, timer_id),
        }
    }
}
