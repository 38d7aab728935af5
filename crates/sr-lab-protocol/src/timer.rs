use sr_lab_abstract::SystemContext;

/// Id of the sender's single retransmission timer.
pub const RETRANSMIT_TIMER: u32 = 0;

/// The sender's one logical retransmission alarm.
///
/// Tracks whether the facility timer is armed so that a start is never
/// issued on a running timer and a stop on an idle one is a no-op.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    duration: u64,
    running: bool,
}

impl RetransmitTimer {
    pub fn new(duration: u64) -> Self {
        Self {
            duration,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, ctx: &mut dyn SystemContext) {
        if self.running {
            return;
        }
        ctx.start_timer(self.duration, RETRANSMIT_TIMER);
        self.running = true;
    }

    pub fn stop(&mut self, ctx: &mut dyn SystemContext) {
        if !self.running {
            return;
        }
        ctx.cancel_timer(RETRANSMIT_TIMER);
        self.running = false;
    }

    pub fn restart(&mut self, ctx: &mut dyn SystemContext) {
        self.stop(ctx);
        self.start(ctx);
    }

    /// Consume an expiry. Returns `false` for foreign ids or an expiry that
    /// arrives while the timer is idle.
    pub fn expire(&mut self, timer_id: u32) -> bool {
        if timer_id != RETRANSMIT_TIMER || !self.running {
            return false;
        }
        self.running = false;
        true
    }

    pub fn reset(&mut self) {
        self.running = false;
    }
}
