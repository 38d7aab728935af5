use sr_lab_abstract::{Message, Packet, SystemContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOp {
    Start(u64, u32),
    Cancel(u32),
}

/// Captures every side effect an entity requests so tests can inspect them.
#[derive(Default)]
pub struct RecordingContext {
    pub sent: Vec<Packet>,
    pub timer_ops: Vec<TimerOp>,
    pub delivered: Vec<Message>,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
    pub now: u64,
}

impl RecordingContext {
    pub fn take_sent(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }

    pub fn sent_seqnums(&self) -> Vec<i32> {
        self.sent.iter().map(|p| p.seqnum).collect()
    }

    pub fn sent_acknums(&self) -> Vec<i32> {
        self.sent.iter().map(|p| p.acknum).collect()
    }

    pub fn delivered_first_bytes(&self) -> Vec<u8> {
        self.delivered.iter().map(|m| m.data[0]).collect()
    }
}

impl SystemContext for RecordingContext {
    fn send_packet(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn start_timer(&mut self, delay: u64, timer_id: u32) {
        self.timer_ops.push(TimerOp::Start(delay, timer_id));
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.timer_ops.push(TimerOp::Cancel(timer_id));
    }

    fn deliver_message(&mut self, message: Message) {
        self.delivered.push(message);
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}
