use serde::Serialize;
use sr_lab_abstract::{Message, SimConfig};
use std::collections::HashMap;

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration: u64,
    pub delivered: Vec<Message>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub remaining_events: usize,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    /// Delivered payloads as text, zero padding stripped.
    pub fn delivered_text(&self) -> Vec<String> {
        self.delivered.iter().map(Message::to_text).collect()
    }

    pub fn last_metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .and_then(|series| series.last())
            .map(|&(_, value)| value)
    }
}
