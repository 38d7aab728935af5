use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Stop processing events scheduled after this time.
    pub time_limit: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 1,
            max_latency: 7,
            seed: 0,
            time_limit: None,
        }
    }
}

/// Which packets the sender puts back on the wire when its timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum RetransmitPolicy {
    /// Every sent-but-unacknowledged packet in the window.
    #[default]
    AllOutstanding,
    /// Only the packet at the window base.
    OldestOnly,
}

/// What the receiver does with a packet that fails its checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum CorruptPolicy {
    /// Re-acknowledge the most recently delivered sequence number.
    #[default]
    ReAckLastDelivered,
    /// Discard without answering.
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub window_size: usize,
    pub seq_space: usize,
    /// Retransmission timeout in simulator time units.
    pub timeout: u64,
    pub retransmit_policy: RetransmitPolicy,
    pub corrupt_policy: CorruptPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            seq_space: 12,
            timeout: 16,
            retransmit_policy: RetransmitPolicy::default(),
            corrupt_policy: CorruptPolicy::default(),
        }
    }
}
