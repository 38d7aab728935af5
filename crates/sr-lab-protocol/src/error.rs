use sr_lab_abstract::SeqNum;
use thiserror::Error;

/// Conditions an entity detects while handling an event. None of them is
/// fatal: the entity logs the condition and keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArqError {
    #[error("checksum mismatch (seqnum={seqnum}, acknum={acknum})")]
    Corrupted { seqnum: SeqNum, acknum: SeqNum },

    #[error("send window full ({window_size} packets in flight)")]
    WindowFull { window_size: usize },

    #[error("duplicate ACK {acknum}")]
    DuplicateAck { acknum: SeqNum },

    #[error("ACK {acknum} outside window starting at {base}")]
    AckOutsideWindow { acknum: SeqNum, base: SeqNum },

    #[error("sequence number {seqnum} outside sequence space 0..{seq_space}")]
    SeqOutOfRange { seqnum: SeqNum, seq_space: usize },
}

/// Rejected entity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    EmptyWindow,

    #[error(
        "sequence space {seq_space} is smaller than twice the window size {window_size}; \
         new and old packets would alias"
    )]
    SequenceSpaceTooSmall { window_size: usize, seq_space: usize },

    #[error("sequence space {seq_space} does not fit the wire sequence field")]
    SequenceSpaceTooLarge { seq_space: usize },

    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
}
