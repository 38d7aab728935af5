use serde::{Deserialize, Serialize};

/// Number of payload bytes carried by every packet and message.
pub const PAYLOAD_SIZE: usize = 20;

/// Fills header fields that a packet does not use
/// (acknum on data packets, seqnum on ACKs).
pub const NOT_IN_USE: i32 = -1;

/// Sequence numbers travel as plain integers on the wire.
pub type SeqNum = i32;

/// Application-layer unit handed to the sender and delivered by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Message {
    pub data: [u8; PAYLOAD_SIZE],
}

impl Message {
    pub fn new(data: [u8; PAYLOAD_SIZE]) -> Self {
        Self { data }
    }

    /// Build a message from arbitrary bytes, truncating or zero-padding to
    /// `PAYLOAD_SIZE`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; PAYLOAD_SIZE];
        let len = bytes.len().min(PAYLOAD_SIZE);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// A message made of one repeated byte, e.g. `aaaaaaaaaaaaaaaaaaaa`.
    pub fn filled(byte: u8) -> Self {
        Self {
            data: [byte; PAYLOAD_SIZE],
        }
    }

    /// Payload with trailing zero padding removed.
    pub fn as_trimmed(&self) -> &[u8] {
        let end = self
            .data
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        &self.data[..end]
    }

    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(self.as_trimmed()).into_owned()
    }
}

/// Fixed-layout packet exchanged over the unreliable channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub seqnum: SeqNum,
    pub acknum: SeqNum,
    pub checksum: i32,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Packet {
    /// Data packet carrying `message`. The checksum is left at zero; the
    /// protocol seals it before sending.
    pub fn data(seqnum: SeqNum, message: &Message) -> Self {
        Self {
            seqnum,
            acknum: NOT_IN_USE,
            checksum: 0,
            payload: message.data,
        }
    }

    /// Pure acknowledgment for `acknum` with an all-zero payload.
    pub fn ack(acknum: SeqNum) -> Self {
        Self {
            seqnum: NOT_IN_USE,
            acknum,
            checksum: 0,
            payload: [0u8; PAYLOAD_SIZE],
        }
    }

    pub fn is_ack(&self) -> bool {
        self.seqnum == NOT_IN_USE && self.acknum != NOT_IN_USE
    }

    pub fn message(&self) -> Message {
        Message::new(self.payload)
    }
}
