//! Selective-Repeat ARQ entities.
//!
//! [`SrSender`] and [`SrReceiver`] implement [`TransportProtocol`] and can be
//! driven by any [`sr_lab_abstract::SystemContext`], the simulator engine
//! included.

pub mod checksum;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod stats;
pub mod timer;

#[cfg(test)]
mod test_support;

pub use error::{ArqError, ConfigError};
pub use receiver::SrReceiver;
pub use sender::SrSender;
pub use seq::SeqSpace;
pub use stats::{ReceiverStats, SenderStats};
pub use timer::{RETRANSMIT_TIMER, RetransmitTimer};

use sr_lab_abstract::{ProtocolConfig, TransportProtocol};

pub fn sender(config: &ProtocolConfig) -> Result<Box<dyn TransportProtocol>, ConfigError> {
    Ok(Box::new(SrSender::new(config)?))
}

pub fn receiver(config: &ProtocolConfig) -> Result<Box<dyn TransportProtocol>, ConfigError> {
    Ok(Box::new(SrReceiver::new(config)?))
}
