pub mod config;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use interface::{EntityEvent, SystemContext, TransportProtocol};
pub use packet::{Message, NOT_IN_USE, PAYLOAD_SIZE, Packet, SeqNum};

pub use config::{CorruptPolicy, ProtocolConfig, RetransmitPolicy, SimConfig};
pub use scenario::{
    ProtocolConfigOverride, SimConfigOverride, TestAction, TestAssertion, TestScenario,
};
