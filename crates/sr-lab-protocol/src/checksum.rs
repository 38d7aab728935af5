//! Additive integrity code shared by both entities.
//!
//! The sum covers `seqnum`, `acknum` and every payload byte taken as an
//! unsigned value. It catches any single-field mutation made after the
//! checksum was computed; it is not a cryptographic digest and two
//! compensating changes can collide.

use sr_lab_abstract::Packet;

pub fn compute(packet: &Packet) -> i32 {
    packet
        .payload
        .iter()
        .fold(packet.seqnum.wrapping_add(packet.acknum), |sum, &b| {
            sum.wrapping_add(i32::from(b))
        })
}

pub fn is_corrupted(packet: &Packet) -> bool {
    packet.checksum != compute(packet)
}

/// Fill in the checksum field of a freshly built packet.
pub fn seal(mut packet: Packet) -> Packet {
    packet.checksum = compute(&packet);
    packet
}
