#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Hello wire codec.
//!
//! This is the interop boundary between group members: every node must
//! produce and accept the same octets or elections silently fail. The frame
//! is a fixed 11-octet prefix followed by a variable forwarder section:
//!
//! ```text
//! [0]      version (currently 1)
//! [1]      role (listen=0 / active=1 / standby=2)
//! [2..4]   group id, big-endian
//! [4]      priority
//! [5]      weight
//! [6..10]  virtual IPv4
//! [10]     forwarder count N
//! [11..]   N records of [id][weight][mac(6)]
//! ```
//!
//! Bytes beyond the declared forwarder section are ignored on decode.

use bytes::{Buf, BufMut};
use std::net::Ipv4Addr;
use thiserror::Error;

use vgw_core::{ForwarderTlv, HelloFrame, MacAddr, Role};

/// Wire version this codec speaks.
pub const VERSION: u8 = 1;
/// Fixed prefix length.
pub const HEADER_LEN: usize = 11;
/// Length of one forwarder record.
pub const TLV_LEN: usize = 8;

/// Decode failure kinds. Frames failing here are dropped by the receive
/// path without further processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer shorter than the fixed prefix or the declared forwarder section.
    #[error("truncated hello frame")]
    Truncated,
    /// First octet is not a version this codec speaks.
    #[error("unsupported hello version {0}")]
    UnsupportedVersion(u8),
}

/// Encode a Hello into its wire form, `HEADER_LEN + TLV_LEN * N` octets.
///
/// At most 255 records are encoded; forwarder ids are unique `u8` values so
/// a conforming group can never carry more.
pub fn encode(frame: &HelloFrame) -> Vec<u8> {
    let count = frame.forwarders.len().min(u8::MAX as usize);
    let mut buf = Vec::with_capacity(HEADER_LEN + TLV_LEN * count);
    buf.put_u8(VERSION);
    buf.put_u8(frame.role.to_wire());
    buf.put_u16(frame.group_id);
    buf.put_u8(frame.priority);
    buf.put_u8(frame.weight);
    buf.put_slice(&frame.virtual_ip.octets());
    buf.put_u8(count as u8);
    for tlv in &frame.forwarders[..count] {
        buf.put_u8(tlv.id);
        buf.put_u8(tlv.weight);
        buf.put_slice(&tlv.mac.octets());
    }
    buf
}

/// Decode a Hello from wire bytes.
pub fn decode(mut buf: &[u8]) -> Result<HelloFrame, CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::Truncated);
    }
    let version = buf.get_u8();
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let role = Role::from_wire(buf.get_u8());
    let group_id = buf.get_u16();
    let priority = buf.get_u8();
    let weight = buf.get_u8();
    let virtual_ip = Ipv4Addr::from(buf.get_u32());
    let count = buf.get_u8() as usize;
    if buf.len() < TLV_LEN * count {
        return Err(CodecError::Truncated);
    }
    let mut forwarders = Vec::with_capacity(count);
    for _ in 0..count {
        let id = buf.get_u8();
        let weight = buf.get_u8();
        let mut mac = [0u8; 6];
        buf.copy_to_slice(&mut mac);
        forwarders.push(ForwarderTlv {
            id,
            weight,
            mac: MacAddr::new(mac),
        });
    }
    Ok(HelloFrame {
        role,
        group_id,
        priority,
        weight,
        virtual_ip,
        forwarders,
    })
}
