//! Tagged tunnel attributes, RFC 2868.
//!
//! VLAN assignment rides in three attributes: Tunnel-Type and
//! Tunnel-Medium-Type carry a one-byte tag followed by a 24-bit value;
//! Tunnel-Private-Group-ID carries a tag followed by the VLAN id as text.
//! A tag of 0x00 marks an untagged (single-tunnel) assignment.

use crate::attribute::{Attribute, AttributeKind};
use crate::packet::{Packet, WireError};

/// Tunnel-Type value for VLAN, RFC 3580 Section 3.31.
pub const DEFAULT_TUNNEL_TYPE: u32 = 13;
/// Tunnel-Medium-Type value for IEEE-802, RFC 3580 Section 3.32.
pub const DEFAULT_TUNNEL_MEDIUM: u32 = 6;

/// A VLAN assignment as carried on the wire.
///
/// `tunnel_type` and `medium_type` of 0 mean "use the protocol default"
/// (13/VLAN and 6/IEEE-802); [`set_tunnel_vlan`] applies the substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelVlan {
    pub id: String,
    pub tunnel_type: u32,
    pub medium_type: u32,
}

fn tagged_integer(kind: AttributeKind, tag: u8, value: u32) -> Result<Attribute, WireError> {
    if value > 0x00ff_ffff {
        return Err(WireError::Attribute(format!(
            "tagged integer out of range: {value}"
        )));
    }
    let bytes = value.to_be_bytes();
    Attribute::new(kind as u8, vec![tag, bytes[1], bytes[2], bytes[3]])
}

fn tagged_text(kind: AttributeKind, tag: u8, text: &str) -> Result<Attribute, WireError> {
    let mut value = Vec::with_capacity(1 + text.len());
    value.push(tag);
    value.extend_from_slice(text.as_bytes());
    Attribute::new(kind as u8, value)
}

fn read_tagged_integer(packet: &Packet, kind: AttributeKind) -> Option<(u8, u32)> {
    let attr = packet.find_attribute(kind as u8)?;
    if attr.value.len() != 4 {
        return None;
    }
    let value = u32::from_be_bytes([0, attr.value[1], attr.value[2], attr.value[3]]);
    Some((attr.value[0], value))
}

/// Write the three VLAN tunnel attributes into `packet`.
pub fn set_tunnel_vlan(packet: &mut Packet, tag: u8, vlan: &TunnelVlan) -> Result<(), WireError> {
    let tunnel_type = if vlan.tunnel_type != 0 {
        vlan.tunnel_type
    } else {
        DEFAULT_TUNNEL_TYPE
    };
    let medium_type = if vlan.medium_type != 0 {
        vlan.medium_type
    } else {
        DEFAULT_TUNNEL_MEDIUM
    };

    packet.add_attribute(tagged_text(AttributeKind::TunnelPrivateGroupId, tag, &vlan.id)?);
    packet.add_attribute(tagged_integer(AttributeKind::TunnelType, tag, tunnel_type)?);
    packet.add_attribute(tagged_integer(AttributeKind::TunnelMediumType, tag, medium_type)?);
    Ok(())
}

/// Tag and value of the Tunnel-Type attribute, if present.
pub fn tunnel_type(packet: &Packet) -> Option<(u8, u32)> {
    read_tagged_integer(packet, AttributeKind::TunnelType)
}

/// Tag and value of the Tunnel-Medium-Type attribute, if present.
pub fn tunnel_medium_type(packet: &Packet) -> Option<(u8, u32)> {
    read_tagged_integer(packet, AttributeKind::TunnelMediumType)
}

/// Tag and text of the Tunnel-Private-Group-ID attribute, if present.
///
/// A leading byte above 0x1F is part of the group id, not a tag
/// (RFC 2868 Section 3.6).
pub fn tunnel_private_group_id(packet: &Packet) -> Option<(u8, String)> {
    let attr = packet.find_attribute(AttributeKind::TunnelPrivateGroupId as u8)?;
    let (tag, text) = match attr.value.split_first() {
        Some((&first, rest)) if first <= 0x1f => (first, rest.to_vec()),
        _ => (0, attr.value.clone()),
    };
    String::from_utf8(text).ok().map(|id| (tag, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Code;

    fn accept() -> Packet {
        Packet::new(Code::AccessAccept, 1, [0u8; 16])
    }

    #[test]
    fn defaults_applied_for_zero_fields() {
        let mut packet = accept();
        let vlan = TunnelVlan {
            id: "20".to_string(),
            tunnel_type: 0,
            medium_type: 0,
        };
        set_tunnel_vlan(&mut packet, 0, &vlan).unwrap();

        assert_eq!(tunnel_private_group_id(&packet), Some((0, "20".to_string())));
        assert_eq!(tunnel_type(&packet), Some((0, DEFAULT_TUNNEL_TYPE)));
        assert_eq!(tunnel_medium_type(&packet), Some((0, DEFAULT_TUNNEL_MEDIUM)));
    }

    #[test]
    fn explicit_values_pass_through() {
        let mut packet = accept();
        let vlan = TunnelVlan {
            id: "30".to_string(),
            tunnel_type: 1,
            medium_type: 2,
        };
        set_tunnel_vlan(&mut packet, 3, &vlan).unwrap();

        assert_eq!(tunnel_type(&packet), Some((3, 1)));
        assert_eq!(tunnel_medium_type(&packet), Some((3, 2)));
        assert_eq!(tunnel_private_group_id(&packet), Some((3, "30".to_string())));
    }

    #[test]
    fn survives_wire_round_trip() {
        let mut packet = accept();
        let vlan = TunnelVlan {
            id: "104".to_string(),
            tunnel_type: 0,
            medium_type: 0,
        };
        set_tunnel_vlan(&mut packet, 0, &vlan).unwrap();

        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(tunnel_private_group_id(&decoded), Some((0, "104".to_string())));
        assert_eq!(tunnel_type(&decoded), Some((0, 13)));
        assert_eq!(tunnel_medium_type(&decoded), Some((0, 6)));
    }

    #[test]
    fn rejects_out_of_range_tagged_integer() {
        let mut packet = accept();
        let vlan = TunnelVlan {
            id: "1".to_string(),
            tunnel_type: 0x0100_0000,
            medium_type: 0,
        };
        assert!(set_tunnel_vlan(&mut packet, 0, &vlan).is_err());
    }
}
