//! Message-Authenticator support, RFC 2869 Section 5.14.
//!
//! The Message-Authenticator attribute is HMAC-MD5 over the whole packet
//! with the attribute's own value set to zeros during calculation. Clients
//! are not required to send it for plain PAP requests, but when present it
//! must verify before the packet is acted on.

use crate::attribute::{Attribute, AttributeKind};
use crate::packet::{Packet, WireError};
use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

/// HMAC-MD5 over the encoded packet with Message-Authenticator zeroed.
pub fn calculate_message_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], WireError> {
    let mut zeroed = packet.clone();
    for attr in &mut zeroed.attributes {
        if attr.kind == AttributeKind::MessageAuthenticator as u8 {
            attr.value = vec![0u8; 16];
        }
    }

    let bytes = zeroed.encode()?;
    let mut mac = HmacMd5::new_from_slice(secret)
        .map_err(|e| WireError::Attribute(format!("invalid HMAC key: {e}")))?;
    mac.update(&bytes);

    let mut digest = [0u8; 16];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    Ok(digest)
}

/// Verify the packet's Message-Authenticator attribute, when present.
///
/// Returns `Ok(true)` when the attribute is absent (nothing to verify) or
/// matches; `Ok(false)` when it is present and wrong or malformed.
pub fn verify_message_authenticator(packet: &Packet, secret: &[u8]) -> Result<bool, WireError> {
    let Some(attr) = packet.find_attribute(AttributeKind::MessageAuthenticator as u8) else {
        return Ok(true);
    };
    if attr.value.len() != 16 {
        return Ok(false);
    }

    let expected = calculate_message_authenticator(packet, secret)?;
    Ok(attr.value == expected)
}

/// Append a freshly computed Message-Authenticator to the packet.
pub fn sign_message_authenticator(packet: &mut Packet, secret: &[u8]) -> Result<(), WireError> {
    packet.add_attribute(Attribute::new(
        AttributeKind::MessageAuthenticator as u8,
        vec![0u8; 16],
    )?);
    let digest = calculate_message_authenticator(packet, secret)?;
    if let Some(attr) = packet
        .attributes
        .iter_mut()
        .rfind(|a| a.kind == AttributeKind::MessageAuthenticator as u8)
    {
        attr.value = digest.to_vec();
    }
    Ok(())
}
