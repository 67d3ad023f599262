use crate::packet::WireError;

/// RADIUS attribute in TLV form, RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: u8,
    pub value: Vec<u8>,
}

impl Attribute {
    /// Type + length octets.
    pub const HEADER_LENGTH: usize = 2;
    /// Maximum on-wire length, including the header.
    pub const MAX_LENGTH: usize = 255;
    /// Maximum payload length.
    pub const MAX_VALUE_LENGTH: usize = 253;

    pub fn new(kind: u8, value: Vec<u8>) -> Result<Self, WireError> {
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(WireError::Attribute(format!(
                "value too long: {} bytes (max {})",
                value.len(),
                Self::MAX_VALUE_LENGTH
            )));
        }
        Ok(Attribute { kind, value })
    }

    pub fn string(kind: u8, value: impl Into<String>) -> Result<Self, WireError> {
        Self::new(kind, value.into().into_bytes())
    }

    /// 32-bit big-endian integer attribute.
    pub fn integer(kind: u8, value: u32) -> Result<Self, WireError> {
        Self::new(kind, value.to_be_bytes().to_vec())
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let length = self.encoded_length();
        if length > Self::MAX_LENGTH {
            return Err(WireError::Attribute(format!(
                "encoded attribute too long: {length} bytes"
            )));
        }

        let mut buffer = Vec::with_capacity(length);
        buffer.push(self.kind);
        buffer.push(length as u8);
        buffer.extend_from_slice(&self.value);
        Ok(buffer)
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < Self::HEADER_LENGTH {
            return Err(WireError::Attribute(format!(
                "attribute data too short: {} bytes",
                data.len()
            )));
        }

        let kind = data[0];
        let length = data[1] as usize;

        if !(Self::HEADER_LENGTH..=Self::MAX_LENGTH).contains(&length) {
            return Err(WireError::Attribute(format!(
                "invalid attribute length: {length}"
            )));
        }
        if data.len() < length {
            return Err(WireError::Attribute(format!(
                "insufficient data for attribute: expected {length}, got {}",
                data.len()
            )));
        }

        Ok(Attribute {
            kind,
            value: data[Self::HEADER_LENGTH..length].to_vec(),
        })
    }

    pub fn encoded_length(&self) -> usize {
        Self::HEADER_LENGTH + self.value.len()
    }

    pub fn as_text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.value.clone())
    }

    pub fn as_integer(&self) -> Result<u32, WireError> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().map_err(|_| {
            WireError::Attribute(format!("expected 4 bytes for integer, got {}", self.value.len()))
        })?;
        Ok(u32::from_be_bytes(bytes))
    }
}

/// The attribute types a MAC-auth VLAN server deals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeKind {
    /// User-Name (1) - RFC 2865
    UserName = 1,
    /// User-Password (2) - RFC 2865
    UserPassword = 2,
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4,
    /// Service-Type (6) - RFC 2865
    ServiceType = 6,
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18,
    /// State (24) - RFC 2865
    State = 24,
    /// Vendor-Specific (26) - RFC 2865
    VendorSpecific = 26,
    /// Called-Station-Id (30) - RFC 2865
    CalledStationId = 30,
    /// Calling-Station-Id (31) - RFC 2865; carries the station MAC in MAC-auth
    CallingStationId = 31,
    /// NAS-Identifier (32) - RFC 2865
    NasIdentifier = 32,
    /// Proxy-State (33) - RFC 2865
    ProxyState = 33,
    /// Event-Timestamp (55) - RFC 2869
    EventTimestamp = 55,
    /// NAS-Port-Type (61) - RFC 2865
    NasPortType = 61,
    /// Tunnel-Type (64) - RFC 2868
    TunnelType = 64,
    /// Tunnel-Medium-Type (65) - RFC 2868
    TunnelMediumType = 65,
    /// Message-Authenticator (80) - RFC 2869
    MessageAuthenticator = 80,
    /// Tunnel-Private-Group-ID (81) - RFC 2868; carries the VLAN id
    TunnelPrivateGroupId = 81,
}

impl AttributeKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AttributeKind::UserName),
            2 => Some(AttributeKind::UserPassword),
            4 => Some(AttributeKind::NasIpAddress),
            6 => Some(AttributeKind::ServiceType),
            18 => Some(AttributeKind::ReplyMessage),
            24 => Some(AttributeKind::State),
            26 => Some(AttributeKind::VendorSpecific),
            30 => Some(AttributeKind::CalledStationId),
            31 => Some(AttributeKind::CallingStationId),
            32 => Some(AttributeKind::NasIdentifier),
            33 => Some(AttributeKind::ProxyState),
            55 => Some(AttributeKind::EventTimestamp),
            61 => Some(AttributeKind::NasPortType),
            64 => Some(AttributeKind::TunnelType),
            65 => Some(AttributeKind::TunnelMediumType),
            80 => Some(AttributeKind::MessageAuthenticator),
            81 => Some(AttributeKind::TunnelPrivateGroupId),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_attribute() {
        let attr = Attribute::string(AttributeKind::UserName as u8, "aa:bb:cc:11:22:33").unwrap();
        assert_eq!(attr.kind, 1);
        assert_eq!(attr.as_text().unwrap(), "aa:bb:cc:11:22:33");
    }

    #[test]
    fn integer_attribute() {
        let attr = Attribute::integer(AttributeKind::ServiceType as u8, 10).unwrap();
        assert_eq!(attr.as_integer().unwrap(), 10);
    }

    #[test]
    fn encode_decode_round_trip() {
        let attr = Attribute::string(AttributeKind::CallingStationId as u8, "AA-BB-CC").unwrap();
        let decoded = Attribute::decode(&attr.encode().unwrap()).unwrap();
        assert_eq!(attr, decoded);
    }

    #[test]
    fn rejects_oversized_value() {
        assert!(Attribute::new(1, vec![0u8; 254]).is_err());
    }

    #[test]
    fn rejects_bad_wire_length() {
        // Length byte of 1 is below the 2-byte header minimum.
        assert!(Attribute::decode(&[1, 1]).is_err());
    }
}
