use crate::packet::Packet;
use rand::Rng;

/// Generate a random Request Authenticator, RFC 2865 Section 3.
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut authenticator = [0u8; 16];
    rand::rng().fill(&mut authenticator);
    authenticator
}

/// Response Authenticator, RFC 2865 Section 3:
///
/// MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> [u8; 16] {
    let length = packet.length();

    let mut data = Vec::with_capacity(length + secret.len());
    data.push(packet.code.as_u8());
    data.push(packet.identifier);
    data.push((length >> 8) as u8);
    data.push((length & 0xff) as u8);
    data.extend_from_slice(request_authenticator);
    for attr in &packet.attributes {
        // Attributes were validated on construction, encoding cannot fail here.
        if let Ok(encoded) = attr.encode() {
            data.extend_from_slice(&encoded);
        }
    }
    data.extend_from_slice(secret);

    md5::compute(&data).0
}

/// Check a response packet's authenticator against the originating request.
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        == response.authenticator
}

/// Encrypt a User-Password value, RFC 2865 Section 5.2.
///
/// The password is zero-padded to a multiple of 16 bytes; each block is
/// XORed with MD5(secret + previous ciphertext block), seeded with the
/// Request Authenticator.
pub fn encrypt_user_password(password: &str, secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.as_bytes().to_vec();
    let remainder = padded.len() % 16;
    if remainder != 0 || padded.is_empty() {
        padded.resize(padded.len() + 16 - remainder, 0);
    }

    let mut result = Vec::with_capacity(padded.len());
    let mut previous: Vec<u8> = authenticator.to_vec();

    for chunk in padded.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(&previous);
        let hash = md5::compute(&data);

        let mut block = [0u8; 16];
        for (i, byte) in block.iter_mut().enumerate() {
            *byte = chunk[i] ^ hash.0[i];
        }

        previous = block.to_vec();
        result.extend_from_slice(&block);
    }

    result
}

/// Decrypt a User-Password value, RFC 2865 Section 5.2.
pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<String, String> {
    if encrypted.is_empty() || encrypted.len() % 16 != 0 {
        return Err("invalid encrypted password length".to_string());
    }

    let mut result = Vec::with_capacity(encrypted.len());
    let mut previous: Vec<u8> = authenticator.to_vec();

    for chunk in encrypted.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(&previous);
        let hash = md5::compute(&data);

        for (i, byte) in chunk.iter().enumerate() {
            result.push(byte ^ hash.0[i]);
        }

        previous = chunk.to_vec();
    }

    // Strip the zero padding.
    while result.last() == Some(&0) {
        result.pop();
    }

    String::from_utf8(result).map_err(|e| format!("invalid UTF-8 in password: {e}"))
}
