//! RADIUS wire protocol support for MAC-authentication servers.
//!
//! Implements the parts of RFC 2865/2868/2869 a VLAN-assigning
//! authentication server needs:
//!
//! - Packet encoding and decoding with length validation
//! - The attribute set used for MAC-auth (User-Name, User-Password,
//!   Calling-Station-Id, ...)
//! - Request/Response Authenticator calculation and the User-Password
//!   block cipher
//! - Message-Authenticator (HMAC-MD5) verification
//! - Tagged tunnel attributes carrying VLAN assignments
//!
//! # Example
//!
//! ```rust
//! use radius_wire::{Attribute, AttributeKind, Code, Packet};
//! use radius_wire::auth::{encrypt_user_password, generate_request_authenticator};
//!
//! let authenticator = generate_request_authenticator();
//! let mut request = Packet::new(Code::AccessRequest, 7, authenticator);
//! request.add_attribute(
//!     Attribute::string(AttributeKind::UserName as u8, "aa:bb:cc:11:22:33").unwrap(),
//! );
//! let password = encrypt_user_password("aa:bb:cc:11:22:33", b"secret", &authenticator);
//! request.add_attribute(Attribute::new(AttributeKind::UserPassword as u8, password).unwrap());
//! let bytes = request.encode().unwrap();
//! ```

pub mod attribute;
pub mod auth;
pub mod message_auth;
pub mod packet;
pub mod tunnel;

pub use attribute::{Attribute, AttributeKind};
pub use auth::{
    calculate_response_authenticator, decrypt_user_password, encrypt_user_password,
    generate_request_authenticator, verify_response_authenticator,
};
pub use message_auth::{
    calculate_message_authenticator, sign_message_authenticator, verify_message_authenticator,
};
pub use packet::{Code, Packet, WireError};
pub use tunnel::{
    set_tunnel_vlan, tunnel_medium_type, tunnel_private_group_id, tunnel_type, TunnelVlan,
    DEFAULT_TUNNEL_MEDIUM, DEFAULT_TUNNEL_TYPE,
};
