//! RADIUS request pipeline.
//!
//! A UDP server that decides access per station and answers with RFC 2868
//! tunnel attributes carrying the VLAN assignment. Stations the registry
//! does not know are given the default VLAN (when one exists) while the
//! operators are notified through the approval channel.

use crate::config::Verbosity;
use crate::registry::{Registry, Vlan};
use radius_wire::auth::{calculate_response_authenticator, decrypt_user_password};
use radius_wire::message_auth::verify_message_authenticator;
use radius_wire::tunnel::{set_tunnel_vlan, TunnelVlan};
use radius_wire::{
    tunnel_medium_type, tunnel_private_group_id, tunnel_type, AttributeKind, Code, Packet,
    WireError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Placeholder for absent secrets in logs.
const LOG_EMPTY: &str = "<empty>";
/// Placeholder for present secrets in logs.
const LOG_REDACTED: &str = "********";

/// A request from a station the registry does not know, handed to the
/// approval flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub username: String,
    pub password: String,
    pub mac_address: String,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

/// The access decision for one request, before attribute composition.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Access {
    Grant(Vlan),
    Deny,
}

/// Run the decision ladder against a registry snapshot.
///
/// Returns the decision and whether the operators should be notified of
/// an unknown station. Pure with respect to the snapshot: the same
/// registry state and request always produce the same decision.
fn decide(registry: &dyn Registry, username: &str, password: &str) -> (Access, bool) {
    // Unknown stations fall back to the default VLAN when one exists.
    let fallback = match registry.default_vlan() {
        Ok(vlan) => Access::Grant(vlan),
        Err(e) => {
            debug!(error = %e, "no default VLAN, fallback is reject");
            Access::Deny
        }
    };

    match registry.is_blocked(username) {
        Err(e) => {
            debug!(error = %e, "blocklist check failed");
            return (Access::Deny, false);
        }
        Ok(true) => {
            debug!("station is blocked");
            return (Access::Deny, false);
        }
        Ok(false) => {}
    }

    let device = match registry.device(username) {
        Err(e) => {
            debug!(error = %e, "station unknown");
            return (fallback, e.is_not_found());
        }
        Ok(device) => device,
    };

    if device.password != password {
        debug!("password mismatch");
        return (Access::Deny, false);
    }

    match registry.vlan(&device.vlan_id) {
        Err(e) => {
            debug!(error = %e, vlan_id = %device.vlan_id, "assigned VLAN missing");
            (fallback, false)
        }
        Ok(vlan) => (Access::Grant(vlan), false),
    }
}

/// Build the response packet for a decision, Proxy-State copied through
/// per RFC 2865 Section 5.33 and the Response Authenticator filled in.
fn compose_response(request: &Packet, access: &Access, secret: &[u8]) -> Result<Packet, WireError> {
    let mut response = match access {
        Access::Grant(vlan) => {
            let mut response = request.response(Code::AccessAccept);
            set_tunnel_vlan(
                &mut response,
                0,
                &TunnelVlan {
                    id: vlan.id.clone(),
                    tunnel_type: vlan.tunnel_type,
                    medium_type: vlan.tunnel_medium_type,
                },
            )?;
            response
        }
        Access::Deny => request.response(Code::AccessReject),
    };

    for attr in request.find_all_attributes(AttributeKind::ProxyState as u8) {
        response.add_attribute(attr.clone());
    }

    response.authenticator =
        calculate_response_authenticator(&response, &request.authenticator, secret);
    Ok(response)
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        LOG_EMPTY
    } else {
        LOG_REDACTED
    }
}

fn hex16(bytes: &[u8; 16]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct Inner {
    socket: UdpSocket,
    secret: Vec<u8>,
    registry: Arc<dyn Registry>,
    attempts: mpsc::Sender<LoginAttempt>,
    verbosity: Verbosity,
}

/// The UDP packet server.
pub struct RadiusServer {
    inner: Arc<Inner>,
}

impl RadiusServer {
    /// Bind the server socket.
    pub async fn bind(
        addr: &str,
        secret: impl Into<Vec<u8>>,
        registry: Arc<dyn Registry>,
        attempts: mpsc::Sender<LoginAttempt>,
        verbosity: Verbosity,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "RADIUS server listening");

        Ok(RadiusServer {
            inner: Arc::new(Inner {
                socket,
                secret: secret.into(),
                registry,
                attempts,
                verbosity,
            }),
        })
    }

    /// Local address of the bound socket; handy for port-0 tests.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.inner.socket.local_addr()?)
    }

    /// Serve until `stop` signals, then drain in-flight handlers.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = stop.changed() => break,
                received = self.inner.socket.recv_from(&mut buf) => {
                    let (len, addr) = received?;
                    let data = buf[..len].to_vec();
                    let inner = Arc::clone(&self.inner);
                    tasks.spawn(async move {
                        Inner::handle_packet(inner, data, addr).await;
                    });
                }
                Some(finished) = tasks.join_next() => {
                    if let Err(e) = finished {
                        error!(error = %e, "request handler failed");
                    }
                }
            }
        }

        debug!("shutting down RADIUS server, draining in-flight requests");
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "request handler failed during drain");
            }
        }

        Ok(())
    }
}

impl Inner {
    async fn handle_packet(inner: Arc<Inner>, data: Vec<u8>, addr: SocketAddr) {
        let start = Instant::now();

        let request = match Packet::decode(&data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(remote_addr = %addr, error = %e, "dropping malformed packet");
                return;
            }
        };

        if request.code != Code::AccessRequest {
            debug!(remote_addr = %addr, code = request.code.name(), "ignoring unsupported packet");
            return;
        }

        // When the NAS includes a Message-Authenticator it must verify
        // before the packet is acted on.
        match verify_message_authenticator(&request, &inner.secret) {
            Ok(true) => {}
            Ok(false) => {
                warn!(remote_addr = %addr, identifier = request.identifier, "dropping packet with bad Message-Authenticator");
                return;
            }
            Err(e) => {
                debug!(remote_addr = %addr, error = %e, "Message-Authenticator check failed");
                return;
            }
        }

        let username = request
            .attribute_text(AttributeKind::UserName as u8)
            .unwrap_or_default();
        let password = request
            .find_attribute(AttributeKind::UserPassword as u8)
            .and_then(|attr| {
                decrypt_user_password(&attr.value, &inner.secret, &request.authenticator).ok()
            })
            .unwrap_or_default();
        let mac_address = request
            .attribute_text(AttributeKind::CallingStationId as u8)
            .unwrap_or_default();

        let (access, notify) = decide(inner.registry.as_ref(), &username, &password);

        if notify {
            let attempt = LoginAttempt {
                username: username.clone(),
                password: password.clone(),
                mac_address: mac_address.clone(),
            };
            if let Err(e) = inner.attempts.try_send(attempt) {
                warn!(error = %e, "dropping operator notification");
            }
        }

        let response = match compose_response(&request, &access, &inner.secret) {
            Ok(response) => response,
            Err(e) => {
                error!(remote_addr = %addr, error = %e, "failed to compose response");
                return;
            }
        };

        let send_result = match response.encode() {
            Ok(bytes) => inner.socket.send_to(&bytes, addr).await.map(|_| ()),
            Err(e) => {
                error!(remote_addr = %addr, error = %e, "failed to encode response");
                return;
            }
        };

        if let Err(e) = send_result {
            error!(remote_addr = %addr, error = %e, "failed to send response");
            return;
        }

        let granted = response.code == Code::AccessAccept;
        if inner.verbosity >= Verbosity::AccessLog {
            let vlan_id = tunnel_private_group_id(&response).map(|(_, id)| id);
            let resp_tunnel_type = tunnel_type(&response).map(|(_, v)| v);
            let resp_medium = tunnel_medium_type(&response).map(|(_, v)| v);
            info!(
                username = %username,
                password = redact(&password),
                mac_address = %mac_address,
                remote_addr = %addr,
                identifier = request.identifier,
                authenticator = %hex16(&request.authenticator),
                secret = redact(std::str::from_utf8(&inner.secret).unwrap_or("")),
                request_code = request.code.name(),
                response_code = response.code.name(),
                vlan_id = vlan_id.as_deref().unwrap_or(""),
                tunnel_type = resp_tunnel_type.unwrap_or(0),
                tunnel_medium_type = resp_medium.unwrap_or(0),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "{}",
                if granted { "Access granted" } else { "Access denied" }
            );
        } else {
            info!(
                username = %username,
                mac_address = %mac_address,
                remote_addr = %addr,
                "{}",
                if granted { "Access granted" } else { "Access denied" }
            );
        }
    }
}
