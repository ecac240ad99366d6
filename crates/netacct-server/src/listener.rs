//! UDP accounting listener
//!
//! Decodes and verifies each datagram on the receive task, then hands it to
//! the dispatcher. Anything malformed is dropped without a reply.

use async_trait::async_trait;
use netacct_common::{AccountingResponse, NetAcctError, Result, SwitchInfo};
use netacct_radius::protocol::packet::MAX_PACKET_LEN;
use netacct_radius::protocol::{encode_accounting_response, RadiusPacket};
use netacct_radius::{AccountingJob, DispatchOutcome, Dispatcher, Responder};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Answers one request over the listener socket
pub struct UdpResponder {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    identifier: u8,
    request_authenticator: [u8; 16],
    secret: Arc<[u8]>,
}

#[async_trait]
impl Responder for UdpResponder {
    async fn respond(&self, _response: AccountingResponse) -> Result<()> {
        let packet =
            encode_accounting_response(self.identifier, &self.request_authenticator, &self.secret);
        self.socket.send_to(&packet, self.peer).await?;
        Ok(())
    }
}

/// Receives accounting datagrams and feeds the dispatcher
pub struct RadiusListener {
    socket: Arc<UdpSocket>,
    dispatcher: Dispatcher,
    default_secret: Arc<[u8]>,
    switch_secrets: HashMap<IpAddr, Arc<[u8]>>,
}

impl RadiusListener {
    pub async fn bind(addr: SocketAddr, dispatcher: Dispatcher, secret: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            dispatcher,
            default_secret: Arc::from(secret.as_bytes()),
            switch_secrets: HashMap::new(),
        })
    }

    /// Per-switch secrets overriding the default
    pub fn with_switch_secrets(mut self, switches: &[SwitchInfo]) -> Self {
        self.switch_secrets = switches
            .iter()
            .filter_map(|s| s.secret.as_ref().map(|secret| (s.ip, Arc::from(secret.as_bytes()))))
            .collect();
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn secret_for(&self, peer: IpAddr) -> Arc<[u8]> {
        self.switch_secrets
            .get(&peer)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_secret))
    }

    /// Decode, verify and dispatch one datagram
    pub fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) -> Result<DispatchOutcome> {
        let packet = RadiusPacket::decode(datagram)?;
        let secret = self.secret_for(peer.ip());
        packet.verify_accounting_request(&secret)?;

        let mut request = packet.to_accounting_request()?;
        if request.nas_ip.is_none() && request.nas_identifier.is_none() {
            request.nas_ip = Some(peer.ip());
        }

        let responder = UdpResponder {
            socket: Arc::clone(&self.socket),
            peer,
            identifier: packet.identifier,
            request_authenticator: packet.authenticator,
            secret,
        };
        Ok(self.dispatcher.dispatch(AccountingJob::new(request, Arc::new(responder))))
    }

    /// Receive until `shutdown` completes
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; MAX_PACKET_LEN];
        info!(
            addr = %self.local_addr()?,
            lanes = self.dispatcher.lane_count(),
            "RADIUS listener started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(error = %e, "UDP receive failed");
                            continue;
                        }
                    };
                    match self.handle_datagram(&buf[..len], peer) {
                        Ok(DispatchOutcome::Queued { .. }) => {}
                        Ok(DispatchOutcome::Dropped { lane }) => {
                            debug!(%peer, lane, "Dropped request, lane full")
                        }
                        Ok(DispatchOutcome::Closed { lane }) => {
                            let reason = format!("worker lane {lane} closed");
                            return Err(NetAcctError::Internal(reason));
                        }
                        Err(e) => debug!(%peer, error = %e, "Discarding datagram"),
                    }
                }
            }
        }

        info!("RADIUS listener stopped");
        Ok(())
    }
}
