//! AccountingRequest - one inbound RADIUS accounting record
//!
//! The request is a transient envelope: it is decoded from a packet, routed to
//! a worker lane, processed, and dropped. Identity values derived from it
//! (node id, unique session id, affinity key) are stable across the start,
//! interim and stop records of one session.

use crate::net::MacAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Acct-Status-Type values (RFC 2866 section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcctStatusType {
    Start,
    Stop,
    InterimUpdate,
    AccountingOn,
    AccountingOff,
    Other(u32),
}

impl AcctStatusType {
    pub fn code(&self) -> u32 {
        match self {
            AcctStatusType::Start => 1,
            AcctStatusType::Stop => 2,
            AcctStatusType::InterimUpdate => 3,
            AcctStatusType::AccountingOn => 7,
            AcctStatusType::AccountingOff => 8,
            AcctStatusType::Other(code) => *code,
        }
    }

    /// Records that report cumulative usage counters
    pub fn carries_usage(&self) -> bool {
        matches!(self, AcctStatusType::InterimUpdate | AcctStatusType::Stop)
    }
}

impl From<u32> for AcctStatusType {
    fn from(code: u32) -> Self {
        match code {
            1 => AcctStatusType::Start,
            2 => AcctStatusType::Stop,
            3 => AcctStatusType::InterimUpdate,
            7 => AcctStatusType::AccountingOn,
            8 => AcctStatusType::AccountingOff,
            other => AcctStatusType::Other(other),
        }
    }
}

impl fmt::Display for AcctStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcctStatusType::Start => write!(f, "Start"),
            AcctStatusType::Stop => write!(f, "Stop"),
            AcctStatusType::InterimUpdate => write!(f, "Interim-Update"),
            AcctStatusType::AccountingOn => write!(f, "Accounting-On"),
            AcctStatusType::AccountingOff => write!(f, "Accounting-Off"),
            AcctStatusType::Other(code) => write!(f, "Unknown-{code}"),
        }
    }
}

const NODE_LOW_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Accounting request decoded from a switch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingRequest {
    /// Acct-Status-Type
    pub status: AcctStatusType,
    /// Acct-Session-Id as sent by the NAS
    pub session_id: String,
    /// NAS-IP-Address
    pub nas_ip: Option<IpAddr>,
    /// NAS-Identifier
    pub nas_identifier: Option<String>,
    /// NAS-Port
    pub nas_port: Option<u32>,
    /// Calling-Station-Id parsed as a MAC
    pub mac: Option<MacAddr>,
    /// User-Name
    pub user_name: Option<String>,
    /// Framed-IP-Address
    pub framed_ip: Option<IpAddr>,
    /// Cumulative input octets, gigawords folded in
    pub input_octets: u64,
    /// Cumulative output octets, gigawords folded in
    pub output_octets: u64,
    pub input_packets: u64,
    pub output_packets: u64,
    /// Acct-Session-Time in seconds
    pub session_time: u32,
    /// Receive timestamp (Unix millis)
    pub received_at: i64,
}

impl AccountingRequest {
    /// Create a request with no counters
    pub fn new(status: AcctStatusType, session_id: impl Into<String>) -> Self {
        Self {
            status,
            session_id: session_id.into(),
            nas_ip: None,
            nas_identifier: None,
            nas_port: None,
            mac: None,
            user_name: None,
            framed_ip: None,
            input_octets: 0,
            output_octets: 0,
            input_packets: 0,
            output_packets: 0,
            session_time: 0,
            received_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_mac(mut self, mac: MacAddr) -> Self {
        self.mac = Some(mac);
        self
    }

    pub fn with_nas_ip(mut self, nas_ip: IpAddr) -> Self {
        self.nas_ip = Some(nas_ip);
        self
    }

    pub fn with_nas_identifier(mut self, nas_identifier: impl Into<String>) -> Self {
        self.nas_identifier = Some(nas_identifier.into());
        self
    }

    /// Set cumulative input/output octets
    pub fn with_octets(mut self, input_octets: u64, output_octets: u64) -> Self {
        self.input_octets = input_octets;
        self.output_octets = output_octets;
        self
    }

    /// Text identifying the NAS: its IP when known, else its identifier
    pub fn nas_key(&self) -> String {
        match (&self.nas_ip, &self.nas_identifier) {
            (Some(ip), _) => ip.to_string(),
            (None, Some(id)) => id.clone(),
            (None, None) => String::new(),
        }
    }

    /// Node identity: tenant in the top 16 bits, MAC in the low 48.
    ///
    /// Without a usable MAC the low bits hash the affinity key instead, so the
    /// node is private to one NAS session and stays on that session's lane.
    pub fn node_id(&self, tenant_id: u16) -> u64 {
        let low = match self.mac {
            Some(mac) if !mac.is_zero() => mac.as_u64(),
            _ => {
                let hash = blake3::hash(&self.affinity_key());
                let mut head = [0u8; 8];
                head.copy_from_slice(&hash.as_bytes()[..8]);
                u64::from_le_bytes(head) & NODE_LOW_MASK
            }
        };
        (u64::from(tenant_id) << 48) | low
    }

    /// Stable 64-bit identity of this session across its start/interim/stop records
    pub fn unique_session_id(&self) -> u64 {
        let mac = self.mac.map(|m| m.to_string()).unwrap_or_default();
        let material = format!("{}|{}|{}", self.nas_key(), self.session_id, mac);
        let hash = blake3::hash(material.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    /// Key routing every record of one session to the same worker lane
    pub fn affinity_key(&self) -> Vec<u8> {
        match self.mac {
            Some(mac) if !mac.is_zero() => mac.octets().to_vec(),
            _ => format!("{}|{}", self.nas_key(), self.session_id).into_bytes(),
        }
    }
}

/// Protocol-level acknowledgement of one accounting request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingResponse {
    pub session_id: String,
    pub status: AcctStatusType,
}

impl AccountingResponse {
    pub fn for_request(request: &AccountingRequest) -> Self {
        Self {
            session_id: request.session_id.clone(),
            status: request.status,
        }
    }
}
