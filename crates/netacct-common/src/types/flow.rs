//! Flow telemetry records and the network events built from them
//!
//! Records arrive in batches from an external flow decoder. Biflow exporters
//! report one conversation as two records, one per direction, tagged with the
//! role of the sending endpoint. Everything derived here (group key, session
//! key, event template) is expressed in initiator orientation so both halves
//! of a biflow land in the same group.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Role of the record's source endpoint within a biflow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiflowRole {
    /// Not part of a biflow
    #[default]
    Unidirectional,
    /// Source endpoint opened the conversation
    Initiator,
    /// Source endpoint answered the conversation
    Responder,
}

impl From<u8> for BiflowRole {
    fn from(value: u8) -> Self {
        match value {
            1 => BiflowRole::Initiator,
            2 => BiflowRole::Responder,
            _ => BiflowRole::Unidirectional,
        }
    }
}

/// Export header shared by every record of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowHeader {
    /// Router/exporter address
    pub exporter: IpAddr,
    /// Observation domain id
    pub domain_id: u32,
    /// Export timestamp (Unix millis)
    pub export_time: i64,
}

/// One observed flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// IP protocol number
    pub proto: u8,
    pub biflow: BiflowRole,
    /// Flow start (Unix millis, 0 when absent)
    pub start_time: i64,
    /// Flow end (Unix millis, 0 when absent)
    pub end_time: i64,
    pub packet_count: u64,
    pub byte_count: u64,
    /// Exporter session marker, 0 when the exporter sent none
    pub session_id: u32,
}

impl FlowRecord {
    /// Create a unidirectional record with no counters
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16, proto: u8) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            proto,
            biflow: BiflowRole::Unidirectional,
            start_time: 0,
            end_time: 0,
            packet_count: 0,
            byte_count: 0,
            session_id: 0,
        }
    }

    pub fn with_biflow(mut self, biflow: BiflowRole) -> Self {
        self.biflow = biflow;
        self
    }

    pub fn with_packets(mut self, packet_count: u64) -> Self {
        self.packet_count = packet_count;
        self
    }

    pub fn with_session(mut self, session_id: u32) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_times(mut self, start_time: i64, end_time: i64) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Fill in what the record leaves to its export header
    pub fn stamp(&mut self, header: &FlowHeader) {
        if self.start_time == 0 {
            self.start_time = header.export_time;
        }
    }

    /// Swap the endpoints in place
    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.src_ip, &mut self.dst_ip);
        std::mem::swap(&mut self.src_port, &mut self.dst_port);
    }

    /// Endpoints as (initiator ip, initiator port, responder ip, responder port)
    pub fn initiator_view(&self) -> (IpAddr, u16, IpAddr, u16) {
        match self.biflow {
            BiflowRole::Responder => (self.dst_ip, self.dst_port, self.src_ip, self.src_port),
            _ => (self.src_ip, self.src_port, self.dst_ip, self.dst_port),
        }
    }

    pub fn is_bidirectional(&self) -> bool {
        self.biflow != BiflowRole::Unidirectional
    }

    pub fn group_key(&self) -> FlowGroupKey {
        let (src_ip, _, dst_ip, dst_port) = self.initiator_view();
        FlowGroupKey {
            src_ip,
            dst_ip,
            dst_port,
            proto: self.proto,
            bidirectional: self.is_bidirectional(),
        }
    }

    /// Session identity of this record, `None` without a session marker
    pub fn session_key(&self) -> Option<SessionKey> {
        if self.session_id == 0 {
            return None;
        }
        let (_, port, _, _) = self.initiator_view();
        Some(SessionKey {
            session_id: self.session_id,
            port,
        })
    }

    /// Event template carrying this record's attributes in initiator orientation
    pub fn to_network_event(&self) -> Result<NetworkEvent, ConversionError> {
        let (src_ip, src_port, dst_ip, dst_port) = self.initiator_view();
        if src_ip.is_unspecified() || dst_ip.is_unspecified() {
            return Err(ConversionError::UnspecifiedAddress);
        }
        if src_ip.is_ipv4() != dst_ip.is_ipv4() {
            return Err(ConversionError::AddressFamilyMismatch);
        }

        Ok(NetworkEvent {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            proto: self.proto,
            bidirectional: self.is_bidirectional(),
            count: 1,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }
}

/// A decoded export packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowBatch {
    pub header: FlowHeader,
    pub records: Vec<FlowRecord>,
}

impl FlowBatch {
    pub fn new(header: FlowHeader, records: Vec<FlowRecord>) -> Self {
        Self { header, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Grouping key folding one window's records into one logical conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowGroupKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub proto: u8,
    pub bidirectional: bool,
}

/// Per-record session identity used for distinct-session counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub session_id: u32,
    /// Initiator-side port
    pub port: u16,
}

/// Correlated conversation emitted once per group per window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub proto: u8,
    pub bidirectional: bool,
    /// Distinct sessions observed in the window
    pub count: u64,
    /// Earliest start (Unix millis)
    pub start_time: i64,
    /// Latest end (Unix millis)
    pub end_time: i64,
}
