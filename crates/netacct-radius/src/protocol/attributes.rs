//! RADIUS attribute types and value accessors (RFC 2865, RFC 2866, RFC 2869)

use bytes::Bytes;
use netacct_common::ProtocolError;
use std::net::{IpAddr, Ipv4Addr};

pub const USER_NAME: u8 = 1;
pub const NAS_IP_ADDRESS: u8 = 4;
pub const NAS_PORT: u8 = 5;
pub const FRAMED_IP_ADDRESS: u8 = 8;
pub const CALLING_STATION_ID: u8 = 31;
pub const NAS_IDENTIFIER: u8 = 32;
pub const ACCT_STATUS_TYPE: u8 = 40;
pub const ACCT_INPUT_OCTETS: u8 = 42;
pub const ACCT_OUTPUT_OCTETS: u8 = 43;
pub const ACCT_SESSION_ID: u8 = 44;
pub const ACCT_SESSION_TIME: u8 = 46;
pub const ACCT_INPUT_PACKETS: u8 = 47;
pub const ACCT_OUTPUT_PACKETS: u8 = 48;
pub const ACCT_INPUT_GIGAWORDS: u8 = 52;
pub const ACCT_OUTPUT_GIGAWORDS: u8 = 53;

/// Type and length header preceding every attribute value
pub const ATTRIBUTE_HEADER_LEN: usize = 2;

/// One type-length-value attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiusAttribute {
    pub attr_type: u8,
    pub value: Bytes,
}

impl RadiusAttribute {
    pub fn new(attr_type: u8, value: impl Into<Bytes>) -> Self {
        Self {
            attr_type,
            value: value.into(),
        }
    }

    pub fn from_u32(attr_type: u8, value: u32) -> Self {
        Self::new(attr_type, value.to_be_bytes().to_vec())
    }

    pub fn from_ipv4(attr_type: u8, addr: Ipv4Addr) -> Self {
        Self::new(attr_type, addr.octets().to_vec())
    }

    pub fn from_text(attr_type: u8, text: &str) -> Self {
        Self::new(attr_type, text.as_bytes().to_vec())
    }

    /// Encoded length including the header
    pub fn wire_len(&self) -> usize {
        ATTRIBUTE_HEADER_LEN + self.value.len()
    }

    pub fn as_u32(&self) -> Result<u32, ProtocolError> {
        let raw: [u8; 4] = self.value.as_ref().try_into().map_err(|_| self.invalid())?;
        Ok(u32::from_be_bytes(raw))
    }

    pub fn as_ipv4(&self) -> Result<IpAddr, ProtocolError> {
        let raw: [u8; 4] = self.value.as_ref().try_into().map_err(|_| self.invalid())?;
        Ok(IpAddr::V4(Ipv4Addr::from(raw)))
    }

    /// Text value, with invalid UTF-8 replaced
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    fn invalid(&self) -> ProtocolError {
        ProtocolError::InvalidAttribute {
            attr_type: self.attr_type,
            len: self.wire_len(),
        }
    }
}
