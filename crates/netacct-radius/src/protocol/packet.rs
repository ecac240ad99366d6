//! RADIUS packet framing and authenticators

use super::attributes::{self, RadiusAttribute, ATTRIBUTE_HEADER_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};
use netacct_common::{AccountingRequest, AcctStatusType, ProtocolError};

pub const ACCOUNTING_REQUEST: u8 = 4;
pub const ACCOUNTING_RESPONSE: u8 = 5;

/// Code, identifier, length and authenticator
pub const HEADER_LEN: usize = 20;
pub const MAX_PACKET_LEN: usize = 4096;

const AUTHENTICATOR_LEN: usize = 16;

/// A decoded RADIUS packet
#[derive(Debug, Clone)]
pub struct RadiusPacket {
    pub code: u8,
    pub identifier: u8,
    pub authenticator: [u8; AUTHENTICATOR_LEN],
    pub attributes: Vec<RadiusAttribute>,
    raw: Bytes,
}

impl RadiusPacket {
    /// Parse a datagram. Bytes past the declared length are padding and ignored.
    pub fn decode(datagram: &[u8]) -> Result<Self, ProtocolError> {
        if datagram.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                len: datagram.len(),
                needed: HEADER_LEN,
            });
        }

        let mut header = &datagram[..HEADER_LEN];
        let code = header.get_u8();
        let identifier = header.get_u8();
        let declared = header.get_u16() as usize;
        let mut authenticator = [0u8; AUTHENTICATOR_LEN];
        header.copy_to_slice(&mut authenticator);

        if declared < HEADER_LEN || declared > MAX_PACKET_LEN || declared > datagram.len() {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: datagram.len(),
            });
        }

        let raw = Bytes::copy_from_slice(&datagram[..declared]);
        let mut body = raw.slice(HEADER_LEN..);
        let mut attributes = Vec::new();
        while body.has_remaining() {
            if body.remaining() < ATTRIBUTE_HEADER_LEN {
                return Err(ProtocolError::InvalidAttribute {
                    attr_type: body.chunk()[0],
                    len: body.remaining(),
                });
            }
            let attr_type = body.get_u8();
            let len = body.get_u8() as usize;
            if len < ATTRIBUTE_HEADER_LEN || len - ATTRIBUTE_HEADER_LEN > body.remaining() {
                return Err(ProtocolError::InvalidAttribute { attr_type, len });
            }
            let value = body.split_to(len - ATTRIBUTE_HEADER_LEN);
            attributes.push(RadiusAttribute { attr_type, value });
        }

        Ok(Self {
            code,
            identifier,
            authenticator,
            attributes,
            raw,
        })
    }

    /// First attribute of the given type
    pub fn attribute(&self, attr_type: u8) -> Option<&RadiusAttribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    /// Check the Accounting-Request authenticator against `secret`
    pub fn verify_accounting_request(&self, secret: &[u8]) -> Result<(), ProtocolError> {
        if self.code != ACCOUNTING_REQUEST {
            return Err(ProtocolError::UnsupportedCode(self.code));
        }
        let expected = request_authenticator(&self.raw[..4], &self.raw[HEADER_LEN..], secret);
        if expected != self.authenticator {
            return Err(ProtocolError::BadAuthenticator);
        }
        Ok(())
    }

    /// Map the attributes onto an [`AccountingRequest`]
    pub fn to_accounting_request(&self) -> Result<AccountingRequest, ProtocolError> {
        if self.code != ACCOUNTING_REQUEST {
            return Err(ProtocolError::UnsupportedCode(self.code));
        }

        let status = self
            .attribute(attributes::ACCT_STATUS_TYPE)
            .ok_or(ProtocolError::MissingAttribute("Acct-Status-Type"))?
            .as_u32()?;
        let session_id = self
            .attribute(attributes::ACCT_SESSION_ID)
            .ok_or(ProtocolError::MissingAttribute("Acct-Session-Id"))?
            .as_text();

        let mut request = AccountingRequest::new(AcctStatusType::from(status), session_id);
        let mut input_gigawords = 0u64;
        let mut output_gigawords = 0u64;

        for attr in &self.attributes {
            match attr.attr_type {
                attributes::USER_NAME => request.user_name = Some(attr.as_text()),
                attributes::NAS_IP_ADDRESS => request.nas_ip = Some(attr.as_ipv4()?),
                attributes::NAS_PORT => request.nas_port = Some(attr.as_u32()?),
                attributes::FRAMED_IP_ADDRESS => request.framed_ip = Some(attr.as_ipv4()?),
                // Not every NAS puts a MAC here
                attributes::CALLING_STATION_ID => request.mac = attr.as_text().parse().ok(),
                attributes::NAS_IDENTIFIER => request.nas_identifier = Some(attr.as_text()),
                attributes::ACCT_INPUT_OCTETS => request.input_octets = u64::from(attr.as_u32()?),
                attributes::ACCT_OUTPUT_OCTETS => request.output_octets = u64::from(attr.as_u32()?),
                attributes::ACCT_INPUT_GIGAWORDS => input_gigawords = u64::from(attr.as_u32()?),
                attributes::ACCT_OUTPUT_GIGAWORDS => output_gigawords = u64::from(attr.as_u32()?),
                attributes::ACCT_SESSION_TIME => request.session_time = attr.as_u32()?,
                attributes::ACCT_INPUT_PACKETS => request.input_packets = u64::from(attr.as_u32()?),
                attributes::ACCT_OUTPUT_PACKETS => {
                    request.output_packets = u64::from(attr.as_u32()?)
                }
                _ => {}
            }
        }

        request.input_octets |= input_gigawords << 32;
        request.output_octets |= output_gigawords << 32;
        Ok(request)
    }
}

fn request_authenticator(head: &[u8], body: &[u8], secret: &[u8]) -> [u8; AUTHENTICATOR_LEN] {
    let mut hasher = Md5::new();
    hasher.update(head);
    hasher.update([0u8; AUTHENTICATOR_LEN]);
    hasher.update(body);
    hasher.update(secret);
    let mut out = [0u8; AUTHENTICATOR_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Accounting-Response acknowledging the request with `identifier`
pub fn encode_accounting_response(
    identifier: u8,
    request_authenticator: &[u8; AUTHENTICATOR_LEN],
    secret: &[u8],
) -> Bytes {
    let mut hasher = Md5::new();
    hasher.update([ACCOUNTING_RESPONSE, identifier]);
    hasher.update((HEADER_LEN as u16).to_be_bytes());
    hasher.update(request_authenticator);
    hasher.update(secret);

    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    buf.put_u8(ACCOUNTING_RESPONSE);
    buf.put_u8(identifier);
    buf.put_u16(HEADER_LEN as u16);
    buf.put_slice(&hasher.finalize());
    buf.freeze()
}

/// Signed Accounting-Request carrying `attributes`
pub fn encode_accounting_request(
    identifier: u8,
    attributes: &[RadiusAttribute],
    secret: &[u8],
) -> Result<Bytes, ProtocolError> {
    let mut body = BytesMut::new();
    for attr in attributes {
        if attr.wire_len() > u8::MAX as usize {
            return Err(ProtocolError::InvalidAttribute {
                attr_type: attr.attr_type,
                len: attr.wire_len(),
            });
        }
        body.put_u8(attr.attr_type);
        body.put_u8(attr.wire_len() as u8);
        body.put_slice(&attr.value);
    }

    let len = HEADER_LEN + body.len();
    if len > MAX_PACKET_LEN {
        return Err(ProtocolError::LengthMismatch {
            declared: len,
            actual: MAX_PACKET_LEN,
        });
    }

    let head = [ACCOUNTING_REQUEST, identifier, (len >> 8) as u8, len as u8];
    let authenticator = request_authenticator(&head, &body, secret);

    let mut buf = BytesMut::with_capacity(len);
    buf.put_slice(&head);
    buf.put_slice(&authenticator);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netacct_common::MacAddr;
    use std::net::Ipv4Addr;

    const SECRET: &[u8] = b"testing123";

    fn interim_attributes() -> Vec<RadiusAttribute> {
        vec![
            RadiusAttribute::from_u32(attributes::ACCT_STATUS_TYPE, 3),
            RadiusAttribute::from_text(attributes::ACCT_SESSION_ID, "00000042"),
            RadiusAttribute::from_ipv4(attributes::NAS_IP_ADDRESS, Ipv4Addr::new(10, 0, 0, 1)),
            RadiusAttribute::from_text(attributes::CALLING_STATION_ID, "00-11-22-33-44-55"),
            RadiusAttribute::from_u32(attributes::ACCT_INPUT_OCTETS, 100),
            RadiusAttribute::from_u32(attributes::ACCT_INPUT_GIGAWORDS, 1),
            RadiusAttribute::from_u32(attributes::ACCT_OUTPUT_OCTETS, 200),
            RadiusAttribute::from_u32(attributes::ACCT_SESSION_TIME, 60),
        ]
    }

    #[test]
    fn test_decode_accounting_request() {
        let wire = encode_accounting_request(7, &interim_attributes(), SECRET).unwrap();
        let packet = RadiusPacket::decode(&wire).unwrap();
        assert_eq!(packet.code, ACCOUNTING_REQUEST);
        assert_eq!(packet.identifier, 7);
        assert!(packet.verify_accounting_request(SECRET).is_ok());

        let request = packet.to_accounting_request().unwrap();
        assert_eq!(request.status, AcctStatusType::InterimUpdate);
        assert_eq!(request.session_id, "00000042");
        assert_eq!(request.nas_ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(request.mac, Some(MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])));
        assert_eq!(request.input_octets, (1u64 << 32) + 100);
        assert_eq!(request.output_octets, 200);
        assert_eq!(request.session_time, 60);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let wire = encode_accounting_request(1, &interim_attributes(), SECRET).unwrap();
        let packet = RadiusPacket::decode(&wire).unwrap();
        assert_eq!(
            packet.verify_accounting_request(b"other"),
            Err(ProtocolError::BadAuthenticator)
        );
    }

    #[test]
    fn test_truncated_and_mismatched_lengths() {
        assert_eq!(
            RadiusPacket::decode(&[4, 1, 0]).unwrap_err(),
            ProtocolError::Truncated { len: 3, needed: HEADER_LEN }
        );

        let wire = encode_accounting_request(1, &interim_attributes(), SECRET).unwrap();
        let cut = &wire[..wire.len() - 1];
        assert!(matches!(
            RadiusPacket::decode(cut),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_trailing_padding_ignored() {
        let wire = encode_accounting_request(1, &interim_attributes(), SECRET).unwrap();
        let mut padded = wire.to_vec();
        padded.extend_from_slice(&[0u8; 8]);
        let packet = RadiusPacket::decode(&padded).unwrap();
        assert!(packet.verify_accounting_request(SECRET).is_ok());
    }

    #[test]
    fn test_bad_attribute_length() {
        let mut wire = encode_accounting_request(1, &interim_attributes(), SECRET)
            .unwrap()
            .to_vec();
        // First attribute claims a length of 1
        wire[HEADER_LEN + 1] = 1;
        assert!(matches!(
            RadiusPacket::decode(&wire),
            Err(ProtocolError::InvalidAttribute { attr_type: 40, len: 1 })
        ));
    }

    #[test]
    fn test_missing_status_type() {
        let attrs = vec![RadiusAttribute::from_text(attributes::ACCT_SESSION_ID, "s")];
        let wire = encode_accounting_request(1, &attrs, SECRET).unwrap();
        let packet = RadiusPacket::decode(&wire).unwrap();
        assert_eq!(
            packet.to_accounting_request().unwrap_err(),
            ProtocolError::MissingAttribute("Acct-Status-Type")
        );
    }

    #[test]
    fn test_response_authenticator() {
        let request_auth = [9u8; 16];
        let wire = encode_accounting_response(3, &request_auth, SECRET);
        assert_eq!(wire.len(), HEADER_LEN);
        assert_eq!(&wire[..4], &[ACCOUNTING_RESPONSE, 3, 0, 20]);

        let mut hasher = Md5::new();
        hasher.update([ACCOUNTING_RESPONSE, 3, 0, 20]);
        hasher.update(request_auth);
        hasher.update(SECRET);
        assert_eq!(&wire[4..], hasher.finalize().as_slice());
    }
}
