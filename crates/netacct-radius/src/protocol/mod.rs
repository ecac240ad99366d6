//! RADIUS accounting wire codec
//!
//! Only Accounting-Request in and Accounting-Response out are handled.

pub mod attributes;
pub mod packet;

pub use attributes::RadiusAttribute;
pub use packet::{
    encode_accounting_request, encode_accounting_response, RadiusPacket, ACCOUNTING_REQUEST,
    ACCOUNTING_RESPONSE,
};
