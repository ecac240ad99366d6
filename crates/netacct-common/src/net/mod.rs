//! Network addressing helpers

pub mod mac;
pub mod network;

pub use mac::MacAddr;
pub use network::IpNetwork;
