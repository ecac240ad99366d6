//! Accounting scope filter on flow endpoints

use netacct_common::{FlowRecord, IpNetwork};

/// Keeps records touching at least one allowed network
#[derive(Debug, Clone, Default)]
pub struct NetworkFilter {
    allowed: Vec<IpNetwork>,
    all_networks: bool,
}

impl NetworkFilter {
    pub fn new(allowed: Vec<IpNetwork>) -> Self {
        Self {
            allowed,
            all_networks: false,
        }
    }

    /// Filter that admits every record
    pub fn all_networks() -> Self {
        Self {
            allowed: Vec::new(),
            all_networks: true,
        }
    }

    pub fn with_all_networks(mut self, all_networks: bool) -> Self {
        self.all_networks = all_networks;
        self
    }

    pub fn allowed(&self) -> &[IpNetwork] {
        &self.allowed
    }

    pub fn permits(&self, record: &FlowRecord) -> bool {
        if self.all_networks {
            return true;
        }
        self.allowed
            .iter()
            .any(|net| net.contains(record.src_ip) || net.contains(record.dst_ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(src: &str, dst: &str) -> FlowRecord {
        FlowRecord::new(src.parse().unwrap(), 40000, dst.parse().unwrap(), 80, 6)
    }

    #[test]
    fn test_either_endpoint_admits() {
        let filter = NetworkFilter::new(vec!["10.0.0.0/8".parse().unwrap()]);
        assert!(filter.permits(&record("10.1.2.3", "8.8.8.8")));
        assert!(filter.permits(&record("8.8.8.8", "10.1.2.3")));
        assert!(!filter.permits(&record("8.8.8.8", "1.1.1.1")));
    }

    #[test]
    fn test_all_networks_overrides() {
        let filter =
            NetworkFilter::new(vec!["10.0.0.0/8".parse().unwrap()]).with_all_networks(true);
        assert!(filter.permits(&record("8.8.8.8", "1.1.1.1")));
        assert!(NetworkFilter::all_networks().permits(&record("8.8.8.8", "1.1.1.1")));
    }
}
