//! Direction heuristics for unidirectional flow records

use netacct_common::{BiflowRole, FlowRecord};

/// Highest port considered a well-known service port
pub const WELL_KNOWN_PORT_MAX: u16 = 1023;

/// Augments a record after its group key is taken
pub trait FlowHeuristic: Send + Sync {
    fn apply(&self, record: &mut FlowRecord);
}

/// Points unidirectional records at the service port.
///
/// A record from a well-known port to an ephemeral one is the server's reply.
/// Reversing it reports the reply with the service port as destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortHeuristic;

impl FlowHeuristic for PortHeuristic {
    fn apply(&self, record: &mut FlowRecord) {
        if record.biflow != BiflowRole::Unidirectional {
            return;
        }
        if record.src_port <= WELL_KNOWN_PORT_MAX && record.dst_port > WELL_KNOWN_PORT_MAX {
            record.reverse();
        }
    }
}

/// Heuristic for a configured level, `None` when disabled
pub fn heuristic_for_level(level: u8) -> Option<Box<dyn FlowHeuristic>> {
    match level {
        0 => None,
        _ => Some(Box::new(PortHeuristic)),
    }
}
