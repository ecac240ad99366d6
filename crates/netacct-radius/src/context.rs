//! Service context shared by the accounting workers

use crate::cache::SessionCaches;
use crate::sink::AccountingSink;
use crate::switches::SwitchInfoSource;
use crate::telemetry::Telemetry;
use netacct_common::{DEFAULT_TENANT_ID, DEFAULT_TIME_BUCKET_SECS};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for accounting processing
#[derive(Debug, Clone)]
pub struct AccountingSettings {
    /// Compute and persist bandwidth deltas on interim/stop records
    pub process_bandwidth: bool,
    /// Upper bound on a single persistence write
    pub write_timeout: Duration,
    /// Bucket width for bandwidth rows
    pub time_bucket: Duration,
    /// Tenant used when the switch does not name one
    pub tenant_id: u16,
}

impl Default for AccountingSettings {
    fn default() -> Self {
        Self {
            process_bandwidth: false,
            write_timeout: Duration::from_millis(2000),
            time_bucket: Duration::from_secs(DEFAULT_TIME_BUCKET_SECS),
            tenant_id: DEFAULT_TENANT_ID,
        }
    }
}

/// Everything a handler needs, constructed once at startup
#[derive(Clone)]
pub struct AccountingContext {
    pub caches: Arc<SessionCaches>,
    pub sink: Arc<dyn AccountingSink>,
    pub switches: Arc<dyn SwitchInfoSource>,
    pub telemetry: Option<Telemetry>,
    pub settings: AccountingSettings,
}

impl AccountingContext {
    pub fn new(
        caches: Arc<SessionCaches>,
        sink: Arc<dyn AccountingSink>,
        switches: Arc<dyn SwitchInfoSource>,
    ) -> Self {
        Self {
            caches,
            sink,
            switches,
            telemetry: None,
            settings: AccountingSettings::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_settings(mut self, settings: AccountingSettings) -> Self {
        self.settings = settings;
        self
    }
}
