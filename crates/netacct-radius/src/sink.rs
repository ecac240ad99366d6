//! Persistence sinks
//!
//! Table layouts are owned by the database schema; these writers only insert.

use async_trait::async_trait;
use netacct_common::{AccountingRequest, NetAcctError, NetworkEvent, Result, SwitchInfo};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{debug, instrument};

use crate::bandwidth::BandwidthDelta;

/// One row of the accounting log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingRecord {
    pub tenant_id: u16,
    pub node_id: u64,
    pub unique_session_id: u64,
    pub status: String,
    pub session_id: String,
    pub nas_ip: Option<String>,
    pub nas_port: Option<u32>,
    pub switch_id: Option<String>,
    pub mac: Option<String>,
    pub user_name: Option<String>,
    pub framed_ip: Option<String>,
    pub input_octets: u64,
    pub output_octets: u64,
    pub session_time: u32,
    /// Unix millis
    pub timestamp: i64,
}

impl AccountingRecord {
    pub fn from_request(
        request: &AccountingRequest,
        switch: Option<&SwitchInfo>,
        tenant_id: u16,
    ) -> Self {
        Self {
            tenant_id,
            node_id: request.node_id(tenant_id),
            unique_session_id: request.unique_session_id(),
            status: request.status.to_string(),
            session_id: request.session_id.clone(),
            nas_ip: request.nas_ip.map(|ip| ip.to_string()),
            nas_port: request.nas_port,
            switch_id: switch.map(|s| s.id.clone()),
            mac: request.mac.map(|m| m.to_string()),
            user_name: request.user_name.clone(),
            framed_ip: request.framed_ip.map(|ip| ip.to_string()),
            input_octets: request.input_octets,
            output_octets: request.output_octets,
            session_time: request.session_time,
            timestamp: request.received_at,
        }
    }
}

/// Bytes attributed to a node within one time bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthRecord {
    pub tenant_id: u16,
    pub node_id: u64,
    pub unique_session_id: u64,
    /// Bucket start (Unix millis)
    pub time_bucket: i64,
    pub in_bytes: u64,
    pub out_bytes: u64,
}

impl BandwidthRecord {
    pub fn new(
        tenant_id: u16,
        node_id: u64,
        unique_session_id: u64,
        time_bucket: i64,
        delta: BandwidthDelta,
    ) -> Self {
        Self {
            tenant_id,
            node_id,
            unique_session_id,
            time_bucket,
            in_bytes: delta.in_bytes,
            out_bytes: delta.out_bytes,
        }
    }
}

/// Durable store for accounting data
#[async_trait]
pub trait AccountingSink: Send + Sync {
    async fn write_accounting(&self, record: &AccountingRecord) -> Result<()>;

    async fn write_bandwidth(&self, record: &BandwidthRecord) -> Result<()>;

    /// Liveness probe
    async fn ping(&self) -> Result<()>;
}

/// Durable store for aggregated network events
#[async_trait]
pub trait NetworkEventSink: Send + Sync {
    async fn write_events(&self, events: &[NetworkEvent]) -> Result<()>;
}

fn storage_error(err: sqlx::Error) -> NetAcctError {
    NetAcctError::Storage(err.to_string())
}

/// MySQL-backed sink shared by every worker lane
#[derive(Clone)]
pub struct SqlAccountingSink {
    pool: MySqlPool,
}

impl SqlAccountingSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(storage_error)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl AccountingSink for SqlAccountingSink {
    #[instrument(skip(self, record), fields(session = %record.session_id))]
    async fn write_accounting(&self, record: &AccountingRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO radacct_log
                (tenant_id, node_id, unique_session_id, acct_status_type, acct_session_id,
                 nas_ip_address, nas_port, switch_id, calling_station_id, user_name,
                 framed_ip_address, acct_input_octets, acct_output_octets, acct_session_time,
                 timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FROM_UNIXTIME(? / 1000))",
        )
        .bind(record.tenant_id)
        .bind(record.node_id)
        .bind(record.unique_session_id)
        .bind(&record.status)
        .bind(&record.session_id)
        .bind(&record.nas_ip)
        .bind(record.nas_port)
        .bind(&record.switch_id)
        .bind(&record.mac)
        .bind(&record.user_name)
        .bind(&record.framed_ip)
        .bind(record.input_octets)
        .bind(record.output_octets)
        .bind(record.session_time)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(node = record.node_id))]
    async fn write_bandwidth(&self, record: &BandwidthRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO bandwidth_accounting
                (tenant_id, node_id, unique_session_id, time_bucket,
                 in_bytes, out_bytes, last_updated)
             VALUES (?, ?, ?, FROM_UNIXTIME(? / 1000), ?, ?, NOW())
             ON DUPLICATE KEY UPDATE
                in_bytes = in_bytes + VALUES(in_bytes),
                out_bytes = out_bytes + VALUES(out_bytes),
                last_updated = NOW()",
        )
        .bind(record.tenant_id)
        .bind(record.node_id)
        .bind(record.unique_session_id)
        .bind(record.time_bucket)
        .bind(record.in_bytes)
        .bind(record.out_bytes)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl NetworkEventSink for SqlAccountingSink {
    async fn write_events(&self, events: &[NetworkEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        for event in events {
            sqlx::query(
                "INSERT INTO network_events
                    (src_ip, src_port, dst_ip, dst_port, proto, bidirectional, count,
                     start_time, end_time)
                 VALUES (?, ?, ?, ?, ?, ?, ?, FROM_UNIXTIME(? / 1000), FROM_UNIXTIME(? / 1000))",
            )
            .bind(event.src_ip.to_string())
            .bind(event.src_port)
            .bind(event.dst_ip.to_string())
            .bind(event.dst_port)
            .bind(event.proto)
            .bind(event.bidirectional)
            .bind(event.count)
            .bind(event.start_time)
            .bind(event.end_time)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }
        tx.commit().await.map_err(storage_error)?;

        debug!(count = events.len(), "Wrote network events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netacct_common::{AcctStatusType, MacAddr};

    #[test]
    fn test_record_from_request() {
        let request = AccountingRequest::new(AcctStatusType::Stop, "abc")
            .with_mac(MacAddr::new([0, 0x11, 0x22, 0x33, 0x44, 0x55]))
            .with_nas_ip("10.0.0.1".parse().unwrap())
            .with_octets(10, 20);
        let switch = SwitchInfo {
            id: "sw-1".into(),
            ip: "10.0.0.1".parse().unwrap(),
            mac: None,
            switch_type: "Generic".into(),
            tenant_id: 2,
            secret: None,
        };

        let record = AccountingRecord::from_request(&request, Some(&switch), 2);
        assert_eq!(record.status, "Stop");
        assert_eq!(record.node_id, request.node_id(2));
        assert_eq!(record.switch_id.as_deref(), Some("sw-1"));
        assert_eq!(record.mac.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(record.nas_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!((record.input_octets, record.output_octets), (10, 20));
    }
}
