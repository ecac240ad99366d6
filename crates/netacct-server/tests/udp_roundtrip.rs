//! Accounting over a real UDP socket

use async_trait::async_trait;
use netacct_common::{NetAcctError, Result};
use netacct_radius::protocol::attributes::{self, RadiusAttribute};
use netacct_radius::protocol::{encode_accounting_request, encode_accounting_response, RadiusPacket};
use netacct_radius::{
    spawn_workers, AccountingContext, AccountingHandler, AccountingRecord, AccountingSink,
    BandwidthRecord, DispatchOutcome, Dispatcher, SessionCaches, StaticSwitchSource,
};
use netacct_server::RadiusListener;
use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

const SECRET: &str = "testing123";

#[derive(Default)]
struct MemorySink {
    accounting: Mutex<Vec<AccountingRecord>>,
}

#[async_trait]
impl AccountingSink for MemorySink {
    async fn write_accounting(&self, record: &AccountingRecord) -> Result<()> {
        self.accounting.lock().push(record.clone());
        Ok(())
    }

    async fn write_bandwidth(&self, _record: &BandwidthRecord) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn start_request() -> Vec<RadiusAttribute> {
    vec![
        RadiusAttribute::from_u32(attributes::ACCT_STATUS_TYPE, 1),
        RadiusAttribute::from_text(attributes::ACCT_SESSION_ID, "0000002A"),
        RadiusAttribute::from_ipv4(attributes::NAS_IP_ADDRESS, Ipv4Addr::new(127, 0, 0, 1)),
        RadiusAttribute::from_text(attributes::CALLING_STATION_ID, "aa:bb:cc:dd:ee:ff"),
    ]
}

async fn listener(sink: Arc<MemorySink>) -> (RadiusListener, Vec<tokio::task::JoinHandle<()>>) {
    let ctx = AccountingContext::new(
        Arc::new(SessionCaches::new()),
        sink,
        Arc::new(StaticSwitchSource::default()),
    );
    let (dispatcher, receivers) = Dispatcher::new(2, 16);
    let workers = spawn_workers(receivers, Arc::new(AccountingHandler::new(ctx)));
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = RadiusListener::bind(addr, dispatcher, SECRET).await.unwrap();
    (listener, workers)
}

#[tokio::test]
async fn test_request_is_acknowledged_and_logged() {
    let sink = Arc::new(MemorySink::default());
    let (listener, workers) = listener(sink.clone()).await;
    let server_addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(listener.run(async {
        let _ = stop_rx.await;
    }));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let request = encode_accounting_request(17, &start_request(), SECRET.as_bytes()).unwrap();
    client.send_to(&request, server_addr).await.unwrap();

    let mut buf = [0u8; 64];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("no response")
        .unwrap();

    let sent = RadiusPacket::decode(&request).unwrap();
    let expected = encode_accounting_response(17, &sent.authenticator, SECRET.as_bytes());
    assert_eq!(&buf[..len], expected.as_ref());

    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.accounting.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("record never written");
    assert_eq!(sink.accounting.lock()[0].session_id, "0000002A");
    assert_eq!(sink.accounting.lock()[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    for worker in workers {
        worker.abort();
    }
}

#[tokio::test]
async fn test_bad_authenticator_rejected() {
    let (listener, workers) = listener(Arc::new(MemorySink::default())).await;
    let request = encode_accounting_request(1, &start_request(), b"wrong").unwrap();
    let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

    let err = listener.handle_datagram(&request, peer).unwrap_err();
    assert!(matches!(err, NetAcctError::Protocol(_)));

    let valid = encode_accounting_request(2, &start_request(), SECRET.as_bytes()).unwrap();
    assert!(matches!(
        listener.handle_datagram(&valid, peer).unwrap(),
        DispatchOutcome::Queued { .. }
    ));

    for worker in workers {
        worker.abort();
    }
}
