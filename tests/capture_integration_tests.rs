// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests that tail a capture file through the agent and query
//! the captured messages over HTTP.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use smppsim_catcher::capture::{
    CaptureConfig, CaptureLineParser, PduStore, PollingDriver, TailProgress,
};
use smppsim_catcher::init::agent::Agent;
use smppsim_catcher::init::args::{CatcherArgs, EncodingArg, ResumeArgs};
use smppsim_catcher::init::parse::MonitoringDelays;
use smppsim_catcher::listener::Listener;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

type TestClient = Client<HttpConnector, Full<Bytes>>;

fn client() -> TestClient {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(2))
        .timer(TokioTimer::new())
        .build::<_, Full<Bytes>>(HttpConnector::new())
}

fn append(path: &Path, bytes: &[u8]) {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(bytes).unwrap();
}

fn submit_line(seq: u32, text: &str) -> String {
    format!(
        "2024-01-01 10:00:00,cmd_id=4,cmd_status=0,seq_no={seq},source_addr=100,dest_addr=4470{seq},short_message={text},tag=1056,len=1,value=0\n"
    )
}

fn args(path: &Path, endpoint: SocketAddr) -> CatcherArgs {
    CatcherArgs {
        capture_file: path.to_path_buf(),
        encoding: EncodingArg::Utf8,
        monitoring_delays: MonitoringDelays(vec![Duration::from_millis(10)]),
        batch_size: 64,
        query_endpoint: endpoint,
        resume: ResumeArgs::default(),
    }
}

async fn get(client: &TestClient, uri: String) -> (StatusCode, String) {
    let response = timeout(Duration::from_secs(5), client.get(uri.parse().unwrap()))
        .await
        .expect("Request timed out")
        .expect("Request failed");

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Poll `uri` until it answers 200, returning the body.
async fn wait_for_ok(client: &TestClient, uri: String) -> String {
    let deadline = Instant::now() + TEST_TIMEOUT;
    loop {
        let (status, body) = get(client, uri.clone()).await;
        if status == StatusCode::OK {
            return body;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {}, last status {}",
            uri,
            status
        );
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_captured_messages_are_queryable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.log");
    append(&path, submit_line(1, "first").as_bytes());
    append(&path, b"2024-01-01 10:00:00,cmd_id=9,seq_no=7\n");

    let listener = Listener::listen_async("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.bound_address().unwrap();

    let agent = Agent::new(args(&path, addr), listener);
    let store = agent.store();
    let cancel = CancellationToken::new();
    let agent_handle = tokio::spawn(agent.run(cancel.clone()));

    let client = client();

    let body = wait_for_ok(&client, format!("http://{}/?id=1", addr)).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["sequenceNumber"], 1);
    assert_eq!(json["destinationAddr"], "44701");
    assert_eq!(json["message"], "first");

    // Other command ids are not kept
    let (status, _) = get(&client, format!("http://{}/?id=7", addr)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // A line written in two parts is only picked up once complete
    let line = submit_line(2, "second");
    let (head, rest) = line.split_at(20);
    append(&path, head.as_bytes());
    sleep(Duration::from_millis(100)).await;
    let (status, _) = get(&client, format!("http://{}/?id=2", addr)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    append(&path, rest.as_bytes());

    let body = wait_for_ok(&client, format!("http://{}/?id=2", addr)).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["message"], "second");

    let body = wait_for_ok(&client, format!("http://{}/search?q=secon", addr)).await;
    let found: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(found.as_array().unwrap().len(), 1);

    // Progress is published once the batch holding the line completes
    let file_len = std::fs::metadata(&path).unwrap().len();
    let deadline = Instant::now() + TEST_TIMEOUT;
    loop {
        let body = wait_for_ok(&client, format!("http://{}/status", addr)).await;
        let status: serde_json::Value = serde_json::from_str(&body).unwrap();
        if status["offset"].as_u64() == Some(file_len) {
            assert_eq!(status["records"], 2);
            assert_ne!(status["head"], "");
            break;
        }
        assert!(Instant::now() < deadline, "offset never reached {}", file_len);
        sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(store.len(), 2);

    cancel.cancel();
    timeout(TEST_TIMEOUT, agent_handle)
        .await
        .expect("Agent shutdown timed out")
        .expect("Agent task failed")
        .expect("Agent returned error");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_replaced_capture_file_is_read_from_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.log");
    append(&path, submit_line(1, "before rotation").as_bytes());
    append(&path, submit_line(2, "before rotation").as_bytes());

    let listener = Listener::listen_async("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.bound_address().unwrap();

    let agent = Agent::new(args(&path, addr), listener);
    let cancel = CancellationToken::new();
    let agent_handle = tokio::spawn(agent.run(cancel.clone()));

    let client = client();
    wait_for_ok(&client, format!("http://{}/?id=2", addr)).await;

    // Shorter replacement content forces the size check to trip
    std::fs::write(&path, submit_line(3, "after").as_bytes()).unwrap();

    let body = wait_for_ok(&client, format!("http://{}/?id=3", addr)).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["message"], "after");

    let body = wait_for_ok(&client, format!("http://{}/list", addr)).await;
    let all: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(all.as_array().unwrap().len(), 3);

    cancel.cancel();
    timeout(TEST_TIMEOUT, agent_handle)
        .await
        .expect("Agent shutdown timed out")
        .expect("Agent task failed")
        .expect("Agent returned error");
}

#[tokio::test]
async fn test_three_lines_are_stored_by_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.log");
    for seq in [11, 12, 13] {
        append(&path, submit_line(seq, "hello").as_bytes());
    }

    let config = CaptureConfig::new(&path).with_monitoring_delays(vec![Duration::from_millis(10)]);
    let store = PduStore::new();
    let progress = Arc::new(TailProgress::new(&path));
    let driver = PollingDriver::new(
        &config,
        Arc::new(CaptureLineParser::new()),
        store.clone(),
        progress.clone(),
    )
    .unwrap();

    let mut tasks = JoinSet::new();
    let cancel = CancellationToken::new();
    driver.start(&mut tasks, &cancel).await.unwrap();

    let deadline = Instant::now() + TEST_TIMEOUT;
    while progress.snapshot().offset < std::fs::metadata(&path).unwrap().len() {
        assert!(Instant::now() < deadline, "driver never caught up");
        sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(store.len(), 3);
    for seq in [11, 12, 13] {
        let pdu = store.find_by_sequence(seq).unwrap();
        assert_eq!(pdu.sequence_number, seq);
        assert_eq!(pdu.destination_addr, format!("4470{seq}"));
    }

    cancel.cancel();
    timeout(TEST_TIMEOUT, tasks.join_next())
        .await
        .expect("Driver shutdown timed out")
        .unwrap()
        .unwrap()
        .unwrap();
}
