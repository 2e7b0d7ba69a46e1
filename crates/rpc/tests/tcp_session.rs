use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value as JsonValue, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use pipeline_core::State;
use pipeline_rpc::transport::framing::{read_frame, write_frame};
use pipeline_rpc::{Client, ClientConfig, Peer, RpcError};

type Requests = Arc<Mutex<Vec<(usize, JsonValue)>>>;

/// Queue server double speaking length-prefixed JSON-RPC.
///
/// With `drop_first` the first connection is dropped as soon as its first request
/// arrives. `next` is answered after `next_delay`. Requests are recorded with the
/// number of the connection they arrived on.
struct TestServer {
    endpoint: String,
    requests: Requests,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(drop_first: bool, next_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let endpoint = format!("tcp://{}", listener.local_addr().unwrap());
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let requests = requests.clone();
            tokio::spawn(async move {
                let mut connection = 0;
                while let Ok((stream, _)) = listener.accept().await {
                    connection += 1;
                    let drop_now = drop_first && connection == 1;
                    tokio::spawn(serve(stream, connection, drop_now, next_delay, requests.clone()));
                }
            })
        };

        Self {
            endpoint,
            requests,
            handle,
        }
    }

    async fn requests_to(&self, method: &str) -> Vec<(usize, JsonValue)> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|(_, r)| r["method"] == method)
            .cloned()
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    connection: usize,
    drop_now: bool,
    next_delay: Duration,
    requests: Requests,
) {
    while let Ok(frame) = read_frame(&mut stream, usize::MAX).await {
        let request: JsonValue = serde_json::from_slice(&frame).unwrap();
        requests.lock().await.push((connection, request.clone()));

        if drop_now {
            return;
        }

        let result = match request["method"].as_str() {
            Some("next") => {
                tokio::time::sleep(next_delay).await;
                Ok(json!({ "id": "p-9" }))
            }
            Some("notify") => Ok(json!(true)),
            Some("save") if request["params"]["mime"] == "application/x-corrupt" => {
                Err(json!({ "code": -32000, "message": "storage unavailable" }))
            }
            _ => Ok(JsonValue::Null),
        };
        let response = match result {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
            Err(error) => json!({ "jsonrpc": "2.0", "id": request["id"], "error": error }),
        };
        if write_frame(&mut stream, &serde_json::to_vec(&response).unwrap())
            .await
            .is_err()
        {
            return;
        }
    }
}

fn config(endpoint: &str) -> ClientConfig {
    ClientConfig::new(endpoint)
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(10))
}

#[tokio::test]
async fn dropped_connection_is_replaced_and_the_call_replayed() {
    let server = TestServer::spawn(true, Duration::ZERO).await;
    let client = Client::connect_endpoint(config(&server.endpoint)).await.unwrap();

    let state = State {
        exited: true,
        exit_code: 2,
        started: 1,
        finished: 5,
        error: String::new(),
    };
    client.update("p-1", &state).await.unwrap();
    assert!(client.notify("p-1").await.unwrap());

    let updates = server.requests_to("update").await;
    assert_eq!(updates.len(), 2);
    assert_eq!((updates[0].0, updates[1].0), (1, 2));
    assert_eq!(updates[1].1["params"]["state"]["exit_code"], 2);

    client.close().await;
}

#[tokio::test]
async fn remote_error_reaches_the_caller() {
    let server = TestServer::spawn(false, Duration::ZERO).await;
    let client = Client::connect_endpoint(config(&server.endpoint)).await.unwrap();

    let mut artifact: &[u8] = b"coverage";
    let err = client
        .save("p-1", "application/x-corrupt", &mut artifact)
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::application(-32000, "storage unavailable"));

    let saves = server.requests_to("save").await;
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].1["params"]["data"], "Y292ZXJhZ2U=");
}

#[tokio::test]
async fn close_lets_the_in_flight_call_finish() {
    let server = TestServer::spawn(false, Duration::from_millis(200)).await;
    let client = Arc::new(Client::connect_endpoint(config(&server.endpoint)).await.unwrap());

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move { client.next(None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close().await;

    assert_eq!(in_flight.await.unwrap().unwrap().id, "p-9");
    assert_eq!(client.next(None).await, Err(RpcError::Closed));
    assert_eq!(server.requests_to("next").await.len(), 1);
}

#[tokio::test]
async fn artifact_larger_than_sixteen_mebibytes_is_saved() {
    let server = TestServer::spawn(false, Duration::ZERO).await;
    let client = Client::connect_endpoint(config(&server.endpoint)).await.unwrap();

    let payload = vec![0xA5u8; 13 * 1024 * 1024];
    let mut artifact: &[u8] = &payload;
    client
        .save("p-1", "application/octet-stream", &mut artifact)
        .await
        .unwrap();

    let saves = server.requests_to("save").await;
    assert_eq!(saves.len(), 1);
    let encoded = saves[0].1["params"]["data"].as_str().unwrap();
    assert_eq!(encoded.len(), payload.len().div_ceil(3) * 4);
}

#[tokio::test]
async fn unreachable_endpoint_exhausts_the_budget_then_calls_fail() {
    // Bind and release a port so nothing is listening on it.
    let endpoint = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        format!("tcp://{}", listener.local_addr().unwrap())
    };

    let client = Client::connect_endpoint(config(&endpoint).with_max_attempts(2))
        .await
        .unwrap();
    assert!(!client.connection().is_connected().await);

    let err = client.notify("p-1").await.unwrap_err();
    assert!(err.is_connectivity(), "unexpected error: {err}");
}
