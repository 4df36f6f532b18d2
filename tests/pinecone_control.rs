//! Pinecone control-plane client against a local stand-in controller.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use carebot::http::build_client;
use carebot::pinecone::PineconeControl;
use carebot_core::error::Error;
use carebot_core::index::{ensure_index_with_dimension, EnsureOutcome, IndexControl, IndexTarget};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Ready { dimension: u64 },
    /// Deleted but not gone yet; answers this many more describes first.
    Terminating { describes_left: usize },
    Gone,
}

struct Controller {
    phase: Phase,
    /// Describes answered with `Terminating` after a delete.
    terminating_for: usize,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<Controller>>;

fn description(dimension: u64, ready: bool, state: &str) -> Value {
    json!({
        "name": "care",
        "dimension": dimension,
        "metric": "cosine",
        "host": "care-abc123.svc.pinecone.io",
        "status": {"ready": ready, "state": state}
    })
}

async fn list(State(c): State<Shared>) -> Json<Value> {
    let mut c = c.lock().unwrap();
    c.requests.push("GET /indexes".to_string());
    let indexes = match c.phase {
        Phase::Gone => json!([]),
        _ => json!([{"name": "care"}]),
    };
    Json(json!({ "indexes": indexes }))
}

async fn describe(State(c): State<Shared>, Path(name): Path<String>) -> (StatusCode, Json<Value>) {
    let mut c = c.lock().unwrap();
    c.requests.push(format!("GET /indexes/{}", name));
    let phase = c.phase;
    match phase {
        Phase::Ready { dimension } => (StatusCode::OK, Json(description(dimension, true, "Ready"))),
        Phase::Terminating { describes_left } if describes_left > 0 => {
            c.phase = Phase::Terminating {
                describes_left: describes_left - 1,
            };
            (StatusCode::OK, Json(description(768, false, "Terminating")))
        }
        _ => {
            c.phase = Phase::Gone;
            (StatusCode::NOT_FOUND, Json(json!({"error": {"code": "NOT_FOUND"}})))
        }
    }
}

async fn delete(State(c): State<Shared>, Path(name): Path<String>) -> StatusCode {
    let mut c = c.lock().unwrap();
    c.requests.push(format!("DELETE /indexes/{}", name));
    let describes_left = c.terminating_for;
    c.phase = Phase::Terminating { describes_left };
    StatusCode::ACCEPTED
}

async fn create(State(c): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut c = c.lock().unwrap();
    c.requests.push("POST /indexes".to_string());
    if c.phase != Phase::Gone {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": {"code": "ALREADY_EXISTS", "message": "Resource care already exists"}})),
        );
    }
    let dimension = body["dimension"].as_u64().unwrap_or(0);
    c.phase = Phase::Ready { dimension };
    (StatusCode::CREATED, Json(description(dimension, false, "Initializing")))
}

async fn start_controller(dimension: u64, terminating_for: usize) -> (Shared, SocketAddr) {
    let shared = Arc::new(Mutex::new(Controller {
        phase: Phase::Ready { dimension },
        terminating_for,
        requests: Vec::new(),
    }));
    let app = Router::new()
        .route("/indexes", get(list).post(create))
        .route("/indexes/{name}", get(describe).delete(delete))
        .with_state(shared.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (shared, addr)
}

fn control(addr: SocketAddr, timeout: Duration) -> PineconeControl {
    PineconeControl::new(build_client(10).unwrap(), &format!("http://{}", addr), "test-key")
        .with_ready_timeout(timeout)
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn test_recreate_waits_until_old_index_is_gone() {
    let (shared, addr) = start_controller(768, 1).await;
    let control = control(addr, Duration::from_secs(5));
    let target = IndexTarget {
        name: "care".to_string(),
        region: "us-east-1".to_string(),
        allow_recreate: true,
    };

    let handle = ensure_index_with_dimension(&control, 1024, &target)
        .await
        .unwrap();

    assert_eq!(
        handle.outcome,
        EnsureOutcome::Recreated {
            previous_dimension: 768
        }
    );
    assert_eq!(handle.description.dimension, 1024);
    assert_eq!(
        shared.lock().unwrap().requests,
        vec![
            "GET /indexes",
            "GET /indexes/care",
            "DELETE /indexes/care",
            "GET /indexes/care",
            "GET /indexes/care",
            "POST /indexes",
            "GET /indexes/care",
        ]
    );
}

#[tokio::test]
async fn test_delete_gives_up_when_index_never_disappears() {
    let (shared, addr) = start_controller(768, usize::MAX).await;
    let control = control(addr, Duration::from_millis(50));

    let err = control.delete_index("care").await.unwrap_err();

    match err {
        Error::RemoteService { service, message } => {
            assert_eq!(service, "pinecone");
            assert!(message.contains("still terminating"), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let requests = shared.lock().unwrap().requests.clone();
    assert_eq!(requests[0], "DELETE /indexes/care");
    assert!(requests.len() > 2);
    assert!(requests[1..].iter().all(|r| r == "GET /indexes/care"));
}
