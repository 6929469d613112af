use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use core::time::Duration;
use hashd::{JobService, Phase, ServiceConfig};
use hashd_server::server::app;
use tower::ServiceExt;

const ANGRY_MONKEY: &str =
    "ZEHhWB65gUlzdVwtDQArEyx+KVLzp/aTaRaPlBzYRIFj6vjFdqEb0Q5B8zVKCZ0vKbZPZklJz0Fd7su2A+gf7Q==";

fn setup(hash_delay: Duration) -> (JobService, Router) {
    let service = JobService::new(ServiceConfig {
        hash_delay,
        drain_timeout: Duration::from_secs(5),
    });
    let router = app(service.clone());
    (service, router)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn submit(password: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/hash")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("password={password}")))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Polls `GET /hash/{id}` until the digest lands or `deadline` passes.
async fn await_digest(router: &Router, id: &str, deadline: Duration) -> String {
    let uri = format!("/hash/{id}");
    let give_up = tokio::time::Instant::now() + deadline;
    loop {
        let (status, body) = send(router, get(&uri)).await;
        if status == StatusCode::OK {
            return body;
        }
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(
            tokio::time::Instant::now() < give_up,
            "digest for job {id} never landed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn angry_monkey_round_trip() {
    let (_service, router) = setup(Duration::from_millis(100));

    let (status, id) = send(&router, submit("angryMonkey")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(id, "0");

    // Not ready yet.
    let (status, _) = send(&router, get("/hash/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let digest = await_digest(&router, "0", Duration::from_secs(5)).await;
    assert_eq!(digest, ANGRY_MONKEY);
}

#[tokio::test]
async fn blank_password_is_rejected_without_consuming_an_id() {
    let (service, router) = setup(Duration::ZERO);

    let (status, body) = send(&router, submit("")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Password cannot be blank");

    let missing_field = Request::builder()
        .method(Method::POST)
        .uri("/hash")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=bob"))
        .unwrap();
    let (status, _) = send(&router, missing_field).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(service.ledger().is_empty());
    let (_, id) = send(&router, submit("x")).await;
    assert_eq!(id, "0");
}

#[tokio::test]
async fn lookup_errors_map_to_status_codes() {
    let (_service, router) = setup(Duration::from_secs(60));
    send(&router, submit("only")).await;

    let (status, _) = send(&router, get("/hash/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, get("/hash/-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, get("/hash/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, get("/hash/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Pending is reported the same way as missing.
    let (status, _) = send(&router, get("/hash/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_methods_are_refused() {
    let (_service, router) = setup(Duration::ZERO);

    let (status, _) = send(&router, get("/hash")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&router, post("/stats")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn stats_count_hash_requests_only() {
    let (_service, router) = setup(Duration::from_millis(10));

    let (status, body) = send(&router, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "Total": 0, "Average": 0.0 }));

    send(&router, submit("one")).await;
    send(&router, submit("")).await;
    send(&router, get("/hash/0")).await;

    let (status, body) = send(&router, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["Total"], 3);
    assert!(json["Average"].as_f64().unwrap() >= 0.0);
    assert!(json.get("total").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_receive_contiguous_ids() {
    const REQUESTS: usize = 64;
    let (service, router) = setup(Duration::from_millis(20));

    let mut handles = Vec::with_capacity(REQUESTS);
    for n in 0..REQUESTS {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let (status, id) = send(&router, submit(&format!("pw{n}"))).await;
            assert_eq!(status, StatusCode::OK);
            (id.parse::<u64>().unwrap(), format!("pw{n}"))
        }));
    }

    let mut submitted = Vec::with_capacity(REQUESTS);
    for handle in handles {
        submitted.push(handle.await.unwrap());
    }

    let mut ids: Vec<u64> = submitted.iter().map(|(id, _)| *id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..REQUESTS as u64).collect::<Vec<_>>());

    service.initiate_shutdown();
    assert!(service.shutdown_complete().await);

    for (id, password) in &submitted {
        let digest = service.get_job(&id.to_string()).unwrap();
        assert_eq!(&*digest, hashd::digest(password.as_bytes()));
    }
}

#[tokio::test]
async fn shutdown_rejects_new_work_but_keeps_answering() {
    let (service, router) = setup(Duration::ZERO);

    let (status, _) = send(&router, post("/shutdown")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(service.coordinator().phase(), Phase::Terminated);

    let (status, body) = send(&router, submit("late")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "Server Shutting Down");

    let (status, _) = send(&router, get("/hash/0")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&router, get("/stats")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Idempotent.
    let (status, _) = send(&router, get("/shutdown")).await;
    assert_eq!(status, StatusCode::OK);

    // Rejected requests never reach the stats layer.
    assert_eq!(service.get_stats().total_requests, 0);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_requests() {
    let (service, router) = setup(Duration::ZERO);

    // Stand-in for a request that is still being handled.
    let in_flight = service.admit().unwrap();

    let (status, _) = send(&router, post("/shutdown")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(service.coordinator().phase(), Phase::Draining);
    assert!(!service.coordinator().is_terminated());

    let (status, _) = send(&router, submit("late")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    drop(in_flight);
    tokio::time::timeout(Duration::from_secs(1), service.shutdown_complete())
        .await
        .expect("service never terminated");
    assert_eq!(service.coordinator().phase(), Phase::Terminated);
}

#[tokio::test]
async fn served_over_tcp_exits_after_shutdown() {
    let (service, router) = setup(Duration::from_millis(50));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let token = service.coordinator().termination_token();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    });

    let id = service.submit_job(b"angryMonkey").unwrap();
    service.initiate_shutdown();

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    // Outstanding workers are drained before exit.
    assert!(service.shutdown_complete().await);
    assert_eq!(&*service.get_job(&id.to_string()).unwrap(), ANGRY_MONKEY);
}
