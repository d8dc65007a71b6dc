/// Integration tests for the server-sent events stream
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use futures::StreamExt;
use opslog::{
    handlers::AppState,
    logs::{LogLevel, LogService},
    server::{create_router, serve},
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Open the stream and return the body as a stream of text chunks
async fn open_stream(
    service: &Arc<LogService>,
    uri: &str,
    last_event_id: Option<&str>,
) -> impl futures::Stream<Item = String> + Unpin {
    let mut builder = Request::builder().uri(uri);
    if let Some(id) = last_event_id {
        builder = builder.header("last-event-id", id);
    }

    let response = create_router(AppState::new(service.clone()))
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    response
        .into_body()
        .into_data_stream()
        .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
}

/// Read until `count` events have arrived or the deadline passes
async fn read_events(
    stream: &mut (impl futures::Stream<Item = String> + Unpin),
    count: usize,
) -> Vec<String> {
    let mut buffer = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);

    while buffer.matches("\n\n").count() < count {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(chunk)) => buffer.push_str(&chunk),
            _ => break,
        }
    }

    buffer
        .split("\n\n")
        .filter(|e| !e.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn field<'a>(event: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{}:", name);
    event
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(str::trim)
}

fn event_ids(events: &[String]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| field(e, "id"))
        .map(|id| id.parse().unwrap())
        .collect()
}

#[tokio::test]
async fn test_stream_replays_after_cursor_then_goes_live() {
    let service = Arc::new(LogService::default());
    for msg in ["one", "two", "three"] {
        service.log(LogLevel::Info, msg, Some("app"), None);
    }

    let mut stream = open_stream(&service, "/logs/stream?after=1", None).await;
    let events = read_events(&mut stream, 2).await;
    assert_eq!(event_ids(&events), vec![2, 3]);

    let data: serde_json::Value = serde_json::from_str(field(&events[0], "data").unwrap()).unwrap();
    assert_eq!(data["msg"], "two");
    assert_eq!(data["source"], "app");

    service.log(LogLevel::Error, "four", Some("app"), None);
    let events = read_events(&mut stream, 1).await;
    assert_eq!(event_ids(&events), vec![4]);
}

#[tokio::test]
async fn test_stream_resumes_from_last_event_id() {
    let service = Arc::new(LogService::default());
    for msg in ["one", "two", "three"] {
        service.log(LogLevel::Info, msg, None, None);
    }

    let mut stream = open_stream(&service, "/logs/stream", Some("2")).await;
    let events = read_events(&mut stream, 1).await;
    assert_eq!(event_ids(&events), vec![3]);
}

#[tokio::test]
async fn test_stream_query_cursor_wins_over_header() {
    let service = Arc::new(LogService::default());
    for msg in ["one", "two", "three"] {
        service.log(LogLevel::Info, msg, None, None);
    }

    let mut stream = open_stream(&service, "/logs/stream?after=0", Some("2")).await;
    let events = read_events(&mut stream, 3).await;
    assert_eq!(event_ids(&events), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_stream_without_cursor_is_live_only() {
    let service = Arc::new(LogService::default());
    for msg in ["one", "two"] {
        service.log(LogLevel::Info, msg, None, None);
    }

    let mut stream = open_stream(&service, "/logs/stream", None).await;
    service.log(LogLevel::Info, "three", None, None);

    let events = read_events(&mut stream, 1).await;
    assert_eq!(event_ids(&events), vec![3]);
}

#[tokio::test]
async fn test_stream_signals_overflow() {
    let service = Arc::new(LogService::with_capacity(100, 4));

    let mut stream = open_stream(&service, "/logs/stream", None).await;
    assert_eq!(service.subscriber_count(), 1);

    // Nothing reads the stream while these are published
    for i in 0..10 {
        service.log(LogLevel::Info, &format!("burst {}", i), None, None);
    }

    let events = read_events(&mut stream, 1).await;
    assert_eq!(field(&events[0], "event"), Some("warning"));
    let data: serde_json::Value = serde_json::from_str(field(&events[0], "data").unwrap()).unwrap();
    assert_eq!(data["warning"], "queue full");
    assert!(data["last_id"].is_null());

    service.log(LogLevel::Info, "after burst", None, None);
    let events = read_events(&mut stream, 2).await;
    assert_eq!(event_ids(&events).last(), Some(&11));
}

#[tokio::test]
async fn test_stream_overflow_reports_last_delivered_id() {
    let service = Arc::new(LogService::with_capacity(100, 4));
    for msg in ["one", "two"] {
        service.log(LogLevel::Info, msg, None, None);
    }

    let mut stream = open_stream(&service, "/logs/stream?after=0", None).await;
    let events = read_events(&mut stream, 2).await;
    assert_eq!(event_ids(&events), vec![1, 2]);

    service.log(LogLevel::Info, "three", None, None);
    let events = read_events(&mut stream, 1).await;
    assert_eq!(event_ids(&events), vec![3]);

    for i in 0..10 {
        service.log(LogLevel::Info, &format!("burst {}", i), None, None);
    }

    let events = read_events(&mut stream, 1).await;
    assert_eq!(field(&events[0], "event"), Some("warning"));
    let data: serde_json::Value = serde_json::from_str(field(&events[0], "data").unwrap()).unwrap();
    assert_eq!(data["last_id"], 3);

    // The dropped range is still retained and reachable with that cursor
    let page = service.get_page(&opslog::logs::LogQuery {
        after: Some(3),
        limit: 0,
        ..Default::default()
    });
    assert_eq!(page.items.len(), 10);
}

#[tokio::test]
async fn test_stream_cursor_ahead_of_fresh_store_still_goes_live() {
    // A client reconnecting after a restart carries an id the new process never issued
    let service = Arc::new(LogService::default());

    let mut stream = open_stream(&service, "/logs/stream", Some("500")).await;
    for msg in ["one", "two", "three"] {
        service.log(LogLevel::Info, msg, None, None);
    }

    let events = read_events(&mut stream, 3).await;
    assert_eq!(event_ids(&events), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_stream_cursor_ahead_of_store_replays_retained_entries() {
    let service = Arc::new(LogService::default());
    for msg in ["one", "two"] {
        service.log(LogLevel::Info, msg, None, None);
    }

    let mut stream = open_stream(&service, "/logs/stream?after=500", None).await;
    let events = read_events(&mut stream, 2).await;
    assert_eq!(event_ids(&events), vec![1, 2]);

    service.log(LogLevel::Info, "three", None, None);
    let events = read_events(&mut stream, 1).await;
    assert_eq!(event_ids(&events), vec![3]);
}

#[tokio::test]
async fn test_graceful_shutdown_ends_open_streams() {
    let service = Arc::new(LogService::default());
    service.log(LogLevel::Info, "before shutdown", None, None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve(
        listener,
        AppState::new(service.clone()),
        async move {
            let _ = shutdown_rx.await;
        },
    ));

    let response = reqwest::get(format!("http://{}/logs/stream?after=0", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let mut body = response.bytes_stream();
    let first = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&first).contains("before shutdown"));
    assert_eq!(service.subscriber_count(), 1);

    shutdown_tx.send(()).unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(3), server).await;
    assert!(stopped.is_ok(), "server kept running with a stream open");
    stopped.unwrap().unwrap().unwrap();
    assert_eq!(service.subscriber_count(), 0);

    // The client sees the body end rather than hang
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(_)) = body.next().await {}
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test]
async fn test_stream_disconnect_unsubscribes() {
    let service = Arc::new(LogService::default());

    let stream = open_stream(&service, "/logs/stream", None).await;
    assert_eq!(service.subscriber_count(), 1);

    drop(stream);
    assert_eq!(service.subscriber_count(), 0);
}
