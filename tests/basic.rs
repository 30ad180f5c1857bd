mod common;

use reqflow::{Agent, Error};

#[tokio::test]
async fn get_reads_full_buffered_body() {
    let addr = common::spawn_scripted(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello".to_string(),
    ])
    .await;

    let agent = Agent::new();
    let resp = agent.get(&format!("http://{addr}/")).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"hello");
    assert!(resp.history.is_empty());
}

#[tokio::test]
async fn error_status_is_not_an_err_until_raised() {
    let addr = common::spawn_scripted(vec![
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    ])
    .await;

    let agent = Agent::new();
    let resp = agent.get(&format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status, 404);

    let err = resp.raise_for_status().unwrap_err();
    assert_eq!(err.status, 404);
}

#[tokio::test]
async fn head_response_has_no_body_even_with_content_length() {
    let addr = common::spawn_scripted(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 12\r\nConnection: close\r\n\r\n".to_string(),
    ])
    .await;

    let agent = Agent::new();
    let resp = agent.head(&format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status, 200);
    assert!(resp.body.is_empty());
}

#[tokio::test]
async fn connect_failure_is_reported() {
    // Nothing is listening on this port.
    let agent = Agent::new();
    let result = agent.get("http://127.0.0.1:1").await;
    assert!(matches!(result, Err(Error::ConnectionFailed(_)) | Err(Error::Timeout)));
}
