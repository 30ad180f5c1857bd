mod common;

use reqflow::{Agent, Error, RequestOptions};

#[tokio::test]
async fn follows_redirect_chain_and_records_history() {
    let addr = common::spawn_scripted(vec![
        "HTTP/1.1 302 Found\r\nLocation: /next\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string(),
    ])
    .await;

    let agent = Agent::new();
    let resp = agent.get(&format!("http://{addr}/start")).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"ok");
    assert_eq!(resp.history.len(), 1);
    assert_eq!(resp.history[0].status, 302);
}

#[tokio::test]
async fn exceeding_max_redirects_is_an_error() {
    let addr = common::spawn_scripted(vec![
        "HTTP/1.1 302 Found\r\nLocation: /a\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
        "HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
    ])
    .await;

    let agent = Agent::new();
    let options = RequestOptions::new().max_redirects(1);
    let result = agent.request("GET", &format!("http://{addr}/start"), options).await;

    assert!(matches!(result, Err(Error::TooManyRedirects)));
}

#[tokio::test]
async fn post_303_rewrites_to_get_and_drops_body() {
    let addr = common::spawn_scripted(vec![
        "HTTP/1.1 303 See Other\r\nLocation: /done\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    ])
    .await;

    let agent = Agent::new();
    let options = RequestOptions::new().raw_body(b"payload".to_vec());
    let resp = agent.post(&format!("http://{addr}/form"), options).await.unwrap();

    assert_eq!(resp.status, 200);
}
