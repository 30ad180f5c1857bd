mod common;

use reqflow::{Agent, Auth};

#[tokio::test]
async fn set_cookie_is_absorbed_into_the_jar() {
    let addr = common::spawn_scripted(vec![
        "HTTP/1.1 200 OK\r\nSet-Cookie: session=abc123; Path=/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string(),
    ])
    .await;

    let agent = Agent::new();
    agent.get(&format!("http://{addr}/")).await.unwrap();

    let url = url::Url::parse(&format!("http://{addr}/")).unwrap();
    assert_eq!(agent.cookies().serialize_header(&url), "session=abc123");
}

#[tokio::test]
async fn digest_challenge_triggers_one_retry_that_succeeds() {
    let addr = common::spawn_scripted(vec![
        r#"HTTP/1.1 401 Unauthorized
WWW-Authenticate: Digest realm="r", nonce="n1", qop="auth"
Content-Length: 0
Connection: close

"#
        .replace('\n', "\r\n"),
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string(),
    ])
    .await;

    let agent = reqflow::AgentBuilder::new()
        .auth(Auth::digest("user", "pass"))
        .build();
    let resp = agent.get(&format!("http://{addr}/secure")).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"ok");
}
