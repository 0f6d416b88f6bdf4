//! Protocol-level scenarios against a fake in-process WebSocket server.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use gremlink_client::{
    BufferRegistry, ClientError, ConnectOptions, Connection, Credentials, Deadline, Operator,
};
use gremlink_wire::{ops, processors, Bindings, Request, Response};

type ServerWs = WebSocketStream<TcpStream>;

/// Binds an ephemeral port, serves exactly one connection with the
/// handler, and returns the ws:// address.
async fn spawn_server<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = accept_async(stream).await.expect("handshake");
        handler(ws).await;
    });
    format!("ws://{}", addr)
}

/// Splits a client frame into its content type and JSON body.
fn decode_frame(data: &[u8]) -> (String, Value) {
    let len = data[0] as usize;
    let mime = String::from_utf8(data[1..1 + len].to_vec()).expect("mime utf8");
    let body = serde_json::from_slice(&data[1 + len..]).expect("body json");
    (mime, body)
}

async fn read_request(ws: &mut ServerWs) -> (String, Value) {
    loop {
        match ws.next().await.expect("request").expect("frame") {
            Message::Binary(data) => return decode_frame(&data),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

async fn send_response(ws: &mut ServerWs, request_id: &str, code: u16, data: Value) {
    let body = json!({
        "requestId": request_id,
        "status": {"code": code, "attributes": {}, "message": ""},
        "result": {"data": data, "meta": {}},
    });
    ws.send(Message::text(body.to_string())).await.expect("send");
}

async fn send_error(ws: &mut ServerWs, request_id: &str, code: u16, message: &str) {
    let body = json!({
        "requestId": request_id,
        "status": {"code": code, "attributes": {}, "message": message},
        "result": {"data": null, "meta": {}},
    });
    ws.send(Message::text(body.to_string())).await.expect("send");
}

fn request_id(request: &Value) -> String {
    request["requestId"].as_str().expect("requestId").to_string()
}

async fn dial(addr: &str, options: ConnectOptions) -> Connection {
    let registry = BufferRegistry::new();
    Connection::dial(Deadline::after(Duration::from_secs(5)), addr, options, &registry)
        .await
        .expect("dial")
}

#[tokio::test]
async fn streams_partials_then_terminal_in_order() -> anyhow::Result<()> {
    let addr = spawn_server(|mut ws| async move {
        let (mime, request) = read_request(&mut ws).await;
        assert_eq!(mime, "application/json");
        assert_eq!(request["op"], "eval");
        assert_eq!(request["processor"], "");
        let id = request_id(&request);
        send_response(&mut ws, &id, 206, json!([1])).await;
        send_response(&mut ws, &id, 206, json!([2])).await;
        send_response(&mut ws, &id, 200, json!([3])).await;
    })
    .await;

    let operator = Operator::new(dial(&addr, ConnectOptions::default()).await);

    let mut seen: Vec<(u16, Option<String>)> = Vec::new();
    operator
        .eval_default(
            Deadline::after(Duration::from_secs(5)),
            "g.V()",
            Bindings::new(),
            &mut |resp: &Response| {
                let data = resp.result.data.as_ref().map(|d| d.get().to_string());
                seen.push((resp.status.code.0, data));
            },
        )
        .await?;

    assert_eq!(
        seen,
        vec![
            (206, Some("[1]".to_string())),
            (206, Some("[2]".to_string())),
            (200, Some("[3]".to_string())),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn answers_auth_challenge_without_caller_noticing() -> anyhow::Result<()> {
    let addr = spawn_server(|mut ws| async move {
        let (_, request) = read_request(&mut ws).await;
        assert_eq!(request["op"], "eval");
        let id = request_id(&request);

        send_error(&mut ws, &id, 407, "challenge").await;

        let (_, auth) = read_request(&mut ws).await;
        assert_eq!(auth["op"], "authentication");
        assert_eq!(auth["processor"], "");
        assert_eq!(request_id(&auth), id);
        assert_eq!(auth["args"]["sasl"], "AGZyZWQAcGFzcw==");
        assert_eq!(auth["args"]["saslMechanism"], "PLAIN");

        send_response(&mut ws, &id, 206, json!(["row"])).await;
        send_response(&mut ws, &id, 200, json!([])).await;
    })
    .await;

    let options = ConnectOptions {
        credentials: Some(Credentials {
            username: "fred".to_string(),
            password: "pass".to_string(),
        }),
        ..ConnectOptions::default()
    };
    let operator = Operator::new(dial(&addr, options).await);

    let mut codes = Vec::new();
    operator
        .eval_default(
            Deadline::after(Duration::from_secs(5)),
            "g.V()",
            Bindings::new(),
            &mut |resp: &Response| codes.push(resp.status.code.0),
        )
        .await?;

    // The caller sees only the resumed result stream, never the 407.
    assert_eq!(codes, vec![206, 200]);
    Ok(())
}

#[tokio::test]
async fn repeated_auth_challenge_fails_instead_of_looping() {
    let addr = spawn_server(|mut ws| async move {
        let (_, request) = read_request(&mut ws).await;
        let id = request_id(&request);
        send_error(&mut ws, &id, 407, "challenge").await;
        let (_, auth) = read_request(&mut ws).await;
        assert_eq!(auth["op"], "authentication");
        send_error(&mut ws, &id, 407, "bad credentials").await;
    })
    .await;

    let options = ConnectOptions {
        credentials: Some(Credentials {
            username: "fred".to_string(),
            password: "wrong".to_string(),
        }),
        ..ConnectOptions::default()
    };
    let operator = Operator::new(dial(&addr, options).await);

    let err = operator
        .eval_default(
            Deadline::after(Duration::from_secs(5)),
            "g.V()",
            Bindings::new(),
            &mut |_: &Response| {},
        )
        .await
        .unwrap_err();
    assert!(err.is_authenticate());
}

#[tokio::test]
async fn challenge_without_credentials_is_an_error() {
    let addr = spawn_server(|mut ws| async move {
        let (_, request) = read_request(&mut ws).await;
        let id = request_id(&request);
        send_error(&mut ws, &id, 407, "challenge").await;
    })
    .await;

    let operator = Operator::new(dial(&addr, ConnectOptions::default()).await);

    let err = operator
        .eval_default(
            Deadline::after(Duration::from_secs(5)),
            "g.V()",
            Bindings::new(),
            &mut |_: &Response| {},
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MissingCredentials));
}

#[tokio::test]
async fn error_status_propagates_without_callbacks() {
    let addr = spawn_server(|mut ws| async move {
        let (_, request) = read_request(&mut ws).await;
        let id = request_id(&request);
        send_error(&mut ws, &id, 597, "syntax error").await;
    })
    .await;

    let operator = Operator::new(dial(&addr, ConnectOptions::default()).await);

    let mut calls = 0usize;
    let err = operator
        .eval_default(
            Deadline::after(Duration::from_secs(5)),
            "g.V(",
            Bindings::new(),
            &mut |_: &Response| calls += 1,
        )
        .await
        .unwrap_err();

    assert!(err.is_script_evaluation_error());
    assert_eq!(calls, 0);
    let response = err.response().expect("response error");
    assert_eq!(response.message, "syntax error");
}

#[tokio::test]
async fn unknown_status_code_is_an_invalid_error() {
    let addr = spawn_server(|mut ws| async move {
        let (_, request) = read_request(&mut ws).await;
        let id = request_id(&request);
        send_error(&mut ws, &id, 123, "???").await;
    })
    .await;

    let operator = Operator::new(dial(&addr, ConnectOptions::default()).await);

    let err = operator
        .eval_default(
            Deadline::after(Duration::from_secs(5)),
            "g.V()",
            Bindings::new(),
            &mut |_: &Response| {},
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_status());
}

#[tokio::test]
async fn silent_server_hits_the_deadline() {
    let addr = spawn_server(|mut ws| async move {
        let _ = read_request(&mut ws).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    })
    .await;

    let operator = Operator::new(dial(&addr, ConnectOptions::default()).await);

    let started = Instant::now();
    let err = operator
        .eval_default(
            Deadline::after(Duration::from_millis(200)),
            "g.V()",
            Bindings::new(),
            &mut |_: &Response| {},
        )
        .await
        .unwrap_err();

    assert!(err.is_deadline_exceeded());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn deadline_aborts_a_stalled_partial_stream() {
    let addr = spawn_server(|mut ws| async move {
        let (_, request) = read_request(&mut ws).await;
        let id = request_id(&request);
        send_response(&mut ws, &id, 206, json!([1])).await;
        // Never send the rest of the stream.
        tokio::time::sleep(Duration::from_secs(30)).await;
    })
    .await;

    let operator = Operator::new(dial(&addr, ConnectOptions::default()).await);

    let mut calls = 0usize;
    let err = operator
        .eval_default(
            Deadline::after(Duration::from_millis(300)),
            "g.V()",
            Bindings::new(),
            &mut |_: &Response| calls += 1,
        )
        .await
        .unwrap_err();

    assert!(err.is_deadline_exceeded());
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn process_after_close_fails() -> anyhow::Result<()> {
    let addr = spawn_server(|mut ws| async move {
        // Wait for the client to go away.
        while ws.next().await.is_some() {}
    })
    .await;

    let conn = dial(&addr, ConnectOptions::default()).await;
    conn.close().await?;
    conn.close().await?; // idempotent

    let request = Request::new(processors::DEFAULT, ops::EVAL, json!({}))?;
    let err = conn
        .process_request(Deadline::NONE, &request, &mut |_: &Response| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_serialize_on_one_connection() -> anyhow::Result<()> {
    let addr = spawn_server(|mut ws| async move {
        for _ in 0..2 {
            let (_, request) = read_request(&mut ws).await;
            let id = request_id(&request);
            send_response(&mut ws, &id, 200, json!(["done"])).await;
        }
    })
    .await;

    let conn = std::sync::Arc::new(dial(&addr, ConnectOptions::default()).await);
    let operator = Operator::new(conn);
    let deadline = Deadline::after(Duration::from_secs(5));

    let mut cb_a = |_: &Response| {};
    let mut cb_b = |_: &Response| {};
    let (a, b) = tokio::join!(
        operator.eval_default(deadline, "g.V()", Bindings::new(), &mut cb_a),
        operator.eval_default(deadline, "g.E()", Bindings::new(), &mut cb_b),
    );
    a?;
    b?;
    Ok(())
}
