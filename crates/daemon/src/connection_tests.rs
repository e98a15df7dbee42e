use super::*;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

fn connection(
    id: u64,
    registry: &Arc<MutexRegistry>,
) -> (Connection, UnboundedReceiver<ResponseEnvelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut conn = Connection::new(ConnectionId(id), Arc::clone(registry), tx);
    conn.open();
    (conn, rx)
}

fn request(id: u64, request: Request) -> RequestEnvelope {
    RequestEnvelope { id, request }
}

fn lock(key: &str) -> Request {
    Request::Lock {
        key: key.to_string(),
    }
}

fn response(reply: Option<ResponseEnvelope>) -> Response {
    reply.expect("expected immediate reply").response
}

#[tokio::test]
async fn new_connection_walks_lifecycle() {
    let registry = Arc::new(MutexRegistry::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut conn = Connection::new(ConnectionId(1), registry, tx);

    assert_eq!(conn.state(), ConnectionState::Connecting);
    conn.open();
    assert_eq!(conn.state(), ConnectionState::Open);
    conn.begin_close();
    assert_eq!(conn.state(), ConnectionState::Closing);
    conn.close().await;
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn hello_checks_protocol_version() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut conn, _rx) = connection(1, &registry);

    let ok = conn.handle(request(
        1,
        Request::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },
    ));
    assert_eq!(
        response(ok),
        Response::Hello {
            version: PROTOCOL_VERSION.to_string()
        }
    );

    let bad = conn.handle(request(
        2,
        Request::Hello {
            version: "0".to_string(),
        },
    ));
    assert!(matches!(
        response(bad),
        Response::Error {
            kind: ErrorKind::BadRequest,
            ..
        }
    ));
}

#[tokio::test]
async fn reply_echoes_request_id() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut conn, _rx) = connection(1, &registry);

    let reply = conn.handle(request(42, Request::Ping)).unwrap();
    assert_eq!(reply.id, 42);
    assert_eq!(reply.response, Response::Pong);
}

#[tokio::test]
async fn requests_are_attributed_to_connection() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut a, _) = connection(1, &registry);
    let (mut b, _) = connection(2, &registry);

    assert_eq!(response(a.handle(request(1, lock("x")))), Response::Ok);
    assert_eq!(registry.holder("x"), Some(ConnectionId(1)));

    let unlock = b.handle(request(
        1,
        Request::Unlock {
            key: "x".to_string(),
        },
    ));
    assert!(matches!(
        response(unlock),
        Response::Error {
            kind: ErrorKind::NotHolder,
            ..
        }
    ));
    assert_eq!(registry.holder("x"), Some(ConnectionId(1)));
}

#[tokio::test]
async fn lock_twice_reports_already_held() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut a, _) = connection(1, &registry);

    a.handle(request(1, lock("x")));
    let again = a.handle(request(2, lock("x")));
    assert!(matches!(
        response(again),
        Response::Error {
            kind: ErrorKind::AlreadyHeld,
            ..
        }
    ));
}

#[tokio::test]
async fn try_lock_reports_acquired_flag() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut a, _) = connection(1, &registry);
    let (mut b, _) = connection(2, &registry);

    let try_lock = |key: &str| Request::TryLock {
        key: key.to_string(),
    };
    assert_eq!(
        response(a.handle(request(1, try_lock("m")))),
        Response::TryLock { acquired: true }
    );
    assert_eq!(
        response(b.handle(request(1, try_lock("m")))),
        Response::TryLock { acquired: false }
    );
}

#[tokio::test]
async fn queued_lock_replies_on_channel_when_granted() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut a, _) = connection(1, &registry);
    let (mut b, mut b_replies) = connection(2, &registry);

    a.handle(request(1, lock("x")));
    assert!(b.handle(request(9, lock("x"))).is_none());
    assert!(b_replies.try_recv().is_err());

    // Other requests on the waiting connection are still served
    let value = b.handle(request(
        10,
        Request::GetValue {
            key: "x".to_string(),
        },
    ));
    assert_eq!(response(value), Response::Value { value: None });

    a.handle(request(
        2,
        Request::Unlock {
            key: "x".to_string(),
        },
    ));

    let granted = b_replies.recv().await.unwrap();
    assert_eq!(granted.id, 9);
    assert_eq!(granted.response, Response::Ok);
    assert_eq!(registry.holder("x"), Some(ConnectionId(2)));
}

#[tokio::test]
async fn set_and_get_value() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut a, _) = connection(1, &registry);
    let (mut c, _) = connection(3, &registry);

    a.handle(request(1, lock("update-master")));
    let set = a.handle(request(
        2,
        Request::SetValue {
            key: "update-master".to_string(),
            value: Some(json!({"pid": 100})),
        },
    ));
    assert_eq!(response(set), Response::Ok);

    let get = c.handle(request(
        1,
        Request::GetValue {
            key: "update-master".to_string(),
        },
    ));
    assert_eq!(
        response(get),
        Response::Value {
            value: Some(json!({"pid": 100}))
        }
    );
}

#[tokio::test]
async fn requests_after_close_begins_are_rejected() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut a, _) = connection(1, &registry);

    a.begin_close();
    let reply = a.handle(request(5, lock("x")));
    assert!(matches!(
        response(reply),
        Response::Error {
            kind: ErrorKind::ConnectionClosed,
            ..
        }
    ));
    assert!(registry.holder("x").is_none());
}

#[tokio::test]
async fn requests_before_open_are_rejected() {
    let registry = Arc::new(MutexRegistry::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut conn = Connection::new(ConnectionId(1), registry, tx);

    let reply = conn.handle(request(1, Request::Ping));
    assert!(matches!(
        response(reply),
        Response::Error {
            kind: ErrorKind::ConnectionClosed,
            ..
        }
    ));
}

#[tokio::test]
async fn close_releases_holds_and_cancels_waits() {
    let registry = Arc::new(MutexRegistry::new());
    let (mut a, _) = connection(1, &registry);
    let (mut b, mut b_replies) = connection(2, &registry);
    let (mut c, mut c_replies) = connection(3, &registry);

    // A holds k, B holds m; A waits on m; C waits on k
    a.handle(request(1, lock("k")));
    b.handle(request(1, lock("m")));
    assert!(a.handle(request(2, lock("m"))).is_none());
    assert!(c.handle(request(1, lock("k"))).is_none());

    let summary = a.close().await;
    assert_eq!(summary.released, vec!["k".to_string()]);
    assert_eq!(summary.cancelled, 1);
    assert_eq!(a.state(), ConnectionState::Closed);

    let granted = c_replies.recv().await.unwrap();
    assert_eq!(granted.response, Response::Ok);
    assert_eq!(registry.holder("k"), Some(ConnectionId(3)));

    b.handle(request(
        2,
        Request::Unlock {
            key: "m".to_string(),
        },
    ));
    assert!(registry.holder("m").is_none());
    assert!(b_replies.try_recv().is_err());

    // Closing twice is harmless
    assert_eq!(a.close().await, DisconnectSummary::default());
}
