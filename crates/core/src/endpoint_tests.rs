use super::*;
use yare::parameterized;

#[parameterized(
    tcp_scheme = { "tcp://127.0.0.1:7070" },
    bare_ipv4 = { "127.0.0.1:7070" },
    bare_ipv6 = { "[::1]:7070" },
)]
fn parses_tcp(input: &str) {
    let endpoint: Endpoint = input.parse().unwrap();
    assert!(matches!(endpoint, Endpoint::Tcp(_)), "got {:?}", endpoint);
}

#[parameterized(
    unix_scheme = { "unix:///tmp/mx/mx.sock", "/tmp/mx/mx.sock" },
    bare_absolute = { "/tmp/mx/mx.sock", "/tmp/mx/mx.sock" },
    bare_relative = { "mx.sock", "mx.sock" },
)]
fn parses_unix(input: &str, expected: &str) {
    let endpoint: Endpoint = input.parse().unwrap();
    assert_eq!(endpoint, Endpoint::Unix(PathBuf::from(expected)));
}

#[test]
fn rejects_empty() {
    assert_eq!("  ".parse::<Endpoint>(), Err(EndpointError::Empty));
    assert_eq!("unix://".parse::<Endpoint>(), Err(EndpointError::Empty));
}

#[test]
fn rejects_bad_tcp_address() {
    assert_eq!(
        "tcp://localhost".parse::<Endpoint>(),
        Err(EndpointError::InvalidTcp("localhost".to_string()))
    );
}

#[test]
fn display_uses_scheme() {
    let unix = Endpoint::Unix(PathBuf::from("/tmp/mx.sock"));
    assert_eq!(unix.to_string(), "unix:///tmp/mx.sock");

    let tcp: Endpoint = "127.0.0.1:9000".parse().unwrap();
    assert_eq!(tcp.to_string(), "tcp://127.0.0.1:9000");
    assert_eq!(tcp.to_string().parse::<Endpoint>().unwrap(), tcp);
}
