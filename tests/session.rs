// ABOUTME: Integration tests for session connect, host key checks and authentication.
// ABOUTME: Runs against the scripted transport so no SSH server is needed.

mod support;

use sshtask::ssh::{AuthMethod, ConnectionState, Error, FingerprintAlgorithm, Session};
use support::scripted::{AuthOutcome, HOST_KEY, ScriptedTransport};

fn session(transport: &ScriptedTransport, auth: Vec<AuthMethod>) -> Session<ScriptedTransport> {
    Session::with_transport(transport.clone(), "scripted.test", 22, "deploy", auth)
}

#[tokio::test]
async fn connect_marks_session_connected() {
    support::init_tracing();
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::None]);

    assert_eq!(session.state(), ConnectionState::Unconnected);
    session.connect().await.unwrap();

    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.connection().is_ok());
    assert!(!session.host_key_verified());
}

/// Test: Methods are tried in order and the first success wins.
/// Expected: Later methods are never attempted.
#[tokio::test]
async fn authentication_stops_at_first_success() {
    let transport = ScriptedTransport::new();
    transport
        .auth("none", AuthOutcome::Reject)
        .auth("agent", AuthOutcome::Reject)
        .auth("password", AuthOutcome::Accept)
        .auth("publickey", AuthOutcome::Accept);

    let mut session = session(
        &transport,
        vec![
            AuthMethod::None,
            AuthMethod::Agent,
            AuthMethod::password("hunter2"),
            AuthMethod::key_pair("/keys/id_ed25519"),
        ],
    );
    session.connect().await.unwrap();

    assert_eq!(
        transport.script().auth_attempts,
        vec!["none", "agent", "password"]
    );
}

/// Test: A method that errors is treated like a rejection.
/// Expected: The next method is tried and succeeds.
#[tokio::test]
async fn authentication_errors_fall_through() {
    let transport = ScriptedTransport::new();
    transport
        .auth("agent", AuthOutcome::Fail)
        .auth("publickey", AuthOutcome::Accept);

    let mut session = session(
        &transport,
        vec![AuthMethod::Agent, AuthMethod::key_pair("/keys/id_rsa")],
    );
    session.connect().await.unwrap();

    assert_eq!(transport.script().auth_attempts, vec!["agent", "publickey"]);
    assert!(session.is_connected());
}

#[tokio::test]
async fn authentication_failure_when_every_method_is_rejected() {
    let transport = ScriptedTransport::new();
    transport
        .auth("none", AuthOutcome::Reject)
        .auth("password", AuthOutcome::Fail);

    let mut session = session(
        &transport,
        vec![AuthMethod::None, AuthMethod::password("wrong")],
    );
    let err = session.connect().await.unwrap_err();

    assert!(matches!(err, Error::AuthenticationFailed));
    assert_eq!(session.state(), ConnectionState::Unconnected);
    assert!(matches!(session.connection(), Err(Error::NotConnected)));
}

#[tokio::test]
async fn empty_method_list_fails_authentication() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, Vec::new());

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed));
    assert!(transport.script().auth_attempts.is_empty());
}

#[tokio::test]
async fn md5_fingerprint_is_selected_by_length() {
    let transport = ScriptedTransport::new();
    let expected = FingerprintAlgorithm::Md5.digest_hex(HOST_KEY);
    assert_eq!(expected.len(), 32);

    let mut session = session(&transport, vec![AuthMethod::None]).expected_fingerprint(expected);
    session.connect().await.unwrap();

    assert!(session.host_key_verified());
    assert_eq!(
        transport.script().fingerprint_requests,
        vec![FingerprintAlgorithm::Md5]
    );
}

#[tokio::test]
async fn sha1_fingerprint_matches_case_insensitively() {
    let transport = ScriptedTransport::new();
    let expected = FingerprintAlgorithm::Sha1
        .digest_hex(HOST_KEY)
        .to_ascii_uppercase();

    let mut session = session(&transport, vec![AuthMethod::None]).expected_fingerprint(expected);
    session.connect().await.unwrap();

    assert!(session.host_key_verified());
    assert_eq!(
        transport.script().fingerprint_requests,
        vec![FingerprintAlgorithm::Sha1]
    );
}

/// Test: A wrong fingerprint aborts the connect.
/// Expected: FingerprintMismatch, and no credentials are offered.
#[tokio::test]
async fn fingerprint_mismatch_stops_before_authentication() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::password("secret")])
        .expected_fingerprint("00112233445566778899aabbccddeeff");

    let err = session.connect().await.unwrap_err();

    match err {
        Error::FingerprintMismatch { expected, actual } => {
            assert_eq!(expected, "00112233445566778899aabbccddeeff");
            assert_eq!(actual, FingerprintAlgorithm::Md5.digest_hex(HOST_KEY));
        }
        other => panic!("expected FingerprintMismatch, got {other:?}"),
    }
    assert!(transport.script().auth_attempts.is_empty());
    assert!(!session.is_connected());
}

/// Test: A fingerprint written with colons is set directly on the session.
/// Expected: InvalidFingerprint before any connection is opened.
#[tokio::test]
async fn non_hex_fingerprint_is_rejected_before_connecting() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::None])
        .expected_fingerprint("d4:1d:8c:d9:8f:00:b2:04:e9:80:09:98:ec:f8:42:7e");

    let err = session.connect().await.unwrap_err();

    assert!(matches!(err, Error::InvalidFingerprint(fp) if fp.starts_with("d4:1d")));
    assert_eq!(transport.script().opened, 0);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn unavailable_fingerprint_skips_verification() {
    let transport = ScriptedTransport::new();
    transport.script().host_key = None;

    let mut session = session(&transport, vec![AuthMethod::None])
        .expected_fingerprint("00112233445566778899aabbccddeeff");
    session.connect().await.unwrap();

    assert!(session.is_connected());
    assert!(!session.host_key_verified());
}

#[tokio::test]
async fn open_failure_becomes_connection_error() {
    let transport = ScriptedTransport::new();
    transport.script().open_error = Some("connection refused".to_string());

    let mut session = session(&transport, vec![AuthMethod::None]);
    let err = session.connect().await.unwrap_err();

    match err {
        Error::Connection(message) => assert!(message.contains("connection refused")),
        other => panic!("expected Connection error, got {other:?}"),
    }
    assert!(matches!(session.connection(), Err(Error::NotConnected)));
}

#[tokio::test]
async fn connection_is_unavailable_before_connect() {
    let transport = ScriptedTransport::new();
    let session = session(&transport, vec![AuthMethod::None]);

    assert!(matches!(session.connection(), Err(Error::NotConnected)));
    assert_eq!(transport.script().opened, 0);
}

/// Test: The transport reports a disconnect from its own task.
/// Expected: The session reads as unconnected without any call on it.
#[tokio::test]
async fn disconnect_callback_marks_session_unconnected() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::None]);
    session.connect().await.unwrap();

    transport.fire_disconnect(0);

    assert_eq!(session.state(), ConnectionState::Unconnected);
    assert!(matches!(session.connection(), Err(Error::NotConnected)));
}

/// Test: A late disconnect from a replaced connection arrives.
/// Expected: The current connection stays connected.
#[tokio::test]
async fn stale_disconnect_does_not_affect_new_connection() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::None]);

    session.connect().await.unwrap();
    transport.fire_disconnect(0);
    session.connect().await.unwrap();
    transport.fire_disconnect(0);

    assert_eq!(transport.script().opened, 2);
    assert!(session.is_connected());
}

#[tokio::test]
async fn disconnect_closes_connection_once() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::None]);
    session.connect().await.unwrap();

    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();

    assert_eq!(transport.script().disconnects, 1);
    assert_eq!(session.state(), ConnectionState::Unconnected);
}

#[tokio::test]
async fn disconnect_after_remote_drop_skips_transport() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::None]);
    session.connect().await.unwrap();
    transport.fire_disconnect(0);

    session.disconnect().await.unwrap();

    assert_eq!(transport.script().disconnects, 0);
}

#[tokio::test]
async fn disconnect_on_unconnected_session_is_noop() {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport, vec![AuthMethod::None]);

    session.disconnect().await.unwrap();
    assert_eq!(transport.script().disconnects, 0);
}
