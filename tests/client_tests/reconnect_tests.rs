//! Reconnect Tests
//!
//! Fixed-delay retry after refused attempts and lost connections.

use std::rc::Rc;
use std::time::{Duration, Instant};

use respline::network::{Connection, Connector, LifecycleCallbacks, ReconnectPolicy};
use respline::ClientError;
use tokio::io::AsyncWriteExt;

use crate::support::{next, read_commands, run, Attempt, ScriptedConnector, Sink};

const DELAY: Duration = Duration::from_millis(20);

/// Log every lifecycle event to `sink` before handing it to `inner`
fn recording<C: Connector>(sink: &Sink, inner: LifecycleCallbacks<C>) -> LifecycleCallbacks<C> {
    let connect_sink = sink.clone();
    let disconnect_sink = sink.clone();
    let on_connect = Rc::clone(&inner.on_connect);
    let on_disconnect = Rc::clone(&inner.on_disconnect);

    LifecycleCallbacks::new(
        move |connection: &Connection<C>, error: Option<&ClientError>| {
            match error {
                Some(err) => connect_sink.push(format!("connect failed: {}", err)),
                None => connect_sink.push("connected"),
            }
            on_connect(connection, error);
        },
        move |connection: &Connection<C>, error: Option<&ClientError>| {
            match error {
                Some(err) => disconnect_sink.push(format!("disconnected: {}", err)),
                None => disconnect_sink.push("disconnected"),
            }
            on_disconnect(connection, error);
        },
    )
}

#[test]
fn test_default_policy_waits_one_second() {
    assert_eq!(ReconnectPolicy::default().delay(), Duration::from_secs(1));
    assert_eq!(ReconnectPolicy::fixed(DELAY).delay(), DELAY);
}

#[test]
fn test_refused_attempts_are_retried_after_fixed_delay() {
    run(|handle| async move {
        let (connector, mut servers, attempts) =
            ScriptedConnector::new([Attempt::Refuse, Attempt::Refuse, Attempt::Accept]);
        let (sink, mut log) = Sink::new();

        let ready_sink = sink.clone();
        let policy = ReconnectPolicy::fixed(DELAY).callbacks(move |connection| {
            connection
                .submit("PING", ready_sink.continuation("PING"))
                .unwrap();
        });
        let connection = Connection::new(connector, handle, recording(&sink, policy));

        let started = Instant::now();
        connection.connect().unwrap();

        assert!(next(&mut log).await.starts_with("connect failed"));
        let first_failure = Instant::now();
        assert!(next(&mut log).await.starts_with("connect failed"));
        let second_failure = Instant::now();
        assert_eq!(next(&mut log).await, "connected");
        let connected = Instant::now();

        assert!(second_failure - first_failure >= DELAY);
        assert!(connected - second_failure >= DELAY);
        assert!(connected - started >= DELAY * 2);
        assert_eq!(attempts.get(), 3);

        let mut server = servers.recv().await.unwrap();
        assert_eq!(read_commands(&mut server, 1).await, vec!["PING"]);
        server.write_all(b"+PONG\r\n").await.unwrap();
        assert_eq!(next(&mut log).await, "PING -> status: PONG");
    });
}

#[test]
fn test_retry_that_cannot_start_fails_the_loop() {
    run(|handle| async move {
        let (connector, _servers, attempts) =
            ScriptedConnector::new([Attempt::Refuse, Attempt::FailToStart]);
        let callbacks = ReconnectPolicy::fixed(DELAY).callbacks(|_| {});
        let connection = Connection::new(connector, handle.clone(), callbacks);
        connection.connect().unwrap();

        let outcome = handle.stopped().await;
        assert!(matches!(outcome, Err(ClientError::Connect(_))));
        assert_eq!(attempts.get(), 2);
    });
}

#[test]
fn test_lost_connection_is_reestablished() {
    run(|handle| async move {
        let (connector, mut servers, attempts) =
            ScriptedConnector::new([Attempt::Accept, Attempt::Accept]);
        let (sink, mut log) = Sink::new();
        let policy = ReconnectPolicy::fixed(DELAY).callbacks(|_| {});
        let connection = Connection::new(connector, handle, recording(&sink, policy));
        connection.connect().unwrap();

        assert_eq!(next(&mut log).await, "connected");
        drop(servers.recv().await.unwrap());

        assert!(next(&mut log).await.starts_with("disconnected: transport error"));
        assert_eq!(next(&mut log).await, "connected");
        assert_eq!(attempts.get(), 2);

        let mut server = servers.recv().await.unwrap();
        let reply = connection.request("PING").unwrap();
        assert_eq!(read_commands(&mut server, 1).await, vec!["PING"]);
        server.write_all(b"+PONG\r\n").await.unwrap();
        assert!(reply.await.is_ok());
    });
}

#[test]
fn test_protocol_desync_is_not_retried() {
    run(|handle| async move {
        let (connector, mut servers, attempts) =
            ScriptedConnector::new([Attempt::Accept, Attempt::Accept]);
        let (sink, mut log) = Sink::new();
        let policy = ReconnectPolicy::fixed(DELAY).callbacks(|_| {});
        let connection = Connection::new(connector, handle.clone(), recording(&sink, policy));
        connection.connect().unwrap();

        assert_eq!(next(&mut log).await, "connected");
        let mut server = servers.recv().await.unwrap();
        server.write_all(b":1\r\n").await.unwrap();

        let outcome = handle.stopped().await;
        assert!(matches!(outcome, Err(ClientError::ProtocolDesync)));

        assert!(next(&mut log).await.starts_with("disconnected: protocol desync"));

        tokio::time::sleep(DELAY * 3).await;
        assert!(log.try_recv().is_err());
        assert_eq!(attempts.get(), 1);
    });
}
