//! Tests for the bidirectional relay pump

use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, Instant};

use netrelay::relay::{pump, RelayLimits, RelayOutcome};

#[tokio::test]
async fn test_round_trip_and_double_eof() {
    let (local_in, mut local_feed) = duplex(1024);
    let (local_out, mut local_sink) = duplex(1024);
    let (remote_in, mut remote_feed) = duplex(1024);
    let (remote_out, mut remote_sink) = duplex(1024);

    let task = tokio::spawn(async move {
        let mut local_read = local_in;
        let mut local_write = local_out;
        let mut remote_read = remote_in;
        let mut remote_write = remote_out;
        pump(
            &mut local_read,
            &mut local_write,
            &mut remote_read,
            &mut remote_write,
            RelayLimits::default(),
        )
        .await
    });

    local_feed.write_all(b"ping\n").await.unwrap();
    let mut buf = [0u8; 5];
    remote_sink.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping\n");

    remote_feed.write_all(b"pong").await.unwrap();
    let mut buf = [0u8; 4];
    local_sink.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    // EOF both directions ends the relay cleanly.
    drop(local_feed);
    drop(remote_feed);

    let (outcome, session) = task.await.unwrap().unwrap();
    assert_eq!(outcome, RelayOutcome::Closed);
    assert_eq!(session.bytes_out(), 5);
    assert_eq!(session.bytes_in(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_ends_relay_successfully() {
    let (local_in, mut local_feed) = duplex(1024);
    let (local_out, _local_sink) = duplex(1024);
    let (remote_in, _remote_feed) = duplex(1024);
    let (remote_out, mut remote_sink) = duplex(1024);

    let limits = RelayLimits {
        idle_timeout: Some(Duration::from_secs(5)),
        quit_delay: None,
    };
    let task = tokio::spawn(async move {
        let mut local_read = local_in;
        let mut local_write = local_out;
        let mut remote_read = remote_in;
        let mut remote_write = remote_out;
        pump(
            &mut local_read,
            &mut local_write,
            &mut remote_read,
            &mut remote_write,
            limits,
        )
        .await
    });

    // Traffic re-arms the idle deadline.
    local_feed.write_all(b"data").await.unwrap();
    let mut buf = [0u8; 4];
    remote_sink.read_exact(&mut buf).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    local_feed.write_all(b"more").await.unwrap();
    remote_sink.read_exact(&mut buf).await.unwrap();

    let quiet_since = Instant::now();
    let (outcome, session) = task.await.unwrap().unwrap();
    assert_eq!(outcome, RelayOutcome::IdleExpired);
    assert_eq!(session.bytes_out(), 8);

    let waited = quiet_since.elapsed();
    assert!(waited >= Duration::from_secs(5), "expired early: {waited:?}");
    assert!(waited < Duration::from_secs(6), "expired late: {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn test_quit_delay_fires_despite_remote_traffic() {
    let (local_in, mut local_feed) = duplex(1024);
    let (local_out, _local_sink) = duplex(1024);
    let (remote_in, mut remote_feed) = duplex(1024);
    let (remote_out, mut remote_sink) = duplex(1024);

    let limits = RelayLimits {
        idle_timeout: None,
        quit_delay: Some(Duration::from_secs(2)),
    };
    let task = tokio::spawn(async move {
        let mut local_read = local_in;
        let mut local_write = local_out;
        let mut remote_read = remote_in;
        let mut remote_write = remote_out;
        pump(
            &mut local_read,
            &mut local_write,
            &mut remote_read,
            &mut remote_write,
            limits,
        )
        .await
    });

    local_feed.write_all(b"bye").await.unwrap();
    let mut buf = [0u8; 3];
    remote_sink.read_exact(&mut buf).await.unwrap();

    let eof_at = Instant::now();
    drop(local_feed);

    // The remote side keeps talking through the grace window; the relay must
    // still terminate Q seconds after local EOF.
    let writer = tokio::spawn(async move {
        loop {
            if remote_feed.write_all(b"tick").await.is_err() {
                break;
            }
            sleep(Duration::from_millis(500)).await;
        }
    });

    let (outcome, session) = task.await.unwrap().unwrap();
    assert_eq!(outcome, RelayOutcome::QuitExpired);
    assert!(session.bytes_in() > 0, "remote traffic was not relayed");

    let waited = eof_at.elapsed();
    assert!(waited >= Duration::from_secs(2), "quit early: {waited:?}");
    assert!(waited < Duration::from_millis(2600), "quit late: {waited:?}");

    writer.abort();
}

/// Terminating via idle timeout after all data has moved must produce the
/// same observable output as terminating via double EOF.
#[tokio::test(start_paused = true)]
async fn test_idle_and_eof_termination_produce_identical_output() {
    async fn run_once(idle_timeout: Option<Duration>, close_feeds: bool) -> (RelayOutcome, Vec<u8>) {
        let (local_in, mut local_feed) = duplex(1024);
        let (local_out, _local_sink) = duplex(1024);
        let (remote_in, remote_feed) = duplex(1024);
        let (remote_out, mut remote_sink) = duplex(1024);

        let limits = RelayLimits {
            idle_timeout,
            quit_delay: None,
        };
        let task = tokio::spawn(async move {
            let mut local_read = local_in;
            let mut local_write = local_out;
            let mut remote_read = remote_in;
            let mut remote_write = remote_out;
            pump(
                &mut local_read,
                &mut local_write,
                &mut remote_read,
                &mut remote_write,
                limits,
            )
            .await
        });
        let collector = tokio::spawn(async move {
            let mut collected = Vec::new();
            remote_sink.read_to_end(&mut collected).await.unwrap();
            collected
        });

        local_feed.write_all(b"payload").await.unwrap();
        if close_feeds {
            drop(local_feed);
            drop(remote_feed);
        } else {
            // Keep both inputs open; only the idle deadline can end the relay.
            let _hold = (local_feed, remote_feed);
            let (outcome, _) = task.await.unwrap().unwrap();
            return (outcome, collector.await.unwrap());
        }

        let (outcome, _) = task.await.unwrap().unwrap();
        (outcome, collector.await.unwrap())
    }

    let (outcome_eof, output_eof) = run_once(None, true).await;
    assert_eq!(outcome_eof, RelayOutcome::Closed);

    let (outcome_idle, output_idle) = run_once(Some(Duration::from_secs(1)), false).await;
    assert_eq!(outcome_idle, RelayOutcome::IdleExpired);

    assert_eq!(output_eof, b"payload");
    assert_eq!(output_eof, output_idle);
}

#[tokio::test]
async fn test_transport_error_is_fatal() {
    let mut broken = tokio_test::io::Builder::new()
        .read_error(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ))
        .build();

    let (local_in, _local_feed) = duplex(64);
    let (local_out, _local_sink) = duplex(64);
    let (remote_out, _remote_sink) = duplex(64);

    let mut local_read = local_in;
    let mut local_write = local_out;
    let mut remote_write = remote_out;
    let err = pump(
        &mut local_read,
        &mut local_write,
        &mut broken,
        &mut remote_write,
        RelayLimits::default(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("read from remote stream"));
}

#[tokio::test]
async fn test_device_file_replaces_the_socket() {
    use std::io::Write as _;

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"hello").unwrap();
    tmp.flush().unwrap();

    let device = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(tmp.path())
        .unwrap();
    let mut device_read = tokio::fs::File::from_std(device.try_clone().unwrap());
    let mut device_write = tokio::fs::File::from_std(device);

    let (local_in, local_feed) = duplex(64);
    let (local_out, mut local_sink) = duplex(64);
    drop(local_feed); // no local input

    let mut local_read = local_in;
    let mut local_write = local_out;
    let (outcome, session) = pump(
        &mut local_read,
        &mut local_write,
        &mut device_read,
        &mut device_write,
        RelayLimits::default(),
    )
    .await
    .unwrap();
    assert_eq!(outcome, RelayOutcome::Closed);
    assert_eq!(session.bytes_in(), 5);

    drop(local_write);
    let mut relayed = Vec::new();
    local_sink.read_to_end(&mut relayed).await.unwrap();
    assert_eq!(relayed, b"hello");
}
