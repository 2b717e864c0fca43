//! Control-socket behavior: payloads injected over the Unix socket
//! arrive on the PTY writer channel in write order, with one trailing
//! newline stripped.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use slackline_wrapper::control;

async fn connect_with_retry(path: &std::path::Path) -> UnixStream {
    for _ in 0..50 {
        if let Ok(stream) = UnixStream::connect(path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("control socket never came up");
}

#[tokio::test]
async fn payload_reaches_the_pty_writer_without_trailing_newline() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let socket_path = tmp.path().join("abc12345.sock");
    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(16);

    let server = tokio::spawn(control::serve(socket_path.clone(), writer_tx));

    let mut stream = connect_with_retry(&socket_path).await;
    stream.write_all(b"1\n").await.expect("send");
    stream.shutdown().await.expect("shutdown");

    let received = tokio::time::timeout(Duration::from_secs(2), writer_rx.recv())
        .await
        .expect("timely")
        .expect("payload");
    assert_eq!(received, b"1".to_vec());

    server.abort();
}

#[tokio::test]
async fn multiple_connections_deliver_in_order_per_payload() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let socket_path = tmp.path().join("abc12345.sock");
    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(16);

    let server = tokio::spawn(control::serve(socket_path.clone(), writer_tx));

    for text in ["first message\n", "2\n"] {
        let mut stream = connect_with_retry(&socket_path).await;
        stream.write_all(text.as_bytes()).await.expect("send");
        stream.shutdown().await.expect("shutdown");
        // Wait for delivery before the next connection so ordering is
        // attributable.
        let received = tokio::time::timeout(Duration::from_secs(2), writer_rx.recv())
            .await
            .expect("timely")
            .expect("payload");
        assert_eq!(received, text.trim_end().as_bytes().to_vec());
    }

    server.abort();
}

#[tokio::test]
async fn empty_payloads_are_dropped() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let socket_path = tmp.path().join("abc12345.sock");
    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(16);

    let server = tokio::spawn(control::serve(socket_path.clone(), writer_tx));

    let mut stream = connect_with_retry(&socket_path).await;
    stream.write_all(b"\n").await.expect("send");
    stream.shutdown().await.expect("shutdown");

    let mut stream = connect_with_retry(&socket_path).await;
    stream.write_all(b"real\n").await.expect("send");
    stream.shutdown().await.expect("shutdown");

    let received = tokio::time::timeout(Duration::from_secs(2), writer_rx.recv())
        .await
        .expect("timely")
        .expect("payload");
    assert_eq!(received, b"real".to_vec());

    server.abort();
}

#[tokio::test]
async fn stale_socket_file_is_replaced_on_bind() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let socket_path = tmp.path().join("abc12345.sock");
    std::fs::write(&socket_path, b"stale").expect("plant stale file");

    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(16);
    let server = tokio::spawn(control::serve(socket_path.clone(), writer_tx));

    let mut stream = connect_with_retry(&socket_path).await;
    stream.write_all(b"alive\n").await.expect("send");
    stream.shutdown().await.expect("shutdown");

    let received = tokio::time::timeout(Duration::from_secs(2), writer_rx.recv())
        .await
        .expect("timely")
        .expect("payload");
    assert_eq!(received, b"alive".to_vec());

    server.abort();
}
