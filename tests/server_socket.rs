//! Drives `Server` over an actual Unix domain socket in a temp directory,
//! the way a real driver process would, rather than calling scheduler
//! methods directly.

use std::time::Duration;

use fairsched::{SchedulerConfig, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[tokio::test]
async fn round_trips_one_batch_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("fairsched.sock");

    let config = SchedulerConfig {
        socket_path: socket_path.clone(),
        cpu_count: 1,
        quanta: 1,
        metadata: true,
    };
    let server = Server::new(config);
    tokio::spawn(server.run());

    // give the listener a moment to bind
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    let batch = br#"{"vtime": 0, "events": [{"action": "TASK_CREATE", "taskId": "T1"}]}"#;
    stream.write_all(batch).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server did not respond in time")
        .unwrap();

    let text = String::from_utf8_lossy(&buf[..n]);
    assert!(text.contains("\"schedule\""));
    assert!(text.contains("T1"));
}
