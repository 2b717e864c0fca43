//! Session-change bridging against a live registry: `/compact` in the
//! terminal output preserves the chat thread across the agent's new
//! session identity.

use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use pretty_assertions::assert_eq;
use tokio::sync::Notify;

use slackline_common::Config;
use slackline_linelog::LineLogger;
use slackline_protocol::session::prefer_socket_owner;
use slackline_registry::RegistryClient;
use slackline_registry::RegistryDb;
use slackline_registry::RegistryServer;
use slackline_registry::db::new_session_record;
use slackline_wrapper::bridge::SessionBridge;
use slackline_wrapper::files::SessionFiles;

struct Harness {
    _tmp: tempfile::TempDir,
    config: Config,
    db: RegistryDb,
    client: RegistryClient,
    shutdown: Arc<Notify>,
    handle: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn start() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = Config::with_root(tmp.path());
        config.ensure_dirs().expect("dirs");
        let db = RegistryDb::open(&config.registry_db_path).expect("open db");
        let socket_path = config.registry_socket_path();
        let server = Arc::new(RegistryServer::new(
            db.clone(),
            None,
            "claude-sessions",
            socket_path.clone(),
        ));
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });
        for _ in 0..50 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let client = RegistryClient::new(socket_path);
        Self {
            _tmp: tmp,
            config,
            db,
            client,
            shutdown,
            handle,
        }
    }

    fn plant_buffer(&self, session_id: &str, age: Duration) {
        let path = self.config.buffer_file_path(session_id);
        std::fs::write(&path, b"test output").expect("write buffer");
        let mtime = SystemTime::now() - age;
        std::fs::File::options()
            .write(true)
            .open(&path)
            .expect("open")
            .set_modified(mtime)
            .expect("set mtime");
    }

    async fn stop(self) {
        self.shutdown.notify_waiters();
        let _ = self.handle.await;
    }
}

const WRAPPER_ID: &str = "abc12345";
const OLD_UUID: &str = "abc12345-1111-2222-3333-444444444444";
const NEW_UUID: &str = "e537eb3d-1234-5678-abcd-ef1234567890";

#[tokio::test]
async fn compact_preserves_the_chat_thread_for_the_new_session() {
    let harness = Harness::start().await;

    // Wrapper row and the old agent-uuid row share thread T1.
    let mut wrapper_row =
        new_session_record(WRAPPER_ID, "demo", "tty1", "/tmp/abc12345.sock");
    wrapper_row.thread_ts = Some("T1".to_string());
    wrapper_row.channel = Some("C1".to_string());
    harness.db.create_session(&wrapper_row).expect("create");

    let mut old_row = new_session_record(OLD_UUID, "demo", "tty1", "/tmp/abc12345.sock");
    old_row.thread_ts = Some("T1".to_string());
    old_row.channel = Some("C1".to_string());
    harness.db.create_session(&old_row).expect("create");

    harness.plant_buffer(OLD_UUID, Duration::from_secs(60));

    let mut files = SessionFiles::create(&harness.config, WRAPPER_ID).expect("files");
    let mut bridge = SessionBridge::new(
        harness.config.clone(),
        harness.client.clone(),
        WRAPPER_ID,
    );

    // The line log sees the session-changing command...
    let logger = LineLogger::default();
    logger.add_data(b"/compact\n");

    // ...and user activity has already produced the successor's
    // buffer file with a newer mtime.
    harness.plant_buffer(NEW_UUID, Duration::ZERO);

    bridge.on_output(&logger, &mut files).await;

    // The flag is consumed exactly once.
    assert!(!logger.acknowledge_session_change());
    assert_eq!(bridge.agent_session_id(), Some(NEW_UUID));
    assert_eq!(files.session_id(), NEW_UUID);

    // Three rows now share T1; preferring the shortest still selects
    // the wrapper.
    let rows = harness.db.get_by_thread("T1").expect("lookup");
    assert_eq!(rows.len(), 3);
    let owner = prefer_socket_owner(&rows).expect("owner");
    assert_eq!(owner.session_id, WRAPPER_ID);

    let new_row = harness
        .db
        .get_session(NEW_UUID)
        .expect("get")
        .expect("registered");
    assert_eq!(new_row.thread_ts.as_deref(), Some("T1"));
    assert_eq!(new_row.channel.as_deref(), Some("C1"));
    assert_eq!(
        new_row.socket_path,
        harness
            .config
            .session_socket_path(WRAPPER_ID)
            .to_string_lossy()
    );

    harness.stop().await;
}

#[tokio::test]
async fn missing_successor_buffer_defers_to_the_heartbeat() {
    let harness = Harness::start().await;

    let mut wrapper_row =
        new_session_record(WRAPPER_ID, "demo", "tty1", "/tmp/abc12345.sock");
    wrapper_row.thread_ts = Some("T1".to_string());
    wrapper_row.channel = Some("C1".to_string());
    harness.db.create_session(&wrapper_row).expect("create");

    // Only this session's own buffer exists when the flag fires.
    harness.plant_buffer(WRAPPER_ID, Duration::from_secs(1));

    let mut files = SessionFiles::create(&harness.config, WRAPPER_ID).expect("files");
    let mut bridge = SessionBridge::new(
        harness.config.clone(),
        harness.client.clone(),
        WRAPPER_ID,
    );
    let logger = LineLogger::default();
    logger.add_data(b"/resume\n");

    bridge.on_output(&logger, &mut files).await;
    assert!(bridge.discovery_pending());
    assert_eq!(bridge.agent_session_id(), None);

    // The successor's buffer appears later; the next heartbeat picks
    // it up without the pattern re-firing.
    harness.plant_buffer(NEW_UUID, Duration::ZERO);
    bridge.on_heartbeat(&mut files).await;

    assert!(!bridge.discovery_pending());
    assert_eq!(bridge.agent_session_id(), Some(NEW_UUID));
    assert!(harness
        .db
        .get_session(NEW_UUID)
        .expect("get")
        .is_some());

    harness.stop().await;
}

#[tokio::test]
async fn unregistered_previous_session_leaves_the_registry_untouched() {
    let harness = Harness::start().await;

    let mut files = SessionFiles::create(&harness.config, WRAPPER_ID).expect("files");
    harness.plant_buffer(NEW_UUID, Duration::ZERO);

    let mut bridge = SessionBridge::new(
        harness.config.clone(),
        harness.client.clone(),
        WRAPPER_ID,
    );
    let logger = LineLogger::default();
    logger.add_data(b"/compact\n");

    bridge.on_output(&logger, &mut files).await;

    assert_eq!(bridge.agent_session_id(), None);
    assert_eq!(harness.db.get_session(NEW_UUID).expect("get"), None);

    harness.stop().await;
}
