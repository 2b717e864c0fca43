//! Shared hook preamble: input parsing, registry lookup and
//! self-healing of missing chat metadata.

use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_common::Config;
use slackline_common::flags;
use slackline_protocol::SessionRecord;
use slackline_protocol::SessionStatus;
use slackline_protocol::hook_io::HookInput;
use slackline_protocol::session::is_wrapper_id;
use slackline_registry::RegistryDb;
use slackline_registry::SessionUpdate;
use slackline_slack::SlackClient;

pub struct HookContext {
    pub config: Config,
    pub db: RegistryDb,
    pub input: HookInput,
    pub session: SessionRecord,
}

impl HookContext {
    /// Resolve everything a hook needs or return `None`, which the
    /// caller turns into a quiet exit 0.
    pub fn prepare(input: HookInput) -> Option<Self> {
        if input.session_id.is_empty() {
            warn!("no session_id in hook input");
            return None;
        }
        let config = Config::from_env().ok()?;
        let _ = config.ensure_dirs();

        // The wrapper discovers agent-minted session ids by buffer
        // file mtime, so make sure this session's buffer exists even
        // before the wrapper has re-targeted its own files.
        if !is_wrapper_id(&input.session_id) {
            let buffer = config.buffer_file_path(&input.session_id);
            if !buffer.exists() {
                let _ = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&buffer);
            }
        }

        if !config.registry_db_path.exists() {
            warn!(
                "registry database not found: {}",
                config.registry_db_path.display()
            );
            return None;
        }
        let db = RegistryDb::open(&config.registry_db_path)
            .inspect_err(|e| warn!("cannot open registry database: {e}"))
            .ok()?;

        let session = resolve_session(&db, &input)?;
        Some(Self {
            config,
            db,
            input,
            session,
        })
    }

    /// Bot-token Slack client, or `None` when chat is not configured.
    pub fn slack(&self) -> Option<SlackClient> {
        flags::SLACK_BOT_TOKEN
            .map(|token| SlackClient::with_timeout(token, Duration::from_secs(10)))
    }

    /// The channel permission prompts go to: the dedicated permissions
    /// channel when configured, the session channel otherwise.
    pub fn permission_channel(&self) -> Option<String> {
        self.session
            .permissions_channel
            .clone()
            .or_else(|| self.session.channel.clone())
    }
}

/// Look up the session row and backfill missing chat metadata: first
/// from the 8-char-prefix wrapper row, then from the most recent row
/// for the same project directory. Both paths persist the healed
/// metadata so later hooks skip the dance.
pub fn resolve_session(db: &RegistryDb, input: &HookInput) -> Option<SessionRecord> {
    let session_id = &input.session_id;
    let mut session = db.get_session(session_id).ok().flatten();

    let needs_healing = session
        .as_ref()
        .map(|s| s.channel.is_none())
        .unwrap_or(true);
    if !needs_healing {
        return session;
    }
    info!(
        "session {} missing chat metadata, attempting self-heal",
        input.short_session_id()
    );

    let mut donor: Option<SessionRecord> = None;
    if session_id.len() > 8 {
        let wrapper_id = &session_id[..8];
        if let Ok(Some(wrapper_row)) = db.get_session(wrapper_id)
            && wrapper_row.channel.is_some()
        {
            debug!("healing from wrapper row {wrapper_id}");
            donor = Some(wrapper_row);
        }
    }
    if donor.is_none()
        && let Some(cwd) = &input.cwd
        && let Ok(Some(row)) = db.get_by_project_dir(cwd, SessionStatus::Active)
        && row.channel.is_some()
        && row.session_id != *session_id
    {
        debug!("healing from project-dir row {}", row.session_id);
        donor = Some(row);
    }

    let donor = match donor {
        Some(donor) => donor,
        None => {
            if session.is_none() {
                warn!("session {} not found in registry", input.short_session_id());
            } else {
                warn!("self-healing failed: no donor row with chat metadata");
            }
            return session.filter(|s| s.channel.is_some());
        }
    };

    if session.is_none() {
        // The agent row is often registered after the wrapper's; create
        // it now so the healed metadata has somewhere to live.
        let mut record = donor.clone();
        record.session_id = session_id.clone();
        record.created_at = chrono::Utc::now();
        record.last_activity = record.created_at;
        if db.create_session(&record).is_err() {
            return Some(record);
        }
        session = Some(record);
    } else {
        let update = SessionUpdate {
            thread_ts: donor.thread_ts.clone(),
            channel: donor.channel.clone(),
            permissions_channel: donor.permissions_channel.clone(),
            ..Default::default()
        };
        let _ = db.update_session(session_id, &update);
        session = db.get_session(session_id).ok().flatten();
    }

    info!(
        "self-healed: thread_ts={:?}, channel={:?}",
        session.as_ref().and_then(|s| s.thread_ts.clone()),
        session.as_ref().and_then(|s| s.channel.clone()),
    );
    session.filter(|s| s.channel.is_some())
}
