//! Response-complete hook: mirror the latest assistant reply into the
//! session's thread (and to DM subscribers).

use std::path::PathBuf;

use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_slack::client::PostMessage;
use slackline_transcript::Transcript;
use slackline_transcript::transcript_path;

use crate::context::HookContext;
use crate::format::MAX_CHUNKS;
use crate::format::MAX_MESSAGE_CHARS;
use crate::format::split_message;

pub async fn run(ctx: &HookContext) {
    let Some(slack) = ctx.slack() else { return };
    let Some(channel) = ctx.session.channel.clone() else {
        return;
    };

    let path = match &ctx.input.transcript_path {
        Some(path) => PathBuf::from(path),
        None => {
            let Some(project_dir) = ctx
                .session
                .project_dir
                .clone()
                .or_else(|| ctx.input.cwd.clone())
            else {
                return;
            };
            let Some(path) = transcript_path(&ctx.input.session_id, &project_dir) else {
                return;
            };
            path
        }
    };

    let transcript = match Transcript::load(&path) {
        Ok(transcript) => transcript,
        Err(e) => {
            debug!("no transcript at {}: {e}", path.display());
            return;
        }
    };
    let Some(text) = transcript.latest_assistant_text() else {
        debug!("no assistant text to mirror");
        return;
    };

    let mut chunks = split_message(&text, MAX_MESSAGE_CHARS);
    if chunks.len() > MAX_CHUNKS {
        warn!("reply too long, truncating to {MAX_CHUNKS} chunks");
        chunks.truncate(MAX_CHUNKS);
    }
    let total = chunks.len();

    for (i, chunk) in chunks.iter().enumerate() {
        let body = if total > 1 {
            format!("{chunk}\n\n_(Part {}/{total})_", i + 1)
        } else {
            chunk.clone()
        };
        // Keep going on individual chunk failures so a transient error
        // does not swallow the rest of the reply.
        if let Err(e) = slack
            .post_message(&PostMessage {
                channel: channel.clone(),
                text: body.clone(),
                thread_ts: ctx.session.thread_ts.clone(),
                blocks: None,
            })
            .await
        {
            warn!("failed to post part {}: {e}", i + 1);
            continue;
        }

        for subscription in ctx
            .db
            .get_dm_subscriptions_for_session(&ctx.input.session_id)
            .unwrap_or_default()
        {
            let _ = slack
                .post_message(&PostMessage {
                    channel: subscription.dm_channel_id.clone(),
                    text: body.clone(),
                    thread_ts: None,
                    blocks: None,
                })
                .await;
        }
    }
    info!("mirrored assistant reply in {total} part(s)");
}
