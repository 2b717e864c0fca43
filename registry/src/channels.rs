//! Channel resolution: find, join, or create the channel a session
//! posts into.

use tracing::info;
use tracing::warn;

use slackline_slack::SlackClient;
use slackline_slack::client::PostMessage;
use slackline_slack::client::describe_channel_error;

use crate::error::RegistryError;
use crate::error::Result;

/// Hard cap on pagination so a misbehaving provider cannot loop us.
const MAX_PAGES: usize = 50;

/// Strip the leading `#`, lowercase, spaces to hyphens.
pub fn normalize_channel_name(name: &str) -> String {
    name.trim_start_matches('#').to_lowercase().replace(' ', "-")
}

/// Resolve `channel_name` to a channel id, joining it when the bot is
/// not yet a member and creating it (public) when absent. A freshly
/// created channel is announced in `notify_channel` so workspace users
/// can find it.
pub async fn ensure_channel_exists(
    client: &SlackClient,
    channel_name: &str,
    notify_channel: Option<&str>,
) -> Result<String> {
    let name = normalize_channel_name(channel_name);

    let mut cursor: Option<String> = None;
    for _ in 0..MAX_PAGES {
        let (channels, next) = client
            .list_channels(cursor.as_deref())
            .await
            .map_err(|e| RegistryError::Channel(describe_channel_error(&name, &e)))?;
        if let Some(found) = channels.iter().find(|c| c.name == name) {
            if !found.is_member {
                if let Err(e) = client.join_channel(&found.id).await {
                    warn!("could not join channel {name}: {e}");
                }
            }
            return Ok(found.id.clone());
        }
        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!("channel {name} not found, creating it");
    let created = client
        .create_channel(&name)
        .await
        .map_err(|e| RegistryError::Channel(describe_channel_error(&name, &e)))?;

    if let Some(notify_channel) = notify_channel {
        let text = format!(
            "\u{1f4e2} New session channel created: <#{}|{name}>",
            created.id
        );
        if let Err(e) = client
            .post_message(&PostMessage {
                channel: notify_channel.to_string(),
                text,
                thread_ts: None,
                blocks: None,
            })
            .await
        {
            warn!("could not announce new channel: {e}");
        }
    }

    Ok(created.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalization_strips_hash_lowercases_and_hyphenates() {
        assert_eq!(normalize_channel_name("#My Channel"), "my-channel");
        assert_eq!(normalize_channel_name("ops"), "ops");
        assert_eq!(normalize_channel_name("#already-fine"), "already-fine");
    }
}
