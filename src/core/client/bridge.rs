use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use super::{ChannelId, Identity, MemberInfo, MemberStatus, PlatformClient, PlatformError, PlatformResult};
use crate::core::capability::CapabilitySet;

/// The helper identity: a user account driven through a user-mode server
/// that speaks the Bot API wire format (`POST {base}/user{token}/{method}`).
///
/// Unlike the bot, a user account can resolve `@username` peers, add members
/// and join by invite link.
pub struct BridgeClient {
    http: reqwest::Client,
    base: Url,
    token: String,
    me: OnceCell<Identity>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i32>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    status: String,
    user: WireUser,
    #[serde(default)]
    can_manage_chat: bool,
    #[serde(default)]
    can_change_info: bool,
    #[serde(default)]
    can_post_messages: bool,
    #[serde(default)]
    can_edit_messages: bool,
    #[serde(default)]
    can_delete_messages: bool,
    #[serde(default)]
    can_restrict_members: bool,
    #[serde(default)]
    can_invite_users: bool,
    #[serde(default)]
    can_pin_messages: bool,
    #[serde(default)]
    can_promote_members: bool,
    #[serde(default)]
    can_manage_video_chats: bool,
}

#[derive(Debug, Deserialize)]
struct WireInviteLink {
    invite_link: String,
}

impl From<WireMember> for MemberInfo {
    fn from(m: WireMember) -> Self {
        let status = MemberStatus::parse(&m.status);
        let capabilities = match status {
            MemberStatus::Owner => CapabilitySet::all(),
            MemberStatus::Administrator => CapabilitySet {
                manage_chat: m.can_manage_chat,
                change_info: m.can_change_info,
                post_messages: m.can_post_messages,
                edit_messages: m.can_edit_messages,
                delete_messages: m.can_delete_messages,
                restrict_members: m.can_restrict_members,
                invite_users: m.can_invite_users,
                pin_messages: m.can_pin_messages,
                promote_members: m.can_promote_members,
                manage_video_chats: m.can_manage_video_chats,
            },
            _ => CapabilitySet::none(),
        };
        MemberInfo {
            user_id: m.user.id,
            username: m.user.username,
            status,
            capabilities,
        }
    }
}

/// Numeric ids travel as numbers, usernames as `@name` strings.
fn peer_value(user: &str) -> Value {
    let user = user.trim();
    match user.parse::<i64>() {
        Ok(id) => json!(id),
        Err(_) if user.starts_with('@') => json!(user),
        Err(_) => json!(format!("@{}", user)),
    }
}

fn decode<T: DeserializeOwned>(envelope: Envelope<T>) -> PlatformResult<T> {
    if envelope.ok {
        return envelope.result.ok_or_else(|| PlatformError::Api {
            code: 0,
            description: "response carried no result".to_string(),
        });
    }
    Err(PlatformError::classify(
        envelope.error_code.unwrap_or(0),
        envelope.description.as_deref().unwrap_or_default(),
        envelope.parameters.and_then(|p| p.retry_after),
    ))
}

impl BridgeClient {
    pub fn new(base: Url, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            token,
            me: OnceCell::new(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> PlatformResult<T> {
        let url = format!(
            "{}/user{}/{}",
            self.base.as_str().trim_end_matches('/'),
            self.token,
            method
        );
        debug!("[BRIDGE] -> {}", method);
        let response = self
            .http
            .post(url)
            .json(&params)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.without_url().to_string()))?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| PlatformError::Transport(e.without_url().to_string()))?;
        decode(envelope)
    }
}

#[async_trait]
impl PlatformClient for BridgeClient {
    async fn me(&self) -> PlatformResult<Identity> {
        let me = self
            .me
            .get_or_try_init(|| async {
                let user: WireUser = self.call("getMe", json!({})).await?;
                Ok::<_, PlatformError>(Identity {
                    id: user.id,
                    username: user.username,
                })
            })
            .await?;
        Ok(me.clone())
    }

    async fn member(&self, channel: ChannelId, user: &str) -> PlatformResult<MemberInfo> {
        let member: WireMember = self
            .call(
                "getChatMember",
                json!({ "chat_id": channel, "user_id": peer_value(user) }),
            )
            .await?;
        Ok(member.into())
    }

    async fn administrators(&self, channel: ChannelId) -> PlatformResult<Vec<MemberInfo>> {
        let admins: Vec<WireMember> = self
            .call("getChatAdministrators", json!({ "chat_id": channel }))
            .await?;
        Ok(admins.into_iter().map(MemberInfo::from).collect())
    }

    async fn add_member(&self, channel: ChannelId, user: &str) -> PlatformResult<()> {
        let _: Value = self
            .call(
                "addChatMember",
                json!({ "chat_id": channel, "user_id": peer_value(user) }),
            )
            .await?;
        Ok(())
    }

    async fn ban(&self, channel: ChannelId, user: &str) -> PlatformResult<()> {
        let _: Value = self
            .call(
                "banChatMember",
                json!({ "chat_id": channel, "user_id": peer_value(user) }),
            )
            .await?;
        Ok(())
    }

    async fn unban(&self, channel: ChannelId, user: &str) -> PlatformResult<()> {
        let _: Value = self
            .call(
                "unbanChatMember",
                json!({
                    "chat_id": channel,
                    "user_id": peer_value(user),
                    "only_if_banned": true,
                }),
            )
            .await?;
        Ok(())
    }

    async fn grant(
        &self,
        channel: ChannelId,
        user: &str,
        caps: &CapabilitySet,
    ) -> PlatformResult<()> {
        let _: Value = self
            .call(
                "promoteChatMember",
                json!({
                    "chat_id": channel,
                    "user_id": peer_value(user),
                    "can_manage_chat": caps.manage_chat,
                    "can_change_info": caps.change_info,
                    "can_post_messages": caps.post_messages,
                    "can_edit_messages": caps.edit_messages,
                    "can_delete_messages": caps.delete_messages,
                    "can_restrict_members": caps.restrict_members,
                    "can_invite_users": caps.invite_users,
                    "can_pin_messages": caps.pin_messages,
                    "can_promote_members": caps.promote_members,
                    "can_manage_video_chats": caps.manage_video_chats,
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_invite(&self, channel: ChannelId) -> PlatformResult<String> {
        let link: WireInviteLink = self
            .call("createChatInviteLink", json!({ "chat_id": channel }))
            .await?;
        Ok(link.invite_link)
    }

    async fn join_by_invite(&self, invite: &str) -> PlatformResult<()> {
        let _: Value = self
            .call("joinChatByInviteLink", json!({ "invite_link": invite }))
            .await?;
        Ok(())
    }

    async fn leave(&self, channel: ChannelId) -> PlatformResult<()> {
        let _: Value = self.call("leaveChat", json!({ "chat_id": channel })).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn peers_are_numbers_or_handles() {
        assert_eq!(peer_value("123"), json!(123));
        assert_eq!(peer_value("@agent_bot"), json!("@agent_bot"));
        assert_eq!(peer_value("agent_bot"), json!("@agent_bot"));
    }

    #[test]
    fn error_envelope_carries_retry_after() {
        let raw = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 9","parameters":{"retry_after":9}}"#;
        let envelope: Envelope<Value> = serde_json::from_str(raw).unwrap();
        assert_eq!(
            decode(envelope),
            Err(PlatformError::RateLimited {
                retry_after: Duration::from_secs(9)
            })
        );
    }

    #[test]
    fn administrator_member_decodes_rights() {
        let raw = r#"{"status":"administrator","user":{"id":5,"username":"helper"},
            "can_manage_chat":true,"can_promote_members":true}"#;
        let member: MemberInfo = serde_json::from_str::<WireMember>(raw).unwrap().into();
        assert!(member.can_promote());
        assert!(member.capabilities.manage_chat);
        assert!(!member.capabilities.pin_messages);
    }

    #[test]
    fn plain_member_has_no_rights_even_if_flags_present() {
        let raw = r#"{"status":"member","user":{"id":5},"can_manage_chat":true}"#;
        let member: MemberInfo = serde_json::from_str::<WireMember>(raw).unwrap().into();
        assert!(member.capabilities.is_empty());
        assert!(member.is_present());
    }
}
