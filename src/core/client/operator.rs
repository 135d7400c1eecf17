use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{ChatMember, ChatMemberKind};
use tokio::sync::OnceCell;

use super::{ChannelId, Identity, MemberInfo, MemberStatus, PlatformClient, PlatformError, PlatformResult};
use crate::core::capability::CapabilitySet;

/// The operator identity: the bot the channel owner promoted themselves.
///
/// Bots address users by numeric id only and cannot join channels on their
/// own, so `add_member` and `join_by_invite` are unsupported here.
pub struct OperatorClient {
    bot: Bot,
    me: OnceCell<Identity>,
}

impl OperatorClient {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            me: OnceCell::new(),
        }
    }
}

fn map_request_error(err: RequestError) -> PlatformError {
    match err {
        RequestError::RetryAfter(secs) => PlatformError::RateLimited {
            retry_after: secs.duration(),
        },
        RequestError::Api(api) => {
            let description = api.to_string();
            let code = if description.starts_with("Forbidden") {
                403
            } else {
                400
            };
            PlatformError::classify(code, &description, None)
        }
        RequestError::MigrateToChatId(_) => {
            PlatformError::ChannelGone("chat was migrated".to_string())
        }
        other => PlatformError::Transport(other.to_string()),
    }
}

fn user_id(user: &str) -> PlatformResult<UserId> {
    user.trim()
        .parse::<u64>()
        .map(UserId)
        .map_err(|_| PlatformError::Unsupported("the bot addresses users by numeric id"))
}

pub(crate) fn member_info(member: &ChatMember) -> MemberInfo {
    let kind = &member.kind;
    let status = if kind.is_owner() {
        MemberStatus::Owner
    } else if kind.is_administrator() {
        MemberStatus::Administrator
    } else if kind.is_banned() {
        MemberStatus::Banned
    } else if kind.is_left() {
        MemberStatus::Left
    } else if kind.is_restricted() {
        MemberStatus::Restricted
    } else {
        MemberStatus::Member
    };
    let capabilities = match kind {
        ChatMemberKind::Owner(_) => CapabilitySet::all(),
        ChatMemberKind::Administrator(a) => CapabilitySet {
            manage_chat: a.can_manage_chat,
            change_info: a.can_change_info,
            post_messages: a.can_post_messages,
            edit_messages: a.can_edit_messages,
            delete_messages: a.can_delete_messages,
            restrict_members: a.can_restrict_members,
            invite_users: a.can_invite_users,
            pin_messages: a.can_pin_messages,
            promote_members: a.can_promote_members,
            manage_video_chats: a.can_manage_video_chats,
        },
        _ => CapabilitySet::none(),
    };
    MemberInfo {
        user_id: member.user.id.0 as i64,
        username: member.user.username.clone(),
        status,
        capabilities,
    }
}

#[async_trait]
impl PlatformClient for OperatorClient {
    async fn me(&self) -> PlatformResult<Identity> {
        let me = self
            .me
            .get_or_try_init(|| async {
                let me = self.bot.get_me().await.map_err(map_request_error)?;
                Ok::<_, PlatformError>(Identity {
                    id: me.user.id.0 as i64,
                    username: me.user.username.clone(),
                })
            })
            .await?;
        Ok(me.clone())
    }

    async fn member(&self, channel: ChannelId, user: &str) -> PlatformResult<MemberInfo> {
        let member = self
            .bot
            .get_chat_member(ChatId(channel), user_id(user)?)
            .await
            .map_err(map_request_error)?;
        Ok(member_info(&member))
    }

    async fn administrators(&self, channel: ChannelId) -> PlatformResult<Vec<MemberInfo>> {
        let admins = self
            .bot
            .get_chat_administrators(ChatId(channel))
            .await
            .map_err(map_request_error)?;
        Ok(admins.iter().map(member_info).collect())
    }

    async fn add_member(&self, _channel: ChannelId, _user: &str) -> PlatformResult<()> {
        Err(PlatformError::Unsupported("bots cannot add members"))
    }

    async fn ban(&self, channel: ChannelId, user: &str) -> PlatformResult<()> {
        self.bot
            .ban_chat_member(ChatId(channel), user_id(user)?)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn unban(&self, channel: ChannelId, user: &str) -> PlatformResult<()> {
        self.bot
            .unban_chat_member(ChatId(channel), user_id(user)?)
            .only_if_banned(true)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn grant(
        &self,
        channel: ChannelId,
        user: &str,
        caps: &CapabilitySet,
    ) -> PlatformResult<()> {
        self.bot
            .promote_chat_member(ChatId(channel), user_id(user)?)
            .can_manage_chat(caps.manage_chat)
            .can_change_info(caps.change_info)
            .can_post_messages(caps.post_messages)
            .can_edit_messages(caps.edit_messages)
            .can_delete_messages(caps.delete_messages)
            .can_restrict_members(caps.restrict_members)
            .can_invite_users(caps.invite_users)
            .can_pin_messages(caps.pin_messages)
            .can_promote_members(caps.promote_members)
            .can_manage_video_chats(caps.manage_video_chats)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn create_invite(&self, channel: ChannelId) -> PlatformResult<String> {
        let link = self
            .bot
            .create_chat_invite_link(ChatId(channel))
            .await
            .map_err(map_request_error)?;
        Ok(link.invite_link)
    }

    async fn join_by_invite(&self, _invite: &str) -> PlatformResult<()> {
        Err(PlatformError::Unsupported("bots cannot join by invite link"))
    }

    async fn leave(&self, channel: ChannelId) -> PlatformResult<()> {
        self.bot
            .leave_chat(ChatId(channel))
            .await
            .map_err(map_request_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_member(raw: &str) -> ChatMember {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn administrator_rights_are_read_field_by_field() {
        let member = parse_member(
            r#"{"status":"administrator",
                "user":{"id":42,"is_bot":false,"first_name":"Helper","username":"helper"},
                "can_be_edited":true,"is_anonymous":false,
                "can_manage_chat":true,"can_delete_messages":true,
                "can_manage_video_chats":false,"can_restrict_members":false,
                "can_promote_members":true,"can_change_info":true,
                "can_invite_users":true,"can_post_messages":true,
                "can_edit_messages":false,"can_pin_messages":true,
                "can_post_stories":false,"can_edit_stories":false,
                "can_delete_stories":false,"can_manage_topics":false}"#,
        );
        let info = member_info(&member);
        assert_eq!(info.user_id, 42);
        assert_eq!(info.status, MemberStatus::Administrator);
        assert_eq!(
            info.capabilities,
            CapabilitySet {
                manage_chat: true,
                change_info: true,
                post_messages: true,
                delete_messages: true,
                invite_users: true,
                pin_messages: true,
                promote_members: true,
                ..CapabilitySet::none()
            }
        );
    }

    #[test]
    fn plain_members_hold_nothing() {
        let member = parse_member(
            r#"{"status":"member","user":{"id":7,"is_bot":true,"first_name":"Agent"}}"#,
        );
        let info = member_info(&member);
        assert_eq!(info.status, MemberStatus::Member);
        assert!(info.capabilities.is_empty());
    }

    #[test]
    fn numeric_ids_only() {
        assert_eq!(user_id(" 777 ").unwrap(), UserId(777));
        assert!(matches!(
            user_id("@somebot"),
            Err(PlatformError::Unsupported(_))
        ));
    }
}
