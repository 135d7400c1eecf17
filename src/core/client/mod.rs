mod bridge;
mod error;
mod operator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::capability::CapabilitySet;

pub use bridge::BridgeClient;
pub use error::PlatformError;
pub use operator::OperatorClient;

pub type ChannelId = i64;

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Who an identity is on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "creator" | "owner" => MemberStatus::Owner,
            "administrator" => MemberStatus::Administrator,
            "member" => MemberStatus::Member,
            "restricted" => MemberStatus::Restricted,
            "kicked" | "banned" => MemberStatus::Banned,
            _ => MemberStatus::Left,
        }
    }
}

/// One identity's standing in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: i64,
    pub username: Option<String>,
    pub status: MemberStatus,
    pub capabilities: CapabilitySet,
}

impl MemberInfo {
    pub fn absent(user_id: i64) -> Self {
        Self {
            user_id,
            username: None,
            status: MemberStatus::Left,
            capabilities: CapabilitySet::none(),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(
            self.status,
            MemberStatus::Owner
                | MemberStatus::Administrator
                | MemberStatus::Member
                | MemberStatus::Restricted
        )
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self.status,
            MemberStatus::Owner | MemberStatus::Administrator
        )
    }

    /// Owner, or an administrator allowed to add new administrators.
    pub fn can_promote(&self) -> bool {
        self.status == MemberStatus::Owner
            || (self.status == MemberStatus::Administrator && self.capabilities.promote_members)
    }

    /// Whether this member is the account named by `peer` (`@username`,
    /// bare username, or numeric id).
    pub fn matches(&self, peer: &str) -> bool {
        let peer = peer.trim();
        if let Ok(id) = peer.parse::<i64>() {
            return id == self.user_id;
        }
        let wanted = peer.trim_start_matches('@');
        self.username
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
    }
}

/// The operations the workflows need from one platform identity.
///
/// Users are addressed by `@username` or numeric id. Any call may fail with
/// [`PlatformError::RateLimited`].
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn me(&self) -> PlatformResult<Identity>;

    async fn member(&self, channel: ChannelId, user: &str) -> PlatformResult<MemberInfo>;

    async fn administrators(&self, channel: ChannelId) -> PlatformResult<Vec<MemberInfo>>;

    async fn add_member(&self, channel: ChannelId, user: &str) -> PlatformResult<()>;

    async fn ban(&self, channel: ChannelId, user: &str) -> PlatformResult<()>;

    async fn unban(&self, channel: ChannelId, user: &str) -> PlatformResult<()>;

    /// Replace `user`'s administrator rights with `caps`. The empty set
    /// demotes.
    async fn grant(&self, channel: ChannelId, user: &str, caps: &CapabilitySet)
    -> PlatformResult<()>;

    async fn create_invite(&self, channel: ChannelId) -> PlatformResult<String>;

    async fn join_by_invite(&self, invite: &str) -> PlatformResult<()>;

    async fn leave(&self, channel: ChannelId) -> PlatformResult<()>;

    /// This identity's own standing; a non-participant reads as `Left`.
    async fn own_membership(&self, channel: ChannelId) -> PlatformResult<MemberInfo> {
        let me = self.me().await?;
        match self.member(channel, &me.id.to_string()).await {
            Ok(info) => Ok(info),
            Err(PlatformError::NotParticipant) => Ok(MemberInfo::absent(me.id)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(status: MemberStatus) -> MemberInfo {
        MemberInfo {
            user_id: 42,
            username: Some("HelperBot".to_string()),
            status,
            capabilities: CapabilitySet::none(),
        }
    }

    #[test]
    fn matches_by_username_case_insensitively() {
        let m = agent(MemberStatus::Member);
        assert!(m.matches("@helperbot"));
        assert!(m.matches("HelperBot"));
        assert!(m.matches("42"));
        assert!(!m.matches("@otherbot"));
    }

    #[test]
    fn presence_and_admin_flags() {
        assert!(agent(MemberStatus::Restricted).is_present());
        assert!(!agent(MemberStatus::Banned).is_present());
        assert!(agent(MemberStatus::Owner).is_admin());
        assert!(agent(MemberStatus::Owner).can_promote());
        assert!(!agent(MemberStatus::Administrator).can_promote());
    }

    #[test]
    fn status_strings() {
        assert_eq!(MemberStatus::parse("creator"), MemberStatus::Owner);
        assert_eq!(MemberStatus::parse("kicked"), MemberStatus::Banned);
        assert_eq!(MemberStatus::parse("something-new"), MemberStatus::Left);
    }
}
