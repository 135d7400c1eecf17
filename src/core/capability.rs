use serde::{Deserialize, Serialize};

/// Administrator rights held by (or granted to) one identity in one channel.
///
/// Every grant defaults to `false`; a missing or unreadable rights object is
/// simply `CapabilitySet::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub manage_chat: bool,
    pub change_info: bool,
    pub post_messages: bool,
    pub edit_messages: bool,
    pub delete_messages: bool,
    pub restrict_members: bool,
    pub invite_users: bool,
    pub pin_messages: bool,
    pub promote_members: bool,
    pub manage_video_chats: bool,
}

impl CapabilitySet {
    /// The empty set. Granting it demotes an administrator to a plain member.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            manage_chat: true,
            change_info: true,
            post_messages: true,
            edit_messages: true,
            delete_messages: true,
            restrict_members: true,
            invite_users: true,
            pin_messages: true,
            promote_members: true,
            manage_video_chats: true,
        }
    }

    /// Rights handed to installed agents: message management only. Never
    /// includes `promote_members`, so an agent cannot grant rights onward.
    pub fn agent_grant() -> Self {
        Self {
            post_messages: true,
            edit_messages: true,
            delete_messages: true,
            ..Self::default()
        }
    }

    /// The grant for the helper identity: an exact copy of what the operator
    /// itself holds, never more.
    pub fn mirror_of(operator: &CapabilitySet) -> Self {
        *operator
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }

    /// True when every right in `other` is also held here.
    pub fn contains(&self, other: &CapabilitySet) -> bool {
        self.flags()
            .iter()
            .zip(other.flags().iter())
            .all(|((_, mine), (_, theirs))| *mine || !*theirs)
    }

    /// Human-readable labels for the rights in `required` that are not held.
    pub fn missing_from(&self, required: &CapabilitySet) -> Vec<&'static str> {
        self.flags()
            .iter()
            .zip(required.flags().iter())
            .filter(|((_, mine), (_, wanted))| *wanted && !*mine)
            .map(|((label, _), _)| *label)
            .collect()
    }

    fn flags(&self) -> [(&'static str, bool); 10] {
        [
            ("Manage Channel", self.manage_chat),
            ("Change Channel Info", self.change_info),
            ("Post Messages", self.post_messages),
            ("Edit Messages", self.edit_messages),
            ("Delete Messages", self.delete_messages),
            ("Ban Users", self.restrict_members),
            ("Invite Users via Link", self.invite_users),
            ("Pin Messages", self.pin_messages),
            ("Add New Admins", self.promote_members),
            ("Manage Video Chats", self.manage_video_chats),
        ]
    }
}
