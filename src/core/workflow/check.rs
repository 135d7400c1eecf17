use thiserror::Error;

use crate::core::capability::CapabilitySet;
use crate::core::client::{ChannelId, MemberInfo, PlatformError};
use crate::core::context::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// The rights the helper lifecycle needs: invite links and appointing
    /// administrators.
    Setup,
    /// Every right.
    Strict,
}

impl CheckMode {
    fn required(self) -> CapabilitySet {
        match self {
            CheckMode::Setup => CapabilitySet {
                invite_users: true,
                promote_members: true,
                ..CapabilitySet::none()
            },
            CheckMode::Strict => CapabilitySet::all(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OperatorCheckError {
    #[error("the bot is not in this channel")]
    NotMember,
    #[error("the bot is not an administrator of this channel")]
    NotAdmin,
    #[error("the bot is missing rights: {}", .0.join(", "))]
    MissingRights(Vec<&'static str>),
    #[error("could not check the channel: {0}")]
    Platform(#[from] PlatformError),
}

/// Verify the operator's own standing in `channel` before any work is
/// queued.
pub async fn check_operator(
    ctx: &AppContext,
    channel: ChannelId,
    mode: CheckMode,
) -> Result<MemberInfo, OperatorCheckError> {
    let me = ctx
        .call_policy()
        .run("operator check", || ctx.operator.own_membership(channel))
        .await
        .into_result()?;
    if !me.is_present() {
        return Err(OperatorCheckError::NotMember);
    }
    if !me.is_admin() {
        return Err(OperatorCheckError::NotAdmin);
    }
    let missing = me.capabilities.missing_from(&mode.required());
    if !missing.is_empty() {
        return Err(OperatorCheckError::MissingRights(missing));
    }
    Ok(me)
}
