use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::capability::CapabilitySet;
use crate::core::client::{ChannelId, MemberInfo, PlatformError};
use crate::core::context::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperPresence {
    AlreadyPresent,
    Joined,
}

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("the channel requires join approval, so the helper account cannot enter it")]
    JoinApprovalRequired,
    #[error("the bot cannot create invite links here: {0}")]
    InviteCreationDenied(PlatformError),
    #[error("the bot cannot appoint administrators here: {0}")]
    PromoteDenied(PlatformError),
    #[error("helper rights were granted but not visible afterwards (missing: {})", .missing.join(", "))]
    PropagationUnverified { missing: Vec<&'static str> },
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl HelperError {
    /// What the channel owner can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            HelperError::JoinApprovalRequired => {
                "Disable join requests for the channel, then run the setup again."
            }
            HelperError::InviteCreationDenied(_) => {
                "Give the bot the \"Invite Users via Link\" right."
            }
            HelperError::PromoteDenied(_) => "Give the bot the \"Add New Admins\" right.",
            HelperError::PropagationUnverified { .. } => {
                "Wait a minute and retry; if it keeps failing, re-add the bot as administrator with all rights."
            }
            HelperError::Platform(e) if e.is_channel_gone() => {
                "The channel is no longer reachable. Check that it still exists and the bot is still an administrator."
            }
            HelperError::Platform(_) | HelperError::Store(_) => "Try again later.",
        }
    }
}

/// Make sure the helper is a member of `channel` holding at least the
/// operator's own rights.
///
/// Skips all work when the helper can already appoint administrators.
/// Otherwise the operator invites the helper, mirrors its rights onto it,
/// waits for the grant to settle and verifies it. The membership is
/// recorded as soon as the join succeeds so eviction accounting stays
/// correct even if promotion fails afterwards.
pub async fn ensure_helper_in_channel(
    ctx: &AppContext,
    channel: ChannelId,
    owner_id: i64,
) -> Result<HelperPresence, HelperError> {
    let helper_id = ctx.helper.me().await?.id;

    let current = read_helper(ctx, channel, helper_id).await?;
    if current.can_promote() {
        ctx.store.confirm_helper_present(channel, owner_id).await?;
        return Ok(HelperPresence::AlreadyPresent);
    }

    if !current.is_present() {
        let invite = ctx
            .call_policy()
            .run("create invite", || ctx.operator.create_invite(channel))
            .await
            .into_result()
            .map_err(|e| {
                if e.is_grant_refusal() {
                    HelperError::InviteCreationDenied(e)
                } else {
                    HelperError::Platform(e)
                }
            })?;

        match ctx
            .call_policy()
            .run("join", || ctx.helper.join_by_invite(&invite))
            .await
            .into_result()
        {
            Ok(()) | Err(PlatformError::AlreadyParticipant) => {}
            Err(PlatformError::JoinApprovalRequired) => {
                return Err(HelperError::JoinApprovalRequired);
            }
            Err(e) => return Err(e.into()),
        }
        info!("[HELPER] Joined channel {}", channel);
    }
    ctx.store
        .record_helper_joined(channel, owner_id, Utc::now())
        .await?;

    let operator = ctx
        .call_policy()
        .run("operator rights", || ctx.operator.own_membership(channel))
        .await
        .into_result()?;
    let rights = CapabilitySet::mirror_of(&operator.capabilities);
    if !rights.promote_members {
        return Err(HelperError::PromoteDenied(PlatformError::PermissionDenied(
            "bot lacks the right to add administrators".into(),
        )));
    }

    let helper_peer = helper_id.to_string();
    ctx.grant_policy()
        .run("promote helper", || {
            ctx.operator.grant(channel, &helper_peer, &rights)
        })
        .await
        .into_result()
        .map_err(|e| {
            if e.is_grant_refusal() {
                HelperError::PromoteDenied(e)
            } else {
                HelperError::Platform(e)
            }
        })?;

    tokio::time::sleep(ctx.config.settle_delay()).await;

    let verified = ctx
        .grant_policy()
        .poll(
            "verify helper",
            || read_helper(ctx, channel, helper_id),
            MemberInfo::can_promote,
        )
        .await
        .into_result()?;
    if !verified.can_promote() {
        let missing = verified.capabilities.missing_from(&rights);
        warn!(
            "[HELPER] Rights in {} not visible after promotion: {:?}",
            channel, missing
        );
        return Err(HelperError::PropagationUnverified { missing });
    }

    info!("[HELPER] Promoted in channel {}", channel);
    Ok(HelperPresence::Joined)
}

/// The helper's standing; a channel it cannot see reads as absent.
async fn read_helper(
    ctx: &AppContext,
    channel: ChannelId,
    helper_id: i64,
) -> Result<MemberInfo, PlatformError> {
    match ctx
        .call_policy()
        .run("helper membership", || ctx.helper.own_membership(channel))
        .await
        .into_result()
    {
        Ok(info) => Ok(info),
        Err(e) if e.is_channel_gone() => Ok(MemberInfo::absent(helper_id)),
        Err(e) => Err(e),
    }
}

/// Remove the helper from `channel` using the operator's ban rights, so
/// only the installed agents remain.
pub async fn expel_helper(ctx: &AppContext, channel: ChannelId) -> Result<(), PlatformError> {
    let peer = ctx.helper.me().await?.id.to_string();
    let policy = ctx.call_policy();
    match policy
        .run("expel helper", || ctx.operator.ban(channel, &peer))
        .await
        .into_result()
    {
        Ok(()) | Err(PlatformError::NotParticipant) => {}
        Err(e) => return Err(e),
    }
    match policy
        .run("unban helper", || ctx.operator.unban(channel, &peer))
        .await
        .into_result()
    {
        Ok(()) | Err(PlatformError::NotParticipant) => Ok(()),
        Err(e) => Err(e),
    }
}
