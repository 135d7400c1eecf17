use tracing::{debug, info, warn};

use crate::core::capability::CapabilitySet;
use crate::core::client::{ChannelId, MemberInfo, PlatformError};
use crate::core::context::AppContext;
use crate::core::status::Progress;

/// Per-agent outcome of one installer run. `succeeded` and `failed` never
/// share an entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Agents that needed no call at all.
    pub skipped: Vec<String>,
    /// The channel stopped answering mid-run; remaining agents were not
    /// attempted.
    pub channel_gone: bool,
}

impl InstallReport {
    /// The installed set after this run: successful additions joined,
    /// successful removals dropped, order of `installed` kept.
    pub fn apply(&self, installed: &[String], to_add: &[String], to_remove: &[String]) -> Vec<String> {
        let ok = |agent: &str| self.succeeded.iter().any(|s| s.eq_ignore_ascii_case(agent));
        let removed = |agent: &str| {
            ok(agent) && to_remove.iter().any(|r| r.eq_ignore_ascii_case(agent))
        };
        let mut out: Vec<String> = installed
            .iter()
            .filter(|a| !removed(a.as_str()))
            .cloned()
            .collect();
        for agent in to_add {
            if ok(agent.as_str()) && !out.iter().any(|a| a.eq_ignore_ascii_case(agent)) {
                out.push(agent.clone());
            }
        }
        out
    }

    fn succeed(&mut self, agent: &str) {
        self.succeeded.push(agent.to_string());
    }

    fn fail(&mut self, agent: &str) {
        self.failed.push(agent.to_string());
    }
}

/// Agents the configuration wants that are not installed yet, and
/// installed agents it no longer wants.
pub fn desired_delta(configured: &[String], installed: &[String]) -> (Vec<String>, Vec<String>) {
    let has = |set: &[String], a: &str| set.iter().any(|b| b.eq_ignore_ascii_case(a));
    let to_add = configured
        .iter()
        .filter(|a| !has(installed, a.as_str()))
        .cloned()
        .collect();
    let to_remove = installed
        .iter()
        .filter(|a| !has(configured, a.as_str()))
        .cloned()
        .collect();
    (to_add, to_remove)
}

enum Step {
    Done,
    Skipped,
    Failed(PlatformError),
}

/// Converge the agents of `channel`: add and promote `to_add`, demote and
/// remove `to_remove`. All calls are made by the helper.
pub async fn install_agents(
    ctx: &AppContext,
    channel: ChannelId,
    to_add: &[String],
    to_remove: &[String],
    progress: &Progress,
) -> InstallReport {
    let mut report = InstallReport::default();
    let total = to_add.len() + to_remove.len();
    let mut done = 0;

    let roster = if to_add.is_empty() {
        Vec::new()
    } else {
        match ctx
            .call_policy()
            .run("roster", || ctx.helper.administrators(channel))
            .await
            .into_result()
        {
            Ok(admins) => admins,
            Err(e) => {
                debug!("[INSTALLER] Roster of {} unavailable: {}", channel, e);
                Vec::new()
            }
        }
    };

    let mut work: Vec<(&String, bool)> = to_add.iter().map(|a| (a, true)).collect();
    work.extend(to_remove.iter().map(|a| (a, false)));

    let mut iter = work.into_iter();
    while let Some((agent, adding)) = iter.next() {
        done += 1;
        let verb = if adding { "Adding" } else { "Removing" };
        progress
            .say(&format!("⏳ {} {} ({}/{})", verb, agent, done, total))
            .await;

        let (step, rate_limited) = if adding {
            add_agent(ctx, channel, agent, &roster).await
        } else {
            remove_agent(ctx, channel, agent).await
        };

        match step {
            Step::Done => {
                info!("[INSTALLER] {} {} in {}", verb, agent, channel);
                report.succeed(agent);
            }
            Step::Skipped => {
                debug!("[INSTALLER] {} already configured in {}", agent, channel);
                report.succeed(agent);
                report.skipped.push(agent.clone());
                continue;
            }
            Step::Failed(e) if e.is_channel_gone() => {
                warn!("[INSTALLER] Channel {} is gone: {}", channel, e);
                report.fail(agent);
                for (rest, _) in iter.by_ref() {
                    report.fail(rest);
                }
                report.channel_gone = true;
                break;
            }
            Step::Failed(e) => {
                warn!("[INSTALLER] {} {} in {} failed: {}", verb, agent, channel, e);
                report.fail(agent);
            }
        }

        if !rate_limited {
            tokio::time::sleep(ctx.config.action_delay()).await;
        }
    }

    report
}

async fn add_agent(
    ctx: &AppContext,
    channel: ChannelId,
    agent: &str,
    roster: &[MemberInfo],
) -> (Step, bool) {
    let rights = CapabilitySet::agent_grant();
    if roster
        .iter()
        .any(|m| m.matches(agent) && m.is_admin() && m.capabilities.contains(&rights))
    {
        return (Step::Skipped, false);
    }

    let added = ctx
        .call_policy()
        .run("add member", || ctx.helper.add_member(channel, agent))
        .await;
    let mut rate_limited = added.rate_limited;
    match added.result {
        Ok(()) | Err(PlatformError::AlreadyParticipant) => {}
        Err(e) => return (Step::Failed(e), rate_limited),
    }

    let granted = ctx
        .grant_policy()
        .run("grant agent", || ctx.helper.grant(channel, agent, &rights))
        .await;
    rate_limited |= granted.rate_limited;
    match granted.result {
        Ok(()) => (Step::Done, rate_limited),
        Err(e) if e.is_grant_refusal() => {
            let check = ctx
                .call_policy()
                .run("recheck agent", || ctx.helper.member(channel, agent))
                .await;
            rate_limited |= check.rate_limited;
            match check.result {
                Ok(member) if member.is_admin() => {
                    debug!(
                        "[INSTALLER] Grant for {} refused but it is already an administrator",
                        agent
                    );
                    (Step::Done, rate_limited)
                }
                _ => (Step::Failed(e), rate_limited),
            }
        }
        Err(e) => (Step::Failed(e), rate_limited),
    }
}

async fn remove_agent(ctx: &AppContext, channel: ChannelId, agent: &str) -> (Step, bool) {
    let policy = ctx.call_policy();
    let demoted = CapabilitySet::none();
    let mut rate_limited = false;

    let revoked = policy
        .run("revoke agent", || ctx.helper.grant(channel, agent, &demoted))
        .await;
    rate_limited |= revoked.rate_limited;
    match revoked.result {
        Ok(()) => {}
        Err(PlatformError::NotParticipant) => return (Step::Done, rate_limited),
        Err(e) if e.is_channel_gone() => return (Step::Failed(e), rate_limited),
        Err(e) => debug!("[INSTALLER] Revoke of {} in {}: {}", agent, channel, e),
    }

    let banned = policy
        .run("ban agent", || ctx.helper.ban(channel, agent))
        .await;
    rate_limited |= banned.rate_limited;
    match banned.result {
        Ok(()) => {}
        Err(PlatformError::NotParticipant) => return (Step::Done, rate_limited),
        Err(e) => return (Step::Failed(e), rate_limited),
    }

    let unbanned = policy
        .run("unban agent", || ctx.helper.unban(channel, agent))
        .await;
    rate_limited |= unbanned.rate_limited;
    match unbanned.result {
        Ok(()) | Err(PlatformError::NotParticipant) => (Step::Done, rate_limited),
        Err(e) => (Step::Failed(e), rate_limited),
    }
}
