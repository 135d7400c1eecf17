use std::time::Duration;
use tokio::time::Instant;

use super::fakes::{HELPER_ID, config, harness};
use crate::core::capability::CapabilitySet;
use crate::core::client::{MemberStatus, PlatformError};
use crate::core::installer::install_agents;
use crate::core::status::Progress;

const CH: i64 = -1002;

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn agents_are_added_with_the_agent_grant() {
    let h = harness(config(&["@alpha", "@beta"]));
    h.channel_with_helper(CH);

    let report = install_agents(&h.ctx, CH, &names(&["@alpha", "@beta"]), &[], &Progress::silent()).await;
    assert_eq!(report.succeeded, names(&["@alpha", "@beta"]));
    assert!(report.failed.is_empty());

    for agent in ["@alpha", "@beta"] {
        let m = h.world.member(CH, agent).unwrap();
        assert_eq!(m.status, MemberStatus::Administrator);
        assert_eq!(m.capabilities, CapabilitySet::agent_grant());
    }
    assert!(
        h.world
            .mutations()
            .iter()
            .all(|c| c.actor == HELPER_ID)
    );
}

#[tokio::test(start_paused = true)]
async fn second_run_makes_no_mutations() {
    let h = harness(config(&["@alpha", "@beta"]));
    h.channel_with_helper(CH);
    let agents = names(&["@alpha", "@beta"]);
    install_agents(&h.ctx, CH, &agents, &[], &Progress::silent()).await;
    h.world.clear_calls();

    let report = install_agents(&h.ctx, CH, &agents, &[], &Progress::silent()).await;
    assert!(h.world.mutations().is_empty());
    assert_eq!(report.succeeded, agents);
    assert_eq!(report.skipped, agents);
}

#[tokio::test(start_paused = true)]
async fn adding_to_an_installed_set_extends_it() {
    let h = harness(config(&["@alpha", "@beta"]));
    h.channel_with_helper(CH);
    let installed = names(&["@alpha"]);
    install_agents(&h.ctx, CH, &installed, &[], &Progress::silent()).await;

    let to_add = names(&["@beta"]);
    let report = install_agents(&h.ctx, CH, &to_add, &[], &Progress::silent()).await;
    assert_eq!(report.succeeded, names(&["@beta"]));
    assert!(report.failed.is_empty());
    assert_eq!(report.apply(&installed, &to_add, &[]), names(&["@alpha", "@beta"]));
}

#[tokio::test(start_paused = true)]
async fn removal_demotes_and_leaves_no_ban() {
    let h = harness(config(&["@alpha"]));
    h.channel_with_helper(CH);
    let agents = names(&["@alpha"]);
    install_agents(&h.ctx, CH, &agents, &[], &Progress::silent()).await;
    h.world.clear_calls();

    let report = install_agents(&h.ctx, CH, &[], &agents, &Progress::silent()).await;
    assert_eq!(report.succeeded, agents);
    assert!(h.world.member(CH, "@alpha").is_none());

    let ops: Vec<_> = h.world.mutations().into_iter().map(|c| c.op).collect();
    assert_eq!(ops, vec!["grant", "ban", "unban"]);
    assert!(report.apply(&agents, &[], &agents).is_empty());
}

#[tokio::test(start_paused = true)]
async fn add_then_remove_restores_the_channel() {
    let h = harness(config(&["@alpha", "@beta"]));
    h.channel_with_helper(CH);
    let before = h.world.roster(CH);
    let agents = names(&["@alpha", "@beta"]);

    let added = install_agents(&h.ctx, CH, &agents, &[], &Progress::silent()).await;
    let installed = added.apply(&[], &agents, &[]);
    assert_eq!(installed, agents);
    assert_eq!(h.world.roster(CH).len(), before.len() + 2);

    let removed = install_agents(&h.ctx, CH, &[], &agents, &Progress::silent()).await;
    assert!(removed.failed.is_empty());
    assert!(removed.apply(&installed, &[], &agents).is_empty());
    assert_eq!(h.world.roster(CH), before);
}

#[tokio::test(start_paused = true)]
async fn agents_holding_the_message_rights_are_skipped() {
    let h = harness(config(&["@alpha"]));
    h.channel_with_helper(CH);
    h.world.seat(
        CH,
        "@alpha",
        MemberStatus::Administrator,
        CapabilitySet {
            post_messages: true,
            edit_messages: true,
            delete_messages: true,
            ..CapabilitySet::none()
        },
    );

    let report = install_agents(&h.ctx, CH, &names(&["@alpha"]), &[], &Progress::silent()).await;
    assert_eq!(report.skipped, names(&["@alpha"]));
    assert!(h.world.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_processed_agent_is_followed_by_the_action_delay() {
    let h = harness(config(&["@a", "@b", "@c"]));
    h.channel_with_helper(CH);
    let delay = h.ctx.config.action_delay();

    let started = Instant::now();
    install_agents(&h.ctx, CH, &names(&["@a", "@b"]), &names(&["@c"]), &Progress::silent()).await;
    assert_eq!(started.elapsed(), delay * 3);
}

#[tokio::test(start_paused = true)]
async fn skipped_agents_cost_no_delay() {
    let h = harness(config(&["@a", "@b"]));
    h.channel_with_helper(CH);
    let agents = names(&["@a", "@b"]);
    install_agents(&h.ctx, CH, &agents, &[], &Progress::silent()).await;

    let started = Instant::now();
    let report = install_agents(&h.ctx, CH, &agents, &[], &Progress::silent()).await;
    assert_eq!(report.skipped, agents);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_wait_replaces_the_action_delay() {
    let h = harness(config(&["@a", "@b"]));
    h.channel_with_helper(CH);
    h.world.fail_next(
        "add_member",
        Some("@a"),
        PlatformError::RateLimited {
            retry_after: Duration::from_secs(30),
        },
    );

    let started = Instant::now();
    let report = install_agents(&h.ctx, CH, &names(&["@a", "@b"]), &[], &Progress::silent()).await;
    assert_eq!(report.succeeded, names(&["@a", "@b"]));
    let wait = Duration::from_secs(30) + h.ctx.config.rate_limit_margin();
    assert_eq!(started.elapsed(), wait + h.ctx.config.action_delay());
}

#[tokio::test(start_paused = true)]
async fn long_rate_limit_streaks_never_fail_the_agent() {
    let h = harness(config(&["@alpha"]));
    h.channel_with_helper(CH);
    for _ in 0..12 {
        h.world.fail_next(
            "add_member",
            Some("@alpha"),
            PlatformError::RateLimited {
                retry_after: Duration::from_secs(1),
            },
        );
    }

    let report = install_agents(&h.ctx, CH, &names(&["@alpha"]), &[], &Progress::silent()).await;
    assert_eq!(report.succeeded, names(&["@alpha"]));
    assert!(report.failed.is_empty());
    assert!(h.world.member(CH, "@alpha").unwrap().is_admin());
}

#[tokio::test(start_paused = true)]
async fn removing_an_absent_agent_succeeds() {
    let h = harness(config(&[]));
    h.channel_with_helper(CH);

    let report = install_agents(&h.ctx, CH, &[], &names(&["@ghost"]), &Progress::silent()).await;
    assert_eq!(report.succeeded, names(&["@ghost"]));
    assert!(report.failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limits_are_waited_out() {
    let h = harness(config(&["@alpha"]));
    h.channel_with_helper(CH);
    h.world.fail_next(
        "add_member",
        Some("@alpha"),
        PlatformError::RateLimited {
            retry_after: Duration::from_secs(30),
        },
    );

    let started = Instant::now();
    let report = install_agents(&h.ctx, CH, &names(&["@alpha"]), &[], &Progress::silent()).await;
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(report.succeeded, names(&["@alpha"]));
    let adds = h.world.calls().into_iter().filter(|c| c.op == "add_member").count();
    assert_eq!(adds, 2);
}

#[tokio::test(start_paused = true)]
async fn refused_grant_on_an_existing_admin_counts_as_success() {
    let h = harness(config(&["@alpha"]));
    h.channel_with_helper(CH);
    h.world.seat(
        CH,
        "@alpha",
        MemberStatus::Administrator,
        CapabilitySet {
            post_messages: true,
            ..CapabilitySet::none()
        },
    );
    h.world.fail_next(
        "grant",
        Some("@alpha"),
        PlatformError::GrantDenied("RIGHT_FORBIDDEN".into()),
    );

    let report = install_agents(&h.ctx, CH, &names(&["@alpha"]), &[], &Progress::silent()).await;
    assert_eq!(report.succeeded, names(&["@alpha"]));
    assert!(report.failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn refused_grant_on_a_plain_member_fails_only_that_agent() {
    let h = harness(config(&["@alpha", "@beta"]));
    h.channel_with_helper(CH);
    h.world.fail_next(
        "grant",
        Some("@alpha"),
        PlatformError::GrantDenied("RIGHT_FORBIDDEN".into()),
    );

    let report = install_agents(&h.ctx, CH, &names(&["@alpha", "@beta"]), &[], &Progress::silent()).await;
    assert_eq!(report.failed, names(&["@alpha"]));
    assert_eq!(report.succeeded, names(&["@beta"]));
}

#[tokio::test(start_paused = true)]
async fn vanished_channel_fails_the_rest() {
    let h = harness(config(&["@a", "@b", "@c"]));
    h.channel_with_helper(CH);
    h.world.fail_next(
        "add_member",
        Some("@b"),
        PlatformError::ChannelGone("CHANNEL_PRIVATE".into()),
    );

    let report = install_agents(&h.ctx, CH, &names(&["@a", "@b", "@c"]), &[], &Progress::silent()).await;
    assert!(report.channel_gone);
    assert_eq!(report.succeeded, names(&["@a"]));
    assert_eq!(report.failed, names(&["@b", "@c"]));
    assert!(h.world.member(CH, "@c").is_none());
}
