use chrono::{Duration as ChronoDuration, Utc};

use super::fakes::{HELPER_ID, config, harness};
use crate::core::capacity::ensure_capacity;
use crate::core::client::ChannelId;

const X: ChannelId = -100;
const Y: ChannelId = -200;
const Z: ChannelId = -300;

fn ceiling(n: usize) -> crate::core::config::Config {
    crate::core::config::Config {
        max_user_channels: n,
        ..config(&["@alpha"])
    }
}

async fn joined(h: &super::fakes::Harness, channel: ChannelId, minutes_ago: i64) {
    h.channel_with_helper(channel);
    h.ctx
        .store
        .record_helper_joined(channel, 1, Utc::now() - ChronoDuration::minutes(minutes_ago))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn below_ceiling_nothing_is_evicted() {
    let h = harness(ceiling(3));
    joined(&h, X, 10).await;
    joined(&h, Y, 5).await;

    let report = ensure_capacity(&h.ctx, Z).await.unwrap();
    assert!(report.evicted.is_empty());
    assert_eq!(report.active_after, 2);
    assert!(h.world.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn oldest_membership_is_evicted_first() {
    let h = harness(ceiling(2));
    joined(&h, Y, 5).await;
    joined(&h, X, 10).await;

    let report = ensure_capacity(&h.ctx, Z).await.unwrap();
    assert_eq!(report.evicted, vec![X]);
    assert!(report.active_after < 2);
    assert!(h.world.member(X, &HELPER_ID.to_string()).is_none());
    assert!(h.world.member(Y, &HELPER_ID.to_string()).is_some());

    let x = h.ctx.store.get_channel(X).await.unwrap().unwrap();
    assert!(!x.helper_member);
    assert!(x.helper_left_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn protected_channels_and_the_target_are_never_evicted() {
    let h = harness(ceiling(2));
    joined(&h, X, 10).await;
    joined(&h, Y, 5).await;

    let _guard = h.ctx.protected.protect(X);
    let report = ensure_capacity(&h.ctx, Z).await.unwrap();
    assert_eq!(report.evicted, vec![Y]);

    let report = ensure_capacity(&h.ctx, X).await.unwrap();
    assert!(report.evicted.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_leave_still_clears_the_membership() {
    let h = harness(ceiling(1));
    joined(&h, X, 10).await;
    h.world.fail_next(
        "leave",
        None,
        crate::core::client::PlatformError::Transport("connection reset".into()),
    );

    let report = ensure_capacity(&h.ctx, Z).await.unwrap();
    assert_eq!(report.evicted, vec![X]);
    assert_eq!(h.ctx.store.count_active().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn nothing_eligible_is_reported() {
    let h = harness(ceiling(1));
    joined(&h, X, 10).await;
    let _guard = h.ctx.protected.protect(X);

    let report = ensure_capacity(&h.ctx, Z).await.unwrap();
    assert!(report.evicted.is_empty());
    assert!(report.no_candidate);
    assert_eq!(report.active_after, 1);
}

#[tokio::test(start_paused = true)]
async fn evictions_per_call_are_bounded() {
    let h = harness(crate::core::config::Config {
        max_evictions_per_call: 2,
        ..ceiling(1)
    });
    for (i, c) in [-1i64, -2, -3, -4].into_iter().enumerate() {
        joined(&h, c, 40 - i as i64).await;
    }

    let report = ensure_capacity(&h.ctx, Z).await.unwrap();
    assert_eq!(report.evicted, vec![-1, -2]);
    assert_eq!(report.active_after, 2);
}
