use picsche_backend::{
    models::usage::UsageRecord,
    services::usage_store::{InMemoryUsageStore, UsageStore},
    ApiError,
};
use std::sync::Arc;
use time::macros::datetime;

use crate::common::{quota_service, FixedClock};

#[tokio::test]
async fn test_fresh_user_has_one_free_call() {
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = quota_service(InMemoryUsageStore::new(), clock);

    let view = service.read("u1").await.unwrap();

    assert_eq!(view.usage_count, 0);
    assert_eq!(view.reward_grants, 0);
    assert_eq!(view.month, "2024-01");
    assert_eq!(view.remaining, 1);
    assert!(view.can_use);
    assert_eq!(view.reward_slots_remaining, 2);
}

#[tokio::test]
async fn test_read_does_not_create_record() {
    let store = InMemoryUsageStore::new();
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = quota_service(store.clone(), clock);

    service.read("u1").await.unwrap();

    assert!(store.get("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_increment_then_grant_restores_a_call() {
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = quota_service(InMemoryUsageStore::new(), clock);

    let view = service.increment("u1").await.unwrap();
    assert_eq!(view.usage_count, 1);
    assert_eq!(view.remaining, 0);
    assert!(!view.can_use);

    let view = service.grant_reward("u1").await.unwrap();
    assert_eq!(view.reward_grants, 1);
    assert_eq!(view.remaining, 1);

    let view = service.read("u1").await.unwrap();
    assert_eq!(view.usage_count, 1);
    assert_eq!(view.reward_grants, 1);
    assert_eq!(view.remaining, 1);
    assert!(view.can_use);
    assert_eq!(view.reward_slots_remaining, 1);
}

#[tokio::test]
async fn test_increment_past_limit_is_not_blocked() {
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = quota_service(InMemoryUsageStore::new(), clock);

    service.increment("u1").await.unwrap();
    // usage_count == limit; the ledger still records the call
    let view = service.increment("u1").await.unwrap();
    assert_eq!(view.usage_count, 2);
    assert_eq!(view.remaining, 0);

    let view = service.increment("u1").await.unwrap();
    assert_eq!(view.usage_count, 3);
    assert_eq!(view.remaining, 0);
}

#[tokio::test]
async fn test_grant_reward_saturates_at_two() {
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = quota_service(InMemoryUsageStore::new(), clock);

    let mut last = None;
    for _ in 0..5 {
        last = Some(service.grant_reward("u1").await.unwrap());
    }
    let view = last.unwrap();

    assert_eq!(view.reward_grants, 2);
    assert_eq!(view.remaining, 3);
    assert_eq!(view.reward_slots_remaining, 0);
}

#[tokio::test]
async fn test_rollover_read_leaves_stored_record_untouched() {
    let store = InMemoryUsageStore::new();
    let january = UsageRecord {
        usage_count: 3,
        reward_grants: 2,
        month: "2024-01".to_string(),
    };
    store.set("u1", &january).await.unwrap();

    let clock = FixedClock::new(datetime!(2024-02-01 00:00 UTC));
    let service = quota_service(store.clone(), clock);

    let view = service.read("u1").await.unwrap();
    assert_eq!(view.usage_count, 0);
    assert_eq!(view.reward_grants, 0);
    assert_eq!(view.month, "2024-02");
    assert_eq!(view.remaining, 1);
    assert!(view.can_use);

    assert_eq!(store.get("u1").await.unwrap(), Some(january));
}

#[tokio::test]
async fn test_rollover_write_persists_reset_record() {
    let store = InMemoryUsageStore::new();
    let clock = FixedClock::new(datetime!(2024-01-31 23:59 UTC));
    let service = quota_service(store.clone(), clock.clone());

    service.increment("u1").await.unwrap();
    service.grant_reward("u1").await.unwrap();
    service.grant_reward("u1").await.unwrap();

    clock.set(datetime!(2024-02-01 00:01 UTC));
    let view = service.grant_reward("u1").await.unwrap();
    assert_eq!(view.usage_count, 0);
    assert_eq!(view.reward_grants, 1);
    assert_eq!(view.month, "2024-02");

    assert_eq!(
        store.get("u1").await.unwrap(),
        Some(UsageRecord {
            usage_count: 0,
            reward_grants: 1,
            month: "2024-02".to_string(),
        })
    );

    clock.set(datetime!(2024-03-05 12:00 UTC));
    let view = service.increment("u1").await.unwrap();
    assert_eq!(view.usage_count, 1);
    assert_eq!(view.reward_grants, 0);
    assert_eq!(view.remaining, 0);
}

#[tokio::test]
async fn test_user_id_is_trimmed_before_lookup() {
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = quota_service(InMemoryUsageStore::new(), clock);

    service.increment("  u1  ").await.unwrap();
    let view = service.read("u1").await.unwrap();

    assert_eq!(view.usage_count, 1);
}

#[tokio::test]
async fn test_blank_user_id_rejected_by_every_operation() {
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = quota_service(InMemoryUsageStore::new(), clock);

    for user_id in ["", "   "] {
        assert!(matches!(service.read(user_id).await, Err(ApiError::BadRequest(_))));
        assert!(matches!(
            service.increment(user_id).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            service.grant_reward(user_id).await,
            Err(ApiError::BadRequest(_))
        ));
    }
}

#[tokio::test]
async fn test_users_are_tracked_independently() {
    let clock = FixedClock::new(datetime!(2024-01-10 09:00 UTC));
    let service = Arc::new(quota_service(InMemoryUsageStore::new(), clock));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.increment(&format!("user-{}", i)).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().unwrap().usage_count, 1);
    }

    for i in 0..5 {
        let view = service.read(&format!("user-{}", i)).await.unwrap();
        assert_eq!(view.usage_count, 1);
    }
}
