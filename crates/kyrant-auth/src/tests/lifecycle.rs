//! Sign-out, identity changes, unmount and profile edits.
//!
//! Covered:
//! - Sign-out clears the view and the pending sign-up role
//! - A failed provider sign-out still clears local state
//! - Profile results for a previous identity never land
//! - Nothing happens after unmount
//! - Profile refresh and updates

use super::harness::{settle, wait_for_view, TestHarness};
use crate::auth_fsm::AuthPhase;
use crate::error::SignInError;
use crate::provider::ProviderEvent;
use crate::roles::Role;
use crate::types::{fixtures, ProfileUpdate};
use crate::AuthError;
use kyrant_storage::{DurableStorage, StorageKeys};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn sign_out_clears_view_and_signup_role() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Merchant);
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    wait_for_view(&orchestrator, |v| v.role_profile.is_some()).await;
    settle().await;
    harness.storage.set(StorageKeys::OAUTH_ROLE, "designer").unwrap();

    orchestrator.sign_out().await.unwrap();

    let view = orchestrator.view();
    assert!(!view.is_authenticated());
    assert!(view.identity.is_none());
    assert!(view.role_profile.is_none());
    assert!(!view.loading);
    assert_eq!(orchestrator.phase(), AuthPhase::Unauthenticated);
    assert_eq!(harness.storage.get(StorageKeys::OAUTH_ROLE).unwrap(), None);
    assert!(!harness.provider.has_session());
}

#[tokio::test(start_paused = true)]
async fn failed_sign_out_purges_provider_keys() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Merchant);
    harness.provider.set_session("u1");
    harness.provider.fail_sign_out(true);
    harness.storage.set("unrelated", "kept").unwrap();
    let orchestrator = harness.mount();
    orchestrator.wait_until_loaded().await;
    assert!(harness.storage.has("sb-test-auth-token").unwrap());

    let err = orchestrator.sign_out().await.unwrap_err();

    assert!(matches!(err, AuthError::NetworkUnavailable));
    assert!(!orchestrator.view().is_authenticated());
    assert!(harness
        .storage
        .list_keys_with_prefix("sb-test-")
        .unwrap()
        .is_empty());
    assert_eq!(
        harness.storage.get("unrelated").unwrap(),
        Some("kept".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn profile_arriving_after_sign_out_is_dropped() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Merchant);
    harness.profiles.set_fetch_delay(Duration::from_secs(2));
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    let view = orchestrator.wait_until_loaded().await;
    assert!(view.role_profile.is_none());

    orchestrator.sign_out().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let view = orchestrator.view();
    assert!(!view.is_authenticated());
    assert!(view.role_profile.is_none());
}

#[tokio::test(start_paused = true)]
async fn identity_switch_ends_with_new_users_profile() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Designer);
    harness.add_user("u2", Role::Merchant);
    harness.profiles.set_fetch_delay(Duration::from_secs(1));
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    orchestrator.wait_until_loaded().await;

    harness
        .provider
        .emit(ProviderEvent::signed_in(fixtures::session("u2")));
    let view = wait_for_view(&orchestrator, |v| v.role_profile.is_some()).await;
    assert_eq!(view.user_id(), Some("u2"));
    assert_eq!(view.role_profile.as_ref().unwrap().user_id, "u2");
    assert_eq!(view.role(), Some(Role::Merchant));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(orchestrator.view().role(), Some(Role::Merchant));
}

#[tokio::test(start_paused = true)]
async fn token_refresh_keeps_profile() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Designer);
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    wait_for_view(&orchestrator, |v| v.role_profile.is_some()).await;
    settle().await;
    let fetches = harness.profiles.fetch_count("u1");

    let mut refreshed = fixtures::session("u1");
    refreshed.access_token = "access-u1-rotated".to_string();
    harness
        .provider
        .emit(ProviderEvent::token_refreshed(Some(refreshed)));
    let view = wait_for_view(&orchestrator, |v| {
        v.session
            .as_ref()
            .is_some_and(|s| s.access_token == "access-u1-rotated")
    })
    .await;
    settle().await;

    assert_eq!(view.role(), Some(Role::Designer));
    assert_eq!(harness.profiles.fetch_count("u1"), fetches);
}

#[tokio::test(start_paused = true)]
async fn null_session_events_do_not_sign_out() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Designer);
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    wait_for_view(&orchestrator, |v| v.role_profile.is_some()).await;

    harness.provider.emit(ProviderEvent::token_refreshed(None));
    harness.provider.emit(ProviderEvent::user_updated(None));
    settle().await;

    let view = orchestrator.view();
    assert_eq!(view.user_id(), Some("u1"));
    assert_eq!(view.role(), Some(Role::Designer));
    assert_eq!(orchestrator.phase(), AuthPhase::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn unmounted_orchestrator_ignores_everything() {
    let harness = TestHarness::new();
    let email = harness.add_user("u1", Role::Merchant);
    let orchestrator = harness.mount();
    orchestrator.wait_until_loaded().await;

    orchestrator.unmount();
    assert!(!orchestrator.is_mounted());

    harness.provider.complete_redirect("u1");
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!orchestrator.view().is_authenticated());

    let err = orchestrator.sign_in(&email, "secret1", None).await.unwrap_err();
    assert!(matches!(err, SignInError::Provider(AuthError::Unmounted)));
    assert!(matches!(
        orchestrator.sign_out().await,
        Err(AuthError::Unmounted)
    ));
    assert!(matches!(
        orchestrator.sign_in_with_oauth(Some("designer"), None).await,
        Err(AuthError::Unmounted)
    ));
}

#[tokio::test(start_paused = true)]
async fn unmount_before_resolution_leaves_loading() {
    let harness = TestHarness::new();
    harness.provider.defer_initial_state();
    let orchestrator = harness.mount();

    orchestrator.unmount();
    tokio::time::sleep(Duration::from_secs(30)).await;

    // The safety timer was cancelled with everything else.
    assert!(orchestrator.view().loading);
}

#[tokio::test(start_paused = true)]
async fn refresh_profile_picks_up_changes() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Merchant);
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    wait_for_view(&orchestrator, |v| v.role_profile.is_some()).await;

    harness.profiles.insert(fixtures::profile("u1", Role::Designer));
    let profile = orchestrator.refresh_profile().await;

    assert_eq!(profile.map(|p| p.role), Some(Role::Designer));
    assert_eq!(orchestrator.view().role(), Some(Role::Designer));
}

#[tokio::test(start_paused = true)]
async fn refresh_profile_when_signed_out_is_none() {
    let harness = TestHarness::new();
    let orchestrator = harness.mount();
    orchestrator.wait_until_loaded().await;

    assert!(orchestrator.refresh_profile().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn update_profile_refreshes_view() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Designer);
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    wait_for_view(&orchestrator, |v| v.role_profile.is_some()).await;

    orchestrator
        .update_profile(ProfileUpdate {
            display_name: Some("Grace".to_string()),
            avatar_ref: None,
        })
        .await
        .unwrap();

    let view = orchestrator.view();
    let profile = view.role_profile.as_ref().unwrap();
    assert_eq!(profile.display_name.as_deref(), Some("Grace"));
    assert_eq!(profile.role, Role::Designer);
    assert_eq!(harness.profiles.profile_updates().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_profile_update_is_a_no_op() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Designer);
    harness.provider.set_session("u1");
    let orchestrator = harness.mount();
    orchestrator.wait_until_loaded().await;

    orchestrator
        .update_profile(ProfileUpdate::default())
        .await
        .unwrap();

    assert!(harness.profiles.profile_updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn update_profile_requires_session() {
    let harness = TestHarness::new();
    let orchestrator = harness.mount();
    orchestrator.wait_until_loaded().await;

    let err = orchestrator
        .update_profile(ProfileUpdate {
            display_name: Some("Nobody".to_string()),
            avatar_ref: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::NotLoggedIn));
}

#[tokio::test(start_paused = true)]
async fn failed_profile_update_is_reported() {
    let harness = TestHarness::new();
    harness.add_user("u1", Role::Designer);
    harness.provider.set_session("u1");
    harness.profiles.fail_updates(true);
    let orchestrator = harness.mount();
    orchestrator.wait_until_loaded().await;

    let err = orchestrator
        .update_profile(ProfileUpdate {
            display_name: Some("Grace".to_string()),
            avatar_ref: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Provider { status: 500, .. }));
}
