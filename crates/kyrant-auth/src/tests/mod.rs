//! Scenario tests for the auth orchestrator.
//!
//! - `harness.rs`        - Fake identity provider, fake profile store, mount helpers
//! - `initialization.rs` - Initial state resolution, callback wait, safety timer
//! - `sign_in.rs`        - Password sign-in and sign-up, role-checked login
//! - `oauth.rs`          - Redirect start, sign-up role reconcile, expected-role check
//! - `lifecycle.rs`      - Sign-out, stale results, unmount, profile updates

mod lifecycle;
