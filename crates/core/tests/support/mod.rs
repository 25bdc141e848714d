//! Shared test helpers for `tunelink-core` integration tests.
//!
//! In-memory fakes for the storage and provider ports so session tests can
//! focus on behaviour instead of plumbing.

pub mod fakes;

use std::sync::Arc;

use tunelink_common::{SecurityValidator, SlidingWindowRateLimiter};
use tunelink_core::{SessionManager, SessionManagerConfig};

use self::fakes::{FakeOAuthProvider, FakeStorage};

pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub storage: Arc<FakeStorage>,
    pub provider: Arc<FakeOAuthProvider>,
}

pub fn harness() -> Harness {
    harness_with(SessionManagerConfig::default())
}

pub fn harness_with(config: SessionManagerConfig) -> Harness {
    let storage = Arc::new(FakeStorage::default());
    let provider = Arc::new(FakeOAuthProvider::default());
    let manager = Arc::new(SessionManager::new(
        storage.clone(),
        provider.clone(),
        Arc::new(SlidingWindowRateLimiter::default()),
        SecurityValidator::default(),
        config,
    ));
    Harness { manager, storage, provider }
}
