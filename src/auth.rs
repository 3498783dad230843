//! Session authentication signal. Unauthenticated sessions are served from
//! the synthetic generator instead of the real sample source.

use std::sync::atomic::{AtomicBool, Ordering};

pub trait SessionAuth: Send + Sync {
    fn is_authenticated(&self) -> bool;
}

/// Shared, toggleable flag (e.g. flipped by a login handler).
#[derive(Debug, Default)]
pub struct AuthFlag(AtomicBool);

impl AuthFlag {
    pub fn new(authenticated: bool) -> Self {
        Self(AtomicBool::new(authenticated))
    }

    pub fn set(&self, authenticated: bool) {
        self.0.store(authenticated, Ordering::Release);
    }
}

impl SessionAuth for AuthFlag {
    fn is_authenticated(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
