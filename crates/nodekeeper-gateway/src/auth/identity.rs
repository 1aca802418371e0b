//! Registration lifecycle of the single system identity.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use super::{AuthError, CredentialStore, IdentityRecord};

/// Whether the device has been claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No identity record exists.
    Unregistered,
    /// The identity record exists.
    Registered,
}

impl RegistrationState {
    /// `true` once registered.
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Registered)
    }
}

/// Single source of truth for the registration state.
///
/// The state is read once at start and cached; only [`register`] moves it
/// forward, and it never moves back while the process runs. Writes to the
/// record are serialized so registration and password changes cannot
/// interleave.
///
/// [`register`]: IdentityAuthority::register
pub struct IdentityAuthority {
    store: Arc<dyn CredentialStore>,
    registered: AtomicBool,
    write_lock: Mutex<()>,
}

impl IdentityAuthority {
    /// Load the current state from `store`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the record exists but cannot be read.
    pub async fn load(store: Arc<dyn CredentialStore>) -> Result<Self, AuthError> {
        let registered = store.read().await?.is_some();
        tracing::debug!(location = %store.location(), registered, "Identity state loaded");

        Ok(Self {
            store,
            registered: AtomicBool::new(registered),
            write_lock: Mutex::new(()),
        })
    }

    /// Current registration state.
    #[must_use]
    pub fn state(&self) -> RegistrationState {
        if self.registered.load(Ordering::Acquire) {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        }
    }

    /// The stored record, if any.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on read failure.
    pub async fn record(&self) -> Result<Option<IdentityRecord>, AuthError> {
        self.store.read().await
    }

    /// Persist the first identity record.
    ///
    /// Exactly one call ever succeeds, including across processes sharing
    /// the store; every other call gets `AlreadyRegistered`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` or `Storage`.
    pub async fn register(&self, candidate: IdentityRecord) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;

        if self.state().is_registered() {
            return Err(AuthError::AlreadyRegistered);
        }

        match self.store.write(&candidate).await {
            Ok(()) => {
                self.registered.store(true, Ordering::Release);
                tracing::info!(location = %self.store.location(), "Identity registered");
                Ok(())
            }
            Err(AuthError::AlreadyRegistered) => {
                // Another process won the race.
                self.registered.store(true, Ordering::Release);
                Err(AuthError::AlreadyRegistered)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the stored password hash.
    ///
    /// # Errors
    ///
    /// Returns `NotRegistered` if there is no record, `Storage` on failure.
    pub async fn change_password(&self, password_hash: String) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self.store.read().await?.ok_or(AuthError::NotRegistered)?;
        record.password_hash = password_hash;
        self.store.replace(&record).await?;

        tracing::info!(location = %self.store.location(), "Password changed");
        Ok(())
    }

    /// Where the record is stored.
    #[must_use]
    pub fn location(&self) -> String {
        self.store.location()
    }
}

impl std::fmt::Debug for IdentityAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAuthority")
            .field("location", &self.store.location())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
