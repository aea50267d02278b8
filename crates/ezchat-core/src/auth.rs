//! Session token management.
//!
//! A [`TokenManager`] holds the current bearer credential for one room
//! session and replaces it wholesale when refreshed. Refreshes are
//! serialized: callers that queue behind an in-flight refresh reuse its
//! result instead of hitting the supplier again.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::metrics;

/// An external source of fresh credentials.
#[async_trait]
pub trait TokenSupplier: Send + Sync {
    /// Produce a new bearer token.
    async fn fetch_token(&self) -> Result<String>;
}

/// Adapter turning an async closure into a [`TokenSupplier`].
pub struct FnTokenSupplier<F>(F);

#[async_trait]
impl<F, Fut> TokenSupplier for FnTokenSupplier<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn fetch_token(&self) -> Result<String> {
        (self.0)().await
    }
}

/// Wrap an async closure as a shareable token supplier.
pub fn token_fn<F, Fut>(f: F) -> Arc<dyn TokenSupplier>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    Arc::new(FnTokenSupplier(f))
}

/// Holds and refreshes the credential of one room session.
pub struct TokenManager {
    current: RwLock<Option<String>>,
    supplier: Option<Arc<dyn TokenSupplier>>,
    /// A static token given alongside a supplier wins the first refresh.
    static_pending: AtomicBool,
    /// Bumped after every completed refresh.
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    /// Create a manager from an optional static token and optional supplier.
    #[must_use]
    pub fn new(token: Option<String>, supplier: Option<Arc<dyn TokenSupplier>>) -> Self {
        let static_pending = token.is_some() && supplier.is_some();
        Self {
            current: RwLock::new(token),
            supplier,
            static_pending: AtomicBool::new(static_pending),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Whether a static token shadows the supplier for the first use.
    #[must_use]
    pub fn static_overrides_supplier(&self) -> bool {
        self.static_pending.load(Ordering::SeqCst)
    }

    /// Whether a supplier is configured.
    #[must_use]
    pub fn has_supplier(&self) -> bool {
        self.supplier.is_some()
    }

    /// The credential currently held, if any.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Refresh the credential and return the one to use next.
    ///
    /// Returns immediately with the current credential when no supplier is
    /// configured, or when a static token is still pending its first use.
    ///
    /// # Errors
    ///
    /// Returns the supplier's error; the stored credential is left unchanged.
    pub async fn refresh(&self) -> Result<Option<String>> {
        let Some(supplier) = &self.supplier else {
            return Ok(self.current_token());
        };

        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;

        if self.static_pending.swap(false, Ordering::SeqCst) {
            debug!("Using static token for first request");
            return Ok(self.current_token());
        }

        if self.generation.load(Ordering::SeqCst) != seen {
            // Someone refreshed while we waited for the lock
            return Ok(self.current_token());
        }

        let token = supplier.fetch_token().await?;
        metrics::record_token_refresh();

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);

        debug!("Token refreshed");
        Ok(Some(token))
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("has_token", &self.current_token().is_some())
            .field("has_supplier", &self.has_supplier())
            .finish()
    }
}
