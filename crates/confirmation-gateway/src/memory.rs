//! In-memory token store for development and testing

use crate::models::{ConfirmationToken, TokenState};
use crate::storage::TokenStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use veilcoupon_common::{Error, Result};

#[derive(Default)]
struct Inner {
    tokens: HashMap<String, ConfirmationToken>,
    reserved: HashSet<String>,
}

/// In-memory token store
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert_token(&self, token: &ConfirmationToken) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.tokens.contains_key(&token.token) {
            return Err(Error::Storage("confirmation token collision".to_string()));
        }
        inner.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<ConfirmationToken>> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.get(token).cloned())
    }

    async fn begin_confirm(&self, token: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let pending = matches!(
            inner.tokens.get(token),
            Some(record) if record.state == TokenState::Pending
        );
        if !pending || inner.reserved.contains(token) {
            return Ok(false);
        }

        inner.reserved.insert(token.to_string());
        Ok(true)
    }

    async fn finalize_confirm(&self, token: &str, used_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let record = inner.tokens.get_mut(token).ok_or(Error::TokenNotFound)?;
        record.state = TokenState::Confirmed;
        record.used_at = Some(used_at);

        inner.reserved.remove(token);
        Ok(())
    }

    async fn release_confirm(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.reserved.remove(token);
        Ok(())
    }

    async fn mark_expired(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.reserved.contains(token) {
            return Ok(());
        }
        if let Some(record) = inner.tokens.get_mut(token) {
            if record.state == TokenState::Pending {
                record.state = TokenState::Expired;
            }
        }
        Ok(())
    }
}
