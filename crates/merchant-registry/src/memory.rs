//! In-memory registry store for development and testing.
//!
//! Every mutation runs under one lock, so the cap invariant holds without
//! the reservation bookkeeping the Redis backend needs.

use crate::models::{Merchant, Program};
use crate::storage::RegistryStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use veilcoupon_common::{Error, Result};

#[derive(Default)]
struct Inner {
    merchants: HashMap<String, Merchant>,
    programs: HashMap<String, Program>,
    keys: HashMap<String, BTreeMap<u32, String>>,
}

/// In-memory registry store
#[derive(Clone, Default)]
pub struct MemoryRegistryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn insert_merchant(&self, merchant: &Merchant) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.merchants.contains_key(&merchant.merchant_id) {
            return Ok(false);
        }
        inner
            .merchants
            .insert(merchant.merchant_id.clone(), merchant.clone());
        Ok(true)
    }

    async fn get_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        let inner = self.inner.lock().await;
        Ok(inner.merchants.get(merchant_id).cloned())
    }

    async fn update_merchant(&self, merchant: &Merchant) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.merchants.contains_key(&merchant.merchant_id) {
            return Ok(false);
        }
        inner
            .merchants
            .insert(merchant.merchant_id.clone(), merchant.clone());
        Ok(true)
    }

    async fn list_merchants(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.merchants.keys().cloned().collect())
    }

    async fn insert_program(&self, program: &Program) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.programs.contains_key(&program.program_id) {
            return Ok(false);
        }
        inner
            .keys
            .entry(program.program_id.clone())
            .or_default()
            .insert(program.key_version, program.verification_key.clone());
        inner
            .programs
            .insert(program.program_id.clone(), program.clone());
        Ok(true)
    }

    async fn get_program(&self, program_id: &str) -> Result<Option<Program>> {
        let inner = self.inner.lock().await;
        Ok(inner.programs.get(program_id).cloned())
    }

    async fn list_merchant_programs(&self, merchant_id: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .programs
            .values()
            .filter(|p| p.merchant_id == merchant_id)
            .map(|p| p.program_id.clone())
            .collect())
    }

    async fn rotate_verification_key(&self, program_id: &str, key_hex: &str) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        let program = inner
            .programs
            .get_mut(program_id)
            .ok_or_else(|| Error::ProgramNotFound(program_id.to_string()))?;

        program.key_version += 1;
        program.verification_key = key_hex.to_string();
        let version = program.key_version;

        inner
            .keys
            .entry(program_id.to_string())
            .or_default()
            .insert(version, key_hex.to_string());
        Ok(version)
    }

    async fn get_verification_key(
        &self,
        program_id: &str,
        version: u32,
    ) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .keys
            .get(program_id)
            .and_then(|versions| versions.get(&version))
            .cloned())
    }

    async fn reserve_issuance_slot(&self, program_id: &str) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let program = inner
            .programs
            .get_mut(program_id)
            .ok_or_else(|| Error::ProgramNotFound(program_id.to_string()))?;

        if program.issued_count >= program.max_issuance {
            return Err(Error::IssuanceCapReached);
        }
        program.issued_count += 1;
        Ok(program.issued_count)
    }

    async fn release_issuance_slot(&self, program_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(program) = inner.programs.get_mut(program_id) {
            program.issued_count = program.issued_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn set_issued_count(&self, program_id: &str, count: u64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(program) = inner.programs.get_mut(program_id) {
            program.issued_count = count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilcoupon_common::WalletAddress;

    fn merchant(id: &str) -> Merchant {
        Merchant::new(id.to_string(), WalletAddress::new([1u8; 32]))
    }

    fn program(id: &str, merchant_id: &str, max: u64) -> Program {
        Program::new(
            id.to_string(),
            merchant_id.to_string(),
            3600,
            max,
            "aabbcc".to_string(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_merchant_rejected() {
        let store = MemoryRegistryStore::new();
        assert!(store.insert_merchant(&merchant("m-1")).await.unwrap());
        assert!(!store.insert_merchant(&merchant("m-1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_reserve_until_cap() {
        let store = MemoryRegistryStore::new();
        store.insert_merchant(&merchant("m-1")).await.unwrap();
        store.insert_program(&program("p-1", "m-1", 2)).await.unwrap();

        assert_eq!(store.reserve_issuance_slot("p-1").await.unwrap(), 1);
        assert_eq!(store.reserve_issuance_slot("p-1").await.unwrap(), 2);
        assert!(matches!(
            store.reserve_issuance_slot("p-1").await.unwrap_err(),
            Error::IssuanceCapReached
        ));

        store.release_issuance_slot("p-1").await.unwrap();
        assert_eq!(store.reserve_issuance_slot("p-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_respect_cap() {
        let store = MemoryRegistryStore::new();
        store.insert_merchant(&merchant("m-1")).await.unwrap();
        store
            .insert_program(&program("p-race", "m-1", 5))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.reserve_issuance_slot("p-race").await.is_ok()
            }));
        }

        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 5);

        let program = store.get_program("p-race").await.unwrap().unwrap();
        assert_eq!(program.issued_count, 5);
    }

    #[tokio::test]
    async fn test_key_rotation_retains_history() {
        let store = MemoryRegistryStore::new();
        store.insert_merchant(&merchant("m-1")).await.unwrap();
        store.insert_program(&program("p-1", "m-1", 10)).await.unwrap();

        let version = store
            .rotate_verification_key("p-1", "ddeeff")
            .await
            .unwrap();
        assert_eq!(version, 2);

        // Both versions resolve
        assert_eq!(
            store.get_verification_key("p-1", 1).await.unwrap().unwrap(),
            "aabbcc"
        );
        assert_eq!(
            store.get_verification_key("p-1", 2).await.unwrap().unwrap(),
            "ddeeff"
        );
        assert!(store
            .get_verification_key("p-1", 3)
            .await
            .unwrap()
            .is_none());
    }
}
