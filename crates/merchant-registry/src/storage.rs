//! Storage for merchants and programs
//!
//! Data model (Redis backend):
//! - merchant:{id} → JSON record
//! - merchants:all → Set of merchant ids
//! - program:{id} → JSON record (static fields)
//! - program:{id}:issued → Integer counter, the authoritative issued count
//! - program:{id}:keys → Hash of key version → key hex
//! - programs:by-merchant:{merchant_id} → Set of program ids

use crate::models::{Merchant, Program};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};
use veilcoupon_common::{Error, Result};

/// Storage backend for the registry.
///
/// `reserve_issuance_slot` / `release_issuance_slot` are the only way the
/// issued count moves. The reserve is an atomic check-and-increment: two
/// concurrent callers racing for the last slot resolve to exactly one
/// winner, the loser gets `IssuanceCapReached`.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Returns false if the merchant id is already taken
    async fn insert_merchant(&self, merchant: &Merchant) -> Result<bool>;
    async fn get_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>>;
    /// Returns false if the merchant does not exist
    async fn update_merchant(&self, merchant: &Merchant) -> Result<bool>;
    async fn list_merchants(&self) -> Result<Vec<String>>;

    /// Returns false if the program id is already taken
    async fn insert_program(&self, program: &Program) -> Result<bool>;
    async fn get_program(&self, program_id: &str) -> Result<Option<Program>>;
    async fn list_merchant_programs(&self, merchant_id: &str) -> Result<Vec<String>>;

    /// Store a new key, bump the version, and return it. Prior versions
    /// are retained for coupons issued under them.
    async fn rotate_verification_key(&self, program_id: &str, key_hex: &str) -> Result<u32>;
    async fn get_verification_key(&self, program_id: &str, version: u32)
        -> Result<Option<String>>;

    /// Atomically claim an issuance slot; `IssuanceCapReached` at the cap
    async fn reserve_issuance_slot(&self, program_id: &str) -> Result<u64>;
    /// Roll a reserved slot back after a downstream failure
    async fn release_issuance_slot(&self, program_id: &str) -> Result<()>;
    /// Reconciliation override for counters that drifted after a crash
    async fn set_issued_count(&self, program_id: &str, count: u64) -> Result<()>;
}

/// Redis-backed registry store
#[derive(Clone)]
pub struct RedisRegistryStore {
    conn: ConnectionManager,
}

impl RedisRegistryStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| Error::Storage(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Registry store connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn merchant_key(id: &str) -> String {
    format!("merchant:{}", id)
}

fn program_key(id: &str) -> String {
    format!("program:{}", id)
}

fn issued_key(id: &str) -> String {
    format!("program:{}:issued", id)
}

fn keys_key(id: &str) -> String {
    format!("program:{}:keys", id)
}

fn by_merchant_key(merchant_id: &str) -> String {
    format!("programs:by-merchant:{}", merchant_id)
}

#[async_trait]
impl RegistryStore for RedisRegistryStore {
    async fn insert_merchant(&self, merchant: &Merchant) -> Result<bool> {
        let mut conn = self.conn();
        let key = merchant_key(&merchant.merchant_id);

        let json = serde_json::to_string(merchant)?;
        let created: bool = conn
            .set_nx(&key, json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if !created {
            debug!("Merchant already exists: {}", merchant.merchant_id);
            return Ok(false);
        }

        conn.sadd::<_, _, ()>("merchants:all", &merchant.merchant_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Registered merchant: {}", merchant.merchant_id);
        Ok(true)
    }

    async fn get_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        let mut conn = self.conn();

        let json: Option<String> = conn
            .get(merchant_key(merchant_id))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn update_merchant(&self, merchant: &Merchant) -> Result<bool> {
        let mut conn = self.conn();
        let key = merchant_key(&merchant.merchant_id);

        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        if !exists {
            return Ok(false);
        }

        let json = serde_json::to_string(merchant)?;
        conn.set::<_, _, ()>(&key, json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        debug!("Updated merchant: {}", merchant.merchant_id);
        Ok(true)
    }

    async fn list_merchants(&self) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn
            .smembers("merchants:all")
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(ids)
    }

    async fn insert_program(&self, program: &Program) -> Result<bool> {
        let mut conn = self.conn();
        let key = program_key(&program.program_id);

        let json = serde_json::to_string(program)?;
        let created: bool = conn
            .set_nx(&key, json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if !created {
            debug!("Program already exists: {}", program.program_id);
            return Ok(false);
        }

        conn.hset::<_, _, _, ()>(
            keys_key(&program.program_id),
            program.key_version,
            &program.verification_key,
        )
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;

        conn.sadd::<_, _, ()>(by_merchant_key(&program.merchant_id), &program.program_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!(
            "Created program {} for merchant {}",
            program.program_id, program.merchant_id
        );
        Ok(true)
    }

    async fn get_program(&self, program_id: &str) -> Result<Option<Program>> {
        let mut conn = self.conn();

        let json: Option<String> = conn
            .get(program_key(program_id))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let Some(data) = json else {
            return Ok(None);
        };

        let mut program: Program = serde_json::from_str(&data)?;

        // The JSON record is static; the counter key is authoritative.
        let issued: Option<u64> = conn
            .get(issued_key(program_id))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        program.issued_count = issued.unwrap_or(0);

        Ok(Some(program))
    }

    async fn list_merchant_programs(&self, merchant_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn
            .smembers(by_merchant_key(merchant_id))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(ids)
    }

    async fn rotate_verification_key(&self, program_id: &str, key_hex: &str) -> Result<u32> {
        let mut conn = self.conn();

        let mut program = self
            .get_program(program_id)
            .await?
            .ok_or_else(|| Error::ProgramNotFound(program_id.to_string()))?;

        let version = program.key_version + 1;
        program.key_version = version;
        program.verification_key = key_hex.to_string();

        conn.hset::<_, _, _, ()>(keys_key(program_id), version, key_hex)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let json = serde_json::to_string(&program)?;
        conn.set::<_, _, ()>(program_key(program_id), json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!(
            "Rotated verification key for program {} to version {}",
            program_id, version
        );
        Ok(version)
    }

    async fn get_verification_key(
        &self,
        program_id: &str,
        version: u32,
    ) -> Result<Option<String>> {
        let mut conn = self.conn();
        let key: Option<String> = conn
            .hget(keys_key(program_id), version)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(key)
    }

    /// Claim one issuance slot.
    ///
    /// # Returns
    /// * `Ok(n)` - This caller holds slot n (1-based)
    /// * `Err(IssuanceCapReached)` - The program is at its cap
    async fn reserve_issuance_slot(&self, program_id: &str) -> Result<u64> {
        let mut conn = self.conn();

        let program = self
            .get_program(program_id)
            .await?
            .ok_or_else(|| Error::ProgramNotFound(program_id.to_string()))?;

        // INCR is atomic; overshoot is rolled back before reporting the
        // cap, so the counter never stays above max_issuance.
        let claimed: u64 = conn
            .incr(issued_key(program_id), 1)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if claimed > program.max_issuance {
            conn.decr::<_, _, ()>(issued_key(program_id), 1)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            return Err(Error::IssuanceCapReached);
        }

        debug!(
            "Reserved issuance slot {}/{} for program {}",
            claimed, program.max_issuance, program_id
        );
        Ok(claimed)
    }

    async fn release_issuance_slot(&self, program_id: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.decr::<_, _, ()>(issued_key(program_id), 1)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        debug!("Released issuance slot for program {}", program_id);
        Ok(())
    }

    async fn set_issued_count(&self, program_id: &str, count: u64) -> Result<()> {
        let mut conn = self.conn();
        conn.set::<_, _, ()>(issued_key(program_id), count)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}
