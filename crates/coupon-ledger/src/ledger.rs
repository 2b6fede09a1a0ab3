//! The coupon state machine and its orchestration.
//!
//! Issuance joins an atomic cap reservation to the coupon mint; a failed
//! mint releases the slot. Redemption joins the confirmation-token
//! reservation to the coupon's `Issued -> Redeemed` check-and-set; any
//! failure after the reservation releases it, so both legs land or
//! neither does.

use crate::models::{Coupon, CouponState, LedgerStats};
use crate::storage::CouponStore;
use chrono::{Duration, Utc};
use confirmation_gateway::{ConfirmationAction, ConfirmationGateway, ConfirmationToken, TokenStore};
use merchant_registry::{Registry, RegistryStore};
use proof_verifier::{VerificationKey, Verifier};
use tracing::{error, info, warn};
use uuid::Uuid;
use veilcoupon_common::{
    Commitment, Error, ProofBundle, PublicInputs, Result, WalletAddress,
};
use wallet_directory::{WalletDirectory, WalletStore};

pub struct CouponLedger<C, R, T, W> {
    coupons: C,
    registry: Registry<R>,
    gateway: ConfirmationGateway<T>,
    wallets: WalletDirectory<W>,
    verifier: Verifier,
}

impl<C, R, T, W> CouponLedger<C, R, T, W>
where
    C: CouponStore,
    R: RegistryStore,
    T: TokenStore,
    W: WalletStore,
{
    pub fn new(
        coupons: C,
        registry: Registry<R>,
        gateway: ConfirmationGateway<T>,
        wallets: WalletDirectory<W>,
    ) -> Self {
        Self {
            coupons,
            registry,
            gateway,
            wallets,
            verifier: Verifier::new(),
        }
    }

    pub fn registry(&self) -> &Registry<R> {
        &self.registry
    }

    pub fn gateway(&self) -> &ConfirmationGateway<T> {
        &self.gateway
    }

    pub fn wallets(&self) -> &WalletDirectory<W> {
        &self.wallets
    }

    /// Mint a coupon under a program for an eligible wallet.
    ///
    /// The issuance proof is verified against the program's current key
    /// and the digest of `(program_id, owner_wallet,
    /// metadata_commitment)` - it reveals eligibility, not purchase
    /// contents. The cap check-and-increment is atomic: of two calls
    /// racing for the last slot, exactly one mints.
    pub async fn issue(
        &self,
        program_id: &str,
        owner_wallet: &WalletAddress,
        metadata_commitment: Commitment,
        proof: &ProofBundle,
    ) -> Result<Coupon> {
        let program = self.registry.require_program(program_id).await?;
        self.registry
            .require_active_merchant(&program.merchant_id)
            .await?;
        self.wallets.require_wallet(owner_wallet).await?;

        // Report a full program before paying for verification. The
        // authoritative check is the reservation below.
        if program.issued_count >= program.max_issuance {
            return Err(Error::IssuanceCapReached);
        }

        let key = self
            .verification_key(program_id, program.key_version)
            .await?;
        let expected = PublicInputs::Issuance {
            program_id: program_id.to_string(),
            owner_wallet: owner_wallet.clone(),
            metadata_commitment: metadata_commitment.clone(),
        };
        if !self.verifier.verify(proof, &expected, &key) {
            return Err(Error::InvalidProof);
        }

        self.registry.reserve_issuance_slot(program_id).await?;

        let now = Utc::now();
        let coupon = Coupon::new(
            Uuid::new_v4().to_string(),
            program.merchant_id.clone(),
            program_id.to_string(),
            owner_wallet.clone(),
            metadata_commitment,
            now,
            now + program.validity(),
            program.key_version,
        );

        match self.coupons.insert_coupon(&coupon).await {
            Ok(true) => {
                info!(
                    "Issued coupon {} under program {} for wallet {}",
                    coupon.token_id, program_id, owner_wallet
                );
                Ok(coupon)
            }
            Ok(false) => {
                self.registry.release_issuance_slot(program_id).await?;
                Err(Error::Storage(format!(
                    "coupon id collision: {}",
                    coupon.token_id
                )))
            }
            Err(e) => {
                // Roll the slot back so the cap invariant holds; the
                // reconciliation sweep repairs the counter if this
                // release is lost too.
                if let Err(release_err) =
                    self.registry.release_issuance_slot(program_id).await
                {
                    error!(
                        "Failed to release issuance slot for program {}: {}",
                        program_id, release_err
                    );
                }
                Err(e)
            }
        }
    }

    /// `state == Issued && now < expiry_date`, computed freshly. Unknown
    /// coupons are simply not valid.
    pub async fn is_valid_coupon(&self, token_id: &str) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .coupons
            .get_coupon(token_id)
            .await?
            .map(|coupon| coupon.is_valid(now))
            .unwrap_or(false))
    }

    pub async fn get_coupon_details(&self, token_id: &str) -> Result<Coupon> {
        self.coupons
            .get_coupon(token_id)
            .await?
            .ok_or_else(|| Error::CouponNotFound(token_id.to_string()))
    }

    pub async fn get_user_coupons(&self, wallet: &WalletAddress) -> Result<Vec<Coupon>> {
        let ids = self.coupons.wallet_coupons(wallet).await?;
        self.collect_coupons(ids).await
    }

    pub async fn get_merchant_coupons(&self, merchant_id: &str) -> Result<Vec<Coupon>> {
        let ids = self.coupons.merchant_coupons(merchant_id).await?;
        self.collect_coupons(ids).await
    }

    /// Merchant-side start of a redemption: mint a `Redeem` confirmation
    /// token bound to the coupon's owner, delivered out-of-band by the
    /// gateway's notifier.
    pub async fn initiate_redemption(
        &self,
        token_id: &str,
        ttl: Duration,
    ) -> Result<ConfirmationToken> {
        let coupon = self.get_coupon_details(token_id).await?;

        if coupon.state == CouponState::Redeemed {
            return Err(Error::CouponAlreadyRedeemed);
        }
        if !coupon.is_valid(Utc::now()) {
            self.coupons.try_expire(token_id).await?;
            return Err(Error::CouponExpired);
        }

        self.gateway
            .issue(
                ConfirmationAction::Redeem,
                coupon.owner_wallet,
                serde_json::json!({ "token_id": token_id }),
                ttl,
            )
            .await
    }

    /// Redeem a coupon.
    ///
    /// The redemption proof binds this coupon and its owner wallet and
    /// verifies against the key version recorded at issuance. The
    /// confirmation token must be an unconsumed `Redeem` token targeting
    /// the owner wallet and naming this coupon. Token consumption and the
    /// coupon transition land together or not at all.
    pub async fn redeem(
        &self,
        token_id: &str,
        proof: &ProofBundle,
        confirmation_token: &str,
    ) -> Result<Coupon> {
        let coupon = self.get_coupon_details(token_id).await?;

        match coupon.state {
            CouponState::Redeemed => return Err(Error::CouponAlreadyRedeemed),
            CouponState::Expired => return Err(Error::CouponExpired),
            CouponState::Issued | CouponState::Invalid => {}
        }
        if !coupon.is_valid(Utc::now()) {
            // Lazy expiry: materialize the terminal state on observation.
            self.coupons.try_expire(token_id).await?;
            return Err(Error::CouponExpired);
        }

        let key = self
            .verification_key(&coupon.program_id, coupon.key_version)
            .await?;
        let expected = PublicInputs::Redemption {
            token_id: token_id.to_string(),
            owner_wallet: coupon.owner_wallet.clone(),
        };
        if !self.verifier.verify(proof, &expected, &key) {
            return Err(Error::InvalidProof);
        }

        // Reserve the token; gateway failures (not found / expired /
        // already used) pass straight through.
        let record = self.gateway.begin(confirmation_token).await?;

        let bound_coupon = record
            .payload
            .get("token_id")
            .and_then(|v| v.as_str());
        if record.action != ConfirmationAction::Redeem
            || record.target_wallet != coupon.owner_wallet
            || bound_coupon != Some(token_id)
        {
            warn!(
                "Confirmation token does not authorize redeeming coupon {}",
                token_id
            );
            self.gateway.release(confirmation_token).await?;
            return Err(Error::TokenMismatch);
        }

        // Second leg of the joint transition.
        if !self.coupons.try_redeem(token_id, Utc::now()).await? {
            self.gateway.release(confirmation_token).await?;
            let current = self.get_coupon_details(token_id).await?;
            return Err(match current.state {
                CouponState::Redeemed => Error::CouponAlreadyRedeemed,
                _ => Error::CouponExpired,
            });
        }

        self.gateway.finalize(confirmation_token).await?;

        info!("Redeemed coupon {}", token_id);
        self.get_coupon_details(token_id).await
    }

    pub async fn stats(&self) -> Result<LedgerStats> {
        self.coupons.stats().await
    }

    async fn verification_key(
        &self,
        program_id: &str,
        version: u32,
    ) -> Result<VerificationKey> {
        // An unknown key version fails closed as a proof rejection.
        let key_hex = self
            .registry
            .get_verification_key(program_id, version)
            .await?
            .ok_or(Error::InvalidProof)?;
        VerificationKey::from_hex(&key_hex, version).map_err(|_| Error::InvalidProof)
    }

    async fn collect_coupons(&self, ids: Vec<String>) -> Result<Vec<Coupon>> {
        let mut coupons = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(coupon) = self.coupons.get_coupon(&id).await? {
                coupons.push(coupon);
            }
        }
        // Newest first, the order portals show them in
        coupons.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(coupons)
    }
}
