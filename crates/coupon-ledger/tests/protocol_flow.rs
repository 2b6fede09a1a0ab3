//! End-to-end protocol tests over the in-memory backends: issuance caps
//! under contention, at-most-once redemption, lazy expiry, key rotation,
//! and the reconciliation sweep.

use chrono::{Duration, Utc};
use confirmation_gateway::{ConfirmationAction, ConfirmationGateway, MemoryTokenStore};
use coupon_ledger::{
    Coupon, CouponLedger, CouponState, CouponStore, MemoryCouponStore, Reconciler,
};
use merchant_registry::{MemoryRegistryStore, Registry};
use proof_verifier::{seal, VerificationKey};
use std::sync::Arc;
use veilcoupon_common::{Commitment, Error, ProofBundle, PublicInputs, WalletAddress};
use wallet_directory::{MemoryWalletStore, WalletDirectory};

type MemoryLedger =
    CouponLedger<MemoryCouponStore, MemoryRegistryStore, MemoryTokenStore, MemoryWalletStore>;

const KEY_HEX: &str = "aabbccddeeff00112233445566778899";
const ROTATED_KEY_HEX: &str = "99887766554433221100ffeeddccbbaa";

struct Harness {
    ledger: Arc<MemoryLedger>,
    coupons: MemoryCouponStore,
    registry_store: MemoryRegistryStore,
}

fn harness() -> Harness {
    let coupons = MemoryCouponStore::new();
    let registry_store = MemoryRegistryStore::new();

    let ledger = CouponLedger::new(
        coupons.clone(),
        Registry::new(registry_store.clone()),
        ConfirmationGateway::new(MemoryTokenStore::new()),
        WalletDirectory::new(MemoryWalletStore::new()),
    );

    Harness {
        ledger: Arc::new(ledger),
        coupons,
        registry_store,
    }
}

async fn setup_program(h: &Harness, max_issuance: u64) -> (String, String) {
    let merchant = h
        .ledger
        .registry()
        .register_merchant(WalletAddress::new([200u8; 32]))
        .await
        .unwrap();
    let program = h
        .ledger
        .registry()
        .create_program(&merchant.merchant_id, 3600, max_issuance, KEY_HEX)
        .await
        .unwrap();
    (merchant.merchant_id, program.program_id)
}

async fn setup_wallet(h: &Harness, seed: u8) -> WalletAddress {
    h.ledger
        .wallets()
        .create_wallet(Commitment::new([seed; 32]), Commitment::new([seed ^ 0xFF; 32]))
        .await
        .unwrap()
        .address
}

fn issuance_proof(
    program_id: &str,
    owner: &WalletAddress,
    metadata: &Commitment,
    key_hex: &str,
    key_version: u32,
) -> ProofBundle {
    let key = VerificationKey::from_hex(key_hex, key_version).unwrap();
    seal(
        &PublicInputs::Issuance {
            program_id: program_id.to_string(),
            owner_wallet: owner.clone(),
            metadata_commitment: metadata.clone(),
        },
        &key,
    )
}

fn redemption_proof(
    token_id: &str,
    owner: &WalletAddress,
    key_hex: &str,
    key_version: u32,
) -> ProofBundle {
    let key = VerificationKey::from_hex(key_hex, key_version).unwrap();
    seal(
        &PublicInputs::Redemption {
            token_id: token_id.to_string(),
            owner_wallet: owner.clone(),
        },
        &key,
    )
}

async fn issue_coupon(h: &Harness, program_id: &str, owner: &WalletAddress) -> Coupon {
    let metadata = Commitment::new([7u8; 32]);
    let proof = issuance_proof(program_id, owner, &metadata, KEY_HEX, 1);
    h.ledger
        .issue(program_id, owner, metadata, &proof)
        .await
        .unwrap()
}

/// A coupon whose clock already ran out, written straight into storage to
/// exercise lazy expiry without waiting.
fn backdated_coupon(token_id: &str, program_id: &str, owner: &WalletAddress) -> Coupon {
    let issued_at = Utc::now() - Duration::hours(2);
    Coupon::new(
        token_id.to_string(),
        "m-ghost".to_string(),
        program_id.to_string(),
        owner.clone(),
        Commitment::new([7u8; 32]),
        issued_at,
        issued_at + Duration::hours(1),
        1,
    )
}

#[tokio::test]
async fn test_issue_then_read_back_round_trip() {
    let h = harness();
    let (merchant_id, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;

    let metadata = Commitment::new([42u8; 32]);
    let proof = issuance_proof(&program_id, &owner, &metadata, KEY_HEX, 1);
    let coupon = h
        .ledger
        .issue(&program_id, &owner, metadata.clone(), &proof)
        .await
        .unwrap();

    let details = h.ledger.get_coupon_details(&coupon.token_id).await.unwrap();
    assert_eq!(details.metadata_commitment, metadata);
    assert_eq!(details.merchant_id, merchant_id);
    assert_eq!(details.expiry_date, coupon.expiry_date);
    assert_eq!(details.state, CouponState::Issued);
    assert_eq!(details.key_version, 1);

    assert!(h.ledger.is_valid_coupon(&coupon.token_id).await.unwrap());

    let mine = h.ledger.get_user_coupons(&owner).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].token_id, coupon.token_id);
}

#[tokio::test]
async fn test_issue_rejects_unknown_wallet() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 10).await;

    let stranger = WalletAddress::new([99u8; 32]);
    let metadata = Commitment::new([7u8; 32]);
    let proof = issuance_proof(&program_id, &stranger, &metadata, KEY_HEX, 1);

    let err = h
        .ledger
        .issue(&program_id, &stranger, metadata, &proof)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WalletNotFound(_)));
}

#[tokio::test]
async fn test_issue_rejects_proof_minted_for_other_wallet() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;
    let other = setup_wallet(&h, 2).await;

    let metadata = Commitment::new([7u8; 32]);
    let proof = issuance_proof(&program_id, &other, &metadata, KEY_HEX, 1);

    let err = h
        .ledger
        .issue(&program_id, &owner, metadata, &proof)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidProof));

    // Rejected transition left no trace
    let program = h
        .ledger
        .registry()
        .require_program(&program_id)
        .await
        .unwrap();
    assert_eq!(program.issued_count, 0);
    assert_eq!(h.ledger.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_issue_rejects_inactive_merchant() {
    let h = harness();
    let (merchant_id, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;

    h.ledger
        .registry()
        .deactivate_merchant(&merchant_id)
        .await
        .unwrap();

    let metadata = Commitment::new([7u8; 32]);
    let proof = issuance_proof(&program_id, &owner, &metadata, KEY_HEX, 1);
    let err = h
        .ledger
        .issue(&program_id, &owner, metadata, &proof)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MerchantInactive(_)));
}

#[tokio::test]
async fn test_two_racers_for_the_last_slot_produce_one_coupon() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 1).await;
    let wallet_a = setup_wallet(&h, 1).await;
    let wallet_b = setup_wallet(&h, 2).await;

    let mut handles = Vec::new();
    for owner in [wallet_a, wallet_b] {
        let ledger = Arc::clone(&h.ledger);
        let program_id = program_id.clone();
        handles.push(tokio::spawn(async move {
            let metadata = Commitment::new([7u8; 32]);
            let proof = issuance_proof(&program_id, &owner, &metadata, KEY_HEX, 1);
            ledger.issue(&program_id, &owner, metadata, &proof).await
        }));
    }

    let mut minted = 0;
    let mut cap_reached = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => minted += 1,
            Err(Error::IssuanceCapReached) => cap_reached += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(minted, 1);
    assert_eq!(cap_reached, 1);
}

#[tokio::test]
async fn test_cap_invariant_holds_under_many_racers() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 3).await;

    let mut wallets = Vec::new();
    for seed in 1..=10u8 {
        wallets.push(setup_wallet(&h, seed).await);
    }

    let mut handles = Vec::new();
    for owner in wallets {
        let ledger = Arc::clone(&h.ledger);
        let program_id = program_id.clone();
        handles.push(tokio::spawn(async move {
            let metadata = Commitment::new([7u8; 32]);
            let proof = issuance_proof(&program_id, &owner, &metadata, KEY_HEX, 1);
            ledger.issue(&program_id, &owner, metadata, &proof).await.is_ok()
        }));
    }

    let mut minted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            minted += 1;
        }
    }
    assert_eq!(minted, 3);

    let program = h
        .ledger
        .registry()
        .require_program(&program_id)
        .await
        .unwrap();
    assert_eq!(program.issued_count, 3);
    assert_eq!(
        h.coupons.program_coupon_count(&program_id).await.unwrap(),
        3
    );
}

#[tokio::test]
async fn test_full_redemption_flow() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;
    let coupon = issue_coupon(&h, &program_id, &owner).await;

    let confirmation = h
        .ledger
        .initiate_redemption(&coupon.token_id, Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(confirmation.action, ConfirmationAction::Redeem);
    assert_eq!(confirmation.target_wallet, owner);

    let proof = redemption_proof(&coupon.token_id, &owner, KEY_HEX, 1);
    let redeemed = h
        .ledger
        .redeem(&coupon.token_id, &proof, &confirmation.token)
        .await
        .unwrap();

    assert_eq!(redeemed.state, CouponState::Redeemed);
    assert!(redeemed.redeemed_at.is_some());
    assert!(!h.ledger.is_valid_coupon(&coupon.token_id).await.unwrap());

    let stats = h.ledger.stats().await.unwrap();
    assert_eq!(stats.redeemed, 1);
    assert_eq!(stats.issued, 0);
}

#[tokio::test]
async fn test_second_redeem_with_same_arguments_is_already_redeemed() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;
    let coupon = issue_coupon(&h, &program_id, &owner).await;

    let confirmation = h
        .ledger
        .initiate_redemption(&coupon.token_id, Duration::minutes(15))
        .await
        .unwrap();
    let proof = redemption_proof(&coupon.token_id, &owner, KEY_HEX, 1);

    h.ledger
        .redeem(&coupon.token_id, &proof, &confirmation.token)
        .await
        .unwrap();

    let err = h
        .ledger
        .redeem(&coupon.token_id, &proof, &confirmation.token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CouponAlreadyRedeemed));
}

#[tokio::test]
async fn test_token_bound_to_other_wallet_is_rejected_and_coupon_unchanged() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;
    let other = setup_wallet(&h, 2).await;
    let coupon = issue_coupon(&h, &program_id, &owner).await;

    // A Redeem token naming the right coupon but targeting the wrong
    // wallet must not authorize redemption.
    let foreign = h
        .ledger
        .gateway()
        .issue(
            ConfirmationAction::Redeem,
            other,
            serde_json::json!({ "token_id": coupon.token_id }),
            Duration::minutes(15),
        )
        .await
        .unwrap();

    let proof = redemption_proof(&coupon.token_id, &owner, KEY_HEX, 1);
    let err = h
        .ledger
        .redeem(&coupon.token_id, &proof, &foreign.token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TokenMismatch));

    let details = h.ledger.get_coupon_details(&coupon.token_id).await.unwrap();
    assert_eq!(details.state, CouponState::Issued);

    // The rejected attempt released the token rather than burning it
    h.ledger.gateway().confirm(&foreign.token).await.unwrap();
}

#[tokio::test]
async fn test_token_for_other_action_is_rejected() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;
    let coupon = issue_coupon(&h, &program_id, &owner).await;

    let login_token = h
        .ledger
        .gateway()
        .issue(
            ConfirmationAction::Login,
            owner.clone(),
            serde_json::json!({ "token_id": coupon.token_id }),
            Duration::minutes(15),
        )
        .await
        .unwrap();

    let proof = redemption_proof(&coupon.token_id, &owner, KEY_HEX, 1);
    let err = h
        .ledger
        .redeem(&coupon.token_id, &proof, &login_token.token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TokenMismatch));
}

#[tokio::test]
async fn test_concurrent_redeems_have_exactly_one_winner() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;
    let coupon = issue_coupon(&h, &program_id, &owner).await;

    let confirmation = h
        .ledger
        .initiate_redemption(&coupon.token_id, Duration::minutes(15))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let ledger = Arc::clone(&h.ledger);
        let token_id = coupon.token_id.clone();
        let owner = owner.clone();
        let confirmation = confirmation.token.clone();
        handles.push(tokio::spawn(async move {
            let proof = redemption_proof(&token_id, &owner, KEY_HEX, 1);
            ledger.redeem(&token_id, &proof, &confirmation).await.is_ok()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let details = h.ledger.get_coupon_details(&coupon.token_id).await.unwrap();
    assert_eq!(details.state, CouponState::Redeemed);
}

#[tokio::test]
async fn test_expired_coupon_is_invalid_without_any_write() {
    let h = harness();
    let owner = setup_wallet(&h, 1).await;

    let coupon = backdated_coupon("stale-1", "p-ghost", &owner);
    h.coupons.insert_coupon(&coupon).await.unwrap();

    // Nothing has touched the record; validity is computed freshly
    assert!(!h.ledger.is_valid_coupon("stale-1").await.unwrap());
    let stored = h.ledger.get_coupon_details("stale-1").await.unwrap();
    assert_eq!(stored.state, CouponState::Issued);
}

#[tokio::test]
async fn test_redeeming_an_expired_coupon_materializes_expired() {
    let h = harness();
    let owner = setup_wallet(&h, 1).await;

    let coupon = backdated_coupon("stale-2", "p-ghost", &owner);
    h.coupons.insert_coupon(&coupon).await.unwrap();

    let proof = redemption_proof("stale-2", &owner, KEY_HEX, 1);
    let err = h
        .ledger
        .redeem("stale-2", &proof, "irrelevant")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CouponExpired));

    let stored = h.ledger.get_coupon_details("stale-2").await.unwrap();
    assert_eq!(stored.state, CouponState::Expired);

    // Terminal states do not resurrect
    let err = h
        .ledger
        .redeem("stale-2", &proof, "irrelevant")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CouponExpired));
}

#[tokio::test]
async fn test_key_rotation_keeps_outstanding_coupons_redeemable() {
    let h = harness();
    let (merchant_id, program_id) = setup_program(&h, 10).await;
    let owner = setup_wallet(&h, 1).await;
    let coupon = issue_coupon(&h, &program_id, &owner).await;
    assert_eq!(coupon.key_version, 1);

    let version = h
        .ledger
        .registry()
        .register_verification_key(&program_id, &merchant_id, ROTATED_KEY_HEX)
        .await
        .unwrap();
    assert_eq!(version, 2);

    // New issuances verify against the rotated key only
    let metadata = Commitment::new([7u8; 32]);
    let stale_proof = issuance_proof(&program_id, &owner, &metadata, KEY_HEX, 1);
    let err = h
        .ledger
        .issue(&program_id, &owner, metadata.clone(), &stale_proof)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidProof));

    let fresh_proof = issuance_proof(&program_id, &owner, &metadata, ROTATED_KEY_HEX, 2);
    let second = h
        .ledger
        .issue(&program_id, &owner, metadata, &fresh_proof)
        .await
        .unwrap();
    assert_eq!(second.key_version, 2);

    // The coupon minted before rotation still redeems under the key
    // version recorded on it
    let confirmation = h
        .ledger
        .initiate_redemption(&coupon.token_id, Duration::minutes(15))
        .await
        .unwrap();
    let proof = redemption_proof(&coupon.token_id, &owner, KEY_HEX, 1);
    let redeemed = h
        .ledger
        .redeem(&coupon.token_id, &proof, &confirmation.token)
        .await
        .unwrap();
    assert_eq!(redeemed.state, CouponState::Redeemed);
}

#[tokio::test]
async fn test_sweep_expires_coupons_and_rolls_back_lapsed_reservations() {
    let h = harness();
    let (_, program_id) = setup_program(&h, 5).await;
    let owner = setup_wallet(&h, 1).await;

    // A coupon past its clock, still stored as Issued
    h.coupons
        .insert_coupon(&backdated_coupon("stale-3", "p-ghost", &owner))
        .await
        .unwrap();

    // A reservation whose mint never landed (crash between reserve and
    // insert)
    h.ledger
        .registry()
        .reserve_issuance_slot(&program_id)
        .await
        .unwrap();

    let mut reconciler = Reconciler::new(
        h.coupons.clone(),
        Registry::new(h.registry_store.clone()),
    );

    // First sweep: expiry materializes immediately, the drift is only
    // recorded
    let report = reconciler.sweep_once().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.repaired, 0);

    let stored = h.ledger.get_coupon_details("stale-3").await.unwrap();
    assert_eq!(stored.state, CouponState::Expired);

    // Second sweep: the same drift a full interval later is a lapsed
    // reservation and is rolled back
    let report = reconciler.sweep_once().await.unwrap();
    assert_eq!(report.repaired, 1);

    let program = h
        .ledger
        .registry()
        .require_program(&program_id)
        .await
        .unwrap();
    assert_eq!(program.issued_count, 0);

    // The slot is usable again
    let coupon = issue_coupon(&h, &program_id, &owner).await;
    assert_eq!(coupon.state, CouponState::Issued);
}

#[tokio::test]
async fn test_recovery_rebinds_wallet_lookups() {
    let h = harness();
    let identity = Commitment::new([50u8; 32]);
    let recovery = Commitment::new([51u8; 32]);
    let wallet = h
        .ledger
        .wallets()
        .create_wallet(identity.clone(), recovery.clone())
        .await
        .unwrap();

    let new_identity = Commitment::new([52u8; 32]);
    let proof = seal(
        &PublicInputs::Recovery {
            wallet: wallet.address.clone(),
            new_identity_commitment: new_identity.clone(),
        },
        &VerificationKey::from_commitment(&recovery),
    );

    h.ledger
        .wallets()
        .recover_wallet(&wallet.address, new_identity.clone(), &proof)
        .await
        .unwrap();

    // Stale commitment no longer resolves; the new one does, to the same
    // address
    assert!(h
        .ledger
        .wallets()
        .get_wallet_address(&identity)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        h.ledger
            .wallets()
            .get_wallet_address(&new_identity)
            .await
            .unwrap()
            .unwrap(),
        wallet.address
    );
}
