//! Reconciliation sweep
//!
//! Periodically materializes `Expired` for issued coupons past their
//! expiry date, and repairs program issuance counters that drifted from
//! the coupon index after a crash between slot reservation and mint.
//! Expiry remains a derived predicate at read time; the sweep only
//! settles the stored state.

use crate::models::CouponState;
use crate::storage::CouponStore;
use chrono::Utc;
use merchant_registry::{Registry, RegistryStore};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use veilcoupon_common::Result;

/// What one sweep did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Coupons transitioned to `Expired`
    pub expired: u64,
    /// Program counters rolled back to match their coupon index
    pub repaired: u64,
}

pub struct Reconciler<C, R> {
    coupons: C,
    registry: Registry<R>,
    /// Drift observed last sweep, per program. A reservation is treated
    /// as lapsed only when the same drift survives a full sweep
    /// interval, so in-flight mints are never clawed back.
    observed_drift: HashMap<String, (u64, u64)>,
}

impl<C, R> Reconciler<C, R>
where
    C: CouponStore,
    R: RegistryStore,
{
    pub fn new(coupons: C, registry: Registry<R>) -> Self {
        Self {
            coupons,
            registry,
            observed_drift: HashMap::new(),
        }
    }

    /// Run the sweep loop forever, tolerating per-sweep errors.
    pub async fn start(mut self, interval_secs: u64) {
        info!(
            "Starting reconciliation sweep (every {} seconds)",
            interval_secs
        );

        loop {
            match self.sweep_once().await {
                Ok(report) => {
                    if report.expired > 0 || report.repaired > 0 {
                        info!(
                            "Sweep expired {} coupon(s), repaired {} counter(s)",
                            report.expired, report.repaired
                        );
                    }
                }
                Err(e) => {
                    error!("Reconciliation sweep failed: {:#}", e);
                }
            }

            sleep(Duration::from_secs(interval_secs)).await;
        }
    }

    /// One pass over issued coupons and program counters.
    pub async fn sweep_once(&mut self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        for token_id in self.coupons.issued_coupon_ids().await? {
            let Some(coupon) = self.coupons.get_coupon(&token_id).await? else {
                continue;
            };
            if coupon.state == CouponState::Issued && now >= coupon.expiry_date {
                if self.coupons.try_expire(&token_id).await? {
                    report.expired += 1;
                }
            }
        }

        report.repaired = self.repair_counters().await?;
        Ok(report)
    }

    async fn repair_counters(&mut self) -> Result<u64> {
        let mut repaired = 0;

        for merchant_id in self.registry.list_merchants().await? {
            for program_id in self.registry.list_merchant_programs(&merchant_id).await? {
                let Some(program) = self.registry.get_program(&program_id).await? else {
                    continue;
                };
                let minted = self.coupons.program_coupon_count(&program_id).await?;

                if minted >= program.issued_count {
                    self.observed_drift.remove(&program_id);
                    continue;
                }

                let drift = (minted, program.issued_count);
                if self.observed_drift.get(&program_id) == Some(&drift) {
                    // Same gap a full interval later: the reservation is
                    // lapsed, roll it back.
                    warn!(
                        "Program {} counter {} exceeds {} minted coupon(s); rolling back",
                        program_id, program.issued_count, minted
                    );
                    self.registry.set_issued_count(&program_id, minted).await?;
                    self.observed_drift.remove(&program_id);
                    repaired += 1;
                } else {
                    self.observed_drift.insert(program_id, drift);
                }
            }
        }

        Ok(repaired)
    }
}
