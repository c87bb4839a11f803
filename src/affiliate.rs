// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Affiliate chip ledger: referral attribution, chip lifecycle, weekly
//! pool distribution, and the sunset latch.
//!
//! Economic preconditions (no referrer, sunset already triggered, chip
//! already vaulted, zero chips in a round) are normal branches: they
//! produce `None`, an empty list, or a zero count, never an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{
    Affiliate, AffiliateChip, AffiliatePayout, Amount, PayoutType, SunsetStatus, VolumeSnapshot,
};
use crate::storage::ledger_db::{LedgerDb, LedgerDbError};
use crate::storage::repository::sentinel::{iso_week_period, month_period, MONTHLY_TTL, WEEKLY_TTL};
use crate::storage::repository::{
    AffiliateRepository, ChipRepository, JobSentinelRepository, MemberRepository, PayoutRepository,
    SunsetRepository,
};

/// One bonus chip per five vaulted, unexpired chips.
pub const VAULT_BONUS_DIVISOR: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum AffiliateError {
    #[error(transparent)]
    Db(#[from] LedgerDbError),
}

/// An affiliate's share of a weekly pool round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolShare {
    pub affiliate_id: String,
    pub share: Amount,
}

/// Result of the weekly chip-proportional distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeeklyDistributionOutcome {
    Executed { shares: Vec<PoolShare> },
    /// The round already ran this week.
    Skipped { period: String },
}

/// Result of the monthly vault bonus batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultBonusOutcome {
    Executed { minted: usize },
    Skipped { period: String },
}

/// Outcome of a sunset volume check.
#[derive(Debug, Clone, Copy)]
pub struct SunsetCheck {
    pub percentage: f64,
    pub is_triggered: bool,
}

/// The affiliate referral economy over the shared ledger.
pub struct AffiliateChipLedger {
    members: MemberRepository,
    affiliates: AffiliateRepository,
    chips: ChipRepository,
    payouts: PayoutRepository,
    sunset: SunsetRepository,
    sentinels: JobSentinelRepository,
}

impl AffiliateChipLedger {
    pub fn new(db: Arc<LedgerDb>, sunset_threshold: Amount) -> Self {
        Self {
            members: MemberRepository::new(db.clone()),
            affiliates: AffiliateRepository::new(db.clone()),
            chips: ChipRepository::new(db.clone()),
            payouts: PayoutRepository::new(db.clone()),
            sunset: SunsetRepository::new(db.clone(), sunset_threshold),
            sentinels: JobSentinelRepository::new(db),
        }
    }

    /// Enroll a member as an affiliate. Returns `None` once the sunset
    /// latch is set; no new affiliate record may ever be created after.
    pub fn register_affiliate(
        &self,
        member_id: &str,
        referral_code: &str,
    ) -> Result<Option<Affiliate>, AffiliateError> {
        if self.sunset.is_triggered()? {
            debug!(member = member_id, "sunset triggered; affiliate creation refused");
            return Ok(None);
        }

        let affiliate = Affiliate {
            member_id: member_id.to_string(),
            referral_code: referral_code.to_string(),
            created_at: Utc::now(),
        };
        self.affiliates.create(&affiliate)?;
        info!(member = member_id, code = referral_code, "affiliate enrolled");
        Ok(Some(affiliate))
    }

    /// First-touch referral attribution. Returns whether the member was
    /// attributed: an unknown code, a self-referral, or an existing
    /// referrer all leave the member untouched.
    pub fn attribute(
        &self,
        member_id: &str,
        referral_code: &str,
    ) -> Result<bool, AffiliateError> {
        let Some(affiliate) = self.affiliates.find_by_code(referral_code)? else {
            debug!(member = member_id, code = referral_code, "unknown referral code");
            return Ok(false);
        };

        let attributed = self.members.attribute(member_id, &affiliate.member_id)?;
        if attributed {
            info!(
                member = member_id,
                referrer = %affiliate.member_id,
                "referral attributed"
            );
        }
        Ok(attributed)
    }

    /// Issue one chip to the referrer of a referred member's scan. No-op
    /// (`None`) when the member has no referrer or the sunset latch is
    /// set. Also counts the scan toward the referrer's lifetime referred
    /// units.
    pub fn issue_chip(
        &self,
        referred_member_id: &str,
        source_scan_id: &str,
    ) -> Result<Option<AffiliateChip>, AffiliateError> {
        if self.sunset.is_triggered()? {
            debug!(member = referred_member_id, "sunset triggered; no chip issued");
            return Ok(None);
        }

        let member = self.members.get(referred_member_id)?;
        let Some(referrer) = member.referred_by else {
            debug!(member = referred_member_id, "no referrer; no chip issued");
            return Ok(None);
        };

        let chip = AffiliateChip::new_unvaulted(&referrer, referred_member_id, source_scan_id);
        self.chips.create(&chip)?;
        self.members.add_referred_units(&referrer, 1)?;

        debug!(
            affiliate = %referrer,
            member = referred_member_id,
            scan = source_scan_id,
            "chip issued"
        );
        Ok(Some(chip))
    }

    /// Vault chips for an affiliate. Returns the number actually vaulted
    /// (0 when none matched; not an error).
    pub fn vault(&self, affiliate_id: &str, chip_ids: &[String]) -> Result<usize, AffiliateError> {
        Ok(self.chips.vault_chips(affiliate_id, chip_ids, Utc::now())?)
    }

    /// Unvault chips for an affiliate. Expired chips never come back.
    pub fn unvault(
        &self,
        affiliate_id: &str,
        chip_ids: &[String],
    ) -> Result<usize, AffiliateError> {
        Ok(self.chips.unvault_chips(affiliate_id, chip_ids)?)
    }

    /// Monthly batch: mint one bonus chip per five vaulted, unexpired
    /// chips, per affiliate. Bonus chips are un-vaulted and inherit the
    /// referral attribution of an existing vaulted chip.
    pub fn vault_bonus_batch(
        &self,
        now: DateTime<Utc>,
    ) -> Result<VaultBonusOutcome, AffiliateError> {
        let period = month_period(now);
        if !self.sentinels.try_acquire("vault_bonus", &period, MONTHLY_TTL)? {
            info!(period = %period, "vault bonus batch already executed this month");
            return Ok(VaultBonusOutcome::Skipped { period });
        }

        let mut minted = 0usize;
        for (affiliate_id, vaulted) in self.chips.vaulted_unexpired()? {
            let bonus_count = vaulted.len() as u64 / VAULT_BONUS_DIVISOR;
            if bonus_count == 0 {
                continue;
            }

            // Attribution is carried over from one of the vaulted chips
            let source = &vaulted[0];
            for _ in 0..bonus_count {
                let chip = AffiliateChip::new_unvaulted(
                    &affiliate_id,
                    &source.referred_member_id,
                    &source.source_scan_id,
                );
                self.chips.create(&chip)?;
                minted += 1;
            }
        }

        info!(period = %period, minted, "vault bonus batch complete");
        Ok(VaultBonusOutcome::Executed { minted })
    }

    /// Scheduled batch: expire every vaulted chip past its expiry date.
    /// Naturally idempotent: the one-way flag means a re-run expires
    /// nothing new.
    pub fn expire_batch(&self) -> Result<usize, AffiliateError> {
        let expired = self.chips.expire_due(Utc::now())?;
        if expired > 0 {
            info!(expired, "chip expiry batch complete");
        }
        Ok(expired)
    }

    /// Weekly batch: split a pool across affiliates in proportion to
    /// their non-expired chip counts, floored to cents per affiliate.
    /// The rounding remainder stays in the pool; it is not
    /// redistributed. Zero-chip affiliates get no entry.
    pub fn weekly_distribution(
        &self,
        pool_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<WeeklyDistributionOutcome, AffiliateError> {
        let period = iso_week_period(now);
        if !self
            .sentinels
            .try_acquire("weekly_distribution", &period, WEEKLY_TTL)?
        {
            info!(period = %period, "weekly distribution already executed this week");
            return Ok(WeeklyDistributionOutcome::Skipped { period });
        }

        let counts = self.chips.active_counts()?;
        let total: u64 = counts.values().sum();
        if total == 0 {
            info!(period = %period, "no active chips; empty distribution round");
            return Ok(WeeklyDistributionOutcome::Executed { shares: Vec::new() });
        }

        let mut shares: Vec<PoolShare> = counts
            .into_iter()
            .map(|(affiliate_id, count)| PoolShare {
                affiliate_id,
                share: chip_share(pool_amount, count, total),
            })
            .collect();
        shares.sort_by(|a, b| a.affiliate_id.cmp(&b.affiliate_id));

        for share in &shares {
            let payout = AffiliatePayout::new_pending(
                &share.affiliate_id,
                share.share,
                PayoutType::PoolShare,
                &period,
            );
            self.payouts.create(&payout)?;
        }

        let distributed: Amount = shares.iter().map(|s| s.share).sum();
        info!(
            period = %period,
            affiliates = shares.len(),
            pool = %pool_amount,
            distributed = %distributed,
            "weekly distribution complete"
        );
        Ok(WeeklyDistributionOutcome::Executed { shares })
    }

    /// Record a volume snapshot and evaluate the sunset threshold. The
    /// latch flips automatically at 100% of threshold and never unflips.
    pub fn check_sunset(&self, snapshot: VolumeSnapshot) -> Result<SunsetCheck, AffiliateError> {
        let status = self.sunset.record_snapshot(snapshot)?;
        let percentage = status.percentage();

        let is_triggered = if !status.is_triggered && percentage >= 100.0 {
            self.trigger_sunset()?;
            true
        } else {
            status.is_triggered
        };

        Ok(SunsetCheck {
            percentage,
            is_triggered,
        })
    }

    /// Flip the sunset latch. Idempotent: returns `true` only for the
    /// call that flipped it; later calls report "already triggered".
    pub fn trigger_sunset(&self) -> Result<bool, AffiliateError> {
        let flipped = self.sunset.trigger()?;
        if flipped {
            info!("affiliate sunset triggered; chip issuance and enrollment are closed for good");
        } else {
            debug!("sunset already triggered");
        }
        Ok(flipped)
    }

    /// Current sunset record.
    pub fn sunset_status(&self) -> Result<SunsetStatus, AffiliateError> {
        Ok(self.sunset.get()?)
    }
}

/// `floor_to_cents(count / total · pool)`.
fn chip_share(pool: Amount, count: u64, total: u64) -> Amount {
    Amount::from_cents(pool.cents() * count as i64 / total as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Member;
    use crate::storage::ledger_db::test_support::test_db;

    fn setup() -> (AffiliateChipLedger, MemberRepository, tempfile::TempDir) {
        let (db, dir) = test_db();
        let ledger = AffiliateChipLedger::new(db.clone(), Amount::from_dollars(10_000_000));
        (ledger, MemberRepository::new(db), dir)
    }

    fn enroll(ledger: &AffiliateChipLedger, members: &MemberRepository, id: &str, code: &str) {
        members.create(&Member::new(id, Utc::now())).unwrap();
        ledger.register_affiliate(id, code).unwrap().unwrap();
    }

    fn refer(
        ledger: &AffiliateChipLedger,
        members: &MemberRepository,
        member_id: &str,
        code: &str,
    ) {
        members.create(&Member::new(member_id, Utc::now())).unwrap();
        assert!(ledger.attribute(member_id, code).unwrap());
    }

    #[test]
    fn attribution_rules() {
        let (ledger, members, _dir) = setup();
        enroll(&ledger, &members, "aff-1", "GOLD");
        enroll(&ledger, &members, "aff-2", "SILVER");

        members.create(&Member::new("mem-1", Utc::now())).unwrap();

        // Unknown code
        assert!(!ledger.attribute("mem-1", "NOPE").unwrap());
        // First touch wins
        assert!(ledger.attribute("mem-1", "GOLD").unwrap());
        assert!(!ledger.attribute("mem-1", "SILVER").unwrap());
        // Self-referral is rejected
        assert!(!ledger.attribute("aff-1", "GOLD").unwrap());
    }

    #[test]
    fn chips_flow_from_referred_scans() {
        let (ledger, members, _dir) = setup();
        enroll(&ledger, &members, "aff-1", "GOLD");
        refer(&ledger, &members, "mem-1", "GOLD");

        let chip = ledger.issue_chip("mem-1", "scan-1").unwrap().unwrap();
        assert_eq!(chip.affiliate_id, "aff-1");
        assert!(!chip.is_vaulted);

        // The scan counts toward the referrer's tier ladder
        assert_eq!(members.get("aff-1").unwrap().referred_units, 1);

        // A member without a referrer produces no chip
        members.create(&Member::new("loner", Utc::now())).unwrap();
        assert!(ledger.issue_chip("loner", "scan-2").unwrap().is_none());
    }

    #[test]
    fn weekly_distribution_is_chip_proportional() {
        let (ledger, members, _dir) = setup();
        enroll(&ledger, &members, "aff-a", "AAA");
        enroll(&ledger, &members, "aff-b", "BBB");
        refer(&ledger, &members, "mem-a", "AAA");
        refer(&ledger, &members, "mem-b", "BBB");

        for scan in ["s1", "s2", "s3"] {
            ledger.issue_chip("mem-a", scan).unwrap().unwrap();
        }
        ledger.issue_chip("mem-b", "s4").unwrap().unwrap();

        let now = Utc::now();
        let outcome = ledger
            .weekly_distribution(Amount::from_dollars(100), now)
            .unwrap();

        let WeeklyDistributionOutcome::Executed { shares } = outcome else {
            panic!("expected an executed round");
        };
        assert_eq!(
            shares,
            vec![
                PoolShare {
                    affiliate_id: "aff-a".to_string(),
                    share: Amount::from_dollars(75),
                },
                PoolShare {
                    affiliate_id: "aff-b".to_string(),
                    share: Amount::from_dollars(25),
                },
            ]
        );

        // Second run in the same week is a reported skip
        assert!(matches!(
            ledger
                .weekly_distribution(Amount::from_dollars(100), now)
                .unwrap(),
            WeeklyDistributionOutcome::Skipped { .. }
        ));
    }

    #[test]
    fn weekly_distribution_accepts_rounding_loss() {
        let (ledger, members, _dir) = setup();
        for (aff, code, mem) in [
            ("aff-a", "AAA", "mem-a"),
            ("aff-b", "BBB", "mem-b"),
            ("aff-c", "CCC", "mem-c"),
        ] {
            enroll(&ledger, &members, aff, code);
            refer(&ledger, &members, mem, code);
            ledger.issue_chip(mem, &format!("scan-{aff}")).unwrap().unwrap();
        }

        let outcome = ledger
            .weekly_distribution(Amount::from_cents(100), Utc::now())
            .unwrap();
        let WeeklyDistributionOutcome::Executed { shares } = outcome else {
            panic!("expected an executed round");
        };

        // 100 / 3 → 33 cents each; the remaining cent is not redistributed
        let total: Amount = shares.iter().map(|s| s.share).sum();
        assert_eq!(total, Amount::from_cents(99));
        assert!(shares.iter().all(|s| s.share == Amount::from_cents(33)));
    }

    #[test]
    fn vault_bonus_mints_one_per_five() {
        let (ledger, members, _dir) = setup();
        enroll(&ledger, &members, "aff-1", "GOLD");
        refer(&ledger, &members, "mem-1", "GOLD");

        let chip_ids: Vec<String> = (0..7)
            .map(|i| {
                ledger
                    .issue_chip("mem-1", &format!("scan-{i}"))
                    .unwrap()
                    .unwrap()
                    .chip_id
            })
            .collect();

        // Vault 6 of 7 → floor(6/5) = 1 bonus chip
        assert_eq!(ledger.vault("aff-1", &chip_ids[..6].to_vec()).unwrap(), 6);

        let now = Utc::now();
        assert_eq!(
            ledger.vault_bonus_batch(now).unwrap(),
            VaultBonusOutcome::Executed { minted: 1 }
        );

        // Second run this month is skipped
        assert_eq!(
            ledger.vault_bonus_batch(now).unwrap(),
            VaultBonusOutcome::Skipped {
                period: month_period(now),
            }
        );
    }

    #[test]
    fn sunset_latch_stops_issuance_and_enrollment() {
        let (ledger, members, _dir) = setup();
        enroll(&ledger, &members, "aff-1", "GOLD");
        refer(&ledger, &members, "mem-1", "GOLD");

        assert!(ledger.issue_chip("mem-1", "scan-1").unwrap().is_some());

        assert!(ledger.trigger_sunset().unwrap());
        // The second trigger reports "already triggered"
        assert!(!ledger.trigger_sunset().unwrap());

        // Issuance stays off, even after the redundant trigger
        assert!(ledger.issue_chip("mem-1", "scan-2").unwrap().is_none());

        // No new affiliate can ever be created
        members.create(&Member::new("late", Utc::now())).unwrap();
        assert!(ledger.register_affiliate("late", "LATE").unwrap().is_none());
    }

    #[test]
    fn check_sunset_triggers_at_threshold() {
        let (ledger, _, _dir) = setup();

        let check = ledger
            .check_sunset(VolumeSnapshot {
                monthly_volume: Amount::from_dollars(6_000_000),
                rolling_3mo_avg: Amount::from_dollars(5_000_000),
            })
            .unwrap();
        assert!((check.percentage - 50.0).abs() < f64::EPSILON);
        assert!(!check.is_triggered);

        let check = ledger
            .check_sunset(VolumeSnapshot {
                monthly_volume: Amount::from_dollars(11_000_000),
                rolling_3mo_avg: Amount::from_dollars(10_000_000),
            })
            .unwrap();
        assert!(check.is_triggered);

        // Volumes falling back below threshold never unlatch
        let check = ledger
            .check_sunset(VolumeSnapshot {
                monthly_volume: Amount::from_dollars(1),
                rolling_3mo_avg: Amount::from_dollars(1),
            })
            .unwrap();
        assert!(check.is_triggered);
    }

    #[test]
    fn expire_batch_reports_zero_when_nothing_is_due() {
        let (ledger, members, _dir) = setup();
        enroll(&ledger, &members, "aff-1", "GOLD");
        refer(&ledger, &members, "mem-1", "GOLD");

        let chip = ledger.issue_chip("mem-1", "scan-1").unwrap().unwrap();
        ledger.vault("aff-1", &[chip.chip_id]).unwrap();

        assert_eq!(ledger.expire_batch().unwrap(), 0);
    }

    #[test]
    fn vaulting_twice_and_foreign_chips_touch_nothing() {
        let (ledger, members, _dir) = setup();
        enroll(&ledger, &members, "aff-1", "GOLD");
        enroll(&ledger, &members, "aff-2", "SILVER");
        refer(&ledger, &members, "mem-1", "GOLD");

        let chip = ledger.issue_chip("mem-1", "scan-1").unwrap().unwrap();
        let ids = vec![chip.chip_id];

        assert_eq!(ledger.vault("aff-1", &ids).unwrap(), 1);
        assert_eq!(ledger.vault("aff-1", &ids).unwrap(), 0);
        // Another affiliate can't unvault someone else's chip
        assert_eq!(ledger.unvault("aff-2", &ids).unwrap(), 0);
        assert_eq!(ledger.unvault("aff-1", &ids).unwrap(), 1);
    }
}
