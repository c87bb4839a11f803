// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Profit distribution and member comp engine.
//!
//! Splits gross profit into the treasury pools, walks members through the
//! milestone comp ladder, tops up first-year members to the guaranteed
//! monthly minimum, and matches 21% of resolved comps to referrers.
//!
//! All money math is integer cents. Pool splits are exact: the retained
//! share is computed as the remainder, so the four outputs always sum to
//! the input.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{Amount, LedgerTransaction, LedgerTxKind, Member, MemberTier};
use crate::storage::ledger_db::{LedgerDb, LedgerDbError};
use crate::storage::repository::sentinel::{month_period, MONTHLY_TTL};
use crate::storage::repository::{
    JobSentinelRepository, LedgerTransactionRepository, MemberRepository, OutboxEvent,
    OutboxEventKind, WalletRepository,
};

/// Guaranteed monthly comp for members in their first year: $5.00.
pub const GUARANTEED_MONTHLY_COMP: Amount = Amount::from_cents(500);

/// Referrer reward match rate, in whole percent.
pub const REWARD_MATCH_PERCENT: i64 = 21;

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error(transparent)]
    Db(#[from] LedgerDbError),
}

/// Gross profit split across the treasury pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAllocation {
    pub consumer: Amount,
    pub affiliate: Amount,
    pub wholesale: Amount,
    pub retained: Amount,
}

/// Split gross profit 50/5/5/40 across consumer, affiliate, wholesale,
/// and retained. The retained share absorbs integer-division remainders,
/// so the four outputs sum exactly to `gross_profit`.
pub fn allocate_pools(gross_profit: Amount) -> PoolAllocation {
    let consumer = gross_profit.percent(50);
    let affiliate = gross_profit.percent(5);
    let wholesale = gross_profit.percent(5);
    let retained = gross_profit - consumer - affiliate - wholesale;

    PoolAllocation {
        consumer,
        affiliate,
        wholesale,
        retained,
    }
}

/// A rung of the milestone comp ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub amount: Amount,
    pub required_tier: MemberTier,
}

/// The ordered milestone ladder. Members progress strictly through it:
/// the lowest unmet rung is the only one ever offered, even when a
/// higher tier would qualify for a later rung.
pub const MILESTONE_LADDER: [Milestone; 3] = [
    Milestone {
        amount: Amount::from_dollars(100),
        required_tier: MemberTier::Vip,
    },
    Milestone {
        amount: Amount::from_dollars(1_000),
        required_tier: MemberTier::HighRoller,
    },
    Milestone {
        amount: Amount::from_dollars(10_000),
        required_tier: MemberTier::Whale,
    },
];

/// Result of the monthly guaranteed-comp batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuaranteedCompOutcome {
    Executed { awarded: usize, total: Amount },
    /// The batch already ran this period.
    Skipped { period: String },
}

/// Comp distribution engine over the shared ledger.
pub struct DistributionEngine {
    members: MemberRepository,
    wallets: WalletRepository,
    ledger: LedgerTransactionRepository,
    sentinels: JobSentinelRepository,
}

impl DistributionEngine {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self {
            members: MemberRepository::new(db.clone()),
            wallets: WalletRepository::new(db.clone()),
            ledger: LedgerTransactionRepository::new(db.clone()),
            sentinels: JobSentinelRepository::new(db),
        }
    }

    /// The next milestone owed to a member: the lowest rung whose amount
    /// exceeds the member's lifetime completed-comp total, offered only
    /// if the member's tier qualifies for that rung.
    pub fn next_milestone(&self, member_id: &str) -> Result<Option<Milestone>, DistributionError> {
        let member = self.members.get(member_id)?;
        let Some(tier) = member.tier() else {
            return Ok(None);
        };

        let lifetime = self.ledger.completed_comp_total(member_id)?;

        for milestone in MILESTONE_LADDER {
            if milestone.amount > lifetime {
                // The lowest unmet rung gates progression; no skipping
                // ahead even when the tier qualifies for a later rung.
                return Ok((tier >= milestone.required_tier).then_some(milestone));
            }
        }
        Ok(None)
    }

    /// Award a comp in `pending_choice`: the wallet is not credited until
    /// the member picks a payout destination. The milestone outbox event
    /// commits atomically with the ledger row.
    pub fn award(
        &self,
        member_id: &str,
        kind: LedgerTxKind,
        amount: Amount,
    ) -> Result<LedgerTransaction, DistributionError> {
        let tx = LedgerTransaction::new_pending_choice(member_id, kind, amount);
        let event = OutboxEvent::new(OutboxEventKind::MilestoneAwarded, member_id, amount, &tx.id);
        self.ledger.create_with_event(&tx, &event)?;

        info!(member = member_id, amount = %amount, kind = ?kind, "comp awarded, awaiting payout choice");
        Ok(tx)
    }

    /// Resolve a pending-choice comp once the member has picked a payout
    /// destination: credits the wallet, completes the row, and runs the
    /// referrer reward match. Returns the resolved comp and the match
    /// transaction, if any.
    pub fn resolve_pending_choice(
        &self,
        tx_id: &str,
    ) -> Result<(LedgerTransaction, Option<LedgerTransaction>), DistributionError> {
        let preview = self.ledger.get(tx_id)?;
        let event = OutboxEvent::new(
            OutboxEventKind::CompResolved,
            &preview.member_id,
            preview.amount,
            tx_id,
        );

        let resolved = self.ledger.resolve_pending_choice(tx_id, &event)?;
        info!(
            member = %resolved.member_id,
            amount = %resolved.amount,
            "comp resolved into wallet"
        );

        let matched = self.affiliate_reward_match(&resolved.member_id, resolved.amount)?;
        Ok((resolved, matched))
    }

    /// Credit the member's referrer with 21% of a resolved comp,
    /// quantized to cents. No-op when the member has no referrer.
    pub fn affiliate_reward_match(
        &self,
        member_id: &str,
        comp_amount: Amount,
    ) -> Result<Option<LedgerTransaction>, DistributionError> {
        let member = self.members.get(member_id)?;
        let Some(referrer) = member.referred_by else {
            debug!(member = member_id, "no referrer; skipping reward match");
            return Ok(None);
        };

        let match_amount = comp_amount.percent(REWARD_MATCH_PERCENT);
        let tx =
            LedgerTransaction::new_completed(&referrer, LedgerTxKind::AffiliateMatch, match_amount);
        let event = OutboxEvent::new(OutboxEventKind::RewardMatched, &referrer, match_amount, &tx.id);
        self.ledger.create_completed_with_credit(&tx, &event)?;

        info!(
            referrer = %referrer,
            member = member_id,
            amount = %match_amount,
            "affiliate reward match credited"
        );
        Ok(Some(tx))
    }

    /// Monthly batch: top every first-year member up to the guaranteed
    /// $5 of comps for the calendar month. Idempotent per month via the
    /// period sentinel; a second run reports `Skipped`.
    pub fn run_guaranteed_comps(
        &self,
        now: DateTime<Utc>,
    ) -> Result<GuaranteedCompOutcome, DistributionError> {
        let period = month_period(now);
        if !self
            .sentinels
            .try_acquire("guaranteed_comps", &period, MONTHLY_TTL)?
        {
            info!(period = %period, "guaranteed comps already executed this month");
            return Ok(GuaranteedCompOutcome::Skipped { period });
        }

        let mut awarded = 0usize;
        let mut total = Amount::ZERO;

        for member in self.members.list_all()? {
            if !member.in_first_year(now) {
                continue;
            }

            let shortfall = self.monthly_shortfall(&member, now)?;
            if shortfall.is_zero() {
                continue;
            }

            self.award(&member.member_id, LedgerTxKind::GuaranteedComp, shortfall)?;
            awarded += 1;
            total = total + shortfall;
        }

        info!(period = %period, awarded, total = %total, "guaranteed comp batch complete");
        Ok(GuaranteedCompOutcome::Executed { awarded, total })
    }

    fn monthly_shortfall(
        &self,
        member: &Member,
        now: DateTime<Utc>,
    ) -> Result<Amount, DistributionError> {
        let paid = self.ledger.comp_total_in_month(&member.member_id, now)?;
        Ok(GUARANTEED_MONTHLY_COMP.saturating_sub(paid))
    }
}
