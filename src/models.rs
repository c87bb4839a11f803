// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Data Models
//!
//! Core entities of the treasury and affiliate economies. All ledger
//! amounts are exact fixed-point values with 2 decimals ([`Amount`],
//! integer cents); floating point never touches ledger math.
//!
//! ## Model Categories
//!
//! - **Amount**: exact money newtype (cents)
//! - **Members & Tiers**: referred-unit tier ladder (VIP / High Roller / Whale)
//! - **Wallets & Ledger**: balances and append-only ledger transactions
//! - **Affiliate economy**: chips, payouts, sunset latch

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a vaulted chip stays eligible before it expires.
pub const VAULT_TERM_DAYS: i64 = 365;

/// Guaranteed-comp window after signup.
pub const FIRST_YEAR_DAYS: i64 = 365;

// =============================================================================
// Amount
// =============================================================================

/// Exact fixed-point money amount: integer cents, 2 decimals.
///
/// Serializes as the raw cent count. Display renders dollars
/// (`Amount::from_cents(2100)` → `"21.00"`).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub const fn from_dollars(dollars: i64) -> Self {
        Amount(dollars * 100)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Exact whole-percent share, truncated to cents (never rounded up).
    pub fn percent(self, pct: i64) -> Amount {
        Amount(self.0 * pct / 100)
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        Amount(iter.map(|a| a.0).sum())
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// Members & Tiers
// =============================================================================

/// Permanent member tier, stepped by lifetime referred units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberTier {
    Vip,
    HighRoller,
    Whale,
}

impl MemberTier {
    /// Inclusive step function over lifetime referred units:
    /// below 210 → no tier, 210..=2099 → VIP, 2100..=20999 → High Roller,
    /// 21000 and up → Whale.
    pub fn from_referred_units(units: u64) -> Option<MemberTier> {
        match units {
            0..=209 => None,
            210..=2099 => Some(MemberTier::Vip),
            2100..=20999 => Some(MemberTier::HighRoller),
            _ => Some(MemberTier::Whale),
        }
    }
}

impl std::fmt::Display for MemberTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MemberTier::Vip => "VIP",
            MemberTier::HighRoller => "High Roller",
            MemberTier::Whale => "Whale",
        };
        write!(f, "{name}")
    }
}

/// A member of the program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Stable member identifier.
    pub member_id: String,
    /// When the member signed up (starts the guaranteed-comp year).
    pub signup_date: DateTime<Utc>,
    /// Lifetime units redeemed by members this member referred.
    pub referred_units: u64,
    /// First-touch referrer; permanent once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,
}

impl Member {
    pub fn new(member_id: impl Into<String>, signup_date: DateTime<Utc>) -> Self {
        Self {
            member_id: member_id.into(),
            signup_date,
            referred_units: 0,
            referred_by: None,
        }
    }

    pub fn tier(&self) -> Option<MemberTier> {
        MemberTier::from_referred_units(self.referred_units)
    }

    /// Whether the member is still inside the guaranteed first year.
    pub fn in_first_year(&self, now: DateTime<Utc>) -> bool {
        now - self.signup_date <= Duration::days(FIRST_YEAR_DAYS)
    }
}

/// An affiliate record: a member enrolled to refer others.
///
/// Creation is refused once the sunset latch is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affiliate {
    pub member_id: String,
    /// Code new members present during attribution.
    pub referral_code: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Wallets & Ledger
// =============================================================================

/// A member's custodial wallet.
///
/// `balance_available` never goes negative; it is decremented only by a
/// withdrawal that simultaneously increments `balance_pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub member_id: String,
    /// On-chain address funds settle to.
    pub address: String,
    pub balance_available: Amount,
    pub balance_pending: Amount,
}

impl Wallet {
    pub fn new(member_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            address: address.into(),
            balance_available: Amount::ZERO,
            balance_pending: Amount::ZERO,
        }
    }
}

/// Ledger transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxKind {
    CompAward,
    GuaranteedComp,
    AffiliateMatch,
    AffiliatePayout,
    Withdrawal,
}

/// Ledger transaction status.
///
/// Mutated only by the component that created the row; rows are never
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxStatus {
    /// Awarded but awaiting the member's payout-destination choice.
    PendingChoice,
    Pending,
    Approved,
    Paid,
    Completed,
    Failed,
}

/// Append-only ledger transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique identifier (UUID).
    pub id: String,
    /// Member the transaction belongs to.
    pub member_id: String,
    pub kind: LedgerTxKind,
    pub amount: Amount,
    pub status: LedgerTxStatus,
    /// On-chain hash once broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    fn new(member_id: &str, kind: LedgerTxKind, amount: Amount, status: LedgerTxStatus) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            member_id: member_id.to_string(),
            kind,
            amount,
            status,
            tx_hash: None,
            from_address: None,
            to_address: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A comp awaiting the member's payout-destination choice.
    pub fn new_pending_choice(member_id: &str, kind: LedgerTxKind, amount: Amount) -> Self {
        Self::new(member_id, kind, amount, LedgerTxStatus::PendingChoice)
    }

    /// A transaction that settled at creation time (e.g. a reward match
    /// credited straight to the wallet).
    pub fn new_completed(member_id: &str, kind: LedgerTxKind, amount: Amount) -> Self {
        Self::new(member_id, kind, amount, LedgerTxStatus::Completed)
    }

    /// A withdrawal to an on-chain destination, pending settlement.
    pub fn new_withdrawal(member_id: &str, amount: Amount, to_address: &str) -> Self {
        let mut tx = Self::new(
            member_id,
            LedgerTxKind::Withdrawal,
            amount,
            LedgerTxStatus::Pending,
        );
        tx.to_address = Some(to_address.to_string());
        tx
    }

    pub fn mark_status(&mut self, status: LedgerTxStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn mark_broadcast(&mut self, tx_hash: impl Into<String>) {
        self.tx_hash = Some(tx_hash.into());
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Affiliate Economy
// =============================================================================

/// A unit of affiliate credit, issued per referred-member scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateChip {
    /// Unique identifier (UUID).
    pub chip_id: String,
    /// Affiliate the chip was issued to.
    pub affiliate_id: String,
    /// Referred member whose scan produced the chip.
    pub referred_member_id: String,
    /// Scan event the chip is sourced from.
    pub source_scan_id: String,
    pub is_vaulted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_date: Option<DateTime<Utc>>,
    /// `vault_date + 365d` while vaulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_expiry: Option<DateTime<Utc>>,
    /// One-way: an expired chip never re-enters distribution.
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
}

impl AffiliateChip {
    pub fn new_unvaulted(
        affiliate_id: &str,
        referred_member_id: &str,
        source_scan_id: &str,
    ) -> Self {
        Self {
            chip_id: uuid::Uuid::new_v4().to_string(),
            affiliate_id: affiliate_id.to_string(),
            referred_member_id: referred_member_id.to_string(),
            source_scan_id: source_scan_id.to_string(),
            is_vaulted: false,
            vault_date: None,
            vault_expiry: None,
            is_expired: false,
            created_at: Utc::now(),
        }
    }

    /// Vault the chip. Caller must have checked it is neither vaulted nor
    /// expired.
    pub fn vault(&mut self, now: DateTime<Utc>) {
        self.is_vaulted = true;
        self.vault_date = Some(now);
        self.vault_expiry = Some(now + Duration::days(VAULT_TERM_DAYS));
    }

    /// Return the chip to the active (un-vaulted) state.
    pub fn unvault(&mut self) {
        self.is_vaulted = false;
        self.vault_date = None;
        self.vault_expiry = None;
    }
}

/// Affiliate payout kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutType {
    RewardMatch,
    PoolShare,
}

/// Affiliate payout status; transitions are monotonic
/// (`pending → approved → paid`, never back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Paid,
}

/// A scheduled payout owed to an affiliate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliatePayout {
    /// Unique identifier (UUID).
    pub payout_id: String,
    pub affiliate_id: String,
    pub amount: Amount,
    pub payout_type: PayoutType,
    /// Period window the payout covers (`YYYY-MM` or ISO `YYYY-Www`).
    pub period: String,
    pub status: PayoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AffiliatePayout {
    pub fn new_pending(
        affiliate_id: &str,
        amount: Amount,
        payout_type: PayoutType,
        period: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            payout_id: uuid::Uuid::new_v4().to_string(),
            affiliate_id: affiliate_id.to_string(),
            amount,
            payout_type,
            period: period.to_string(),
            status: PayoutStatus::Pending,
            tx_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status. Returns `false` (and leaves the record
    /// untouched) if the transition would regress.
    pub fn advance_status(&mut self, next: PayoutStatus) -> bool {
        if next <= self.status {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}

// =============================================================================
// Sunset
// =============================================================================

/// Default monthly-volume threshold for the sunset trigger.
pub const DEFAULT_SUNSET_THRESHOLD: Amount = Amount::from_dollars(10_000_000);

/// Singleton record tracking the irreversible affiliate-program sunset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SunsetStatus {
    pub monthly_volume: Amount,
    pub rolling_3mo_avg: Amount,
    pub threshold: Amount,
    /// One-way latch. Once set, chip issuance and affiliate creation stop
    /// permanently.
    pub is_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
}

impl Default for SunsetStatus {
    fn default() -> Self {
        Self {
            monthly_volume: Amount::ZERO,
            rolling_3mo_avg: Amount::ZERO,
            threshold: DEFAULT_SUNSET_THRESHOLD,
            is_triggered: false,
            triggered_at: None,
        }
    }
}

impl SunsetStatus {
    /// Progress toward the threshold, in percent.
    pub fn percentage(&self) -> f64 {
        if self.threshold.cents() == 0 {
            return 0.0;
        }
        self.rolling_3mo_avg.cents() as f64 / self.threshold.cents() as f64 * 100.0
    }
}

/// A volume observation fed into the sunset check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub monthly_volume: Amount,
    pub rolling_3mo_avg: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_display_renders_cents() {
        assert_eq!(Amount::from_cents(2100).to_string(), "21.00");
        assert_eq!(Amount::from_cents(5).to_string(), "0.05");
        assert_eq!(Amount::from_cents(-150).to_string(), "-1.50");
        assert_eq!(Amount::from_dollars(42_000).to_string(), "42000.00");
    }

    #[test]
    fn amount_percent_truncates() {
        // 21% of $100.01 is $21.0021 → truncated to $21.00
        assert_eq!(
            Amount::from_cents(10_001).percent(21),
            Amount::from_cents(2100)
        );
        assert_eq!(Amount::from_dollars(100).percent(21), Amount::from_dollars(21));
    }

    #[test]
    fn tier_step_function_boundaries() {
        assert_eq!(MemberTier::from_referred_units(0), None);
        assert_eq!(MemberTier::from_referred_units(209), None);
        assert_eq!(MemberTier::from_referred_units(210), Some(MemberTier::Vip));
        assert_eq!(MemberTier::from_referred_units(2099), Some(MemberTier::Vip));
        assert_eq!(
            MemberTier::from_referred_units(2100),
            Some(MemberTier::HighRoller)
        );
        assert_eq!(
            MemberTier::from_referred_units(20999),
            Some(MemberTier::HighRoller)
        );
        assert_eq!(
            MemberTier::from_referred_units(21000),
            Some(MemberTier::Whale)
        );
    }

    #[test]
    fn tier_ordering_supports_gating() {
        assert!(MemberTier::Whale > MemberTier::HighRoller);
        assert!(MemberTier::HighRoller > MemberTier::Vip);
    }

    #[test]
    fn chip_vault_sets_expiry_a_year_out() {
        let mut chip = AffiliateChip::new_unvaulted("aff-1", "mem-2", "scan-3");
        let now = Utc::now();
        chip.vault(now);

        assert!(chip.is_vaulted);
        assert_eq!(chip.vault_expiry, Some(now + Duration::days(365)));

        chip.unvault();
        assert!(!chip.is_vaulted);
        assert!(chip.vault_expiry.is_none());
    }

    #[test]
    fn payout_status_never_regresses() {
        let mut payout = AffiliatePayout::new_pending(
            "aff-1",
            Amount::from_dollars(75),
            PayoutType::PoolShare,
            "2026-W31",
        );

        assert!(payout.advance_status(PayoutStatus::Approved));
        assert!(payout.advance_status(PayoutStatus::Paid));

        // Regression and repeats are refused
        assert!(!payout.advance_status(PayoutStatus::Approved));
        assert!(!payout.advance_status(PayoutStatus::Paid));
        assert_eq!(payout.status, PayoutStatus::Paid);
    }

    #[test]
    fn sunset_percentage() {
        let status = SunsetStatus {
            rolling_3mo_avg: Amount::from_dollars(5_000_000),
            ..Default::default()
        };
        assert!((status.percentage() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn member_first_year_window() {
        let now = Utc::now();
        let member = Member::new("mem-1", now - Duration::days(200));
        assert!(member.in_first_year(now));

        let old = Member::new("mem-2", now - Duration::days(366));
        assert!(!old.in_first_year(now));
    }
}
