//! Withdrawal request validation
//!
//! A valid request debits the session and yields a receipt with a fresh
//! synthetic id. No withdrawal record is kept and repeated requests are not
//! deduplicated.

use crate::{rng::RandomSource, session::Session};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest amount that may be withdrawn
pub const MIN_WITHDRAWAL: f64 = 100.0;

/// Fee charged on each withdrawal, as a fraction of the amount
pub const WITHDRAWAL_FEE_RATE: f64 = 0.01;

/// Lower bound on the fee
pub const MIN_WITHDRAWAL_FEE: u64 = 1;

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Withdrawal validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WithdrawError {
    #[error("Wallet address and valid amount required")]
    InvalidRequest,

    #[error("Minimum withdrawal is {minimum} TON")]
    AmountTooSmall { minimum: f64 },

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },
}

/// Withdrawal limits and fee schedule
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WithdrawalPolicy {
    pub min_amount: f64,
    pub fee_rate: f64,
    pub min_fee: u64,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_amount: MIN_WITHDRAWAL,
            fee_rate: WITHDRAWAL_FEE_RATE,
            min_fee: MIN_WITHDRAWAL_FEE,
        }
    }
}

/// A request that passed validation
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedWithdrawal {
    pub wallet_address: String,
    pub amount: f64,
    pub fee: u64,
    pub net_amount: f64,
}

impl ValidatedWithdrawal {
    /// Whole units taken from the balance; fractional amounts round up
    pub fn charge(&self) -> u64 {
        self.amount.ceil() as u64
    }
}

/// Receipt returned for an accepted withdrawal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    pub success: bool,
    pub withdrawal_id: String,
    pub status: String,
    pub amount: f64,
    pub fee: u64,
    pub net_amount: f64,
    pub wallet_address: String,
    pub remaining_balance: u64,
    pub estimated_time: String,
    pub message: String,
}

impl WithdrawalPolicy {
    pub fn with_min_amount(min_amount: f64) -> Self {
        Self {
            min_amount,
            ..Self::default()
        }
    }

    /// `max(min_fee, floor(amount × fee_rate))`
    pub fn fee(&self, amount: f64) -> u64 {
        let fee = (amount * self.fee_rate).floor();
        if fee.is_finite() && fee > 0.0 {
            (fee as u64).max(self.min_fee)
        } else {
            self.min_fee
        }
    }

    /// Check the wallet and amount, computing the fee
    pub fn validate(
        &self,
        wallet_address: Option<&str>,
        amount: Option<f64>,
    ) -> Result<ValidatedWithdrawal, WithdrawError> {
        let wallet_address = wallet_address
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .ok_or(WithdrawError::InvalidRequest)?;
        let amount = amount
            .filter(|a| a.is_finite() && *a > 0.0)
            .ok_or(WithdrawError::InvalidRequest)?;

        if amount < self.min_amount {
            return Err(WithdrawError::AmountTooSmall {
                minimum: self.min_amount,
            });
        }

        let fee = self.fee(amount);
        Ok(ValidatedWithdrawal {
            wallet_address: wallet_address.to_string(),
            amount,
            fee,
            net_amount: amount - fee as f64,
        })
    }

    /// Validate against the session's wallet, debit it and issue a receipt
    pub fn request<R: RandomSource + ?Sized>(
        &self,
        session: &mut Session,
        amount: Option<f64>,
        now_ms: i64,
        rng: &mut R,
    ) -> Result<WithdrawalReceipt, WithdrawError> {
        let validated = self.validate(Some(&session.wallet_address), amount)?;
        settle(validated, session, now_ms, rng)
    }
}

/// Debit a validated withdrawal from the session.
///
/// The balance is left untouched when it does not cover the amount.
pub fn settle<R: RandomSource + ?Sized>(
    validated: ValidatedWithdrawal,
    session: &mut Session,
    now_ms: i64,
    rng: &mut R,
) -> Result<WithdrawalReceipt, WithdrawError> {
    let charge = validated.charge();
    if session.balance < charge {
        return Err(WithdrawError::InsufficientBalance {
            needed: charge,
            available: session.balance,
        });
    }
    session.balance -= charge;
    Ok(issue(validated, session.balance, now_ms, rng))
}

/// Build the pending receipt for a settled withdrawal
pub fn issue<R: RandomSource + ?Sized>(
    validated: ValidatedWithdrawal,
    remaining_balance: u64,
    now_ms: i64,
    rng: &mut R,
) -> WithdrawalReceipt {
    let withdrawal_id = withdrawal_id(now_ms, rng);
    tracing::info!(
        "Withdrawal {} accepted: {} to {} (fee {})",
        withdrawal_id,
        validated.amount,
        validated.wallet_address,
        validated.fee
    );

    WithdrawalReceipt {
        success: true,
        withdrawal_id,
        status: "pending".to_string(),
        amount: validated.amount,
        fee: validated.fee,
        net_amount: validated.net_amount,
        wallet_address: validated.wallet_address,
        remaining_balance,
        estimated_time: "5-15 minutes".to_string(),
        message: "Withdrawal request created successfully".to_string(),
    }
}

/// `WD-<unix millis>-<9 base36 chars>`
pub fn withdrawal_id<R: RandomSource + ?Sized>(now_ms: i64, rng: &mut R) -> String {
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.index(BASE36.len())] as char)
        .collect();
    format!("WD-{}-{}", now_ms, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::make_rng;

    #[test]
    fn test_fee_examples() {
        let policy = WithdrawalPolicy::default();

        let v = policy.validate(Some("EQaddr"), Some(250.0)).unwrap();
        assert_eq!(v.fee, 2);
        assert_eq!(v.net_amount, 248.0);

        let v = policy.validate(Some("EQaddr"), Some(100.0)).unwrap();
        assert_eq!(v.fee, 1);
        assert_eq!(v.net_amount, 99.0);

        let v = policy.validate(Some("EQaddr"), Some(12_345.0)).unwrap();
        assert_eq!(v.fee, 123);
        assert_eq!(v.net_amount, 12_222.0);
    }

    #[test]
    fn test_below_minimum_rejected() {
        let policy = WithdrawalPolicy::default();
        for amount in [5.0, 1.0, 99.0, 99.99, 0.5] {
            assert_eq!(
                policy.validate(Some("EQaddr"), Some(amount)).unwrap_err(),
                WithdrawError::AmountTooSmall { minimum: 100.0 }
            );
        }
    }

    #[test]
    fn test_net_amount_positive_from_minimum_up() {
        let policy = WithdrawalPolicy::default();
        let mut amount = 100.0;
        while amount < 5_000.0 {
            let v = policy.validate(Some("w"), Some(amount)).unwrap();
            assert_eq!(v.fee, ((amount * 0.01).floor() as u64).max(1));
            assert_eq!(v.net_amount, amount - v.fee as f64);
            assert!(v.net_amount > 0.0);
            amount += 37.5;
        }
    }

    #[test]
    fn test_invalid_requests() {
        let policy = WithdrawalPolicy::default();
        let cases: [(Option<&str>, Option<f64>); 7] = [
            (None, Some(500.0)),
            (Some(""), Some(500.0)),
            (Some("   "), Some(500.0)),
            (Some("w"), None),
            (Some("w"), Some(0.0)),
            (Some("w"), Some(-200.0)),
            (Some("w"), Some(f64::NAN)),
        ];
        for (wallet, amount) in cases {
            assert_eq!(
                policy.validate(wallet, amount).unwrap_err(),
                WithdrawError::InvalidRequest,
                "wallet={:?} amount={:?}",
                wallet,
                amount
            );
        }
    }

    #[test]
    fn test_receipt_and_fresh_ids() {
        let policy = WithdrawalPolicy::default();
        let mut rng = make_rng(Some(42));
        let mut session = Session::new("EQaddr", 1_000);

        let a = policy
            .request(&mut session, Some(250.0), 1_700_000_000_000, &mut rng)
            .unwrap();
        let b = policy
            .request(&mut session, Some(250.0), 1_700_000_000_000, &mut rng)
            .unwrap();

        assert!(a.success);
        assert_eq!(a.status, "pending");
        assert_eq!(a.estimated_time, "5-15 minutes");
        assert_eq!(a.wallet_address, "EQaddr");
        assert!(a.withdrawal_id.starts_with("WD-1700000000000-"));
        assert_eq!(a.withdrawal_id.len(), "WD-1700000000000-".len() + 9);
        assert_ne!(a.withdrawal_id, b.withdrawal_id);
        assert_eq!(a.remaining_balance, 750);
        assert_eq!(b.remaining_balance, 500);
        assert_eq!(session.balance, 500);
    }

    #[test]
    fn test_withdrawal_beyond_balance_rejected() {
        let policy = WithdrawalPolicy::default();
        let mut rng = make_rng(Some(7));
        let mut session = Session::new("EQaddr", 1_000);

        let err = policy
            .request(&mut session, Some(1_000_000.0), 0, &mut rng)
            .unwrap_err();
        assert_eq!(
            err,
            WithdrawError::InsufficientBalance {
                needed: 1_000_000,
                available: 1_000
            }
        );
        assert_eq!(session.balance, 1_000);

        // The whole balance may go, fractional amounts round up
        let err = policy
            .request(&mut session, Some(1_000.5), 0, &mut rng)
            .unwrap_err();
        assert!(matches!(err, WithdrawError::InsufficientBalance { needed: 1_001, .. }));
        let receipt = policy
            .request(&mut session, Some(1_000.0), 0, &mut rng)
            .unwrap();
        assert_eq!(receipt.remaining_balance, 0);
        assert_eq!(session.balance, 0);
    }

    #[test]
    fn test_receipt_wire_format() {
        let mut rng = make_rng(Some(1));
        let mut session = Session::new("EQaddr", 300);
        let receipt = WithdrawalPolicy::default()
            .request(&mut session, Some(250.0), 0, &mut rng)
            .unwrap();
        let json = serde_json::to_value(&receipt).unwrap();

        for key in [
            "success",
            "withdrawalId",
            "status",
            "amount",
            "fee",
            "netAmount",
            "walletAddress",
            "remainingBalance",
            "estimatedTime",
            "message",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["fee"], 2);
        assert_eq!(json["remainingBalance"], 50);
    }
}
