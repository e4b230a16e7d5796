//! Money Module
//!
//! Every monetary value in the ledger is a `rust_decimal::Decimal` held at
//! scale 2, matching the `NUMERIC(12,2)` balance column. All amount checks and
//! balance arithmetic MUST go through this module.
//!
//! ## Usage
//! ```rust
//! use account_ledger::money::{credit, debit, validate_amount};
//! use rust_decimal::Decimal;
//!
//! let amount = validate_amount(Decimal::new(5000, 2)).unwrap(); // 50.00
//! let balance = credit(1, Decimal::new(100000, 2), amount).unwrap();
//! assert_eq!(balance.to_string(), "1050.00");
//! let balance = debit(1, balance, amount).unwrap();
//! assert_eq!(balance.to_string(), "1000.00");
//! ```

use rust_decimal::Decimal;

use crate::error::LedgerError;

/// Decimal places of every stored amount
pub const SCALE: u32 = 2;

/// Largest balance the store can hold: 9_999_999_999.99
pub fn max_balance() -> Decimal {
    Decimal::new(999_999_999_999, SCALE)
}

/// Rescale to the ledger scale without changing the value.
///
/// Callers must have checked precision first; rescaling a value with more
/// than [`SCALE`] decimals would round it.
pub fn to_ledger_scale(mut value: Decimal) -> Decimal {
    value.rescale(SCALE);
    value
}

fn check_precision(value: Decimal) -> Result<(), LedgerError> {
    if value.normalize().scale() > SCALE {
        return Err(LedgerError::InvalidAmount {
            amount: value,
            reason: "Amount supports at most 2 decimal places",
        });
    }
    Ok(())
}

/// Validate an operation amount (deposit, withdraw, transfer).
///
/// # Errors
/// * `InvalidAmount` - zero, negative, too precise or above the storable maximum
pub fn validate_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::not_positive(amount));
    }
    check_precision(amount)?;
    if amount > max_balance() {
        return Err(LedgerError::InvalidAmount {
            amount,
            reason: "Amount exceeds the maximum balance",
        });
    }
    Ok(to_ledger_scale(amount))
}

/// Validate a balance supplied on create/update. Zero is allowed.
pub fn validate_balance(balance: Decimal) -> Result<Decimal, LedgerError> {
    if balance < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            amount: balance,
            reason: "Balance must not be negative",
        });
    }
    check_precision(balance)?;
    if balance > max_balance() {
        return Err(LedgerError::InvalidAmount {
            amount: balance,
            reason: "Balance exceeds the maximum balance",
        });
    }
    Ok(to_ledger_scale(balance))
}

/// `current + amount`, refusing results the store cannot hold.
pub fn credit(account_id: i64, current: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
    let next = current
        .checked_add(amount)
        .filter(|v| *v <= max_balance())
        .ok_or_else(|| {
            tracing::warn!(account_id, %current, %amount, "Credit would exceed maximum balance");
            LedgerError::InvalidAmount {
                amount,
                reason: "Resulting balance exceeds the maximum balance",
            }
        })?;
    Ok(to_ledger_scale(next))
}

/// `current - amount`, failing with `InsufficientBalance` instead of going negative.
pub fn debit(account_id: i64, current: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
    if current < amount {
        return Err(LedgerError::InsufficientBalance {
            account_id,
            current,
            required: amount,
        });
    }
    Ok(to_ledger_scale(current - amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_validate_amount_positive() {
        assert_eq!(validate_amount(dec("50")).unwrap().to_string(), "50.00");
        assert_eq!(validate_amount(dec("0.01")).unwrap().to_string(), "0.01");
        // trailing zeros beyond scale are not extra precision
        assert_eq!(validate_amount(dec("1.500")).unwrap().to_string(), "1.50");
    }

    #[test]
    fn test_validate_amount_rejects_non_positive() {
        assert!(matches!(
            validate_amount(Decimal::ZERO),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            validate_amount(dec("-10.00")),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_validate_amount_rejects_precision() {
        let err = validate_amount(dec("1.001")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidAmount {
                amount: dec("1.001"),
                reason: "Amount supports at most 2 decimal places",
            }
        );
    }

    #[test]
    fn test_validate_amount_rejects_overflow() {
        assert!(validate_amount(dec("9999999999.99")).is_ok());
        assert!(validate_amount(dec("10000000000.00")).is_err());
    }

    #[test]
    fn test_validate_balance() {
        assert_eq!(validate_balance(Decimal::ZERO).unwrap().to_string(), "0.00");
        assert!(validate_balance(dec("-0.01")).is_err());
        assert_eq!(validate_balance(dec("200")).unwrap().to_string(), "200.00");
    }

    #[test]
    fn test_credit_exact() {
        assert_eq!(
            credit(1, dec("1000.00"), dec("50.00")).unwrap(),
            dec("1050.00")
        );
        assert_eq!(credit(1, dec("0.10"), dec("0.20")).unwrap(), dec("0.30"));
    }

    #[test]
    fn test_credit_overflow() {
        assert!(credit(1, max_balance(), dec("0.01")).is_err());
    }

    #[test]
    fn test_debit() {
        assert_eq!(
            debit(1, dec("1050.00"), dec("500.00")).unwrap(),
            dec("550.00")
        );
        assert_eq!(debit(1, dec("10.00"), dec("10.00")).unwrap(), dec("0.00"));

        let err = debit(9, dec("1050.00"), dec("2000.00")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account_id: 9,
                current: dec("1050.00"),
                required: dec("2000.00"),
            }
        );
    }
}
