//! Basis-point allocation of an amount across recipients.

use bulut_types::intent::ResolvedRecipient;
use bulut_types::{Amount, BASIS_POINTS_TOTAL};

use crate::{ExecutionError, Result};

/// Divide `amount` according to each recipient's basis points.
///
/// Every share is `amount * bp / 10000` rounded down. The rounding
/// remainder goes to the first recipient, so the parts always sum to
/// `amount` exactly.
///
/// # Errors
///
/// - [`ExecutionError::Split`] if there are no recipients, the basis points
///   do not sum to 10000, or the multiplication overflows
pub fn allocate(amount: Amount, recipients: &[ResolvedRecipient]) -> Result<Vec<Amount>> {
    if recipients.is_empty() {
        return Err(ExecutionError::Split("no recipients".into()));
    }
    let total: u64 = recipients.iter().map(|r| u64::from(r.basis_points)).sum();
    if total != u64::from(BASIS_POINTS_TOTAL) {
        return Err(ExecutionError::Split(format!(
            "basis points sum to {total}, expected {BASIS_POINTS_TOTAL}"
        )));
    }

    let mut parts = Vec::with_capacity(recipients.len());
    for r in recipients {
        let share = amount
            .minor_units()
            .checked_mul(u128::from(r.basis_points))
            .ok_or_else(|| ExecutionError::Split("amount overflow".into()))?
            / u128::from(BASIS_POINTS_TOTAL);
        parts.push(share);
    }

    // Shares are rounded down, so their sum never exceeds the amount.
    let allocated: u128 = parts.iter().sum();
    let remainder = amount.minor_units() - allocated;
    parts[0] += remainder;

    Ok(parts.into_iter().map(Amount).collect())
}
