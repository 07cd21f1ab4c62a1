//! Intent validation rules.
//!
//! Structural checks run first, recipient resolution last, so a malformed
//! record never causes a directory lookup.

use std::collections::HashSet;

use bulut_types::intent::{
    IntentKind, IntentOrigin, RawIntent, RawRecipient, ResolvedRecipient, Schedule,
    ValidatedIntent,
};
use bulut_types::subscription::Frequency;
use bulut_types::{
    Address, Amount, Currency, Handle, BASIS_POINTS_TOTAL, MAX_MEMO_CHARS, START_DATE_GRACE_SECS,
};

use crate::resolver::{RecipientResolver, Resolution};
use crate::{Result, ValidationError};

/// Decode a JSON intent record and validate it.
///
/// # Errors
///
/// [`ValidationError::MalformedIntent`] if the value does not decode into an
/// intent record, otherwise as [`validate`].
pub fn validate_value(
    value: serde_json::Value,
    resolver: &dyn RecipientResolver,
    now: u64,
) -> Result<ValidatedIntent> {
    let raw: RawIntent = serde_json::from_value(value)
        .map_err(|e| ValidationError::MalformedIntent(e.to_string()))?;
    validate(&raw, resolver, now)
}

/// Validate a raw intent against the alias directory at time `now`.
pub fn validate(
    raw: &RawIntent,
    resolver: &dyn RecipientResolver,
    now: u64,
) -> Result<ValidatedIntent> {
    if raw.id.trim().is_empty() {
        return Err(ValidationError::MalformedIntent("empty intent id".into()));
    }

    let currency: Currency = raw
        .currency
        .parse()
        .map_err(|_| ValidationError::UnsupportedCurrency(raw.currency.clone()))?;
    let amount = Amount::from_decimal(&raw.amount, currency)
        .map_err(|_| ValidationError::InvalidAmount(raw.amount.clone()))?;
    if amount.is_zero() {
        return Err(ValidationError::InvalidAmount(raw.amount.clone()));
    }

    let sender: Address = raw
        .sender
        .parse()
        .map_err(|_| ValidationError::InvalidSender(raw.sender.clone()))?;

    let memo = match raw.memo.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(text) => {
            let len = text.chars().count();
            if len > MAX_MEMO_CHARS {
                return Err(ValidationError::MemoTooLong {
                    len,
                    max: MAX_MEMO_CHARS,
                });
            }
            Some(text.to_string())
        }
    };

    let shares = match raw.kind {
        IntentKind::Single | IntentKind::Subscription => single_share(raw)?,
        IntentKind::Split => split_shares(&raw.recipients)?,
    };
    check_nonzero_shares(amount, &shares)?;

    let schedule = match raw.kind {
        IntentKind::Subscription => Some(schedule(raw, now)?),
        _ => None,
    };

    let recipients = resolve_all(&raw.recipients, &shares, resolver)?;

    Ok(ValidatedIntent {
        id: raw.id.trim().to_string(),
        kind: raw.kind,
        amount,
        currency,
        sender,
        recipients,
        memo,
        schedule,
        origin: IntentOrigin::Direct,
        created_at: raw.created_at.unwrap_or(now),
    })
}

/// Single and subscription intents pay exactly one recipient in full.
fn single_share(raw: &RawIntent) -> Result<Vec<u32>> {
    if raw.recipients.len() != 1 {
        return Err(ValidationError::RecipientCount {
            kind: raw.kind,
            expected: 1,
            actual: raw.recipients.len(),
        });
    }
    match raw.recipients[0].basis_points {
        None => Ok(vec![BASIS_POINTS_TOTAL]),
        Some(bp) if bp == i64::from(BASIS_POINTS_TOTAL) => Ok(vec![BASIS_POINTS_TOTAL]),
        Some(bp) => Err(ValidationError::InvalidBasisPoints(format!(
            "{} intent recipient must take 10000, got {bp}",
            raw.kind.as_str()
        ))),
    }
}

/// Explicit shares must all be positive and sum to exactly 10000. With no
/// shares given the split is even, the remainder going to the first
/// recipient.
fn split_shares(recipients: &[RawRecipient]) -> Result<Vec<u32>> {
    if recipients.is_empty() {
        return Err(ValidationError::EmptyRecipients);
    }

    let given: Vec<Option<i64>> = recipients.iter().map(|r| r.basis_points).collect();
    if given.iter().all(Option::is_none) {
        let n = recipients.len() as u32;
        let each = BASIS_POINTS_TOTAL / n;
        if each == 0 {
            return Err(ValidationError::InvalidBasisPoints(format!(
                "cannot split evenly among {n} recipients"
            )));
        }
        let mut shares = vec![each; recipients.len()];
        shares[0] += BASIS_POINTS_TOTAL - each * n;
        return Ok(shares);
    }
    if given.iter().any(Option::is_none) {
        return Err(ValidationError::MalformedIntent(
            "either every split recipient has basis points or none does".into(),
        ));
    }

    let mut total: i128 = 0;
    let mut shares = Vec::with_capacity(given.len());
    for bp in given.into_iter().flatten() {
        if bp <= 0 || bp > i64::from(BASIS_POINTS_TOTAL) {
            return Err(ValidationError::InvalidBasisPoints(bp.to_string()));
        }
        total += i128::from(bp);
        shares.push(bp as u32);
    }
    if total != i128::from(BASIS_POINTS_TOTAL) {
        return Err(ValidationError::BasisPointsSum { total });
    }
    Ok(shares)
}

/// Every recipient after the first must receive a non-zero part; the first
/// also absorbs the rounding remainder.
fn check_nonzero_shares(amount: Amount, shares: &[u32]) -> Result<()> {
    for (i, bp) in shares.iter().enumerate().skip(1) {
        let part = amount
            .minor_units()
            .checked_mul(u128::from(*bp))
            .ok_or_else(|| ValidationError::InvalidAmount("amount too large".into()))?
            / u128::from(BASIS_POINTS_TOTAL);
        if part == 0 {
            return Err(ValidationError::InvalidAmount(format!(
                "share of recipient {i} rounds to zero"
            )));
        }
    }
    Ok(())
}

fn schedule(raw: &RawIntent, now: u64) -> Result<Schedule> {
    let frequency: Frequency = match raw.frequency.as_deref() {
        None => return Err(ValidationError::MissingFrequency),
        Some(text) => text
            .parse()
            .map_err(|_| ValidationError::UnknownFrequency(text.to_string()))?,
    };
    let start_date = raw.start_date.unwrap_or(now);
    if start_date.saturating_add(START_DATE_GRACE_SECS) < now {
        return Err(ValidationError::StartDateInPast { start_date, now });
    }
    Ok(Schedule {
        frequency,
        start_date,
    })
}

fn resolve_all(
    raw: &[RawRecipient],
    shares: &[u32],
    resolver: &dyn RecipientResolver,
) -> Result<Vec<ResolvedRecipient>> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());

    for (recipient, bp) in raw.iter().zip(shares) {
        let (address, handle) = resolve_one(recipient, resolver)?;
        if !seen.insert(address) {
            return Err(ValidationError::DuplicateRecipient(address));
        }
        out.push(ResolvedRecipient {
            address,
            handle,
            basis_points: *bp,
        });
    }
    Ok(out)
}

/// A reference is either an `@handle` or a `0x` address. A raw address in
/// the `handle` field is accepted as a courtesy to parsers.
fn resolve_one(
    recipient: &RawRecipient,
    resolver: &dyn RecipientResolver,
) -> Result<(Address, Option<String>)> {
    let reference = match (&recipient.handle, &recipient.address) {
        (Some(h), None) => h.trim(),
        (None, Some(a)) => a.trim(),
        (Some(_), Some(_)) => {
            return Err(ValidationError::MalformedIntent(
                "recipient has both handle and address".into(),
            ))
        }
        (None, None) => {
            return Err(ValidationError::MalformedIntent(
                "recipient has neither handle nor address".into(),
            ))
        }
    };

    if reference.starts_with('@') {
        let handle: Handle = reference
            .parse()
            .map_err(|_| ValidationError::InvalidRecipient(reference.to_string()))?;
        return match resolver.resolve(&handle) {
            Resolution::Found(address) => Ok((address, Some(handle.to_string()))),
            Resolution::NotFound => Err(ValidationError::UnknownRecipient(handle.to_string())),
            Resolution::Unavailable(reason) => Err(ValidationError::ResolverUnavailable(reason)),
        };
    }

    let address: Address = reference
        .parse()
        .map_err(|_| ValidationError::InvalidRecipient(reference.to_string()))?;
    Ok((address, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    const NOW: u64 = 1_700_000_000;
    const SENDER: &str = "0x0101010101010101010101010101010101010101";

    fn directory() -> HashMap<Handle, Address> {
        HashMap::from([
            ("@alice".parse().expect("handle"), Address([0xaa; 20])),
            ("@bob".parse().expect("handle"), Address([0xbb; 20])),
            ("@carol".parse().expect("handle"), Address([0xcc; 20])),
        ])
    }

    fn check(value: serde_json::Value) -> Result<ValidatedIntent> {
        validate_value(value, &directory(), NOW)
    }

    #[test]
    fn test_single_usd_to_handle() {
        let intent = check(json!({
            "id": "int-1",
            "type": "single",
            "amount": 50.00,
            "currency": "USD",
            "sender": SENDER,
            "recipients": [{"handle": "@alice", "basisPoints": 10000}],
            "memo": "lunch"
        }))
        .expect("valid");
        assert_eq!(intent.amount, Amount(5000));
        assert_eq!(intent.currency, Currency::Usd);
        assert_eq!(intent.recipients.len(), 1);
        assert_eq!(intent.recipients[0].address, Address([0xaa; 20]));
        assert_eq!(intent.recipients[0].handle.as_deref(), Some("@alice"));
        assert_eq!(intent.recipients[0].basis_points, 10_000);
        assert_eq!(intent.memo.as_deref(), Some("lunch"));
        assert_eq!(intent.created_at, NOW);
        assert_eq!(intent.origin, IntentOrigin::Direct);
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(
            check(json!({"id": "x", "type": "single"})),
            Err(ValidationError::MalformedIntent(_))
        ));
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
                "sender": SENDER, "recipients": "@alice"})),
            Err(ValidationError::MalformedIntent(_))
        ));
        assert!(matches!(
            check(json!({"id": " ", "type": "single", "amount": "1", "currency": "USD",
                "sender": SENDER, "recipients": [{"handle": "@alice"}]})),
            Err(ValidationError::MalformedIntent(_))
        ));
    }

    #[test]
    fn test_amount_rules() {
        for bad in ["0", "0.00", "-5", "abc", "1.001", "NaN"] {
            let result = check(json!({
                "id": "x", "type": "single", "amount": bad, "currency": "USD",
                "sender": SENDER, "recipients": [{"handle": "@alice"}]
            }));
            assert!(
                matches!(result, Err(ValidationError::InvalidAmount(_))),
                "{bad} should be rejected, got {result:?}"
            );
        }
        let eth = check(json!({
            "id": "x", "type": "single", "amount": "0.5", "currency": "ETH",
            "sender": SENDER, "recipients": [{"handle": "@alice"}]
        }))
        .expect("valid");
        assert_eq!(eth.amount, Amount(500_000_000_000_000_000));
    }

    #[test]
    fn test_unsupported_currency() {
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "DOGE",
                "sender": SENDER, "recipients": [{"handle": "@alice"}]})),
            Err(ValidationError::UnsupportedCurrency(_))
        ));
    }

    #[test]
    fn test_split_explicit_shares() {
        let intent = check(json!({
            "id": "x", "type": "split", "amount": "100", "currency": "USD", "sender": SENDER,
            "recipients": [
                {"handle": "@bob", "basisPoints": 6000},
                {"handle": "@carol", "basisPoints": 4000}
            ]
        }))
        .expect("valid");
        let shares: Vec<u32> = intent.recipients.iter().map(|r| r.basis_points).collect();
        assert_eq!(shares, vec![6000, 4000]);
    }

    #[test]
    fn test_split_even_remainder_first() {
        let intent = check(json!({
            "id": "x", "type": "split", "amount": "120", "currency": "USD", "sender": SENDER,
            "recipients": [{"handle": "@alice"}, {"handle": "@bob"}, {"handle": "@carol"}]
        }))
        .expect("valid");
        let shares: Vec<u32> = intent.recipients.iter().map(|r| r.basis_points).collect();
        assert_eq!(shares, vec![3334, 3333, 3333]);
    }

    #[test]
    fn test_split_rejections() {
        let base = |recipients: serde_json::Value| {
            check(json!({"id": "x", "type": "split", "amount": "100", "currency": "USD",
                "sender": SENDER, "recipients": recipients}))
        };
        assert!(matches!(base(json!([])), Err(ValidationError::EmptyRecipients)));
        assert!(matches!(
            base(json!([{"handle": "@alice", "basisPoints": 6000}, {"handle": "@bob", "basisPoints": 3999}])),
            Err(ValidationError::BasisPointsSum { total: 9999 })
        ));
        assert!(matches!(
            base(json!([{"handle": "@alice", "basisPoints": 10000}, {"handle": "@bob", "basisPoints": 0}])),
            Err(ValidationError::InvalidBasisPoints(_))
        ));
        assert!(matches!(
            base(json!([{"handle": "@alice", "basisPoints": 12000}, {"handle": "@bob", "basisPoints": -2000}])),
            Err(ValidationError::InvalidBasisPoints(_))
        ));
        assert!(matches!(
            base(json!([{"handle": "@alice", "basisPoints": 6000}, {"handle": "@bob"}])),
            Err(ValidationError::MalformedIntent(_))
        ));
        assert!(matches!(
            base(json!([{"handle": "@alice", "basisPoints": 5000},
                        {"address": format!("0x{}", "aa".repeat(20)), "basisPoints": 5000}])),
            Err(ValidationError::DuplicateRecipient(_))
        ));
    }

    #[test]
    fn test_split_share_rounding_to_zero() {
        let result = check(json!({
            "id": "x", "type": "split", "amount": "0.01", "currency": "USD", "sender": SENDER,
            "recipients": [{"handle": "@alice"}, {"handle": "@bob"}]
        }));
        assert!(matches!(result, Err(ValidationError::InvalidAmount(_))));
    }

    #[test]
    fn test_single_recipient_rules() {
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
                "sender": SENDER, "recipients": [{"handle": "@alice"}, {"handle": "@bob"}]})),
            Err(ValidationError::RecipientCount { expected: 1, actual: 2, .. })
        ));
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
                "sender": SENDER, "recipients": [{"handle": "@alice", "basisPoints": 5000}]})),
            Err(ValidationError::InvalidBasisPoints(_))
        ));
    }

    #[test]
    fn test_unknown_recipient_and_raw_address() {
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
                "sender": SENDER, "recipients": [{"handle": "@mallory"}]})),
            Err(ValidationError::UnknownRecipient(h)) if h == "@mallory"
        ));
        let raw = format!("0x{}", "dd".repeat(20));
        let intent = check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
            "sender": SENDER, "recipients": [{"address": raw}]}))
        .expect("valid");
        assert_eq!(intent.recipients[0].address, Address([0xdd; 20]));
        assert_eq!(intent.recipients[0].handle, None);
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
                "sender": SENDER, "recipients": [{"address": "0x1234"}]})),
            Err(ValidationError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn test_subscription_rules() {
        let sub = |extra: serde_json::Value| {
            let mut v = json!({"id": "x", "type": "subscription", "amount": "9.99",
                "currency": "USD", "sender": SENDER, "recipients": [{"handle": "@alice"}]});
            if let (Some(obj), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
                for (k, val) in extra {
                    obj.insert(k.clone(), val.clone());
                }
            }
            check(v)
        };

        let ok = sub(json!({"frequency": "monthly"})).expect("valid");
        let schedule = ok.schedule.expect("schedule");
        assert_eq!(schedule.frequency, Frequency::Monthly);
        assert_eq!(schedule.start_date, NOW);

        assert!(matches!(sub(json!({})), Err(ValidationError::MissingFrequency)));
        assert!(matches!(
            sub(json!({"frequency": "hourly"})),
            Err(ValidationError::UnknownFrequency(_))
        ));
        assert!(sub(json!({"frequency": "weekly", "startDate": NOW - START_DATE_GRACE_SECS})).is_ok());
        assert!(matches!(
            sub(json!({"frequency": "weekly", "startDate": NOW - START_DATE_GRACE_SECS - 1})),
            Err(ValidationError::StartDateInPast { .. })
        ));
        assert!(sub(json!({"frequency": "yearly", "startDate": NOW + 86_400})).is_ok());
    }

    #[test]
    fn test_memo_limit() {
        let long = "x".repeat(MAX_MEMO_CHARS + 1);
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
                "sender": SENDER, "recipients": [{"handle": "@alice"}], "memo": long})),
            Err(ValidationError::MemoTooLong { .. })
        ));
    }

    #[test]
    fn test_invalid_sender() {
        assert!(matches!(
            check(json!({"id": "x", "type": "single", "amount": "1", "currency": "USD",
                "sender": "@alice", "recipients": [{"handle": "@bob"}]})),
            Err(ValidationError::InvalidSender(_))
        ));
    }
}
