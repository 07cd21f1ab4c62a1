//! Intent payload fingerprints.
//!
//! Two submissions of the same intent id must carry the same payload. The
//! fingerprint covers every field that affects what gets paid, and leaves
//! out `created_at`, which callers may stamp differently on each attempt.

use bulut_crypto::blake3::{contexts, derive_id};
use bulut_types::intent::{IntentKind, IntentOrigin, ResolvedRecipient, Schedule, ValidatedIntent};
use bulut_types::{Address, Amount, Currency};
use serde::Serialize;

use crate::{ExecutionError, Result};

#[derive(Serialize)]
struct Payload<'a> {
    id: &'a str,
    kind: IntentKind,
    amount: Amount,
    currency: Currency,
    sender: &'a Address,
    recipients: &'a [ResolvedRecipient],
    memo: Option<&'a str>,
    schedule: Option<&'a Schedule>,
    origin: &'a IntentOrigin,
}

/// Hex BLAKE3 fingerprint of an intent's payload.
pub fn fingerprint(intent: &ValidatedIntent) -> Result<String> {
    let payload = Payload {
        id: &intent.id,
        kind: intent.kind,
        amount: intent.amount,
        currency: intent.currency,
        sender: &intent.sender,
        recipients: &intent.recipients,
        memo: intent.memo.as_deref(),
        schedule: intent.schedule.as_ref(),
        origin: &intent.origin,
    };
    let bytes = serde_json::to_vec(&payload)
        .map_err(|e| ExecutionError::Store(format!("fingerprint encoding: {e}")))?;
    Ok(derive_id("", contexts::INTENT_FINGERPRINT, &bytes, 32))
}
