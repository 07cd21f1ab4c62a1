//! Payment intents: the raw record handed over by a parser and the
//! validated form the execution layer consumes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::subscription::Frequency;
use crate::{Address, Amount, Currency};

/// Payment intent type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum IntentKind {
    Single,
    Split,
    Subscription,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Split => "split",
            Self::Subscription => "subscription",
        }
    }
}

/// An unvalidated intent record, as produced by an intent parser.
///
/// Field names accept both snake_case and the camelCase spelling used by
/// parser backends. Amounts may be given as a JSON string or number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawIntent {
    pub id: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: IntentKind,
    #[serde(deserialize_with = "amount_text")]
    pub amount: String,
    pub currency: String,
    pub sender: String,
    pub recipients: Vec<RawRecipient>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default, alias = "startDate")]
    pub start_date: Option<u64>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<u64>,
}

/// A recipient reference: an alias handle or a raw address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, alias = "basisPoints", skip_serializing_if = "Option::is_none")]
    pub basis_points: Option<i64>,
}

impl RawRecipient {
    pub fn handle(handle: &str, basis_points: Option<i64>) -> Self {
        Self {
            handle: Some(handle.to_string()),
            address: None,
            basis_points,
        }
    }

    pub fn address(address: &str, basis_points: Option<i64>) -> Self {
        Self {
            handle: None,
            address: Some(address.to_string()),
            basis_points,
        }
    }
}

fn amount_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(s) => s,
        TextOrNumber::Number(n) => n.to_string(),
    })
}

/// A recipient after resolution, with its share of the amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecipient {
    pub address: Address,
    /// The handle the address was resolved from, if any.
    pub handle: Option<String>,
    pub basis_points: u32,
}

/// Recurrence terms carried by subscription intents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    pub start_date: u64,
}

/// Where an intent came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum IntentOrigin {
    Direct,
    Subscription { subscription_id: String },
}

impl IntentOrigin {
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::Direct => None,
            Self::Subscription { subscription_id } => Some(subscription_id),
        }
    }
}

/// An intent that passed validation. Recipients are already resolved, so
/// later stages never consult the alias directory again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedIntent {
    pub id: String,
    pub kind: IntentKind,
    pub amount: Amount,
    pub currency: Currency,
    pub sender: Address,
    pub recipients: Vec<ResolvedRecipient>,
    pub memo: Option<String>,
    pub schedule: Option<Schedule>,
    pub origin: IntentOrigin,
    pub created_at: u64,
}

impl ValidatedIntent {
    /// Whether `address` is the sender or one of the recipients.
    pub fn involves(&self, address: &Address) -> bool {
        self.sender == *address || self.recipients.iter().any(|r| r.address == *address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_intent_camel_case() {
        let json = r#"{
            "id": "int-1",
            "type": "split",
            "amount": 100,
            "currency": "USD",
            "sender": "0x0101010101010101010101010101010101010101",
            "recipients": [
                {"handle": "@alice", "basisPoints": 6000},
                {"address": "0x0202020202020202020202020202020202020202", "basisPoints": 4000}
            ],
            "startDate": 5
        }"#;
        let raw: RawIntent = serde_json::from_str(json).expect("parse");
        assert_eq!(raw.kind, IntentKind::Split);
        assert_eq!(raw.amount, "100");
        assert_eq!(raw.recipients[0].basis_points, Some(6000));
        assert_eq!(raw.recipients[1].handle, None);
        assert_eq!(raw.start_date, Some(5));
    }

    #[test]
    fn test_raw_intent_string_amount() {
        let json = r#"{"id":"x","kind":"single","amount":"50.00","currency":"USD",
            "sender":"0x01","recipients":[{"handle":"@bob"}]}"#;
        let raw: RawIntent = serde_json::from_str(json).expect("parse");
        assert_eq!(raw.amount, "50.00");
        assert_eq!(raw.kind, IntentKind::Single);
    }

    #[test]
    fn test_raw_intent_missing_field() {
        let json = r#"{"id":"x","type":"single","currency":"USD","sender":"0x01","recipients":[]}"#;
        assert!(serde_json::from_str::<RawIntent>(json).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"id":"x","type":"refund","amount":"1","currency":"USD","sender":"0x01","recipients":[]}"#;
        assert!(serde_json::from_str::<RawIntent>(json).is_err());
    }

    #[test]
    fn test_origin_serde() {
        let origin = IntentOrigin::Subscription {
            subscription_id: "sub_1".into(),
        };
        let json = serde_json::to_value(&origin).expect("serialize");
        assert_eq!(json["source"], "subscription");
        assert_eq!(json["subscription_id"], "sub_1");
        assert_eq!(origin.subscription_id(), Some("sub_1"));
    }
}
