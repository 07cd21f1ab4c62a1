//! Execution storage.
//!
//! The ledger keeps intents, executions with their legs, and the
//! append-only transition history. Reads return owned snapshots.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

use bulut_types::execution::{Execution, ExecutionStatus, HistoryEntry};
use bulut_types::intent::ValidatedIntent;
use bulut_types::Address;

use crate::Result;

/// A state change to record alongside an execution update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<ExecutionStatus>,
    pub to: ExecutionStatus,
    pub at: u64,
    pub detail: String,
}

/// Storage for executions and their audit history.
pub trait ExecutionStore: Send + Sync {
    /// Record a new intent and its execution, with `initial` as the first
    /// history entry, in one step.
    fn create(
        &self,
        intent: &ValidatedIntent,
        fingerprint: &str,
        execution: &Execution,
        initial: &Transition,
    ) -> Result<()>;

    /// Persist the execution and its legs, appending `transition` to the
    /// history when given.
    fn save(&self, execution: &Execution, transition: Option<&Transition>) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Execution>>;

    fn find_by_intent(&self, intent_id: &str) -> Result<Option<Execution>>;

    /// Executions where `address` is the sender or a recipient, newest
    /// first, ties broken by id.
    fn history_for(&self, address: &Address, limit: usize, offset: usize)
        -> Result<Vec<Execution>>;

    /// Full transition history of one execution, oldest first.
    fn audit_trail(&self, execution_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Executions not yet in a terminal state.
    fn list_unfinished(&self) -> Result<Vec<Execution>>;

    /// Execution counts by status.
    fn count_by_status(&self) -> Result<Vec<(ExecutionStatus, u64)>>;
}

#[cfg(test)]
pub(crate) mod tests {
    //! Behaviour shared by every backend.

    use super::*;
    use bulut_types::execution::{LegStatus, TransferLeg};
    use bulut_types::intent::{IntentKind, IntentOrigin, ResolvedRecipient};
    use bulut_types::{Amount, Currency};

    pub(crate) fn intent(id: &str, sender: u8, recipient: u8, created_at: u64) -> ValidatedIntent {
        ValidatedIntent {
            id: id.into(),
            kind: IntentKind::Single,
            amount: Amount(5000),
            currency: Currency::Usd,
            sender: Address([sender; 20]),
            recipients: vec![ResolvedRecipient {
                address: Address([recipient; 20]),
                handle: None,
                basis_points: 10_000,
            }],
            memo: None,
            schedule: None,
            origin: IntentOrigin::Direct,
            created_at,
        }
    }

    pub(crate) fn execution(id: &str, intent: &ValidatedIntent) -> Execution {
        Execution {
            id: id.into(),
            intent_id: intent.id.clone(),
            origin: intent.origin.clone(),
            sender: intent.sender,
            currency: intent.currency,
            amount: intent.amount,
            status: ExecutionStatus::Pending,
            failure: None,
            legs: vec![TransferLeg::new(0, intent.recipients[0].address, intent.amount)],
            attempt_count: 1,
            external_tx_ref: None,
            fingerprint: "fp".into(),
            memo: None,
            created_at: intent.created_at,
            updated_at: intent.created_at,
            confirmed_at: None,
        }
    }

    fn created(at: u64) -> Transition {
        Transition {
            from: None,
            to: ExecutionStatus::Pending,
            at,
            detail: "created".into(),
        }
    }

    pub(crate) fn exercise(store: &dyn ExecutionStore) {
        let i1 = intent("int_1", 1, 2, 100);
        let mut e1 = execution("exe_1", &i1);
        store.create(&i1, "fp", &e1, &created(100)).expect("create");

        assert_eq!(store.find_by_intent("int_1").expect("find"), Some(e1.clone()));
        assert_eq!(store.get("exe_1").expect("get"), Some(e1.clone()));
        assert_eq!(store.get("exe_missing").expect("get"), None);

        // Leg-only update leaves history alone.
        e1.legs[0].status = LegStatus::InDoubt;
        e1.legs[0].correlation_id = Some("exe_1/0/1".into());
        e1.legs[0].submissions = 1;
        store.save(&e1, None).expect("save");
        assert_eq!(store.audit_trail("exe_1").expect("trail").len(), 1);

        e1.status = ExecutionStatus::Submitted;
        e1.legs[0].status = LegStatus::Submitted;
        e1.legs[0].gateway_ref = Some("ref".into());
        let t = Transition {
            from: Some(ExecutionStatus::Pending),
            to: ExecutionStatus::Submitted,
            at: 101,
            detail: "submitted".into(),
        };
        store.save(&e1, Some(&t)).expect("save");

        let loaded = store.get("exe_1").expect("get").expect("present");
        assert_eq!(loaded, e1);

        let trail = store.audit_trail("exe_1").expect("trail");
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].seq, 1);
        assert_eq!(trail[0].from_state, None);
        assert_eq!(trail[1].seq, 2);
        assert_eq!(trail[1].from_state, Some(ExecutionStatus::Pending));
        assert_eq!(trail[1].to_state, ExecutionStatus::Submitted);

        assert_eq!(store.list_unfinished().expect("unfinished").len(), 1);

        // Address history: newest first, ties by id.
        let i2 = intent("int_2", 3, 1, 200);
        let i3 = intent("int_3", 1, 4, 200);
        store
            .create(&i2, "fp", &execution("exe_b", &i2), &created(200))
            .expect("create");
        store
            .create(&i3, "fp", &execution("exe_a", &i3), &created(200))
            .expect("create");

        let ids: Vec<String> = store
            .history_for(&Address([1; 20]), 10, 0)
            .expect("history")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["exe_a", "exe_b", "exe_1"]);

        let page: Vec<String> = store
            .history_for(&Address([1; 20]), 1, 1)
            .expect("history")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(page, vec!["exe_b"]);
        assert!(store
            .history_for(&Address([9; 20]), 10, 0)
            .expect("history")
            .is_empty());

        let counts = store.count_by_status().expect("counts");
        assert!(counts.contains(&(ExecutionStatus::Pending, 2)));
        assert!(counts.contains(&(ExecutionStatus::Submitted, 1)));
    }
}
