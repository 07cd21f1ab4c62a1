//! In-memory ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use bulut_types::execution::{Execution, ExecutionStatus, HistoryEntry};
use bulut_types::intent::ValidatedIntent;
use bulut_types::Address;

use super::{ExecutionStore, Transition};
use crate::{ExecutionError, Result};

#[derive(Default)]
struct State {
    intents: HashMap<String, (ValidatedIntent, String)>,
    executions: HashMap<String, Execution>,
    by_intent: HashMap<String, String>,
    history: HashMap<String, Vec<HistoryEntry>>,
}

impl State {
    fn append(&mut self, execution_id: &str, t: &Transition) {
        let entries = self.history.entry(execution_id.to_string()).or_default();
        entries.push(HistoryEntry {
            execution_id: execution_id.to_string(),
            seq: entries.len() as u32 + 1,
            from_state: t.from,
            to_state: t.to,
            timestamp: t.at,
            detail: t.detail.clone(),
        });
    }
}

/// Mutex-guarded ledger for tests and ephemeral daemons.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ExecutionError::Store("ledger lock poisoned".into()))
    }
}

impl ExecutionStore for MemoryLedger {
    fn create(
        &self,
        intent: &ValidatedIntent,
        fingerprint: &str,
        execution: &Execution,
        initial: &Transition,
    ) -> Result<()> {
        let mut state = self.lock()?;
        if state.by_intent.contains_key(&intent.id) {
            return Err(ExecutionError::Store(format!(
                "intent {} already has an execution",
                intent.id
            )));
        }
        state
            .intents
            .entry(intent.id.clone())
            .or_insert_with(|| (intent.clone(), fingerprint.to_string()));
        state
            .by_intent
            .insert(intent.id.clone(), execution.id.clone());
        state
            .executions
            .insert(execution.id.clone(), execution.clone());
        state.append(&execution.id, initial);
        Ok(())
    }

    fn save(&self, execution: &Execution, transition: Option<&Transition>) -> Result<()> {
        let mut state = self.lock()?;
        match state.executions.get_mut(&execution.id) {
            Some(slot) => *slot = execution.clone(),
            None => return Err(ExecutionError::NotFound(execution.id.clone())),
        }
        if let Some(t) = transition {
            state.append(&execution.id, t);
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Execution>> {
        Ok(self.lock()?.executions.get(id).cloned())
    }

    fn find_by_intent(&self, intent_id: &str) -> Result<Option<Execution>> {
        let state = self.lock()?;
        Ok(state
            .by_intent
            .get(intent_id)
            .and_then(|id| state.executions.get(id))
            .cloned())
    }

    fn history_for(
        &self,
        address: &Address,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Execution>> {
        let state = self.lock()?;
        let mut matching: Vec<&Execution> = state
            .executions
            .values()
            .filter(|e| e.involves(address))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn audit_trail(&self, execution_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .lock()?
            .history
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    fn list_unfinished(&self) -> Result<Vec<Execution>> {
        let state = self.lock()?;
        let mut open: Vec<Execution> = state
            .executions
            .values()
            .filter(|e| !e.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(open)
    }

    fn count_by_status(&self) -> Result<Vec<(ExecutionStatus, u64)>> {
        let state = self.lock()?;
        let mut counts: BTreeMap<&'static str, (ExecutionStatus, u64)> = BTreeMap::new();
        for e in state.executions.values() {
            counts.entry(e.status.as_str()).or_insert((e.status, 0)).1 += 1;
        }
        Ok(counts.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_ledger() {
        super::super::tests::exercise(&MemoryLedger::new());
    }

    #[test]
    fn test_save_unknown_execution() {
        let ledger = MemoryLedger::new();
        let intent = super::super::tests::intent("int_x", 1, 2, 0);
        let exec = super::super::tests::execution("exe_x", &intent);
        assert!(matches!(
            ledger.save(&exec, None),
            Err(ExecutionError::NotFound(_))
        ));
    }
}
