//! # Variable Store
//!
//! Process-wide, volatile bindings shared by every handler invocation:
//!
//! * **variables**: seeded from the declaration, reassigned by effects and
//!   scripts, never removed.
//! * **scratch scope**: names first created by embedded scripts that are not
//!   declared variables. The template engine consults it after the variables.
//!
//! Both maps are [`DashMap`]s behind an [`Arc`], so the store is a cheap
//! handle passed to every component. A read-modify-write through
//! [`VariableStore::update`] holds the key's shard lock, which makes a
//! single increment atomic. There is no transaction across keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::declaration::Variable;
use crate::value::Value;

#[derive(Clone, Debug, Default)]
pub struct VariableStore {
    variables: Arc<DashMap<String, Value>>,
    scratch: Arc<DashMap<String, Value>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seeds: &[Variable]) -> Self {
        let store = Self::new();
        for seed in seeds {
            store.set(&seed.name, seed.value.clone());
        }
        store
    }

    /// Seeds only names that are not present yet. Returns how many were
    /// added.
    pub fn seed_missing(&self, seeds: &[Variable]) -> usize {
        let mut added = 0;
        for seed in seeds {
            if let Entry::Vacant(entry) = self.variables.entry(seed.name.clone()) {
                entry.insert(seed.value.clone());
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.variables.get(name).map(|v| v.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn set(&self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    /// Atomic read-modify-write of one variable. `f` sees the current value
    /// (`None` when absent); on error nothing is written.
    pub fn update<F, E>(&self, name: &str, f: F) -> Result<Value, E>
    where
        F: FnOnce(Option<&Value>) -> Result<Value, E>,
    {
        match self.variables.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let next = f(Some(entry.get()))?;
                entry.insert(next.clone());
                Ok(next)
            }
            Entry::Vacant(entry) => {
                let next = f(None)?;
                entry.insert(next.clone());
                Ok(next)
            }
        }
    }

    pub fn scratch(&self, name: &str) -> Option<Value> {
        self.scratch.get(name).map(|v| v.value().clone())
    }

    pub fn set_scratch(&self, name: &str, value: Value) {
        self.scratch.insert(name.to_string(), value);
    }

    /// Variables first, then the scratch scope.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).or_else(|| self.scratch(name))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn scratch_snapshot(&self) -> BTreeMap<String, Value> {
        self.scratch
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_and_lookup() {
        let store = VariableStore::seeded(&[Variable::new("count", 0), Variable::new("name", "x")]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("count"), Some(Value::Integer(0)));

        store.set_scratch("luck", Value::Integer(7));
        assert_eq!(store.lookup("luck"), Some(Value::Integer(7)));
        assert_eq!(store.get("luck"), None);

        // 変数がスクラッチより優先される
        store.set_scratch("count", Value::Integer(99));
        assert_eq!(store.lookup("count"), Some(Value::Integer(0)));
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let store = VariableStore::new();
        let result: Result<Value, &str> = store.update("x", |_| Err("boom"));
        assert!(result.is_err());
        assert!(!store.contains("x"));

        let next: Result<Value, &str> = store.update("x", |current| {
            assert!(current.is_none());
            Ok(Value::Integer(1))
        });
        assert_eq!(next.unwrap(), Value::Integer(1));
        assert_eq!(store.get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_seed_missing_keeps_existing() {
        let store = VariableStore::seeded(&[Variable::new("count", 0)]);
        store.set("count", Value::Integer(5));
        let added = store.seed_missing(&[Variable::new("count", 0), Variable::new("new", true)]);
        assert_eq!(added, 1);
        assert_eq!(store.get("count"), Some(Value::Integer(5)));
        assert_eq!(store.get("new"), Some(Value::Boolean(true)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_do_not_lose_increments() {
        let store = VariableStore::new();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    let _: Result<Value, ()> = store.update("n", |v| {
                        let current = match v {
                            Some(Value::Integer(i)) => *i,
                            _ => 0,
                        };
                        Ok(Value::Integer(current + 1))
                    });
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.get("n"), Some(Value::Integer(800)));
    }
}
