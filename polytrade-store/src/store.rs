//! # Store
//!
//! The single source of truth: a `VenueName -> VenueShard` mapping,
//! addressed by [`crate::Path`] and mutated only through [`crate::Command`].
//! Internally backed by a `serde_json::Value` object tree so that arbitrary,
//! dynamically-shaped paths (array indices into `twaps[]`, `chases[]`, ...)
//! resolve without a combinatorial sum-type per field; typed accessors
//! (`venue`, `ticker`, ...) deserialize the relevant sub-tree on read so
//! callers work with [`crate::model`] types rather than raw JSON.

use crate::command::{Command, StoreError};
use crate::model::VenueShard;
use crate::path::Path;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    root: Value,
}

impl Store {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Default::default()),
        }
    }

    /// Apply a batch atomically: either every command lands, or none does.
    /// This is what makes a batch "atomic with respect to host observers"
    /// (§5): a reader never observes a partially-applied batch.
    pub fn apply(&mut self, commands: &[Command]) -> Result<(), StoreError> {
        let mut candidate = self.root.clone();
        for command in commands {
            command.apply(&mut candidate)?;
        }
        self.root = candidate;
        Ok(())
    }

    /// Replay `commands` onto a clone of `self`, returning the result
    /// without mutating `self`. Used to check invariant 5 (mutation replay
    /// equality) in tests: `pre_batch.replay(&emitted) == post_batch`.
    pub fn replay(&self, commands: &[Command]) -> Result<Store, StoreError> {
        let mut clone = self.clone();
        clone.apply(commands)?;
        Ok(clone)
    }

    pub fn venue_names(&self) -> Vec<String> {
        self.root
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Deserialize a venue's shard. `None` if the venue has no shard yet
    /// (before its first `start`-triggered `update`).
    pub fn venue(&self, name: &str) -> Option<VenueShard> {
        self.root
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Raw read access to an arbitrary path, for diagnostics/tests.
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = &self.root;
        for seg in path.segments() {
            current = match seg {
                crate::path::PathSegment::Key(k) => current.get(k)?,
                crate::path::PathSegment::Index(i) => current.get(i)?,
            };
        }
        Some(current)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountShard, Loaded, VenueShard};
    use serde_json::json;

    #[test]
    fn venue_shard_round_trips_through_the_store() {
        let mut store = Store::new();
        let shard = VenueShard {
            loaded: Loaded {
                markets: true,
                tickers: true,
            },
            ..Default::default()
        };
        store
            .apply(&[Command::Update {
                path: Path::key("binance"),
                value: serde_json::to_value(&shard).unwrap(),
            }])
            .unwrap();
        let read_back = store.venue("binance").unwrap();
        assert_eq!(read_back, shard);
    }

    #[test]
    fn add_then_remove_account_restores_prior_shard() {
        let mut store = Store::new();
        store
            .apply(&[Command::Update {
                path: Path::key("binance"),
                value: serde_json::to_value(VenueShard::default()).unwrap(),
            }])
            .unwrap();
        let before = store.venue("binance").unwrap();

        store
            .apply(&[Command::Update {
                path: "binance.private.A1".into(),
                value: serde_json::to_value(AccountShard::default()).unwrap(),
            }])
            .unwrap();
        assert!(store.venue("binance").unwrap().private.contains_key("A1"));

        store
            .apply(&[Command::RemoveObjectKey {
                path: "binance.private".into(),
                key: "A1".to_string(),
            }])
            .unwrap();
        let after = store.venue("binance").unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn update_with_current_value_is_a_no_op() {
        let mut store = Store::new();
        store
            .apply(&[Command::Update {
                path: Path::key("binance"),
                value: json!({"loaded": {"markets": true, "tickers": false}}),
            }])
            .unwrap();
        let before = store.clone();
        store
            .apply(&[Command::Update {
                path: "binance.loaded.markets".into(),
                value: json!(true),
            }])
            .unwrap();
        assert_eq!(store, before);
    }

    #[test]
    fn batch_is_atomic_on_failure() {
        let mut store = Store::new();
        store
            .apply(&[Command::Update {
                path: "a.orders".into(),
                value: json!([1, 2]),
            }])
            .unwrap();
        let before = store.clone();
        let err = store.apply(&[
            Command::Update {
                path: "a.orders.2".into(),
                value: json!(3),
            },
            // This one is out of bounds and should roll back the whole batch.
            Command::Update {
                path: "a.orders.10".into(),
                value: json!(99),
            },
        ]);
        assert!(err.is_err());
        assert_eq!(store, before);
    }

    #[test]
    fn replay_onto_clone_matches_post_batch_store() {
        let mut store = Store::new();
        let commands = vec![
            Command::Update {
                path: Path::key("binance"),
                value: serde_json::to_value(VenueShard::default()).unwrap(),
            },
            Command::Update {
                path: "binance.public.latency".into(),
                value: json!(12.5),
            },
        ];
        let pre_batch = store.clone();
        store.apply(&commands).unwrap();
        let replayed = pre_batch.replay(&commands).unwrap();
        assert_eq!(replayed, store);
    }
}
