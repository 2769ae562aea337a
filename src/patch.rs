//! The opaque document patch/diff algebra, stubbed behind a trait.
//!
//! §1 treats `patch(state, diff) -> state` and `diff(a, b) -> delta` as an
//! external collaborator outside this crate's scope. Rust has no ambient
//! "pair of opaque closures" the way a host language can pass untyped
//! functions around, so it is expressed as a trait generic over the
//! `DirCompactor`. Production callers with their own structured-document
//! diff algebra supply their own impl; this crate ships one default,
//! [`JsonMergePatch`], used throughout the test suite.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A state/diff algebra a `DirCompactor` folds segments through.
pub trait PatchAlgebra: Send + Sync + 'static {
    /// The cumulative document state folded across a compaction window.
    type State: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;
    /// The delta carried by one `DiffFile`.
    type Diff: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// The empty document, used to seed `Start`/`Ref` before any input.
    fn null() -> Self::State;
    /// Applies `diff` to `state`, producing the new cumulative state.
    fn patch(state: &Self::State, diff: &Self::Diff) -> Self::State;
    /// The delta that would turn `a` into `b`.
    fn diff(a: &Self::State, b: &Self::State) -> Self::Diff;
    /// True iff `diff` represents no observable change.
    fn is_empty(diff: &Self::Diff) -> bool;
}

/// Default `PatchAlgebra`: a shallow merge over `serde_json::Value`
/// objects, keyed by top-level field. `patch` overlays `diff`'s fields
/// onto `state`; `diff` emits only the fields of `b` that differ from
/// `a`, plus `null` for fields `a` had that `b` dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMergePatch;

impl PatchAlgebra for JsonMergePatch {
    type State = Value;
    type Diff = Value;

    fn null() -> Self::State {
        Value::Object(Map::new())
    }

    fn patch(state: &Self::State, diff: &Self::Diff) -> Self::State {
        let mut base = match state {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if let Value::Object(changes) = diff {
            for (key, value) in changes {
                if value.is_null() {
                    base.remove(key);
                } else {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(base)
    }

    fn diff(a: &Self::State, b: &Self::State) -> Self::Diff {
        let empty = Map::new();
        let a_map = if let Value::Object(m) = a { m } else { &empty };
        let b_map = if let Value::Object(m) = b { m } else { &empty };

        let mut delta = Map::new();
        for (key, b_value) in b_map {
            match a_map.get(key) {
                Some(a_value) if a_value == b_value => {}
                _ => {
                    delta.insert(key.clone(), b_value.clone());
                }
            }
        }
        for key in a_map.keys() {
            if !b_map.contains_key(key) {
                delta.insert(key.clone(), Value::Null);
            }
        }
        Value::Object(delta)
    }

    fn is_empty(diff: &Self::Diff) -> bool {
        match diff {
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}
