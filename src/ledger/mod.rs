//! Transactional bookkeeping of generated declarations.
//!
//! The [`GenerationLedger`] keeps two sets of declarations. The committed set is durable for the
//! lifetime of the ledger and only ever grows. The volatile set belongs to the transaction that
//! is currently running; it collects everything a top-level request generates, including the
//! dependencies discovered along the way, and is merged into the committed set only when the
//! whole request succeeded.
//!
//! Every entry is keyed by a [`LedgerKey`]. Requesting a key that is already committed, or that
//! is in flight or done within the running transaction, never runs the synthesis again. This
//! makes requests idempotent and turns recursive type graphs into finite walks.
//!
//! # Examples
//!
//! ```rust
//! use dotbind::ledger::{GenerationLedger, LedgerKey};
//!
//! let ledger: GenerationLedger<String> = GenerationLedger::new();
//! let key = LedgerKey::Constant("Windows.Win32".to_string(), "MAX_PATH".to_string());
//!
//! ledger.transaction(|| {
//!     ledger.generate(key.clone(), || Ok(Some("260".to_string())))?;
//!     Ok(())
//! })?;
//! assert_eq!(ledger.get(&key).as_deref().map(String::as_str), Some("260"));
//! # Ok::<(), dotbind::Error>(())
//! ```

mod context;

pub use context::Context;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, RwLock},
};

use parking_lot::ReentrantMutex;
use tracing::{debug, trace};

use crate::{index::TypeIdentity, Result};

/// What a ledger entry stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LedgerKey {
    /// A type, generated under a context
    Type(TypeIdentity, Context),
    /// An extern method, by namespace and name
    Method(String, String),
    /// A constant, by namespace and name
    Constant(String, String),
    /// A support declaration that does not come from metadata, by name
    Special(String),
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKey::Type(identity, context) => write!(f, "{identity} ({context})"),
            LedgerKey::Method(namespace, name) | LedgerKey::Constant(namespace, name) => {
                write!(f, "{namespace}.{name}")
            }
            LedgerKey::Special(name) => write!(f, "{name}"),
        }
    }
}

/// The state of a key after [`GenerationLedger::generate`] returned.
#[derive(Debug)]
pub enum Slot<V> {
    /// The key is being generated further up the current call chain.
    InFlight,
    /// The key is generated; `None` if it deliberately produced no declaration.
    Done(Option<Arc<V>>),
}

impl<V> Slot<V> {
    /// The generated value, if there is one yet.
    #[must_use]
    pub fn value(&self) -> Option<&Arc<V>> {
        match self {
            Slot::Done(value) => value.as_ref(),
            Slot::InFlight => None,
        }
    }
}

enum Entry<V> {
    InFlight,
    Done(Option<Arc<V>>),
}

struct Volatile<V> {
    depth: usize,
    entries: HashMap<LedgerKey, Entry<V>>,
    order: Vec<LedgerKey>,
}

impl<V> Default for Volatile<V> {
    fn default() -> Self {
        Volatile {
            depth: 0,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

struct Committed<V> {
    entries: HashMap<LedgerKey, Option<Arc<V>>>,
    order: Vec<LedgerKey>,
}

/// The lock serializing transactions. Ledgers that generate on behalf of each other share
/// one gate.
pub type Gate = Arc<ReentrantMutex<()>>;

/// Leaves one transaction level, discarding the volatile set when the outermost one ends.
///
/// Runs on unwinding as well, so a panicking synthesis cannot leave the ledger nested.
struct Level<'l, V> {
    volatile: &'l Mutex<Volatile<V>>,
}

impl<V> Drop for Level<'_, V> {
    fn drop(&mut self) {
        let mut volatile = lock!(self.volatile);
        volatile.depth -= 1;
        if volatile.depth == 0 {
            volatile.entries.clear();
            volatile.order.clear();
        }
    }
}

/// Committed and in-flight declarations of one generator.
///
/// Transactions are serialized: a thread running a transaction holds the ledger's gate until the
/// outermost transaction finishes. The gate is re-entrant, so the synthesis may request further
/// keys and open nested transactions freely; nested transactions join the outermost one.
pub struct GenerationLedger<V> {
    gate: RwLock<Gate>,
    volatile: Mutex<Volatile<V>>,
    committed: RwLock<Committed<V>>,
}

impl<V> Default for GenerationLedger<V> {
    fn default() -> Self {
        GenerationLedger {
            gate: RwLock::new(Arc::new(ReentrantMutex::new(()))),
            volatile: Mutex::new(Volatile::default()),
            committed: RwLock::new(Committed {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }
}

impl<V> GenerationLedger<V> {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The gate this ledger's transactions hold.
    #[must_use]
    pub fn gate(&self) -> Gate {
        Arc::clone(&read_lock!(self.gate))
    }

    /// Makes this ledger's transactions hold `gate` from now on.
    ///
    /// Ledgers whose syntheses request keys of each other must share a gate; otherwise two
    /// threads may each hold one gate while waiting for the other. Must not be called while
    /// a transaction is running.
    pub fn share_gate(&self, gate: Gate) {
        *write_lock!(self.gate) = gate;
    }

    /// Runs `f` as one transaction.
    ///
    /// If no transaction is running on this thread, everything generated inside `f` is committed
    /// when `f` returns `Ok`, and discarded when it returns `Err` or panics. Inside a running
    /// transaction the call simply joins it.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let gate = self.gate();
        let _held = gate.lock();
        let outermost = {
            let mut volatile = lock!(self.volatile);
            volatile.depth += 1;
            volatile.depth == 1
        };
        let level = Level {
            volatile: &self.volatile,
        };

        let result = f();

        if outermost {
            let mut volatile = lock!(self.volatile);
            let entries = std::mem::take(&mut volatile.entries);
            let order = std::mem::take(&mut volatile.order);
            drop(volatile);

            match &result {
                Ok(_) => self.commit(entries, order),
                Err(error) => {
                    debug!(discarded = entries.len(), %error, "Rolled back generation transaction");
                }
            }
        }
        drop(level);
        result
    }

    fn commit(&self, mut entries: HashMap<LedgerKey, Entry<V>>, order: Vec<LedgerKey>) {
        let mut committed = write_lock!(self.committed);
        let mut added = 0usize;
        for key in order {
            let Some(Entry::Done(value)) = entries.remove(&key) else {
                continue;
            };
            if committed.entries.contains_key(&key) {
                continue;
            }
            committed.entries.insert(key.clone(), value);
            committed.order.push(key);
            added += 1;
        }
        trace!(added, total = committed.order.len(), "Committed generation transaction");
    }

    /// Generates `key` with `f` unless it is known already.
    ///
    /// Committed keys and keys done within the running transaction return their recorded value.
    /// A key whose generation is still running further up the call chain returns
    /// [`Slot::InFlight`]. Otherwise `f` runs, and its value is recorded in the transaction.
    /// Called outside a transaction, the call runs in a transaction of its own.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`. The failed key is forgotten, so a later transaction may try
    /// again.
    pub fn generate(
        &self,
        key: LedgerKey,
        f: impl FnOnce() -> Result<Option<V>>,
    ) -> Result<Slot<V>> {
        let gate = self.gate();
        let _held = gate.lock();

        if let Some(value) = read_lock!(self.committed).entries.get(&key) {
            return Ok(Slot::Done(value.clone()));
        }

        {
            let mut volatile = lock!(self.volatile);
            match volatile.entries.get(&key) {
                Some(Entry::InFlight) => return Ok(Slot::InFlight),
                Some(Entry::Done(value)) => return Ok(Slot::Done(value.clone())),
                None => {}
            }
            if volatile.depth == 0 {
                drop(volatile);
                return self.transaction(|| self.generate(key, f));
            }
            volatile.entries.insert(key.clone(), Entry::InFlight);
        }
        trace!(%key, "Generating");

        let result = f();

        let mut volatile = lock!(self.volatile);
        match result {
            Ok(value) => {
                let value = value.map(Arc::new);
                volatile
                    .entries
                    .insert(key.clone(), Entry::Done(value.clone()));
                volatile.order.push(key);
                Ok(Slot::Done(value))
            }
            Err(error) => {
                volatile.entries.remove(&key);
                Err(error)
            }
        }
    }

    /// Returns `true` if a transaction is running on this thread.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        let gate = self.gate();
        let _held = gate.lock();
        let depth = lock!(self.volatile).depth;
        depth > 0
    }

    /// The committed value of `key`.
    #[must_use]
    pub fn get(&self, key: &LedgerKey) -> Option<Arc<V>> {
        read_lock!(self.committed).entries.get(key).cloned().flatten()
    }

    /// Returns `true` if `key` is committed, with or without a value.
    #[must_use]
    pub fn contains(&self, key: &LedgerKey) -> bool {
        read_lock!(self.committed).entries.contains_key(key)
    }

    /// Every committed value in commit order; dependencies precede their dependents.
    #[must_use]
    pub fn committed(&self) -> Vec<(LedgerKey, Arc<V>)> {
        let committed = read_lock!(self.committed);
        committed
            .order
            .iter()
            .filter_map(|key| {
                committed
                    .entries
                    .get(key)
                    .cloned()
                    .flatten()
                    .map(|value| (key.clone(), value))
            })
            .collect()
    }

    /// Number of committed keys, including those without a value.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock!(self.committed).order.len()
    }

    /// Returns `true` if nothing was committed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> fmt::Debug for GenerationLedger<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationLedger")
            .field("committed", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        panic::{self, AssertUnwindSafe},
        sync::Arc,
        thread,
    };

    use super::*;
    use crate::Error;

    fn type_key(name: &str) -> LedgerKey {
        LedgerKey::Type(TypeIdentity::new("Test", name), Context::default())
    }

    #[test]
    fn committed_values_are_not_regenerated() {
        let ledger: GenerationLedger<String> = GenerationLedger::new();
        let calls = Cell::new(0);
        let make = || {
            calls.set(calls.get() + 1);
            Ok(Some("POINT".to_string()))
        };

        let first = ledger.generate(type_key("POINT"), make).unwrap();
        let second = ledger.generate(type_key("POINT"), make).unwrap();

        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(
            first.value().unwrap(),
            second.value().unwrap()
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn contexts_are_distinct_keys() {
        let ledger: GenerationLedger<&'static str> = GenerationLedger::new();
        let identity = TypeIdentity::new("Test", "CALLBACK");
        ledger
            .generate(LedgerKey::Type(identity.clone(), Context::new(true)), || {
                Ok(Some("delegate"))
            })
            .unwrap();
        ledger
            .generate(LedgerKey::Type(identity, Context::new(false)), || {
                Ok(Some("function pointer"))
            })
            .unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn recursion_sees_the_key_in_flight() {
        let ledger: GenerationLedger<&'static str> = GenerationLedger::new();
        let result = ledger.transaction(|| {
            ledger.generate(type_key("NODE"), || {
                let inner = ledger.generate(type_key("NODE"), || Ok(Some("never")))?;
                assert!(matches!(inner, Slot::InFlight));
                Ok(Some("node"))
            })
        });

        assert!(result.is_ok());
        assert_eq!(ledger.get(&type_key("NODE")).as_deref(), Some(&"node"));
    }

    #[test]
    fn dependencies_commit_before_dependents() {
        let ledger: GenerationLedger<&'static str> = GenerationLedger::new();
        ledger
            .generate(type_key("RECT"), || {
                ledger.generate(type_key("POINT"), || Ok(Some("point")))?;
                assert!(!ledger.contains(&type_key("POINT")));
                Ok(Some("rect"))
            })
            .unwrap();

        let order: Vec<_> = ledger.committed().into_iter().map(|(_, v)| *v).collect();
        assert_eq!(order, vec!["point", "rect"]);
    }

    #[test]
    fn failure_discards_only_the_failing_transaction() {
        let ledger: GenerationLedger<&'static str> = GenerationLedger::new();
        ledger
            .generate(type_key("EARLIER"), || Ok(Some("earlier")))
            .unwrap();

        let result = ledger.transaction(|| {
            ledger.generate(type_key("DEPENDENCY"), || Ok(Some("dependency")))?;
            ledger.generate(type_key("BROKEN"), || {
                Err(Error::NotSupported("static field".to_string()))
            })?;
            Ok(())
        });

        assert!(matches!(result, Err(Error::NotSupported(_))));
        assert!(ledger.contains(&type_key("EARLIER")));
        assert!(!ledger.contains(&type_key("DEPENDENCY")));
        assert!(!ledger.contains(&type_key("BROKEN")));
        assert!(!ledger.in_transaction());

        // The failed key may be retried later.
        ledger
            .generate(type_key("BROKEN"), || Ok(Some("fixed")))
            .unwrap();
        assert_eq!(ledger.get(&type_key("BROKEN")).as_deref(), Some(&"fixed"));
    }

    #[test]
    fn panicking_transactions_leave_the_ledger_usable() {
        let ledger: GenerationLedger<&'static str> = GenerationLedger::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            ledger.transaction(|| -> Result<()> {
                ledger.generate(type_key("PARTIAL"), || Ok(Some("partial")))?;
                panic!("synthesis panicked");
            })
        }));

        assert!(outcome.is_err());
        assert!(!ledger.in_transaction());
        assert!(!ledger.contains(&type_key("PARTIAL")));

        ledger
            .generate(type_key("LATER"), || Ok(Some("later")))
            .unwrap();
        assert!(ledger.contains(&type_key("LATER")));
        assert!(!ledger.contains(&type_key("PARTIAL")));
    }

    #[test]
    fn shared_gates_are_held_by_every_sharer() {
        let first: GenerationLedger<&'static str> = GenerationLedger::new();
        let second: GenerationLedger<&'static str> = GenerationLedger::new();
        second.share_gate(first.gate());
        assert!(Arc::ptr_eq(&first.gate(), &second.gate()));

        first
            .transaction(|| {
                assert!(second.gate().is_owned_by_current_thread());
                second.generate(type_key("OTHER"), || Ok(Some("other")))?;
                Ok(())
            })
            .unwrap();
        assert!(second.contains(&type_key("OTHER")));
    }

    #[test]
    fn empty_results_are_remembered() {
        let ledger: GenerationLedger<String> = GenerationLedger::new();
        let calls = Cell::new(0);
        for _ in 0..2 {
            ledger
                .generate(LedgerKey::Special("skipped".into()), || {
                    calls.set(calls.get() + 1);
                    Ok(None)
                })
                .unwrap();
        }

        assert_eq!(calls.get(), 1);
        assert!(ledger.contains(&LedgerKey::Special("skipped".into())));
        assert!(ledger.get(&LedgerKey::Special("skipped".into())).is_none());
        assert!(ledger.committed().is_empty());
    }

    #[test]
    fn transactions_are_serialized_across_threads() {
        let ledger: Arc<GenerationLedger<usize>> = Arc::new(GenerationLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let key = LedgerKey::Constant("Test".to_string(), format!("C{}", i % 4));
                    ledger.generate(key, || Ok(Some(i))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 4);
    }
}
