//! The fixed secondary indices and their background provisioning.
//!
//! Indices are declared once per connection, after authentication. Every declaration
//! runs as its own task: a failure is logged and reported but never blocks the other
//! declarations, and starting provisioning never waits for any of them.
//!
//! Callers that need the indices to exist before their first query must await
//! [`IndexProvisioning::wait`]; initialization completing only means the declarations
//! were issued.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{
    error::{KvStoreError, KvStoreResult},
    schema::{OBJECTS, SEARCH, fields, search_fields},
};

/// Options attached to an index declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSpecOptions {
    /// Build without blocking reads and writes on the collection.
    pub background: bool,
    /// Turns the index into a TTL index removing rows this many seconds after the
    /// indexed timestamp.
    pub expire_after_seconds: Option<u64>,
}

/// One index declaration: collection, key specification and options.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub keys: Document,
    pub options: IndexSpecOptions,
}

impl IndexSpec {
    fn background(collection: &'static str, keys: Document) -> Self {
        Self {
            collection,
            keys,
            options: IndexSpecOptions { background: true, expire_after_seconds: None },
        }
    }

    /// The name the document store derives for these keys, e.g. `_key_1_score_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| match direction {
                Bson::String(kind) => format!("{}_{}", field, kind),
                Bson::Int32(n) => format!("{}_{}", field, n),
                Bson::Int64(n) => format!("{}_{}", field, n),
                other => format!("{}_{}", field, other),
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// The five indices the schema relies on, in declaration order.
pub fn required_indices() -> [IndexSpec; 5] {
    [
        // rank and range scans over sorted sets
        IndexSpec::background(OBJECTS, doc! { fields::KEY: 1, fields::SCORE: -1 }),
        // membership and field lookups
        IndexSpec::background(OBJECTS, doc! { fields::KEY: 1, fields::VALUE: -1 }),
        IndexSpec {
            collection: OBJECTS,
            keys: doc! { fields::EXPIRE_AT: 1 },
            options: IndexSpecOptions { background: true, expire_after_seconds: Some(0) },
        },
        IndexSpec::background(SEARCH, doc! { search_fields::CONTENT: "text" }),
        IndexSpec::background(SEARCH, doc! { search_fields::KEY: 1, search_fields::ID: 1 }),
    ]
}

/// Set once provisioning has started for a target.
#[derive(Debug, Default)]
pub struct ProvisioningLatch(AtomicBool);

impl ProvisioningLatch {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns `true` for the first caller only.
    pub fn claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A store that can declare indices.
///
/// Declaring an index that already exists with the same definition must succeed
/// without changing anything.
#[async_trait]
pub trait IndexTarget: Send + Sync + 'static {
    async fn declare_index(&self, spec: &IndexSpec) -> KvStoreResult<()>;

    /// Guards against provisioning the same target twice.
    fn provisioning_latch(&self) -> &ProvisioningLatch;
}

/// Outcome of a finished provisioning run.
#[derive(Debug, Default)]
pub struct ProvisioningReport {
    /// Number of declarations issued.
    pub declared: usize,
    /// One entry per declaration that failed.
    pub failures: Vec<KvStoreError>,
}

impl ProvisioningReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Handle to declarations running in the background.
#[derive(Debug)]
pub struct IndexProvisioning {
    tasks: Vec<JoinHandle<KvStoreResult<()>>>,
}

impl IndexProvisioning {
    /// Number of declarations issued.
    pub fn issued(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` once every declaration has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Waits for every declaration to finish.
    pub async fn wait(self) -> ProvisioningReport {
        let mut report = ProvisioningReport { declared: self.tasks.len(), failures: Vec::new() };

        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => report.failures.push(err),
                Err(err) => report.failures.push(KvStoreError::IndexProvisioning {
                    collection: String::new(),
                    keys: String::new(),
                    reason: err.to_string(),
                }),
            }
        }

        report
    }
}

/// Issues the [`required_indices`] against a target.
pub struct IndexProvisioner;

impl IndexProvisioner {
    /// Spawns one task per required index on the current Tokio runtime and returns
    /// immediately. Fails only if provisioning already started for this target.
    pub fn start<T>(target: Arc<T>) -> KvStoreResult<IndexProvisioning>
    where
        T: IndexTarget + ?Sized,
    {
        if !target.provisioning_latch().claim() {
            return Err(KvStoreError::Configuration(
                "index provisioning already started for this store".to_string(),
            ));
        }

        let tasks = required_indices()
            .into_iter()
            .map(|spec| {
                let target = Arc::clone(&target);

                tokio::spawn(async move {
                    match target.declare_index(&spec).await {
                        Ok(()) => {
                            debug!(collection = spec.collection, index = %spec.name(), "index declared");
                            Ok(())
                        }
                        Err(err) => {
                            let err = KvStoreError::IndexProvisioning {
                                collection: spec.collection.to_string(),
                                keys: spec.keys.to_string(),
                                reason: err.to_string(),
                            };
                            error!(error = %err, "Error creating index");
                            Err(err)
                        }
                    }
                })
            })
            .collect();

        Ok(IndexProvisioning { tasks })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingTarget {
        declared: Mutex<Vec<IndexSpec>>,
        reject: Option<&'static str>,
        latch: ProvisioningLatch,
    }

    #[async_trait]
    impl IndexTarget for RecordingTarget {
        async fn declare_index(&self, spec: &IndexSpec) -> KvStoreResult<()> {
            if self.reject == Some(spec.collection) {
                return Err(KvStoreError::Operation("text index not supported".into()));
            }
            self.declared.lock().unwrap().push(spec.clone());
            Ok(())
        }

        fn provisioning_latch(&self) -> &ProvisioningLatch {
            &self.latch
        }
    }

    #[test]
    fn required_indices_are_fixed() {
        let specs = required_indices();
        let summary = specs
            .iter()
            .map(|spec| (spec.collection, spec.name(), spec.options.expire_after_seconds))
            .collect::<Vec<_>>();

        assert_eq!(
            summary,
            vec![
                ("objects", "_key_1_score_-1".to_string(), None),
                ("objects", "_key_1_value_-1".to_string(), None),
                ("objects", "expireAt_1".to_string(), Some(0)),
                ("search", "content_text".to_string(), None),
                ("search", "key_1_id_1".to_string(), None),
            ]
        );
        assert!(specs.iter().all(|spec| spec.options.background));
    }

    #[tokio::test]
    async fn issues_all_five_declarations() {
        let target = Arc::new(RecordingTarget::default());
        let provisioning = IndexProvisioner::start(Arc::clone(&target)).unwrap();

        assert_eq!(provisioning.issued(), 5);
        let report = provisioning.wait().await;

        assert!(report.is_complete());
        assert_eq!(target.declared.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failures_do_not_block_other_declarations() {
        let target = Arc::new(RecordingTarget { reject: Some(SEARCH), ..Default::default() });
        let report = IndexProvisioner::start(Arc::clone(&target)).unwrap().wait().await;

        assert_eq!(report.declared, 5);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(report.failures[0], KvStoreError::IndexProvisioning { .. }));
        assert_eq!(target.declared.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn provisioning_runs_once_per_target() {
        let target = Arc::new(RecordingTarget::default());

        IndexProvisioner::start(Arc::clone(&target)).unwrap().wait().await;
        assert!(matches!(
            IndexProvisioner::start(Arc::clone(&target)),
            Err(KvStoreError::Configuration(_))
        ));
    }
}
