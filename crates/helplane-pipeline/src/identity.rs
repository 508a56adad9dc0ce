// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity resolution: mapping contact evidence to a stable customer.
//!
//! Lookup prefers the strongest evidence (email over phone over anonymous
//! token). Creation is atomic with insert-or-fetch semantics on the
//! `(kind, value)` uniqueness constraint: losing a creation race surfaces as
//! an `IdentityConflict`, resolved here by re-fetching the winning row.
//!
//! Within one process a keyed mutex additionally serializes the whole
//! resolve-and-attach sequence per identifier value (see the dispatcher);
//! the database constraint is the backstop across processes.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use helplane_core::types::{ContactEvidence, Customer, CustomerId, Identifier};
use helplane_core::{HelplaneError, SupportStore};

/// Resolves contact evidence to a customer id, creating customers lazily on
/// first contact.
pub struct IdentityResolver {
    store: Arc<dyn SupportStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn SupportStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Acquire the per-identifier lock serializing resolve-and-attach for
    /// this evidence. Returns `None` when there is no evidence to key on.
    ///
    /// Hold the guard across both the identity resolution and the
    /// conversation attach; drop it before any slow external call.
    pub async fn serialize_on(&self, evidence: &ContactEvidence) -> Option<OwnedMutexGuard<()>> {
        let (kind, value) = evidence.strongest()?;
        let key = format!("{kind}:{value}");
        let lock = {
            let entry = self.locks.entry(key).or_default();
            entry.clone()
        };
        Some(lock.lock_owned().await)
    }

    /// Resolve contact evidence to a customer id.
    pub async fn resolve(&self, evidence: &ContactEvidence) -> Result<CustomerId, HelplaneError> {
        let (kind, value) = evidence.strongest().ok_or_else(|| {
            HelplaneError::Normalization("no contact evidence to resolve".to_string())
        })?;

        if let Some(existing) = self.store.find_identifier(kind, value).await? {
            return Ok(CustomerId(existing.customer_id));
        }

        // First contact: create customer + identifier atomically.
        let customer_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let customer = Customer {
            id: customer_id.clone(),
            email: evidence.email.clone(),
            phone: evidence.phone.clone(),
            display_name: None,
            created_at: now.clone(),
        };
        let identifier = Identifier {
            kind,
            value: value.to_string(),
            customer_id: customer_id.clone(),
            verified: false,
            created_at: now.clone(),
        };

        match self
            .store
            .create_customer_with_identifier(&customer, &identifier)
            .await
        {
            Ok(()) => {
                debug!(customer_id = %customer_id, kind = %kind, "created customer");
                self.bind_secondary_evidence(evidence, &customer_id, &now).await;
                Ok(CustomerId(customer_id))
            }
            Err(HelplaneError::IdentityConflict { .. }) => {
                // Lost the race; the winner's row is authoritative.
                let winner = self.store.find_identifier(kind, value).await?.ok_or_else(|| {
                    HelplaneError::Internal(format!(
                        "identifier {kind}:{value} conflicted but cannot be fetched"
                    ))
                })?;
                debug!(
                    customer_id = %winner.customer_id,
                    kind = %kind,
                    "identity creation race resolved by re-fetch"
                );
                Ok(CustomerId(winner.customer_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Bind the weaker evidence fields observed at first contact to the new
    /// customer. Best-effort: a failure here never fails the event.
    async fn bind_secondary_evidence(
        &self,
        evidence: &ContactEvidence,
        customer_id: &str,
        now: &str,
    ) {
        for (kind, value) in evidence.all().into_iter().skip(1) {
            let identifier = Identifier {
                kind,
                value: value.to_string(),
                customer_id: customer_id.to_string(),
                verified: false,
                created_at: now.to_string(),
            };
            match self.store.bind_identifier(&identifier).await {
                Ok(true) => {
                    debug!(customer_id = %customer_id, kind = %kind, "bound secondary identifier");
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, kind = %kind, "failed to bind secondary identifier");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helplane_config::model::StorageConfig;
    use helplane_core::types::IdentifierKind;
    use helplane_storage::SqliteStore;
    use tempfile::tempdir;

    async fn setup_store() -> (Arc<dyn SupportStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("test.db").to_str().unwrap().to_string(),
            wal_mode: true,
        };
        let store: Arc<dyn SupportStore> = Arc::new(SqliteStore::open(&config).await.unwrap());
        (store, dir)
    }

    fn email_evidence(email: &str) -> ContactEvidence {
        ContactEvidence {
            email: Some(email.to_string()),
            phone: None,
            anon_token: None,
        }
    }

    #[tokio::test]
    async fn first_contact_creates_customer() {
        let (store, _dir) = setup_store().await;
        let resolver = IdentityResolver::new(store.clone());

        let id = resolver.resolve(&email_evidence("a@x.com")).await.unwrap();

        let customer = store.get_customer(&id).await.unwrap().unwrap();
        assert_eq!(customer.email.as_deref(), Some("a@x.com"));

        let identifier = store
            .find_identifier(IdentifierKind::Email, "a@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identifier.customer_id, id.0);
        assert!(!identifier.verified);
    }

    #[tokio::test]
    async fn repeated_resolution_is_idempotent() {
        let (store, _dir) = setup_store().await;
        let resolver = IdentityResolver::new(store.clone());

        let first = resolver.resolve(&email_evidence("a@x.com")).await.unwrap();
        let second = resolver.resolve(&email_evidence("a@x.com")).await.unwrap();
        let third = resolver.resolve(&email_evidence("a@x.com")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn strongest_evidence_wins_lookup() {
        let (store, _dir) = setup_store().await;
        let resolver = IdentityResolver::new(store.clone());

        // First contact with email + phone binds both to one customer.
        let both = ContactEvidence {
            email: Some("a@x.com".to_string()),
            phone: Some("+15550001".to_string()),
            anon_token: None,
        };
        let id = resolver.resolve(&both).await.unwrap();

        // Later phone-only contact resolves to the same customer.
        let phone_only = ContactEvidence {
            email: None,
            phone: Some("+15550001".to_string()),
            anon_token: None,
        };
        let same = resolver.resolve(&phone_only).await.unwrap();
        assert_eq!(id, same);
    }

    #[tokio::test]
    async fn concurrent_first_contacts_resolve_to_one_customer() {
        let (store, _dir) = setup_store().await;
        let resolver = Arc::new(IdentityResolver::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                // Mirrors the dispatcher: lock, then resolve.
                let evidence = email_evidence("race@x.com");
                let _guard = resolver.serialize_on(&evidence).await;
                resolver.resolve(&evidence).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "all racers must agree on one customer");
    }

    #[tokio::test]
    async fn conflict_without_lock_resolves_by_refetch() {
        let (store, _dir) = setup_store().await;
        let resolver = Arc::new(IdentityResolver::new(store.clone()));

        // No serialize_on here: exercise the insert-or-fetch path directly.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver.resolve(&email_evidence("conflict@x.com")).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn empty_evidence_is_rejected() {
        let (store, _dir) = setup_store().await;
        let resolver = IdentityResolver::new(store);
        let err = resolver.resolve(&ContactEvidence::default()).await.unwrap_err();
        assert!(matches!(err, HelplaneError::Normalization(_)));
        assert!(
            resolver.serialize_on(&ContactEvidence::default()).await.is_none()
        );
    }
}
