// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer and identifier operations.
//!
//! The `(kind, value)` primary key on identifiers is the system's core
//! deduplication guarantee: creation uses insert-or-fetch semantics, and a
//! constraint violation surfaces as [`HelplaneError::IdentityConflict`] so
//! callers re-fetch instead of creating a duplicate customer.

use helplane_core::HelplaneError;
use helplane_core::types::{Customer, CustomerId, Identifier, IdentifierKind};
use rusqlite::params;

use crate::database::Database;
use crate::queries::column_enum;

/// Exact lookup of an identifier by `(kind, value)`.
pub async fn find_identifier(
    db: &Database,
    kind: IdentifierKind,
    value: &str,
) -> Result<Option<Identifier>, HelplaneError> {
    let kind_s = kind.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Identifier>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT kind, value, customer_id, verified, created_at
                 FROM identifiers WHERE kind = ?1 AND value = ?2",
            )?;
            let result = stmt.query_row(params![kind_s, value], |row| {
                Ok(Identifier {
                    kind: column_enum(0, row.get(0)?)?,
                    value: row.get(1)?,
                    customer_id: row.get(2)?,
                    verified: row.get(3)?,
                    created_at: row.get(4)?,
                })
            });
            match result {
                Ok(identifier) => Ok(Some(identifier)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Atomically create a customer together with its first identifier.
///
/// Both inserts run in one transaction. A `(kind, value)` collision rolls the
/// customer insert back and surfaces as `IdentityConflict` so the caller can
/// re-fetch the winning row.
pub async fn create_customer_with_identifier(
    db: &Database,
    customer: &Customer,
    identifier: &Identifier,
) -> Result<(), HelplaneError> {
    let customer = customer.clone();
    let identifier = identifier.clone();
    let conflict_kind = identifier.kind;
    let conflict_value = identifier.value.clone();

    let inserted = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO customers (id, email, phone, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    customer.id,
                    customer.email,
                    customer.phone,
                    customer.display_name,
                    customer.created_at,
                ],
            )?;
            let result = tx.execute(
                "INSERT INTO identifiers (kind, value, customer_id, verified, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    identifier.kind.to_string(),
                    identifier.value,
                    identifier.customer_id,
                    identifier.verified,
                    identifier.created_at,
                ],
            );
            match result {
                Ok(_) => {
                    tx.commit()?;
                    Ok(true)
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    tx.rollback()?;
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if inserted {
        Ok(())
    } else {
        Err(HelplaneError::IdentityConflict {
            kind: conflict_kind,
            value: conflict_value,
        })
    }
}

/// Bind an additional identifier to an existing customer.
///
/// Insert-or-ignore: returns `true` when a row was inserted, `false` when the
/// `(kind, value)` pair already existed (bound to whichever customer won).
pub async fn bind_identifier(
    db: &Database,
    identifier: &Identifier,
) -> Result<bool, HelplaneError> {
    let identifier = identifier.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO identifiers (kind, value, customer_id, verified, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    identifier.kind.to_string(),
                    identifier.value,
                    identifier.customer_id,
                    identifier.verified,
                    identifier.created_at,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a customer by id.
pub async fn get_customer(
    db: &Database,
    id: &CustomerId,
) -> Result<Option<Customer>, HelplaneError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<Customer>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, email, phone, display_name, created_at
                 FROM customers WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok(Customer {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    phone: row.get(2)?,
                    display_name: row.get(3)?,
                    created_at: row.get(4)?,
                })
            });
            match result {
                Ok(customer) => Ok(Some(customer)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_customer(id: &str, email: Option<&str>) -> Customer {
        Customer {
            id: id.to_string(),
            email: email.map(String::from),
            phone: None,
            display_name: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn make_identifier(kind: IdentifierKind, value: &str, customer_id: &str) -> Identifier {
        Identifier {
            kind,
            value: value.to_string(),
            customer_id: customer_id.to_string(),
            verified: false,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_find_identifier_roundtrips() {
        let (db, _dir) = setup_db().await;
        let customer = make_customer("cust-1", Some("a@x.com"));
        let identifier = make_identifier(IdentifierKind::Email, "a@x.com", "cust-1");

        create_customer_with_identifier(&db, &customer, &identifier)
            .await
            .unwrap();

        let found = find_identifier(&db, IdentifierKind::Email, "a@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.customer_id, "cust-1");
        assert_eq!(found.kind, IdentifierKind::Email);
        assert!(!found.verified);

        let fetched = get_customer(&db, &CustomerId("cust-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.email.as_deref(), Some("a@x.com"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_unknown_identifier_returns_none() {
        let (db, _dir) = setup_db().await;
        let found = find_identifier(&db, IdentifierKind::Phone, "+15550001")
            .await
            .unwrap();
        assert!(found.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_identifier_conflicts_and_rolls_back_customer() {
        let (db, _dir) = setup_db().await;
        let first = make_customer("cust-1", Some("a@x.com"));
        create_customer_with_identifier(
            &db,
            &first,
            &make_identifier(IdentifierKind::Email, "a@x.com", "cust-1"),
        )
        .await
        .unwrap();

        // Second create with the same (kind, value) must conflict.
        let second = make_customer("cust-2", Some("a@x.com"));
        let err = create_customer_with_identifier(
            &db,
            &second,
            &make_identifier(IdentifierKind::Email, "a@x.com", "cust-2"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HelplaneError::IdentityConflict { .. }));

        // The losing customer row must not survive the rollback.
        let orphan = get_customer(&db, &CustomerId("cust-2".into()))
            .await
            .unwrap();
        assert!(orphan.is_none());

        // The identifier still points at the winner.
        let found = find_identifier(&db, IdentifierKind::Email, "a@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.customer_id, "cust-1");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn same_value_different_kind_does_not_conflict() {
        let (db, _dir) = setup_db().await;
        create_customer_with_identifier(
            &db,
            &make_customer("cust-1", None),
            &make_identifier(IdentifierKind::AnonToken, "shared-value", "cust-1"),
        )
        .await
        .unwrap();

        // The same value under a different kind is a distinct identity.
        create_customer_with_identifier(
            &db,
            &make_customer("cust-2", None),
            &make_identifier(IdentifierKind::Phone, "shared-value", "cust-2"),
        )
        .await
        .unwrap();

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bind_identifier_is_insert_or_ignore() {
        let (db, _dir) = setup_db().await;
        let customer = make_customer("cust-1", Some("a@x.com"));
        create_customer_with_identifier(
            &db,
            &customer,
            &make_identifier(IdentifierKind::Email, "a@x.com", "cust-1"),
        )
        .await
        .unwrap();

        let inserted = bind_identifier(
            &db,
            &make_identifier(IdentifierKind::Phone, "+15550001", "cust-1"),
        )
        .await
        .unwrap();
        assert!(inserted);

        // Binding the same pair again is a no-op, even for another customer.
        let inserted = bind_identifier(
            &db,
            &make_identifier(IdentifierKind::Phone, "+15550001", "cust-9"),
        )
        .await
        .unwrap();
        assert!(!inserted);

        let found = find_identifier(&db, IdentifierKind::Phone, "+15550001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.customer_id, "cust-1");

        db.close().await.unwrap();
    }
}
