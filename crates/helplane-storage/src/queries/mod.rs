// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod conversations;
pub mod customers;
pub mod deliveries;
pub mod messages;
pub mod metrics;
pub mod queue;
pub mod tickets;

use std::str::FromStr;

/// Map a TEXT column into one of the closed enum types.
pub(crate) fn column_enum<T: FromStr>(idx: usize, value: String) -> Result<T, rusqlite::Error> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized enum value: {value}").into(),
        )
    })
}

/// Map an optional TEXT column into one of the closed enum types.
pub(crate) fn column_enum_opt<T: FromStr>(
    idx: usize,
    value: Option<String>,
) -> Result<Option<T>, rusqlite::Error> {
    value.map(|v| column_enum(idx, v)).transpose()
}
