// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Helplane support engine.
//!
//! Layered TOML loading via Figment (defaults < system < user < local < env)
//! with a startup validation pass for values that parse but cannot work.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::HelplaneConfig;
pub use validation::validate;
