//! Connection-identity fingerprinting.
//!
//! A deterministic hash of `(url, username, password)`, used to detect
//! that pool configuration has drifted since a record was issued
//! (`connection_type_code` in the data model).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Compute a stable fingerprint of the connection identity triple.
#[must_use]
pub fn connection_type_code(url: &str, username: Option<&str>, password: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    username.unwrap_or("").hash(&mut hasher);
    password.unwrap_or("").hash(&mut hasher);
    hasher.finish()
}
