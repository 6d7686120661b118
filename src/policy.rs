//! Access policy evaluated before a handler runs.
//!
//! Rules are checked in order and the first match allows the request:
//!
//! 1. IAM principals, assumed roles and admins.
//! 2. Paths under `/public/`.
//! 3. Read-only verbs for callers with read access.
//! 4. Callers with write access.
//!
//! `options` requests never reach the policy.

use crate::capability::Capabilities;
use crate::traits::{Method, Sensitivity};

const PUBLIC_PREFIX: &str = "/public/";

/// Whether `path` belongs to the unauthenticated surface.
pub fn is_public_path(path: &str) -> bool {
    path.starts_with(PUBLIC_PREFIX)
}

/// Whether `caps` may call `method` on `path`.
pub fn authorize(
    _method: Method,
    path: &str,
    sensitivity: Sensitivity,
    caps: &Capabilities,
) -> bool {
    if caps.is_assumed_role() || caps.is_iam_principal() || caps.is_admin() {
        return true;
    }

    if is_public_path(path) {
        return true;
    }

    if sensitivity == Sensitivity::ReadOnly && caps.has_read_access() {
        return true;
    }

    caps.has_write_access()
}
