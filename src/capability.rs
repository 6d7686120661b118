//! Caller capabilities derived from authorizer claims.
//!
//! The authorizer hands over loosely-typed claims; [`Capabilities::from_request`]
//! turns them into a flat, immutable set of flags once per request and
//! rejects malformed claims with `Unauthorized`.
//!
//! # Derivation
//!
//! | Source | Effect |
//! |--------|--------|
//! | group `Admins` | `is_admin` |
//! | identity `userArn` containing `:assumed-role/` | `is_assumed_role` |
//! | identity `userArn` containing `:user/` | `is_iam_principal` |
//! | group `<site>` | write (and read) access to `<site>` |
//! | group `<site>_read` | read access to `<site>` |
//!
//! The tenant is the `siteId` query parameter when given, otherwise the
//! caller's only site group, otherwise `default` when the caller belongs
//! to it.

use serde_json::Value;

use crate::event::ApiRequest;
use crate::response::ApiError;

const ADMIN_GROUP: &str = "Admins";
const READ_SUFFIX: &str = "_read";
const GROUPS_CLAIM: &str = "cognito:groups";
const USERNAME_CLAIM: &str = "cognito:username";

/// Resolved access rights of the current caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    is_admin: bool,
    is_iam_principal: bool,
    is_assumed_role: bool,
    has_read_access: bool,
    has_write_access: bool,
    site_id: Option<String>,
    username: Option<String>,
}

impl Capabilities {
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_iam_principal(&self) -> bool {
        self.is_iam_principal
    }

    pub fn is_assumed_role(&self) -> bool {
        self.is_assumed_role
    }

    pub fn has_read_access(&self) -> bool {
        self.has_read_access
    }

    pub fn has_write_access(&self) -> bool {
        self.has_write_access
    }

    /// Tenant the request operates on.
    pub fn site_id(&self) -> Option<&str> {
        self.site_id.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Derives capabilities from the request's authorizer block, identity,
    /// and `siteId` query parameter.
    pub fn from_request(request: &ApiRequest) -> Result<Self, ApiError> {
        let claims = parse_claims(request.request_context.authorizer.as_ref())?;
        let groups = match claims.and_then(|c| c.get(GROUPS_CLAIM)) {
            Some(v) => parse_groups(v)?,
            None => Vec::new(),
        };
        let username = match claims.and_then(|c| c.get(USERNAME_CLAIM)) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(_) => return Err(malformed("cognito:username must be a string")),
        };

        let user_arn = request
            .request_context
            .identity
            .as_ref()
            .and_then(|i| i.get("userArn"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let is_admin = groups.iter().any(|g| g == ADMIN_GROUP);
        let site_groups: Vec<&str> = groups
            .iter()
            .map(String::as_str)
            .filter(|g| *g != ADMIN_GROUP)
            .collect();

        let site_id = resolve_site(request.query("siteId"), &site_groups);
        let (has_read_access, has_write_access) = match site_id.as_deref() {
            Some(site) => {
                let write = site_groups.contains(&site);
                let read_group = format!("{}{}", site, READ_SUFFIX);
                let read = write || site_groups.contains(&read_group.as_str());
                (read, write)
            }
            None => (false, false),
        };

        Ok(Self {
            is_admin,
            is_iam_principal: user_arn.contains(":user/"),
            is_assumed_role: user_arn.contains(":assumed-role/"),
            has_read_access,
            has_write_access,
            site_id,
            username,
        })
    }

    /// Capabilities of a caller whose claims are not consulted: no access
    /// flags, tenant taken from the `siteId` query parameter only.
    pub fn anonymous(request: &ApiRequest) -> Self {
        Self {
            site_id: resolve_site(request.query("siteId"), &[]),
            ..Self::default()
        }
    }

    /// Capabilities with only the given flags set; intended for tests and
    /// callers that authenticate out of band.
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::default()
    }
}

fn malformed(detail: &str) -> ApiError {
    ApiError::Unauthorized(format!("invalid authorizer claims: {}", detail))
}

fn parse_claims(authorizer: Option<&Value>) -> Result<Option<&serde_json::Map<String, Value>>, ApiError> {
    let Some(claims) = authorizer.and_then(|a| a.get("claims")) else {
        return Ok(None);
    };
    match claims {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        _ => Err(malformed("claims must be an object")),
    }
}

/// Accepts `["a","b"]`, `"[a b]"`, `"a,b"` and `"a"`.
fn parse_groups(value: &Value) -> Result<Vec<String>, ApiError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| malformed("cognito:groups must contain only strings"))
            })
            .collect(),
        Value::String(s) => Ok(s
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()),
        _ => Err(malformed("cognito:groups must be a string or array")),
    }
}

fn resolve_site(requested: Option<&str>, site_groups: &[&str]) -> Option<String> {
    if let Some(site) = requested.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(site.to_string());
    }

    let mut sites: Vec<&str> = site_groups
        .iter()
        .map(|g| g.strip_suffix(READ_SUFFIX).unwrap_or(g))
        .collect();
    sites.sort_unstable();
    sites.dedup();

    match sites.as_slice() {
        [only] => Some(only.to_string()),
        _ if sites.contains(&docgate_core::models::DEFAULT_SITE_ID) => {
            Some(docgate_core::models::DEFAULT_SITE_ID.to_string())
        }
        _ => None,
    }
}

/// Builder returned by [`Capabilities::builder`].
#[derive(Debug, Default)]
pub struct CapabilitiesBuilder {
    inner: Capabilities,
}

impl CapabilitiesBuilder {
    pub fn admin(mut self) -> Self {
        self.inner.is_admin = true;
        self
    }

    pub fn iam_principal(mut self) -> Self {
        self.inner.is_iam_principal = true;
        self
    }

    pub fn assumed_role(mut self) -> Self {
        self.inner.is_assumed_role = true;
        self
    }

    pub fn read(mut self) -> Self {
        self.inner.has_read_access = true;
        self
    }

    pub fn write(mut self) -> Self {
        self.inner.has_write_access = true;
        self
    }

    pub fn site(mut self, site_id: &str) -> Self {
        self.inner.site_id = Some(site_id.to_string());
        self
    }

    pub fn build(self) -> Capabilities {
        self.inner
    }
}
