use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::auth::SessionState;

/// Role
///
/// The closed set of access tiers. Every profile carries exactly one.
/// Parsing is case-insensitive ("ADMIN" and "admin" are the same tier); the wire form is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// The page each role lands on from the general dashboard.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Student => "/student",
            Role::Teacher => "/teacher",
            Role::Admin => "/admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Access
///
/// The declared requirement of a protected resource. `roles == None` means
/// "any authenticated role".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Access {
    roles: Option<Vec<Role>>,
}

impl Access {
    pub fn authenticated() -> Self {
        Self { roles: None }
    }

    pub fn roles(roles: &[Role]) -> Self {
        Self {
            roles: Some(roles.to_vec()),
        }
    }

    pub fn admits(&self, role: Role) -> bool {
        match &self.roles {
            None => true,
            Some(roles) => roles.contains(&role),
        }
    }
}

/// Why an authenticated caller was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The session carries no role at all.
    MissingRole,
    /// The session role is not one of the closed set.
    InvalidRole(String),
    /// A valid role that the resource does not admit.
    RoleNotPermitted(Role),
}

impl DenyReason {
    /// Query-string code used when a page guard redirects on this reason.
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::MissingRole => "MissingRole",
            DenyReason::InvalidRole(_) => "InvalidRole",
            DenyReason::RoleNotPermitted(_) => "AccessDenied",
        }
    }

    pub fn message(&self) -> String {
        match self {
            DenyReason::MissingRole => "Session has no role".to_string(),
            DenyReason::InvalidRole(raw) => format!("Session role '{}' is not recognised", raw),
            DenyReason::RoleNotPermitted(role) => {
                format!("Role '{}' is not permitted to access this resource", role)
            }
        }
    }
}

/// Verdict
///
/// The outcome of one policy evaluation. Guards map it onto redirects, status codes or
/// render states; the verdict itself is context-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Session resolution has not finished. Take no action yet.
    Pending,
    Unauthenticated,
    Denied(DenyReason),
    Allowed(Role),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pending => "pending",
            Verdict::Unauthenticated => "unauthenticated",
            Verdict::Denied(_) => "denied",
            Verdict::Allowed(_) => "allowed",
        }
    }
}

/// Policy
///
/// The single authorization function shared by the page, API and render guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// When set, the admin role satisfies every allow-list.
    pub admin_override: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            admin_override: true,
        }
    }
}

impl Policy {
    pub fn new(admin_override: bool) -> Self {
        Self { admin_override }
    }

    /// evaluate
    ///
    /// Pure: identical inputs always produce the identical verdict.
    pub fn evaluate(&self, session: &SessionState, access: &Access) -> Verdict {
        let session = match session {
            SessionState::Loading => return Verdict::Pending,
            SessionState::Anonymous => return Verdict::Unauthenticated,
            SessionState::Authenticated(session) => session,
        };

        let role = match session.role.as_deref().map(str::trim) {
            None | Some("") => return Verdict::Denied(DenyReason::MissingRole),
            Some(raw) => match raw.parse::<Role>() {
                Ok(role) => role,
                Err(UnknownRole(raw)) => return Verdict::Denied(DenyReason::InvalidRole(raw)),
            },
        };

        if access.admits(role) || (self.admin_override && role == Role::Admin) {
            Verdict::Allowed(role)
        } else {
            Verdict::Denied(DenyReason::RoleNotPermitted(role))
        }
    }
}
