mod acl_checker;
mod authorization;


pub use acl_checker::{AclChecker, AclCheckerOptions};
pub use authorization::Authorization;

use ldp_lib::vocab;
use oxrdf::NamedNodeRef;
use thiserror::Error;

/// Access mode being requested for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    Append,
    Control,
}

impl AccessMode {
    pub fn as_iri(&self) -> NamedNodeRef<'static> {
        match self {
            AccessMode::Read => vocab::acl::READ,
            AccessMode::Write => vocab::acl::WRITE,
            AccessMode::Append => vocab::acl::APPEND,
            AccessMode::Control => vocab::acl::CONTROL,
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AccessMode::Read => "Read",
            AccessMode::Write => "Write",
            AccessMode::Append => "Append",
            AccessMode::Control => "Control",
        };
        write!(f, "{}", name)
    }
}

/// Why an access check did not grant.
#[derive(Error, Debug, Clone)]
pub enum WacError {
    #[error("access to {0} requires authorization")]
    Unauthenticated(String),
    #[error("access denied for {0}")]
    Forbidden(String),
    #[error("no access control policy found for {0}")]
    PolicyMissing(String),
    #[error("error resolving access control policy: {0}")]
    PolicyUnreadable(String),
}

impl WacError {
    /// HTTP status this denial maps to. An unreachable or malformed policy
    /// chain is a server misconfiguration, not an access decision.
    pub fn status(&self) -> u16 {
        match self {
            WacError::Unauthenticated(_) => 401,
            WacError::Forbidden(_) => 403,
            WacError::PolicyMissing(_) => 500,
            WacError::PolicyUnreadable(_) => 500,
        }
    }

    // Compound checks report the most specific denial observed.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            WacError::Unauthenticated(_) => 1,
            WacError::Forbidden(_) => 2,
            WacError::PolicyMissing(_) => 3,
            WacError::PolicyUnreadable(_) => 3,
        }
    }
}

pub type WacResult<T> = std::result::Result<T, WacError>;
