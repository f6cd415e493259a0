//! Authentication against the hosted auth provider

pub mod middleware;
pub mod session;
pub mod verify;

pub use middleware::{optional_auth, require_auth, AuthError, AuthState, AuthUser};
pub use session::{
    lookup_organization, lookup_profile, SessionContext, SessionRegistry, SessionSnapshot,
};
pub use verify::VerifiedSession;
