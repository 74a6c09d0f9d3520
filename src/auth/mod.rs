//! Bearer-token authentication with exact-match role checks.
//!
//! Protected endpoints take an [`Auth`] extractor. It resolves the access
//! token through the [`AccessGuard`](crate::guard::AccessGuard) and, when a
//! role constraint is given, requires that exact role.

mod bearer;
mod errors;
mod extractors;
mod ip;
mod state;

pub use bearer::bearer_token;
pub use errors::ApiAuthError;
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint};
pub use ip::extract_client_ip;
pub use state::HasAuthBackend;
