//! Authentication state trait and macro.

use crate::guard::AccessGuard;

/// Trait for state types that can authenticate bearer tokens.
pub trait HasAuthBackend {
    fn guard(&self) -> &AccessGuard;
}

/// Macro to implement `HasAuthBackend` for state structs with a
/// `guard: AccessGuard` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub guard: AccessGuard,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn guard(&self) -> &$crate::guard::AccessGuard {
                &self.guard
            }
        }
    };
}
