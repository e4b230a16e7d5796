//! Request authentication
//!
//! - [`token_cache`] - tokens pushed by the user service
//! - [`validator`] - JWT verification for tokens not (yet) cached
//! - [`provider`] - ordered provider chain
//! - [`middleware`] - axum layer and ownership check

pub mod middleware;
pub mod provider;
pub mod token_cache;
pub mod validator;

pub use middleware::{bearer_auth_middleware, ensure_owner};
pub use provider::{AuthChain, AuthSource, AuthenticatedUser, IdentityProvider};
pub use token_cache::{CachedToken, TokenCache, strip_bearer};
pub use validator::{Claims, TokenValidator};
