//! Identity for the gateway: bearer-token verification, the auth gate placed in
//! front of protected routes, and the per-request context handed to resolvers.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod verifier;
mod gate;
mod request_context;

pub use principal::Principal;
pub use verifier::{AuthError, Claims, DenyAllVerifier, JwtVerifier, TokenVerifier};
pub use gate::{auth_gate, bearer_token, unauthorized, AuthDecision, AuthGate};
pub use request_context::{RequestContext, ResponseHeaders};
