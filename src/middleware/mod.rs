/// Middleware module
///
/// The global pipeline, outermost first:
/// Recovery → RequestLogger → Cors → TimeoutGuard → RateLimit → routes.
/// `JwtMiddleware` and `RequireRole` are applied per resource.

mod cors;
mod jwt_middleware;
mod logger;
mod rate_limit;
mod recovery;
mod require_role;
mod timeout;

pub use cors::{Cors, SERVICE_VERSION_HEADER};
pub use jwt_middleware::JwtMiddleware;
pub use logger::RequestLogger;
pub use rate_limit::RateLimit;
pub use recovery::Recovery;
pub use require_role::RequireRole;
pub use timeout::TimeoutGuard;
