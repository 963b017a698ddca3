/// Middleware module
///
/// Request-scoped middleware for the HTTP surface.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
