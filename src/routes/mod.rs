//! Routers split by access level. `authenticated` and `admin` are wrapped in the auth
//! middleware by `create_router`; `public` is not.

/// Health check, carrier registration and login.
pub mod public;

/// Everything behind a valid token. Per-record authorization happens in the handlers.
pub mod authenticated;

/// Platform operator endpoints, nested under `/admin`. Handlers require a superuser.
pub mod admin;
