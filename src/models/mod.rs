//! Domain records and API payloads.
//!
//! Every struct that crosses the HTTP boundary derives `TS` (exported into
//! `bindings/` for the client layer) and `ToSchema` (OpenAPI). Structs mapped
//! to tables additionally derive `FromRow`.

pub mod caf;
pub mod dashboard;
pub mod equipment;
pub mod issue;
pub mod organization;
pub mod person;

pub use caf::*;
pub use dashboard::*;
pub use equipment::*;
pub use issue::*;
pub use organization::*;
pub use person::*;
