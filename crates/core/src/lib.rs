//! `keystone-core`: shared domain building blocks.
//!
//! Identifiers, the domain error model, optimistic concurrency primitives and
//! the clock abstraction. Nothing in here performs IO.

pub mod aggregate;
pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DocumentTypeId, PermissionId, RefreshTokenId, RoleId, UserId};
pub use value_object::ValueObject;
