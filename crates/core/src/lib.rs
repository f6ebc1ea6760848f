//! `trellis-core` — domain foundation building blocks.
//!
//! Pure domain primitives shared by the auth and provisioning crates. Nothing
//! in here performs IO.

pub mod aggregate;
pub mod email;
pub mod error;
pub mod event;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot};
pub use email::EmailAddress;
pub use error::{DomainError, DomainResult};
pub use event::Event;
pub use id::RegistrationId;
pub use value_object::ValueObject;
