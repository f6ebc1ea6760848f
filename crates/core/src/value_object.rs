//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "change" one, construct a new value. An `EmailAddress` is a value object:
/// two addresses with the same normalized text are the same address.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
