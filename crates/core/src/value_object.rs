//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are never mutated in place; a validated
/// username or email address is one. Construction is where validation happens,
/// so holding a value object means the value already passed its policy.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
