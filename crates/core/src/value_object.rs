//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; to
/// "modify" one, construct a new one. A validated `Quantity` is the typical
/// example: two quantities of 5 are the same quantity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
