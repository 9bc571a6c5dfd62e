//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Roles, permissions and refresh tokens are entities: they are looked up and
/// referenced by id, never embedded in one another.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
