//! Densely numbered entity references.
//!
//! The code generator hands out small integer identifiers for symbols,
//! labels, loop frames and arena slots instead of passing `String`s or raw
//! `usize`s around. `EntityRef` and `entity_impl!` give every one of those
//! identifier kinds a distinct type while keeping the representation a
//! plain `u32` index, so `PrimaryMap`/`SecondaryMap` can use them as keys
//! without a hash.

mod primary_map;
mod secondary_map;

pub use primary_map::PrimaryMap;
pub use secondary_map::SecondaryMap;

/// A type that can be used as a small dense index into a vector-backed map.
pub trait EntityRef: Copy + Eq {
    /// Create a new entity reference from a linear index.
    fn new(index: usize) -> Self;

    /// Get the index of this reference.
    fn index(self) -> usize;
}

/// Define an entity reference type wrapping a `u32`.
///
/// ```
/// lc_entity::entity_impl!(SymbolId);
/// ```
#[macro_export]
macro_rules! entity_impl {
    ($name:ident) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $crate::EntityRef for $name {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $name {
            /// Create an entity from its raw index without the `EntityRef`
            /// import; convenient at call sites that only need one kind.
            pub fn from_u32(index: u32) -> Self {
                $name(index)
            }

            /// The raw `u32` backing this reference.
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}{}", stringify!($name), self.0)
            }
        }
    };
    ($name:ident, $display_prefix:expr) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $crate::EntityRef for $name {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $name {
            /// Create an entity from its raw index without the `EntityRef`
            /// import; convenient at call sites that only need one kind.
            pub fn from_u32(index: u32) -> Self {
                $name(index)
            }

            /// The raw `u32` backing this reference.
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    entity_impl!(TestRef);

    #[test]
    fn round_trips_index() {
        let r = TestRef::new(7);
        assert_eq!(r.index(), 7);
        assert_eq!(r.to_string(), "TestRef7");
    }
}
