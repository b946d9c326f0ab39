use serde::{Deserialize, Serialize};

/// Declares an integer identifier newtype.
///
/// Identifiers are assigned by the owning service and copied verbatim into
/// every replica, so they are plain sequence numbers rather than UUIDs.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Global member identifier, assigned by the member service.
    MemberId
);
entity_id!(
    /// Order identifier, assigned by the market service.
    OrderId
);
entity_id!(
    /// Order line identifier, assigned by the market service.
    OrderItemId
);
entity_id!(
    /// Product identifier referenced by order lines.
    ProductId
);
entity_id!(
    /// Payout identifier, assigned by the payout service.
    PayoutId
);
entity_id!(
    /// Payout candidate item identifier, assigned by the payout service.
    PayoutCandidateItemId
);
entity_id!(
    /// Post identifier, assigned by the post service.
    PostId
);
entity_id!(
    /// Post comment identifier, assigned by the post service.
    PostCommentId
);

/// Monotonic id allocator used by the owning service of an entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    last: u64,
}

impl Sequence {
    /// Creates a sequence whose first allocated value is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next value.
    pub fn next_value(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Returns the last allocated value (0 if none).
    pub fn last(&self) -> u64 {
        self.last
    }
}
