//! Shared vocabulary for the marketplace services.

pub mod clock;
pub mod dto;
pub mod money;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dto::{
    ADMIN_USERNAME, HOLDING_USERNAME, MemberDto, OrderDto, OrderItemDto, PayoutDto,
    PostCommentDto, PostDto, SYSTEM_USERNAME,
};
pub use money::Money;
pub use types::{
    MemberId, OrderId, OrderItemId, PayoutCandidateItemId, PayoutId, PostCommentId, PostId,
    ProductId, Sequence,
};
