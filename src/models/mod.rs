pub mod event;
pub mod group;
pub mod listing;
pub mod payment;
pub mod purchase;
pub mod reservation;
pub mod seat;
pub mod venue;

pub use event::Event;
pub use group::{GroupDetails, GroupMember, GroupPurchase, GroupStatus, MemberStatus};
pub use listing::{ListingStatus, MarketplaceListing};
pub use payment::{PaymentInfo, SavedPaymentMethod};
pub use purchase::Purchase;
pub use reservation::Reservation;
pub use seat::{round_cents, Seat};
pub use venue::Venue;

use thiserror::Error;

/// Raised when a status column holds a value this build does not know.
#[derive(Debug, Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);
