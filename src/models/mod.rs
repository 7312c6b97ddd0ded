//! Domain models for the swap marketplace
//!
//! Each model mirrors one table (or one API payload). Status columns are
//! stored as lowercase text and round-trip through `as_str` / `FromStr`.

/// Declares a text-backed status enum with serde, `Display` and `FromStr`
/// impls that all agree on the same spelling.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

pub mod auction;
pub mod booking;
pub mod proposal;
pub mod swap;
pub mod targeting;

// Re-export commonly used types for convenience
pub use auction::{AcceptanceResult, Auction, AuctionStatus, RejectProposalRequest};
pub use booking::{Booking, BookingStatus, BookingType, CreateBookingRequest};
pub use proposal::{CashOffer, Proposal, ProposalPayload, ProposalStatus};
pub use swap::{AcceptanceStrategy, CreateSwapRequest, PaymentTypes, Swap, SwapStatus, SwapView};
pub use targeting::{
    CanTargetQuery, RemoveTargetRequest, TargetOptions, TargetRequest, TargetingAction,
    TargetingHistoryEntry, TargetingRelation, TargetingResult, TargetingStatus,
    TargetingStatusView, ValidationResult,
};
