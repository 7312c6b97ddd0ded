//! Auction window rules and timeout handling

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use super::{Actor, Effect, LedgerRecord, Notice};
use crate::models::{Auction, AuctionStatus, Proposal, Swap, TargetingAction};
use crate::utils::errors::{AppError, TargetingError};

/// Auctions must close this many days before check-in
pub const LAST_MINUTE_WINDOW_DAYS: i64 = 7;
pub const MAX_AUTO_SELECT_HOURS: u32 = 168;

/// Where an auction stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionPhase {
    /// Taking proposals.
    Open,
    /// End date passed but the sweep has not marked it ended yet.
    EndDue,
    /// Ended; the owner may still pick a winner.
    AwaitingSelection,
    /// Ended and the owner's selection window has lapsed.
    SelectionDue,
    /// Resolved or converted.
    Settled,
}

pub fn phase(auction: &Auction, now: DateTime<Utc>) -> AuctionPhase {
    match auction.status {
        AuctionStatus::Active if now < auction.end_date => AuctionPhase::Open,
        AuctionStatus::Active => AuctionPhase::EndDue,
        AuctionStatus::Ended => match auction.selection_deadline() {
            Some(deadline) if now < deadline => AuctionPhase::AwaitingSelection,
            _ => AuctionPhase::SelectionDue,
        },
        AuctionStatus::Resolved | AuctionStatus::Converted => AuctionPhase::Settled,
    }
}

/// Check an auction window when the swap is listed.
pub fn validate_auction_window(
    end_date: DateTime<Utc>,
    auto_select_after_hours: u32,
    check_in: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if end_date <= now {
        return Err(AppError::validation(
            "INVALID_AUCTION_END_DATE",
            "Auction end date must be in the future",
        ));
    }
    if auto_select_after_hours == 0 || auto_select_after_hours > MAX_AUTO_SELECT_HOURS {
        return Err(AppError::validation(
            "INVALID_AUTO_SELECT_WINDOW",
            format!("autoSelectAfterHours must be between 1 and {}", MAX_AUTO_SELECT_HOURS),
        ));
    }
    if end_date > check_in - Duration::days(LAST_MINUTE_WINDOW_DAYS) {
        return Err(TargetingError::LastMinuteRestriction.into());
    }
    Ok(())
}

/// Pick the auto-selected winner among pending proposals: highest cash offer
/// first, cash before booking exchanges, then earliest submission, then id.
/// Winners in `passed_over` could not be accepted and are skipped.
pub fn select_winner<'a>(proposals: &'a [Proposal], passed_over: &[Uuid]) -> Option<&'a Proposal> {
    proposals
        .iter()
        .filter(|p| p.is_pending() && !passed_over.contains(&p.id))
        .min_by(|a, b| rank(a, b))
}

fn rank(a: &Proposal, b: &Proposal) -> Ordering {
    let by_cash = match (a.cash_amount(), b.cash_amount()) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_cash
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Mark an active auction ended once its end date has passed.
pub fn plan_end(auction: &Auction, now: DateTime<Utc>) -> Option<Auction> {
    (phase(auction, now) == AuctionPhase::EndDue).then(|| Auction {
        status: AuctionStatus::Ended,
        ended_at: Some(now),
        ..auction.clone()
    })
}

/// An ended auction nobody bid on becomes a first-match listing.
pub fn plan_conversion(
    auction: &Auction,
    swap: &Swap,
    pending: &[Proposal],
    now: DateTime<Utc>,
) -> Result<Vec<Effect>, AppError> {
    if phase(auction, now) != AuctionPhase::SelectionDue {
        return Err(AppError::validation(
            "AUCTION_NOT_DUE",
            "Auction is not due for automatic resolution",
        ));
    }
    if pending.iter().any(Proposal::is_pending) {
        return Err(AppError::validation(
            "AUCTION_HAS_PROPOSALS",
            "Auction with pending proposals must be resolved, not converted",
        ));
    }

    let converted = Auction {
        status: AuctionStatus::Converted,
        ..auction.clone()
    };
    Ok(vec![
        Effect::SaveAuction(converted),
        Effect::ConvertToFirstMatch { swap_id: swap.id, at: now },
        Effect::history(
            swap.id,
            swap.id,
            None,
            TargetingAction::Expired,
            Actor::System,
            json!({ "auction": "converted_to_first_match" }),
            now,
        ),
        Effect::Notify(Notice::AuctionConverted {
            recipient_id: swap.owner_id,
            swap_id: swap.id,
        }),
        Effect::Notarize(LedgerRecord {
            event: "auction_converted",
            swap_id: swap.id,
            proposal_id: None,
            payload: json!({ "endDate": auction.end_date }),
            recorded_at: now,
        }),
    ])
}
