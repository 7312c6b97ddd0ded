//! Booking records (the reservation a swap wraps)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum BookingType {
        Hotel => "hotel",
        Flight => "flight",
        Rental => "rental",
        Event => "event",
    }
}

text_enum! {
    /// Availability of a booking as seen by the swap subsystem.
    pub enum BookingStatus {
        Available => "available",
        SwapInProgress => "swap_in_progress",
        SaleInProgress => "sale_in_progress",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub booking_type: BookingType,
    pub title: String,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/bookings`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub booking_type: BookingType,
    pub title: String,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
}
