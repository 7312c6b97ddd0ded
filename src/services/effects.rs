use sqlx::mysql::MySqlConnection;
use tracing::{debug, warn};

use crate::api::Sinks;
use crate::db;
use crate::machine::{Effect, LedgerRecord, Notice};
use crate::utils::errors::AppError;

/// Sink work that waits for the transaction to commit
#[derive(Debug, Default)]
pub struct Deferred {
    notices: Vec<Notice>,
    records: Vec<LedgerRecord>,
}

impl Deferred {
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty() && self.records.is_empty()
    }

    pub fn extend(&mut self, other: Deferred) {
        self.notices.extend(other.notices);
        self.records.extend(other.records);
    }
}

#[derive(Debug, Default)]
pub struct Applied {
    pub escrow_id: Option<String>,
    pub deferred: Deferred,
}

/// Apply storage effects in order on `conn` (inside the caller's transaction).
/// Escrow creation happens here too, so its failure rolls everything back.
pub async fn apply(conn: &mut MySqlConnection, sinks: &Sinks, effects: Vec<Effect>) -> Result<Applied, AppError> {
    let mut applied = Applied::default();

    for effect in effects {
        match effect {
            Effect::InsertProposal { proposal, exclusive } => {
                db::proposal::insert_proposal(conn, &proposal, exclusive).await?;
            }
            Effect::SetProposalStatus {
                proposal_id,
                status,
                reason,
                at,
            } => {
                db::proposal::set_status(conn, proposal_id, status, reason.as_deref(), at).await?;
            }
            Effect::InsertRelation(relation) => {
                db::targeting::insert_relation(conn, &relation).await?;
            }
            Effect::SetRelationStatus { relation_id, status, at } => {
                db::targeting::set_relation_status(conn, relation_id, status, at).await?;
            }
            Effect::SetSwapStatus { swap_id, status, at } => {
                db::swap::set_status(conn, swap_id, status, at).await?;
            }
            Effect::SetBookingStatus { booking_id, status } => {
                db::booking::update_status(conn, booking_id, status).await?;
            }
            Effect::SaveAuction(auction) => {
                db::auction::save_auction(conn, &auction).await?;
            }
            Effect::ConvertToFirstMatch { swap_id, at } => {
                db::swap::convert_to_first_match(conn, swap_id, at).await?;
            }
            Effect::AppendHistory(entry) => {
                db::targeting::append_history(conn, &entry).await?;
            }
            Effect::CreateEscrow(request) => {
                applied.escrow_id = Some(sinks.payments.create_escrow(&request).await?);
            }
            Effect::Notify(notice) => applied.deferred.notices.push(notice),
            Effect::Notarize(record) => applied.deferred.records.push(record),
        }
    }

    Ok(applied)
}

/// Hand committed notices and ledger records to the sinks in the background.
/// Failures are logged once the retry policy gives up.
pub fn dispatch(sinks: &Sinks, deferred: Deferred) {
    if deferred.is_empty() {
        return;
    }
    let sinks = sinks.clone();

    tokio::spawn(async move {
        for notice in &deferred.notices {
            if let Err(e) = sinks.notifications.send(notice).await {
                warn!(
                    kind = notice.kind(),
                    recipient = %notice.recipient(),
                    error = %e,
                    "Notification not delivered"
                );
            }
        }
        for record in &deferred.records {
            match sinks.notary.record(record).await {
                Ok(Some(transaction_id)) => {
                    debug!(event = record.event, swap_id = %record.swap_id, %transaction_id, "Notarized");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(event = record.event, swap_id = %record.swap_id, error = %e, "Notarization failed");
                }
            }
        }
    });
}
