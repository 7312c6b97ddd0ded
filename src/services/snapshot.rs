//! Snapshot loaders for the state machine
//!
//! Relations are read once without locks to learn which swaps are involved,
//! those swaps are locked in id order, and the relations are read again. If
//! the second read disagrees with the first, another writer got in between
//! and the call fails with `CONCURRENT_TARGETING`.

use sqlx::mysql::MySqlConnection;
use uuid::Uuid;

use crate::db;
use crate::machine::acceptance::{AcceptanceSnapshot, RejectionSnapshot};
use crate::machine::lifecycle::ClosureSnapshot;
use crate::machine::targeting::{RemovalSnapshot, TargetingSnapshot};
use crate::machine::{Competing, CurrentTarget};
use crate::models::{Proposal, Swap};
use crate::utils::errors::{AppError, TargetingError};

fn pick(swaps: &[Swap], id: Uuid) -> Option<Swap> {
    swaps.iter().find(|s| s.id == id).cloned()
}

fn require(swaps: &[Swap], id: Uuid) -> Result<Swap, AppError> {
    pick(swaps, id).ok_or_else(|| AppError::swap_not_found(id))
}

/// Where `source_swap_id` points now. Its target must be among `loaded`.
async fn current_target(
    conn: &mut MySqlConnection,
    source_swap_id: Uuid,
    loaded: &[Swap],
    lock: bool,
) -> Result<Option<CurrentTarget>, AppError> {
    let Some(relation) = db::targeting::get_active_relation(conn, source_swap_id, lock).await? else {
        return Ok(None);
    };
    let target = pick(loaded, relation.target_swap_id).ok_or(TargetingError::ConcurrentTargeting)?;
    let proposal = db::proposal::get_proposal(conn, relation.proposal_id, lock)
        .await?
        .ok_or(TargetingError::ConcurrentTargeting)?;
    let other_pending = db::proposal::count_pending_excluding(conn, target.id, proposal.id, lock).await?;

    Ok(Some(CurrentTarget {
        relation,
        proposal,
        target,
        other_pending,
    }))
}

/// Swap ids an operation on `swap_ids` will touch through their outgoing relations
async fn with_outgoing_targets(conn: &mut MySqlConnection, swap_ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
    let mut ids = swap_ids.to_vec();
    for id in swap_ids {
        if let Some(relation) = db::targeting::get_active_relation(conn, *id, false).await? {
            ids.push(relation.target_swap_id);
        }
    }
    Ok(ids)
}

/// Ids of the pending proposals against `swap_id`, locked
async fn pending_ids(conn: &mut MySqlConnection, swap_id: Uuid) -> Result<Vec<Uuid>, AppError> {
    let pending = db::proposal::list_pending_for_target(conn, swap_id, true).await?;
    Ok(pending.into_iter().map(|p| p.id).collect())
}

/// Wrap pending proposals with their relation and proposer swap (locked).
async fn competing(conn: &mut MySqlConnection, proposals: Vec<Proposal>) -> Result<Vec<Competing>, AppError> {
    let source_ids: Vec<Uuid> = proposals.iter().map(|p| p.source_swap_id).collect();
    let sources = db::swap::get_swaps(conn, &source_ids, true).await?;

    let mut out = Vec::with_capacity(proposals.len());
    for proposal in proposals {
        let relation = db::targeting::get_relation_for_proposal(conn, proposal.id, true).await?;
        let source_incoming = pending_ids(conn, proposal.source_swap_id).await?;
        out.push(Competing {
            source: pick(&sources, proposal.source_swap_id),
            relation,
            proposal,
            source_incoming,
        });
    }
    Ok(out)
}

/// Rows for target / retarget, locked when `lock` is set (read-only checks
/// pass `false`).
pub async fn targeting(
    conn: &mut MySqlConnection,
    source_swap_id: Uuid,
    target_swap_id: Uuid,
    lock: bool,
) -> Result<TargetingSnapshot, AppError> {
    let ids = with_outgoing_targets(conn, &[source_swap_id]).await?;
    let ids = [ids, vec![target_swap_id]].concat();
    let swaps = db::swap::get_swaps(conn, &ids, lock).await?;
    let source = require(&swaps, source_swap_id)?;
    let target = require(&swaps, target_swap_id)?;

    let current = current_target(conn, source_swap_id, &swaps, lock).await?;
    let target_auction = db::auction::get_auction(conn, target_swap_id, lock).await?;
    let target_pending = db::proposal::list_pending_for_target(conn, target_swap_id, lock)
        .await?
        .into_iter()
        .filter(|p| p.source_swap_id != source_swap_id)
        .collect();
    let mutual = db::targeting::find_circular_targeting(conn, source_swap_id, target_swap_id, lock).await?;

    Ok(TargetingSnapshot {
        source,
        target,
        target_auction,
        target_pending,
        current,
        mutual,
    })
}

/// Rows for remove-target, locked
pub async fn removal(conn: &mut MySqlConnection, source_swap_id: Uuid) -> Result<RemovalSnapshot, AppError> {
    let ids = with_outgoing_targets(conn, &[source_swap_id]).await?;
    let swaps = db::swap::get_swaps(conn, &ids, true).await?;
    let source = require(&swaps, source_swap_id)?;
    let current = current_target(conn, source_swap_id, &swaps, true).await?;
    let incoming_pending = pending_ids(conn, source_swap_id).await?.len();

    Ok(RemovalSnapshot {
        source,
        current,
        incoming_pending,
    })
}

async fn load_proposal(conn: &mut MySqlConnection, proposal_id: Uuid, lock: bool) -> Result<Proposal, AppError> {
    db::proposal::get_proposal(conn, proposal_id, lock)
        .await?
        .ok_or_else(|| AppError::proposal_not_found(proposal_id))
}

/// Rows for accepting `proposal_id`, locked
pub async fn acceptance(conn: &mut MySqlConnection, proposal_id: Uuid) -> Result<AcceptanceSnapshot, AppError> {
    let seen = load_proposal(conn, proposal_id, false).await?;
    let ids = with_outgoing_targets(conn, &[seen.target_swap_id]).await?;
    let ids = [ids, vec![seen.source_swap_id]].concat();
    let swaps = db::swap::get_swaps(conn, &ids, true).await?;

    let proposal = load_proposal(conn, proposal_id, true).await?;
    let target = require(&swaps, proposal.target_swap_id)?;
    let source = require(&swaps, proposal.source_swap_id)?;
    let relation = db::targeting::get_relation_for_proposal(conn, proposal_id, true).await?;
    let auction = db::auction::get_auction(conn, target.id, true).await?;
    let target_outgoing = current_target(conn, target.id, &swaps, true).await?;

    let siblings = db::proposal::list_pending_for_target(conn, target.id, true)
        .await?
        .into_iter()
        .filter(|p| p.id != proposal_id)
        .collect();
    let siblings = competing(conn, siblings).await?;
    let source_incoming = db::proposal::list_pending_for_target(conn, source.id, true).await?;
    let source_incoming = competing(conn, source_incoming).await?;

    Ok(AcceptanceSnapshot {
        proposal,
        relation,
        target,
        source,
        auction,
        siblings,
        source_incoming,
        target_outgoing,
    })
}

/// Rows for rejecting `proposal_id`, locked
pub async fn rejection(conn: &mut MySqlConnection, proposal_id: Uuid) -> Result<RejectionSnapshot, AppError> {
    let seen = load_proposal(conn, proposal_id, false).await?;
    let swaps = db::swap::get_swaps(conn, &[seen.target_swap_id, seen.source_swap_id], true).await?;

    let proposal = load_proposal(conn, proposal_id, true).await?;
    let target = require(&swaps, proposal.target_swap_id)?;
    let relation = db::targeting::get_relation_for_proposal(conn, proposal_id, true).await?;
    let other_pending = db::proposal::count_pending_excluding(conn, target.id, proposal_id, true).await?;
    let source_incoming = pending_ids(conn, proposal.source_swap_id).await?.len();

    Ok(RejectionSnapshot {
        source: pick(&swaps, proposal.source_swap_id),
        proposal,
        relation,
        target,
        other_pending,
        source_incoming,
    })
}

/// Rows for cancelling or expiring `swap_id`, locked
pub async fn closure(conn: &mut MySqlConnection, swap_id: Uuid) -> Result<ClosureSnapshot, AppError> {
    let ids = with_outgoing_targets(conn, &[swap_id]).await?;
    let swaps = db::swap::get_swaps(conn, &ids, true).await?;
    let swap = require(&swaps, swap_id)?;
    let outgoing = current_target(conn, swap_id, &swaps, true).await?;
    let incoming = db::proposal::list_pending_for_target(conn, swap_id, true).await?;
    let incoming = competing(conn, incoming).await?;

    Ok(ClosureSnapshot {
        swap,
        outgoing,
        incoming,
    })
}
