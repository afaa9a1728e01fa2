use std::collections::BTreeSet;
use std::sync::Arc;

use common::{AppError, AppResult, Conflict, Forbidden};
use tracing::info;

use crate::domain::{
    page_offset, ConsolidationStatus, CreateRoomRequest, Invite, InviteStatus, Room, RoomMember,
    RoomResponse, ROOM_PAGE_SIZE,
};
use crate::repo::{Store, StoreTx};

/// Room lifecycle: membership, invitations and closing.
///
/// Every mutation locks the room row first, so membership changes and
/// status checks for one room never interleave.
#[derive(Clone)]
pub struct RoomService {
    store: Arc<dyn Store>,
}

impl RoomService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_room(&self, host_id: i64, req: CreateRoomRequest) -> AppResult<RoomResponse> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid("room name is required"));
        }
        let invitees = distinct_invitees(&req.invitees, host_id);

        let mut tx = self.store.begin().await?;
        ensure_users_exist(tx.as_mut(), &invitees).await?;

        let room = Room::new(name, host_id, req.is_private);
        tx.insert_room(&room).await?;
        tx.add_member(&room.id, host_id).await?;
        for user_id in &invitees {
            tx.insert_invite(&room.id, *user_id, host_id).await?;
        }
        let members = tx.members(&room.id).await?;
        tx.commit().await?;

        info!(room_id = %room.id, host_id, invites = invitees.len(), "Room created");
        Ok(RoomResponse { room, members })
    }

    pub async fn get_room(&self, room_id: &str, caller_id: i64) -> AppResult<RoomResponse> {
        let mut tx = self.store.begin().await?;
        let room = find(tx.as_mut(), room_id).await?;
        if !tx.is_member(room_id, caller_id).await? {
            return Err(Forbidden::NotInRoom.into());
        }
        let members = tx.members(room_id).await?;
        tx.commit().await?;
        Ok(RoomResponse { room, members })
    }

    /// Open rooms of the user, most recently updated first, in pages of six.
    pub async fn get_rooms(&self, user_id: i64, page: Option<i64>) -> AppResult<Vec<Room>> {
        let offset = page_offset(page.unwrap_or(1), ROOM_PAGE_SIZE)?;
        let mut tx = self.store.begin().await?;
        let rooms = tx.rooms_for_user(user_id, offset, ROOM_PAGE_SIZE).await?;
        tx.commit().await?;
        Ok(rooms)
    }

    pub async fn count_rooms(&self, user_id: i64) -> AppResult<i64> {
        let mut tx = self.store.begin().await?;
        let count = tx.count_rooms_for_user(user_id).await?;
        tx.commit().await?;
        Ok(count)
    }

    pub async fn get_members(&self, room_id: &str, caller_id: i64) -> AppResult<Vec<RoomMember>> {
        Ok(self.get_room(room_id, caller_id).await?.members)
    }

    pub async fn pending_invites(&self, user_id: i64) -> AppResult<Vec<Invite>> {
        let mut tx = self.store.begin().await?;
        let invites = tx.pending_invites_for_user(user_id).await?;
        tx.commit().await?;
        Ok(invites)
    }

    pub async fn count_pending_invites(&self, user_id: i64) -> AppResult<i64> {
        let mut tx = self.store.begin().await?;
        let count = tx.count_pending_invites_for_user(user_id).await?;
        tx.commit().await?;
        Ok(count)
    }

    pub async fn invite_users(&self, room_id: &str, host_id: i64, invitees: &[i64]) -> AppResult<Vec<Invite>> {
        let invitees = distinct_invitees(invitees, host_id);
        if invitees.is_empty() {
            return Err(AppError::invalid("at least one invitee is required"));
        }

        let mut tx = self.store.begin().await?;
        let room = lock_open(tx.as_mut(), room_id).await?;
        if !room.is_host(host_id) {
            return Err(Forbidden::NotHost.into());
        }
        ensure_users_exist(tx.as_mut(), &invitees).await?;

        let mut invites = Vec::with_capacity(invitees.len());
        for user_id in invitees {
            if tx.is_member(room_id, user_id).await? {
                return Err(Conflict::AlreadyInRoom.into());
            }
            if tx.pending_invite(room_id, user_id).await?.is_some() {
                return Err(Conflict::AlreadyInvited.into());
            }
            invites.push(tx.insert_invite(room_id, user_id, host_id).await?);
        }
        tx.commit().await?;

        info!(room_id, count = invites.len(), "Users invited");
        Ok(invites)
    }

    /// Accepting adds the caller to the room; rejecting only records it.
    pub async fn respond_to_invite(&self, room_id: &str, user_id: i64, accept: bool) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        lock_open(tx.as_mut(), room_id).await?;

        let invite = tx
            .pending_invite(room_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("invite"))?;

        if accept {
            tx.set_invite_status(invite.id, InviteStatus::Accepted).await?;
            if !tx.is_member(room_id, user_id).await? {
                tx.add_member(room_id, user_id).await?;
            }
        } else {
            tx.set_invite_status(invite.id, InviteStatus::Rejected).await?;
        }
        tx.commit().await?;

        info!(room_id, user_id, accept, "Invite answered");
        Ok(())
    }

    /// Public rooms are open to anyone; private rooms need a pending invite,
    /// which joining consumes.
    pub async fn join_room(&self, room_id: &str, user_id: i64) -> AppResult<RoomResponse> {
        let mut tx = self.store.begin().await?;
        let room = lock_open(tx.as_mut(), room_id).await?;
        if tx.is_member(room_id, user_id).await? {
            return Err(Conflict::AlreadyInRoom.into());
        }

        match tx.pending_invite(room_id, user_id).await? {
            Some(invite) => tx.set_invite_status(invite.id, InviteStatus::Accepted).await?,
            None if room.is_private => return Err(Forbidden::NotInvited.into()),
            None => {}
        }
        tx.add_member(room_id, user_id).await?;
        let members = tx.members(room_id).await?;
        tx.commit().await?;

        info!(room_id, user_id, "User joined room");
        Ok(RoomResponse { room, members })
    }

    pub async fn leave_room(&self, room_id: &str, user_id: i64) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let room = lock_open(tx.as_mut(), room_id).await?;
        if room.is_host(user_id) {
            return Err(Forbidden::HostCannotLeave.into());
        }
        if tx.consolidation_status(room_id).await? == ConsolidationStatus::Unconsolidated {
            return Err(Conflict::UnconsolidatedBills.into());
        }
        if !tx.remove_member(room_id, user_id).await? {
            return Err(Forbidden::NotInRoom.into());
        }
        tx.commit().await?;

        info!(room_id, user_id, "User left room");
        Ok(())
    }

    pub async fn remove_member(&self, room_id: &str, host_id: i64, user_id: i64) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let room = lock_open(tx.as_mut(), room_id).await?;
        if !room.is_host(host_id) {
            return Err(Forbidden::NotHost.into());
        }
        if room.is_host(user_id) {
            return Err(Forbidden::HostCannotLeave.into());
        }
        if tx.consolidation_status(room_id).await? == ConsolidationStatus::Unconsolidated {
            return Err(Conflict::UnconsolidatedBills.into());
        }
        if !tx.remove_member(room_id, user_id).await? {
            return Err(AppError::not_found("member"));
        }
        tx.commit().await?;

        info!(room_id, user_id, "Member removed");
        Ok(())
    }

    /// Closes the room for good. Pending invites are dropped.
    pub async fn close_room(&self, room_id: &str, host_id: i64) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let room = lock_open(tx.as_mut(), room_id).await?;
        if !room.is_host(host_id) {
            return Err(Forbidden::NotHost.into());
        }
        if tx.consolidation_status(room_id).await? == ConsolidationStatus::Unconsolidated {
            return Err(Conflict::UnconsolidatedBills.into());
        }

        tx.close_room(room_id).await?;
        let dropped = tx.delete_pending_invites(room_id).await?;
        tx.commit().await?;

        info!(room_id, dropped_invites = dropped, "Room closed");
        Ok(())
    }
}

fn distinct_invitees(invitees: &[i64], host_id: i64) -> Vec<i64> {
    invitees
        .iter()
        .copied()
        .filter(|id| *id != host_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn ensure_users_exist(tx: &mut dyn StoreTx, ids: &[i64]) -> AppResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    if tx.existing_user_ids(ids).await?.len() != ids.len() {
        return Err(AppError::not_found("user"));
    }
    Ok(())
}

async fn find(tx: &mut dyn StoreTx, room_id: &str) -> AppResult<Room> {
    tx.find_room(room_id)
        .await?
        .ok_or_else(|| AppError::not_found("room"))
}

async fn find_locked(tx: &mut dyn StoreTx, room_id: &str) -> AppResult<Room> {
    tx.lock_room(room_id)
        .await?
        .ok_or_else(|| AppError::not_found("room"))
}

async fn lock_open(tx: &mut dyn StoreTx, room_id: &str) -> AppResult<Room> {
    let room = find_locked(tx, room_id).await?;
    if room.is_closed {
        return Err(Conflict::RoomClosed.into());
    }
    Ok(room)
}
