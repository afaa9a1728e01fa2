//! In-memory store for service tests.
//!
//! A unit of work holds the store lock for its whole lifetime and works on
//! a staged copy of the state, so units of work are serialisable and an
//! uncommitted one leaves no trace.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AppError, AppResult};
use settlement::Transfer;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::*;
use crate::domain::*;

#[derive(Debug, Clone, Default)]
pub struct State {
    pub users: BTreeMap<i64, String>,
    pub rooms: BTreeMap<String, Room>,
    pub members: BTreeMap<String, BTreeSet<i64>>,
    pub invites: Vec<Invite>,
    pub bills: Vec<Bill>,
    pub consolidations: Vec<Consolidation>,
    pub transactions: Vec<Transaction>,
    pub messages: Vec<Message>,
    pub notifications: Vec<Notification>,
    pub subscriptions: Vec<PushSubscription>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_transaction_insert: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, id: i64, username: &str) {
        self.state.lock().await.users.insert(id, username.to_string());
    }

    pub async fn snapshot(&self) -> State {
        self.state.lock().await.clone()
    }

    /// Makes the next transaction inserts fail, to exercise rollback.
    pub fn fail_transaction_insert(&self, fail: bool) {
        self.fail_transaction_insert.store(fail, Ordering::SeqCst);
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
    fail_transaction_insert: bool,
}

impl MemoryTx {
    fn open_rooms_of(&self, user_id: i64) -> Vec<Room> {
        let rooms = &self.staged.rooms;
        self.staged
            .members
            .iter()
            .filter(|(_, members)| members.contains(&user_id))
            .filter_map(|(room_id, _)| rooms.get(room_id))
            .filter(|room| !room.is_closed)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            fail_transaction_insert: self.fail_transaction_insert.load(Ordering::SeqCst),
        }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryTx {
    async fn existing_user_ids(&mut self, ids: &[i64]) -> AppResult<Vec<i64>> {
        Ok(ids
            .iter()
            .copied()
            .filter(|id| self.staged.users.contains_key(id))
            .collect())
    }

    async fn find_username(&mut self, user_id: i64) -> AppResult<Option<String>> {
        Ok(self.staged.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl RoomRepository for MemoryTx {
    async fn insert_room(&mut self, room: &Room) -> AppResult<()> {
        self.staged.rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn find_room(&mut self, room_id: &str) -> AppResult<Option<Room>> {
        Ok(self.staged.rooms.get(room_id).cloned())
    }

    async fn lock_room(&mut self, room_id: &str) -> AppResult<Option<Room>> {
        self.find_room(room_id).await
    }

    async fn close_room(&mut self, room_id: &str) -> AppResult<()> {
        if let Some(room) = self.staged.rooms.get_mut(room_id) {
            room.is_closed = true;
            room.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn rooms_for_user(&mut self, user_id: i64, offset: i64, limit: i64) -> AppResult<Vec<Room>> {
        let mut rooms = self.open_rooms_of(user_id);
        rooms.sort_by(|a, b| (b.updated_at, &b.id).cmp(&(a.updated_at, &a.id)));
        Ok(rooms
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_rooms_for_user(&mut self, user_id: i64) -> AppResult<i64> {
        Ok(self.open_rooms_of(user_id).len() as i64)
    }

    async fn add_member(&mut self, room_id: &str, user_id: i64) -> AppResult<()> {
        let inserted = self
            .staged
            .members
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id);
        if !inserted {
            return Err(AppError::Database("duplicate room member".to_string()));
        }
        Ok(())
    }

    async fn remove_member(&mut self, room_id: &str, user_id: i64) -> AppResult<bool> {
        Ok(self
            .staged
            .members
            .get_mut(room_id)
            .map(|members| members.remove(&user_id))
            .unwrap_or(false))
    }

    async fn is_member(&mut self, room_id: &str, user_id: i64) -> AppResult<bool> {
        Ok(self
            .staged
            .members
            .get(room_id)
            .is_some_and(|members| members.contains(&user_id)))
    }

    async fn member_ids(&mut self, room_id: &str) -> AppResult<Vec<i64>> {
        Ok(self
            .staged
            .members
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn members(&mut self, room_id: &str) -> AppResult<Vec<RoomMember>> {
        let ids = self.member_ids(room_id).await?;
        Ok(ids
            .into_iter()
            .filter_map(|user_id| {
                self.staged.users.get(&user_id).map(|username| RoomMember {
                    user_id,
                    username: username.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl InvitationRepository for MemoryTx {
    async fn insert_invite(&mut self, room_id: &str, user_id: i64, inviter_id: i64) -> AppResult<Invite> {
        let invite = Invite {
            id: self.staged.next_id(),
            room_id: room_id.to_string(),
            user_id,
            inviter_id,
            status: InviteStatus::Pending,
            created_at: Utc::now(),
        };
        self.staged.invites.push(invite.clone());
        Ok(invite)
    }

    async fn pending_invite(&mut self, room_id: &str, user_id: i64) -> AppResult<Option<Invite>> {
        Ok(self
            .staged
            .invites
            .iter()
            .find(|i| i.room_id == room_id && i.user_id == user_id && i.status == InviteStatus::Pending)
            .cloned())
    }

    async fn set_invite_status(&mut self, invite_id: i64, status: InviteStatus) -> AppResult<()> {
        if let Some(invite) = self.staged.invites.iter_mut().find(|i| i.id == invite_id) {
            invite.status = status;
        }
        Ok(())
    }

    async fn delete_pending_invites(&mut self, room_id: &str) -> AppResult<u64> {
        let before = self.staged.invites.len();
        self.staged
            .invites
            .retain(|i| !(i.room_id == room_id && i.status == InviteStatus::Pending));
        Ok((before - self.staged.invites.len()) as u64)
    }

    async fn pending_invites_for_user(&mut self, user_id: i64) -> AppResult<Vec<Invite>> {
        Ok(self
            .staged
            .invites
            .iter()
            .filter(|i| i.user_id == user_id && i.status == InviteStatus::Pending)
            .cloned()
            .collect())
    }

    async fn count_pending_invites_for_user(&mut self, user_id: i64) -> AppResult<i64> {
        Ok(self.pending_invites_for_user(user_id).await?.len() as i64)
    }
}

#[async_trait]
impl BillRepository for MemoryTx {
    async fn insert_bill(&mut self, bill: &NewBill) -> AppResult<Bill> {
        let stored = Bill {
            id: self.staged.next_id(),
            room_id: bill.room_id.clone(),
            owner_id: bill.owner_id,
            name: bill.name.clone(),
            amount: bill.amount,
            include_owner: bill.include_owner,
            payers: bill.payers.clone(),
            consolidation_id: None,
            created_at: Utc::now(),
        };
        self.staged.bills.push(stored.clone());
        Ok(stored)
    }

    async fn bills_for_room(&mut self, room_id: &str) -> AppResult<Vec<Bill>> {
        Ok(self
            .staged
            .bills
            .iter()
            .filter(|b| b.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn delete_room_bills(&mut self, room_id: &str) -> AppResult<u64> {
        let before = self.staged.bills.len();
        self.staged.bills.retain(|b| b.room_id != room_id);
        Ok((before - self.staged.bills.len()) as u64)
    }

    async fn consolidation_status(&mut self, room_id: &str) -> AppResult<ConsolidationStatus> {
        let bills = self.staged.bills.iter().filter(|b| b.room_id == room_id);
        let (total, consolidated) = bills.fold((0, 0), |(t, c), b| {
            (t + 1, c + i64::from(b.consolidation_id.is_some()))
        });
        Ok(ConsolidationStatus::from_counts(total, consolidated))
    }

    async fn insert_consolidation(&mut self, room_id: &str) -> AppResult<Consolidation> {
        let consolidation = Consolidation {
            id: self.staged.next_id(),
            room_id: room_id.to_string(),
            created_at: Utc::now(),
        };
        self.staged.consolidations.push(consolidation.clone());
        Ok(consolidation)
    }

    async fn assign_consolidation(&mut self, room_id: &str, consolidation_id: i64) -> AppResult<u64> {
        let mut updated = 0;
        for bill in self.staged.bills.iter_mut().filter(|b| b.room_id == room_id) {
            bill.consolidation_id = Some(consolidation_id);
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl TransactionRepository for MemoryTx {
    async fn insert_transactions(&mut self, transfers: &[Transfer]) -> AppResult<()> {
        if self.fail_transaction_insert {
            return Err(AppError::Database("injected failure".to_string()));
        }
        for t in transfers {
            let id = self.staged.next_id();
            self.staged.transactions.push(Transaction {
                id,
                consolidation_id: t.consolidation_id,
                payer_id: t.payer_id,
                payee_id: t.payee_id,
                amount: t.amount,
                is_paid: false,
                paid_at: None,
            });
        }
        Ok(())
    }

    async fn lock_transaction(&mut self, transaction_id: i64) -> AppResult<Option<Transaction>> {
        Ok(self
            .staged
            .transactions
            .iter()
            .find(|t| t.id == transaction_id)
            .cloned())
    }

    async fn mark_paid(&mut self, transaction_id: i64, paid_at: DateTime<Utc>) -> AppResult<()> {
        if let Some(t) = self.staged.transactions.iter_mut().find(|t| t.id == transaction_id) {
            t.is_paid = true;
            t.paid_at = Some(paid_at);
        }
        Ok(())
    }

    async fn transactions_for_user(&mut self, user_id: i64, is_paid: bool) -> AppResult<Vec<Transaction>> {
        Ok(self
            .staged
            .transactions
            .iter()
            .filter(|t| t.is_paid == is_paid && (t.payer_id == user_id || t.payee_id == user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageRepository for MemoryTx {
    async fn insert_message(&mut self, message: &Message) -> AppResult<()> {
        self.staged.messages.push(message.clone());
        Ok(())
    }

    async fn find_message(&mut self, room_id: &str, message_id: &str) -> AppResult<Option<Message>> {
        Ok(self
            .staged
            .messages
            .iter()
            .find(|m| m.room_id == room_id && m.id == message_id)
            .cloned())
    }

    async fn count_messages(&mut self, room_id: &str) -> AppResult<i64> {
        Ok(self.staged.messages.iter().filter(|m| m.room_id == room_id).count() as i64)
    }

    async fn messages_page(
        &mut self,
        room_id: &str,
        offset: i64,
        limit: i64,
        asc: bool,
    ) -> AppResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .staged
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| (a.sent_at, &a.id).cmp(&(b.sent_at, &b.id)));
        if !asc {
            messages.reverse();
        }
        Ok(messages
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl NotificationRepository for MemoryTx {
    async fn insert_notification(&mut self, user_id: i64, title: &str, content: &str) -> AppResult<Notification> {
        let notification = Notification {
            id: self.staged.next_id(),
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        self.staged.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn notifications_for_user(&mut self, user_id: i64) -> AppResult<Vec<Notification>> {
        let mut out: Vec<Notification> = self
            .staged
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn mark_notification_read(&mut self, notification_id: i64, user_id: i64) -> AppResult<bool> {
        match self
            .staged
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
        {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn subscriptions_for_user(&mut self, user_id: i64) -> AppResult<Vec<PushSubscription>> {
        Ok(self
            .staged
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_subscription(&mut self, subscription: &PushSubscription) -> AppResult<PushSubscription> {
        if let Some(existing) = self
            .staged
            .subscriptions
            .iter_mut()
            .find(|s| s.endpoint == subscription.endpoint)
        {
            existing.user_id = subscription.user_id;
            existing.auth = subscription.auth.clone();
            existing.p256dh = subscription.p256dh.clone();
            return Ok(existing.clone());
        }
        self.staged.subscriptions.push(subscription.clone());
        Ok(subscription.clone())
    }

    async fn delete_subscription(&mut self, subscription_id: &str, user_id: i64) -> AppResult<bool> {
        let before = self.staged.subscriptions.len();
        self.staged
            .subscriptions
            .retain(|s| !(s.id == subscription_id && s.user_id == user_id));
        Ok(self.staged.subscriptions.len() < before)
    }
}
