use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse, Result};
use authz::current_user;
use common::ApiResponse;
use messaging::{MessageBroker, Topics};
use serde::Serialize;
use serde_json::json;

use crate::domain::{
    ConsolidateRequest, CreateBillRequest, CreateRoomRequest, CreateSubscriptionRequest,
    InviteUsersRequest, MessageQuery, PageQuery, RespondInviteRequest, RoomQuery, SendMessageRequest,
    TransactionQuery,
};
use crate::repo::Store;
use crate::service::{
    BillService, MessageService, NotificationService, RoomService, SettlementService,
};
use crate::worker::PushQueue;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub rooms: RoomService,
    pub bills: BillService,
    pub settlement: SettlementService,
    pub messages: MessageService,
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn MessageBroker>, topics: Topics, push: PushQueue) -> Self {
        let notifications =
            NotificationService::new(store.clone(), broker.clone(), topics.clone(), push);
        Self {
            rooms: RoomService::new(store.clone()),
            bills: BillService::new(store.clone()),
            settlement: SettlementService::new(store.clone(), notifications.clone()),
            messages: MessageService::new(store.clone(), broker, topics),
            notifications,
            store,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    database: &'static str,
}

// Health check endpoint (no auth required)
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!("Health check: database unreachable: {}", e);
            "unhealthy"
        }
    };

    ApiResponse::ok(
        "ok",
        HealthResponse {
            status: if database == "healthy" { "healthy" } else { "degraded" },
            service: "api-service",
            version: env!("CARGO_PKG_VERSION"),
            database,
        },
    )
}

// Bills

pub async fn create_bill(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateBillRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let bill = state.bills.create_bill(claims.user_id, body.into_inner()).await?;
    Ok(ApiResponse::created("Bill created", bill))
}

pub async fn get_bills(state: web::Data<AppState>, query: web::Query<RoomQuery>) -> Result<HttpResponse> {
    let bills = state.bills.get_bills(&query.room_id).await?;
    Ok(ApiResponse::ok("Bills retrieved", bills))
}

pub async fn delete_room_bills(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<RoomQuery>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let deleted = state
        .bills
        .delete_room_bills(&query.room_id, claims.user_id)
        .await?;
    Ok(ApiResponse::ok("Bills deleted", json!({ "deleted": deleted })))
}

pub async fn consolidate_bills(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ConsolidateRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let consolidation = state
        .settlement
        .consolidate_room(&body.room_id, claims.user_id)
        .await?;
    Ok(ApiResponse::ok("Bills consolidated", consolidation))
}

pub async fn is_consolidated(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let consolidated = state.bills.is_consolidated(&path).await?;
    Ok(ApiResponse::ok(
        "Consolidation status retrieved",
        json!({ "isConsolidated": consolidated }),
    ))
}

// Transactions

pub async fn get_transactions(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<TransactionQuery>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let transactions = state
        .settlement
        .transactions_for_user(claims.user_id, query.is_paid)
        .await?;
    Ok(ApiResponse::ok("Transactions retrieved", transactions))
}

pub async fn settle_transaction(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let transaction = state
        .settlement
        .settle_transaction(path.into_inner(), claims.user_id)
        .await?;
    Ok(ApiResponse::ok("Transaction settled", transaction))
}

// Rooms

pub async fn get_rooms(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let rooms = state.rooms.get_rooms(claims.user_id, query.page).await?;
    Ok(ApiResponse::ok("Rooms retrieved", rooms))
}

pub async fn count_rooms(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let count = state.rooms.count_rooms(claims.user_id).await?;
    Ok(ApiResponse::ok("Rooms counted", json!({ "count": count })))
}

pub async fn create_room(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateRoomRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let room = state.rooms.create_room(claims.user_id, body.into_inner()).await?;
    Ok(ApiResponse::created("Room created", room))
}

pub async fn get_pending_invites(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let invites = state.rooms.pending_invites(claims.user_id).await?;
    Ok(ApiResponse::ok("Invites retrieved", invites))
}

pub async fn count_pending_invites(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let count = state.rooms.count_pending_invites(claims.user_id).await?;
    Ok(ApiResponse::ok("Invites counted", json!({ "count": count })))
}

pub async fn get_room(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let room = state.rooms.get_room(&path, claims.user_id).await?;
    Ok(ApiResponse::ok("Room retrieved", room))
}

pub async fn get_room_members(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let members = state.rooms.get_members(&path, claims.user_id).await?;
    Ok(ApiResponse::ok("Members retrieved", members))
}

pub async fn invite_users(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<InviteUsersRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let invites = state
        .rooms
        .invite_users(&path, claims.user_id, &body.invitees)
        .await?;
    Ok(ApiResponse::created("Users invited", invites))
}

pub async fn respond_to_invite(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RespondInviteRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    state
        .rooms
        .respond_to_invite(&path, claims.user_id, body.accept)
        .await?;
    let message = if body.accept { "Invite accepted" } else { "Invite rejected" };
    Ok(ApiResponse::ok(message, json!({ "accept": body.accept })))
}

pub async fn join_room(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let room = state.rooms.join_room(&path, claims.user_id).await?;
    Ok(ApiResponse::ok("Joined room", room))
}

pub async fn leave_room(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    state.rooms.leave_room(&path, claims.user_id).await?;
    Ok(ApiResponse::ok("Left room", json!({ "roomId": path.as_str() })))
}

pub async fn close_room(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    state.rooms.close_room(&path, claims.user_id).await?;
    Ok(ApiResponse::ok("Room closed", json!({ "roomId": path.as_str() })))
}

pub async fn remove_member(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let (room_id, user_id) = path.into_inner();
    state
        .rooms
        .remove_member(&room_id, claims.user_id, user_id)
        .await?;
    Ok(ApiResponse::ok("Member removed", json!({ "roomId": room_id, "userId": user_id })))
}

// Messages

pub async fn send_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let message = state
        .messages
        .send_message(&path, claims.user_id, body.into_inner().content)
        .await?;
    Ok(ApiResponse::created("Message sent", message))
}

pub async fn get_messages(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<MessageQuery>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let page = state
        .messages
        .get_messages(&path, claims.user_id, query.page, query.asc.unwrap_or(false))
        .await?;
    Ok(ApiResponse::ok("Messages retrieved", page))
}

pub async fn get_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let (room_id, message_id) = path.into_inner();
    let message = state
        .messages
        .get_message(&room_id, &message_id, claims.user_id)
        .await?;
    Ok(ApiResponse::ok("Message retrieved", message))
}

// Notifications

pub async fn get_notifications(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let notifications = state.notifications.get_notifications(claims.user_id).await?;
    Ok(ApiResponse::ok("Notifications retrieved", notifications))
}

pub async fn mark_notification_read(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let id = path.into_inner();
    state.notifications.mark_read(id, claims.user_id).await?;
    Ok(ApiResponse::ok("Notification marked as read", json!({ "id": id })))
}

pub async fn create_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let subscription = state
        .notifications
        .create_subscription(claims.user_id, body.into_inner())
        .await?;
    Ok(ApiResponse::created("Subscription created", subscription))
}

pub async fn delete_subscription(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    state
        .notifications
        .delete_subscription(&path, claims.user_id)
        .await?;
    Ok(ApiResponse::ok("Subscription deleted", json!({ "id": path.as_str() })))
}
