use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web_actors::ws;
use messaging::{BrokerError, MessageBroker, MessageHandler, Topics};
use tracing::{debug, error, info, warn};

use crate::hub::{DeliveryError, EvictReason, SessionHub, SessionSink};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound frames a session may have queued before it is evicted.
pub const MAILBOX_CAPACITY: usize = 64;

pub type Hub = SessionHub<Addr<WsSession>>;

/// Raw payload from the user's topic, written to the wire as is.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Frame(pub String);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Evict(pub EvictReason);

impl SessionSink for Addr<WsSession> {
    fn try_deliver(&self, payload: &str) -> Result<(), DeliveryError> {
        self.try_send(Frame(payload.to_string())).map_err(|e| match e {
            SendError::Full(_) => DeliveryError::Full,
            SendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn evict(&self, reason: EvictReason) {
        self.do_send(Evict(reason));
    }
}

pub struct WsSession {
    user_id: i64,
    conn_id: Option<String>,
    hb: Instant,
    hub: Arc<Hub>,
    broker: Arc<dyn MessageBroker>,
    topics: Topics,
}

impl WsSession {
    pub fn new(user_id: i64, hub: Arc<Hub>, broker: Arc<dyn MessageBroker>, topics: Topics) -> Self {
        Self {
            user_id,
            conn_id: None,
            hb: Instant::now(),
            hub,
            broker,
            topics,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!(user_id = act.user_id, "WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    /// Opens the user's bus subscription and attaches it to the hub entry
    /// this session created. If that fails, the whole entry is dropped and
    /// every session on it evicted, so none lingers without a feed.
    fn open_subscription(&self, epoch: u64, ctx: &mut ws::WebsocketContext<Self>) {
        let user_id = self.user_id;
        let topic = self.topics.user(user_id);
        let hub = self.hub.clone();
        let broker = self.broker.clone();

        let fanout: Weak<Hub> = Arc::downgrade(&self.hub);
        let handler: MessageHandler = Arc::new(move |payload: String| {
            if let Some(hub) = fanout.upgrade() {
                hub.broadcast(user_id, &payload);
            }
        });

        let fut = async move {
            let subscription = broker.subscribe(&topic, handler).await?;
            if let Err(stale) = hub.attach(user_id, epoch, subscription) {
                // Every session left while subscribing.
                stale.close().await;
            }
            Ok::<(), BrokerError>(())
        };

        ctx.spawn(fut.into_actor(self).map(move |result, act, ctx| {
            if let Err(e) = result {
                error!(user_id = act.user_id, "Failed to subscribe to user topic: {}", e);
                let sessions = act.hub.detach(act.user_id, epoch);
                if sessions.is_empty() {
                    ctx.stop();
                }
                // Includes this session.
                for session in sessions {
                    session.evict(EvictReason::Unavailable);
                }
            }
        }));
    }

    fn echo(&self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        if serde_json::from_str::<serde_json::Value>(&text).is_err() {
            debug!(user_id = self.user_id, "Ignoring non-JSON frame");
            return;
        }

        let broker = self.broker.clone();
        let topic = self.topics.user(self.user_id);
        let fut = async move { broker.publish(&topic, &text).await };

        ctx.spawn(fut.into_actor(self).map(|result, act, _ctx| {
            if let Err(e) = result {
                warn!(user_id = act.user_id, "Failed to echo client frame: {}", e);
            }
        }));
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(MAILBOX_CAPACITY);
        self.hb(ctx);

        let registration = self.hub.add(self.user_id, ctx.address());
        info!(
            user_id = self.user_id,
            conn_id = %registration.conn_id,
            first = registration.is_first,
            "WebSocket session started"
        );
        if registration.is_first {
            self.open_subscription(registration.epoch, ctx);
        }
        self.conn_id = Some(registration.conn_id);
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        if let Some(conn_id) = self.conn_id.take() {
            let user_id = self.user_id;
            self.hub.remove(user_id, &conn_id, |subscription| {
                debug!(user_id, "Last session closed, releasing user topic");
                if let Some(subscription) = subscription {
                    actix::spawn(subscription.close());
                }
            });
            info!(user_id, conn_id = %conn_id, "WebSocket session stopped");
        }
        Running::Stop
    }
}

impl Handler<Frame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Frame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<Evict> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Evict, ctx: &mut Self::Context) {
        let (code, description) = match msg.0 {
            EvictReason::Overflow => (ws::CloseCode::Policy, "outbound buffer full"),
            EvictReason::Unavailable => (ws::CloseCode::Again, "realtime feed unavailable"),
        };
        ctx.close(Some(ws::CloseReason {
            code,
            description: Some(description.to_string()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.echo(text.to_string(), ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                debug!(user_id = self.user_id, "Ignoring binary frame");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(user_id = self.user_id, "WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{web, App};
    use async_trait::async_trait;
    use authz::JwtValidator;
    use common::Env;
    use futures_util::{SinkExt, Stream, StreamExt};
    use messaging::{InMemoryBroker, Subscription};

    use super::*;
    use crate::handlers::AppState;
    use crate::routes::configure_routes;

    const SECRET: &str = "session-secret";

    fn state(broker: Arc<dyn MessageBroker>) -> AppState {
        AppState {
            hub: Arc::new(Hub::new()),
            broker,
            topics: Topics::new("justjio", Env::Dev),
            validator: JwtValidator::new(SECRET),
        }
    }

    fn serve(state: AppState) -> actix_test::TestServer {
        actix_test::start(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes)
        })
    }

    fn ws_path(user_id: i64) -> String {
        let token = JwtValidator::new(SECRET)
            .issue(user_id, "ann", chrono::Duration::minutes(5))
            .unwrap();
        format!("/ws?token={}", token)
    }

    async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    async fn next_text<S>(conn: &mut S) -> Option<String>
    where
        S: Stream<Item = Result<ws::Frame, ws::ProtocolError>> + Unpin,
    {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), conn.next()).await {
                Ok(Some(Ok(ws::Frame::Text(bytes)))) => {
                    return Some(String::from_utf8_lossy(&bytes).into_owned())
                }
                Ok(Some(Ok(ws::Frame::Ping(_) | ws::Frame::Pong(_)))) => continue,
                _ => return None,
            }
        }
    }

    /// Reads until the server ends the connection and returns the close
    /// code it sent, if any.
    async fn close_code<S>(conn: &mut S) -> Option<ws::CloseCode>
    where
        S: Stream<Item = Result<ws::Frame, ws::ProtocolError>> + Unpin,
    {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), conn.next()).await {
                Ok(Some(Ok(ws::Frame::Close(reason)))) => return reason.map(|r| r.code),
                Ok(Some(Ok(_))) => continue,
                _ => return None,
            }
        }
    }

    /// Accepts nothing: every subscribe fails after a short delay.
    struct UnreachableBroker;

    #[async_trait]
    impl MessageBroker for UnreachableBroker {
        async fn publish(&self, _topic: &str, _payload: &str) -> Result<(), BrokerError> {
            Err(BrokerError::Closed)
        }

        async fn subscribe(
            &self,
            _topic: &str,
            _handler: MessageHandler,
        ) -> Result<Subscription, BrokerError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Err(BrokerError::Closed)
        }
    }

    #[actix_web::test]
    async fn test_sessions_of_one_user_share_a_subscription() {
        let broker = Arc::new(InMemoryBroker::new());
        let state = state(broker.clone());
        let hub = state.hub.clone();
        let topic = state.topics.user(7);
        let mut srv = serve(state);

        let mut a = srv.ws_at(&ws_path(7)).await.unwrap();
        let mut b = srv.ws_at(&ws_path(7)).await.unwrap();
        assert!(wait_until(|| hub.session_count() == 2 && broker.subscriber_count(&topic) == 1).await);

        let frame = r#"{"kind":"chat","content":"hi"}"#;
        broker.publish(&topic, frame).await.unwrap();
        assert_eq!(next_text(&mut a).await.as_deref(), Some(frame));
        assert_eq!(next_text(&mut b).await.as_deref(), Some(frame));

        // Only JSON frames are echoed, and they reach every session of the user.
        a.send(ws::Message::Text("not json".into())).await.unwrap();
        a.send(ws::Message::Text(r#"{"typing":true}"#.into())).await.unwrap();
        assert_eq!(next_text(&mut b).await.as_deref(), Some(r#"{"typing":true}"#));
        assert_eq!(next_text(&mut a).await.as_deref(), Some(r#"{"typing":true}"#));

        a.send(ws::Message::Close(None)).await.unwrap();
        assert!(wait_until(|| hub.session_count() == 1).await);
        assert_eq!(broker.subscriber_count(&topic), 1);

        b.send(ws::Message::Close(None)).await.unwrap();
        assert!(wait_until(|| hub.user_count() == 0 && broker.subscriber_count(&topic) == 0).await);
    }

    #[actix_web::test]
    async fn test_failed_subscribe_evicts_every_session_of_the_user() {
        let state = state(Arc::new(UnreachableBroker));
        let hub = state.hub.clone();
        let mut srv = serve(state);

        let mut a = srv.ws_at(&ws_path(9)).await.unwrap();
        assert!(wait_until(|| hub.session_count() == 1).await);
        let mut b = srv.ws_at(&ws_path(9)).await.unwrap();
        assert!(wait_until(|| hub.session_count() == 2).await);

        assert_eq!(close_code(&mut a).await, Some(ws::CloseCode::Again));
        assert_eq!(close_code(&mut b).await, Some(ws::CloseCode::Again));
        assert!(wait_until(|| hub.user_count() == 0 && hub.session_count() == 0).await);
    }
}
