//! # Game Server
//!
//! The request boundary. A transport (not part of this crate) owns one
//! [`Session`] per connection and feeds decoded [`Request`]s to
//! [`GameServer::dispatch`]; the server resolves the caller, runs exactly one
//! operation on one service and answers with a [`Response`] whose payload
//! echoes the request parameters.
//!
//! Routes:
//!
//! | route                   | needs role | operation                              |
//! |-------------------------|------------|----------------------------------------|
//! | `chat.login`            | no         | verify token, create role row, enter world chat |
//! | `chat.join`             | yes        | join / switch alliance channel         |
//! | `chat.history`          | yes        | channel history snapshot               |
//! | `chat.chat`             | yes        | post and fan out                       |
//! | `chat.exit`             | yes        | leave one channel                      |
//! | `chat.logOut`           | yes        | leave every channel                    |
//! | `nationMap.config`      | no         | build catalogue                        |
//! | `nationMap.scanBlock`   | yes        | sites in a block                       |
//! | `nationMap.build`       | yes        | claim or upgrade a site                |
//! | `nationMap.giveUp`      | yes        | start relinquishing a site             |
//! | `nationMap.cancelGiveUp`| yes        | keep a site after all                  |

pub mod protocol;
mod services;

use std::sync::Arc;

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::chat::ChatUser;
use crate::config::Config;
use crate::error::{GameError, StatusCode};
use crate::territory::{BuildSite, Region};
use crate::types::{ChannelKind, PlayerId};

pub use protocol::{Reply, Request, Response, Validate};
pub use services::GameServices;

use protocol::*;

/// Per-connection state. The role id is bound by `chat.login`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    player_id: Option<PlayerId>,
    nick_name: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn nick_name(&self) -> Option<&str> {
        self.nick_name.as_deref()
    }

    pub fn bind(&mut self, player_id: PlayerId, nick_name: &str) {
        self.player_id = Some(player_id);
        self.nick_name = Some(nick_name.to_string());
    }

    pub fn clear(&mut self) {
        self.player_id = None;
        self.nick_name = None;
    }
}

/// Login token check, supplied by the authentication service.
pub trait IdentityResolver: Send + Sync {
    fn verify(&self, player_id: PlayerId, token: &str) -> bool;
}

impl<F> IdentityResolver for F
where
    F: Fn(PlayerId, &str) -> bool + Send + Sync,
{
    fn verify(&self, player_id: PlayerId, token: &str) -> bool {
        self(player_id, token)
    }
}

/// Outbound transport for server-initiated messages.
pub trait PushSink: Send + Sync {
    fn push(&self, recipients: &[PlayerId], name: &str, msg: &Value);
}

/// Sink used when no transport is attached; pushes are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPushSink;

impl PushSink for LogPushSink {
    fn push(&self, recipients: &[PlayerId], name: &str, _msg: &Value) {
        debug!("push {} to {} recipients", name, recipients.len());
    }
}

pub struct GameServer {
    config: Arc<Config>,
    services: GameServices,
    identity: Arc<dyn IdentityResolver>,
    push: Arc<dyn PushSink>,
}

impl GameServer {
    pub fn new(
        config: Arc<Config>,
        services: GameServices,
        identity: Arc<dyn IdentityResolver>,
        push: Arc<dyn PushSink>,
    ) -> Self {
        Self {
            config,
            services,
            identity,
            push,
        }
    }

    pub fn services(&self) -> &GameServices {
        &self.services
    }

    /// Route one request by name.
    pub fn dispatch(&self, session: &mut Session, request: Request) -> Response {
        let Request { seq, name, msg } = request;
        let reply = match name.as_str() {
            CHAT_LOGIN => self.route(&msg, |req| self.login(session, req)),
            CHAT_JOIN => self.route(&msg, |req| self.join(session, req)),
            CHAT_HISTORY => self.route(&msg, |req| self.history(session, req)),
            CHAT_CHAT => self.route(&msg, |req| self.chat(session, req)),
            CHAT_EXIT => self.route(&msg, |req| self.exit(session, req)),
            CHAT_LOGOUT => self.route(&msg, |req| self.log_out(session, req)),
            MAP_CONFIG => self.route(&msg, |req| self.map_config(req)),
            MAP_SCAN_BLOCK => self.route(&msg, |req| self.scan_block(session, req)),
            MAP_BUILD => self.route(&msg, |req| self.build(session, req)),
            MAP_GIVE_UP => self.route(&msg, |req| self.give_up(session, req)),
            MAP_CANCEL_GIVE_UP => self.route(&msg, |req| self.cancel_give_up(session, req)),
            other => {
                warn!("unknown route {}", other);
                Reply::with(StatusCode::InvalidParam, msg.clone())
            }
        };
        if !reply.is_ok() {
            debug!("{} seq {} -> {:?}", name, seq, reply.code);
        }
        Response {
            seq,
            name,
            code: reply.code,
            msg: reply.msg,
        }
    }

    /// Decode and validate `msg`, then run the handler. A request that fails
    /// either step is answered with `InvalidParam` and its raw payload.
    fn route<Q, R>(&self, msg: &Value, handler: impl FnOnce(Q) -> Reply<R>) -> Reply<Value>
    where
        Q: DeserializeOwned + Validate,
        R: Serialize,
    {
        let mut req: Q = match protocol::decode(msg) {
            Ok(req) => req,
            Err(e) => return Reply::from_error(&e, msg.clone()),
        };
        if let Err(e) = req.validate(&self.config) {
            debug!("rejected request: {}", e);
            return Reply::from_error(&e, msg.clone());
        }
        let reply = handler(req);
        Reply::with(reply.code, to_value(&reply.msg))
    }

    fn require_role<T>(session: &Session, echo: &T) -> Result<PlayerId, Reply<T>>
    where
        T: Clone,
    {
        session
            .player_id()
            .ok_or_else(|| Reply::with(StatusCode::InvalidParam, echo.clone()))
    }

    // ------------------------------------------------------------------
    // chat.*
    // ------------------------------------------------------------------

    pub fn login(&self, session: &mut Session, req: LoginReq) -> Reply<LoginRsp> {
        let rsp = LoginRsp {
            rid: req.rid,
            nick_name: req.nick_name.clone(),
        };
        if !self.identity.verify(req.rid, &req.token) {
            warn!("chat login rejected for player {}", req.rid);
            return Reply::with(StatusCode::InvalidParam, rsp);
        }
        if let Err(e) = self.services.roles.ensure_exists(req.rid) {
            return Reply::from_error(&e, rsp);
        }
        self.services
            .chat
            .login(ChatUser::new(req.rid, &req.nick_name));
        session.bind(req.rid, &req.nick_name);
        Reply::ok(rsp)
    }

    pub fn join(&self, session: &Session, req: JoinReq) -> Reply<JoinRsp> {
        let rid = match Self::require_role(session, &req) {
            Ok(rid) => rid,
            Err(reply) => return reply,
        };
        if req.channel == ChannelKind::Alliance {
            if let Err(e) = self.services.chat.join_alliance(rid, req.id) {
                return Reply::from_error(&e, req);
            }
        }
        Reply::ok(req)
    }

    pub fn history(&self, session: &Session, req: ChannelReq) -> Reply<HistoryRsp> {
        let mut rsp = HistoryRsp {
            channel: req.channel,
            msgs: Vec::new(),
        };
        let Some(rid) = session.player_id() else {
            return Reply::with(StatusCode::InvalidParam, rsp);
        };
        rsp.msgs = self.services.chat.history(rid, req.channel);
        Reply::ok(rsp)
    }

    /// Post a line. A sender outside the channel gets `OK` with no message.
    pub fn chat(&self, session: &Session, req: ChatReq) -> Reply<ChatRsp> {
        let mut rsp = ChatRsp {
            channel: req.channel,
            msg: req.msg.clone(),
            message: None,
        };
        let Some(rid) = session.player_id() else {
            return Reply::with(StatusCode::InvalidParam, rsp);
        };
        if let Some(delivery) = self.services.chat.send(rid, req.channel, &req.msg) {
            self.push
                .push(&delivery.recipients, CHAT_PUSH, &to_value(&delivery.message));
            rsp.message = Some(delivery.message);
        }
        Reply::ok(rsp)
    }

    pub fn exit(&self, session: &Session, req: ChannelReq) -> Reply<ExitRsp> {
        let rid = match Self::require_role(session, &req) {
            Ok(rid) => rid,
            Err(reply) => return reply,
        };
        self.services.chat.exit(rid, req.channel);
        Reply::ok(req)
    }

    pub fn log_out(&self, session: &mut Session, req: LogoutReq) -> Reply<LogoutRsp> {
        let rid = match Self::require_role(session, &req) {
            Ok(rid) => rid,
            Err(reply) => return reply,
        };
        if req.rid != 0 && req.rid != rid {
            warn!("player {} asked to log out player {}", rid, req.rid);
            return Reply::with(StatusCode::InvalidParam, req);
        }
        self.services.chat.log_out(rid);
        session.clear();
        Reply::ok(LogoutRsp { rid })
    }

    // ------------------------------------------------------------------
    // nationMap.*
    // ------------------------------------------------------------------

    pub fn map_config(&self, _req: ConfigReq) -> Reply<ConfigRsp> {
        let confs = self
            .services
            .territory
            .catalogue()
            .iter()
            .map(BuildConf::from)
            .collect();
        Reply::ok(ConfigRsp { confs })
    }

    pub fn scan_block(&self, session: &Session, req: ScanBlockReq) -> Reply<ScanRsp> {
        let mut rsp = ScanRsp {
            x: req.x,
            y: req.y,
            length: req.length,
            sites: Vec::new(),
        };
        if session.player_id().is_none() {
            return Reply::with(StatusCode::InvalidParam, rsp);
        }
        rsp.sites = self
            .services
            .territory
            .scan_block(Region::new(req.x, req.y, req.length));
        Reply::ok(rsp)
    }

    pub fn build(&self, session: &Session, req: BuildReq) -> Reply<BuildRsp> {
        let mut rsp = BuildRsp {
            x: req.x,
            y: req.y,
            kind: req.kind,
            site: None,
        };
        let Some(rid) = session.player_id() else {
            return Reply::with(StatusCode::InvalidParam, rsp);
        };
        match self
            .services
            .territory
            .construct(rid, req.x, req.y, req.kind)
        {
            Ok(site) => {
                rsp.site = Some(site);
                Reply::ok(rsp)
            }
            Err(e) => Reply::from_error(&e, rsp),
        }
    }

    pub fn give_up(&self, session: &Session, req: PositionReq) -> Reply<GiveUpRsp> {
        self.position_op(session, req, |rid, x, y| {
            self.services.territory.relinquish(rid, x, y)
        })
    }

    pub fn cancel_give_up(&self, session: &Session, req: PositionReq) -> Reply<GiveUpRsp> {
        self.position_op(session, req, |rid, x, y| {
            self.services.territory.cancel_relinquish(rid, x, y)
        })
    }

    fn position_op(
        &self,
        session: &Session,
        req: PositionReq,
        op: impl FnOnce(PlayerId, i32, i32) -> Result<BuildSite, GameError>,
    ) -> Reply<GiveUpRsp> {
        let mut rsp = GiveUpRsp {
            x: req.x,
            y: req.y,
            deadline: None,
        };
        let Some(rid) = session.player_id() else {
            return Reply::with(StatusCode::InvalidParam, rsp);
        };
        match op(rid, req.x, req.y) {
            Ok(site) => {
                rsp.deadline = site.relinquish_deadline;
                Reply::ok(rsp)
            }
            Err(e) => Reply::from_error(&e, rsp),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!("Failed to encode response payload: {}", e);
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResourceKind, StructureKind};
    use serde_json::json;

    fn server() -> GameServer {
        let mut config = Config::default();
        config.world.width = 10;
        config.world.height = 10;
        let config = Arc::new(config);
        let services = GameServices::in_memory(&config).expect("services");
        GameServer::new(
            config,
            services,
            Arc::new(|_rid: PlayerId, token: &str| token == "good"),
            Arc::new(LogPushSink),
        )
    }

    fn login(server: &GameServer, rid: PlayerId) -> Session {
        let mut session = Session::new();
        let rsp = server.dispatch(
            &mut session,
            Request::new(1, CHAT_LOGIN, json!({"rid": rid, "nickName": format!("p{}", rid), "token": "good"})),
        );
        assert_eq!(rsp.code, StatusCode::Ok);
        session
    }

    #[test]
    fn bad_token_is_invalid_param() {
        let server = server();
        let mut session = Session::new();
        let rsp = server.dispatch(
            &mut session,
            Request::new(1, CHAT_LOGIN, json!({"rid": 3, "nickName": "x", "token": "bad"})),
        );
        assert_eq!(rsp.code, StatusCode::InvalidParam);
        assert_eq!(rsp.msg["rid"], 3);
        assert!(session.player_id().is_none());
    }

    #[test]
    fn role_routes_need_a_login() {
        let server = server();
        let mut session = Session::new();
        let rsp = server.dispatch(
            &mut session,
            Request::new(2, MAP_BUILD, json!({"x": 1, "y": 1, "type": "fortress"})),
        );
        assert_eq!(rsp.code, StatusCode::InvalidParam);
        assert_eq!(rsp.msg["x"], 1);
        assert!(!server.services().territory.position_build(1, 1).unwrap().is_owned());
    }

    #[test]
    fn unknown_route_echoes_payload() {
        let server = server();
        let mut session = Session::new();
        let rsp = server.dispatch(&mut session, Request::new(9, "nope.nope", json!({"a": 1})));
        assert_eq!(rsp.code, StatusCode::InvalidParam);
        assert_eq!(rsp.seq, 9);
        assert_eq!(rsp.msg, json!({"a": 1}));
    }

    #[test]
    fn build_reports_ledger_shortfall() {
        let server = server();
        let mut session = login(&server, 3);
        server
            .services()
            .ledger
            .seed(3, [(ResourceKind::Grain, 10)].into_iter().collect());
        let rsp = server.dispatch(
            &mut session,
            Request::new(2, MAP_BUILD, json!({"x": 1, "y": 1, "type": "fortress"})),
        );
        assert_eq!(rsp.code, StatusCode::ResourceInsufficient);
        assert_eq!(rsp.msg["type"], "fortress");
        assert!(rsp.msg.get("site").is_none());
    }

    #[test]
    fn give_up_then_cancel() {
        let server = server();
        let mut session = login(&server, 3);
        let built = server.build(
            &session,
            BuildReq {
                x: 2,
                y: 2,
                kind: StructureKind::Fortress,
            },
        );
        assert!(built.is_ok());

        let rsp = server.dispatch(&mut session, Request::new(3, MAP_GIVE_UP, json!({"x": 2, "y": 2})));
        assert_eq!(rsp.code, StatusCode::Ok);
        assert!(rsp.msg.get("deadline").is_some());

        let rsp = server.dispatch(&mut session, Request::new(4, MAP_GIVE_UP, json!({"x": 2, "y": 2})));
        assert_eq!(rsp.code, StatusCode::SiteBusy);

        let rsp = server.dispatch(
            &mut session,
            Request::new(5, MAP_CANCEL_GIVE_UP, json!({"x": 2, "y": 2})),
        );
        assert_eq!(rsp.code, StatusCode::Ok);
        assert!(rsp.msg.get("deadline").is_none());
    }

    #[test]
    fn log_out_clears_the_session() {
        let server = server();
        let mut session = login(&server, 4);
        let rsp = server.dispatch(&mut session, Request::new(6, CHAT_LOGOUT, json!({"rid": 4})));
        assert_eq!(rsp.code, StatusCode::Ok);
        assert!(session.player_id().is_none());
        assert!(!server.services().chat.world().is_member(4));
    }

    #[test]
    fn config_lists_the_catalogue() {
        let server = server();
        let mut session = Session::new();
        let rsp = server.dispatch(&mut session, Request::new(1, MAP_CONFIG, json!({})));
        assert_eq!(rsp.code, StatusCode::Ok);
        let confs = rsp.msg["confs"].as_array().expect("confs");
        assert_eq!(confs.len(), Config::default().build.costs.len());
        assert_eq!(confs[0]["type"], "fortress");
    }
}
