//! Session layer: connect/join/login sequencing, the receive→dispatch
//! loop, and permission-gated outward actions.
//!
//! # Architecture
//!
//! ```text
//!   Bot (cheap-clone handle)
//!     │ connect()   socketconfig lookup → bootstrap handshake → SocketIo
//!     │ login()     joinChannel (needPassword guard) → login ack loop
//!     │ run()       recv → dispatch, reconnect per restart policy
//!     │ actions     chat / pm / add_media / remove_media / set_afk / clear_chat
//!     ▼
//!   EventDispatcher ── default state handlers ──► Channel / User mirrors
//! ```
//!
//! One live engine per session: `connect()` first tears down any existing
//! engine. Cancellation is a sticky exit — `shutdown()` cancels the run
//! token, and `run()` performs a best-effort disconnect on every exit path.

// Rust guideline compliant 2026-02

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::config::Config;
use crate::dispatcher::{EventDispatcher, HandlerFuture};
use crate::error::{CytubeError, SocketIoError};
use crate::media_link::MediaLink;
use crate::playlist::PlaylistItem;
use crate::socket_io::SocketIo;
use crate::user::User;

/// Name the built-in state-mirror handlers register under.
const STATE_HANDLER: &str = "state";

/// CyTube session: one channel, one identity, one live engine at a time.
///
/// `Bot` is a cheap-clone handle; clones share the same session. Handlers
/// typically capture a clone to invoke outward actions.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    http: reqwest::Client,
    domain: String,
    retry: u32,
    retry_delay: Duration,
    response_timeout: Duration,
    restart_delay: Option<Duration>,
    /// Resolved socket.io server URL, cached across reconnects.
    server: Mutex<Option<String>>,
    socket: Mutex<Option<Arc<SocketIo>>>,
    channel: Arc<Mutex<Channel>>,
    user: Arc<Mutex<User>>,
    dispatcher: EventDispatcher,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("domain", &self.inner.domain)
            .finish_non_exhaustive()
    }
}

impl Bot {
    /// Build a session from configuration and register the default state
    /// handlers.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = &config.proxy {
            let proxy_url = if proxy.contains("://") {
                proxy.clone()
            } else {
                format!("socks5h://{proxy}")
            };
            builder = builder
                .proxy(reqwest::Proxy::all(&proxy_url).context("invalid proxy address")?);
        }
        let http = builder.build().context("failed to build HTTP client")?;

        let user = match &config.user {
            Some(name) => User::new(name, config.user_password.clone()),
            None => User::anonymous(),
        };

        let inner = Arc::new(BotInner {
            http,
            domain: config.domain.clone(),
            retry: config.retry,
            retry_delay: Duration::from_secs_f64(config.retry_delay.max(0.0)),
            response_timeout: Duration::from_secs_f64(config.response_timeout.max(0.0)),
            restart_delay: config
                .restart_delay
                .filter(|delay| *delay >= 0.0)
                .map(Duration::from_secs_f64),
            server: Mutex::new(None),
            socket: Mutex::new(None),
            channel: Arc::new(Mutex::new(Channel::new(
                &config.channel,
                config.channel_password.clone(),
            ))),
            user: Arc::new(Mutex::new(user)),
            dispatcher: EventDispatcher::new(),
            shutdown: CancellationToken::new(),
        });
        register_state_handlers(&inner);
        Ok(Self { inner })
    }

    /// The channel state mirror.
    #[must_use]
    pub fn channel(&self) -> Arc<Mutex<Channel>> {
        Arc::clone(&self.inner.channel)
    }

    /// The bot's own user state.
    #[must_use]
    pub fn user(&self) -> Arc<Mutex<User>> {
        Arc::clone(&self.inner.user)
    }

    /// Add a named event handler. See [`EventDispatcher::on`].
    pub fn on<F>(&self, event: &str, name: &str, handler: F)
    where
        F: Fn(String, Value) -> HandlerFuture + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event, name, handler);
    }

    /// Remove a named event handler. See [`EventDispatcher::off`].
    pub fn off(&self, event: &str, name: &str) {
        self.inner.dispatcher.off(event, name);
    }

    /// Dispatch a local event through the handler chains.
    pub async fn trigger(&self, event: &str, data: Value) -> Result<(), CytubeError> {
        self.inner.dispatcher.trigger(event, data).await
    }

    /// Request a sticky cancellation of `run()`.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Resolve (and cache) the socket.io server URL for the channel.
    async fn server_url(&self) -> Result<String, CytubeError> {
        let mut server = self.inner.server.lock().await;
        if let Some(url) = server.as_ref() {
            return Ok(url.clone());
        }

        let channel_name = self.inner.channel.lock().await.name.clone();
        let mut url = format!("{}/socketconfig/{}.json", self.inner.domain, channel_name);
        if !url.starts_with("http") {
            url = format!("https://{url}");
        }
        log::info!("[Bot] Get socket config {url}");

        let body = self
            .inner
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CytubeError::SocketConfig(format!("request failed: {e}")))?
            .text()
            .await
            .map_err(|e| CytubeError::SocketConfig(format!("body read failed: {e}")))?;
        let conf: Value = serde_json::from_str(&body)
            .map_err(|e| CytubeError::SocketConfig(format!("invalid body: {e}")))?;

        let resolved = format!("{}/socket.io/", parse_socket_config(&conf)?);
        log::info!("[Bot] Server {resolved}");
        *server = Some(resolved.clone());
        Ok(resolved)
    }

    /// Tear down any existing engine, then handshake and build a new one.
    pub async fn connect(&self) -> Result<(), CytubeError> {
        self.disconnect().await;
        let server = self.server_url().await?;
        log::info!("[Bot] Connect {server}");
        let socket = SocketIo::connect(
            &self.inner.http,
            &server,
            self.inner.retry,
            self.inner.retry_delay,
        )
        .await?;
        *self.inner.socket.lock().await = Some(socket);
        Ok(())
    }

    /// Close the live engine, if any. Idempotent.
    pub async fn disconnect(&self) {
        let socket = self.inner.socket.lock().await.take();
        if let Some(socket) = socket {
            log::info!("[Bot] Disconnect");
            socket.close().await;
            self.inner.user.lock().await.rank = -1.0;
        }
    }

    /// Connect, join the channel, and log in.
    ///
    /// Joining requires the password-rejection response to be absent or
    /// false. Login retries on the guest rate-limit pattern (sleeping at
    /// least a second); any other rejection is a [`CytubeError::Login`].
    /// Finishes by dispatching a local `login` event.
    pub async fn login(&self) -> Result<(), CytubeError> {
        self.connect().await?;
        let socket = self.socket().await?;

        let (channel_name, channel_password) = {
            let channel = self.inner.channel.lock().await;
            (channel.name.clone(), channel.password.clone())
        };
        log::info!("[Bot] Join channel {channel_name}");
        let rejected = socket
            .emit_with_response(
                "joinChannel",
                json!({"name": channel_name, "pw": channel_password}),
                |event, _| event == "needPassword",
                Some(self.inner.response_timeout),
            )
            .await?;
        if rejected.map_or(false, |data| is_truthy(&data)) {
            return Err(CytubeError::Login("invalid channel password".into()));
        }

        let (user_name, user_password) = {
            let user = self.inner.user.lock().await;
            (user.name.clone(), user.password.clone())
        };
        if user_name.is_empty() {
            log::warn!("[Bot] No user");
        } else {
            loop {
                log::info!("[Bot] Login {user_name}");
                let ack = socket
                    .emit_with_response(
                        "login",
                        json!({"name": user_name, "pw": user_password}),
                        |event, _| event == "login",
                        None,
                    )
                    .await?
                    .unwrap_or(Value::Null);
                if ack["success"].as_bool().unwrap_or(false) {
                    log::info!("[Bot] Login ok");
                    break;
                }
                let message = ack["error"]
                    .as_str()
                    .unwrap_or("<no error message>")
                    .to_string();
                log::error!("[Bot] Login error: {message}");
                match guest_login_delay(&message) {
                    Some(delay) => {
                        log::warn!("[Bot] Guest login limited, sleeping {}s", delay.as_secs());
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(CytubeError::Login(message)),
                }
            }
        }

        self.inner.dispatcher.trigger("login", Value::Null).await
    }

    /// Main loop: log in, then receive and dispatch until failure,
    /// cancellation, or a propagating handler error.
    ///
    /// Engine errors reconnect after the configured restart delay, or
    /// surface when none is configured. The engine is unconditionally torn
    /// down on every exit path, including cancellation.
    pub async fn run(&self) -> Result<(), CytubeError> {
        let result = tokio::select! {
            () = self.inner.shutdown.cancelled() => {
                log::info!("[Bot] Cancelled");
                Ok(())
            }
            result = self.run_loop() => result,
        };
        self.disconnect().await;
        result
    }

    async fn run_loop(&self) -> Result<(), CytubeError> {
        self.login().await?;
        log::info!("[Bot] Start");
        loop {
            let socket = self.socket().await?;
            match socket.recv().await {
                Ok((event, data)) => {
                    self.inner.dispatcher.trigger(&event, data).await?;
                }
                Err(err) => {
                    log::error!("[Bot] Network error: {err}");
                    let Some(delay) = self.inner.restart_delay else {
                        return Err(CytubeError::Socket(err));
                    };
                    log::error!("[Bot] Restarting in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                    self.login().await?;
                }
            }
        }
    }

    /// Send a chat message.
    ///
    /// Requires the `chat` permission and an unmuted identity; a `noflood`
    /// rejection within the response timeout is a permission error carrying
    /// the server message.
    pub async fn chat(&self, msg: &str, meta: Option<Value>) -> Result<(), CytubeError> {
        log::info!("[Bot] Chat {msg}");
        let user = self.inner.user.lock().await.clone();
        self.inner
            .channel
            .lock()
            .await
            .check_permission("chat", &user)?;
        if user.muted || user.smuted {
            return Err(CytubeError::Permission("muted".into()));
        }

        let socket = self.socket().await?;
        let rejected = socket
            .emit_with_response(
                "chatMsg",
                json!({"msg": msg, "meta": meta.unwrap_or_else(|| json!({}))}),
                |event, _| event == "noflood",
                Some(self.inner.response_timeout),
            )
            .await?;
        if let Some(data) = rejected {
            log::error!("[Bot] Chat rejected: {data}");
            return Err(CytubeError::Permission(
                data.get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("noflood")
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Send a private message.
    pub async fn pm(&self, to: &str, msg: &str, meta: Option<Value>) -> Result<(), CytubeError> {
        log::info!("[Bot] Pm {to} {msg}");
        let user = self.inner.user.lock().await.clone();
        self.inner
            .channel
            .lock()
            .await
            .check_permission("chat", &user)?;
        if user.muted || user.smuted {
            return Err(CytubeError::Permission("muted".into()));
        }

        let socket = self.socket().await?;
        let rejected = socket
            .emit_with_response(
                "pm",
                json!({"msg": msg, "to": to, "meta": meta.unwrap_or_else(|| json!({}))}),
                |event, _| event == "errorMsg",
                Some(self.inner.response_timeout),
            )
            .await?;
        if let Some(data) = rejected {
            log::error!("[Bot] Pm rejected: {data}");
            return Err(CytubeError::Channel(
                data.get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("<no message>")
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Queue a media link.
    ///
    /// `append` adds at the end, otherwise after the current item; `temp`
    /// marks the entry temporary. Permissions depend on whether the
    /// playlist is locked.
    pub async fn add_media(
        &self,
        link: &MediaLink,
        append: bool,
        temp: bool,
    ) -> Result<(), CytubeError> {
        log::info!("[Bot] Add media {link}");
        let user = self.inner.user.lock().await.clone();
        {
            let channel = self.inner.channel.lock().await;
            let action = if channel.playlist.locked {
                "playlist"
            } else {
                "oplaylist"
            };
            channel.check_permission(&format!("{action}add"), &user)?;
            if !append {
                channel.check_permission(&format!("{action}next"), &user)?;
            }
            if !temp {
                channel.check_permission("addnontemp", &user)?;
            }
        }

        let socket = self.socket().await?;
        let rejected = socket
            .emit_with_response(
                "queue",
                json!({
                    "type": link.kind,
                    "id": link.id,
                    "pos": if append { "end" } else { "next" },
                    "temp": temp,
                }),
                |event, _| event == "queueFail",
                Some(self.inner.response_timeout),
            )
            .await?;
        if let Some(data) = rejected {
            log::error!("[Bot] Queue rejected: {data}");
            return Err(CytubeError::Channel(
                data.get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("<no message>")
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Remove a playlist item by uid.
    pub async fn remove_media(&self, uid: i64) -> Result<(), CytubeError> {
        let user = self.inner.user.lock().await.clone();
        {
            let channel = self.inner.channel.lock().await;
            let action = if channel.playlist.locked {
                "playlistdelete"
            } else {
                "oplaylistdelete"
            };
            channel.check_permission(action, &user)?;
        }
        let socket = self.socket().await?;
        socket.emit("delete", json!(uid)).await?;
        Ok(())
    }

    /// Toggle AFK to the requested state (no-op when already there).
    pub async fn set_afk(&self, value: bool) -> Result<(), CytubeError> {
        let afk = self.inner.user.lock().await.afk;
        if afk != value {
            self.chat("/afk", None).await?;
        }
        Ok(())
    }

    /// Clear the chat buffer (requires the `chatclear` permission).
    pub async fn clear_chat(&self) -> Result<(), CytubeError> {
        let user = self.inner.user.lock().await.clone();
        self.inner
            .channel
            .lock()
            .await
            .check_permission("chatclear", &user)?;
        self.chat("/clear", None).await
    }

    /// The live engine, or a closed error when disconnected.
    async fn socket(&self) -> Result<Arc<SocketIo>, CytubeError> {
        self.inner
            .socket
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(CytubeError::Socket(SocketIoError::Closed))
    }
}

/// Pick a server URL from a socketconfig body: first secure server, else
/// the first listed, else an error.
fn parse_socket_config(conf: &Value) -> Result<String, CytubeError> {
    if let Some(err) = conf.get("error") {
        return Err(CytubeError::SocketConfig(
            err.as_str().map_or_else(|| err.to_string(), str::to_string),
        ));
    }
    let servers = conf
        .get("servers")
        .and_then(Value::as_array)
        .ok_or_else(|| CytubeError::SocketConfig("no servers in socket config".into()))?;
    let secure = servers
        .iter()
        .filter(|server| server.get("secure").and_then(Value::as_bool).unwrap_or(false))
        .find_map(|server| server.get("url").and_then(Value::as_str));
    let url = secure.or_else(|| {
        servers
            .iter()
            .find_map(|server| server.get("url").and_then(Value::as_str))
    });
    url.map(str::to_string)
        .ok_or_else(|| CytubeError::SocketConfig("no servers in socket config".into()))
}

/// Wait time demanded by a guest-login rate-limit rejection, if the
/// message matches the known pattern. Best-effort: the text is
/// server-controlled.
fn guest_login_delay(message: &str) -> Option<Duration> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)^guest logins .* ([0-9]+) seconds\.").expect("valid pattern")
    });
    let seconds = re.captures(message)?.get(1)?.as_str().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds.max(1)))
}

/// Python-style truthiness for response payloads.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Handler that applies an update to the channel mirror.
fn channel_handler<F>(
    channel: &Arc<Mutex<Channel>>,
    apply: F,
) -> impl Fn(String, Value) -> HandlerFuture
where
    F: Fn(&mut Channel, &Value) + Send + Sync + 'static,
{
    let channel = Arc::clone(channel);
    let apply = Arc::new(apply);
    move |_event, data| {
        let channel = Arc::clone(&channel);
        let apply = Arc::clone(&apply);
        Box::pin(async move {
            apply(&mut *channel.lock().await, &data);
            Ok(false)
        })
    }
}

/// Handler that applies an update to a named user (and the bot's own
/// identity when it is that user).
fn user_update_handler<F>(
    channel: &Arc<Mutex<Channel>>,
    me: &Arc<Mutex<User>>,
    apply: F,
) -> impl Fn(String, Value) -> HandlerFuture
where
    F: Fn(&mut User, &Value) + Send + Sync + 'static,
{
    let channel = Arc::clone(channel);
    let me = Arc::clone(me);
    let apply = Arc::new(apply);
    move |event, data| {
        let channel = Arc::clone(&channel);
        let me = Arc::clone(&me);
        let apply = Arc::clone(&apply);
        Box::pin(async move {
            let Some(name) = data.get("name").and_then(Value::as_str) else {
                log::error!("[Bot] {event}: no user name in payload");
                return Ok(false);
            };
            match channel.lock().await.userlist.get_mut(name) {
                Some(user) => apply(user, &data),
                None => log::error!("[Bot] {event}: {name} not found"),
            }
            let mut me = me.lock().await;
            if me.name == name {
                apply(&mut *me, &data);
            }
            Ok(false)
        })
    }
}

/// Add a `userlist`/`addUser` entry to the mirror, updating the bot's own
/// identity when the entry is for it.
async fn apply_user_entry(channel: &Arc<Mutex<Channel>>, me: &Arc<Mutex<User>>, entry: &Value) {
    let parsed = User::from_event(entry);
    {
        let mut me = me.lock().await;
        if !me.name.is_empty() && me.name == parsed.name {
            me.apply_event(entry);
        }
    }
    channel.lock().await.userlist.add(parsed);
}

/// Register the built-in handlers that keep the channel mirror current.
fn register_state_handlers(inner: &Arc<BotInner>) {
    let dispatcher = &inner.dispatcher;
    let channel = &inner.channel;
    let me = &inner.user;

    {
        let me = Arc::clone(me);
        dispatcher.on("rank", STATE_HANDLER, move |_, data| {
            let me = Arc::clone(&me);
            Box::pin(async move {
                if let Some(rank) = data.as_f64() {
                    me.lock().await.rank = rank;
                }
                Ok(false)
            })
        });
    }

    dispatcher.on(
        "setMotd",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.motd = data.as_str().unwrap_or_default().to_string();
        }),
    );
    dispatcher.on(
        "channelCSSJS",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.css = data["css"].as_str().unwrap_or_default().to_string();
            channel.js = data["js"].as_str().unwrap_or_default().to_string();
        }),
    );
    dispatcher.on(
        "channelOpts",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.options = data.clone();
        }),
    );
    dispatcher.on(
        "setPermissions",
        STATE_HANDLER,
        channel_handler(channel, Channel::set_permissions),
    );
    dispatcher.on(
        "emoteList",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.emotes = data.clone();
        }),
    );
    dispatcher.on(
        "drinkCount",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.drink_count = data.as_i64().unwrap_or(0);
        }),
    );
    dispatcher.on(
        "usercount",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.userlist.count = data.as_i64().unwrap_or(0);
        }),
    );

    dispatcher.on("needPassword", STATE_HANDLER, |_, data| {
        Box::pin(async move {
            if is_truthy(&data) {
                Err(CytubeError::Login("invalid channel password".into()))
            } else {
                Ok(false)
            }
        })
    });
    dispatcher.on("kick", STATE_HANDLER, |_, data| {
        Box::pin(async move {
            let reason = data
                .get("reason")
                .and_then(Value::as_str)
                .map_or_else(|| data.to_string(), str::to_string);
            Err(CytubeError::Kicked(reason))
        })
    });
    dispatcher.on("noflood", STATE_HANDLER, |_, data| {
        Box::pin(async move {
            log::error!("[Bot] noflood: {data}");
            Ok(false)
        })
    });
    dispatcher.on("errorMsg", STATE_HANDLER, |_, data| {
        Box::pin(async move {
            log::error!("[Bot] error: {data}");
            Ok(false)
        })
    });
    dispatcher.on("queueFail", STATE_HANDLER, |_, data| {
        Box::pin(async move {
            log::error!("[Bot] playlist error: {data}");
            Ok(false)
        })
    });

    {
        let channel = Arc::clone(channel);
        let me = Arc::clone(me);
        dispatcher.on("userlist", STATE_HANDLER, move |_, data| {
            let channel = Arc::clone(&channel);
            let me = Arc::clone(&me);
            Box::pin(async move {
                channel.lock().await.userlist.clear();
                for entry in data.as_array().map(Vec::as_slice).unwrap_or_default() {
                    apply_user_entry(&channel, &me, entry).await;
                }
                log::info!(
                    "[Bot] Userlist: {} users",
                    channel.lock().await.userlist.len()
                );
                Ok(false)
            })
        });
    }
    {
        let channel = Arc::clone(channel);
        let me = Arc::clone(me);
        dispatcher.on("addUser", STATE_HANDLER, move |_, data| {
            let channel = Arc::clone(&channel);
            let me = Arc::clone(&me);
            Box::pin(async move {
                apply_user_entry(&channel, &me, &data).await;
                Ok(false)
            })
        });
    }
    dispatcher.on(
        "userLeave",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            let name = data.get("name").and_then(Value::as_str).unwrap_or_default();
            if channel.userlist.remove(name).is_none() {
                log::error!("[Bot] userLeave: {name} not found");
            }
        }),
    );
    dispatcher.on(
        "setUserMeta",
        STATE_HANDLER,
        user_update_handler(channel, me, |user, data| {
            user.apply_meta(&data["meta"]);
        }),
    );
    dispatcher.on(
        "setUserRank",
        STATE_HANDLER,
        user_update_handler(channel, me, |user, data| {
            if let Some(rank) = data.get("rank").and_then(Value::as_f64) {
                user.rank = rank;
            }
        }),
    );
    dispatcher.on(
        "setAFK",
        STATE_HANDLER,
        user_update_handler(channel, me, |user, data| {
            user.afk = data.get("afk").and_then(Value::as_bool).unwrap_or(false);
        }),
    );
    dispatcher.on(
        "setLeader",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel
                .userlist
                .set_leader(data.as_str().unwrap_or_default());
        }),
    );

    dispatcher.on(
        "setPlaylistMeta",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.playlist.time = data.get("rawTime").and_then(Value::as_f64).unwrap_or(0.0);
        }),
    );
    dispatcher.on(
        "mediaUpdate",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.playlist.paused = data.get("paused").and_then(Value::as_bool).unwrap_or(true);
            channel.playlist.current_time = data
                .get("currentTime")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
        }),
    );
    dispatcher.on(
        "voteskip",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.voteskip_count = data.get("count").and_then(Value::as_i64).unwrap_or(0);
            channel.voteskip_need = data.get("need").and_then(Value::as_i64).unwrap_or(0);
        }),
    );
    dispatcher.on(
        "setCurrent",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.playlist.set_current(data.as_i64());
        }),
    );
    dispatcher.on(
        "queue",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            match PlaylistItem::from_event(&data["item"]) {
                Some(item) => channel
                    .playlist
                    .add(data.get("after").and_then(Value::as_i64), item),
                None => log::error!("[Bot] queue: invalid item: {data}"),
            }
        }),
    );
    dispatcher.on(
        "delete",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            if let Some(uid) = data.get("uid").and_then(Value::as_i64) {
                channel.playlist.remove(uid);
            }
        }),
    );
    dispatcher.on(
        "setTemp",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            let uid = data.get("uid").and_then(Value::as_i64).unwrap_or(-1);
            match channel.playlist.get_mut(uid) {
                Some(item) => {
                    item.temp = data.get("temp").and_then(Value::as_bool).unwrap_or(false);
                }
                None => log::error!("[Bot] setTemp: unknown uid {uid}"),
            }
        }),
    );
    dispatcher.on(
        "moveVideo",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            if let Some(from) = data.get("from").and_then(Value::as_i64) {
                channel.playlist.move_item(from, &data["after"]);
            }
        }),
    );
    dispatcher.on(
        "playlist",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.playlist.clear();
            for entry in data.as_array().map(Vec::as_slice).unwrap_or_default() {
                match PlaylistItem::from_event(entry) {
                    Some(item) => channel.playlist.add(None, item),
                    None => log::error!("[Bot] playlist: invalid item: {entry}"),
                }
            }
        }),
    );
    dispatcher.on(
        "setPlaylistLocked",
        STATE_HANDLER,
        channel_handler(channel, |channel, data| {
            channel.playlist.locked = is_truthy(data);
        }),
    );
}
