//! Single-writer controller loop.
//!
//! DESIGN
//! ======
//! The controller owns `AppState` and is the only code that mutates it. Every
//! source of change posts an [`Input`] to one unbounded channel:
//!
//! - socket tasks post [`ConnectionEvent`]s tagged with their connection id
//! - the reconnect timer posts `ReconnectDue`
//! - the typing timer posts `TypingIdle`
//! - [`ControllerHandle`] posts commands, each with a oneshot reply
//!
//! Inputs are handled strictly in arrival order. REST calls are awaited inside
//! the loop, so inputs that arrive meanwhile queue behind them. After each
//! input a [`StateView`] is published on a watch channel when it changed.
//!
//! Timers carry an id. A timer input whose id no longer matches the pending
//! timer was cancelled or superseded and is ignored.
//!
//! ERROR HANDLING
//! ==============
//! Command failures are returned to the caller through the reply channel. A
//! logout the server rejects keeps the session. Background failures (page
//! loads, typing updates) are logged and leave local state as it was.

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ForumApi, Session};
use crate::config::ClientConfig;
use crate::connection::{self, ConnectionEvent, ConnectionEventKind, Connector, suppresses_reconnect};
use crate::dispatch::dispatch;
use crate::error::ClientError;
use crate::event::OutboundEvent;
use crate::state::{AppState, Page, Route, StateView};
use crate::timer::Timer;
use crate::types::{Comment, NewComment, NewPost, NewPrivateMessage, NewUser, Post, TypingUpdate, User};

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Everything the controller loop reacts to.
#[derive(Debug)]
pub enum Input {
    Connection(ConnectionEvent),
    ReconnectDue { timer: u64 },
    TypingIdle { timer: u64 },
    Command(Command),
}

/// A caller request, answered through its `reply` sender.
#[derive(Debug)]
pub enum Command {
    /// Resume the configured session. Replies whether a user is signed in.
    Restore { reply: Reply<bool> },
    Login { identifier: String, password: String, reply: Reply<User> },
    /// Create an account and sign in as it.
    Register { user: NewUser, reply: Reply<User> },
    Logout { reply: Reply<()> },
    Navigate { route: Route, reply: Reply<()> },
    SendPrivateMessage { content: String, reply: Reply<()> },
    InputActivity { reply: Reply<()> },
    CreatePost { post: NewPost, reply: Reply<Post> },
    /// Replies `None` when the content was blank.
    CreateComment { content: String, reply: Reply<Option<Comment>> },
    Shutdown { reply: Reply<()> },
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct Controller {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    api: Arc<dyn ForumApi>,
    state: AppState,
    session: Option<String>,
    inputs_tx: mpsc::UnboundedSender<Input>,
    inputs_rx: mpsc::UnboundedReceiver<Input>,
    reconnect: Option<Timer>,
    typing: Option<Timer>,
    /// Peer last told `typing=true`, until `typing=false` is sent. Cleared with
    /// the rest of the session in `end_session`.
    typing_target: Option<i64>,
    next_connection_id: u64,
    next_timer_id: u64,
    view_tx: watch::Sender<StateView>,
}

impl Controller {
    #[must_use]
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>, api: Arc<dyn ForumApi>) -> (Self, ControllerHandle) {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let state = AppState::new();
        let (view_tx, view_rx) = watch::channel(state.view());
        let handle = ControllerHandle { inputs: inputs_tx.clone(), view: view_rx };

        let controller = Self {
            session: config.session_token.clone(),
            config,
            connector,
            api,
            state,
            inputs_tx,
            inputs_rx,
            reconnect: None,
            typing: None,
            typing_target: None,
            next_connection_id: 1,
            next_timer_id: 1,
            view_tx,
        };
        (controller, handle)
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Handle inputs until a shutdown command arrives.
    pub async fn run(mut self) {
        info!(base_url = %self.config.base_url, "controller: started");
        while let Some(input) = self.inputs_rx.recv().await {
            let keep_running = self.handle(input).await;
            self.publish();
            if !keep_running {
                break;
            }
        }
        info!("controller: stopped");
    }

    fn publish(&self) {
        let view = self.state.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    /// Apply one input. Returns `false` once the loop should stop.
    async fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Connection(event) => self.on_connection(event),
            Input::ReconnectDue { timer } => self.on_reconnect_due(timer),
            Input::TypingIdle { timer } => self.on_typing_idle(timer).await,
            Input::Command(command) => return self.on_command(command).await,
        }
        true
    }

    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Restore { reply } => {
                respond(reply, Ok(self.restore().await));
            }
            Command::Login { identifier, password, reply } => {
                respond(reply, self.login(&identifier, &password).await);
            }
            Command::Register { user, reply } => {
                respond(reply, self.register(&user).await);
            }
            Command::Logout { reply } => {
                respond(reply, self.logout().await);
            }
            Command::Navigate { route, reply } => {
                self.navigate(route).await;
                respond(reply, Ok(()));
            }
            Command::SendPrivateMessage { content, reply } => {
                respond(reply, self.send_private_message(content).await);
            }
            Command::InputActivity { reply } => {
                self.input_activity().await;
                respond(reply, Ok(()));
            }
            Command::CreatePost { post, reply } => {
                respond(reply, self.create_post(&post).await);
            }
            Command::CreateComment { content, reply } => {
                respond(reply, self.create_comment(content).await);
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                respond(reply, Ok(()));
                return false;
            }
        }
        true
    }

    fn next_timer_id(&mut self) -> u64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        id
    }

    fn authenticated_session(&self) -> Result<&str, ClientError> {
        if !self.state.is_authenticated {
            return Err(ClientError::NotAuthenticated);
        }
        self.session.as_deref().ok_or(ClientError::MissingSession)
    }

    // =========================================================================
    // CONNECTION
    // =========================================================================

    fn open_channel(&mut self) {
        if !self.state.is_authenticated {
            debug!("controller: not signed in; push channel not opened");
            return;
        }
        let id = self.next_connection_id;
        self.next_connection_id += 1;

        let handle = connection::open(
            self.connector.as_ref(),
            &self.config.base_url,
            self.session.as_deref(),
            id,
            self.inputs_tx.clone(),
        );
        if let Some(handle) = handle {
            self.state.attach_connection(handle);
        }
    }

    fn on_connection(&mut self, event: ConnectionEvent) {
        let ConnectionEvent { id, kind } = event;
        if self.state.connection_id() != Some(id) {
            debug!(id, "controller: ignoring event from stale connection");
            return;
        }

        match kind {
            ConnectionEventKind::Opened => info!(id, "ws: connected"),
            ConnectionEventKind::Event(event) => {
                let kind = event.kind().to_owned();
                let regions = dispatch(&mut self.state, event);
                debug!(id, %kind, ?regions, "ws: event applied");
            }
            ConnectionEventKind::Error(error) => warn!(id, %error, "ws: transport error"),
            ConnectionEventKind::Closed { code, reason } => {
                self.state.take_connection();
                if suppresses_reconnect(code) {
                    info!(id, code, %reason, "ws: closed");
                } else {
                    warn!(id, code, %reason, "ws: closed unexpectedly");
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        let timer = self.next_timer_id();
        let delay = self.config.reconnect_delay;
        info!(timer, ?delay, "ws: reconnect scheduled");
        self.reconnect = Some(Timer::start(timer, delay, self.inputs_tx.clone(), Input::ReconnectDue { timer }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            debug!(timer = timer.id(), "ws: reconnect cancelled");
            timer.cancel();
        }
    }

    fn on_reconnect_due(&mut self, timer: u64) {
        match self.reconnect.take() {
            Some(pending) if pending.id() == timer => {}
            pending => {
                self.reconnect = pending;
                debug!(timer, "ws: ignoring superseded reconnect");
                return;
            }
        }
        if !self.state.is_authenticated {
            info!("ws: signed out; reconnect skipped");
            return;
        }
        info!("ws: reconnecting");
        self.open_channel();
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    async fn restore(&mut self) -> bool {
        let Some(session) = self.session.clone() else {
            info!("controller: no session token; staying signed out");
            return false;
        };

        match self.api.me(&session).await {
            Ok(user) => {
                info!(user_id = user.id, username = %user.username, "controller: session restored");
                self.state.sign_in(user);
                self.open_channel();
                true
            }
            Err(e) => {
                warn!(error = %e, "controller: session not restored");
                false
            }
        }
    }

    async fn login(&mut self, identifier: &str, password: &str) -> Result<User, ClientError> {
        let session = self.api.login(identifier, password).await?;
        info!(user_id = session.user.id, "controller: logged in");
        Ok(self.start_session(session).await)
    }

    async fn register(&mut self, user: &NewUser) -> Result<User, ClientError> {
        let session = self.api.register(user).await?;
        info!(user_id = session.user.id, "controller: registered");
        Ok(self.start_session(session).await)
    }

    /// Adopt a freshly issued session and open its push channel.
    ///
    /// Signing in as a different user first ends the previous user's session
    /// locally so none of their views or typing state carry over.
    async fn start_session(&mut self, session: Session) -> User {
        if self.state.local_user_id().is_some_and(|id| id != session.user.id) {
            info!(previous = ?self.state.local_user_id(), "controller: switching user");
            self.end_session().await;
        }

        self.cancel_reconnect();
        self.session = Some(session.token);
        self.state.sign_in(session.user.clone());
        self.open_channel();
        session.user
    }

    /// Tear down everything tied to the signed-in user.
    async fn end_session(&mut self) {
        self.cancel_reconnect();
        self.stop_typing().await;
        self.state.sign_out();
        self.session = None;
    }

    async fn logout(&mut self) -> Result<(), ClientError> {
        if let Some(session) = self.session.as_deref() {
            if let Err(e) = self.api.logout(session).await {
                warn!(error = %e, "controller: server rejected logout; session kept");
                return Err(e);
            }
        }
        self.end_session().await;
        info!("controller: logged out");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.cancel_reconnect();
        self.cancel_typing();
        if let Some(handle) = self.state.take_connection() {
            handle.close();
        }
    }

    // =========================================================================
    // NAVIGATION
    // =========================================================================

    async fn navigate(&mut self, route: Route) {
        if let Route::Messages(Some(peer)) = &route {
            if self.typing_target.is_some_and(|target| target != peer.id) {
                self.stop_typing().await;
            }
        }

        let page = route.page();
        self.state.navigate(route);
        debug!(?page, "controller: navigated");

        match page {
            Page::Home => match self.api.posts().await {
                Ok(posts) => self.state.posts = posts,
                Err(e) => warn!(error = %e, "controller: failed to load posts"),
            },
            Page::Categories => match self.api.categories().await {
                Ok(categories) => self.state.categories = categories,
                Err(e) => warn!(error = %e, "controller: failed to load categories"),
            },
            Page::Messages => self.load_messages_page().await,
            Page::PostDetail => {
                let Some(post_id) = self.state.current_post.as_ref().map(|p| p.id) else {
                    return;
                };
                match self.api.comments(post_id).await {
                    Ok(comments) => self.state.comments = comments,
                    Err(e) => warn!(post_id, error = %e, "controller: failed to load comments"),
                }
            }
        }
    }

    async fn load_messages_page(&mut self) {
        let Ok(session) = self.authenticated_session().map(str::to_owned) else {
            debug!("controller: not signed in; messages not loaded");
            return;
        };

        match self.api.online_users(&session).await {
            Ok(users) => self.state.online_users = users,
            Err(e) => warn!(error = %e, "controller: failed to load online users"),
        }

        let Some(peer_id) = self.state.chat_peer_id() else {
            return;
        };
        match self.api.messages(&session, peer_id).await {
            Ok(messages) => {
                if let Some(last) = messages.last() {
                    self.state.record_message(last);
                }
                self.state.conversation = messages;
            }
            Err(e) => warn!(peer_id, error = %e, "controller: failed to load conversation"),
        }
    }

    // =========================================================================
    // MESSAGING
    // =========================================================================

    async fn send_private_message(&mut self, content: String) -> Result<(), ClientError> {
        let session = self.authenticated_session()?.to_owned();
        let peer_id = self.state.chat_peer_id().ok_or(ClientError::NoConversation)?;
        if content.trim().is_empty() {
            return Ok(());
        }

        self.stop_typing().await;

        let message = NewPrivateMessage { receiver_id: peer_id, content };
        if let Some(connection) = self.state.open_connection() {
            if connection.send(&OutboundEvent::PrivateMessage(message.clone())) {
                debug!(peer_id, "controller: message sent over push channel");
                return Ok(());
            }
        }

        let sent = self.api.send_message(&session, &message).await?;
        debug!(peer_id, message_id = sent.id, "controller: message sent over REST");
        self.state.record_message(&sent);
        if self.state.chat_peer_id() == Some(peer_id) {
            self.state.conversation.push(sent);
        }
        Ok(())
    }

    async fn input_activity(&mut self) {
        if !self.state.is_authenticated {
            return;
        }
        let Some(peer_id) = self.state.chat_peer_id() else {
            return;
        };

        if self.typing_target != Some(peer_id) {
            if self.typing_target.is_some() {
                self.stop_typing().await;
            }
            self.typing_target = Some(peer_id);
            self.send_typing(peer_id, true).await;
        }

        self.cancel_typing();
        let timer = self.next_timer_id();
        self.typing = Some(Timer::start(
            timer,
            self.config.typing_idle,
            self.inputs_tx.clone(),
            Input::TypingIdle { timer },
        ));
    }

    async fn on_typing_idle(&mut self, timer: u64) {
        if self.typing.as_ref().map(Timer::id) != Some(timer) {
            debug!(timer, "controller: ignoring superseded typing timer");
            return;
        }
        self.typing = None;
        self.stop_typing().await;
    }

    fn cancel_typing(&mut self) {
        if let Some(timer) = self.typing.take() {
            timer.cancel();
        }
    }

    /// Cancel the idle timer and send `typing=false` if `true` was sent.
    async fn stop_typing(&mut self) {
        self.cancel_typing();
        if let Some(target) = self.typing_target.take() {
            self.send_typing(target, false).await;
        }
    }

    async fn send_typing(&self, target_user_id: i64, is_typing: bool) {
        let update = TypingUpdate { target_user_id, is_typing };
        if let Some(connection) = self.state.open_connection() {
            if connection.send(&OutboundEvent::TypingIndicator(update.clone())) {
                return;
            }
        }

        let Ok(session) = self.authenticated_session() else {
            return;
        };
        if let Err(e) = self.api.send_typing(session, &update).await {
            warn!(target_user_id, is_typing, error = %e, "controller: failed to send typing update");
        }
    }

    // =========================================================================
    // POSTS
    // =========================================================================

    async fn create_post(&mut self, post: &NewPost) -> Result<Post, ClientError> {
        let session = self.authenticated_session()?.to_owned();
        let created = self.api.create_post(&session, post).await?;
        info!(post_id = created.id, "controller: post created");

        self.state.posts.insert(0, created.clone());
        if let Some(connection) = self.state.open_connection() {
            connection.send(&OutboundEvent::PostCreated(created.clone()));
        }
        Ok(created)
    }

    async fn create_comment(&mut self, content: String) -> Result<Option<Comment>, ClientError> {
        let session = self.authenticated_session()?.to_owned();
        let post_id = self.state.current_post.as_ref().map(|p| p.id).ok_or(ClientError::NoPost)?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let comment = NewComment { content: content.to_owned() };
        let created = self.api.create_comment(&session, post_id, &comment).await?;
        info!(post_id, comment_id = created.id, "controller: comment created");

        if self.state.current_post.as_ref().map(|p| p.id) == Some(created.post_id) {
            self.state.comments.push(created.clone());
        }
        if let Some(connection) = self.state.open_connection() {
            connection.send(&OutboundEvent::CommentCreated(created.clone()));
        }
        Ok(Some(created))
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, ClientError>) {
    if reply.send(result).is_err() {
        debug!("controller: caller went away before the reply");
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable front end to a running [`Controller`].
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    inputs: mpsc::UnboundedSender<Input>,
    view: watch::Receiver<StateView>,
}

impl ControllerHandle {
    /// Receiver for state snapshots, marked changed after each update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StateView> {
        self.view.clone()
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn view(&self) -> StateView {
        self.view.borrow().clone()
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(Input::Command(command(reply)))
            .map_err(|_| ClientError::ControllerGone)?;
        response.await.map_err(|_| ClientError::ControllerGone)?
    }

    /// Resume the configured session; `Ok(false)` when it cannot be.
    ///
    /// # Errors
    ///
    /// [`ClientError::ControllerGone`] if the loop has stopped.
    pub async fn restore(&self) -> Result<bool, ClientError> {
        self.request(|reply| Command::Restore { reply }).await
    }

    /// # Errors
    ///
    /// Returns the API error when the credentials are rejected.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<User, ClientError> {
        self.request(|reply| Command::Login { identifier: identifier.to_owned(), password: password.to_owned(), reply })
            .await
    }

    /// Create an account and sign in as it.
    ///
    /// # Errors
    ///
    /// Returns the API error when the server refuses the registration.
    pub async fn register(&self, user: NewUser) -> Result<User, ClientError> {
        self.request(|reply| Command::Register { user, reply }).await
    }

    /// Sign out on the server, then locally.
    ///
    /// # Errors
    ///
    /// Returns the API error when the server rejects the logout; the session
    /// stays signed in.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Logout { reply }).await
    }

    /// # Errors
    ///
    /// [`ClientError::ControllerGone`] if the loop has stopped.
    pub async fn navigate(&self, route: Route) -> Result<(), ClientError> {
        self.request(|reply| Command::Navigate { route, reply }).await
    }

    /// Send `content` to the open conversation.
    ///
    /// # Errors
    ///
    /// Fails when signed out, when no conversation is open, or when the REST
    /// fallback is rejected.
    pub async fn send_private_message(&self, content: &str) -> Result<(), ClientError> {
        self.request(|reply| Command::SendPrivateMessage { content: content.to_owned(), reply }).await
    }

    /// Report a keystroke in the message composer.
    ///
    /// # Errors
    ///
    /// [`ClientError::ControllerGone`] if the loop has stopped.
    pub async fn input_activity(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::InputActivity { reply }).await
    }

    /// # Errors
    ///
    /// Fails when signed out or when the server rejects the post.
    pub async fn create_post(&self, title: &str, content: &str, category_id: i64) -> Result<Post, ClientError> {
        let post = NewPost { title: title.to_owned(), content: content.to_owned(), category_id };
        self.request(|reply| Command::CreatePost { post, reply }).await
    }

    /// Comment on the viewed post. `Ok(None)` when `content` is blank.
    ///
    /// # Errors
    ///
    /// Fails when signed out, when no post is viewed, or when the server
    /// rejects the comment.
    pub async fn create_comment(&self, content: &str) -> Result<Option<Comment>, ClientError> {
        self.request(|reply| Command::CreateComment { content: content.to_owned(), reply }).await
    }

    /// Stop the loop, closing the push channel.
    ///
    /// # Errors
    ///
    /// [`ClientError::ControllerGone`] if the loop had already stopped.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
