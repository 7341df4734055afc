//! Session root: room → provider → extensions → mounted editor.
//!
//! ```text
//! SessionRoot::boot
//!   ├─ room::resolve ──── Created ──► Boot::Redirected (nothing bound)
//!   │        │
//!   │     Existing
//!   ├─ Provider::bind({party, room})
//!   ├─ ExtensionComposer::compose
//!   ├─ EditorEngine::find_anchor(mount_id) ── None ──► MissingMountTarget
//!   └─ EditorEngine::mount ──► Boot::Mounted(Session)
//!
//! Session::pump / run : ProviderEvent ──► surface (cursors, replica, status)
//!                       + presence renewal
//! Session::teardown   : unmount, drop subscription, leave and release
//! ```

use std::sync::Arc;

use tandem_collab::{
    BindRequest, ConnectionState, CursorRange, Provider, ProviderEvent, ProviderHandle,
    ProviderSubscription, ReplicaHistory, UpdateOrigin,
};

use crate::config::SessionConfig;
use crate::cursor::{render_remote_cursors, CaretRenderer, CursorRender, RenderedCursor};
use crate::error::SessionError;
use crate::extensions::{EditorOptions, ExtensionComposer, ExtensionConfig};
use crate::palette::SessionPresence;
use crate::room::{resolve, IdentitySource, Navigator, Resolution, RoomId};

/// The rich-text editing engine the session mounts.
pub trait EditorEngine {
    /// Host element the editor mounts into.
    type Anchor;
    type Surface: EditorSurface;

    fn find_anchor(&self, id: &str) -> Option<Self::Anchor>;

    /// Mount an editor configured with `extensions` into `anchor`.
    fn mount(
        &self,
        anchor: Self::Anchor,
        extensions: ExtensionConfig,
        options: &EditorOptions,
    ) -> Result<Self::Surface, String>;
}

/// A mounted editor.
pub trait EditorSurface {
    /// Replace the remote carets shown in the document.
    fn update_cursors(&mut self, cursors: Vec<RenderedCursor>);

    fn replica_changed(&mut self, _origin: UpdateOrigin) {}

    fn status_changed(&mut self, _status: ConnectionState) {}

    fn unmount(&mut self);
}

/// Result of booting a session.
pub enum Boot<S: EditorSurface> {
    /// A new room was created; the page is navigating to `redirect`.
    Redirected { room: RoomId, redirect: String },
    Mounted(Session<S>),
}

impl<S: EditorSurface> Boot<S> {
    pub fn into_session(self) -> Option<Session<S>> {
        match self {
            Boot::Mounted(session) => Some(session),
            Boot::Redirected { .. } => None,
        }
    }
}

/// Wires the room, provider, extensions and engine together.
pub struct SessionRoot {
    config: SessionConfig,
    presence: SessionPresence,
    renderer: Arc<dyn CursorRender>,
}

impl SessionRoot {
    /// Validate `config` and pick this session's presence color.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let palette = config.validate()?;
        Ok(Self {
            presence: SessionPresence::random(&palette),
            config,
            renderer: Arc::new(CaretRenderer),
        })
    }

    pub fn with_presence(mut self, presence: SessionPresence) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn CursorRender>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn presence(&self) -> &SessionPresence {
        &self.presence
    }

    pub fn boot<N, I, P, E>(
        &self,
        navigator: &N,
        identities: &I,
        provider: &P,
        engine: &E,
    ) -> Result<Boot<E::Surface>, SessionError>
    where
        N: Navigator + ?Sized,
        I: IdentitySource + ?Sized,
        P: Provider + ?Sized,
        E: EditorEngine + ?Sized,
    {
        let room = match resolve(navigator, identities)? {
            Resolution::Existing(room) => room,
            Resolution::Created { room, redirect } => {
                return Ok(Boot::Redirected { room, redirect });
            }
        };

        let handle = provider.bind(&BindRequest::new(&self.config.party, room.as_str()))?;
        let extensions = ExtensionComposer::new(self.presence.clone())
            .with_renderer(Arc::clone(&self.renderer))
            .with_field(&self.config.field)
            .compose(&handle)?;

        let anchor = engine
            .find_anchor(&self.config.mount_id)
            .ok_or_else(|| SessionError::MissingMountTarget(self.config.mount_id.clone()))?;

        let subscription = handle.subscribe();
        let history = extensions.history();
        let user = extensions.cursor().map(|cursor| cursor.user.clone());
        let options = EditorOptions {
            autofocus: self.config.autofocus,
            ..EditorOptions::default()
        };
        let surface = engine
            .mount(anchor, extensions.clone(), &options)
            .map_err(SessionError::Mount)?;

        if let Some(user) = user {
            handle.set_local_user(user);
        }
        log::info!("Mounted editor for room {} as {}", room, handle.session_id());

        let mut session = Session {
            room,
            handle,
            extensions,
            options,
            renderer: Arc::clone(&self.renderer),
            history,
            surface: Some(surface),
            subscription: Some(subscription),
        };
        session.refresh_cursors();
        let status = session.handle.status();
        if let Some(surface) = session.surface.as_mut() {
            surface.status_changed(status);
        }
        Ok(Boot::Mounted(session))
    }
}

/// A mounted editor bound to a room. Dropping it tears everything down.
pub struct Session<S: EditorSurface> {
    room: RoomId,
    handle: ProviderHandle,
    extensions: ExtensionConfig,
    options: EditorOptions,
    renderer: Arc<dyn CursorRender>,
    history: Option<ReplicaHistory>,
    surface: Option<S>,
    subscription: Option<ProviderSubscription>,
}

impl<S: EditorSurface> Session<S> {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn handle(&self) -> &ProviderHandle {
        &self.handle
    }

    pub fn extensions(&self) -> &ExtensionConfig {
        &self.extensions
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    pub fn is_mounted(&self) -> bool {
        self.surface.is_some()
    }

    /// Publish the local selection.
    pub fn set_cursor(&self, cursor: Option<CursorRange>) {
        self.handle.set_local_cursor(cursor);
    }

    pub fn undo(&mut self) -> bool {
        self.history.as_mut().is_some_and(ReplicaHistory::undo)
    }

    pub fn redo(&mut self) -> bool {
        self.history.as_mut().is_some_and(ReplicaHistory::redo)
    }

    /// Remote carets for the current presence set.
    pub fn render_cursors(&self) -> Vec<RenderedCursor> {
        render_remote_cursors(
            self.renderer.as_ref(),
            self.handle.session_id(),
            &self.handle.presence(),
        )
    }

    /// Renew the local presence if due, then handle every pending provider
    /// event. Returns how many events were handled.
    pub fn pump(&mut self) -> usize {
        if self.is_mounted() {
            self.handle.renew_local();
        }
        let mut handled = 0;
        while let Some(event) = self.subscription.as_mut().and_then(|s| s.try_recv()) {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Handle provider events until the subscription closes.
    pub async fn run(&mut self) {
        loop {
            let event = match self.subscription.as_mut() {
                Some(subscription) => subscription.recv().await,
                None => break,
            };
            match event {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
        log::debug!("Event loop for room {} finished", self.room);
    }

    fn handle_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::Presence(change) => {
                log::trace!("Presence change {:?}", change);
                self.refresh_cursors();
            }
            ProviderEvent::Replica(origin) => {
                if let Some(surface) = self.surface.as_mut() {
                    surface.replica_changed(origin);
                }
            }
            ProviderEvent::Status(status) => {
                log::info!("Room {} connection {:?}", self.room, status);
                if let Some(surface) = self.surface.as_mut() {
                    surface.status_changed(status);
                }
            }
        }
    }

    fn refresh_cursors(&mut self) {
        let cursors = self.render_cursors();
        if let Some(surface) = self.surface.as_mut() {
            surface.update_cursors(cursors);
        }
    }

    /// Unmount the editor, then release the subscription together with
    /// the connection. Idempotent.
    pub fn teardown(&mut self) {
        let Some(mut surface) = self.surface.take() else {
            return;
        };
        surface.unmount();
        self.subscription = None;
        self.handle.release();
        log::info!("Tore down editor for room {}", self.room);
    }
}

impl<S: EditorSurface> Drop for Session<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use tandem_collab::{CollabError, MemoryHub, UserProfile};

    use crate::error::{ConfigError, RoomError};
    use crate::palette::PresenceColor;
    use crate::room::RandomIdentity;

    struct Location {
        path: String,
        redirects: RefCell<Vec<String>>,
    }

    impl Location {
        fn at(path: &str) -> Self {
            Self {
                path: path.into(),
                redirects: RefCell::default(),
            }
        }
    }

    impl Navigator for Location {
        fn pathname(&self) -> String {
            self.path.clone()
        }

        fn redirect(&self, target: &str) -> Result<(), RoomError> {
            self.redirects.borrow_mut().push(target.into());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Log {
        cursors: Vec<Vec<RenderedCursor>>,
        replica: Vec<UpdateOrigin>,
        status: Vec<ConnectionState>,
        unmounted: bool,
    }

    struct FakeSurface(Rc<RefCell<Log>>);

    impl EditorSurface for FakeSurface {
        fn update_cursors(&mut self, cursors: Vec<RenderedCursor>) {
            self.0.borrow_mut().cursors.push(cursors);
        }

        fn replica_changed(&mut self, origin: UpdateOrigin) {
            self.0.borrow_mut().replica.push(origin);
        }

        fn status_changed(&mut self, status: ConnectionState) {
            self.0.borrow_mut().status.push(status);
        }

        fn unmount(&mut self) {
            self.0.borrow_mut().unmounted = true;
        }
    }

    struct FakeEngine {
        anchors: Vec<&'static str>,
        log: Rc<RefCell<Log>>,
    }

    impl FakeEngine {
        fn with_root() -> Self {
            Self {
                anchors: vec!["root"],
                log: Rc::default(),
            }
        }
    }

    impl EditorEngine for FakeEngine {
        type Anchor = &'static str;
        type Surface = FakeSurface;

        fn find_anchor(&self, id: &str) -> Option<&'static str> {
            self.anchors.iter().copied().find(|a| *a == id)
        }

        fn mount(
            &self,
            _anchor: &'static str,
            _extensions: ExtensionConfig,
            _options: &EditorOptions,
        ) -> Result<FakeSurface, String> {
            Ok(FakeSurface(Rc::clone(&self.log)))
        }
    }

    struct FailingProvider;

    impl Provider for FailingProvider {
        fn bind(&self, request: &BindRequest) -> Result<ProviderHandle, CollabError> {
            Err(CollabError::EngineUnavailable(request.room.clone()))
        }
    }

    fn root() -> SessionRoot {
        SessionRoot::new(SessionConfig::default())
            .unwrap()
            .with_presence(SessionPresence::with_color(PresenceColor::parse("#FFC0CB").unwrap()))
    }

    #[test]
    fn test_root_path_redirects_without_binding() {
        let hub = MemoryHub::new();
        let location = Location::at("/");
        let engine = FakeEngine::with_root();

        let boot = root().boot(&location, &RandomIdentity, &hub, &engine).unwrap();
        let Boot::Redirected { room, redirect } = boot else {
            panic!("expected redirect");
        };
        assert_eq!(redirect, room.as_str());
        assert_eq!(*location.redirects.borrow(), vec![redirect]);
        assert_eq!(hub.room_size(&BindRequest::document(room.as_str())), 0);
    }

    #[test]
    fn test_mount_publishes_user_and_subscribes() {
        let hub = MemoryHub::new();
        let engine = FakeEngine::with_root();
        let session = root()
            .boot(&Location::at("/doc-1"), &RandomIdentity, &hub, &engine)
            .unwrap()
            .into_session()
            .unwrap();

        assert_eq!(session.room().as_str(), "/doc-1");
        assert_eq!(session.handle().room(), "/doc-1");
        assert!(session.is_mounted());
        assert_eq!(session.handle().subscription_count(), 1);
        assert_eq!(session.handle().request().party, "document");

        let local = session.handle().local_presence().unwrap();
        assert_eq!(
            local.user,
            Some(UserProfile::new(session.handle().session_id().as_str(), "#FFC0CB"))
        );
        assert_eq!(engine.log.borrow().status, vec![ConnectionState::Connected]);
    }

    #[test]
    fn test_missing_mount_target() {
        let engine = FakeEngine {
            anchors: vec![],
            log: Rc::default(),
        };
        let err = root()
            .boot(&Location::at("/doc"), &RandomIdentity, &MemoryHub::new(), &engine)
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::MissingMountTarget(id) if id == "root"));
    }

    #[test]
    fn test_provider_failure_is_fatal() {
        let err = root()
            .boot(&Location::at("/doc"), &RandomIdentity, &FailingProvider, &FakeEngine::with_root())
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Collab(CollabError::EngineUnavailable(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            palette: vec!["url(x)".into()],
            ..SessionConfig::default()
        };
        assert!(matches!(
            SessionRoot::new(config),
            Err(SessionError::Config(ConfigError::InvalidColor(_)))
        ));
    }

    #[test]
    fn test_teardown_releases_subscription() {
        let hub = MemoryHub::new();
        let engine = FakeEngine::with_root();
        let mut session = root()
            .boot(&Location::at("/doc"), &RandomIdentity, &hub, &engine)
            .unwrap()
            .into_session()
            .unwrap();
        let handle = session.handle().clone();
        assert_eq!(hub.room_size(&BindRequest::document("/doc")), 1);

        session.teardown();
        session.teardown();

        assert_eq!(handle.subscription_count(), 0);
        assert!(handle.local_presence().is_none());
        assert!(handle.is_released());
        assert_eq!(hub.room_size(&BindRequest::document("/doc")), 0);
        assert!(engine.log.borrow().unmounted);
        assert!(!session.is_mounted());
        assert_eq!(session.pump(), 0);
    }

    #[test]
    fn test_never_connected_session_renders_empty() {
        let hub = MemoryHub::offline();
        let engine = FakeEngine::with_root();
        let mut session = root()
            .boot(&Location::at("/quiet"), &RandomIdentity, &hub, &engine)
            .unwrap()
            .into_session()
            .unwrap();

        assert!(session.is_mounted());
        assert_eq!(session.handle().status(), ConnectionState::Connecting);
        assert!(session.handle().replica().is_empty());
        assert!(session.render_cursors().is_empty());
        {
            let log = engine.log.borrow();
            assert_eq!(log.cursors, vec![Vec::<RenderedCursor>::new()]);
            assert_eq!(log.status, vec![ConnectionState::Connecting]);
        }
        assert_eq!(session.pump(), 0);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let hub = MemoryHub::new();
        let engine = FakeEngine::with_root();
        let session = root()
            .boot(&Location::at("/doc"), &RandomIdentity, &hub, &engine)
            .unwrap()
            .into_session()
            .unwrap();
        let handle = session.handle().clone();
        drop(session);
        assert_eq!(handle.subscription_count(), 0);
        assert!(engine.log.borrow().unmounted);
    }

    #[test]
    fn test_pump_renders_remote_cursor() {
        let hub = MemoryHub::new();
        let engine = FakeEngine::with_root();
        let mut session = root()
            .boot(&Location::at("/doc"), &RandomIdentity, &hub, &engine)
            .unwrap()
            .into_session()
            .unwrap();
        let peer = hub.bind(&BindRequest::document("/doc")).unwrap();
        peer.set_local_user(UserProfile::new("Ada", "#FFD700"));
        peer.set_local_cursor(Some(CursorRange::caret(0)));

        assert!(session.pump() >= 2);
        let log = engine.log.borrow();
        let last = log.cursors.last().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(&last[0].participant, peer.session_id());
        assert_eq!(last[0].caret.text_content(), "Ada");
    }
}
