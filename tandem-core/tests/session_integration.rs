//! End-to-end session tests: two browsers on the same room, driven through
//! the in-process hub.

use std::sync::{Arc, Mutex};

use tandem_core::collab::{
    BindRequest, ConnectionState, CursorRange, MemoryHub, UpdateOrigin,
};
use tandem_core::{
    Boot, EditorEngine, EditorOptions, EditorSurface, ExtensionConfig, Navigator, PresenceColor,
    RandomIdentity, RenderedCursor, RoomError, Session, SessionConfig, SessionPresence,
    SessionRoot,
};
use tokio::time::{timeout, Duration};
use yrs::{XmlElementPrelim, XmlFragment, XmlTextPrelim};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Location(String);

impl Navigator for Location {
    fn pathname(&self) -> String {
        self.0.clone()
    }

    fn redirect(&self, _target: &str) -> Result<(), RoomError> {
        Ok(())
    }
}

#[derive(Default)]
struct SurfaceState {
    cursors: Vec<RenderedCursor>,
    remote_changes: usize,
    status: Option<ConnectionState>,
    mounted: bool,
    extensions: Vec<&'static str>,
}

#[derive(Clone, Default)]
struct RecordingEngine(Arc<Mutex<SurfaceState>>);

struct RecordingSurface(Arc<Mutex<SurfaceState>>);

impl EditorEngine for RecordingEngine {
    type Anchor = ();
    type Surface = RecordingSurface;

    fn find_anchor(&self, id: &str) -> Option<()> {
        (id == "root").then_some(())
    }

    fn mount(
        &self,
        _anchor: (),
        extensions: ExtensionConfig,
        options: &EditorOptions,
    ) -> Result<RecordingSurface, String> {
        assert!(options.autofocus);
        let mut state = self.0.lock().unwrap();
        state.mounted = true;
        state.extensions = extensions.names();
        Ok(RecordingSurface(self.0.clone()))
    }
}

impl EditorSurface for RecordingSurface {
    fn update_cursors(&mut self, cursors: Vec<RenderedCursor>) {
        self.0.lock().unwrap().cursors = cursors;
    }

    fn replica_changed(&mut self, origin: UpdateOrigin) {
        if origin == UpdateOrigin::Remote {
            self.0.lock().unwrap().remote_changes += 1;
        }
    }

    fn status_changed(&mut self, status: ConnectionState) {
        self.0.lock().unwrap().status = Some(status);
    }

    fn unmount(&mut self) {
        self.0.lock().unwrap().mounted = false;
    }
}

fn open(hub: &MemoryHub, path: &str, color: &str, engine: &RecordingEngine) -> Session<RecordingSurface> {
    let root = SessionRoot::new(SessionConfig::default())
        .unwrap()
        .with_presence(SessionPresence::with_color(PresenceColor::parse(color).unwrap()));
    match root
        .boot(&Location(path.into()), &RandomIdentity, hub, engine)
        .unwrap()
    {
        Boot::Mounted(session) => session,
        Boot::Redirected { .. } => panic!("{path} should mount"),
    }
}

fn type_heading(session: &Session<RecordingSurface>, text: &str) {
    session.handle().replica().apply_local(|txn, fragment| {
        let at = fragment.len(&*txn);
        let heading = fragment.insert(txn, at, XmlElementPrelim::empty("heading"));
        heading.insert(txn, 0, XmlTextPrelim::new(text));
    });
}

#[tokio::test]
async fn test_two_sessions_see_each_other() {
    init_logging();
    let hub = MemoryHub::new();
    let (engine_a, engine_b) = (RecordingEngine::default(), RecordingEngine::default());
    let mut alice = open(&hub, "/shared", "#FFC0CB", &engine_a);
    let mut bob = open(&hub, "/shared", "#87CEFA", &engine_b);

    assert_eq!(
        engine_a.0.lock().unwrap().extensions,
        vec!["starterKit", "document", "placeholder", "collaboration", "collaborationCursor"]
    );

    bob.set_cursor(Some(CursorRange::new(1, 4)));
    alice.pump();
    bob.pump();

    let state = engine_a.0.lock().unwrap();
    assert_eq!(state.cursors.len(), 1);
    let caret = &state.cursors[0];
    assert_eq!(&caret.participant, bob.handle().session_id());
    assert_eq!(caret.cursor, CursorRange::new(1, 4));
    assert_eq!(caret.caret.text_content(), bob.handle().session_id().as_str());
    assert!(caret.caret.to_html().contains("border-color: #87CEFA"));
    drop(state);

    // Bob never sees his own caret, only Alice's (which has no cursor yet).
    assert!(engine_b.0.lock().unwrap().cursors.is_empty());
}

#[tokio::test]
async fn test_edits_converge_and_notify() {
    init_logging();
    let hub = MemoryHub::new();
    let (engine_a, engine_b) = (RecordingEngine::default(), RecordingEngine::default());
    let mut alice = open(&hub, "/notes", "#FFD700", &engine_a);
    let mut bob = open(&hub, "/notes", "#98FB98", &engine_b);
    alice.pump();
    bob.pump();

    type_heading(&alice, "Title");
    type_heading(&bob, "Subtitle");
    alice.pump();
    bob.pump();

    assert_eq!(
        alice.handle().replica().to_xml(),
        bob.handle().replica().to_xml()
    );
    assert!(engine_a.0.lock().unwrap().remote_changes >= 1);
    assert!(engine_b.0.lock().unwrap().remote_changes >= 1);
}

#[tokio::test]
async fn test_undo_only_reverts_own_edits() {
    init_logging();
    let hub = MemoryHub::new();
    let engine = RecordingEngine::default();
    let mut alice = open(&hub, "/undo", "#FFD700", &engine);
    let bob = open(&hub, "/undo", "#98FB98", &RecordingEngine::default());

    type_heading(&bob, "Bob's");
    type_heading(&alice, "Alice's");
    assert!(alice.undo());

    let xml = alice.handle().replica().to_xml();
    assert!(xml.contains("Bob's"));
    assert!(!xml.contains("Alice's"));
    assert_eq!(xml, bob.handle().replica().to_xml());
}

#[tokio::test]
async fn test_run_stops_after_close() {
    init_logging();
    let hub = MemoryHub::new();
    let engine = RecordingEngine::default();
    let mut session = open(&hub, "/run", "#FFA07A", &engine);
    let handle = session.handle().clone();

    hub.set_online(&BindRequest::document("/run"), false);
    handle.close();
    timeout(Duration::from_secs(1), session.run()).await.unwrap();

    assert_eq!(
        engine.0.lock().unwrap().status,
        Some(ConnectionState::Disconnected)
    );
    drop(session);
    assert_eq!(handle.subscription_count(), 0);
    assert!(!engine.0.lock().unwrap().mounted);
}

#[tokio::test]
async fn test_departed_peer_caret_removed() {
    init_logging();
    let hub = MemoryHub::new();
    let engine = RecordingEngine::default();
    let mut alice = open(&hub, "/bye", "#FFC0CB", &engine);
    let bob = open(&hub, "/bye", "#87CEFA", &RecordingEngine::default());
    bob.set_cursor(Some(CursorRange::caret(0)));
    alice.pump();
    assert_eq!(engine.0.lock().unwrap().cursors.len(), 1);

    drop(bob);
    alice.pump();
    assert!(engine.0.lock().unwrap().cursors.is_empty());
    assert_eq!(hub.room_size(&BindRequest::document("/bye")), 1);
}

#[tokio::test]
async fn test_teardown_releases_room_membership() {
    init_logging();
    let hub = MemoryHub::new();
    let engine = RecordingEngine::default();
    let mut alice = open(&hub, "/gone", "#FFC0CB", &engine);
    let mut bob = open(&hub, "/gone", "#87CEFA", &RecordingEngine::default());
    alice.set_cursor(Some(CursorRange::caret(0)));
    bob.pump();
    let handle = alice.handle().clone();

    alice.teardown();
    assert_eq!(hub.room_size(&BindRequest::document("/gone")), 1);
    assert_eq!(handle.status(), ConnectionState::Disconnected);

    type_heading(&bob, "after teardown");
    assert!(!handle.replica().to_xml().contains("after teardown"));
    bob.pump();
    assert!(bob.render_cursors().is_empty());
}
