use facegate::camera::FrameSource;
use facegate::core::{Embedding, EmbeddingOracle, FaceAuth, MatchOutcome, MatchPolicy};
use facegate::storage::{
    FileIdentityStore, FileLoginRecorder, IdentityStore, LoginAttempt, LoginRecorder,
    MemoryIdentityStore, MemoryLoginRecorder,
};
use facegate::{FaceAuthError, Result};
use image::DynamicImage;
use std::cell::RefCell;
use tempfile::TempDir;

/// Returns the queued faces for each frame in turn.
struct ScriptedOracle {
    frames: RefCell<Vec<Vec<Embedding>>>,
}

impl ScriptedOracle {
    fn new(frames: Vec<Vec<Embedding>>) -> Self {
        Self { frames: RefCell::new(frames) }
    }

    fn remaining(&self) -> usize {
        self.frames.borrow().len()
    }
}

impl EmbeddingOracle for ScriptedOracle {
    fn embed_faces(&self, _image: &DynamicImage) -> Result<Vec<Embedding>> {
        let mut frames = self.frames.borrow_mut();
        if frames.is_empty() {
            return Err(FaceAuthError::Model("no scripted frame left".into()));
        }
        Ok(frames.remove(0))
    }
}

#[derive(Default)]
struct CountingCamera {
    captures: usize,
}

impl FrameSource for CountingCamera {
    fn capture(&mut self) -> Result<DynamicImage> {
        self.captures += 1;
        Ok(DynamicImage::new_rgb8(16, 16))
    }
}

/// Fails every write so login must still return its decision.
struct BrokenRecorder;

impl LoginRecorder for BrokenRecorder {
    fn record_attempt(&self, _attempt: &LoginAttempt) -> Result<()> {
        Err(FaceAuthError::Storage("disk full".into()))
    }

    fn history(&self, _user_id: Option<u64>) -> Result<Vec<LoginAttempt>> {
        Ok(Vec::new())
    }
}

const ADA: [f32; 3] = [0.1, 0.2, 0.3];
const GRACE: [f32; 3] = [0.9, -0.4, 0.5];

#[test]
fn registered_user_can_log_in() {
    let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec()], vec![ADA.to_vec()]]);
    let store = MemoryIdentityStore::new();
    let history = MemoryLoginRecorder::new();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());
    let mut camera = CountingCamera::default();

    let record = auth.register(&mut camera, "  ada ", "ada@example.com").unwrap();
    assert_eq!(record.username, "ada");
    assert!(record.face_encoding.is_some());

    match auth.login(&mut camera).unwrap() {
        MatchOutcome::Match { identity, distance } => {
            assert_eq!(identity.id, record.id);
            assert!(distance < 1e-6);
        }
        MatchOutcome::NoMatch => panic!("registered face was not recognized"),
    }

    let attempts = history.history(Some(record.id)).unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
    assert_eq!(camera.captures, 2);
}

#[test]
fn two_faces_fail_before_any_matching() {
    let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec(), GRACE.to_vec()]]);
    let store = MemoryIdentityStore::new();
    let history = MemoryLoginRecorder::new();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());

    let err = auth.login(&mut CountingCamera::default()).unwrap_err();
    assert!(matches!(err, FaceAuthError::MultipleFacesDetected { count: 2 }));
    assert!(history.history(None).unwrap().is_empty());
}

#[test]
fn taken_username_is_rejected_before_capture() {
    let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec()]]);
    let store = MemoryIdentityStore::new();
    let history = MemoryLoginRecorder::new();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());
    let mut camera = CountingCamera::default();

    auth.register(&mut camera, "ada", "ada@example.com").unwrap();

    let mut second_camera = CountingCamera::default();
    let err = auth.register(&mut second_camera, "ada", "other@example.com").unwrap_err();
    assert!(matches!(err, FaceAuthError::UserExists));
    let err = auth.register(&mut second_camera, "someone", "ada@example.com").unwrap_err();
    assert!(matches!(err, FaceAuthError::UserExists));
    assert_eq!(second_camera.captures, 0);
}

#[test]
fn blank_fields_are_invalid_input() {
    let oracle = ScriptedOracle::new(vec![]);
    let store = MemoryIdentityStore::new();
    let history = MemoryLoginRecorder::new();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());

    let err = auth.register(&mut CountingCamera::default(), "   ", "a@b.c").unwrap_err();
    assert!(matches!(err, FaceAuthError::InvalidInput(_)));
}

#[test]
fn same_face_cannot_register_twice() {
    let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec()], vec![ADA.to_vec()]]);
    let store = MemoryIdentityStore::new();
    let history = MemoryLoginRecorder::new();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());
    let mut camera = CountingCamera::default();

    let first = auth.register(&mut camera, "ada", "ada@example.com").unwrap();
    let err = auth.register(&mut camera, "ada2", "ada2@example.com").unwrap_err();

    match err {
        FaceAuthError::DuplicateFace { id, .. } => assert_eq!(id, first.id),
        other => panic!("expected DuplicateFace, got {:?}", other),
    }
    assert_eq!(store.list_identities().unwrap().len(), 1);
}

#[test]
fn unknown_face_is_recorded_as_failed_attempt() {
    let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec()], vec![GRACE.to_vec()]]);
    let store = MemoryIdentityStore::new();
    let history = MemoryLoginRecorder::new();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());
    let mut camera = CountingCamera::default();

    auth.register(&mut camera, "ada", "ada@example.com").unwrap();
    assert_eq!(auth.login(&mut camera).unwrap(), MatchOutcome::NoMatch);

    let attempts = history.history(None).unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].success);
    assert_eq!(attempts[0].user_id, None);
    assert_eq!(oracle.remaining(), 0);
}

#[test]
fn recorder_failure_does_not_change_the_decision() {
    let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec()], vec![ADA.to_vec()]]);
    let store = MemoryIdentityStore::new();
    let auth = FaceAuth::new(&oracle, &store, &BrokenRecorder, MatchPolicy::default());
    let mut camera = CountingCamera::default();

    auth.register(&mut camera, "ada", "ada@example.com").unwrap();
    assert!(auth.login(&mut camera).unwrap().is_match());
}

#[test]
fn file_backed_flow_survives_reopening() {
    let tmp = TempDir::new().unwrap();
    let users = tmp.path().join("users");
    let history_file = tmp.path().join("login_history.jsonl");

    {
        let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec()], vec![GRACE.to_vec()]]);
        let store = FileIdentityStore::new(users.clone()).unwrap();
        let history = FileLoginRecorder::new(history_file.clone()).unwrap();
        let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());
        let mut camera = CountingCamera::default();
        auth.register(&mut camera, "ada", "ada@example.com").unwrap();
        auth.register(&mut camera, "grace", "grace@example.com").unwrap();
    }

    let oracle = ScriptedOracle::new(vec![vec![GRACE.to_vec()]]);
    let store = FileIdentityStore::new(users).unwrap();
    let history = FileLoginRecorder::new(history_file).unwrap();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());

    match auth.login(&mut CountingCamera::default()).unwrap() {
        MatchOutcome::Match { identity, .. } => assert_eq!(identity.username, "grace"),
        MatchOutcome::NoMatch => panic!("stored face was not recognized after reopening"),
    }
    assert_eq!(history.history(None).unwrap().len(), 1);
}

#[test]
fn damaged_identity_file_does_not_lock_out_others() {
    let tmp = TempDir::new().unwrap();
    let users = tmp.path().join("users");
    let oracle = ScriptedOracle::new(vec![vec![ADA.to_vec()], vec![ADA.to_vec()], vec![GRACE.to_vec()]]);
    let store = FileIdentityStore::new(users.clone()).unwrap();
    let history = MemoryLoginRecorder::new();
    let auth = FaceAuth::new(&oracle, &store, &history, MatchPolicy::default());
    let mut camera = CountingCamera::default();

    let ada = auth.register(&mut camera, "ada", "ada@example.com").unwrap();
    std::fs::write(users.join("7.bincode"), [0xff, 0x01]).unwrap();

    match auth.login(&mut camera).unwrap() {
        MatchOutcome::Match { identity, .. } => assert_eq!(identity.id, ada.id),
        MatchOutcome::NoMatch => panic!("valid record stopped matching next to a damaged file"),
    }

    let grace = auth.register(&mut camera, "grace", "grace@example.com").unwrap();
    assert_eq!(grace.id, 8);
}
