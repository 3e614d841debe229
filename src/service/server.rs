use crate::camera::FrameSource;
use crate::common::{FaceAuthError, Result};
use crate::core::{EmbeddingOracle, FaceAuth, MatchOutcome};
use crate::service::protocol::{
    try_read_message, write_message, ErrorResponse, LoginRequest, LoginResponse, RegisterRequest,
    RegisterResponse, Request, Response,
};
use crate::service::signing::SigningKey;
use crate::storage::{IdentityStore, LoginRecorder};
use std::io::{Read, Write};
use std::time::SystemTime;

/// Turns requests into responses. Every failure becomes `Response::Error`,
/// so a connection always gets an answer.
pub struct RequestHandler<'a, O: ?Sized, S: ?Sized, H: ?Sized> {
    auth: FaceAuth<'a, O, S, H>,
    signing_key: &'a SigningKey,
}

impl<'a, O, S, H> RequestHandler<'a, O, S, H>
where
    O: EmbeddingOracle + ?Sized,
    S: IdentityStore + ?Sized,
    H: LoginRecorder + ?Sized,
{
    pub fn new(auth: FaceAuth<'a, O, S, H>, signing_key: &'a SigningKey) -> Self {
        Self { auth, signing_key }
    }

    /// `open_source` is only called once the request has been accepted, so the
    /// camera is held for the duration of one request.
    pub fn handle<F, C>(&self, request: Request, open_source: F) -> Response
    where
        F: FnOnce() -> Result<C>,
        C: FrameSource,
    {
        let result = match request {
            Request::Register(req) => self.handle_register(req, open_source),
            Request::Login(req) => self.handle_login(req, open_source),
        };

        result.unwrap_or_else(|e| {
            if e.is_client_error() {
                tracing::warn!("Request rejected: {}", e);
            } else {
                tracing::error!("Request failed: {}", e);
            }
            Response::Error(ErrorResponse::from(&e))
        })
    }

    fn handle_register<F, C>(&self, req: RegisterRequest, open_source: F) -> Result<Response>
    where
        F: FnOnce() -> Result<C>,
        C: FrameSource,
    {
        tracing::info!("Registration request for {}", req.username);
        // Reject taken names before the device is opened
        self.auth.check_available(&req.username, &req.email)?;
        let mut source = open_source()?;
        let record = self.auth.register(&mut source, &req.username, &req.email)?;

        Ok(Response::Register(RegisterResponse {
            id: record.id,
            message: format!("User {} registered successfully", record.username),
            username: record.username,
        }))
    }

    fn handle_login<F, C>(&self, req: LoginRequest, open_source: F) -> Result<Response>
    where
        F: FnOnce() -> Result<C>,
        C: FrameSource,
    {
        tracing::info!("Login request");
        if req.challenge.is_empty() {
            return Err(FaceAuthError::InvalidInput("Login challenge must not be empty".into()));
        }

        let mut source = open_source()?;
        let response = match self.auth.login(&mut source)? {
            MatchOutcome::Match { identity, distance } => LoginResponse {
                success: true,
                user_id: Some(identity.id),
                signature: self.signing_key.sign(&req.challenge, identity.id)?,
                message: format!("Welcome back, {}", identity.username),
                username: Some(identity.username),
                distance: Some(distance),
                timestamp: SystemTime::now(),
            },
            MatchOutcome::NoMatch => LoginResponse {
                success: false,
                user_id: None,
                username: None,
                distance: None,
                message: "Face not recognized. Please register first.".into(),
                signature: Vec::new(),
                timestamp: SystemTime::now(),
            },
        };

        Ok(Response::Login(response))
    }
}

/// Reads one request from `stream`, handles it and writes the response.
pub fn serve_connection<T, O, S, H, F, C>(
    stream: &mut T,
    handler: &RequestHandler<'_, O, S, H>,
    open_source: F,
) -> Result<()>
where
    T: Read + Write,
    O: EmbeddingOracle + ?Sized,
    S: IdentityStore + ?Sized,
    H: LoginRecorder + ?Sized,
    F: FnOnce() -> Result<C>,
    C: FrameSource,
{
    let response = match try_read_message::<_, Request>(stream) {
        Ok(Some(request)) => handler.handle(request, open_source),
        // Liveness checks connect and hang up without a request
        Ok(None) => {
            tracing::debug!("Client closed connection without a request");
            return Ok(());
        }
        // A garbled frame still gets a typed answer; a dead peer does not
        Err(e @ FaceAuthError::Protocol(_)) => {
            tracing::warn!("Bad request frame: {}", e);
            Response::Error(ErrorResponse::from(&e))
        }
        Err(e) => return Err(e),
    };

    write_message(stream, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorKind;
    use crate::service::protocol::read_message;
    use crate::core::{Embedding, MatchPolicy};
    use crate::storage::{MemoryIdentityStore, MemoryLoginRecorder};
    use image::DynamicImage;
    use std::cell::RefCell;

    struct QueueOracle(RefCell<Vec<Vec<Embedding>>>);

    impl QueueOracle {
        fn new(frames: Vec<Vec<Embedding>>) -> Self {
            Self(RefCell::new(frames))
        }
    }

    impl EmbeddingOracle for QueueOracle {
        fn embed_faces(&self, _image: &DynamicImage) -> Result<Vec<Embedding>> {
            Ok(self.0.borrow_mut().remove(0))
        }
    }

    struct BlankFrames;

    impl FrameSource for BlankFrames {
        fn capture(&mut self) -> Result<DynamicImage> {
            Ok(DynamicImage::new_luma8(8, 8))
        }
    }

    fn open_blank() -> Result<BlankFrames> {
        Ok(BlankFrames)
    }

    fn login_request() -> Request {
        Request::Login(LoginRequest { challenge: vec![9; 32], timestamp: SystemTime::now() })
    }

    #[test]
    fn register_then_login_is_signed() {
        let oracle = QueueOracle::new(vec![vec![vec![0.1, 0.2, 0.3]], vec![vec![0.1, 0.2, 0.3]]]);
        let store = MemoryIdentityStore::new();
        let history = MemoryLoginRecorder::new();
        let key = SigningKey::from_bytes([1u8; 32]);
        let handler = RequestHandler::new(
            FaceAuth::new(&oracle, &store, &history, MatchPolicy::default()),
            &key,
        );

        let register = Request::Register(RegisterRequest {
            username: "ada".into(),
            email: "ada@example.com".into(),
        });
        let id = match handler.handle(register, open_blank) {
            Response::Register(resp) => resp.id,
            other => panic!("unexpected response: {:?}", other),
        };

        match handler.handle(login_request(), open_blank) {
            Response::Login(resp) => {
                assert!(resp.success);
                assert_eq!(resp.user_id, Some(id));
                assert_eq!(resp.username.as_deref(), Some("ada"));
                assert!(key.verify(&[9; 32], id, &resp.signature));
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let attempts = history.history(None).unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].user_id, Some(id));
    }

    #[test]
    fn unknown_face_gets_unsigned_rejection() {
        let oracle = QueueOracle::new(vec![vec![vec![5.0, 5.0]]]);
        let store = MemoryIdentityStore::new();
        let history = MemoryLoginRecorder::new();
        let key = SigningKey::from_bytes([1u8; 32]);
        let handler = RequestHandler::new(
            FaceAuth::new(&oracle, &store, &history, MatchPolicy::default()),
            &key,
        );

        match handler.handle(login_request(), open_blank) {
            Response::Login(resp) => {
                assert!(!resp.success);
                assert!(resp.signature.is_empty());
            }
            other => panic!("unexpected response: {:?}", other),
        }
        let attempts = history.history(None).unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].success);
        assert_eq!(attempts[0].user_id, None);
    }

    #[test]
    fn camera_failure_maps_to_error_kind() {
        let oracle = QueueOracle::new(vec![]);
        let store = MemoryIdentityStore::new();
        let history = MemoryLoginRecorder::new();
        let key = SigningKey::from_bytes([1u8; 32]);
        let handler = RequestHandler::new(
            FaceAuth::new(&oracle, &store, &history, MatchPolicy::default()),
            &key,
        );

        let response = handler.handle(login_request(), || -> Result<BlankFrames> {
            Err(FaceAuthError::Camera("Webcam not accessible".into()))
        });
        match response {
            Response::Error(err) => assert_eq!(err.kind, ErrorKind::Camera),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn connection_round_trip_over_socket_pair() {
        use std::os::unix::net::UnixStream;

        let oracle = QueueOracle::new(vec![vec![vec![0.1], vec![0.2]]]);
        let store = MemoryIdentityStore::new();
        let history = MemoryLoginRecorder::new();
        let key = SigningKey::from_bytes([1u8; 32]);
        let handler = RequestHandler::new(
            FaceAuth::new(&oracle, &store, &history, MatchPolicy::default()),
            &key,
        );

        let (mut client, mut server) = UnixStream::pair().unwrap();
        write_message(&mut client, &login_request()).unwrap();
        serve_connection(&mut server, &handler, open_blank).unwrap();

        match read_message::<_, Response>(&mut client).unwrap() {
            Response::Error(err) => assert_eq!(err.kind, ErrorKind::MultipleFacesDetected),
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(history.history(None).unwrap().is_empty());
    }

    #[test]
    fn taken_username_never_opens_the_camera() {
        use std::cell::Cell;

        let oracle = QueueOracle::new(vec![vec![vec![0.1, 0.2]]]);
        let store = MemoryIdentityStore::new();
        let history = MemoryLoginRecorder::new();
        let key = SigningKey::from_bytes([1u8; 32]);
        let handler = RequestHandler::new(
            FaceAuth::new(&oracle, &store, &history, MatchPolicy::default()),
            &key,
        );
        let register = |username: &str| {
            Request::Register(RegisterRequest {
                username: username.into(),
                email: format!("{}@example.com", username),
            })
        };

        let opened = Cell::new(0);
        let open_counting = || {
            opened.set(opened.get() + 1);
            open_blank()
        };

        assert!(matches!(handler.handle(register("ada"), open_counting), Response::Register(_)));
        assert_eq!(opened.get(), 1);

        match handler.handle(register("ada"), open_counting) {
            Response::Error(err) => assert_eq!(err.kind, ErrorKind::UserExists),
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(opened.get(), 1);
    }

    #[test]
    fn hang_up_without_request_is_not_an_error() {
        use std::os::unix::net::UnixStream;

        let oracle = QueueOracle::new(vec![]);
        let store = MemoryIdentityStore::new();
        let history = MemoryLoginRecorder::new();
        let key = SigningKey::from_bytes([1u8; 32]);
        let handler = RequestHandler::new(
            FaceAuth::new(&oracle, &store, &history, MatchPolicy::default()),
            &key,
        );

        let (client, mut server) = UnixStream::pair().unwrap();
        drop(client);
        assert!(serve_connection(&mut server, &handler, open_blank).is_ok());
    }
}
