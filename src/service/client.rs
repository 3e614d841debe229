use crate::common::{FaceAuthError, Result};
use crate::service::protocol::{
    read_message, write_message, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    Request, Response,
};
use rand::{thread_rng, Rng};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime};

const SERVICE_BINARY: &str = "facegate-service";

pub struct ServiceClient {
    socket_path: PathBuf,
    dev_mode: bool,
}

impl ServiceClient {
    pub fn new(socket_path: PathBuf, dev_mode: bool) -> Self {
        ServiceClient { socket_path, dev_mode }
    }

    pub fn register(&self, username: &str, email: &str) -> Result<RegisterResponse> {
        let request = Request::Register(RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
        });

        match self.round_trip(&request)? {
            Response::Register(resp) => Ok(resp),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the accepted response together with the challenge it was issued
    /// for, so the caller can check the signature. A rejected face is `NoMatch`.
    pub fn login(&self) -> Result<(LoginResponse, Vec<u8>)> {
        let challenge = generate_challenge();
        let request = Request::Login(LoginRequest {
            challenge: challenge.clone(),
            timestamp: SystemTime::now(),
        });

        match self.round_trip(&request)? {
            Response::Login(resp) => accepted(resp).map(|resp| (resp, challenge)),
            other => Err(unexpected(other)),
        }
    }

    fn round_trip(&self, request: &Request) -> Result<Response> {
        self.ensure_service_running()?;
        let mut stream = self.connect_with_retry(3)?;
        write_message(&mut stream, request)?;
        read_message(&mut stream)
    }

    pub fn ensure_service_running(&self) -> Result<()> {
        if self.socket_path.exists() && UnixStream::connect(&self.socket_path).is_ok() {
            return Ok(());
        }

        // Only auto-start in dev mode
        if !self.dev_mode {
            return Err(FaceAuthError::Other(anyhow::anyhow!(
                "Service is not running. Please start it with: sudo systemctl start facegate"
            )));
        }

        println!("Starting service in development mode...");

        let service_binary = std::env::current_exe()?
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Failed to get binary directory"))?
            .join(SERVICE_BINARY);

        if !service_binary.exists() {
            return Err(FaceAuthError::Other(anyhow::anyhow!(
                "Service binary not found at {:?}. Please build the project first.", service_binary
            )));
        }

        Command::new(&service_binary)
            .arg("--dev")
            .arg("--dev-socket")
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FaceAuthError::Other(anyhow::anyhow!("Failed to start service: {}", e)))?;

        // Model loading happens before bind, so wait for the socket
        for _ in 0..20 {
            std::thread::sleep(Duration::from_millis(500));
            if self.socket_path.exists() {
                println!("Service started successfully");
                return Ok(());
            }
        }

        Err(FaceAuthError::Other(anyhow::anyhow!("Service failed to start within timeout")))
    }

    fn connect_with_retry(&self, max_retries: u32) -> Result<UnixStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match UnixStream::connect(&self.socket_path) {
                Ok(stream) => {
                    // Capture plus inference can take a while on a cold camera
                    stream.set_read_timeout(Some(Duration::from_secs(60)))?;
                    stream.set_write_timeout(Some(Duration::from_secs(10)))?;
                    return Ok(stream);
                }
                Err(e) if attempt < max_retries => {
                    tracing::warn!("Failed to connect (attempt {}): {}", attempt, e);
                    std::thread::sleep(Duration::from_millis(500));
                }
                Err(e) => {
                    return Err(FaceAuthError::Other(anyhow::anyhow!(
                        "Failed to connect to service at {}: {}", self.socket_path.display(), e
                    )));
                }
            }
        }
    }
}

fn accepted(resp: LoginResponse) -> Result<LoginResponse> {
    if resp.success {
        Ok(resp)
    } else {
        tracing::debug!("Login rejected: {}", resp.message);
        Err(FaceAuthError::NoMatch)
    }
}

fn unexpected(response: Response) -> FaceAuthError {
    match response {
        Response::Error(err) => FaceAuthError::Remote { kind: err.kind, message: err.message },
        _ => FaceAuthError::Protocol("Unexpected response type".into()),
    }
}

pub fn generate_challenge() -> Vec<u8> {
    let mut challenge = vec![0u8; 32];
    thread_rng().fill(&mut challenge[..]);
    challenge
}
