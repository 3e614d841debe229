use facegate::{
    camera::Camera,
    common::{Config, DevMode},
    core::{FaceAuth, MatchPolicy, OnnxOracle},
    service::{serve_connection, RequestHandler, SigningKey},
    storage::{FileIdentityStore, FileLoginRecorder},
};
use anyhow::{Context as _, Result};
use clap::Parser;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "facegate-service")]
#[command(about = "FaceGate face matching service")]
struct Args {
    /// Run in development mode
    #[arg(long)]
    dev: bool,

    /// Socket path in dev mode
    #[arg(long, default_value = facegate::common::dev_mode::DEV_SOCKET_PATH)]
    dev_socket: PathBuf,

    /// Data directory in dev mode
    #[arg(long, default_value = facegate::common::dev_mode::DEV_BASE_DIR)]
    dev_data_dir: PathBuf,

    /// Config file, overriding the mode default
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let builder = tracing_subscriber::fmt().with_writer(std::io::stderr);
    if args.dev {
        builder.with_max_level(tracing::Level::DEBUG).init();
    } else {
        builder.init();
    }

    tracing::info!("Starting FaceGate service (dev_mode: {})", args.dev);

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load_for_mode(args.dev),
    }
    .context("Failed to load configuration")?;

    let dev_mode = if args.dev {
        DevMode::with_base_dir(true, args.dev_data_dir.clone())?
    } else {
        DevMode::new(false, &config)?
    };
    let socket_path = if args.dev {
        args.dev_socket.clone()
    } else {
        config.service.socket_path.clone()
    };

    // Models are loaded once and reused; the camera is opened per request
    let oracle = OnnxOracle::new(&config).context("Failed to load face models")?;
    let store = FileIdentityStore::new(dev_mode.users_dir())?;
    let history = FileLoginRecorder::new(dev_mode.history_file())?;
    let signing_key = SigningKey::load_or_create(&dev_mode.signing_key_file())?;
    let handler = RequestHandler::new(
        FaceAuth::new(&oracle, &store, &history, MatchPolicy::from_config(&config)),
        &signing_key,
    );

    let listener = bind_socket(&socket_path)?;
    tracing::info!("Listening on {}", socket_path.display());

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = handle_client(stream, &handler, &config) {
                    tracing::error!("Client error: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("Connection error: {}", e);
            }
        }
    }

    Ok(())
}

fn bind_socket(socket_path: &Path) -> Result<UnixListener> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove stale socket {}", socket_path.display()))?;
    }
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind Unix socket")?;

    // Any local user may ask to log in; authorization is the signed response
    fs::set_permissions(socket_path, fs::Permissions::from_mode(0o666))?;
    Ok(listener)
}

fn handle_client(
    mut stream: UnixStream,
    handler: &RequestHandler<'_, OnnxOracle, FileIdentityStore, FileLoginRecorder>,
    config: &Config,
) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(config.service.read_timeout_secs)))?;
    stream.set_write_timeout(Some(Duration::from_secs(config.service.write_timeout_secs)))?;

    serve_connection(&mut stream, handler, || Camera::new(config))?;
    Ok(())
}
