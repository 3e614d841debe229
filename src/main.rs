use facegate::{
    camera::Camera,
    common::{Config, DevMode, FaceAuthError},
    service::{ServiceClient, SigningKey},
    storage::{FileIdentityStore, FileLoginRecorder, IdentityStore, LoginRecorder},
};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face login for registered users")]
struct Cli {
    /// Enable development mode (local data dir and dev socket)
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user with the face in front of the camera
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
    },
    /// Log in with the face in front of the camera
    Login,
    /// List registered users
    List,
    /// Show recorded login attempts
    History {
        /// Only show attempts for this user id
        #[arg(short, long)]
        user_id: Option<u64>,
    },
    /// Capture a single frame to check the camera
    TestCamera,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let config = Config::load_for_mode(cli.dev).context("Failed to load configuration")?;
    let dev_mode = DevMode::new(cli.dev, &config)?;
    let client = ServiceClient::new(dev_mode.socket_path(&config), cli.dev);

    match cli.command {
        Commands::Register { username, email } => {
            println!("Registering {} - look at the camera", username);
            let resp = client.register(&username, &email)?;
            println!("✅ {} (id {})", resp.message, resp.id);
        }
        Commands::Login => {
            println!("Look at the camera...");
            let (resp, challenge) = match client.login() {
                Err(FaceAuthError::NoMatch) => {
                    println!("❌ Face not recognized. Please register first.");
                    return Err(FaceAuthError::NoMatch.into());
                }
                other => other?,
            };

            println!("✅ {}", resp.message);
            if let Some(distance) = resp.distance {
                println!("   Distance: {:.4}", distance);
            }

            // The key is only readable where the service's data dir is
            let key_file = dev_mode.signing_key_file();
            if let (true, Some(user_id)) = (key_file.exists(), resp.user_id) {
                let key = SigningKey::load_or_create(&key_file)?;
                if key.verify(&challenge, user_id, &resp.signature) {
                    println!("   Signature verified");
                } else {
                    anyhow::bail!("Login response signature did not verify");
                }
            }
        }
        Commands::List => {
            let store = FileIdentityStore::new(dev_mode.users_dir())?;
            let users = store.list_identities()?;
            if users.is_empty() {
                println!("No registered users");
            }
            for user in users {
                println!(
                    "{:>4}  {:<20} {:<30} {}{}",
                    user.id,
                    user.username,
                    user.email,
                    user.created_at.format("%Y-%m-%d %H:%M"),
                    if user.face_encoding.is_some() { "" } else { "  (no face)" }
                );
            }
        }
        Commands::History { user_id } => {
            let history = FileLoginRecorder::new(dev_mode.history_file())?;
            let attempts = history.history(user_id)?;
            if attempts.is_empty() {
                println!("No login attempts recorded");
            }
            for attempt in attempts {
                let who = attempt
                    .user_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let distance = attempt
                    .distance
                    .map(|d| format!("{:.4}", d))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<8} user {:<6} distance {}",
                    attempt.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    if attempt.success { "SUCCESS" } else { "FAILED" },
                    who,
                    distance
                );
            }
        }
        Commands::TestCamera => {
            println!("Testing camera {}...", config.camera.device_index);
            let mut camera = Camera::new(&config)?;
            let frame = camera.capture_frame()?;
            println!("✅ Captured {}x{} frame", frame.width(), frame.height());

            if dev_mode.is_enabled() {
                let path = dev_mode.get_capture_path("test");
                frame.save(&path)?;
                println!("   Saved to {}", path.display());
            }
        }
    }

    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
