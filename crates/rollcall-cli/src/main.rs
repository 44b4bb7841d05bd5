use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::engine::FrameSource;
use rollcall_core::gallery::Gallery;
use rollcall_hw::Camera;

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify your face and mark attendance
    Mark {
        /// Identity label enrolled in the gallery
        id: String,
        /// Display name for the attendance record
        #[arg(short, long)]
        name: Option<String>,
        /// Session context (e.g. "2026-08-06-morning")
        #[arg(short, long, default_value = "")]
        session: String,
    },
    /// Show daemon status
    Status,
    /// Show recent attendance records
    History {
        /// Maximum number of records
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Inspect a gallery file
    Gallery {
        /// Path to the gallery JSON file
        path: PathBuf,
    },
    /// Run camera diagnostics
    CameraTest {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Save the captured frame to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn mark_attendance(
        &self,
        student_id: &str,
        display_name: &str,
        session: &str,
    ) -> zbus::Result<(bool, String)>;

    async fn status(&self) -> zbus::Result<String>;

    async fn recent_records(&self, limit: u32) -> zbus::Result<String>;
}

async fn connect() -> Result<AttendanceProxy<'static>> {
    let conn = if std::env::var("ROLLCALL_SESSION_BUS").is_ok() {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to the bus — is rollcalld running?")?;

    Ok(AttendanceProxy::new(&conn).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mark { id, name, session } => {
            let display_name = name.unwrap_or_else(|| id.clone());
            let proxy = connect().await?;
            let (success, message) = proxy.mark_attendance(&id, &display_name, &session).await?;
            println!("{message}");
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Status => {
            let proxy = connect().await?;
            let raw = proxy.status().await?;
            let status: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::History { limit } => {
            let proxy = connect().await?;
            let raw = proxy.recent_records(limit).await?;
            let events: serde_json::Value = serde_json::from_str(&raw)?;
            match events.as_array() {
                Some(list) if !list.is_empty() => {
                    for event in list {
                        println!(
                            "{}  {}  session={}  confidence={}%",
                            event["marked_at"].as_str().unwrap_or("?"),
                            event["display_name"].as_str().unwrap_or("?"),
                            event["session"].as_str().unwrap_or("-"),
                            event["confidence"]
                        );
                    }
                }
                _ => println!("No attendance records yet"),
            }
        }
        Commands::Gallery { path } => {
            let gallery = Gallery::load(&path)?;
            println!(
                "{} enrolled identities, embedding dimension {}",
                gallery.len(),
                gallery.dim()
            );
            for label in gallery.labels() {
                println!("  {label}");
            }
        }
        Commands::CameraTest { device, output } => {
            println!("Opening {device}...");
            let mut camera = Camera::open(&device)?;
            println!(
                "Negotiated {}x{} ({:?})",
                camera.width, camera.height, camera.fourcc
            );

            let frame = camera
                .read_frame()
                .map_err(|e| anyhow::anyhow!("capture failed: {e}"))?;
            let brightness = rollcall_hw::frame::avg_brightness(&frame.data);
            println!(
                "Captured {}x{} frame, average brightness {brightness:.1}",
                frame.width, frame.height
            );
            if brightness < 20.0 {
                println!("Warning: the frame is very dark — check lighting or lens cover");
            }

            if let Some(path) = output {
                let image =
                    image::RgbImage::from_raw(frame.width, frame.height, frame.data)
                        .context("frame buffer does not match its dimensions")?;
                image.save(&path)?;
                println!("Saved frame to {}", path.display());
            }

            let devices = Camera::list_devices();
            if devices.len() > 1 {
                println!("\nOther capture devices:");
                for info in devices {
                    if info.path != device {
                        println!("  {}  {} ({})", info.path, info.name, info.driver);
                    }
                }
            }
        }
    }

    Ok(())
}
