use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "secureface", about = "SecureFace visitor recognition CLI")]
struct Cli {
    /// Base URL of the securefaced HTTP API
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show age, gender and emotion estimates for the face in an image
    Detect {
        image: PathBuf,
    },
    /// Register the face in an image as a known user
    Register {
        image: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        gender: String,
    },
    /// Identify the face in an image, recording a visitor if unknown
    Match {
        image: PathBuf,
    },
    /// List registered users
    Users,
    /// List recently recorded visitors
    Visitors {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Manage the provider faceset
    Faceset {
        #[command(subcommand)]
        command: FacesetCommands,
    },
    /// Check that the daemon is reachable
    Status,
}

#[derive(Subcommand)]
enum FacesetCommands {
    /// Create a new faceset (run once per deployment)
    Create {
        #[arg(long)]
        outer_id: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Show the configured faceset and its face tokens
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/').to_string();
    let url = |path: &str| format!("{base}{path}");

    let request = match cli.command {
        Commands::Detect { image } => client.post(url("/detect")).multipart(image_form(&image).await?),
        Commands::Register {
            image,
            name,
            age,
            gender,
        } => {
            let form = image_form(&image)
                .await?
                .text("name", name)
                .text("age", age.to_string())
                .text("gender", gender);
            client.post(url("/register")).multipart(form)
        }
        Commands::Match { image } => client.post(url("/match")).multipart(image_form(&image).await?),
        Commands::Users => client.get(url("/users")),
        Commands::Visitors { limit } => client.get(url("/visitors")).query(&[("limit", limit)]),
        Commands::Faceset { command } => match command {
            FacesetCommands::Create {
                outer_id,
                display_name,
            } => {
                let mut query = Vec::new();
                if let Some(id) = outer_id {
                    query.push(("outer_id", id));
                }
                if let Some(name) = display_name {
                    query.push(("display_name", name));
                }
                client.post(url("/faceset")).query(&query)
            }
            FacesetCommands::Show => client.get(url("/faceset")),
        },
        Commands::Status => client.get(url("/")),
    };

    tracing::debug!(server = %base, "sending request");
    let response = request
        .send()
        .await
        .with_context(|| format!("securefaced not reachable at {base}"))?;
    let status = response.status();
    let body = response.text().await.context("failed to read response")?;

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }

    if !status.is_success() {
        bail!("request failed with status {status}");
    }
    Ok(())
}

/// Multipart form carrying the image file under the `image` field.
async fn image_form(path: &Path) -> Result<Form> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(Form::new().part("image", Part::bytes(bytes).file_name(file_name)))
}
