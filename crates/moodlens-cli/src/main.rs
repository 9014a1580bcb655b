use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use moodlens_advice::{AdviceResponder, GeminiConfig, Persona};
use moodlens_core::{build_splits, Frame, ModelFiles, MoodPredictor};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[zbus::proxy(
    interface = "org.freedesktop.MoodLens1",
    default_service = "org.freedesktop.MoodLens1",
    default_path = "/org/freedesktop/MoodLens1"
)]
trait MoodLens {
    async fn predict(&self, image: &[u8], role: &str) -> zbus::Result<String>;
    async fn predict_file(&self, path: &str, role: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "moodlens", about = "Facial mood recognition CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image locally and print the result as JSON
    Predict {
        image: PathBuf,
        /// Advice persona (Friend, Professional, Roaster, Strict, Poet)
        #[arg(short, long, default_value = "Friend")]
        role: String,
        /// Use the built-in suggestion table instead of Gemini
        #[arg(long)]
        no_advice: bool,
    },
    /// Export train/test landmark features to CSV
    Dataset {
        /// Directory holding `train/` and `test/` label folders
        #[arg(long, default_value = "dataset")]
        root: PathBuf,
        /// Where face_train.csv and face_test.csv are written
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Classify an image through the running daemon
    Ask {
        image: PathBuf,
        #[arg(short, long, default_value = "Friend")]
        role: String,
        /// Send the file path instead of the image bytes
        #[arg(long)]
        by_path: bool,
    },
    /// Show daemon status
    Status,
    /// List advice personas
    Personas,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict {
            image,
            role,
            no_advice,
        } => predict_local(&image, &role, no_advice).await?,
        Commands::Dataset { root, out_dir } => export_dataset(&root, &out_dir)?,
        Commands::Ask {
            image,
            role,
            by_path,
        } => {
            let proxy = connect(cli.system).await?;
            let body = if by_path {
                let path = std::fs::canonicalize(&image)
                    .with_context(|| format!("cannot resolve {}", image.display()))?;
                proxy.predict_file(&path.to_string_lossy(), &role).await?
            } else {
                let bytes = std::fs::read(&image)
                    .with_context(|| format!("cannot read {}", image.display()))?;
                proxy.predict(&bytes, &role).await?
            };
            print_json(&body)?;
        }
        Commands::Status => {
            let proxy = connect(cli.system).await?;
            print_json(&proxy.status().await?)?;
        }
        Commands::Personas => {
            for persona in Persona::ALL {
                println!("{persona}");
            }
        }
    }

    Ok(())
}

async fn predict_local(image: &Path, role: &str, no_advice: bool) -> Result<()> {
    let frame = Frame::open(image).with_context(|| format!("cannot open {}", image.display()))?;

    let predictor = MoodPredictor::new(ModelFiles::from_env());
    let prediction = tokio::task::spawn_blocking(move || predictor.predict_mood(&frame)).await?;

    let advice = if no_advice {
        AdviceResponder::unconfigured()
    } else {
        AdviceResponder::configure(GeminiConfig::from_env())
    };
    let suggestion = advice.advise(&prediction.label, role).await;

    let out = serde_json::json!({
        "mood": prediction.label,
        "confidence": prediction.confidence,
        "suggestion": suggestion,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn export_dataset(root: &Path, out_dir: &Path) -> Result<()> {
    let provider = ModelFiles::from_env()
        .load_face_mesh()
        .context("failed to load landmark models")?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create {}", out_dir.display()))?;

    tracing::info!(root = %root.display(), out_dir = %out_dir.display(), "building dataset");
    let results = build_splits(&provider, root, out_dir);
    let mut written = 0;
    for (split, result) in &results {
        match result {
            Ok(stats) => {
                written += 1;
                println!(
                    "{split}: {} samples from {} images \
                     ({} unreadable, {} without a face, {} failed)",
                    stats.extracted(),
                    stats.images,
                    stats.unreadable,
                    stats.no_face,
                    stats.failed
                );
                for (label, count) in &stats.per_label {
                    println!("  {label}: {count}");
                }
            }
            Err(e) => println!("{split}: skipped ({e})"),
        }
    }

    if written == 0 {
        bail!("no data found under {}", root.display());
    }
    Ok(())
}

async fn connect(system: bool) -> Result<MoodLensProxy<'static>> {
    let system = system
        || std::env::var("MOODLENS_BUS")
            .map(|v| v.eq_ignore_ascii_case("system"))
            .unwrap_or(false);
    let builder = if system {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let conn = builder
        .method_timeout(Duration::from_secs(60))
        .build()
        .await
        .context("cannot connect to D-Bus; is moodlensd running?")?;
    Ok(MoodLensProxy::new(&conn).await?)
}

fn print_json(body: &str) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(body).context("daemon sent malformed JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
