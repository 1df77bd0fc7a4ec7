//! Startup probe: verifies the scratch directory, media tools and required settings.

use std::path::Path;

use mediaflow_media::check_binary;
use mediaflow_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with temp_dir={}",
        config.temp_dir.display()
    );
    ensure_temp_dir(&config.temp_dir).await?;
    ensure_tool("ffmpeg", &config.ffmpeg_path)?;
    ensure_tool("ffprobe", &config.ffprobe_path)?;
    ensure_env_present(&["REDIS_URL", "R2_ENDPOINT_URL", "R2_BUCKET_NAME"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_temp_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_tool(tool: &'static str, path: &Path) -> anyhow::Result<()> {
    let resolved = check_binary(tool, path)?;
    println!("worker-selfcheck: {} at {}", tool, resolved.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
