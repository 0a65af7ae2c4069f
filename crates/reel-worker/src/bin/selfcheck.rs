use std::path::Path;

use reel_storage::R2Client;
use reel_worker::{app, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "reel-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    let ffmpeg = reel_media::check_ffmpeg()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    println!("reel-selfcheck: ffmpeg at {}", ffmpeg.display());
    app::load_fonts(&config.card)
        .map_err(|e| anyhow::anyhow!("card fonts not loadable: {}", e))?;
    ensure_env_present(&[
        "WP_URL",
        "USER_ACCESS_TOKEN",
        "R2_ENDPOINT_URL",
        "R2_ACCESS_KEY_ID",
        "R2_SECRET_ACCESS_KEY",
        "R2_BUCKET_NAME",
        "R2_PUBLIC_BASE_URL",
    ])?;
    if std::env::var("FACEBOOK_PAGE_ID").is_err() && std::env::var("INSTAGRAM_ID").is_err() {
        return Err(anyhow::anyhow!(
            "set FACEBOOK_PAGE_ID and/or INSTAGRAM_ID"
        ));
    }

    let store = R2Client::from_env().await?;
    store.check_connectivity().await?;
    println!("reel-selfcheck: R2 bucket reachable");

    println!("reel-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
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
