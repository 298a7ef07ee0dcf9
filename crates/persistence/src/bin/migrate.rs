#![deny(warnings)]

use persistence::{db, default_sqlite_url};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("LIFEQUEST_DATABASE_URL").unwrap_or_else(|_| default_sqlite_url().to_string());
    // Ensure directory exists
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path.filter(|p| !p.contains(":memory:")) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let pool = persistence::init_db(&url).await?;
    let achievements = db::list_achievements(&pool).await?;
    let purged = db::purge_expired_sessions(&pool).await?;
    println!(
        "DB migrated at {} | achievements: {} | expired sessions purged: {}",
        url,
        achievements.len(),
        purged
    );
    Ok(())
}
