//! Backfill profiles for users created before profiles existed.

use bloghub::db::{self, users, DbConfig};
use bloghub::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::init_cli();

    let pool = db::connect(&DbConfig::default()).await?;
    db::run_migrations(&pool).await?;

    let all = users::all(&pool).await?;
    let mut created = 0;
    for user in &all {
        let (_, was_created) = users::get_or_create_profile(&pool, user.id).await?;
        if was_created {
            created += 1;
            println!("Profile created for {}", user.username);
        } else {
            println!("Profile already exists for {}", user.username);
        }
    }

    println!("Done: {} users checked, {} profiles created.", all.len(), created);
    Ok(())
}
