mod db;
mod error;
mod models;
mod tally;
mod web;

use db::Database;
use log::{error, info};
use models::PartyRoster;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    // Initialize database
    let database = match Database::new().await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    let roster = PartyRoster::from_env();
    info!("tracking {} parties", roster.len());

    let app = web::router(web::AppState {
        db: database,
        roster,
    });

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5001".to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    info!("listening on {}", addr);

    if let Err(why) = axum::serve(listener, app).await {
        error!("Server error: {:?}", why);
    }
}
