use std::process::ExitCode;

use core_smap::{Stores, get_api_base_url, setup_logging};
use data_model_smap::{PgStore, get_db_pool};

use api_smap::{AppState, router};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    setup_logging("api_smap=debug,tower_http=debug");

    let pool = match get_db_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Couldn't connect to the database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let app = router().with_state(AppState::from_stores(&Stores::from_store(PgStore::new(pool))));

    let addr = match get_api_base_url() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid HOST or PORT: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Serving sitemaps on http://{}", addr);
    match axum::serve(listener, app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
