// src/main.rs
#[tokio::main]
async fn main() -> Result<(), vibe_poll::error::AppError> {
    vibe_poll::start_server().await
}
