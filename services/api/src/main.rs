mod auth;
mod config;
mod error;
mod routes;

use crate::config::Config;
use crate::routes::{AppState, router};
use anyhow::Context;
use hireai_core::approval::ApprovalService;
use hireai_core::avatar::{AvatarClient, AvatarRenderer};
use hireai_core::identity::{ClerkClient, IdentityProvider};
use hireai_core::interviewer::InterviewerClient;
use hireai_core::prompt_loader::Prompts;
use hireai_core::registration::Validator;
use hireai_core::store::MemoryStore;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let prompts = Prompts::load(config.prompts_dir.as_deref())?;
    let interviewer = InterviewerClient::new(
        config.openai_api_key.clone(),
        config.chat_model.clone(),
        prompts,
    );
    let identity: Arc<dyn IdentityProvider> = Arc::new(ClerkClient::new(
        config.clerk_secret_key.clone(),
        config.clerk_api_url.clone(),
    ));
    let avatar = config.avatar.clone().map(|avatar_config| {
        info!("Avatar video enabled for avatar {}", avatar_config.avatar_id);
        Arc::new(AvatarClient::new(avatar_config)) as Arc<dyn AvatarRenderer>
    });

    let store = Arc::new(MemoryStore::open());
    let validator = Validator::new().context("Failed to compile registration patterns")?;
    let approvals = ApprovalService::new(store.clone(), identity.clone(), validator);

    let state = AppState {
        interviewer: Arc::new(interviewer),
        identity,
        approvals: Arc::new(approvals),
        store: store.clone(),
        avatar,
    };

    // Permissive CORS so the browser frontend can call the API from its own origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    info!("Starting API server, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, shutting down.");
            }
        })
        .await?;

    store.close().await;
    Ok(())
}
