//! Headless smoke run: resolve a session, load one room, print the result.

mod config;
mod logging;

use std::{process::ExitCode, sync::Arc};

use tracing::{error, info};

use weft_core::SessionCredentials;
use weft_engine::{
    CredentialResolver, InMemoryMessageCache, LoadOptions, SessionConfig, SessionContext,
};
use weft_matrix::{MatrixClientConfig, MatrixClientFactory};
use weft_store::{InMemoryStringStore, InMemoryStructuredStore};

use config::SmokeConfig;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    let Some(user_id) = config.user_id.clone() else {
        info!("set WEFT_USER (and WEFT_PASSWORD for first login) to run a live smoke");
        return ExitCode::SUCCESS;
    };

    let structured = Arc::new(InMemoryStructuredStore::default());
    let strings = Arc::new(InMemoryStringStore::default());
    let resolver = CredentialResolver::new(structured, strings, None);

    let factory = Arc::new(MatrixClientFactory::new(MatrixClientConfig::new(
        config.homeserver.clone(),
        config.data_dir_root.clone(),
        None,
    )));

    // First run has no stored session material; perform the password login
    // once and write the resulting session into the credential tiers.
    if resolver.resolve(&user_id).await.is_err() {
        let Some(password) = config.password.clone() else {
            error!(user_id = %user_id, "no stored credentials and no WEFT_PASSWORD set");
            return ExitCode::FAILURE;
        };
        match bootstrap_login(&resolver, factory.as_ref(), &config, &user_id, &password).await {
            Ok(()) => info!(user_id = %user_id, "first login succeeded"),
            Err(err) => {
                error!(error = %err, "first login failed");
                return ExitCode::FAILURE;
            }
        }
    }

    let ctx = SessionContext::new(
        SessionConfig {
            user_id: user_id.clone(),
            cache_first: config.cache_first,
        },
        resolver,
        factory,
        Arc::new(InMemoryMessageCache::new()),
    );

    match ctx.init().await {
        Ok(client) => {
            info!(user_id = %user_id, "session established");
            drop(client);
        }
        Err(err) => {
            error!(error = %err, "failed to establish a session");
            return ExitCode::FAILURE;
        }
    }

    if let Some(room_id) = config.room_id.clone() {
        let messages = ctx
            .messages()
            .load_messages(
                &room_id,
                LoadOptions {
                    limit: config.load_limit,
                    force_refresh: true,
                    ..LoadOptions::default()
                },
            )
            .await;
        info!(room_id = %room_id, count = messages.len(), "reconciled room timeline");
        for message in &messages {
            println!(
                "[{}] {}: {}",
                message.timestamp_ms, message.sender_display_name, message.body
            );
        }
    }

    ctx.teardown().await;
    ExitCode::SUCCESS
}

/// One-time password login; persists the rotated session token to the tiers.
async fn bootstrap_login(
    resolver: &CredentialResolver,
    factory: &MatrixClientFactory,
    config: &SmokeConfig,
    user_id: &str,
    password: &str,
) -> Result<(), weft_core::EngineError> {
    use weft_engine::{ChatClient as _, ClientFactory};

    let client = factory
        .build(&SessionCredentials {
            user_id: user_id.to_owned(),
            access_token: String::new(),
            device_id: String::new(),
            homeserver_url: config.homeserver.clone(),
            password: Some(password.to_owned()),
        })
        .await?;

    let mut credentials = client
        .session_credentials()
        .ok_or_else(|| weft_core::EngineError::no_credentials_found(user_id))?;
    credentials.password = Some(password.to_owned());
    resolver.persist(&credentials);
    client.stop().await;
    Ok(())
}
