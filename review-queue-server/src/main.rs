use anyhow::{Context, Result};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use review_queue_core::{Extractor, QueueEngine};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use review_queue_server::config::Config;
use review_queue_server::events::slack_router;
use review_queue_server::reminder::{reminder_loop, ReminderSchedule};
use review_queue_server::{AppState, QueueContext, QueueSettings, RecordingLogger, SlackClient};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "review-queue"
    })))
}

async fn help_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "review-queue",
        "version": review_queue_server::get_bot_version(),
        "description": "Keeps a pinned queue of pull requests awaiting review in each Slack channel",
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint",
                "authentication": "None"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "Service information",
                "authentication": "None"
            },
            {
                "path": "/slack/events",
                "method": "POST",
                "description": "Events API: messages with PR links and completion reactions",
                "authentication": "Slack request signature (X-Slack-Signature)"
            },
            {
                "path": "/slack/actions",
                "method": "POST",
                "description": "Interactivity: the Complete button on queue entries",
                "authentication": "Slack request signature (X-Slack-Signature)"
            },
            {
                "path": "/slack/commands",
                "method": "POST",
                "description": "The /prs slash command",
                "authentication": "Slack request signature (X-Slack-Signature)"
            }
        ],
        "commands": review_queue_server::command::usage(),
        "configuration": {
            "required_env_vars": [
                "SLACK_BOT_TOKEN",
                "SLACK_SIGNING_SECRET"
            ],
            "optional_env_vars": [
                "SLACK_BOT_USER_ID (default: discovered with auth.test)",
                "SLACK_API_BASE (default: https://slack.com/api)",
                "PORT (default: 3000)",
                "ORG_REPOS (comma-separated, first match wins)",
                "TOMBSTONE_POLICY (discard | until-next-load | permanent, default: until-next-load)",
                "CONFIRM_ADDITIONS (default: true)",
                "COMPLETION_REACTIONS (default: white_check_mark,heavy_check_mark)",
                "REMINDER_DAYS (default: mon,tue,wed,thu,fri)",
                "REMINDER_HOUR (default: 9)",
                "REMINDER_UTC_OFFSET_HOURS (default: 0)",
                "RECORDING_ENABLED (default: false)",
                "RECORDING_LOG_PATH (default: recordings.jsonl)"
            ]
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting review queue {}", review_queue_server::get_bot_version());

    let config = Config::from_env().context("Failed to load configuration from environment variables")?;

    let recording_logger = if config.recording_enabled {
        match RecordingLogger::new(PathBuf::from(&config.recording_log_path)) {
            Ok(logger) => {
                info!("Recording enabled, logging to: {}", config.recording_log_path);
                Some(logger)
            }
            Err(e) => {
                error!("Failed to initialize recording logger: {}", e);
                None
            }
        }
    } else {
        None
    };

    let slack = SlackClient::new_with_recording(
        &config.slack_api_base,
        &config.slack_bot_token,
        recording_logger.clone(),
    )?;

    let bot_user_id = match &config.slack_bot_user_id {
        Some(id) => id.clone(),
        None => slack
            .auth_test()
            .await
            .context("SLACK_BOT_USER_ID is unset and auth.test failed")?,
    };
    info!("Acting as bot user {}", bot_user_id);

    let schedule = ReminderSchedule::new(
        config.reminder_days.clone(),
        config.reminder_hour,
        config.reminder_utc_offset_hours,
    )?;

    let queue = Arc::new(QueueContext::new(
        Arc::new(slack),
        bot_user_id,
        Extractor::new(config.org_repos.clone()),
        QueueEngine::new(config.tombstone_policy),
        QueueSettings {
            confirm_additions: config.confirm_additions,
            completion_reactions: config.completion_reactions.clone(),
        },
    ));
    info!(
        "Tombstone policy {}, {} repos in the allow-list",
        config.tombstone_policy,
        config.org_repos.len()
    );

    let app_state = Arc::new(AppState {
        queue: queue.clone(),
        signing_secret: config.slack_signing_secret.clone(),
        recording_logger,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .merge(slack_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    tokio::spawn(async move {
        reminder_loop(queue, schedule).await;
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
