mod auth;
mod classifier;
mod config;
mod detection;
mod error;
mod history;
mod routes;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use auth::JwtService;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use classifier::{ClassificationClient, Classifier};
use config::{AppConfig, HistoryBackend};
use detection::DetectionService;
use history::{DynamoHistoryStore, HistoryStore, MemoryHistoryStore, ReconcilerRegistry};
use routes::configure_routes;
use std::sync::Arc;

fn startup_error(message: String) -> std::io::Error {
    log::error!("{}", message);
    std::io::Error::other(message)
}

async fn build_history_store(config: &AppConfig) -> Arc<dyn HistoryStore> {
    match config.history.backend {
        HistoryBackend::Dynamodb => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            let client = DynamoDbClient::new(&aws_config);
            log::info!(
                "Using DynamoDB history table '{}' (index '{}')",
                config.history.table,
                config.history.user_index
            );
            Arc::new(DynamoHistoryStore::new(
                client,
                config.history.table.clone(),
                config.history.user_index.clone(),
            ))
        }
        HistoryBackend::Memory => {
            log::warn!("Using in-memory history store; history is lost on restart");
            Arc::new(MemoryHistoryStore::new())
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load()
        .map_err(|e| startup_error(format!("Configuration error: {}", e)))?;

    let client = ClassificationClient::new(&config.classifier)
        .map_err(|e| startup_error(format!("Classifier client setup failed: {}", e)))?;
    match client.health().await {
        Ok(health) => log::info!("Classifier is {}", health.status),
        Err(e) => log::warn!("Classifier is unreachable at startup: {}", e),
    }
    let classifier: Arc<dyn Classifier> = Arc::new(client);

    let store = build_history_store(&config).await;
    let detection_service = web::Data::new(DetectionService::new(classifier, store.clone()));
    let registry = web::Data::new(ReconcilerRegistry::new(
        store,
        config.history.undo_window(),
    ));
    let jwt_service = web::Data::new(JwtService::new(&config.jwt_secret));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::JsonConfig::default().limit(20 * 1024 * 1024))
            .app_data(detection_service.clone())
            .app_data(registry.clone())
            .app_data(jwt_service.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
