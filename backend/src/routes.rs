use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use shared::{HistoryEntry, HistoryView, ImageAnalysisRequest, TextAnalysisRequest};

use crate::auth::Session;
use crate::detection::DetectionService;
use crate::error::ApiError;
use crate::history::ReconcilerRegistry;

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    index: Option<usize>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/detect/text").route(web::post().to(detect_text)))
            .service(web::resource("/detect/image").route(web::post().to(detect_image)))
            .service(
                web::resource("/history")
                    .route(web::get().to(list_history))
                    .route(web::delete().to(clear_history)),
            )
            .service(web::resource("/history/{id}").route(web::delete().to(delete_history_item)))
            .service(web::resource("/history/{id}/undo").route(web::post().to(undo_delete))),
    );
}

fn require_user(session: &Session) -> Result<&str, ApiError> {
    session
        .current_user_id()
        .ok_or_else(|| ApiError::NotAuthenticated("Sign in to manage history".to_string()))
}

async fn health(service: web::Data<DetectionService>) -> Result<HttpResponse, ApiError> {
    let health = service.classifier().health().await.map_err(|e| {
        log::warn!("Classifier health check failed: {}", e);
        ApiError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(health))
}

async fn detect_text(
    service: web::Data<DetectionService>,
    registry: web::Data<ReconcilerRegistry>,
    session: Session,
    body: web::Json<TextAnalysisRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = session.current_user_id();
    let detection = service.detect_text(user_id, &body.text).await?;

    if let (Some(user_id), Some(record)) = (user_id, &detection.record) {
        registry.for_user(user_id).insert_front(record.clone());
    }
    Ok(HttpResponse::Ok().json(detection.report()))
}

async fn detect_image(
    service: web::Data<DetectionService>,
    registry: web::Data<ReconcilerRegistry>,
    session: Session,
    body: web::Json<ImageAnalysisRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = session.current_user_id();
    let detection = service.detect_image(user_id, &body.image).await?;

    if let (Some(user_id), Some(record)) = (user_id, &detection.record) {
        registry.for_user(user_id).insert_front(record.clone());
    }
    Ok(HttpResponse::Ok().json(detection.report()))
}

async fn list_history(
    registry: web::Data<ReconcilerRegistry>,
    session: Session,
) -> Result<HttpResponse, ApiError> {
    let Some(user_id) = session.current_user_id() else {
        return Ok(HttpResponse::Ok().json(HistoryView::NotAuthenticated));
    };

    let records = registry.for_user(user_id).refresh().await?;
    let entries = records.into_iter().map(HistoryEntry::from).collect();
    Ok(HttpResponse::Ok().json(HistoryView::Loaded { entries }))
}

async fn delete_history_item(
    registry: web::Data<ReconcilerRegistry>,
    session: Session,
    path: web::Path<String>,
    query: web::Query<DeleteQuery>,
) -> Result<HttpResponse, ApiError> {
    let reconciler = registry.for_user(require_user(&session)?);
    reconciler.ensure_loaded().await?;

    let ticket = reconciler.delete(&path, query.index).await?;
    Ok(HttpResponse::Ok().json(ticket))
}

async fn undo_delete(
    registry: web::Data<ReconcilerRegistry>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let reconciler = registry.for_user(require_user(&session)?);
    let record = reconciler.undo(&path).await?;
    Ok(HttpResponse::Ok().json(HistoryEntry::from(record)))
}

async fn clear_history(
    registry: web::Data<ReconcilerRegistry>,
    session: Session,
) -> Result<HttpResponse, ApiError> {
    let reconciler = registry.for_user(require_user(&session)?);
    reconciler.ensure_loaded().await?;

    let deleted = reconciler.clear().await?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}
