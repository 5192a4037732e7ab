use crate::auth::Principal;
use crate::error::AppError;
use crate::models::*;
use crate::services::PostService;
use actix_web::{web, HttpResponse};
use log::info;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

type HandlerResult = Result<HttpResponse, AppError>;

pub async fn star_post(
    service: web::Data<Arc<PostService>>,
    principal: Principal,
    query: web::Query<PostIdQuery>,
) -> HandlerResult {
    service.star(principal.account_id, query.id).await?;
    Ok(HttpResponse::Ok().json(StatusResponse::ok("favorited")))
}

pub async fn like_post(
    service: web::Data<Arc<PostService>>,
    principal: Principal,
    query: web::Query<PostIdQuery>,
) -> HandlerResult {
    service.like(principal.account_id, query.id).await?;
    Ok(HttpResponse::Ok().json(StatusResponse::ok("liked")))
}

pub async fn get_comments(
    service: web::Data<Arc<PostService>>,
    query: web::Query<HashMap<String, String>>,
) -> HandlerResult {
    let comments = service.comments(&query).await?;
    info!("Retrieved {} of {} post comments", comments.data.len(), comments.total);
    Ok(HttpResponse::Ok().json(comments))
}

pub async fn get_posts(
    service: web::Data<Arc<PostService>>,
    query: web::Query<HashMap<String, String>>,
) -> HandlerResult {
    let posts = service.find(&query).await?;
    info!("Retrieved {} of {} posts", posts.data.len(), posts.total);
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn get_recommended(service: web::Data<Arc<PostService>>) -> HandlerResult {
    let feed = service.recommend().await?;
    Ok(HttpResponse::Ok().json(feed))
}

pub async fn get_post(service: web::Data<Arc<PostService>>, path: web::Path<i64>) -> HandlerResult {
    let post = service.find_one(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn count_posts(
    service: web::Data<Arc<PostService>>,
    query: web::Query<HashMap<String, String>>,
) -> HandlerResult {
    let count = service.count(&query).await?;
    Ok(HttpResponse::Ok().json(count))
}

pub async fn create_post(
    service: web::Data<Arc<PostService>>,
    principal: Principal,
    request: web::Json<CreatePostRequest>,
) -> HandlerResult {
    let post = service
        .create(principal.account_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(StatusResponse::with_data("created", post)))
}

pub async fn update_post(
    service: web::Data<Arc<PostService>>,
    path: web::Path<i64>,
    request: web::Json<UpdatePostRequest>,
) -> HandlerResult {
    let post = service
        .update(path.into_inner(), request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn delete_post(
    service: web::Data<Arc<PostService>>,
    path: web::Path<i64>,
) -> HandlerResult {
    let post = service.destroy(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn health(service: web::Data<Arc<PostService>>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "store": service.store_kind(),
        "feed_cache": service.cache_enabled(),
        "database": service.store_stats(),
        "timestamp": chrono::Utc::now(),
    }))
}

pub async fn metrics(handle: Option<web::Data<PrometheusHandle>>) -> HttpResponse {
    match handle {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable()
            .json(ApiResponse::<()>::error("metrics recorder not installed".to_string())),
    }
}

/// Routes and extractor settings shared by the server and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(1024 * 1024)
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    )
    .route("/health", web::get().to(health))
    .route("/metrics", web::get().to(metrics))
    .service(
        web::scope("/api")
            // literal segments before `{id}`
            .route("/posts", web::get().to(get_posts))
            .route("/posts", web::post().to(create_post))
            .route("/posts/count", web::get().to(count_posts))
            .route("/posts/recommend", web::get().to(get_recommended))
            .route("/posts/comments", web::get().to(get_comments))
            .route("/posts/star", web::post().to(star_post))
            .route("/posts/like", web::post().to(like_post))
            .route("/posts/{id}", web::get().to(get_post))
            .route("/posts/{id}", web::put().to(update_post))
            .route("/posts/{id}", web::delete().to(delete_post)),
    );
}
