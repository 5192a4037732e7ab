use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use post_service::auth::TokenSigner;
use post_service::cache::CacheService;
use post_service::config::AppConfig;
use post_service::database::DatabaseService;
use post_service::handlers;
use post_service::memory::MemoryStore;
use post_service::services::PostService;
use post_service::store::RecordAccessor;
use std::sync::Arc;
use std::time::Duration;

async fn build_store(config: &AppConfig) -> Arc<dyn RecordAccessor> {
    match &config.database_url {
        Some(database_url) => match DatabaseService::new(config, database_url).await {
            Ok(service) => {
                info!("✅ Database service initialization successful");
                Arc::new(service)
            }
            Err(e) => {
                warn!("⚠️ Database service initialization failed: {}, will use memory storage", e);
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            warn!("⚠️ DATABASE_URL not set, memory storage will be used");
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_cache(config: &AppConfig) -> Option<Arc<CacheService>> {
    let redis_url = match &config.redis_url {
        Some(url) => url,
        None => {
            info!("REDIS_URL not set, recommend feed will not be cached");
            return None;
        }
    };

    let service = CacheService::new(redis_url, config.feed_cache_ttl_secs)
        .and_then(|service| service.ping().map(|_| service));
    match service {
        Ok(service) => {
            info!("✅ Redis cache service initialization successful: {}", redis_url);
            Some(Arc::new(service))
        }
        Err(e) => {
            warn!("⚠️ Redis cache service initialization failed: {}, cache will not be used", e);
            None
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    info!("Starting post service...");

    let config = AppConfig::from_env();
    let bind_address = config.bind_address();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let store = build_store(&config).await;
    let cache = build_cache(&config);
    let post_service = web::Data::new(Arc::new(PostService::new(store, cache)));
    let signer = web::Data::new(TokenSigner::new(config.secret_key.clone()));
    let prometheus = web::Data::new(prometheus);

    info!("Server running on http://{} ({} workers)", bind_address, config.workers);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(post_service.clone())
            .app_data(signer.clone())
            .app_data(prometheus.clone())
            .configure(handlers::configure)
    })
    .workers(config.workers)
    .max_connections(2000)
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(5))
    .bind(&bind_address)?
    .run()
    .await
}
