//! Ping service: bootstraps from the environment and answers on
//! `/v1/<service-name>/ping`.

use keystone::config::EnvSource;
use keystone::prelude::*;
use serde_json::{Value, json};

const DEFAULT_SERVICE_NAME: &str = "keystone";
const DEFAULT_PORT: &str = "8080";

async fn pong() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "pong" }))
}

async fn pong_with(Path(test): Path<String>) -> Json<Value> {
    tracing::debug!("ping with parameter {}", test);
    pong().await
}

fn ping_routes() -> Router {
    Router::new()
        .route("/", get(pong).post(pong))
        .route(
            "/{test}",
            get(pong_with)
                .put(pong_with)
                .patch(pong_with)
                .delete(pong_with),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = EnvSource::from_process();
    let service = start_service(Options::new().with_defaults(&env)).await?;

    let name = service
        .meta()
        .map(|meta| meta.name.clone())
        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
    service.group(&format!("/v1/{name}/ping"), ping_routes())?;

    let port = env.get_or("PORT", DEFAULT_PORT);
    service.serve(&format!("0.0.0.0:{port}")).await?;
    Ok(())
}
