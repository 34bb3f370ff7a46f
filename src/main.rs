#[macro_use]
extern crate rocket;

use asura::config::Config;
use asura::db::Db;
use asura::pipeline::Pipeline;
use asura::store::SqliteStore;
use rocket::fairing::AdHoc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::Value;
use std::sync::Arc;

/// The only HTTP surface this crate serves itself — heartbeat monitors are
/// pinged by an external process on their own cadence, so there has to be
/// somewhere to receive that ping. Everything else (CRUD, dashboards,
/// status pages) is an admin surface that mounts onto this same
/// `rocket::Rocket` instance rather than living in this crate.
#[get("/api/v1/heartbeat/<token>")]
async fn heartbeat_get(token: &str, pipeline: &State<Arc<Pipeline>>) -> (Status, Json<Value>) {
    heartbeat_ping(token, pipeline).await
}

#[post("/api/v1/heartbeat/<token>")]
async fn heartbeat_post(token: &str, pipeline: &State<Arc<Pipeline>>) -> (Status, Json<Value>) {
    heartbeat_ping(token, pipeline).await
}

/// Empty path segment never matches `<token>` above, so the bare prefix
/// needs its own routes to produce the spec's `400` instead of falling
/// through to Rocket's default 404.
#[get("/api/v1/heartbeat")]
fn heartbeat_get_empty() -> (Status, Json<Value>) {
    empty_token_response()
}

#[post("/api/v1/heartbeat")]
fn heartbeat_post_empty() -> (Status, Json<Value>) {
    empty_token_response()
}

fn empty_token_response() -> (Status, Json<Value>) {
    (Status::BadRequest, Json(serde_json::json!({ "ok": false, "error": "token required" })))
}

async fn heartbeat_ping(token: &str, pipeline: &State<Arc<Pipeline>>) -> (Status, Json<Value>) {
    if token.is_empty() {
        return empty_token_response();
    }
    match pipeline.process_heartbeat_recovery(token).await {
        Ok(status) => (Status::Ok, Json(serde_json::json!({ "status": "ok", "monitor_status": status.as_str() }))),
        Err(_) => (Status::NotFound, Json(serde_json::json!({ "ok": false, "error": "unknown token" }))),
    }
}

#[get("/api/v1/health")]
fn health(pipeline: &State<Arc<Pipeline>>) -> Json<Value> {
    Json(serde_json::json!({
        "ok": true,
        "dropped_jobs": pipeline.dropped_jobs(),
        "dropped_notifications": pipeline.dropped_notifications(),
    }))
}

#[launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    let db = Db::new(&config.database_path).expect("failed to initialize database");
    let store: Arc<dyn asura::store::Store> = Arc::new(SqliteStore::new(db));
    let pipeline = Arc::new(Pipeline::new(config, store));

    rocket::build()
        .manage(pipeline.clone())
        .mount("/", routes![heartbeat_get, heartbeat_post, heartbeat_get_empty, heartbeat_post_empty, health])
        .attach(AdHoc::on_liftoff("Pipeline start", move |_| {
            Box::pin(async move {
                pipeline.start().await;
            })
        }))
        .attach(AdHoc::on_shutdown("Pipeline stop", |rocket| {
            Box::pin(async move {
                if let Some(pipeline) = rocket.state::<Arc<Pipeline>>() {
                    pipeline.stop().await;
                }
            })
        }))
}
