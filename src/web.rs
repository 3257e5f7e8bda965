//! Debug dashboard, only ever started when `--dev-mode` is set. Renders
//! this node's finger table, predecessor and successor, and exposes a
//! small form for ad hoc `get`/`put` calls against the ring — useful for
//! poking at a running cluster by hand, never load-bearing for the ring
//! itself.

use std::sync::Arc;

use actix_web::web::{Data, Query};
use actix_web::{get, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

use crate::node::NodeCore;
use crate::router;

#[derive(Deserialize)]
struct QueryParams {
    get_key: Option<String>,
    put_key: Option<String>,
    put_value: Option<String>,
}

pub async fn serve(core: Arc<NodeCore>, address: String) -> std::io::Result<()> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(core.clone()))
            .service(index)
    })
    .bind(&address)?
    .run();

    server.await
}

#[get("/")]
async fn index(core: Data<Arc<NodeCore>>, params: Option<Query<QueryParams>>) -> impl Responder {
    let tera = match Tera::new("static/html/**/*") {
        Ok(t) => t,
        Err(e) => return HttpResponse::InternalServerError().body(format!("template error: {e}")),
    };
    let mut context = Context::new();

    if let Some(Query(params)) = params {
        if let Some(key) = params.get_key {
            match router::load(&core, &key).await {
                Ok(value) => context.insert("get_result", &String::from_utf8_lossy(&value)),
                Err(e) => context.insert("get_error", &e.to_string()),
            }
        } else if let (Some(key), Some(value)) = (params.put_key, params.put_value) {
            match router::save(&core, &key, value.into_bytes()).await {
                Ok(()) => context.insert("put_ok", &true),
                Err(e) => context.insert("put_error", &e.to_string()),
            }
        }
    }

    context.insert("node_id", &core.id());
    context.insert("node_address", core.address());
    context.insert("successor", &core.successor());
    context.insert(
        "predecessor",
        &core.predecessor().map(|p| p.address).unwrap_or_else(|| "none".to_string()),
    );
    context.insert("fingers", &core.finger_snapshot());
    context.insert("stored_keys", &core.store.base_keys().len());

    match tera.render("index.html", &context) {
        Ok(body) => HttpResponse::Ok().content_type("text/html").body(body),
        Err(e) => HttpResponse::InternalServerError().body(format!("render error: {e}")),
    }
}
