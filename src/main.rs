use axum::{
    Router,
    middleware::from_fn as middleware_from_fn,
    routing::{delete, get, post, put},
};
use dotenv::dotenv;
use mongodb::{Client, options::ClientOptions};
use std::{env::var, net::SocketAddr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use shopwise::{
    DB,
    apex::endpoints::root_endpoint,
    auth::endpoints::{cookie_auth, get_user, login_user, logout_user, optional_auth, register_user},
    config::config,
    products::endpoints::{
        create_product_endpoint, delete_product_endpoint, get_product_endpoint,
        list_products_endpoint, update_product_endpoint,
    },
    recommendations::endpoints::{
        batch_track_endpoint, get_recommendations_endpoint, track_interaction_endpoint,
        update_user_tags_endpoint,
    },
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // Load the scoring configuration once, before the first request.
    let _ = config();

    let mongodb_uri = var("MONGODB_URI").expect("MONGODB_URI must be set");
    let client_options = ClientOptions::parse(mongodb_uri)
        .await
        .expect("Failed to parse MONGODB_URI");
    let client = Client::with_options(client_options).expect("Failed to create Mongo client");

    DB.set(client.database("shopwise_main")).unwrap();

    let domain = var("DOMAIN").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .expect("Failed to parse PORT");

    let addr = SocketAddr::from((
        domain
            .parse::<std::net::IpAddr>()
            .expect("Failed to parse DOMAIN"),
        port,
    ));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    let protected_routes = Router::new()
        .route("/auth/user", get(get_user))
        .route("/auth/logout", post(logout_user))
        .route("/recommendations/update-tags", post(update_user_tags_endpoint))
        .route("/admin/products", post(create_product_endpoint))
        .route("/admin/products/{product_id}", put(update_product_endpoint))
        .route(
            "/admin/products/{product_id}",
            delete(delete_product_endpoint),
        )
        .layer(middleware_from_fn(cookie_auth));

    // Anonymous callers are first-class here; a valid cookie only upgrades
    // the attribution.
    let optional_auth_routes = Router::new()
        .route("/recommendations", get(get_recommendations_endpoint))
        .route("/recommendations/track", post(track_interaction_endpoint))
        .route("/recommendations/track/batch", post(batch_track_endpoint))
        .layer(middleware_from_fn(optional_auth));

    let unprotected_routes = Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/products", get(list_products_endpoint))
        .route("/products/{product_id}", get(get_product_endpoint));

    let app = Router::new()
        .merge(protected_routes)
        .merge(optional_auth_routes)
        .merge(unprotected_routes)
        .route("/", get(root_endpoint));

    info!(%addr, "shopwise API listening");
    axum::serve(listener, app).await.unwrap();
}
