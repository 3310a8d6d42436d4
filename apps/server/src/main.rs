use std::net::SocketAddr;
use std::path::Path;

use axum::{body::Body, extract::MatchedPath, http::Request};
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use polyglass_relay::{Engine, UserSettings, identity_transliterator};
use polyglass_server::cloud::CloudClient;
use polyglass_server::env::env;
use polyglass_server::{AppState, router};

fn main() -> std::io::Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = env();

    let defaults = match &env.settings_path {
        Some(path) => UserSettings::load_descriptor(Path::new(path)),
        None => UserSettings::default(),
    };

    let cloud = CloudClient::new(&env.upstream_ws_url, &env.package_name, &env.augmentos_api_key);
    let engine = Engine::builder(cloud.clone(), cloud)
        .with_defaults(defaults)
        .with_transliterator(identity_transliterator())
        .build();

    let state = AppState {
        engine,
        api_key: env.augmentos_api_key.clone(),
        package_name: env.package_name.clone(),
        production: env.is_production(),
    };

    let app = router(state).layer(
        TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let path = request.uri().path();
            if path == "/health" {
                return tracing::Span::none();
            }
            let matched_path = request
                .extensions()
                .get::<MatchedPath>()
                .map(MatchedPath::as_str)
                .unwrap_or(path);
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                http.route = %matched_path,
            )
        }),
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let addr = SocketAddr::from(([0, 0, 0, 0], env.port));
            tracing::info!(addr = %addr, app = %env.package_name, "server_listening");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        })
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("shutdown_signal_received");
}
