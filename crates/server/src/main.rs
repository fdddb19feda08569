use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use axum::{
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{WsQuery, WS_ROUTE},
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod pages;
mod pty;
mod session;
mod shell;
mod tls;

use app_state::AppState;
use config::{load_settings, Settings, DEFAULT_CONFIG_PATH};
use session::SessionRequest;

const MAX_USER_NAME_BYTES: usize = 32;

#[derive(Parser, Debug)]
#[command(
    name = "ws-shell",
    about = "Browser terminal backed by a login shell over WebSocket",
    version
)]
struct Args {
    /// Settings file, read if present.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Bind address, e.g. `:8080` or `127.0.0.1:8080`.
    #[arg(long)]
    bind: Option<String>,
    /// Verbose logging and per-request traces.
    #[arg(long)]
    debug: bool,
    /// Run every session as the default user (`--single=false` honours `?user=`).
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    single: Option<bool>,
    /// Serve HTTPS/WSS with a freshly generated self-signed certificate.
    #[arg(long)]
    enable_ssl: bool,
    /// Shell to start for each session.
    #[arg(long)]
    fork: Option<String>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(bind) = self.bind {
            settings.bind_addr = bind;
        }
        if self.debug {
            settings.debug = true;
        }
        if let Some(single) = self.single {
            settings.single_user = single;
        }
        if self.enable_ssl {
            settings.enable_ssl = true;
        }
        if let Some(fork) = self.fork {
            settings.fork_cmd = fork;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(&args.config)?;
    args.apply(&mut settings);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if settings.debug { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if settings.single_user {
        info!(user = %settings.default_user, "single user mode");
    } else {
        info!("multi user mode");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "starting ws-shell");

    let addr = settings.socket_addr()?;
    let enable_ssl = settings.enable_ssl;
    let cert_dir = settings.cert_dir.clone();
    let debug = settings.debug;

    let state = AppState {
        settings: Arc::new(settings),
    };
    let mut app = build_router(Arc::new(state));
    if debug {
        app = app.layer(TraceLayer::new_for_http());
    }
    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    info!(%addr, "server listening");
    info!(
        "You may visit {} to use the terminal",
        visit_url(enable_ssl, addr)
    );

    if enable_ssl {
        info!("running with SSL");
        // Another provider may already be installed; either one serves.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let files = tls::generate_self_signed(&cert_dir)?;
        let tls_config = RustlsConfig::from_pem_file(&files.cert, &files.key)
            .await
            .context("failed to load generated certificate")?;
        axum_server::bind_rustls(addr, tls_config)
            .serve(service)
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        axum::serve(listener, service).await?;
    }
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(WS_ROUTE, get(ws_handler))
        .merge(pages::routes())
        .fallback(not_found)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(ErrorCode::NotFound, "no such route")),
    )
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let requested = query.user.as_deref().filter(|_| !state.settings.single_user);
    if let Some(user) = requested {
        if let Err(message) = validate_user_name(user) {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(ErrorCode::Validation, message)),
            )
                .into_response();
        }
    }

    let request = SessionRequest {
        conn_id: uuid::Uuid::new_v4().to_string(),
        remote,
        requested_user: query.user,
    };
    let settings = state.settings.clone();
    ws.on_upgrade(move |socket| session::run_session(socket, settings, request))
}

fn validate_user_name(user: &str) -> Result<(), &'static str> {
    if user.len() > MAX_USER_NAME_BYTES {
        return Err("user name is too long");
    }
    if user.contains(['/', '\\', '\0']) {
        return Err("user name must not contain path separators");
    }
    Ok(())
}

/// The host's outbound address, for the startup hint only.
fn default_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn visit_url(enable_ssl: bool, addr: SocketAddr) -> String {
    let scheme = if enable_ssl { "https" } else { "http" };
    let host = if addr.ip().is_unspecified() {
        SocketAddr::new(default_ip(), addr.port())
    } else {
        addr
    };
    format!("{scheme}://{host}/web/")
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
