use axum::http::StatusCode;
use gistream::error::AppError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,gistream=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {}", err.message);
        std::process::exit(1);
    }
}

fn startup_error(code: &str, err: impl std::fmt::Display) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
}

async fn run() -> Result<(), AppError> {
    let state = gistream::app::load_state()?;
    let addr = state
        .runtime
        .listen
        .parse::<std::net::SocketAddr>()
        .map_err(|err| startup_error("listen_invalid", err))?;
    let app = gistream::app::build_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| startup_error("listen_failed", err))?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|err| startup_error("serve_failed", err))?;
    Ok(())
}
