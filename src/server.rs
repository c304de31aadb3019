//! HTTP/HTTPS serving with graceful shutdown.
//!
//! The same `Router` is served over plain TCP or, with the `tls` feature and a
//! configured certificate and key, over rustls. Handlers never see which.

use crate::config::AppConfig;
use anyhow::Result;
use axum::Router;
use std::io::ErrorKind;
use tokio::net::TcpListener;

/// Serve `app` until Ctrl+C or SIGTERM.
pub async fn serve(app: Router, cfg: &AppConfig) -> Result<()> {
    if let Some((cert, key)) = cfg.tls_paths() {
        #[cfg(feature = "tls")]
        {
            return serve_https(app, cfg, cert, key).await;
        }
        #[cfg(not(feature = "tls"))]
        {
            anyhow::bail!(
                "TLS certificate {} and key {} configured, but this build lacks the `tls` feature",
                cert.display(),
                key.display()
            );
        }
    }

    serve_http(app, cfg).await
}

async fn serve_http(app: Router, cfg: &AppConfig) -> Result<()> {
    let listener = bind_with_fallback(cfg).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Bind the configured address, falling back to loopback when a wildcard
/// bind is refused.
async fn bind_with_fallback(cfg: &AppConfig) -> Result<TcpListener> {
    let addr = cfg.addr();
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            Ok(TcpListener::bind(&fallback_addr).await?)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(feature = "tls")]
async fn serve_https(
    app: Router,
    cfg: &AppConfig,
    cert: &std::path::Path,
    key: &std::path::Path,
) -> Result<()> {
    use anyhow::Context;
    use axum_server::tls_rustls::RustlsConfig;
    use std::{net::SocketAddr, time::Duration};

    let tls_config = RustlsConfig::from_pem_file(cert, key)
        .await
        .with_context(|| {
            format!(
                "loading TLS certificate {} and key {}",
                cert.display(),
                key.display()
            )
        })?;
    let addr: SocketAddr = cfg
        .addr()
        .parse()
        .with_context(|| format!("parsing bind address {}", cfg.addr()))?;

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    tracing::info!("Server listening on https://{}", addr);
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Waits for SIGTERM (Unix) or Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections");
}
