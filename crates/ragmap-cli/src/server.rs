//! HTTP front end for the mapping page.
//!
//! Routes
//! ------
//! - `GET /`                 mapping page (or login form)
//! - `GET /healthz`          liveness + cache state (JSON)
//! - `POST /login`, `/logout`
//! - `POST /tenants/create`, `/tenants/update`, `/tenants/delete`
//! - `POST /refresh`         drop the cached snapshot
//!
//! Every POST answers with `303 See Other` back to `/`; its outcome travels
//! in the session flash. Store and identity calls are blocking and run on
//! the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::app::{parse_form, App, Form};
use crate::session::{session_cookie, session_id_from_cookie_header};

/// Runs the server until ctrl-c.
///
/// `app` should already hold any blocking HTTP clients; the caller keeps its
/// own handle so those clients are dropped after the runtime is gone.
pub fn run(app: Arc<App>, listen: SocketAddr) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    let result = rt.block_on(serve_async(app, listen));
    drop(rt);
    result
}

async fn serve_async(app: Arc<App>, listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow!("failed to bind {listen}: {e}"))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("failed to read bound addr: {e}"))?;
    tracing::info!(addr = %bound, "listening on http://{bound}");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => {
                accepted.map_err(|e| anyhow!("accept failed: {e}"))?
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let app = app.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, app.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    app: Arc<App>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::debug!(%method, path = %path, "request");

    if (&method, path.as_str()) == (&Method::GET, "/healthz") {
        return Ok(json_response(
            StatusCode::OK,
            &HealthPayload {
                status: "ok",
                cache_fresh: app.cache().is_fresh(),
                sessions: app.sessions().len(),
            },
        ));
    }

    let cookie_id = req
        .headers()
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_id_from_cookie_header)
        .map(str::to_string);
    let (sid, created) = app.sessions().resolve(cookie_id.as_deref());

    let mut resp = match (method, path.as_str()) {
        (Method::GET, "/") => match blocking(&app, &sid, |app, sid| app.index(sid)).await {
            Ok(html) => html_response(StatusCode::OK, html),
            Err(resp) => resp,
        },
        (Method::POST, "/login") => {
            let form = read_form(req).await?;
            action(&app, &sid, move |app, sid| app.login(sid, &form)).await
        }
        (Method::POST, "/logout") => action(&app, &sid, |app, sid| app.logout(sid)).await,
        (Method::POST, "/tenants/create") => {
            let form = read_form(req).await?;
            action(&app, &sid, move |app, sid| app.create(sid, &form)).await
        }
        (Method::POST, "/tenants/update") => {
            let form = read_form(req).await?;
            action(&app, &sid, move |app, sid| app.update(sid, &form)).await
        }
        (Method::POST, "/tenants/delete") => {
            let form = read_form(req).await?;
            action(&app, &sid, move |app, sid| app.delete(sid, &form)).await
        }
        (Method::POST, "/refresh") => action(&app, &sid, |app, sid| app.refresh(sid)).await,
        (_, "/" | "/login" | "/logout" | "/refresh")
        | (_, "/tenants/create" | "/tenants/update" | "/tenants/delete") => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n")
        }
        _ => text_response(StatusCode::NOT_FOUND, "not found\n"),
    };

    // Only sessions something was written to are worth a cookie.
    if created && app.sessions().contains(&sid) {
        if let Ok(value) = HeaderValue::from_str(&session_cookie(&sid)) {
            resp.headers_mut().insert(SET_COOKIE, value);
        }
    }
    Ok(resp)
}

async fn read_form(req: Request<Incoming>) -> Result<Form, hyper::Error> {
    let body = req.into_body().collect().await?.to_bytes();
    Ok(parse_form(&body))
}

/// Runs `f` on the blocking pool with a handle to the app.
async fn blocking<T, F>(app: &Arc<App>, sid: &str, f: F) -> Result<T, Response<Full<Bytes>>>
where
    T: Send + 'static,
    F: FnOnce(&App, &str) -> T + Send + 'static,
{
    let app = app.clone();
    let sid = sid.to_string();
    tokio::task::spawn_blocking(move || f(&app, &sid))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "request task failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error\n")
        })
}

/// Post/redirect/get: runs the action, then sends the browser back to `/`.
async fn action<F>(app: &Arc<App>, sid: &str, f: F) -> Response<Full<Bytes>>
where
    F: FnOnce(&App, &str) + Send + 'static,
{
    match blocking(app, sid, f).await {
        Ok(()) => redirect_home(),
        Err(resp) => resp,
    }
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    cache_fresh: bool,
    sessions: usize,
}

fn html_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn redirect_home() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(LOCATION, "/")
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
