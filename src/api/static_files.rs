//! Front-end serving
//!
//! `/assets/*` is mounted as a directory service in [`crate::api::build_router`].
//! Every other unmatched GET lands here: root-level files of the built app
//! (favicon, manifest, ...), then the app's `index.html`, then the
//! server-rendered templates when no build is deployed.

use std::path::{Component, Path, PathBuf};

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use tera::Context as TeraContext;
use tokio::fs;

use crate::api::middleware::{ApiError, AppState};
use crate::templates::StandardVars;

/// Fallback handler for unmatched routes
pub async fn serve_spa(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let path = uri.path();
    let decoded = urlencoding::decode(path).unwrap_or_else(|_| path.into());
    let path = decoded.as_ref();

    if path.starts_with("/api/") || (method != Method::GET && method != Method::HEAD) {
        return ApiError::not_found(format!("No route for {} {}", method, path)).into_response();
    }

    let dist = &state.config.paths.frontend_dist;
    let relative = path.trim_start_matches('/');

    if has_extension(relative) {
        if let Some(file) = safe_join(dist, relative) {
            if let Ok(contents) = fs::read(&file).await {
                return build_response(relative, contents);
            }
        }
        return not_found();
    }

    if let Ok(index) = fs::read(dist.join("index.html")).await {
        return build_response("index.html", index);
    }

    let template = match path.trim_end_matches('/') {
        "/login" => "login.html",
        "/register" => "register.html",
        _ => "index.html",
    };
    render_template_page(&state, template, path)
}

/// Render a fallback page with the context every fallback page expects
pub fn render_template_page(state: &AppState, template: &str, request_path: &str) -> Response {
    let mut context = TeraContext::new();
    let services: Vec<&str> = state
        .site_config
        .available_llm_services()
        .iter()
        .map(|s| s.as_str())
        .collect();
    context.insert("llm_services", &services);
    Html(
        state
            .templates
            .render_with_fallback(template, &context, &StandardVars::new(request_path)),
    )
    .into_response()
}

fn has_extension(relative: &str) -> bool {
    relative
        .rsplit('/')
        .next()
        .map_or(false, |name| name.contains('.'))
}

/// Join `relative` under `root`, refusing anything that could escape it
fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Build HTTP response with proper headers
fn build_response(path: &str, data: Vec<u8>) -> Response {
    let content_type = get_content_type(path);
    let cache_control = if content_type.starts_with("text/html") {
        "no-cache"
    } else {
        "public, max-age=3600"
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        data,
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Html("<html><body><h1>404 Not Found</h1></body></html>"),
    )
        .into_response()
}

/// Get content type from file extension
fn get_content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "webp" => "image/webp",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
