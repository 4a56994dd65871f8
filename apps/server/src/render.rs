//! HTML written to the browser.
//!
//! The upload page is one long response: a header that defines
//! `updateProgress`, then one fragment per [`TransferEvent`]. Markup lives
//! in `templates/`; askama escapes every interpolated value.

use askama::Template;
use axum::response::{Html, IntoResponse, Response};
use magnetdrive_pipeline::TransferEvent;

const TITLE: &str = "magnetdrive";

#[derive(Template)]
#[template(path = "form.html")]
pub struct FormPage {
    pub title: &'static str,
}

#[derive(Template)]
#[template(path = "progress.html")]
pub struct ProgressHeader {
    pub title: &'static str,
}

#[derive(Template)]
#[template(path = "partials/resolved.html")]
struct ResolvedView<'a> {
    name: &'a str,
    total_bytes: u64,
}

#[derive(Template)]
#[template(path = "partials/progress.html")]
struct ProgressView {
    percentage: f64,
}

#[derive(Template)]
#[template(path = "partials/completed.html")]
struct CompletedView<'a> {
    asset_id: &'a str,
}

#[derive(Template)]
#[template(path = "partials/failed.html")]
struct FailedView<'a> {
    message: &'a str,
}

/// The input form served at `/`.
pub fn form_page() -> Response {
    match (FormPage { title: TITLE }).render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("form template rendering failed: {e}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The head of the upload page, sent before any event.
pub fn progress_header() -> String {
    fragment(&ProgressHeader { title: TITLE })
}

/// Renders one event as the fragment appended to the page.
pub fn event(event: &TransferEvent) -> String {
    match event {
        TransferEvent::Resolved { name, total_bytes } => fragment(&ResolvedView {
            name,
            total_bytes: *total_bytes,
        }),
        TransferEvent::Progress(sample) => fragment(&ProgressView {
            percentage: sample.percentage(),
        }),
        TransferEvent::Completed { asset_id } => fragment(&CompletedView {
            asset_id: asset_id.as_str(),
        }),
        TransferEvent::Failed { message } => fragment(&FailedView { message }),
    }
}

/// Renders a template as one newline-terminated chunk of the streamed page.
///
/// A rendering failure is logged and yields an empty chunk, so the rest of
/// the stream is unaffected.
fn fragment<T: Template>(template: &T) -> String {
    match template.render() {
        Ok(html) => {
            let mut html = html.trim_end_matches('\n').to_string();
            html.push('\n');
            html
        }
        Err(e) => {
            tracing::error!("template rendering failed: {e}");
            String::new()
        }
    }
}
