use axum::{
    http::header,
    response::{Html, IntoResponse},
};

static DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");
static DASHBOARD_JS: &str = include_str!("../assets/dashboard.js");

pub async fn index() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

pub async fn script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        DASHBOARD_JS,
    )
}
