#![allow(dead_code)]

//! A local stand-in for a deployed inference service.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("echo service");
    });
    format!("http://{addr}")
}

/// Behaves like a packaged service whose APIs echo their input.
pub fn echo_service() -> Router {
    Router::new()
        .route(
            "/jsonapi",
            get(|| async { StatusCode::BAD_REQUEST }).post(|body: Bytes| async move { body }),
        )
        .route("/dfapi", post(dataframe_echo))
        .route("/fileapi", post(file_echo))
}

/// Answers every request wrongly.
pub fn broken_service() -> Router {
    Router::new()
        .route(
            "/jsonapi",
            get(|| async { StatusCode::BAD_REQUEST }).post(|| async { "[[4, 3, 2, 1]]" }),
        )
        .route("/dfapi", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/fileapi", post(|| async { "\"tset\"" }))
}

/// Returns the frame column-oriented for CSV input and as records for JSON.
async fn dataframe_echo(headers: HeaderMap, body: Bytes) -> Result<Json<Value>, StatusCode> {
    let is_csv = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/csv"));

    if is_csv {
        let text = std::str::from_utf8(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
        let mut lines = text.lines();
        let header_row: Vec<&str> = lines.next().unwrap_or_default().split(',').collect();
        let mut columns: Map<String, Value> = header_row
            .iter()
            .map(|h| (h.to_string(), Value::Object(Map::new())))
            .collect();
        for (row_index, line) in lines.enumerate() {
            for (name, cell) in header_row.iter().zip(line.split(',')) {
                let number: i64 = cell.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
                if let Some(Value::Object(column)) = columns.get_mut(*name) {
                    column.insert(row_index.to_string(), json!(number));
                }
            }
        }
        return Ok(Json(Value::Object(columns)));
    }

    let rows: Vec<Vec<i64>> = serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    let records = rows
        .into_iter()
        .map(|row| {
            let record: Map<String, Value> = row
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), json!(v)))
                .collect();
            Value::Object(record)
        })
        .collect();
    Ok(Json(Value::Array(records)))
}

async fn file_echo(body: Bytes) -> &'static str {
    if body.windows(4).any(|w| w == b"test") {
        "\"test\""
    } else {
        "\"\""
    }
}

/// Answers every request on `/jsonapi`, but only after `delay`.
pub fn stalled_service(delay: std::time::Duration) -> Router {
    Router::new().route(
        "/jsonapi",
        get(move || async move {
            tokio::time::sleep(delay).await;
            StatusCode::BAD_REQUEST
        }),
    )
}
