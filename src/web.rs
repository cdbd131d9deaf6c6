use chrono::Local;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use crate::recommend::{RecommendError, Recommender};
use crate::taxonomy::Taxonomy;

#[derive(Debug, Deserialize)]
struct GptRequest {
    prompt: Option<String>,
    field: Option<String>,
}

pub fn log_line(message: &str) {
    println!("[{}] {}", Local::now().format("%H:%M:%S"), message);
}

pub async fn start_server(
    host: std::net::IpAddr,
    port: u16,
    recommender: Recommender,
    taxonomy: Taxonomy,
) {
    let routes = routes(Arc::new(recommender), Arc::new(taxonomy));
    println!("Server running on http://{}:{}", host, port);
    warp::serve(routes).run((host, port)).await;
}

pub fn routes(
    recommender: Arc<Recommender>,
    taxonomy: Arc<Taxonomy>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let recommender_filter = warp::any().map(move || recommender.clone());
    let taxonomy_filter = warp::any().map(move || taxonomy.clone());

    let liveness = warp::get()
        .and(warp::path::end())
        .map(|| "OpenAI API is running! Use /api/gpt to send requests.");

    let gpt = warp::post()
        .and(warp::path("api"))
        .and(warp::path("gpt"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(recommender_filter)
        .and(taxonomy_filter)
        .and_then(handle_gpt);

    // The rendering front end lives on another origin.
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST"]);

    liveness.or(gpt).with(cors)
}

async fn handle_gpt(
    request: GptRequest,
    recommender: Arc<Recommender>,
    taxonomy: Arc<Taxonomy>,
) -> Result<impl Reply, Infallible> {
    let prompt = request.prompt.as_deref().map(str::trim).unwrap_or("");
    if prompt.is_empty() {
        let body = json!({ "error": "No prompt provided." });
        return Ok(warp::reply::with_status(
            warp::reply::json(&body),
            StatusCode::BAD_REQUEST,
        ));
    }

    log_line(&format!("Received prompt: \"{}\"", prompt));

    let (body, status) = match recommender
        .recommend(prompt, request.field.as_deref(), &taxonomy)
        .await
    {
        Ok(payload) => {
            log_line(&format!("Returning {} papers", payload.papers.len()));
            match serde_json::to_value(&payload) {
                Ok(v) => (v, StatusCode::OK),
                Err(e) => (
                    json!({ "error": "Something went wrong.", "details": e.to_string() }),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            }
        }
        Err(RecommendError::EmptyPrompt) => (
            json!({ "error": "No prompt provided." }),
            StatusCode::BAD_REQUEST,
        ),
        Err(RecommendError::InvalidJson { detail }) => {
            log_line(&format!("Model reply was not parseable: {}", detail));
            (
                json!({
                    "error": "Invalid JSON format received from OpenAI. Try again.",
                    "details": detail,
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
        Err(e) => {
            log_line(&format!("Upstream error: {}", e));
            (
                json!({ "error": "Something went wrong.", "details": e.to_string() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

#[cfg(test)]
mod tests {
    use super::*;

    // A recommender pointed at an unroutable address; fine for routes that
    // must reject before any upstream call is made.
    fn test_routes() -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
        let recommender = Recommender::new(
            "test-key".to_string(),
            "http://127.0.0.1:1".to_string(),
            "gpt-4".to_string(),
            1,
        )
        .unwrap();
        routes(Arc::new(recommender), Arc::new(Taxonomy::empty()))
    }

    #[tokio::test]
    async fn liveness_route_answers() {
        let resp = warp::test::request()
            .method("GET")
            .path("/")
            .reply(&test_routes())
            .await;
        assert_eq!(resp.status(), 200);
        let body = String::from_utf8_lossy(resp.body());
        assert!(body.contains("/api/gpt"));
    }

    #[tokio::test]
    async fn missing_prompt_is_a_400_with_no_upstream_call() {
        let resp = warp::test::request()
            .method("POST")
            .path("/api/gpt")
            .json(&json!({ "field": "Computer Science" }))
            .reply(&test_routes())
            .await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "No prompt provided.");
    }

    #[tokio::test]
    async fn whitespace_prompt_is_rejected_too() {
        let resp = warp::test::request()
            .method("POST")
            .path("/api/gpt")
            .json(&json!({ "prompt": "   " }))
            .reply(&test_routes())
            .await;
        assert_eq!(resp.status(), 400);
    }

    // A one-shot upstream that answers any request with a well-formed
    // completion envelope whose message content is plain prose.
    async fn spawn_prose_upstream() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = json!({
                    "choices": [{ "message": { "content": "Sure! Here are ten papers I recommend." } }]
                })
                .to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn unparseable_model_reply_is_the_invalid_json_500() {
        let recommender = Recommender::new(
            "test-key".to_string(),
            spawn_prose_upstream().await,
            "gpt-4".to_string(),
            5,
        )
        .unwrap();
        let routes = routes(Arc::new(recommender), Arc::new(Taxonomy::empty()));

        let resp = warp::test::request()
            .method("POST")
            .path("/api/gpt")
            .json(&json!({ "prompt": "graph neural networks" }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(
            body["error"],
            "Invalid JSON format received from OpenAI. Try again."
        );
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_500_with_generic_message() {
        let resp = warp::test::request()
            .method("POST")
            .path("/api/gpt")
            .json(&json!({ "prompt": "graph neural networks" }))
            .reply(&test_routes())
            .await;
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "Something went wrong.");
        assert!(body["details"].is_string());
    }
}
