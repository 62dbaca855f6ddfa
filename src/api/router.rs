//! Service router.
//!
//! Returns a composable `Router` that can be mounted on any axum server:
//! versioned endpoints nested under the configured prefix, `/health` at the
//! root, permissive CORS on everything.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the full service router from shared state.
pub fn api_router(ctx: ApiContext) -> Router {
    let versioned = Router::new()
        .route("/extract", post(endpoints::medications::extract))
        .route("/index", post(endpoints::medications::index));

    Router::new()
        .nest(&ctx.settings.api_v1_prefix, versioned)
        .route("/health", get(endpoints::health::check))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Settings;
    use crate::pipeline::{
        ComponentFactory, MedicationService, MockComponentFactory, PipelineFactory,
        PipelineService,
    };
    use crate::store::DocumentStore;

    fn mock_app(replies: Vec<String>) -> (Router, Arc<MockComponentFactory>) {
        let components = Arc::new(MockComponentFactory::with_replies(replies));
        let factory = PipelineFactory::new(Arc::clone(&components) as Arc<dyn ComponentFactory>);
        let medications = MedicationService::new(PipelineService::new(factory));
        let ctx = ApiContext::new(Arc::new(Settings::default()), Arc::new(medications));
        (api_router(ctx), components)
    }

    fn json_post(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_status_and_version() {
        let (app, _) = mock_app(vec![]);

        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert!(!json["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extract_rejects_empty_texts() {
        let (app, components) = mock_app(vec![]);

        let req = json_post("/api/v1/extract", r#"{"texts":[]}"#.to_string());
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        // Rejected before the pipeline ran
        assert!(components.llm().prompts().is_empty());
    }

    #[tokio::test]
    async fn extract_rejects_oversized_batch() {
        let (app, _) = mock_app(vec![]);

        let texts: Vec<String> = (0..101).map(|i| format!("text {i}")).collect();
        let body = serde_json::json!({ "texts": texts }).to_string();
        let response = app.oneshot(json_post("/api/v1/extract", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = response_json(response).await;
        assert!(json["error"]["message"].as_str().unwrap().contains("100"));
    }

    #[tokio::test]
    async fn extract_returns_parsed_entities() {
        let reply = r#"{
            "quantity": ["1 tablet"],
            "drug_name": ["aspirin"],
            "dosage": ["81 mg"],
            "administration_type": ["oral"],
            "brand": []
        }"#;
        let (app, _) = mock_app(vec![reply.to_string()]);

        let body = r#"{"texts":["Take 1 tablet of aspirin 81 mg by mouth daily"]}"#;
        let response = app
            .oneshot(json_post("/api/v1/extract", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["drug_name"][0], "aspirin");
        assert_eq!(
            results[0]["original_text"],
            "Take 1 tablet of aspirin 81 mg by mouth daily"
        );
        assert!(json["processing_time"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn extract_degrades_to_fallback_on_malformed_reply() {
        let (app, _) = mock_app(vec!["not json at all".to_string()]);

        let req = json_post("/api/v1/extract", r#"{"texts":["ibuprofen 200 mg"]}"#.to_string());
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["results"][0]["original_text"], "ibuprofen 200 mg");
        assert_eq!(json["results"][0]["drug_name"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn index_rejects_empty_medications() {
        let (app, _) = mock_app(vec![]);

        let req = json_post("/api/v1/index", r#"{"medications":[]}"#.to_string());
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn index_writes_documents_and_reports_count() {
        let (app, components) = mock_app(vec![]);

        let body = serde_json::json!({
            "medications": [
                {
                    "original_text": "Acetaminophen 325 MG Oral Tablet",
                    "drug_name": ["Acetaminophen"],
                    "dosage": ["325 MG"],
                    "administration_type": ["Oral Tablet"]
                },
                {
                    "original_text": "aspirin 81 mg chewable tablet",
                    "drug_name": ["aspirin"],
                    "dosage": ["81 mg"]
                }
            ]
        })
        .to_string();

        let response = app.oneshot(json_post("/api/v1/index", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["message"], "Successfully indexed 2 medications");
        assert_eq!(components.store().count_documents().unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_json_body_is_a_client_error() {
        let (app, _) = mock_app(vec![]);

        let response = app
            .oneshot(json_post("/api/v1/extract", "{not json".to_string()))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (app, _) = mock_app(vec![]);

        let req = Request::builder()
            .method("GET")
            .uri("/api/v1/nonexistent")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
