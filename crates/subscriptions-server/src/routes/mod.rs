mod extract;
mod subscriptions;
mod users;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "subscriptions-server",
        "environment": state.config.environment,
    }))
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

async fn unknown_route() -> AppError {
    AppError::NotFound("Route not found".into())
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        // Users
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/{id}",
            get(users::get).put(users::update).delete(users::delete),
        )
        // Subscriptions
        .route(
            "/subscriptions",
            get(subscriptions::list).post(subscriptions::create),
        )
        .route("/subscriptions/total-cost", get(subscriptions::total_cost))
        .route(
            "/subscriptions/{id}",
            get(subscriptions::get)
                .put(subscriptions::update)
                .delete(subscriptions::delete),
        );

    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
        .nest("/api/v1", api)
        .fallback(unknown_route)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(AppState {
            db: Database::memory(),
            config: Config::for_tests(),
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_user(app: &Router, email: &str) -> String {
        let response = send(
            app,
            Method::POST,
            "/api/v1/users",
            Some(json!({ "name": "Ada", "email": email })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["id"].as_str().unwrap().to_string()
    }

    async fn create_subscription(app: &Router, body: Value) -> Value {
        let response = send(app, Method::POST, "/api/v1/subscriptions", Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn health_and_ping_respond() {
        let app = app();

        let response = send(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");

        let response = send(&app, Method::GET, "/ping", None).await;
        assert_eq!(json_body(response).await["message"], "pong");
    }

    #[tokio::test]
    async fn subscription_crud_over_http() {
        let app = app();
        let user_id = create_user(&app, "ada@example.com").await;

        let created = create_subscription(
            &app,
            json!({
                "service_name": "Yandex Plus",
                "price": 400,
                "user_id": user_id,
                "start_date": "07-2025"
            }),
        )
        .await;
        let id = created["id"].as_i64().unwrap();
        assert!(created.get("end_date").is_none());

        let response = send(&app, Method::GET, &format!("/api/v1/subscriptions/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, created);

        let response = send(
            &app,
            Method::PUT,
            &format!("/api/v1/subscriptions/{id}"),
            Some(json!({ "price": 450 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = json_body(response).await;
        assert_eq!(updated["price"], 450);
        assert_eq!(updated["service_name"], "Yandex Plus");

        let uri = format!("/api/v1/subscriptions/{id}");
        let response = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Subscription not found");
    }

    #[tokio::test]
    async fn list_applies_filters_and_pagination() {
        let app = app();
        let user_id = create_user(&app, "ada@example.com").await;
        for (name, price) in [("Netflix", 100), ("Spotify", 50), ("Netflix Kids", 30)] {
            create_subscription(
                &app,
                json!({
                    "service_name": name,
                    "price": price,
                    "user_id": user_id,
                    "start_date": "01-2024"
                }),
            )
            .await;
        }

        let response = send(
            &app,
            Method::GET,
            "/api/v1/subscriptions?service_name=netflix&limit=1",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = json_body(response).await;
        assert_eq!(page.as_array().unwrap().len(), 1);
        assert_eq!(page[0]["service_name"], "Netflix Kids");

        let response = send(
            &app,
            Method::GET,
            &format!("/api/v1/subscriptions?user_id={user_id}&limit=0"),
            None,
        )
        .await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 3);

        let response = send(&app, Method::GET, "/api/v1/subscriptions?user_id=nope", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid user_id format");
    }

    #[tokio::test]
    async fn total_cost_endpoint() {
        let app = app();
        let user_id = create_user(&app, "ada@example.com").await;
        create_subscription(
            &app,
            json!({ "service_name": "A", "price": 100, "user_id": user_id, "start_date": "01-2024" }),
        )
        .await;
        create_subscription(
            &app,
            json!({
                "service_name": "B",
                "price": 50,
                "user_id": user_id,
                "start_date": "06-2023",
                "end_date": "12-2023"
            }),
        )
        .await;

        let response = send(
            &app,
            Method::GET,
            &format!(
                "/api/v1/subscriptions/total-cost?start_period=01-2024&end_period=12-2024&user_id={user_id}"
            ),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total_cost"], 100);
        assert_eq!(body["period"], "01-2024 to 12-2024");
        assert_eq!(body["filters"], json!({ "user_id": user_id }));

        let response = send(
            &app,
            Method::GET,
            "/api/v1/subscriptions/total-cost?start_period=01-2024",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn user_endpoints_enforce_unique_email() {
        let app = app();
        let first = create_user(&app, "a@x.com").await;
        let second = create_user(&app, "b@x.com").await;

        let response = send(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(json!({ "name": "Again", "email": "a@x.com" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &app,
            Method::PUT,
            &format!("/api/v1/users/{second}"),
            Some(json!({ "email": "a@x.com" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &app,
            Method::PUT,
            &format!("/api/v1/users/{first}"),
            Some(json!({ "email": "a@x.com" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::GET, "/api/v1/users?limit=1", None).await;
        let users = json_body(response).await;
        assert_eq!(users.as_array().unwrap().len(), 1);
        assert_eq!(users[0]["id"], second.as_str());
    }

    #[tokio::test]
    async fn malformed_input_is_a_json_bad_request() {
        let app = app();

        let response = send(&app, Method::GET, "/api/v1/subscriptions/abc", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let response = send(&app, Method::GET, "/api/v1/users/not-a-uuid", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            Method::POST,
            "/api/v1/subscriptions",
            Some(json!({ "service_name": "Netflix" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let response = send(&app, Method::PUT, "/api/v1/subscriptions/1", Some(json!({}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No fields to update");

        let response = send(&app, Method::GET, "/api/v1/nowhere", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
