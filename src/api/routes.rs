use actix_cors::Cors;
use actix_web::{get, web, HttpResponse, Responder};
use serde_json::json;

pub const SERVICE_TITLE: &str = "AI Booking Agent";

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({"message": format!("Welcome to {}", SERVICE_TITLE)}))
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "healthy"}))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index).service(health);
}

/// Browser clients may be served from any origin.
pub fn cors() -> Cors {
    Cors::permissive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn health_reports_healthy() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"status": "healthy"}));
    }

    #[actix_web::test]
    async fn cross_origin_requests_are_allowed() {
        let app = test::init_service(App::new().wrap(cors()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header((header::ORIGIN, "http://localhost:3000"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

        let preflight = test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/health")
            .insert_header((header::ORIGIN, "http://localhost:3000"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "GET"))
            .to_request();
        let resp = test::call_service(&app, preflight).await;
        assert!(resp.status().is_success());
    }
}
