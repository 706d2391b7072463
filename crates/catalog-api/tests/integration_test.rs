//! Integration tests for the Catalog API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use catalog_api::{
    create_router, AppState, AuthSettings, LocalImageStore, MemoryStore, RateLimitConfig,
    UploadGateway, UploadPolicy,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "catalog-test-boundary";

/// Helper to create a test app backed by memory storage and a temp upload dir
fn create_test_app_with(
    policy: UploadPolicy,
    auth: Option<AuthSettings>,
) -> (Router, tempfile::TempDir) {
    let upload_dir = tempfile::tempdir().unwrap();

    let uploads = UploadGateway::new(
        Arc::new(LocalImageStore::new(upload_dir.path(), "/uploads")),
        policy,
    );
    let mut state = AppState::new(Arc::new(MemoryStore::new()), uploads);
    if let Some(auth) = auth {
        state = state.with_auth(auth);
    }

    (create_router(state), upload_dir)
}

fn create_test_app() -> (Router, tempfile::TempDir) {
    create_test_app_with(UploadPolicy::default(), None)
}

/// Minimal multipart/form-data encoder
#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn request(mut self, method: &str, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

fn product_form(title: &str) -> Form {
    Form::default()
        .text("title", title)
        .text("category", "herbal")
        .text("shortDescription", "x")
        .text("description", "y")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, json)
}

/// Every regular file under the upload root
fn stored_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

fn disk_path(root: &Path, reference: &str) -> PathBuf {
    root.join(reference.strip_prefix("/uploads/").unwrap())
}

fn is_generated_reference(reference: &str) -> bool {
    let Some(name) = reference.strip_prefix("/uploads/products/") else {
        return false;
    };
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    let Some((millis, random)) = stem.split_once('-') else {
        return false;
    };

    ext == "jpg"
        && !millis.is_empty()
        && millis.chars().all(|c| c.is_ascii_digit())
        && random.len() == 9
        && random.chars().all(|c| c.is_ascii_digit())
}

#[tokio::test]
async fn test_health_check() {
    let (app, _dir) = create_test_app();

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "catalog-api");
}

#[tokio::test]
async fn test_create_product_with_image() {
    let (app, dir) = create_test_app();

    let request = product_form("Turmeric Extract")
        .text("specifications", r#"{"Botanical Source":"Curcuma longa"}"#)
        .file("images", "a.jpg", &[7u8; 1024])
        .request("POST", "/api/products");
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["slug"], "turmeric-extract");
    assert_eq!(json["category"], "herbal");
    assert_eq!(json["shortDescription"], "x");
    assert_eq!(json["specifications"]["Botanical Source"], "Curcuma longa");

    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    let reference = images[0].as_str().unwrap();
    assert!(is_generated_reference(reference), "unexpected reference {reference}");
    assert_eq!(std::fs::read(disk_path(dir.path(), reference)).unwrap().len(), 1024);

    // Readable by id and slug
    let id = json["id"].as_str().unwrap();
    let (status, by_id) = send(&app, get(&format!("/api/products/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["title"], "Turmeric Extract");

    let (status, by_slug) = send(&app, get("/api/products/slug/turmeric-extract")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_slug["id"], id);
}

#[tokio::test]
async fn test_missing_required_fields_write_nothing() {
    let (app, dir) = create_test_app();

    let request = Form::default()
        .text("title", "Neem")
        .file("images", "a.jpg", b"jpeg")
        .request("POST", "/api/products");
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("category"));
    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_rejected_files_write_nothing() {
    let (app, dir) = create_test_app_with(UploadPolicy::new(1024, 5), None);

    let request = product_form("Neem")
        .file("images", "ok.png", b"png")
        .file("images", "x.exe", b"MZ")
        .request("POST", "/api/products");
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("x.exe"));

    let request = product_form("Neem")
        .file("images", "big.jpg", &[0u8; 2048])
        .request("POST", "/api/products");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(stored_files(dir.path()).is_empty());
    let (_, list) = send(&app, get("/api/products")).await;
    assert_eq!(list["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_gallery_limit() {
    let (app, dir) = create_test_app();

    let mut form = product_form("Coir Mat");
    for i in 0..5 {
        form = form.file("images", &format!("{i}.jpg"), b"jpeg");
    }
    let (status, _) = send(&app, form.request("POST", "/api/products")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_input_is_sanitized() {
    let (app, _dir) = create_test_app();

    let request = Form::default()
        .text("title", "Tulsi")
        .text("category", "herbal")
        .text("shortDescription", "x")
        .text("description", "<script>alert('x')</script>")
        .text("$where", "sleep(1000)")
        .text("faqs", r#"[{"q":"<b>Why?</b>","a":"ok","$ne":1}]"#)
        .request("POST", "/api/products");
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        json["description"],
        "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
    );
    assert!(json.get("$where").is_none());
    assert_eq!(json["faqs"][0]["q"], "&lt;b&gt;Why?&lt;/b&gt;");
    assert!(json["faqs"][0].get("$ne").is_none());

    // Operator keys in the query string are dropped before routing
    let response = app
        .clone()
        .oneshot(get("/api/products?%24where=1&category=herbal"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-xss-protection"], "1; mode=block");
}

#[tokio::test]
async fn test_bad_specifications_default_to_empty() {
    let (app, _dir) = create_test_app();

    let request = product_form("Palm Sugar")
        .text("specifications", "{not json")
        .request("POST", "/api/products");
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["specifications"], json!({}));
}

#[tokio::test]
async fn test_duplicate_slug_conflicts() {
    let (app, _dir) = create_test_app();

    let (status, _) = send(&app, product_form("Green Tea").request("POST", "/api/products")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) =
        send(&app, product_form("Green  Tea!").request("POST", "/api/products")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("green-tea"));
}

#[tokio::test]
async fn test_certification_images() {
    let (app, dir) = create_test_app();

    let request = product_form("Moringa Powder")
        .text(
            "certificationsData",
            r#"[{"alt":"ISO 22000"},{"url":"https://cdn.example/fssai.png"}]"#,
        )
        .file("certificationImage_0", "iso.png", b"png")
        .request("POST", "/api/products");
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    let certs = json["certifications"].as_array().unwrap();
    assert_eq!(certs.len(), 2);
    assert!(certs[0]["src"].as_str().unwrap().starts_with("/uploads/products/"));
    assert_eq!(certs[0]["alt"], "ISO 22000");
    assert_eq!(certs[1]["src"], "https://cdn.example/fssai.png");
    assert_eq!(certs[1]["alt"], "Certificate");
    assert_eq!(stored_files(dir.path()).len(), 1);

    // A file without a matching entry is rejected
    let request = product_form("Moringa Capsules")
        .text("certificationsData", r#"[{"alt":"ISO"}]"#)
        .file("certificationImage_3", "iso.png", b"png")
        .request("POST", "/api/products");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(stored_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_certifications_cannot_claim_foreign_images() {
    let (app, dir) = create_test_app();

    let request = product_form("Neem Powder")
        .file("images", "a.jpg", b"neem")
        .request("POST", "/api/products");
    let (_, neem) = send(&app, request).await;
    let neem_image = neem["images"][0].as_str().unwrap().to_string();

    // Create cannot point a certification at another product's image
    let stolen = json!([{ "src": neem_image, "alt": "x" }]).to_string();
    let request = product_form("Tulsi Powder")
        .text("certificationsData", &stolen)
        .request("POST", "/api/products");
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains(&neem_image));

    let request = product_form("Tulsi Powder")
        .text("certificationsData", r#"[{"alt":"ISO"}]"#)
        .file("certificationImage_0", "iso.png", b"iso")
        .request("POST", "/api/products");
    let (status, tulsi) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    let tulsi_id = tulsi["id"].as_str().unwrap().to_string();
    let tulsi_cert = tulsi["certifications"][0]["src"].as_str().unwrap().to_string();

    // Neither can update, while the product's own certification stays valid
    let request = Form::default()
        .text("certificationsData", &stolen)
        .request("PUT", &format!("/api/products/{tulsi_id}"));
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let own = json!([{ "src": tulsi_cert, "alt": "ISO 22000" }]).to_string();
    let request = Form::default()
        .text("certificationsData", &own)
        .request("PUT", &format!("/api/products/{tulsi_id}"));
    let (status, updated) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["certifications"][0]["src"], tulsi_cert.as_str());

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/products/{tulsi_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    assert!(disk_path(dir.path(), &neem_image).exists());
    assert_eq!(stored_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_update_keeps_listed_images() {
    let (app, dir) = create_test_app();

    let request = product_form("Herbal Tea")
        .file("images", "a.jpg", b"first")
        .file("images", "b.jpg", b"second")
        .request("POST", "/api/products");
    let (_, created) = send(&app, request).await;
    let id = created["id"].as_str().unwrap().to_string();
    let first = created["images"][0].as_str().unwrap().to_string();
    let second = created["images"][1].as_str().unwrap().to_string();

    let request = Form::default()
        .text("existingImages", &json!([second]).to_string())
        .text("price", "4.5")
        .file("images", "c.jpg", b"third")
        .request("PUT", &format!("/api/products/{id}"));
    let (status, updated) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 4.5);
    assert_eq!(updated["title"], "Herbal Tea");

    let images = updated["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0], second.as_str());
    assert!(is_generated_reference(images[1].as_str().unwrap()));

    assert!(!disk_path(dir.path(), &first).exists());
    assert!(disk_path(dir.path(), &second).exists());
    assert_eq!(stored_files(dir.path()).len(), 2);
}

#[tokio::test]
async fn test_update_renames_slug() {
    let (app, _dir) = create_test_app();

    let (_, created) = send(&app, product_form("Jaggery").request("POST", "/api/products")).await;
    let id = created["id"].as_str().unwrap();

    let request = Form::default()
        .text("title", "Palm Jaggery Cubes")
        .request("PUT", &format!("/api/products/{id}"));
    let (status, updated) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["slug"], "palm-jaggery-cubes");

    let (status, _) = send(&app, get("/api/products/slug/jaggery")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Form::default()
        .text("title", "x")
        .request("PUT", "/api/products/does-not-exist");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_removes_images_and_product() {
    let (app, dir) = create_test_app();

    let request = product_form("Neem Oil")
        .file("images", "a.jpg", b"one")
        .file("images", "b.gif", b"two")
        .request("POST", "/api/products");
    let (_, created) = send(&app, request).await;
    let id = created["id"].as_str().unwrap();
    assert_eq!(stored_files(dir.path()).len(), 2);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/products/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert!(stored_files(dir.path()).is_empty());

    let (_, list) = send(&app, get("/api/products")).await;
    assert_eq!(list["products"], json!([]));

    let (status, _) = send(&app, get(&format!("/api/products/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let (app, _dir) = create_test_app();

    for title in ["Neem", "Tulsi", "Amla"] {
        send(&app, product_form(title).request("POST", "/api/products")).await;
    }
    let request = Form::default()
        .text("title", "Assam Tea")
        .text("category", "tea")
        .text("shortDescription", "x")
        .text("description", "y")
        .request("POST", "/api/products");
    send(&app, request).await;

    let (status, json) = send(&app, get("/api/products?category=herbal&sort=title&limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pagination"]["total"], 3);
    assert_eq!(json["pagination"]["pages"], 2);
    assert_eq!(json["products"][0]["title"], "Amla");
    assert_eq!(json["products"][1]["title"], "Neem");

    let (_, json) = send(&app, get("/api/products/category/tea")).await;
    assert_eq!(json["pagination"]["total"], 1);

    let (status, _) = send(&app, get("/api/products/category/spices")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/products?category=spices")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/api/products?sort=random")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_categories() {
    let (app, _dir) = create_test_app();

    let (status, json) = send(&app, get("/api/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 7);
    assert_eq!(json["categories"][1]["path"], "palm-jaggery");

    let (status, json) = send(&app, get("/api/categories/tea")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "tea");

    let (status, json) = send(&app, get("/api/categories/spices")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_content_crud() {
    let (app, dir) = create_test_app();

    let request = Form::default()
        .text("name", "Asha Traders")
        .text("text", "Consistent quality")
        .file("image", "asha.png", b"first")
        .request("POST", "/api/testimonials");
    let (status, created) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["title"], "Asha Traders");
    assert_eq!(created["kind"], "testimonial");
    let id = created["id"].as_str().unwrap().to_string();
    let old_image = created["image"].as_str().unwrap().to_string();
    assert!(old_image.starts_with("/uploads/testimonials/"));

    let (_, list) = send(&app, get("/api/testimonials")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    // Collections are independent
    let (_, certificates) = send(&app, get("/api/certificates")).await;
    assert_eq!(certificates, json!([]));

    let request = Form::default()
        .text("subtitle", "Kochi")
        .file("image", "new.jpg", b"second")
        .request("PUT", &format!("/api/testimonials/{id}"));
    let (status, updated) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["subtitle"], "Kochi");
    assert_eq!(updated["description"], "Consistent quality");
    assert_ne!(updated["image"], old_image.as_str());
    assert!(!disk_path(dir.path(), &old_image).exists());

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/testimonials/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(stored_files(dir.path()).is_empty());

    let (status, _) = send(&app, get(&format!("/api/testimonials/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Title is required
    let request = Form::default()
        .text("text", "anonymous")
        .request("POST", "/api/footer");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_auth() {
    let auth = AuthSettings::new("admin", "s3cret", "test-signing-key", 600);
    let (app, _dir) = create_test_app_with(UploadPolicy::default(), Some(auth));

    // Reads stay public
    let (status, _) = send(&app, get("/api/products")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, product_form("Neem").request("POST", "/api/products")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let login = |password: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "username": "admin", "password": password }).to_string(),
            ))
            .unwrap()
    };

    let (status, _) = send(&app, login("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(&app, login("s3cret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["expiresIn"], 600);
    let token = json["token"].as_str().unwrap();

    let mut request = product_form("Neem").request("POST", "/api/products");
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {token}").parse().unwrap(),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_login_without_auth_configured() {
    let (app, _dir) = create_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"username":"a","password":"b"}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _dir) = create_test_app();

    let (status, json) = send(&app, get("/api/nothing-here")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("/api/nothing-here"));
}

#[tokio::test]
async fn test_uploaded_images_are_served() {
    let (app, _dir) = create_test_app();

    let request = product_form("Egg Tray")
        .file("images", "tray.jpg", b"tray-bytes")
        .request("POST", "/api/products");
    let (_, created) = send(&app, request).await;
    let reference = created["images"][0].as_str().unwrap();

    let response = app.clone().oneshot(get(reference)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"tray-bytes");
}

#[tokio::test]
async fn test_api_routes_are_rate_limited() {
    let upload_dir = tempfile::tempdir().unwrap();
    let uploads = UploadGateway::new(
        Arc::new(LocalImageStore::new(upload_dir.path(), "/uploads")),
        UploadPolicy::default(),
    );
    let state = AppState::new(Arc::new(MemoryStore::new()), uploads).with_rate_limit(
        RateLimitConfig {
            per_minute: 2,
            burst: 2,
        },
    );
    let app = create_router(state);

    for _ in 0..2 {
        let response = app.clone().oneshot(get("/api/categories")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    }

    let response = app.clone().oneshot(get("/api/categories")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "30");

    // Health checks are not throttled
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}
