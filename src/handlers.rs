// src/handlers.rs
use crate::{AppState, errors::PostfitError, models::*};
use actix_cors::Cors;
use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::http::Method;
use actix_web::{Error, HttpRequest, HttpResponse, web};
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use log::{info, warn};
use std::path::{Component, Path, PathBuf};

const VALID_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/jpg", "image/gif"];

const FRONTEND_MISSING: &str = "<html><body><h1>Social Media Image Optimizer</h1>\
<p>Frontend not found. Please check installation.</p></body></html>";

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/platforms/", web::get().to(list_platforms))
        .route("/process-image/", web::post().to(process_image))
        .route("/media/optimized/{filename}", web::get().to(serve_optimized))
        .route("/reload-models/", web::post().to(reload_models))
        .route("/health", web::get().to(health_check));
}

/// Any origin may call the API, so a separately hosted frontend works.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

pub async fn list_platforms() -> HttpResponse {
    let platforms: serde_json::Map<String, serde_json::Value> = PLATFORMS
        .iter()
        .map(|p| {
            (
                p.key.to_string(),
                serde_json::json!({
                    "name": p.display_name(),
                    "size": format!("({}x{})", p.width, p.height)
                }),
            )
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({ "platforms": platforms }))
}

#[derive(Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    platform: Option<String>,
    format: Option<String>,
    smart_crop_enabled: Option<String>,
    enhance_image_enabled: Option<String>,
    confidence: Option<String>,
    timestamp: Option<String>,
}

async fn read_form(mut payload: Multipart, limit: usize) -> Result<UploadForm, Error> {
    let mut form = UploadForm::default();
    let mut received = 0usize;

    while let Some(mut field) = payload.try_next().await? {
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();
        let content_type = field
            .content_type()
            .map(|ct| ct.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            received += chunk.len();
            if received > limit {
                return Err(PostfitError::Validation(format!(
                    "Upload exceeds {} bytes",
                    limit
                ))
                .into());
            }
            data.extend_from_slice(&chunk);
        }
        let data = data.freeze();

        match name.as_str() {
            "file" => form.file = Some((content_type, data)),
            "platform" => form.platform = Some(field_text(&data)),
            "format" => form.format = Some(field_text(&data)),
            "smart_crop_enabled" => form.smart_crop_enabled = Some(field_text(&data)),
            "enhance_image_enabled" => form.enhance_image_enabled = Some(field_text(&data)),
            "confidence" => form.confidence = Some(field_text(&data)),
            "timestamp" => form.timestamp = Some(field_text(&data)),
            other => warn!("Ignoring unexpected form field {:?}", other),
        }
    }

    Ok(form)
}

fn field_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim().to_string()
}

fn parse_flag(value: Option<&str>, field: &str) -> Result<bool, PostfitError> {
    match value.map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "false" | "0" | "no" | "off" => Ok(false),
            "true" | "1" | "yes" | "on" => Ok(true),
            _ => Err(PostfitError::Validation(format!(
                "{} must be a boolean, got {:?}",
                field, v
            ))),
        },
    }
}

fn validate(form: UploadForm) -> Result<(Bytes, ProcessingOptions), PostfitError> {
    let (content_type, data) = form
        .file
        .ok_or_else(|| PostfitError::Validation("No file provided".to_string()))?;
    if !VALID_TYPES.contains(&content_type.as_str()) {
        warn!("Invalid file type: {}", content_type);
        return Err(PostfitError::Validation(
            "Invalid file type. Please upload a JPEG, PNG, or GIF image.".to_string(),
        ));
    }

    let platform = form.platform.unwrap_or_default();
    if PlatformSpec::lookup(&platform).is_none() {
        warn!("Invalid platform: {}", platform);
        return Err(PostfitError::Validation(format!(
            "Invalid platform. Available platforms: {}",
            PlatformSpec::keys().collect::<Vec<_>>().join(", ")
        )));
    }

    let format = match form.format.as_deref() {
        None | Some("") => OutputFormat::default(),
        Some(raw) => raw.parse()?,
    };
    let confidence = match form.confidence.as_deref() {
        None | Some("") => 0.3,
        Some(raw) => raw.parse::<f32>().map_err(|_| {
            PostfitError::Validation(format!("confidence must be a number, got {:?}", raw))
        })?,
    };

    let options = ProcessingOptions {
        platform,
        format,
        smart_crop_enabled: parse_flag(form.smart_crop_enabled.as_deref(), "smart_crop_enabled")?,
        enhance_enabled: parse_flag(form.enhance_image_enabled.as_deref(), "enhance_image_enabled")?,
        confidence,
        cache_token: form.timestamp,
    };
    Ok((data, options))
}

pub async fn process_image(
    payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let form = read_form(payload, data.config.max_upload_bytes).await?;
    let (image_data, options) = validate(form)?;

    info!(
        "Processing image request: platform={}, format={}, smart_crop={}, size={} bytes",
        options.platform,
        options.format,
        options.smart_crop_enabled,
        image_data.len()
    );

    let result = data.pipeline.process(image_data, &options).await;

    if result.is_success() {
        Ok(HttpResponse::Ok().json(&result))
    } else {
        Ok(HttpResponse::BadRequest().json(&result))
    }
}

pub fn content_type_for(filename: &str) -> String {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "jpg" {
        "image/jpeg".to_string()
    } else {
        format!("image/{}", ext)
    }
}

pub async fn serve_optimized(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let filename = path.into_inner();
    let bytes = data.pipeline.store().read_optimized(&filename).await?;

    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&filename))
        .body(bytes))
}

fn model_status(data: &AppState) -> &'static str {
    if data.models.is_loaded() {
        "loaded"
    } else {
        "not loaded"
    }
}

pub async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "API is running",
        "models": { "gemini": model_status(&data) }
    }))
}

pub async fn reload_models(data: web::Data<AppState>) -> HttpResponse {
    let api_key = std::env::var("GEMINI_API_KEY")
        .ok()
        .or_else(|| data.config.gemini_api_key.clone());
    let loaded = data.models.reload(api_key);
    info!("Models reloaded, gemini loaded: {}", loaded);

    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "Models reloaded",
        "models": { "gemini": model_status(&data) }
    }))
}

/// Fallback for unmatched paths: a file from the frontend build, else its
/// `index.html`, else a placeholder page.
pub async fn serve_frontend(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Ok(HttpResponse::MethodNotAllowed().finish());
    }

    let root = &data.config.frontend_dir;
    let requested = req.path().trim_start_matches('/');
    let path = match frontend_file(root, requested).await {
        Some(path) => Some(path),
        None => frontend_file(root, "index.html").await,
    };

    match path {
        Some(path) => Ok(NamedFile::open_async(path).await?.into_response(&req)),
        None => Ok(HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(FRONTEND_MISSING)),
    }
}

async fn frontend_file(root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested);
    if requested.is_empty() || relative.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    let path = root.join(relative);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Some(path),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use actix_web::http::StatusCode;
    use actix_web::App;
    use actix_web::test as actix_test;
    use image::{DynamicImage, GenericImageView, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    const BOUNDARY: &str = "postfit-test-boundary";

    fn state(tmp: &TempDir) -> AppState {
        state_with(tmp, Config::default())
    }

    fn state_with(tmp: &TempDir, base: Config) -> AppState {
        let config = Config {
            output_dir: tmp.path().join("optimized"),
            caption_dir: tmp.path().join("captions"),
            frontend_dir: tmp.path().join("frontend"),
            ..base
        };
        std::fs::create_dir_all(&config.output_dir).unwrap();
        std::fs::create_dir_all(&config.caption_dir).unwrap();
        AppState::new(config)
    }

    fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((content_type, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(body: Vec<u8>) -> actix_test::TestRequest {
        actix_test::TestRequest::post()
            .uri("/process-image/")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    fn small_png() -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(48, 27))
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[actix_web::test]
    async fn platforms_lists_registry() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/platforms/").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;

        let platforms = body["platforms"].as_object().unwrap();
        assert_eq!(platforms.len(), 8);
        assert_eq!(platforms["instagram_story"]["name"], "Instagram Story");
        assert_eq!(platforms["linkedin"]["size"], "(1200x627)");
    }

    #[actix_web::test]
    async fn health_reports_model_state() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models"]["gemini"], "not loaded");
    }

    #[actix_web::test]
    async fn missing_media_is_404() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/media/optimized/instagram_nope_1.jpeg")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn media_content_type_follows_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("optimized")).unwrap();
        std::fs::write(tmp.path().join("optimized/a.jpg"), b"j").unwrap();
        std::fs::write(tmp.path().join("optimized/b.png"), b"p").unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        for (uri, expected) in [
            ("/media/optimized/a.jpg", "image/jpeg"),
            ("/media/optimized/b.png", "image/png"),
        ] {
            let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(resp.headers().get("content-type").unwrap(), expected);
        }
    }

    #[actix_web::test]
    async fn invalid_platform_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        let png = small_png();
        let req = upload(multipart(&[("platform", "myspace")], Some(("image/png", png.as_slice())))).to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("instagram_story"));
    }

    #[actix_web::test]
    async fn invalid_content_type_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        let req = upload(multipart(
            &[("platform", "twitter")],
            Some(("application/pdf", &b"%PDF-1.4"[..])),
        ))
        .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn undecodable_upload_returns_error_record() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        let req = upload(multipart(
            &[("platform", "pinterest")],
            Some(("image/jpeg", &b"not really a jpeg"[..])),
        ))
        .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Processing failed"));
        assert_eq!(body["platform"], "Pinterest");
        assert_eq!(body["size"], serde_json::json!([1000, 1500]));
    }

    #[actix_web::test]
    async fn successful_upload_is_served_back() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .configure(routes),
        )
        .await;

        let png = small_png();
        let req = upload(multipart(
            &[
                ("platform", "youtube_thumbnail"),
                ("format", "PNG"),
                ("smart_crop_enabled", "false"),
                ("timestamp", "1700000000000"),
            ],
            Some(("image/png", png.as_slice())),
        ))
        .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["platform"], "Youtube Thumbnail");
        assert_eq!(body["size"], serde_json::json!([1280, 720]));
        assert_eq!(body["enhanced"], false);

        let url = body["optimized_image"].as_str().unwrap().to_string();
        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri(&url).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
        let served = actix_test::read_body(resp).await;
        assert_eq!(image::load_from_memory(&served).unwrap().dimensions(), (1280, 720));
    }

    #[test]
    fn flags_parse_leniently() {
        assert!(parse_flag(Some("True"), "f").unwrap());
        assert!(parse_flag(Some("on"), "f").unwrap());
        assert!(!parse_flag(None, "f").unwrap());
        assert!(!parse_flag(Some("0"), "f").unwrap());
        assert!(parse_flag(Some("maybe"), "f").is_err());
    }

    #[test]
    fn content_types_from_extension() {
        assert_eq!(content_type_for("x.jpg"), "image/jpeg");
        assert_eq!(content_type_for("x.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("x.PNG"), "image/png");
        assert_eq!(content_type_for("x.tiff"), "image/tiff");
    }

    #[actix_web::test]
    async fn upload_limit_covers_all_fields() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            max_upload_bytes: 64,
            ..Config::default()
        };
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(&tmp, config)))
                .configure(routes),
        )
        .await;

        // each field fits on its own, together they do not
        let padding = "9".repeat(40);
        let req = upload(multipart(
            &[("platform", "twitter"), ("timestamp", padding.as_str())],
            Some(("image/png", &[0u8; 40][..])),
        ))
        .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("Upload exceeds 64 bytes"));
    }

    #[actix_web::test]
    async fn preflight_allows_any_origin() {
        let tmp = TempDir::new().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state(&tmp)))
                .wrap(cors())
                .configure(routes),
        )
        .await;

        let req = actix_test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/process-image/")
            .insert_header(("origin", "http://localhost:3000"))
            .insert_header(("access-control-request-method", "POST"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let allowed = resp.headers().get("access-control-allow-origin").unwrap();
        assert!(allowed == "http://localhost:3000" || allowed == "*");
    }

    #[actix_web::test]
    async fn unknown_paths_fall_back_to_frontend() {
        let tmp = TempDir::new().unwrap();
        let app_state = state(&tmp);
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(app_state))
                .configure(routes)
                .default_service(web::to(serve_frontend)),
        )
        .await;

        // no build yet: placeholder page
        let req = actix_test::TestRequest::get().uri("/dashboard").to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert!(String::from_utf8_lossy(&body).contains("Frontend not found"));

        let build = tmp.path().join("frontend");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("index.html"), "<div id=\"root\"></div>").unwrap();
        std::fs::write(build.join("app.js"), "console.log(1)").unwrap();

        let req = actix_test::TestRequest::get().uri("/app.js").to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(&body[..], b"console.log(1)");

        let req = actix_test::TestRequest::get().uri("/settings/profile").to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(&body[..], b"<div id=\"root\"></div>");

        let req = actix_test::TestRequest::get().uri("/../Cargo.toml").to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(&body[..], b"<div id=\"root\"></div>");

        let req = actix_test::TestRequest::delete().uri("/dashboard").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
