use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vidtrack::job::{JobDescription, JobSubmitter, SubmitError};
use vidtrack::service::{
    FileKind, HttpConfig, HttpTaskService, ProcessResponse, ServiceError, TagCategory, TagThresholds, TaskService,
};
use vidtrack::task::TaskState;

/// Requests seen by the fake service
#[derive(Clone, Default)]
struct Recorded {
    submissions: Arc<Mutex<Vec<Value>>>,
    request_ids: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn note(&self, headers: &HeaderMap) {
        if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            self.request_ids.lock().unwrap().push(id.to_string());
        }
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn task_json(task_id: &str, status: &str, progress: f64) -> Value {
    json!({
        "task_id": task_id,
        "status": status,
        "progress": progress,
        "current_step": "Tagging frames",
        "total_steps": 5,
        "completed_steps": 3,
        "start_time": "2024-05-01T10:00:00.123456",
        "end_time": null,
        "error_message": null,
        "result_path": null
    })
}

async fn process(State(recorded): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    recorded.note(&headers);
    recorded.submissions.lock().unwrap().push(body.clone());

    let video_path = body["video_path"].as_str().unwrap_or_default();
    if video_path.ends_with("missing.mp4") {
        return detail(StatusCode::BAD_REQUEST, "Video file not found");
    }
    if video_path.ends_with('/') {
        return Json(json!({
            "success": true,
            "task_ids": ["t1", "t2"],
            "main_task_id": "t1",
            "total_videos": 2,
            "processed_videos": ["ep01.mp4", "ep02.mp4"],
            "output_directory": body["output_directory"],
            "message": "Started processing 2 videos"
        }))
        .into_response();
    }
    Json(json!({ "success": true, "task_id": "t1", "message": "Processing started" })).into_response()
}

async fn status(Path(task_id): Path<String>) -> Response {
    match task_id.as_str() {
        "t1" => Json(task_json("t1", "processing", 0.6)).into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(task_json("slow", "processing", 0.1)).into_response()
        }
        "text" => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], "processing").into_response(),
        "weird" => Json(task_json("weird", "paused", 0.1)).into_response(),
        _ => detail(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn tasks() -> Json<Value> {
    Json(json!([
        task_json("t1", "processing", 0.6),
        {
            "task_id": "t0",
            "status": "failed",
            "progress": 0.2,
            "current_step": "Extracting frames",
            "total_steps": 5,
            "completed_steps": 1,
            "start_time": "2024-05-01T09:00:00",
            "end_time": "2024-05-01T09:01:30",
            "error_message": "CUDA out of memory"
        }
    ]))
}

async fn cancel(Path(task_id): Path<String>) -> Response {
    match task_id.as_str() {
        "t1" => Json(json!({ "success": true, "message": "Task cancelled" })).into_response(),
        "done" => detail(StatusCode::BAD_REQUEST, "Task cannot be cancelled"),
        _ => detail(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn validate_path(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let path = params.get("file_path").cloned().unwrap_or_default();
    let kind = params.get("file_type").cloned().unwrap_or_default();
    let ok = match kind.as_str() {
        "video" => path.ends_with(".mp4"),
        "image" => path.ends_with(".png"),
        _ => false,
    };
    let error = if ok { Value::Null } else { json!("Unsupported file extension") };
    Json(json!({ "valid": ok, "path": path, "type": kind, "error": error }))
}

async fn info(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("video_path").map(String::as_str) {
        Some("/videos/ep01.mp4") => Json(json!({
            "video_info": {
                "filename": "ep01.mp4",
                "duration": 1420.5,
                "fps": 23.976,
                "total_frames": 34058,
                "width": 1920,
                "height": 1080,
                "file_size": 734003200u64
            }
        }))
        .into_response(),
        _ => detail(StatusCode::NOT_FOUND, "Video file not found"),
    }
}

async fn health() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "unhealthy", "error": "model failed to load" })),
    )
        .into_response()
}

async fn system_config() -> Json<Value> {
    Json(json!({
        "processing_config": {
            "max_frames": 200,
            "scene_change_threshold": 0.3,
            "quality_threshold": 0.6,
            "tag_threshold": 0.35,
            "character_tag_threshold": 0.75,
            "general_tag_threshold": 0.35,
            "batch_size": 16
        },
        "supported_video_formats": [".mp4", ".mkv"],
        "supported_image_formats": [".png", ".jpg"],
        "model_name": "wd-eva02-large-tagger-v3",
        "device": "cuda"
    }))
}

fn threshold(params: &HashMap<String, String>, key: &str) -> f64 {
    params.get(key).and_then(|v| v.parse().ok()).unwrap_or(f64::NAN)
}

/// Fixed tagger output for `path`, filtered the way the service does
fn tag_image(path: &str, general: f64, character: f64) -> Option<Value> {
    if !path.ends_with(".png") {
        return None;
    }
    let general_tags: Vec<Value> = [("1girl", 0.95), ("smile", 0.42)]
        .into_iter()
        .filter(|(_, confidence)| *confidence >= general)
        .map(|(name, confidence)| json!({ "name": name, "confidence": confidence, "category": "general" }))
        .collect();
    let character_tags: Vec<Value> = [("rem_(re:zero)", 0.81)]
        .into_iter()
        .filter(|(_, confidence)| *confidence >= character)
        .map(|(name, confidence)| json!({ "name": name, "confidence": confidence, "category": "character" }))
        .collect();
    let tags: Vec<Value> = character_tags.iter().chain(&general_tags).cloned().collect();

    Some(json!({
        "filename": path,
        "tags": tags,
        "ratings": { "general": 0.88, "sensitive": 0.11 },
        "character_tags": character_tags,
        "general_tags": general_tags
    }))
}

async fn analyze_image(Query(params): Query<HashMap<String, String>>) -> Response {
    let path = params.get("image_path").cloned().unwrap_or_default();
    let general = threshold(&params, "general_threshold");
    let character = threshold(&params, "character_threshold");
    match tag_image(&path, general, character) {
        Some(tags) => Json(tags).into_response(),
        None => detail(StatusCode::BAD_REQUEST, "Invalid image file path"),
    }
}

async fn analyze_images(Query(params): Query<HashMap<String, String>>, Json(paths): Json<Vec<String>>) -> Response {
    let general = threshold(&params, "general_threshold");
    let character = threshold(&params, "character_threshold");
    let mut results = Vec::new();
    for path in &paths {
        match tag_image(path, general, character) {
            Some(tags) => results.push(tags),
            None => return detail(StatusCode::BAD_REQUEST, &format!("Invalid image file path: {}", path)),
        }
    }
    Json(Value::Array(results)).into_response()
}

async fn create_match_request(
    Query(params): Query<HashMap<String, String>>,
    Json(paths): Json<Vec<String>>,
) -> Response {
    let min_confidence = threshold(&params, "min_confidence");
    let analysis: Vec<Value> = paths.iter().filter_map(|path| tag_image(path, 0.35, 0.75)).collect();
    let required: Vec<&str> = [("1girl", 0.95), ("smile", 0.42)]
        .into_iter()
        .filter(|(_, confidence)| *confidence >= min_confidence)
        .map(|(name, _)| name)
        .collect();

    Json(json!({
        "success": true,
        "match_request": {
            "required_tags": required,
            "excluded_tags": [],
            "character_tags": ["rem_(re:zero)"],
            "min_rating_general": 0.7,
            "max_rating_sensitive": 0.13,
            "character_tag_threshold": 0.75,
            "general_tag_threshold": 0.35
        },
        "reference_analysis": analysis
    }))
    .into_response()
}

async fn model_info() -> Json<Value> {
    Json(json!({
        "success": true,
        "model_info": {
            "model_name": "wd-eva02-large-tagger-v3",
            "device": "cuda",
            "total_tags": 10861,
            "general_tags_count": 8532,
            "character_tags_count": 2329
        }
    }))
}

async fn spawn_service() -> (HttpTaskService, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/video/process", post(process))
        .route("/api/video/status/{task_id}", get(status))
        .route("/api/video/tasks", get(tasks))
        .route("/api/video/task/{task_id}", delete(cancel))
        .route("/api/video/validate-path", get(validate_path))
        .route("/api/video/info", get(info))
        .route("/api/health", get(health))
        .route("/api/config", get(system_config))
        .route("/api/tags/model-info", get(model_info))
        .route("/api/tags/analyze-image", post(analyze_image))
        .route("/api/tags/analyze-images", post(analyze_images))
        .route("/api/tags/create-match-request", post(create_match_request))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let service = HttpTaskService::new(HttpConfig {
        base_url: format!("http://{}", address),
        request_timeout: Duration::from_millis(300),
        ..HttpConfig::default()
    })
    .unwrap();
    (service, recorded)
}

#[tokio::test]
async fn test_single_submission() {
    let (service, recorded) = spawn_service().await;
    let submitter = JobSubmitter::new(Arc::new(service));

    let job = JobDescription::builder()
        .video_path("/videos/ep01.mp4")
        .output_directory("/datasets/ep01")
        .reference_image_paths(vec!["/refs/rem.png".to_string(), "".to_string()])
        .build();
    let result = submitter.submit(job).await.unwrap();

    assert_eq!(result.primary_task_id, "t1");
    assert_eq!(result.all_task_ids, vec!["t1"]);

    let sent = recorded.submissions.lock().unwrap()[0].clone();
    assert_eq!(sent["reference_image_paths"], json!(["/refs/rem.png"]));
    assert_eq!(sent["config"]["max_frames"], json!(200));
    assert!(sent.get("output_name").is_none());
    assert_eq!(recorded.request_ids.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_batch_submission() {
    let (service, _) = spawn_service().await;
    let job = JobDescription::builder()
        .video_path("/videos/season1/")
        .output_directory("/datasets/season1")
        .output_name("s1")
        .build();

    let result = JobSubmitter::new(Arc::new(service)).submit(job).await.unwrap();
    assert_eq!(result.primary_task_id, "t1");
    assert_eq!(result.all_task_ids, vec!["t1", "t2"]);
    let batch = result.batch.unwrap();
    assert_eq!(batch.total_videos, 2);
    assert_eq!(batch.output_directory, "/datasets/season1");
}

#[tokio::test]
async fn test_rejected_submission_carries_detail() {
    let (service, _) = spawn_service().await;
    let job = JobDescription::builder()
        .video_path("/videos/missing.mp4")
        .output_directory("/datasets/x")
        .build();

    let err = JobSubmitter::new(Arc::new(service)).submit(job).await.unwrap_err();
    match err {
        SubmitError::Submission(e) => {
            assert_eq!(e.message, "Video file not found");
            assert!(matches!(e.cause, ServiceError::Rejected { status: 400, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_status_parses_naive_timestamps() {
    let (service, _) = spawn_service().await;

    let status = service.task_status("t1").await.unwrap();
    assert_eq!(status.state, TaskState::Processing);
    assert_eq!(status.percent_complete(), 60);
    assert_eq!(status.start_time.to_rfc3339(), "2024-05-01T10:00:00.123456+00:00");
    assert!(status.end_time.is_none());
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (service, _) = spawn_service().await;

    assert!(matches!(
        service.task_status("nope").await,
        Err(ServiceError::NotFound(message)) if message == "Task not found"
    ));
    assert!(matches!(service.cancel_task("nope").await, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn test_decode_failures() {
    let (service, _) = spawn_service().await;

    assert!(matches!(service.task_status("text").await, Err(ServiceError::Decode(_))));
    assert!(matches!(service.task_status("weird").await, Err(ServiceError::Decode(_))));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let (service, _) = spawn_service().await;
    assert_eq!(service.task_status("slow").await.unwrap_err(), ServiceError::Timeout);
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let service = HttpTaskService::new(HttpConfig {
        base_url: format!("http://{}", address),
        ..HttpConfig::default()
    })
    .unwrap();

    assert!(service.list_tasks().await.unwrap_err().is_transport());
}

#[tokio::test]
async fn test_list_and_cancel() {
    let (service, _) = spawn_service().await;

    let tasks = service.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[1].state, TaskState::Failed);
    assert_eq!(tasks[1].error_message.as_deref(), Some("CUDA out of memory"));
    assert_eq!(tasks[1].elapsed(chrono::Utc::now()), Duration::from_secs(90));

    let cancelled = service.cancel_task("t1").await.unwrap();
    assert!(cancelled.success);

    assert_eq!(
        service.cancel_task("done").await.unwrap_err(),
        ServiceError::Rejected {
            status: 400,
            message: Some("Task cannot be cancelled".to_string()),
        }
    );
}

#[tokio::test]
async fn test_validate_path_query() {
    let (service, _) = spawn_service().await;

    let ok = service.validate_path("/videos/ep 01.mp4", FileKind::Video).await.unwrap();
    assert!(ok.valid);
    assert_eq!(ok.path, "/videos/ep 01.mp4");
    assert_eq!(ok.kind.as_deref(), Some("video"));

    let bad = service.validate_path("/refs/rem.mp4", FileKind::Image).await.unwrap();
    assert!(!bad.valid);
    assert_eq!(bad.error.as_deref(), Some("Unsupported file extension"));
}

#[tokio::test]
async fn test_info_health_and_config() {
    let (service, _) = spawn_service().await;

    let info = service.video_info("/videos/ep01.mp4").await.unwrap();
    assert_eq!(info.width, 1920);
    assert_eq!(info.total_frames, 34058);

    let report = service.health().await.unwrap();
    assert!(!report.is_healthy());
    assert_eq!(report.error.as_deref(), Some("model failed to load"));

    let config = service.system_config().await.unwrap();
    assert_eq!(config.device, "cuda");
    assert_eq!(config.processing_config.batch_size, 16);
}

#[tokio::test]
async fn test_analyze_single_image_sends_thresholds() {
    let (service, _) = spawn_service().await;

    let tags = service.analyze_image("/refs/rem.png", TagThresholds::default()).await.unwrap();
    assert_eq!(tags.filename, "/refs/rem.png");
    assert_eq!(tags.general_tags.len(), 2);
    assert_eq!(tags.character_tags[0].category, TagCategory::Character);
    assert_eq!(tags.ratings["sensitive"], 0.11);

    let strict = TagThresholds {
        general: 0.5,
        character: 0.9,
    };
    let tags = service.analyze_image("/refs/rem.png", strict).await.unwrap();
    assert_eq!(tags.general_tags.len(), 1);
    assert!(tags.character_tags.is_empty());

    let err = service.analyze_image("/refs/rem.mp4", strict).await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::Rejected {
            status: 400,
            message: Some("Invalid image file path".to_string()),
        }
    );
}

#[tokio::test]
async fn test_analyze_images_keeps_order() {
    let (service, _) = spawn_service().await;
    let paths = vec!["/refs/b.png".to_string(), "/refs/a.png".to_string()];

    let results = service.analyze_images(&paths, TagThresholds::default()).await.unwrap();
    let names: Vec<_> = results.iter().map(|tags| tags.filename.as_str()).collect();
    assert_eq!(names, vec!["/refs/b.png", "/refs/a.png"]);

    let mixed = vec!["/refs/a.png".to_string(), "/refs/clip.mp4".to_string()];
    let err = service.analyze_images(&mixed, TagThresholds::default()).await.unwrap_err();
    assert!(err.remote_message().unwrap().contains("/refs/clip.mp4"));
}

#[tokio::test]
async fn test_match_request_and_model_info() {
    let (service, _) = spawn_service().await;
    let references = vec!["/refs/a.png".to_string(), "/refs/b.png".to_string()];

    let proposal = service.create_match_request(&references, 0.7).await.unwrap();
    assert_eq!(proposal.match_request.required_tags, vec!["1girl"]);
    assert_eq!(proposal.match_request.character_tags, vec!["rem_(re:zero)"]);
    assert_eq!(proposal.reference_analysis.len(), 2);

    let lenient = service.create_match_request(&references, 0.4).await.unwrap();
    assert_eq!(lenient.match_request.required_tags, vec!["1girl", "smile"]);

    let model = service.model_info().await.unwrap();
    assert_eq!(model.model_name, "wd-eva02-large-tagger-v3");
    assert_eq!(model.character_tags_count, 2329);
}

#[tokio::test]
async fn test_raw_submit_response_shape() {
    let (service, _) = spawn_service().await;
    let job = JobDescription::builder()
        .video_path("/videos/ep01.mp4")
        .output_directory("/out")
        .build();

    let response = service
        .submit_job(&vidtrack::service::ProcessRequest::from_job(&job))
        .await
        .unwrap();
    assert!(matches!(response, ProcessResponse::Single(single) if single.task_id == "t1"));
}
