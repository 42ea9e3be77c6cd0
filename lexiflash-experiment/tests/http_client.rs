use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use lexiflash_core::{BlockType, TrialResult};
use lexiflash_experiment::{
    HttpExperimentClient, ResultsSink, ServiceError, SubmitTally, TrialDataService, submit_all,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const SESSION_COOKIE: &str = "experiment_session=abc123";

#[derive(Clone, Default)]
struct ServerState {
    accept_sessions: bool,
    submitted: Arc<Mutex<Vec<Value>>>,
    saved: Arc<Mutex<Vec<Value>>>,
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(SESSION_COOKIE))
}

async fn start_experiment(State(state): State<ServerState>) -> Response {
    if !state.accept_sessions {
        return Json(json!({"success": false})).into_response();
    }
    (
        [(header::SET_COOKIE, format!("{SESSION_COOKIE}; Path=/"))],
        Json(json!({
            "success": true,
            "session_id": "6f1c",
            "participant_id": "P-77"
        })),
    )
        .into_response()
}

async fn get_trial(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !has_session(&headers) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Session non initialisée"})),
        )
            .into_response();
    }
    let colored = body["block_type"] == "colored_bg";
    Json(json!({
        "stimulus": "table",
        "choices": ["chat", "chien", "table", "arbre"],
        "text_color": if colored { "#FFFF00" } else { "#000000" },
        "background_color": if colored { "#0000FF" } else { "#FFFFFF" },
        "display_time": 50,
        "is_word": body["trial_number"].as_u64().is_some_and(|n| n > 0),
    }))
    .into_response()
}

async fn submit_trial(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    state.submitted.lock().unwrap().push(body);
    Json(json!({"success": true})).into_response()
}

async fn save_result(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    let trial = body["trial"].as_u64();
    state.saved.lock().unwrap().push(body);
    if trial == Some(2) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "error": "disk full"})),
        )
            .into_response();
    }
    Json(json!({"success": true, "message": "saved"})).into_response()
}

async fn spawn_server(accept_sessions: bool) -> (String, ServerState) {
    let state = ServerState {
        accept_sessions,
        ..ServerState::default()
    };
    let app = Router::new()
        .route("/start_experiment", post(start_experiment))
        .route("/get_trial", post(get_trial))
        .route("/submit_trial", post(submit_trial))
        .route("/save_result", post(save_result))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/"), state)
}

fn result(trial_number: u32) -> TrialResult {
    TrialResult {
        block: BlockType::Color,
        trial_number,
        stimulus: "table".into(),
        response: "table".into(),
        correct: true,
        reaction_time_ms: 640,
        text_color: "#8B00FF".into(),
        background_color: "#FFFFFF".into(),
        choices: vec!["chat".into(), "chien".into(), "table".into(), "arbre".into()],
        is_word: true,
    }
}

#[tokio::test]
async fn session_cookie_is_sent_with_trial_requests() {
    let (url, _state) = spawn_server(true).await;
    let client = HttpExperimentClient::new(url, None).expect("client");

    let session = client.start_session().await.expect("session");
    assert_eq!(session.session_id, "6f1c");
    assert_eq!(session.participant_id, "P-77");

    let spec = client
        .get_trial(BlockType::ColoredBg, 3)
        .await
        .expect("trial");
    assert_eq!(spec.stimulus, "table");
    assert_eq!(spec.display_duration_ms, 50);
    assert_eq!(spec.background_color.as_str(), "#0000FF");
    assert!(spec.has_colored_background());
    assert!(spec.is_word);
}

#[tokio::test]
async fn trial_without_session_reports_server_error() {
    let (url, _state) = spawn_server(true).await;
    let client = HttpExperimentClient::new(url, None).expect("client");

    let err = client.get_trial(BlockType::Bw, 1).await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::Status {
            status: 400,
            message: Some("Session non initialisée".into()),
        }
    );
}

#[tokio::test]
async fn refused_session_is_an_error() {
    let (url, _state) = spawn_server(false).await;
    let client = HttpExperimentClient::new(url, None).expect("client");
    assert!(matches!(
        client.start_session().await,
        Err(ServiceError::Rejected(_))
    ));
}

#[tokio::test]
async fn trial_submission_uses_snake_case_body() {
    let (url, state) = spawn_server(true).await;
    let client = HttpExperimentClient::new(url, None).expect("client");
    client.submit_trial(&result(4)).await.expect("submit");

    let submitted = state.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["block_type"], "color");
    assert_eq!(submitted[0]["trial_number"], 4);
    assert_eq!(submitted[0]["reaction_time"], 640);
}

#[tokio::test]
async fn bulk_save_continues_past_a_failed_entry() {
    let (url, state) = spawn_server(true).await;
    let client = HttpExperimentClient::new(url, None).expect("client");
    let results = vec![result(1), result(2), result(3)];

    let mut percents = Vec::new();
    let tally = submit_all(&client, &results, |p| percents.push(p.percent)).await;

    assert_eq!(
        tally,
        SubmitTally {
            succeeded: 2,
            failed: 1,
            total: 3
        }
    );
    assert_eq!(percents.last(), Some(&100));

    let saved = state.saved.lock().unwrap();
    let trials: Vec<u64> = saved.iter().filter_map(|b| b["trial"].as_u64()).collect();
    assert_eq!(trials, vec![1, 2, 3]);
    assert_eq!(saved[0]["block"], 1);
    assert_eq!(saved[0]["reactionTime"], 640);
    assert_eq!(saved[0]["textColor"], "#8B00FF");
}
