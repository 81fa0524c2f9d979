mod support;

use serde_json::{json, Value};

use easyrec::bridge::{BridgeReply, MethodCall};
use easyrec::capture::{RecorderState, RecordingRequest};
use easyrec::error::{ErrorCode, RecorderError};
use support::{ConsentScript, Harness, ScriptedPlatform};

fn call(method: &str) -> MethodCall {
    MethodCall::new(method)
}

async fn status(harness: &Harness) -> Value {
    match harness.bridge.handle(call("getStatus")).await {
        BridgeReply::Success { result } => result,
        other => panic!("getStatus failed: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_recording_flow() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant));
    assert_eq!(status(&harness).await, json!("idle"));

    let reply = harness
        .bridge
        .handle(call("startRecording").with_arguments(json!({
            "width": 1280,
            "height": 720,
            "fps": 24,
            "bitrate": 4000000,
            "includeMicrophoneAudio": false
        })))
        .await;
    assert_eq!(reply, BridgeReply::success(Value::Null));
    assert_eq!(status(&harness).await, json!("recording"));

    let configs = harness.platform.encoder_configs();
    assert_eq!(configs.len(), 1);
    let config = configs[0];
    assert_eq!((config.width, config.height), (1280, 720));
    assert_eq!(config.fps, 24);
    assert_eq!(config.bitrate, 4_000_000);
    assert!(!config.include_microphone_audio());
    assert_eq!(config.density_dpi, 420);

    let reply = harness.bridge.handle(call("stopRecording")).await;
    let path = match reply {
        BridgeReply::Success {
            result: Value::String(path),
        } => std::path::PathBuf::from(path),
        other => panic!("unexpected stop reply: {:?}", other),
    };
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
    assert_eq!(path.parent(), Some(harness.recordings_dir().as_path()));
    assert!(path.exists());

    assert_eq!(status(&harness).await, json!("idle"));
    assert_eq!(harness.platform.live_resources(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_denied_consent_is_user_cancelled() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Deny));

    let reply = harness.bridge.handle(call("startRecording")).await;
    assert_eq!(reply.error_code(), Some(ErrorCode::UserCancelled));
    assert_eq!(status(&harness).await, json!("idle"));
    assert!(harness.recorded_files().is_empty());
    assert_eq!(harness.platform.live_resources(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_start_while_consent_pending() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Park));

    let bridge = harness.bridge.clone();
    let first = tokio::spawn(async move { bridge.handle(call("startRecording")).await });
    harness.platform.wait_for_parked().await;
    assert!(harness.recorder.is_consent_pending());

    let second = harness.bridge.handle(call("startRecording")).await;
    assert_eq!(second.error_code(), Some(ErrorCode::InProgress));

    harness.platform.answer(true);
    let first = first.await.unwrap();
    assert!(first.is_success());
    assert_eq!(harness.recorder.status(), RecorderState::Recording);

    // Defaults come from the display and include audio
    let config = harness.platform.encoder_configs()[0];
    assert_eq!((config.width, config.height), (1080, 2400));
    assert_eq!(config.fps, 30);
    assert_eq!(config.bitrate, 8_000_000);
    assert!(config.include_microphone_audio());

    assert!(harness.recorder.stop_recording().unwrap().is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_while_recording_fails_without_consent() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant));
    harness
        .recorder
        .start_recording(RecordingRequest::default())
        .await
        .unwrap();

    let err = harness
        .recorder
        .start_recording(RecordingRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::IllegalState(_)));
    assert!(!harness.recorder.is_consent_pending());
    assert_eq!(harness.recorder.status(), RecorderState::Recording);
    assert_eq!(harness.platform.encoder_configs().len(), 1);

    harness.recorder.stop_recording();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_start_releases_everything() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant).failing_encoder_start());

    let reply = harness.bridge.handle(call("startRecording")).await;
    assert_eq!(reply.error_code(), Some(ErrorCode::StartFailed));
    assert_eq!(status(&harness).await, json!("idle"));
    assert_eq!(harness.platform.live_resources(), 0);
    assert!(harness.recorded_files().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_resume_round_trip() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant));
    harness.bridge.handle(call("startRecording")).await;

    assert!(harness.bridge.handle(call("pauseRecording")).await.is_success());
    assert_eq!(status(&harness).await, json!("paused"));

    // Pausing twice is an illegal transition
    let again = harness.bridge.handle(call("pauseRecording")).await;
    assert_eq!(again.error_code(), Some(ErrorCode::PauseFailed));
    assert_eq!(status(&harness).await, json!("paused"));

    assert!(harness.bridge.handle(call("resumeRecording")).await.is_success());
    assert_eq!(status(&harness).await, json!("recording"));

    // Stopping from paused works too
    harness.bridge.handle(call("pauseRecording")).await;
    assert!(harness.bridge.handle(call("stopRecording")).await.is_success());
    assert_eq!(status(&harness).await, json!("idle"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_resume_without_capability() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant).without_pause_resume());
    harness.bridge.handle(call("startRecording")).await;

    let pause = harness.bridge.handle(call("pauseRecording")).await;
    assert_eq!(pause.error_code(), Some(ErrorCode::PauseFailed));
    let resume = harness.bridge.handle(call("resumeRecording")).await;
    assert_eq!(resume.error_code(), Some(ErrorCode::ResumeFailed));
    assert_eq!(status(&harness).await, json!("recording"));

    harness.recorder.stop_recording();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_when_idle_returns_null() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant));
    let reply = harness.bridge.handle(call("stopRecording")).await;
    assert_eq!(reply, BridgeReply::success(Value::Null));
    assert!(harness.platform.encoder_configs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_method_is_not_implemented() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant));
    let reply = harness.bridge.handle(call("takeScreenshot")).await;
    assert_eq!(reply, BridgeReply::NotImplemented);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_consecutive_recordings_get_distinct_files() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant));

    let mut paths = Vec::new();
    for _ in 0..2 {
        let path = harness
            .recorder
            .start_recording(RecordingRequest::default().without_audio())
            .await
            .unwrap();
        let stopped = harness.recorder.stop_recording().unwrap();
        assert_eq!(stopped.output_path, path);
        paths.push(path);
    }

    assert_ne!(paths[0], paths[1]);
    assert_eq!(harness.recorded_files().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_resume_from_idle_are_unsupported() {
    let harness = Harness::new(ScriptedPlatform::new(ConsentScript::Grant));

    let pause = harness.bridge.handle(call("pauseRecording")).await;
    assert_eq!(pause.error_code(), Some(ErrorCode::PauseFailed));
    let resume = harness.bridge.handle(call("resumeRecording")).await;
    assert_eq!(resume.error_code(), Some(ErrorCode::ResumeFailed));

    assert!(matches!(
        harness.recorder.pause_recording(),
        Err(RecorderError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        harness.recorder.resume_recording(),
        Err(RecorderError::UnsupportedOperation(_))
    ));
    assert_eq!(status(&harness).await, json!("idle"));
    assert!(harness.platform.encoder_configs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_answers_while_stop_finalizes() {
    let harness = Harness::new(
        ScriptedPlatform::new(ConsentScript::Grant)
            .slow_encoder_stop(std::time::Duration::from_millis(500)),
    );
    harness.bridge.handle(call("startRecording")).await;
    let mut states = harness.recorder.watch_status();
    assert_eq!(*states.borrow_and_update(), RecorderState::Recording);

    let bridge = harness.bridge.clone();
    let stop = tokio::spawn(async move { bridge.handle(call("stopRecording")).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let reply = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        harness.bridge.handle(call("getStatus")),
    )
    .await
    .expect("getStatus blocked behind stopRecording");
    assert_eq!(reply, BridgeReply::success(json!("recording")));

    assert!(stop.await.unwrap().is_success());
    states.changed().await.unwrap();
    assert_eq!(*states.borrow(), RecorderState::Idle);
    assert_eq!(harness.platform.live_resources(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_stop_reports_path_in_details() {
    let harness =
        Harness::new(ScriptedPlatform::new(ConsentScript::Grant).failing_encoder_stop());
    assert!(harness.bridge.handle(call("startRecording")).await.is_success());

    let reply = harness.bridge.handle(call("stopRecording")).await;
    let details = match reply {
        BridgeReply::Error {
            code: ErrorCode::StopFailed,
            details,
            ..
        } => details,
        other => panic!("unexpected stop reply: {:?}", other),
    };
    let path = std::path::PathBuf::from(details["path"].as_str().expect("path in details"));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
    assert_eq!(path.parent(), Some(harness.recordings_dir().as_path()));

    assert_eq!(status(&harness).await, json!("idle"));
    assert_eq!(harness.platform.live_resources(), 0);
}
