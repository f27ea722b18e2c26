//! Job registry behaviour: submission, status lookup, cancellation,
//! retention, and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{ms, orchestrator, processing, succeeded, ScriptedAdapter, ScriptedSubmit};
use genjob_core::backoff::PollConfig;
use genjob_core::job::{ErrorKind, JobSnapshot, JobState};
use genjob_core::provider::{GenerationKind, ProviderId};
use genjob_core::types::JobId;
use genjob_engine::{JobService, ServiceError, Submitted};
use serde_json::json;
use tokio::time::Instant;

fn service(adapter: Arc<ScriptedAdapter>, config: PollConfig) -> JobService {
    JobService::new(Arc::new(orchestrator(adapter, config)))
}

async fn submit_image(service: &JobService) -> Submitted {
    service
        .submit_job(GenerationKind::Image, None, json!({"prompt": "harbor at night"}))
        .await
        .unwrap()
}

/// Poll the registry until the job reaches a terminal state.
async fn wait_for_terminal(service: &JobService, job_id: JobId) -> JobSnapshot {
    loop {
        let snapshot = service.get_job_status(job_id).await.expect("job is tracked");
        if snapshot.state.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(ms(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn accepted_job_runs_in_background_to_success() {
    let adapter = Arc::new(ScriptedAdapter::pending(vec![
        processing(),
        succeeded("https://pub/harbor.png"),
    ]));
    let service = service(Arc::clone(&adapter), PollConfig::fixed(ms(1000), 5));

    let job_id = assert_matches!(submit_image(&service).await, Submitted::Accepted(id) => id);

    let queued = service.get_job_status(job_id).await.unwrap();
    assert_eq!(queued.state, JobState::Queued);
    assert_eq!(queued.provider, ProviderId::ModelsLab);

    let done = wait_for_terminal(&service, job_id).await;
    assert_eq!(done.state, JobState::Succeeded);
    assert_eq!(done.attempt, 2);
    assert_eq!(
        done.result.unwrap().outputs().to_vec(),
        vec!["https://pub/harbor.png".to_string()]
    );
    assert_eq!(service.active_jobs().await, 0);
}

#[tokio::test(start_paused = true)]
async fn slow_submission_answers_with_tracked_job_id() {
    let adapter = Arc::new(ScriptedAdapter::new(
        ProviderId::ModelsLab,
        vec![ScriptedSubmit::Slow(Duration::from_secs(60))],
        vec![succeeded("https://pub/late.png")],
    ));
    let service = service(Arc::clone(&adapter), PollConfig::fixed(ms(1000), 5))
        .with_submit_wait(Duration::from_secs(15));

    let origin = Instant::now();
    let job_id = assert_matches!(submit_image(&service).await, Submitted::Accepted(id) => id);

    assert_eq!(Instant::now() - origin, Duration::from_secs(15));
    assert_eq!(service.get_job_status(job_id).await.unwrap().state, JobState::Queued);

    let done = wait_for_terminal(&service, job_id).await;
    assert_eq!(done.state, JobState::Succeeded);
    assert_eq!(done.attempt, 1);
    assert_eq!(adapter.poll_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_submission_still_runs_and_is_tracked() {
    let adapter = Arc::new(ScriptedAdapter::new(
        ProviderId::ModelsLab,
        vec![ScriptedSubmit::Slow(Duration::from_secs(60))],
        vec![succeeded("https://pub/late.png")],
    ));
    let service = service(Arc::clone(&adapter), PollConfig::fixed(ms(1000), 5));

    let gave_up = tokio::time::timeout(Duration::from_secs(5), submit_image(&service)).await;
    assert!(gave_up.is_err());
    assert_eq!(service.active_jobs().await, 1);

    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(adapter.poll_count(), 1);
    assert_eq!(service.active_jobs().await, 0);
}

#[tokio::test(start_paused = true)]
async fn immediate_result_is_returned_as_completed() {
    let adapter = Arc::new(ScriptedAdapter::new(
        ProviderId::ModelsLab,
        vec![ScriptedSubmit::Immediate(vec!["https://pub/now.png".into()])],
        vec![processing()],
    ));
    let service = service(adapter, PollConfig::fixed(ms(1000), 5));

    let snapshot = assert_matches!(submit_image(&service).await, Submitted::Completed(s) => s);

    assert_eq!(snapshot.state, JobState::Succeeded);
    assert_eq!(snapshot.attempt, 0);
    let stored = service.get_job_status(snapshot.job_id).await.unwrap();
    assert_eq!(stored, snapshot);
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_is_completed_with_error() {
    let adapter = Arc::new(ScriptedAdapter::pending(vec![processing()]));
    let service = service(adapter, PollConfig::fixed(ms(1000), 5));

    let submitted = service
        .submit_job(GenerationKind::Image, None, json!({"invalid": true}))
        .await
        .unwrap();

    let snapshot = assert_matches!(submitted, Submitted::Completed(s) => s);
    assert_eq!(snapshot.state, JobState::Failed);
    assert_eq!(snapshot.error.unwrap().kind, ErrorKind::Validation);
}

#[tokio::test(start_paused = true)]
async fn unknown_provider_is_refused() {
    let adapter = Arc::new(ScriptedAdapter::pending(vec![processing()]));
    let service = service(adapter, PollConfig::fixed(ms(1000), 5));

    // Video defaults to Kling, which is not registered here.
    let err = service
        .submit_job(GenerationKind::Video, None, json!({"prompt": "x"}))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::UnknownProvider(ProviderId::Kling));
}

#[tokio::test(start_paused = true)]
async fn cancel_job_resolves_canceled_and_stops_polling() {
    let adapter = Arc::new(ScriptedAdapter::pending(vec![processing()]));
    let service = service(Arc::clone(&adapter), PollConfig::fixed(ms(1000), 50));

    let job_id = assert_matches!(submit_image(&service).await, Submitted::Accepted(id) => id);
    tokio::time::sleep(ms(2500)).await;
    service.cancel_job(job_id).await.unwrap();

    let done = wait_for_terminal(&service, job_id).await;
    assert_eq!(done.state, JobState::Canceled);
    assert_eq!(done.attempt, 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(adapter.poll_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_job_errors() {
    let adapter = Arc::new(ScriptedAdapter::new(
        ProviderId::ModelsLab,
        vec![ScriptedSubmit::Immediate(vec!["https://pub/now.png".into()])],
        vec![processing()],
    ));
    let service = service(adapter, PollConfig::fixed(ms(1000), 5));

    let missing = uuid::Uuid::new_v4();
    assert_matches!(
        service.cancel_job(missing).await,
        Err(ServiceError::NotFound(id)) if id == missing
    );

    let snapshot = assert_matches!(submit_image(&service).await, Submitted::Completed(s) => s);
    assert_matches!(
        service.cancel_job(snapshot.job_id).await,
        Err(ServiceError::AlreadyFinished { state: JobState::Succeeded, .. })
    );
}

#[tokio::test(start_paused = true)]
async fn finished_jobs_are_pruned_after_retention() {
    let adapter = Arc::new(ScriptedAdapter::new(
        ProviderId::ModelsLab,
        vec![ScriptedSubmit::Immediate(vec!["https://pub/now.png".into()])],
        vec![processing()],
    ));
    let service = service(adapter, PollConfig::fixed(ms(1000), 5))
        .with_retention(Duration::from_secs(60));

    let first = assert_matches!(submit_image(&service).await, Submitted::Completed(s) => s);

    tokio::time::sleep(Duration::from_secs(30)).await;
    submit_image(&service).await;
    assert!(service.get_job_status(first.job_id).await.is_some());

    tokio::time::sleep(Duration::from_secs(31)).await;
    submit_image(&service).await;
    assert!(service.get_job_status(first.job_id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_running_jobs() {
    let adapter = Arc::new(ScriptedAdapter::pending(vec![processing()]));
    let service = service(Arc::clone(&adapter), PollConfig::fixed(ms(1000), 100));

    for _ in 0..3 {
        submit_image(&service).await;
    }
    tokio::time::sleep(ms(1500)).await;
    assert_eq!(service.active_jobs().await, 3);

    service.shutdown().await;
    let polls_at_shutdown = adapter.poll_count();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(polls_at_shutdown, 3);
    assert_eq!(adapter.poll_count(), polls_at_shutdown);
    assert_eq!(service.active_jobs().await, 0);
}
