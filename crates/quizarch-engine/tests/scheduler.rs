//! Scheduler, supervisor and history behaviour.

mod support;

use std::sync::Arc;
use std::time::Duration;

use quizarch_core::{JobStatus, MoodleBackupTask, WorkerError, WorkerStatus};
use quizarch_engine::{ArchiveJob, JobDeps, JobHistory, LopdfOptimizer, Scheduler};

use support::{descriptor, test_settings, StubConfig, StubMoodleApi, StubRenderer, BASE_URL};

fn deps() -> JobDeps {
    JobDeps {
        renderer: Arc::new(StubRenderer::new()),
        pdf_optimizer: Arc::new(LopdfOptimizer::new()),
    }
}

async fn wait_for_terminal(job: &Arc<ArchiveJob>) -> JobStatus {
    for _ in 0..500 {
        if job.status().is_terminal() {
            return job.status();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job did not reach a terminal status, stuck at {}", job.status());
}

#[tokio::test]
async fn admission_fails_with_queue_full_when_at_capacity() {
    let mut settings = test_settings();
    settings.queue_size = 2;

    // The supervisor is deliberately not spawned, so jobs stay queued
    let (scheduler, _supervisor) = Scheduler::new(&settings, deps());
    assert_eq!(scheduler.worker_status(), WorkerStatus::Idle);

    for expected_len in 1..=2 {
        let api = StubMoodleApi::new(StubConfig::with_defaults());
        let job = Arc::new(ArchiveJob::new(descriptor(api), settings.clone()));
        scheduler.try_enqueue(job).unwrap();
        assert_eq!(scheduler.queue_len(), expected_len);
    }
    assert_eq!(scheduler.worker_status(), WorkerStatus::Busy);
    assert!(scheduler.is_full());

    let api = StubMoodleApi::new(StubConfig::with_defaults());
    let job = Arc::new(ArchiveJob::new(descriptor(api), settings.clone()));
    let err = scheduler.try_enqueue(job).unwrap_err();
    assert_eq!(err, WorkerError::QueueFull { max_size: 2 });

    // The rejected job was not recorded in history
    assert_eq!(scheduler.history().len(), 2);
}

#[tokio::test]
async fn worker_status_follows_queue_depth() {
    let mut settings = test_settings();
    settings.queue_size = 2;
    let (scheduler, _supervisor) = Scheduler::new(&settings, deps());

    assert_eq!(scheduler.worker_status(), WorkerStatus::Idle);

    let api = StubMoodleApi::new(StubConfig::with_defaults());
    scheduler
        .try_enqueue(Arc::new(ArchiveJob::new(descriptor(api), settings.clone())))
        .unwrap();
    assert_eq!(scheduler.worker_status(), WorkerStatus::Active);

    let api = StubMoodleApi::new(StubConfig::with_defaults());
    scheduler
        .try_enqueue(Arc::new(ArchiveJob::new(descriptor(api), settings.clone())))
        .unwrap();
    assert_eq!(scheduler.worker_status(), WorkerStatus::Busy);
}

#[tokio::test]
async fn supervisor_times_out_jobs_and_keeps_serving() {
    let mut settings = test_settings();
    settings.request_timeout = Duration::from_millis(200);

    let (scheduler, supervisor) = Scheduler::new(&settings, deps());
    let supervisor_task = supervisor.spawn();

    // A backup download that never completes keeps the job running until the
    // supervisor's deadline fires
    let api = StubMoodleApi::new(StubConfig {
        download_hang: true,
        ..StubConfig::with_defaults()
    });
    let mut descr = descriptor(api.clone());
    descr
        .add_moodle_backup(MoodleBackupTask {
            backupid: "b1".to_string(),
            filename: "course-backup.mbz".to_string(),
            file_download_url: format!("{BASE_URL}/pluginfile.php/backup/course-backup.mbz"),
        })
        .unwrap();

    let hung_job = Arc::new(ArchiveJob::new(descr, settings.clone()));
    scheduler.try_enqueue(Arc::clone(&hung_job)).unwrap();

    assert_eq!(wait_for_terminal(&hung_job).await, JobStatus::Timeout);
    assert_eq!(api.notified_statuses().last(), Some(&JobStatus::Timeout));

    // The working directory was torn down on unwind
    let download_target = api.state.lock().unwrap().downloads[0].target_dir.clone();
    assert!(!download_target.exists());
    let workdir = download_target.parent().unwrap();
    assert!(!workdir.exists());

    // The scheduler keeps serving after a timeout
    let api = StubMoodleApi::new(StubConfig::with_defaults());
    let next_job = Arc::new(ArchiveJob::new(descriptor(api), settings.clone()));
    scheduler.try_enqueue(Arc::clone(&next_job)).unwrap();
    assert_eq!(wait_for_terminal(&next_job).await, JobStatus::Finished);

    scheduler.shutdown().await;
    supervisor_task.await.unwrap();
}

#[tokio::test]
async fn jobs_drain_in_fifo_order() {
    let settings = test_settings();
    let (scheduler, supervisor) = Scheduler::new(&settings, deps());
    let supervisor_task = supervisor.spawn();

    let mut jobs = Vec::new();
    for _ in 0..3 {
        let api = StubMoodleApi::new(StubConfig::with_defaults());
        let job = Arc::new(ArchiveJob::new(descriptor(api), settings.clone()));
        scheduler.try_enqueue(Arc::clone(&job)).unwrap();
        jobs.push(job);
        // Keep the v7 timestamps of consecutive jobs in distinct milliseconds
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    for job in &jobs {
        assert_eq!(wait_for_terminal(job).await, JobStatus::Finished);
    }

    // Time-ordered ids must drain in admission order
    let ids: Vec<_> = jobs.iter().map(|job| job.id()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    scheduler.shutdown().await;
    supervisor_task.await.unwrap();
}

#[tokio::test]
async fn shutdown_sentinel_terminates_the_supervisor() {
    let settings = test_settings();
    let (scheduler, supervisor) = Scheduler::new(&settings, deps());
    let supervisor_task = supervisor.spawn();

    scheduler.shutdown().await;
    tokio::time::timeout(Duration::from_secs(1), supervisor_task)
        .await
        .expect("supervisor terminated")
        .unwrap();
}

#[tokio::test]
async fn history_evicts_oldest_and_finds_by_string_id() {
    let settings = test_settings();
    let history = JobHistory::new(2);

    let jobs: Vec<Arc<ArchiveJob>> = (0..3)
        .map(|_| {
            let api = StubMoodleApi::new(StubConfig::with_defaults());
            Arc::new(ArchiveJob::new(descriptor(api), settings.clone()))
        })
        .collect();

    for job in &jobs {
        history.push(Arc::clone(job));
    }

    assert_eq!(history.len(), 2);
    assert!(history.get(&jobs[0].id().to_string()).is_none());
    let found = history.get(&jobs[2].id().to_string()).unwrap();
    assert_eq!(found.id(), jobs[2].id());

    assert!(history.get("not-a-uuid").is_none());
    assert!(history.get("0190b5a4-0000-7000-8000-000000000000").is_none());
}
