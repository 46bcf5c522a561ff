//! 任务领取、依赖记录缺失、兜底失败和超时回收

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use pretty_assertions::assert_eq;

use auto_apply::codes;
use auto_apply::models::{JobTargetStatus, Task, TaskStatus};
use auto_apply::store::{EventLevel, MemoryStore};

use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_hand_out_a_task_once() {
    let h = Arc::new(harness(vec![], test_config()));
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let claims = (0..8).map(|_| {
        let h = h.clone();
        tokio::spawn(async move { h.runner.claim_next().await })
    });
    let claimed: Vec<Task> = join_all(claims)
        .await
        .into_iter()
        .map(|joined| joined.expect("join").expect("claim"))
        .flatten()
        .collect();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, TaskStatus::Running);
    assert_eq!(claimed[0].attempt, 1);
    assert!(claimed[0].started_at.is_some());
    assert_eq!(h.store.count_by_status(TaskStatus::Running), 1);
}

#[tokio::test]
async fn claim_returns_none_on_empty_queue() {
    let h = harness(vec![], test_config());
    assert!(h.runner.claim_next().await.expect("claim").is_none());
}

#[tokio::test]
async fn missing_job_target_fails_without_touching_browser() {
    let h = harness(vec![Arc::new(greenhouse_page())], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);
    h.store
        .insert_task(Task::queued("task-2", USER_ID, "job-missing", RESUME_ID))
        .expect("insert");
    // task-1 先出队，先把它处理掉
    h.run_next().await;

    let task = h.run_next().await;

    assert_eq!(task.id, "task-2");
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::JOB_NOT_FOUND));
    assert!(task.finished_at.is_some());
    assert_eq!(h.browser.opened(), 1);
}

#[tokio::test]
async fn missing_resume_and_profile_are_fatal() {
    let h = harness(vec![], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);
    h.store
        .insert_task(Task::queued("task-1", USER_ID, "job-1", "resume-missing"))
        .expect("replace task");

    let task = h.run_next().await;
    assert_eq!(task.error_code.as_deref(), Some(codes::RESUME_NOT_FOUND));
    assert_eq!(h.job_status("job-1"), JobTargetStatus::Failed);

    h.store
        .insert_task(Task::queued("task-2", "user-without-profile", "job-1", RESUME_ID))
        .expect("insert");
    let task = h.run_next().await;
    assert_eq!(task.error_code.as_deref(), Some(codes::PROFILE_NOT_FOUND));
    assert_eq!(h.browser.opened(), 0);
}

#[tokio::test]
async fn storage_error_during_run_forces_unexpected_error() {
    let store = Arc::new(MemoryStore::new());
    seed_task(&store, "task-1", "job-1", GREENHOUSE_URL);
    let faulty = Arc::new(FaultyStore::new(store.clone(), Fault::ResumeLookupFails));
    let h = harness_with_store(store, faulty, vec![], test_config());

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::UNEXPECTED_ERROR));
    assert!(task.error_message.unwrap_or_default().contains("connection refused"));
    assert_eq!(h.job_status("job-1"), JobTargetStatus::Failed);

    let last = h.store.events_for("task-1").pop().expect("event");
    assert_eq!(last.level, EventLevel::Error);
    assert_eq!(last.message, "failed");
}

#[tokio::test]
async fn panic_during_run_never_leaves_task_running() {
    let store = Arc::new(MemoryStore::new());
    seed_task(&store, "task-1", "job-1", GREENHOUSE_URL);
    let faulty = Arc::new(FaultyStore::new(store.clone(), Fault::ProfileLookupPanics));
    let h = harness_with_store(store, faulty, vec![], test_config());

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::UNEXPECTED_ERROR));
    assert!(task
        .error_message
        .unwrap_or_default()
        .contains("profile row could not be decoded"));
    assert_eq!(h.store.count_by_status(TaskStatus::Running), 0);
}

#[tokio::test]
async fn stale_running_tasks_are_reaped() {
    let h = harness(vec![], test_config());
    let mut stale = seed_task(&h.store, "task-old", "job-1", GREENHOUSE_URL);
    stale.status = TaskStatus::Running;
    stale.started_at = Some(Utc::now() - chrono::Duration::hours(2));
    h.store.insert_task(stale).expect("insert stale");

    let mut fresh = Task::queued("task-fresh", USER_ID, "job-1", RESUME_ID);
    fresh.status = TaskStatus::Running;
    fresh.started_at = Some(Utc::now());
    h.store.insert_task(fresh).expect("insert fresh");

    let reaped = h
        .runner
        .reap_stale_tasks(Duration::from_secs(30 * 60))
        .await
        .expect("reap");

    assert_eq!(reaped, 1);
    let old = h.store.task("task-old").expect("stored");
    assert_eq!(old.status, TaskStatus::Failed);
    assert_eq!(old.error_code.as_deref(), Some(codes::STALE_TASK));
    assert_eq!(h.store.task("task-fresh").expect("stored").status, TaskStatus::Running);
}
