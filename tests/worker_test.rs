//! 工作进程主循环

mod common;

use std::sync::Arc;
use std::time::Duration;

use auto_apply::models::TaskStatus;
use auto_apply::Worker;

use common::*;

#[tokio::test]
async fn worker_drains_queue_and_stops_on_cancel() {
    let pages = vec![Arc::new(greenhouse_page())];
    let h = harness(pages, test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);
    h.store
        .insert_task(auto_apply::Task::queued("task-2", USER_ID, "job-1", "resume-missing"))
        .expect("insert");

    let store = h.store.clone();
    let browser = h.browser.clone();
    let worker = Worker::new(h.runner, browser.clone(), test_config());
    let shutdown = worker.shutdown_token();
    let handle = tokio::spawn(worker.run());

    // 等两个任务都落为终态
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while store.count_by_status(TaskStatus::Queued) + store.count_by_status(TaskStatus::Running) > 0 {
        assert!(tokio::time::Instant::now() < deadline, "worker did not drain the queue");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.cancel();

    let stats = handle.await.expect("worker task");
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total(), 2);
    assert!(browser.was_shut_down());
}

#[tokio::test]
async fn tick_reports_idle_queue() {
    let h = harness(vec![], test_config());
    let mut worker = Worker::new(h.runner, h.browser.clone(), test_config());
    assert!(!worker.tick().await);
    assert_eq!(worker.stats().total(), 0);
}

#[tokio::test]
async fn blocked_results_are_counted_separately() {
    let page = Arc::new(greenhouse_page().with_body_text("Request blocked. Access denied."));
    let h = harness(vec![page], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);
    let mut worker = Worker::new(h.runner, h.browser.clone(), test_config());

    assert!(worker.tick().await);

    assert_eq!(worker.stats().blocked, 1);
    let task = h.store.task("task-1").expect("stored");
    assert_eq!(task.error_code.as_deref(), Some(auto_apply::codes::ACCESS_DENIED));
}
