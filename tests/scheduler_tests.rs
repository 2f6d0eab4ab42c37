
use std::sync::Arc;

use buildsched::notify::JobEvent;
use buildsched::scheduler::pending::PendingJobs;
use buildsched::scheduler::selector::select_worker;
use buildsched::scheduler::{AdmissionQueue, Job, JobStatus};
use buildsched::worker::{Worker, WorkerJob};

use test_harness::{build_fixture, NullTransport};

fn job(id: u64) -> Job {
    Job::new(id, 1, vec!["echo ok".to_string()], "")
}

fn worker(id: &str, max: i32) -> Arc<Worker> {
    Arc::new(Worker::new(id, max, Arc::new(NullTransport)))
}

#[test]
fn queue_is_fifo() {
    let mut queue = AdmissionQueue::new();
    queue.push(job(1));
    queue.push(job(2));
    queue.push(job(3));

    assert_eq!(queue.len(), 3);
    assert_eq!(queue.pop().unwrap().id, 1);
    assert_eq!(queue.pop().unwrap().id, 2);
    assert_eq!(queue.pop().unwrap().id, 3);
    assert!(queue.pop().is_none());
}

#[test]
fn queue_readmission_moves_job_to_tail() {
    let mut queue = AdmissionQueue::new();
    queue.push(job(1));
    queue.push(job(2));
    queue.push(job(1));

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop().unwrap().id, 2);
    assert_eq!(queue.pop().unwrap().id, 1);
}

#[test]
fn queue_find_and_remove() {
    let mut queue = AdmissionQueue::new();
    queue.push(job(1));
    queue.push(job(2));

    assert_eq!(queue.find(2).unwrap().id, 2);
    assert!(queue.find(9).is_none());

    assert_eq!(queue.remove(1).unwrap().id, 1);
    assert!(queue.remove(1).is_none());
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pop().unwrap().id, 2);
    assert!(queue.is_empty());
}

#[test]
fn pending_registry_tracks_dispatched_jobs() {
    let job = job(1);
    let build = build_fixture(1, vec![job.clone()]);
    let remote = WorkerJob::from_job(&job, &build, "worker-0");

    let mut pending = PendingJobs::new();
    pending.insert(job.clone(), remote.clone());
    assert!(pending.contains(1));
    assert_eq!(pending.get(1).unwrap().remote.worker_id, "worker-0");

    // re-insert overwrites rather than duplicating
    pending.insert(job, remote);
    assert_eq!(pending.len(), 1);

    assert!(pending.remove(1).is_some());
    assert!(pending.remove(1).is_none());
    assert!(pending.is_empty());
}

#[test]
fn descriptor_carries_build_and_provider_data() {
    let mut job = job(42);
    job.build_id = 7;
    let build = build_fixture(7, vec![job.clone()]);
    let remote = WorkerJob::from_job(&job, &build, "worker-0");

    assert_eq!(remote.job_id, 42);
    assert_eq!(remote.build_id, 7);
    assert_eq!(remote.repo_name, "acme/widget");
    assert_eq!(remote.provider_name, "github");
    assert_eq!(remote.commit_sha, "sha-7");
    assert_eq!(remote.worker_id, "worker-0");
}

#[test]
fn descriptor_log_is_shared_between_clones() {
    let job = job(1);
    let build = build_fixture(1, vec![job.clone()]);
    let remote = WorkerJob::from_job(&job, &build, "worker-0");

    remote.append_log("a\n");
    let clone = remote.clone();
    clone.append_log("b\n");

    assert_eq!(remote.log(), "a\nb\n");
    assert_eq!(clone.log(), "a\nb\n");
}

#[test]
fn selector_prefers_most_free_capacity() {
    let workers = vec![worker("a", 2), worker("b", 5), worker("c", 3)];
    assert_eq!(select_worker(&workers).unwrap().id(), "b");
}

#[test]
fn selector_accounts_for_running_jobs() {
    let a = worker("a", 5);
    let b = worker("b", 3);
    let _r1 = a.reserve();
    let _r2 = a.reserve();
    let _r3 = a.reserve();

    // a has 2 slots free, b has 3
    assert_eq!(select_worker(&[a.clone(), b.clone()]).unwrap().id(), "b");
}

#[test]
fn selector_ties_keep_first_match() {
    let workers = vec![worker("a", 4), worker("b", 4)];
    assert_eq!(select_worker(&workers).unwrap().id(), "a");
}

#[test]
fn selector_skips_saturated_workers() {
    let a = worker("a", 1);
    let _r = a.reserve();
    assert!(select_worker(&[a.clone()]).is_none());
}

#[test]
fn selector_skips_overcommitted_worker() {
    let a = worker("a", 1);
    let _r1 = a.reserve();
    let _r2 = a.reserve();

    assert_eq!(a.free_slots(), -1);
    assert!(select_worker(&[a.clone()]).is_none());
}

#[test]
fn selector_handles_empty_registry() {
    assert!(select_worker(&[]).is_none());
}

#[test]
fn reservation_returns_slot_on_drop() {
    let w = worker("a", 2);
    assert_eq!(w.free_slots(), 2);
    {
        let _slot = w.reserve();
        assert_eq!(w.running(), 1);
        assert_eq!(w.free_slots(), 1);
    }
    assert_eq!(w.running(), 0);
    assert_eq!(w.free_slots(), 2);
}

#[test]
fn job_status_wire_format() {
    assert_eq!(JobStatus::Queued.to_string(), "queued");
    assert_eq!(JobStatus::Passing.to_string(), "passing");
    assert_eq!(serde_json::to_string(&JobStatus::Failing).unwrap(), "\"failing\"");

    assert!(JobStatus::Passing.is_terminal());
    assert!(JobStatus::Failing.is_terminal());
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
}

#[test]
fn job_event_wire_keys() {
    let mut job = job(42);
    job.build_id = 7;
    job.status = JobStatus::Passing;
    job.end_time = Some(chrono::Utc::now());

    let value = serde_json::to_value(JobEvent::from_job(&job)).unwrap();
    assert_eq!(value["buildID"], 7);
    assert_eq!(value["jobID"], 42);
    assert_eq!(value["status"], "passing");
    assert!(value.get("startTime").is_none());
    assert!(value.get("endTime").is_some());
}
