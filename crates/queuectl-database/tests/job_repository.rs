//! Integration tests for the job store primitives.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinSet;

use common::{TestDb, at, never_stale, new_job, t0};
use queuectl_core::error::ErrorKind;
use queuectl_database::{JobRepository, Transition};
use queuectl_entity::job::JobState;

#[tokio::test]
async fn test_insert_starts_pending_with_zero_attempts() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());

    let job = repo.insert(&new_job("a", "echo hi", 3, t0())).await.unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.created_at, t0());
    assert_eq!(job.updated_at, t0());
    assert_eq!(job.queued_at, t0());
    assert!(job.error.is_none());

    assert_eq!(repo.get("a").await.unwrap(), job);
}

#[tokio::test]
async fn test_insert_duplicate_id_fails() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());

    repo.insert(&new_job("dup", "true", 3, t0())).await.unwrap();
    let err = repo
        .insert(&new_job("dup", "false", 1, at(1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateId);

    let stored = repo.get("dup").await.unwrap();
    assert_eq!(stored.command, "true");
}

#[tokio::test]
async fn test_get_unknown_is_not_found() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());

    assert!(repo.find_by_id("nope").await.unwrap().is_none());
    assert_eq!(repo.get("nope").await.unwrap_err().kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_claim_is_fifo_by_creation_time() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());

    repo.insert(&new_job("second", "true", 3, at(2))).await.unwrap();
    repo.insert(&new_job("first", "true", 3, at(1))).await.unwrap();
    repo.insert(&new_job("third", "true", 3, at(3))).await.unwrap();

    let mut order = Vec::new();
    while let Some(job) = repo.claim_next("w1", at(10), never_stale()).await.unwrap() {
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.worker_id.as_deref(), Some("w1"));
        assert_eq!(job.updated_at, at(10));
        order.push(job.id);
    }
    assert_eq!(order, ["first", "second", "third"]);
}

#[tokio::test]
async fn test_claim_on_empty_queue_returns_none() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());

    assert!(repo.claim_next("w1", t0(), never_stale()).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_claims_of_single_job_are_exclusive() {
    const CLAIMERS: usize = 16;

    let db = TestDb::new().await;
    let repo = Arc::new(JobRepository::new(db.pool()));
    repo.insert(&new_job("only", "true", 3, t0())).await.unwrap();

    let claimers = (0..CLAIMERS).map(|n| {
        let repo = Arc::clone(&repo);
        tokio::spawn(async move {
            repo.claim_next(&format!("w{n}"), at(1), never_stale())
                .await
                .expect("claim should not error")
        })
    });

    let winners: Vec<_> = join_all(claimers)
        .await
        .into_iter()
        .filter_map(|result| result.unwrap())
        .collect();

    assert_eq!(winners.len(), 1, "exactly one claimer must win");
    assert_eq!(winners[0].id, "only");

    let stored = repo.get("only").await.unwrap();
    assert_eq!(stored.state, JobState::Processing);
    assert_eq!(stored.worker_id, winners[0].worker_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_drain_claims_every_job_once() {
    const JOBS: usize = 60;
    const CLAIMERS: usize = 8;

    let db = TestDb::new().await;
    let repo = Arc::new(JobRepository::new(db.pool()));
    for i in 0..JOBS {
        repo.insert(&new_job(&format!("job-{i}"), "true", 3, at(i as i64)))
            .await
            .unwrap();
    }

    let mut claimers = JoinSet::new();
    for n in 0..CLAIMERS {
        let repo = Arc::clone(&repo);
        claimers.spawn(async move {
            let worker = format!("w{n}");
            let mut mine = Vec::new();
            while let Some(job) = repo.claim_next(&worker, at(1000), never_stale()).await.unwrap() {
                repo.transition(
                    &job.id,
                    &Transition::new(&[JobState::Processing], JobState::Completed).owned_by(&worker),
                    at(1001),
                )
                .await
                .unwrap();
                mine.push(job.id);
            }
            mine
        });
    }

    let mut seen = HashSet::new();
    while let Some(result) = claimers.join_next().await {
        for id in result.unwrap() {
            assert!(seen.insert(id.clone()), "job {id} claimed twice");
        }
    }
    assert_eq!(seen.len(), JOBS);

    let stats = repo.statistics().await.unwrap();
    assert_eq!(stats.completed, JOBS as u64);
    assert_eq!(stats.total(), JOBS as u64);
}

#[tokio::test]
async fn test_transition_from_wrong_state_is_stale() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("j", "true", 3, t0())).await.unwrap();

    let err = repo
        .transition(
            "j",
            &Transition::new(&[JobState::Processing], JobState::Completed),
            at(1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::StaleTransition);
    assert_eq!(repo.get("j").await.unwrap().state, JobState::Pending);

    let err = repo
        .transition(
            "missing",
            &Transition::new(&[JobState::Processing], JobState::Completed),
            at(1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_transition_sets_fields_and_clears_owner() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("j", "false", 3, t0())).await.unwrap();
    repo.claim_next("w1", at(1), never_stale()).await.unwrap();

    let job = repo
        .transition(
            "j",
            &Transition::new(&[JobState::Processing], JobState::Failed)
                .with_attempts(1)
                .with_error("exit status 1")
                .with_retry_at(at(3))
                .owned_by("w1"),
            at(1),
        )
        .await
        .unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.error.as_deref(), Some("exit status 1"));
    assert_eq!(job.retry_at, Some(at(3)));
    assert!(job.worker_id.is_none());
    assert_eq!(job.created_at, t0());
}

#[tokio::test]
async fn test_transition_rejects_other_owner() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("j", "true", 3, t0())).await.unwrap();
    repo.claim_next("w1", at(1), never_stale()).await.unwrap();

    let err = repo
        .transition(
            "j",
            &Transition::new(&[JobState::Processing], JobState::Completed).owned_by("w2"),
            at(2),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::StaleTransition);
    assert_eq!(repo.get("j").await.unwrap().state, JobState::Processing);
}

#[tokio::test]
async fn test_failed_job_not_claimable_until_retry_at() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("j", "false", 3, t0())).await.unwrap();
    repo.claim_next("w1", at(1), never_stale()).await.unwrap();
    repo.transition(
        "j",
        &Transition::new(&[JobState::Processing], JobState::Failed)
            .with_attempts(1)
            .with_retry_at(at(3)),
        at(1),
    )
    .await
    .unwrap();

    assert!(repo.claim_next("w1", at(2), never_stale()).await.unwrap().is_none());
    assert_eq!(repo.get("j").await.unwrap().state, JobState::Failed);

    let job = repo
        .claim_next("w2", at(3), never_stale())
        .await
        .unwrap()
        .expect("due retry is claimable");
    assert_eq!(job.id, "j");
    assert_eq!(job.attempts, 1);
    assert!(job.retry_at.is_none());
}

#[tokio::test]
async fn test_reclaim_sweep_recovers_stranded_job() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("j", "sleep 100", 3, t0())).await.unwrap();
    repo.claim_next("crashed", at(1), never_stale()).await.unwrap();

    // Heartbeat at 1s is not older than the 0s cutoff: nothing to reclaim.
    assert!(repo.claim_next("w2", at(5), at(0)).await.unwrap().is_none());

    let job = repo
        .claim_next("w2", at(400), at(100))
        .await
        .unwrap()
        .expect("stale job is reclaimed");
    assert_eq!(job.id, "j");
    assert_eq!(job.worker_id.as_deref(), Some("w2"));
    assert_eq!(job.attempts, 0);

    // The crashed worker can no longer finish the job it lost.
    let err = repo
        .transition(
            "j",
            &Transition::new(&[JobState::Processing], JobState::Completed).owned_by("crashed"),
            at(401),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::StaleTransition);
}

#[tokio::test]
async fn test_heartbeat_keeps_job_from_being_swept() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("j", "sleep 100", 3, t0())).await.unwrap();
    repo.claim_next("w1", at(1), never_stale()).await.unwrap();

    assert!(repo.heartbeat("j", "w1", at(200)).await.unwrap());
    assert!(!repo.heartbeat("j", "w2", at(200)).await.unwrap());

    assert_eq!(repo.reclaim_stale(at(250), at(150)).await.unwrap(), 0);
    assert_eq!(repo.get("j").await.unwrap().state, JobState::Processing);
}

#[tokio::test]
async fn test_reset_to_pending_requeues_dead_job_at_back() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("old", "false", 0, t0())).await.unwrap();
    repo.claim_next("w1", at(1), never_stale()).await.unwrap();
    repo.transition(
        "old",
        &Transition::new(&[JobState::Processing], JobState::Dead)
            .with_attempts(1)
            .with_error("boom"),
        at(2),
    )
    .await
    .unwrap();
    repo.insert(&new_job("newer", "true", 3, at(5))).await.unwrap();

    let job = repo
        .reset_to_pending("old", &[JobState::Dead], at(10))
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.error.is_none());
    assert_eq!(job.created_at, t0());
    assert_eq!(job.queued_at, at(10));

    let first = repo.claim_next("w1", at(11), never_stale()).await.unwrap().unwrap();
    assert_eq!(first.id, "newer");
    let second = repo.claim_next("w1", at(11), never_stale()).await.unwrap().unwrap();
    assert_eq!(second.id, "old");
}

#[tokio::test]
async fn test_reset_to_pending_errors() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    repo.insert(&new_job("live", "true", 3, t0())).await.unwrap();

    let err = repo
        .reset_to_pending("ghost", &[JobState::Dead], at(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = repo
        .reset_to_pending("live", &[JobState::Dead], at(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::StaleTransition);
}

#[tokio::test]
async fn test_list_filters_and_statistics_sum_to_total() {
    let db = TestDb::new().await;
    let repo = JobRepository::new(db.pool());
    for (i, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
        repo.insert(&new_job(id, "true", 0, at(i as i64))).await.unwrap();
    }

    repo.claim_next("w1", at(10), never_stale()).await.unwrap();
    repo.claim_next("w1", at(10), never_stale()).await.unwrap();
    repo.transition(
        "a",
        &Transition::new(&[JobState::Processing], JobState::Completed),
        at(11),
    )
    .await
    .unwrap();
    repo.transition(
        "b",
        &Transition::new(&[JobState::Processing], JobState::Dead)
            .with_attempts(1)
            .with_error("nope"),
        at(11),
    )
    .await
    .unwrap();

    let stats = repo.statistics().await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.dead, 1);
    assert_eq!(stats.total(), 4);

    let pending: Vec<_> = repo
        .list(Some(JobState::Pending))
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(pending, ["c", "d"]);
    assert_eq!(repo.list(None).await.unwrap().len(), 4);

    let dlq = repo.list_dlq().await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].id, "b");
    assert_eq!(dlq[0].error.as_deref(), Some("nope"));
}
