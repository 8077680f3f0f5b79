//! Submission deduplication and idempotent catalog publish.

mod common;

use std::sync::Arc;

use common::{FakeMedia, FakeServices, TestHarness};
use tokio::sync::Notify;

use mediaforge::db::catalog_repo;
use mediaforge::model::{ContentKind, JobStatus};
use mediaforge::services::ServiceError;
use mediaforge::{MediaforgeError, SubmitOutcome, SubmitRequest, ValidationError};

const RUMBLE_URL: &str = "https://rumble.com/v4abcd-agent-setup.html";

#[tokio::test]
async fn test_duplicate_submissions_share_one_job() {
    let gate = Arc::new(Notify::new());
    let fakes = FakeServices::healthy().with_media(FakeMedia::gated(4096, Arc::clone(&gate)));
    let harness = TestHarness::with_fakes(fakes).await;

    let (a, b, c) = tokio::join!(
        harness.service.submit(SubmitRequest::video(RUMBLE_URL)),
        harness.service.submit(SubmitRequest::video(RUMBLE_URL)),
        harness.service.submit(SubmitRequest::video(RUMBLE_URL)),
    );
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

    let created: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, SubmitOutcome::Created { .. }))
        .collect();
    assert_eq!(created.len(), 1);

    let job_id = created[0].job_id().unwrap();
    for outcome in &outcomes {
        assert_eq!(outcome.job_id(), Some(job_id));
    }
    assert_eq!(harness.service.get_stats().unwrap().total, 1);

    gate.notify_one();
    let view = harness.wait_for_terminal(job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(harness.fakes.media.calls(), 1);
}

#[tokio::test]
async fn test_url_variants_resolve_to_the_published_entry() {
    let harness = TestHarness::new().await;

    let first = harness
        .service
        .submit(SubmitRequest::video("https://youtu.be/dQw4w9WgXcQ"))
        .await
        .unwrap();
    let job_id = first.job_id().unwrap().to_string();
    assert_eq!(
        harness.wait_for_terminal(&job_id).await.status,
        JobStatus::Completed
    );

    let entry = catalog_repo::find_by_source(
        &harness.db,
        ContentKind::Video,
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
    )
    .unwrap()
    .expect("published under the canonical source");

    for variant in [
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=30s",
        "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
        "  https://www.youtube.com/embed/dQw4w9WgXcQ  ",
    ] {
        let outcome = harness
            .service
            .submit(SubmitRequest::video(variant))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::ExistingEntry {
                entry_id: entry.id.clone()
            },
            "variant {}",
            variant
        );
        assert!(outcome.deduped_existing());
    }

    assert_eq!(harness.service.get_stats().unwrap().total, 1);
    assert_eq!(catalog_repo::count(&harness.db).unwrap(), 1);
}

#[tokio::test]
async fn test_article_tracking_parameters_are_ignored() {
    let harness = TestHarness::new().await;

    let first = harness
        .service
        .submit(SubmitRequest::article(
            "https://www.blog.example.com/posts/releases/?utm_source=newsletter",
        ))
        .await
        .unwrap();
    let second = harness
        .service
        .submit(SubmitRequest::article("https://blog.example.com/posts/releases"))
        .await
        .unwrap();

    let job_id = first.job_id().unwrap();
    match second {
        SubmitOutcome::ExistingJob { job_id: existing } => assert_eq!(existing, job_id),
        SubmitOutcome::ExistingEntry { .. } => {}
        SubmitOutcome::Created { .. } => panic!("second submission created a job"),
    }
}

#[tokio::test]
async fn test_video_entry_does_not_answer_article_submission() {
    let harness = TestHarness::new().await;
    let url = "https://media.example.com/talks/keynote.mp4";

    let video = harness
        .service
        .submit(SubmitRequest::video(url))
        .await
        .unwrap();
    let video_id = video.job_id().unwrap().to_string();
    assert_eq!(
        harness.wait_for_terminal(&video_id).await.status,
        JobStatus::Completed
    );
    let video_job = harness.job(&video_id);

    let article = harness
        .service
        .submit(SubmitRequest::article(url))
        .await
        .unwrap();
    let SubmitOutcome::Created { job_id: article_id } = article else {
        panic!("article submission answered by {:?}", article);
    };
    assert_eq!(
        harness.wait_for_terminal(&article_id).await.status,
        JobStatus::Completed
    );
    let article_job = harness.job(&article_id);
    assert_eq!(article_job.source_url, video_job.source_url);

    assert_eq!(catalog_repo::count(&harness.db).unwrap(), 2);
    let video_entry =
        catalog_repo::find_by_source(&harness.db, ContentKind::Video, &video_job.source_url)
            .unwrap()
            .unwrap();
    assert_eq!(video_entry.job_id, video_id);
    assert_eq!(video_entry.kind, ContentKind::Video);
    let article_entry =
        catalog_repo::find_by_source(&harness.db, ContentKind::Article, &article_job.source_url)
            .unwrap()
            .unwrap();
    assert_eq!(article_entry.job_id, article_id);
    assert_ne!(article_entry.id, video_entry.id);

    // Each kind still dedupes against its own entry.
    let again = harness
        .service
        .submit(SubmitRequest::article(url))
        .await
        .unwrap();
    assert_eq!(
        again,
        SubmitOutcome::ExistingEntry {
            entry_id: article_entry.id.clone()
        }
    );
}

#[tokio::test]
async fn test_failed_job_does_not_block_resubmission() {
    let fakes = FakeServices::healthy()
        .with_media(FakeMedia::failing_once(ServiceError::Blocked("HTTP 403".into())));
    let harness = TestHarness::with_fakes(fakes).await;

    let first = harness
        .service
        .submit(SubmitRequest::video(RUMBLE_URL))
        .await
        .unwrap();
    let first_id = first.job_id().unwrap().to_string();
    assert_eq!(
        harness.wait_for_terminal(&first_id).await.status,
        JobStatus::Failed
    );

    let second = harness
        .service
        .submit(SubmitRequest::video(RUMBLE_URL))
        .await
        .unwrap();
    let SubmitOutcome::Created { job_id: second_id } = second else {
        panic!("expected a new job, got {:?}", second);
    };
    assert_ne!(second_id, first_id);
    assert_eq!(
        harness.wait_for_terminal(&second_id).await.status,
        JobStatus::Completed
    );

    // The failed job is untouched.
    assert_eq!(harness.job(&first_id).status, JobStatus::Failed);
}

#[tokio::test]
async fn test_invalid_submissions_create_nothing() {
    let harness = TestHarness::new().await;

    let cases = [
        SubmitRequest::video(""),
        SubmitRequest::video("not a url"),
        SubmitRequest::video("ftp://files.example.com/video.mp4"),
        SubmitRequest::article("mailto:someone@example.com"),
        SubmitRequest::video(RUMBLE_URL).with_email("not-an-email"),
    ];

    for request in cases {
        let result = harness.service.submit(request.clone()).await;
        assert!(
            matches!(result, Err(MediaforgeError::Validation(_))),
            "{:?} was accepted",
            request
        );
    }

    let result = harness
        .service
        .submit(SubmitRequest::video(RUMBLE_URL).with_email("not-an-email"))
        .await;
    assert!(matches!(
        result,
        Err(MediaforgeError::Validation(ValidationError::InvalidEmail))
    ));
    assert_eq!(harness.service.get_stats().unwrap().total, 0);
}

#[tokio::test]
async fn test_submission_metadata_is_kept() {
    let harness = TestHarness::new().await;

    let outcome = harness
        .service
        .submit(
            SubmitRequest::video(RUMBLE_URL)
                .with_title("  Agent Setup Walkthrough ")
                .with_creator("Agent Lab")
                .with_email("ops@example.com"),
        )
        .await
        .unwrap();
    let job_id = outcome.job_id().unwrap().to_string();
    harness.wait_for_terminal(&job_id).await;

    let job = harness.job(&job_id);
    assert_eq!(job.submitted_url, RUMBLE_URL);
    assert_eq!(job.metadata.title.as_deref(), Some("Agent Setup Walkthrough"));
    assert_eq!(job.metadata.email.as_deref(), Some("ops@example.com"));

    let entry = catalog_repo::find_by_source(&harness.db, job.kind, &job.source_url)
        .unwrap()
        .unwrap();
    assert_eq!(entry.title, "Agent Setup Walkthrough");
    assert_eq!(entry.category, "Setup & Onboarding");
}
