use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            package::{Package, PackageStatus, ProcessingStage},
            repository::{License, ReadmeCacheState, Repository},
        },
    },
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    abort, config::IngestionConfig, services::IngestionServices, state::selected,
    CandidateOutcome, CandidateSelection, IngestionPipeline,
};
use crate::{
    error::IngestionError,
    github::parse_repository_url,
    metrics::IngestionMetrics,
    types::{FetchedLicense, FetchedMetadata, FetchedReadme, FetchedRelease, RepositoryMetadata},
};

#[derive(Default)]
struct MockServices {
    failing_metadata: HashSet<String>,
    missing_repository: HashSet<String>,
    panicking: HashSet<String>,
    failing_license: HashSet<String>,
    failing_readme: HashSet<String>,
    fail_store: bool,
    readme_etag: Mutex<String>,
    calls: Mutex<Vec<String>>,
    stores: Mutex<Vec<String>>,
}

impl MockServices {
    fn new() -> Self {
        Self {
            readme_etag: Mutex::new("\"v1\"".to_string()),
            ..Self::default()
        }
    }

    fn failing_metadata_for(mut self, url: &str) -> Self {
        self.failing_metadata.insert(url.to_string());
        self
    }

    fn missing_repository_for(mut self, url: &str) -> Self {
        self.missing_repository.insert(url.to_string());
        self
    }

    fn panicking_for(mut self, url: &str) -> Self {
        self.panicking.insert(url.to_string());
        self
    }

    fn failing_license_for(mut self, url: &str) -> Self {
        self.failing_license.insert(url.to_string());
        self
    }

    fn failing_readme_for(mut self, url: &str) -> Self {
        self.failing_readme.insert(url.to_string());
        self
    }

    fn failing_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }

    async fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IngestionServices for MockServices {
    async fn fetch_metadata(&self, url: &str) -> Result<FetchedMetadata, AppError> {
        self.record(format!("metadata:{url}")).await;
        if self.panicking.contains(url) {
            panic!("mock metadata client crashed for {url}");
        }
        if self.failing_metadata.contains(url) {
            return Err(AppError::HostingApi("mock rate limit".into()));
        }
        if self.missing_repository.contains(url) {
            return Ok(FetchedMetadata { repository: None });
        }

        let (owner, name) = parse_repository_url(url)?;
        Ok(FetchedMetadata {
            repository: Some(RepositoryMetadata {
                name,
                owner,
                summary: Some(format!("summary of {url}")),
                default_branch: Some("main".into()),
                stars: 10,
                forks: 2,
                topics: vec!["Swift".into(), "swift".into(), "CLI".into()],
                releases: vec![FetchedRelease {
                    tag_name: "1.0.0".into(),
                    url: format!("{url}/releases/tag/1.0.0"),
                    ..FetchedRelease::default()
                }],
                ..RepositoryMetadata::default()
            }),
        })
    }

    async fn fetch_license(&self, url: &str) -> Result<Option<FetchedLicense>, AppError> {
        self.record(format!("license:{url}")).await;
        if self.failing_license.contains(url) {
            return Err(AppError::HostingApi("mock license endpoint down".into()));
        }
        Ok(Some(FetchedLicense {
            spdx_id: Some("MIT".into()),
            html_url: Some(format!("{url}/blob/main/LICENSE")),
        }))
    }

    async fn fetch_readme(&self, url: &str) -> Result<Option<FetchedReadme>, AppError> {
        self.record(format!("readme:{url}")).await;
        if self.failing_readme.contains(url) {
            return Err(AppError::HostingApi("mock readme endpoint down".into()));
        }
        Ok(Some(FetchedReadme {
            html: format!("<h1>{url}</h1>"),
            html_url: format!("{url}#readme"),
            etag: self.readme_etag.lock().await.clone(),
        }))
    }

    async fn store_readme(&self, owner: &str, name: &str, _html: &str) -> Result<String, AppError> {
        self.stores.lock().await.push(format!("{owner}/{name}"));
        if self.fail_store {
            return Err(AppError::InternalError("mock object store offline".into()));
        }
        Ok(format!("readme/{owner}/{name}/readme.html"))
    }
}

async fn setup_db() -> Arc<SurrealDbClient> {
    let namespace = "pipeline_test";
    let database = Uuid::new_v4().to_string();
    let db = SurrealDbClient::memory(namespace, &database)
        .await
        .expect("Failed to create in-memory SurrealDB");
    db.ensure_initialized()
        .await
        .expect("Failed to initialize schema");
    Arc::new(db)
}

fn pipeline(db: &Arc<SurrealDbClient>, services: &Arc<MockServices>) -> IngestionPipeline {
    IngestionPipeline::with_services(
        Arc::clone(db),
        IngestionConfig::default(),
        Arc::clone(services) as Arc<dyn IngestionServices>,
    )
}

async fn store_package(db: &SurrealDbClient, url: &str) -> Package {
    db.store_item(Package::new(url.to_string()))
        .await
        .expect("store package")
        .expect("package returned")
}

async fn stored_package(db: &SurrealDbClient, id: &str) -> Package {
    db.get_item::<Package>(id)
        .await
        .expect("load package")
        .expect("package exists")
}

#[tokio::test]
async fn ingesting_by_id_persists_repository_and_marks_package_ok() {
    let db = setup_db().await;
    let services = Arc::new(MockServices::new());
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, "https://github.com/apple/swift-nio").await;

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Id(package.id.clone()), &metrics)
        .await
        .expect("run succeeds");

    assert_eq!((report.candidates, report.succeeded, report.failed), (1, 1, 0));
    let repository = Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .expect("repository stored");
    assert_eq!(repository.package_id, package.id);
    assert_eq!(repository.owner.as_deref(), Some("apple"));
    assert_eq!(repository.keywords, vec!["cli".to_string(), "swift".to_string()]);
    assert_eq!(repository.license, License::Mit);
    assert_eq!(repository.releases.len(), 1);
    assert_eq!(
        repository.readme_cache,
        Some(ReadmeCacheState::Cached {
            object_location: "readme/apple/swift-nio/readme.html".into(),
            etag: "\"v1\"".into(),
        })
    );

    let package = stored_package(&db, &package.id).await;
    assert_eq!(package.status, PackageStatus::Ok);
    assert_eq!(package.processing_stage, ProcessingStage::Ingestion);

    let snapshot = metrics.snapshot();
    assert_eq!((snapshot.candidates, snapshot.succeeded, snapshot.failed), (1, 1, 0));
    assert_eq!(services.calls.lock().await.len(), 3, "three fetches per candidate");
}

#[tokio::test]
async fn metadata_failure_leaves_repository_untouched() {
    let db = setup_db().await;
    let url = "https://github.com/apple/swift-log";
    let services = Arc::new(MockServices::new().failing_metadata_for(url));
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, url).await;
    let mut existing = Repository::new(&package.id);
    existing.stars = 7;
    let existing = existing.upsert(&db).await.expect("seed repository");

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Id(package.id.clone()), &metrics)
        .await
        .expect("run completes");

    assert!(matches!(
        report.outcomes.as_slice(),
        [CandidateOutcome::Failed {
            error: IngestionError::MetadataFetch(_),
            ..
        }]
    ));
    let repository = Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .expect("repository still present");
    assert_eq!(repository, existing);
    assert!(services.stores.lock().await.is_empty());

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.succeeded, 0);
    assert_eq!(
        stored_package(&db, &package.id).await.status,
        PackageStatus::MetadataRequestFailed
    );
}

#[tokio::test]
async fn missing_repository_metadata_fails_without_persisting() {
    let db = setup_db().await;
    let url = "https://github.com/gone/away";
    let services = Arc::new(MockServices::new().missing_repository_for(url));
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, url).await;

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Id(package.id.clone()), &metrics)
        .await
        .expect("run completes");

    assert_eq!(report.failed, 1);
    assert!(matches!(
        report.outcomes.as_slice(),
        [CandidateOutcome::Failed {
            error: IngestionError::MissingRepositoryMetadata(_),
            ..
        }]
    ));
    assert!(Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .is_none());
    assert!(services.stores.lock().await.is_empty());
    assert_eq!(
        stored_package(&db, &package.id).await.status,
        PackageStatus::NotFound
    );
}

#[tokio::test]
async fn reingesting_identical_metadata_is_idempotent() {
    let db = setup_db().await;
    let services = Arc::new(MockServices::new());
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, "https://github.com/vapor/vapor").await;
    let pipeline = pipeline(&db, &services);
    let selection = CandidateSelection::Id(package.id.clone());

    pipeline.run(&selection, &metrics).await.expect("first run");
    let first = Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .expect("repository stored");

    pipeline.run(&selection, &metrics).await.expect("second run");
    let second = Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .expect("repository stored");

    assert_eq!(first, second);
    assert_eq!(
        services.stores.lock().await.len(),
        1,
        "unchanged readme is not stored again"
    );
}

#[tokio::test]
async fn changed_readme_etag_replaces_cached_copy() {
    let db = setup_db().await;
    let services = Arc::new(MockServices::new());
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, "https://github.com/pointfreeco/swift-tca").await;
    let pipeline = pipeline(&db, &services);
    let selection = CandidateSelection::Id(package.id.clone());

    pipeline.run(&selection, &metrics).await.expect("first run");
    *services.readme_etag.lock().await = "\"v2\"".to_string();
    pipeline.run(&selection, &metrics).await.expect("second run");

    assert_eq!(services.stores.lock().await.len(), 2);
    let repository = Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .expect("repository stored");
    assert_eq!(
        repository.readme_cache.as_ref().and_then(ReadmeCacheState::etag),
        Some("\"v2\"")
    );
}

#[tokio::test]
async fn readme_store_failure_does_not_fail_the_candidate() {
    let db = setup_db().await;
    let services = Arc::new(MockServices::new().failing_store());
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, "https://github.com/realm/SwiftLint").await;

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Id(package.id.clone()), &metrics)
        .await
        .expect("run succeeds");

    assert_eq!(report.succeeded, 1);
    let repository = Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .expect("repository stored");
    match repository.readme_cache {
        Some(ReadmeCacheState::Error { message }) => {
            assert!(message.contains("mock object store offline"));
        }
        other => panic!("expected readme error state, got {other:?}"),
    }
    assert_eq!(stored_package(&db, &package.id).await.status, PackageStatus::Ok);
}

#[tokio::test]
async fn license_and_readme_failures_degrade_to_absent() {
    let db = setup_db().await;
    let url = "https://github.com/swiftlang/swift-format";
    let services = Arc::new(
        MockServices::new()
            .failing_license_for(url)
            .failing_readme_for(url),
    );
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, url).await;
    let cache = ReadmeCacheState::Cached {
        object_location: "readme/swiftlang/swift-format/readme.html".into(),
        etag: "\"v0\"".into(),
    };
    let mut existing = Repository::new(&package.id);
    existing.license = License::Mit;
    existing.license_url = Some(format!("{url}/blob/main/LICENSE"));
    existing.readme_html_url = Some(format!("{url}#readme"));
    existing.readme_cache = Some(cache.clone());
    existing.upsert(&db).await.expect("seed repository");

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Id(package.id.clone()), &metrics)
        .await
        .expect("run succeeds");

    assert!(matches!(
        report.outcomes.as_slice(),
        [CandidateOutcome::Succeeded { .. }]
    ));
    let repository = Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .expect("repository stored");
    assert_eq!(repository.license, License::None);
    assert_eq!(repository.license_url, None);
    assert_eq!(repository.readme_html_url, None);
    assert_eq!(repository.readme_cache, Some(cache));
    assert_eq!(repository.stars, 10, "metadata still merged");
    assert!(services.stores.lock().await.is_empty());
    assert_eq!(stored_package(&db, &package.id).await.status, PackageStatus::Ok);
    assert_eq!(metrics.snapshot().succeeded, 1);
}

#[tokio::test]
async fn persistence_failure_marks_package_ingestion_failed() {
    let db = setup_db().await;
    db.client
        .query("DEFINE FIELD stars ON repository TYPE int ASSERT $value < 5")
        .await
        .expect("define stars constraint")
        .check()
        .expect("constraint accepted");
    let services = Arc::new(MockServices::new());
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, "https://github.com/owner/popular").await;

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Id(package.id.clone()), &metrics)
        .await
        .expect("run completes");

    assert!(matches!(
        report.outcomes.as_slice(),
        [CandidateOutcome::Failed {
            error: IngestionError::Persistence(_),
            ..
        }]
    ));
    assert!(Repository::get_for_package(&db, &package.id)
        .await
        .expect("load repository")
        .is_none());
    assert_eq!(
        stored_package(&db, &package.id).await.status,
        PackageStatus::IngestionFailed
    );
    let snapshot = metrics.snapshot();
    assert_eq!((snapshot.succeeded, snapshot.failed), (0, 1));
}

#[tokio::test]
async fn counters_reset_at_the_start_of_each_run() {
    let db = setup_db().await;
    let services = Arc::new(MockServices::new());
    let metrics = Arc::new(IngestionMetrics::new());
    let package = store_package(&db, "https://github.com/owner/twice").await;
    let pipeline = pipeline(&db, &services);
    let selection = CandidateSelection::Id(package.id.clone());

    pipeline.run(&selection, &metrics).await.expect("first run");
    pipeline.run(&selection, &metrics).await.expect("second run");

    let snapshot = metrics.snapshot();
    assert_eq!((snapshot.candidates, snapshot.succeeded, snapshot.failed), (1, 1, 0));
}

#[tokio::test]
async fn unknown_package_id_is_not_found_without_side_effects() {
    let db = setup_db().await;
    let services = Arc::new(MockServices::new());
    let metrics = Arc::new(IngestionMetrics::new());

    let result = pipeline(&db, &services)
        .run(&CandidateSelection::Id("does-not-exist".into()), &metrics)
        .await;

    assert!(matches!(result, Err(IngestionError::NotFound(id)) if id == "does-not-exist"));
    assert!(services.calls.lock().await.is_empty());
    assert!(services.stores.lock().await.is_empty());
    let repositories: Vec<Repository> = db.client.select("repository").await.expect("list");
    assert!(repositories.is_empty());
}

#[tokio::test]
async fn limit_processes_stalest_eligible_packages_only() {
    let db = setup_db().await;
    let services = Arc::new(MockServices::new());
    let metrics = Arc::new(IngestionMetrics::new());
    let base = Utc::now() - ChronoDuration::days(2);

    let mut packages = Vec::new();
    for offset in 0..5 {
        let mut package = Package::new(format!("https://github.com/owner/repo-{offset}"));
        package.updated_at = base + ChronoDuration::minutes(offset);
        packages.push(
            db.store_item(package)
                .await
                .expect("store package")
                .expect("package returned"),
        );
    }

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Limit(3), &metrics)
        .await
        .expect("run succeeds");

    let processed: Vec<&str> = report
        .outcomes
        .iter()
        .map(CandidateOutcome::package_id)
        .collect();
    let expected: Vec<&str> = packages.iter().take(3).map(|p| p.id.as_str()).collect();
    assert_eq!(processed, expected);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.candidates, 3);
    assert_eq!(snapshot.succeeded + snapshot.failed, 3);
    assert_eq!(services.calls_matching("metadata:").await.len(), 3);

    for untouched in packages.iter().skip(3) {
        let package = stored_package(&db, &untouched.id).await;
        assert_eq!(package.status, PackageStatus::New);
        assert_eq!(package.processing_stage, ProcessingStage::Reconciliation);
    }
}

#[tokio::test]
async fn one_failing_candidate_does_not_affect_the_others() {
    let db = setup_db().await;
    let failing_url = "https://github.com/owner/broken";
    let services = Arc::new(MockServices::new().failing_metadata_for(failing_url));
    let metrics = Arc::new(IngestionMetrics::new());

    let failing = store_package(&db, failing_url).await;
    let healthy = [
        store_package(&db, "https://github.com/owner/first").await,
        store_package(&db, "https://github.com/owner/second").await,
    ];

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Limit(10), &metrics)
        .await
        .expect("run succeeds");

    assert_eq!((report.candidates, report.succeeded, report.failed), (3, 2, 1));
    for package in &healthy {
        let repository = Repository::get_for_package(&db, &package.id)
            .await
            .expect("load repository")
            .expect("healthy repository stored");
        assert_eq!(repository.stars, 10);
        assert_eq!(stored_package(&db, &package.id).await.status, PackageStatus::Ok);
    }
    assert_eq!(
        stored_package(&db, &failing.id).await.status,
        PackageStatus::MetadataRequestFailed
    );
}

#[tokio::test]
async fn panicking_unit_becomes_a_failed_outcome() {
    let db = setup_db().await;
    let crashing_url = "https://github.com/owner/crashes";
    let services = Arc::new(MockServices::new().panicking_for(crashing_url));
    let metrics = Arc::new(IngestionMetrics::new());

    let crashing = store_package(&db, crashing_url).await;
    let healthy = store_package(&db, "https://github.com/owner/fine").await;

    let report = pipeline(&db, &services)
        .run(&CandidateSelection::Limit(10), &metrics)
        .await
        .expect("run completes");

    assert_eq!((report.succeeded, report.failed), (1, 1));
    let crashed = report
        .outcomes
        .iter()
        .find(|outcome| outcome.package_id() == crashing.id)
        .expect("outcome for crashing package");
    assert!(matches!(
        crashed,
        CandidateOutcome::Failed {
            error: IngestionError::TaskAborted(_),
            ..
        }
    ));
    assert_eq!(
        stored_package(&db, &crashing.id).await.status,
        PackageStatus::IngestionFailed
    );
    assert_eq!(stored_package(&db, &healthy.id).await.status, PackageStatus::Ok);
    assert_eq!(metrics.snapshot().failed, 1);
}

#[test]
fn abort_hands_back_the_failure_that_stopped_the_candidate() {
    let Ok(machine) = selected().fetch() else {
        panic!("selected candidates can start fetching");
    };

    let error = abort(
        machine.abort(),
        IngestionError::MissingRepositoryMetadata("pkg-1".into()),
    );

    assert!(matches!(error, IngestionError::MissingRepositoryMetadata(id) if id == "pkg-1"));
}
