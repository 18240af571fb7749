mod support;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use jobport::config::Settings;
use jobport::job_store::{self, JOBS_DIR, TRANSFORMED_DIR};
use jobport::load::JOB_MAP_FILE;
use jobport::migrate::Migrator;
use jobport::stage::{Stage, StageReport};
use jobport::transform::SequentialBlobIds;
use serde_json::{Value, json};
use support::fake_api::{FakeApi, Recorded};
use tempfile::tempdir;

fn old_job(base: &str, number: u64, metric: &str, metadata: Value) -> Value {
    json!({
        "links": {"self": format!("{base}/jobs/{number}/")},
        "ci_id": number.to_string(),
        "ci_name": "validate_drp",
        "ci_dataset": "cfht",
        "ci_label": "centos-7",
        "ci_url": format!("https://ci.example/job/{number}"),
        "date": "2017-06-01T12:00:00Z",
        "status": 0,
        "measurements": [{"metric": metric, "value": 1.5, "metadata": metadata}],
        "blobs": [{"identifier": format!("raw-{number}"), "name": "raw", "data": [1, 2]}],
        "packages": [{
            "name": "afw",
            "git_url": "https://git.example/afw.git",
            "git_commit": "abc123",
            "build_version": "b1234",
            "git_branch": "main"
        }]
    })
}

fn source_api() -> FakeApi {
    FakeApi::start(|base, request: &Recorded| {
        let body = match request.path.as_str() {
            "/metrics/" => json!({
                "count": 2,
                "next": format!("{base}/metrics/?page=2"),
                "results": [{"metric": "PA1", "unit": "mmag"}]
            }),
            "/metrics/?page=2" => json!({
                "count": 2,
                "next": null,
                "results": [{"metric": "PA2", "unit": "mmag"}]
            }),
            "/jobs" => json!({
                "count": 3,
                "next": format!("{base}/jobs?page=2"),
                "results": [
                    old_job(base, 41, "PA1", json!("{\"extras\": {\"seed\": 7}}")),
                    old_job(base, 42, "PA2", json!(
                        "{'spec_name': 'design', 'filter_name': 'r', 'blobs': {'matched': 'm-42'}}"
                    )),
                ]
            }),
            "/jobs?page=2" => json!({
                "count": 3,
                "next": null,
                "results": [old_job(
                    base,
                    43,
                    "XYZ",
                    json!({"spec_name": "design", "filter_name": "r"})
                )]
            }),
            "/jobs/42/" => old_job(
                base,
                42,
                "PA2",
                json!({"spec_name": "stretch", "filter_name": "z"}),
            ),
            _ => return (404, json!({"detail": "Not found."}).to_string()),
        };
        (200, body.to_string())
    })
}

fn dest_api() -> FakeApi {
    let next_id = AtomicU64::new(101);
    FakeApi::start(move |_, request: &Recorded| {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/user/alice") => (404, json!({"message": "User not found"}).to_string()),
            ("POST", "/register") => (201, json!({"message": "User created"}).to_string()),
            ("POST", "/auth") => (200, json!({"access_token": "tok-alice"}).to_string()),
            ("POST", "/job") => {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                let message = format!("Job `{id}` successfully created");
                (201, json!({"message": message}).to_string())
            }
            _ => (404, json!({"message": "Not found"}).to_string()),
        }
    })
}

fn settings(data_dir: &Path, source: &FakeApi, dest: &FakeApi) -> Settings {
    Settings::new(data_dir, source.base_url(), dest.base_url())
}

fn report(summary: &jobport::migrate::MigrationSummary, stage: Stage) -> StageReport {
    *summary.report_for(stage).expect("stage ran")
}

#[test]
fn full_pipeline_migrates_jobs_and_resumes_without_duplicates() {
    let data = tempdir().unwrap();
    let source = source_api();
    let dest = dest_api();
    let mut settings = settings(data.path(), &source, &dest);
    settings.token = Some("secret".to_string());

    let summary =
        Migrator::new(settings.clone()).run_with_ids(&mut SequentialBlobIds::new("blob-"));

    assert_eq!(report(&summary, Stage::Extract).succeeded, 3);
    let transform = report(&summary, Stage::Transform);
    assert_eq!((transform.succeeded, transform.failed), (2, 1));
    assert_eq!(report(&summary, Stage::Load).succeeded, 2);
    assert!(summary.has_failures());

    let jobs_dir = data.path().join(JOBS_DIR);
    let transformed_dir = data.path().join(TRANSFORMED_DIR);
    assert_eq!(job_store::list_jobs(&jobs_dir).unwrap(), vec![41, 42, 43]);
    assert_eq!(job_store::list_jobs(&transformed_dir).unwrap(), vec![41, 42]);

    let first = job_store::read_job(41, &transformed_dir).unwrap();
    assert_eq!(first["_job_number"], 41);
    assert_eq!(first["measurements"][0]["metric"], "validate_drp.PA1");
    assert_eq!(first["measurements"][0]["unit"], "mmag");
    assert_eq!(first["measurements"][0]["blob_refs"], json!(["blob-000001"]));
    assert_eq!(first["blobs"][1]["data"], json!({"seed": 7}));
    assert_eq!(first["meta"]["env"]["env_name"], "jenkins");
    assert_eq!(first["meta"]["packages"]["afw"]["git_sha"], "abc123");

    let second = job_store::read_job(42, &transformed_dir).unwrap();
    assert_eq!(second["measurements"][0]["metric"], "validate_drp.PA2_design_gri");
    assert_eq!(second["measurements"][0]["blob_refs"], json!(["m-42"]));

    let job_map: Value =
        serde_json::from_str(&std::fs::read_to_string(data.path().join(JOB_MAP_FILE)).unwrap())
            .unwrap();
    assert_eq!(job_map, json!({"41": 101, "42": 102}));

    let posts: Vec<Recorded> = dest
        .requests()
        .into_iter()
        .filter(|request| request.method == "POST" && request.path == "/job")
        .collect();
    assert_eq!(posts.len(), 2);
    for post in &posts {
        assert_eq!(post.header("Authorization"), Some("JWT secret"));
        assert!(post.json().get("_job_number").is_none());
    }
    assert!(data.path().join("metrics.json").is_file());

    let metric_fetches = source.count("GET", "/metrics/");
    let rerun = Migrator::new(settings).run_with_ids(&mut SequentialBlobIds::new("blob-"));
    assert_eq!(report(&rerun, Stage::Extract).skipped, 3);
    assert_eq!(report(&rerun, Stage::Transform).skipped, 2);
    assert_eq!(report(&rerun, Stage::Load).skipped, 2);
    assert_eq!(dest.count("POST", "/job"), 2);
    assert_eq!(source.count("GET", "/metrics/"), metric_fetches);
}

#[test]
fn load_is_skipped_without_credentials() {
    let data = tempdir().unwrap();
    let source = source_api();
    let dest = dest_api();
    let summary = Migrator::new(settings(data.path(), &source, &dest))
        .run_with_ids(&mut SequentialBlobIds::default());

    assert_eq!(report(&summary, Stage::Load), StageReport::default());
    assert_eq!(report(&summary, Stage::Transform).succeeded, 2);
    assert!(dest.requests().is_empty());
    assert!(!data.path().join(JOB_MAP_FILE).exists());
}

#[test]
fn username_and_password_register_then_authenticate() {
    let data = tempdir().unwrap();
    let source = source_api();
    let dest = dest_api();
    let transformed = json!({"measurements": [], "blobs": [], "meta": {}, "_job_number": 7});
    job_store::write_job(7, &transformed, &data.path().join(TRANSFORMED_DIR)).unwrap();

    let mut settings = settings(data.path(), &source, &dest);
    settings.username = Some("alice".to_string());
    settings.password = Some("pw".to_string());
    settings.stages = vec![Stage::Load];
    let summary = Migrator::new(settings).run();

    assert_eq!(report(&summary, Stage::Load).succeeded, 1);
    let requests = dest.requests();
    let paths: Vec<&str> = requests.iter().map(|request| request.path.as_str()).collect();
    assert_eq!(paths, ["/user/alice", "/register", "/auth", "/job"]);
    assert_eq!(requests[2].json(), json!({"username": "alice", "password": "pw"}));
    assert_eq!(requests[3].header("Authorization"), Some("JWT tok-alice"));
    assert!(source.requests().is_empty());
}

#[test]
fn selected_jobs_are_fetched_individually() {
    let data = tempdir().unwrap();
    let source = source_api();
    let dest = dest_api();
    let mut settings = settings(data.path(), &source, &dest);
    settings.jobs = "42,44".parse().unwrap();
    settings.stages = vec![Stage::Extract];
    let summary = Migrator::new(settings).run();

    let extract = report(&summary, Stage::Extract);
    assert_eq!((extract.succeeded, extract.failed), (1, 1));
    assert_eq!(source.count("GET", "/jobs/42/"), 1);
    assert_eq!(source.count("GET", "/jobs"), 0);
    let stored = job_store::read_job(42, &data.path().join(JOBS_DIR)).unwrap();
    assert_eq!(stored["measurements"][0]["metadata"]["spec_name"], "stretch");
}

#[test]
fn mismatched_job_number_is_stripped_and_mapped_by_file_number() {
    let data = tempdir().unwrap();
    let source = source_api();
    let dest = dest_api();
    let transformed = json!({"measurements": [], "blobs": [], "meta": {}, "_job_number": 8});
    job_store::write_job(7, &transformed, &data.path().join(TRANSFORMED_DIR)).unwrap();

    let mut settings = settings(data.path(), &source, &dest);
    settings.token = Some("secret".to_string());
    settings.stages = vec![Stage::Load];
    let summary = Migrator::new(settings).run();

    assert_eq!(report(&summary, Stage::Load).succeeded, 1);
    let posts = dest.requests();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].path, "/job");
    assert!(posts[0].json().get("_job_number").is_none());
    let job_map: Value =
        serde_json::from_str(&std::fs::read_to_string(data.path().join(JOB_MAP_FILE)).unwrap())
            .unwrap();
    assert_eq!(job_map, json!({"7": 101}));
}
