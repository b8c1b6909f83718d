#![cfg(feature = "test-utils")]

use std::fs::File;
use std::io::Read;
use std::path::Path;

use backup::codec::TableKind;
use backup::error::ErrorKind;
use backup::pipeline::BackupPipeline;
use backup::test_utils::config::{test_backup_config, test_source_config};
use backup::test_utils::source::{MemoryConnector, MemorySource, sale, user};
use backup::writer::ArtifactOutcome;
use backup_telemetry::tracing::init_test_tracing;
use flate2::read::GzDecoder;

/// Returns the name and contents of the single entry of a `.tar.gz` archive.
fn read_archive(path: &Path) -> (String, String) {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    let mut entries = archive.entries().unwrap();

    let mut entry = entries.next().unwrap().unwrap();
    let name = entry.path().unwrap().to_string_lossy().into_owned();
    let mut contents = String::new();
    entry.read_to_string(&mut contents).unwrap();
    drop(entry);
    assert!(entries.next().is_none());

    (name, contents)
}

#[tokio::test(flavor = "multi_thread")]
async fn backs_up_and_archives_every_table_of_a_source() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let source = MemorySource::new("s1");
    source
        .insert_rows(
            TableKind::Users,
            vec![user(1, "a"), user(2, "b"), user(3, "c"), user(4, "d")],
        )
        .await;
    source
        .insert_rows(TableKind::Sales, vec![sale(1, 2, 10.5)])
        .await;
    let connector = MemoryConnector::new().with_source(source.clone());
    let config = test_backup_config(
        dir.path(),
        vec![test_source_config("s1", &["users", "sales"], 2)],
    );

    let report = BackupPipeline::new(config, connector).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.extracted.len(), 2);
    assert_eq!(report.total_rows(), 5);
    assert_eq!(report.finalize.archived(), 2);

    let users = dir.path().join("s1/users.csv");
    let sales = dir.path().join("s1/sales.csv");
    assert!(!users.exists());
    assert!(!sales.exists());

    assert_eq!(
        read_archive(&dir.path().join("s1/users.csv.tar.gz")),
        ("users.csv".to_string(), "1,a\n2,b\n3,c\n4,d\n".to_string())
    );
    assert_eq!(
        read_archive(&dir.path().join("s1/sales.csv.tar.gz")),
        ("sales.csv".to_string(), "1,2,10.50\n".to_string())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_streams_keep_their_page_order() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let mut connector = MemoryConnector::new();
    let mut sources = Vec::new();
    for name in ["thailand", "indonesia", "laos"] {
        let source = MemorySource::new(name);
        source
            .insert_rows(
                TableKind::Users,
                (0..50).map(|id| user(id, &format!("{name}{id}"))).collect(),
            )
            .await;
        source
            .insert_rows(
                TableKind::Sales,
                (0..30).map(|id| sale(id, id % 7, id as f64 * 1.25)).collect(),
            )
            .await;
        connector = connector.with_source(source);
        sources.push(test_source_config(name, &["users", "sales"], 3));
    }

    let report = BackupPipeline::new(test_backup_config(dir.path(), sources), connector)
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.finalize.archived(), 6);

    for name in ["thailand", "indonesia", "laos"] {
        let (_, users) = read_archive(&dir.path().join(format!("{name}/users.csv.tar.gz")));
        let expected: String = (0..50).map(|id| format!("{id},{name}{id}\n")).collect();
        assert_eq!(users, expected);

        let (_, sales) = read_archive(&dir.path().join(format!("{name}/sales.csv.tar.gz")));
        let expected: String = (0..30)
            .map(|id| format!("{id},{},{:.2}\n", id % 7, id as f64 * 1.25))
            .collect();
        assert_eq!(sales, expected);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_source_is_skipped() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let source = MemorySource::new("s1");
    source.insert_rows(TableKind::Users, vec![user(1, "a")]).await;
    let connector = MemoryConnector::new().with_source(source);
    let config = test_backup_config(
        dir.path(),
        vec![
            test_source_config("s1", &["users"], 10),
            test_source_config("s2", &["users"], 10),
        ],
    );

    let report = BackupPipeline::new(config, connector).run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed_sources.len(), 1);
    assert_eq!(report.failed_sources[0].name, "s2");
    assert_eq!(
        report.failed_sources[0].error.kind(),
        ErrorKind::SourceConnectionFailed
    );
    assert!(dir.path().join("s1/users.csv.tar.gz").is_file());
    assert!(!dir.path().join("s2").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn permanently_failing_workers_do_not_block_the_run() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let healthy = MemorySource::new("s1");
    healthy
        .insert_rows(TableKind::Sales, vec![sale(1, 1, 3.0)])
        .await;
    let broken = MemorySource::new("s2");
    broken.fail_health_checks_forever().await;
    let connector = MemoryConnector::new()
        .with_source(healthy)
        .with_source(broken);
    let config = test_backup_config(
        dir.path(),
        vec![
            test_source_config("s1", &["sales", "orders"], 10),
            test_source_config("s2", &["users", "sales"], 10),
        ],
    );

    let report = BackupPipeline::new(config, connector).run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.extracted.len(), 1);
    assert_eq!(report.worker_errors.len(), 3);
    let mut kinds: Vec<_> = report.worker_errors.iter().map(|err| err.kind()).collect();
    kinds.sort_by_key(|kind| format!("{kind:?}"));
    assert_eq!(
        kinds,
        vec![
            ErrorKind::RetriesExhausted,
            ErrorKind::RetriesExhausted,
            ErrorKind::UnknownTable
        ]
    );
    assert_eq!(report.finalize.archived(), 1);
    assert!(dir.path().join("s1/sales.csv.tar.gz").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_tables_produce_no_artifacts() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new().with_source(MemorySource::new("s1"));
    let config = test_backup_config(
        dir.path(),
        vec![test_source_config("s1", &["users", "sales"], 10)],
    );

    let report = BackupPipeline::new(config, connector).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.extracted.len(), 2);
    assert!(report.finalize.artifacts.is_empty());
    assert!(!dir.path().join("s1").exists());
}

#[tokio::test]
async fn no_sources_is_an_empty_successful_run() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let config = test_backup_config(dir.path(), vec![]);

    let report = BackupPipeline::new(config, MemoryConnector::new())
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(report.extracted.is_empty());
}

#[tokio::test]
async fn invalid_configuration_fails_the_run() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_backup_config(
        dir.path(),
        vec![test_source_config("s1", &["users"], 10)],
    );
    config.sources[0].select_limit = 0;

    let err = BackupPipeline::new(config, MemoryConnector::new())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_archives_are_reported_and_originals_kept() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let source = MemorySource::new("s1");
    source.insert_rows(TableKind::Users, vec![user(1, "a")]).await;
    source
        .insert_rows(TableKind::Sales, vec![sale(1, 1, 1.0)])
        .await;
    // A directory squatting on the archive path makes archiving `users` fail.
    std::fs::create_dir_all(dir.path().join("s1/users.csv.tar.gz")).unwrap();
    let connector = MemoryConnector::new().with_source(source);
    let config = test_backup_config(
        dir.path(),
        vec![test_source_config("s1", &["users", "sales"], 10)],
    );

    let report = BackupPipeline::new(config, connector).run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.finalize.archived(), 1);
    assert_eq!(report.finalize.failed(), 1);
    let failed = report
        .finalize
        .artifacts
        .iter()
        .find(|artifact| matches!(artifact.outcome, ArtifactOutcome::Failed { .. }))
        .unwrap();
    assert_eq!(failed.key.table, "users");
    assert_eq!(std::fs::read_to_string(&failed.path).unwrap(), "1,a\n");
}

#[tokio::test]
async fn duplicate_tables_fail_the_run_before_writing() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let source = MemorySource::new("s1");
    source
        .insert_rows(TableKind::Users, vec![user(1, "a"), user(2, "b")])
        .await;
    let connector = MemoryConnector::new().with_source(source);
    let config = test_backup_config(
        dir.path(),
        vec![test_source_config("s1", &["users", "users"], 2)],
    );

    let err = BackupPipeline::new(config, connector).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(!dir.path().join("s1").exists());
}

#[tokio::test]
async fn source_names_cannot_leave_the_archive_root() {
    init_test_tracing();

    let root = tempfile::tempdir().unwrap();
    let archive_root = root.path().join("archive");
    let source = MemorySource::new("../escaped");
    source.insert_rows(TableKind::Users, vec![user(1, "a")]).await;
    let connector = MemoryConnector::new().with_source(source);
    let config = test_backup_config(
        &archive_root,
        vec![test_source_config("../escaped", &["users"], 10)],
    );

    let err = BackupPipeline::new(config, connector).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(!root.path().join("escaped").exists());
}
