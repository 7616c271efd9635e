use checkwatch::logs::{LogFile, LogStore};
use checkwatch::rotator::{rotate_logs, rotate_logs_at};
use checkwatch::store::FileStore;
use checkwatch::alert::LogAlerter;
use checkwatch::{Worker, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn rotation_round_trips_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let logs = LogStore::new(dir.path());
    let lines: Vec<String> = (0..25)
        .map(|i| format!(r#"{{"seq":{i},"state":"up"}}"#))
        .collect();
    for line in &lines {
        logs.append("aaaaaaaaaaaaaaaaaaaa", line).await.unwrap();
    }

    let report = rotate_logs_at(&logs, 1_700_000_000_000).await;
    assert_eq!(report.archived, vec!["aaaaaaaaaaaaaaaaaaaa-1700000000000"]);
    assert!(report.failed.is_empty());
    assert!(report.untruncated.is_empty());

    let restored = logs
        .decompress("aaaaaaaaaaaaaaaaaaaa-1700000000000")
        .await
        .unwrap();
    assert_eq!(restored.lines().collect::<Vec<_>>(), lines);
    assert_eq!(logs.read_segment("aaaaaaaaaaaaaaaaaaaa").await.unwrap(), "");
}

#[tokio::test]
async fn second_rotation_of_empty_segment_does_not_fail() {
    let dir = tempfile::tempdir().unwrap();
    let logs = LogStore::new(dir.path());
    logs.append("bbbbbbbbbbbbbbbbbbbb", "once").await.unwrap();

    rotate_logs(&logs).await;
    let report = rotate_logs(&logs).await;
    assert!(report.failed.is_empty());
    assert!(report.archived.is_empty());
    assert_eq!(report.empty, vec!["bbbbbbbbbbbbbbbbbbbb"]);

    let files = logs.list(true).await.unwrap();
    let archives = files
        .iter()
        .filter(|f| matches!(f, LogFile::Archive(_)))
        .count();
    assert_eq!(archives, 1);
}

#[tokio::test]
async fn one_broken_segment_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let logs = LogStore::new(dir.path());
    logs.append("good1good1good1good1", "alpha").await.unwrap();
    logs.append("good2good2good2good2", "beta").await.unwrap();
    // Not UTF-8, so reading the segment fails.
    std::fs::write(logs.segment_path("brokenbrokenbroken00"), [0xff, 0xfe, 0x00, b'\n']).unwrap();

    let report = rotate_logs_at(&logs, 5).await;
    assert_eq!(report.failed, vec!["brokenbrokenbroken00"]);
    assert_eq!(
        report.archived,
        vec!["good1good1good1good1-5", "good2good2good2good2-5"]
    );
    assert_eq!(logs.decompress("good1good1good1good1-5").await.unwrap(), "alpha\n");
    assert_eq!(logs.decompress("good2good2good2good2-5").await.unwrap(), "beta\n");
    assert_eq!(
        std::fs::read(logs.segment_path("brokenbrokenbroken00")).unwrap(),
        vec![0xff, 0xfe, 0x00, b'\n']
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn appends_racing_rotation_are_neither_lost_nor_duplicated() {
    let dir = tempfile::tempdir().unwrap();
    let logs = LogStore::new(dir.path());
    let id = "racingracingracing00";

    let writer = {
        let logs = logs.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                logs.append(id, &format!("line-{i}")).await.unwrap();
            }
        })
    };
    let mut generation = 0;
    while !writer.is_finished() {
        generation += 1;
        rotate_logs_at(&logs, generation).await;
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    generation += 1;
    rotate_logs_at(&logs, generation).await;

    let mut seen = Vec::new();
    for file in logs.list(true).await.unwrap() {
        if let LogFile::Archive(archive_id) = file {
            let content = logs.decompress(&archive_id).await.unwrap();
            seen.extend(content.lines().map(str::to_string));
        }
    }
    seen.sort();
    let mut expected: Vec<String> = (0..200).map(|i| format!("line-{i}")).collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn started_worker_rotates_immediately_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig {
        data_dir: dir.path().join("data"),
        logs_dir: dir.path().join("logs"),
        gather_interval_secs: 3600,
        rotation_interval_secs: 3600,
        ..WorkerConfig::default()
    };
    let worker = Arc::new(Worker::new(
        config,
        Arc::new(FileStore::new(dir.path().join("data"))),
        Arc::new(LogAlerter),
    )
    .unwrap());
    worker.logs().append("cccccccccccccccccccc", "pending").await.unwrap();

    let handle = Arc::clone(&worker).run();

    let mut rotated = false;
    for _ in 0..100 {
        let files = worker.logs().list(true).await.unwrap();
        if files.iter().any(|f| matches!(f, LogFile::Archive(_))) {
            rotated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(rotated, "first rotation cycle should run on startup");

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("loops stop promptly on shutdown");
    assert_eq!(worker.logs().read_segment("cccccccccccccccccccc").await.unwrap(), "");
}
