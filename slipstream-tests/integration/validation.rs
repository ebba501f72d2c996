//! Output validation against a stub prober binary: the full fan-out is
//! reported, one bad file never hides the other results.

use std::fs;
use std::time::Duration;

use slipstream_core::pipeline::SubscriberSet;
use slipstream_core::validate::{self, FfprobeProber, ValidationError};
use tempfile::tempdir;

use crate::support::write_stub;

const PROBE_OK: &str = "echo 300.043000";

/// Stub prober: succeeds with ~300s for non-empty files, fails for empty
/// ones the way ffprobe fails on a truncated container.
const PROBE_CHECKED: &str = r#"for last; do :; done
if [ -s "$last" ]; then
    echo 300.043000
else
    echo "could not read stream header" >&2
    exit 1
fi"#;

fn populated_set(dir: &std::path::Path, count: usize) -> SubscriberSet {
    let set = SubscriberSet::plan(dir, dir, count);
    for entry in &set {
        fs::write(&entry.output, b"flv capture bytes").unwrap();
    }
    set
}

#[tokio::test]
async fn test_reports_ten_durations_near_300_seconds() {
    let dir = tempdir().unwrap();
    let probe = write_stub(dir.path(), "ffprobe", PROBE_OK);
    let set = populated_set(dir.path(), 10);
    let prober = FfprobeProber::new(&probe);

    let reports = validate::validate_all(&prober, &set).await;

    assert_eq!(reports.len(), 10);
    for report in &reports {
        let duration = report.duration.as_ref().unwrap();
        let drift = duration.as_secs_f64() - 300.0;
        assert!(
            drift.abs() < 1.0,
            "subscriber {} drifted {drift}s from 300s",
            report.index
        );
    }
}

#[tokio::test]
async fn test_one_missing_output_yields_one_error_among_n_results() {
    let dir = tempdir().unwrap();
    let probe = write_stub(dir.path(), "ffprobe", PROBE_OK);
    let set = populated_set(dir.path(), 10);
    fs::remove_file(&set.entries()[6].output).unwrap();
    let prober = FfprobeProber::new(&probe);

    let reports = validate::validate_all(&prober, &set).await;

    assert_eq!(reports.len(), 10);
    let (failed, succeeded): (Vec<_>, Vec<_>) =
        reports.iter().partition(|r| r.duration.is_err());
    assert_eq!(succeeded.len(), 9);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].index, 6);
    assert!(matches!(
        failed[0].duration,
        Err(ValidationError::MissingOutput { .. })
    ));
}

#[tokio::test]
async fn test_unreadable_output_reports_probe_failure() {
    let dir = tempdir().unwrap();
    let probe = write_stub(dir.path(), "ffprobe", PROBE_CHECKED);
    let set = populated_set(dir.path(), 3);
    // Truncate one capture to zero bytes
    fs::write(&set.entries()[1].output, b"").unwrap();
    let prober = FfprobeProber::new(&probe);

    let reports = validate::validate_all(&prober, &set).await;

    assert!(reports[0].duration.is_ok());
    assert!(matches!(
        &reports[1].duration,
        Err(ValidationError::ProbeFailed { stderr, .. })
            if stderr.contains("could not read stream header")
    ));
    assert!(reports[2].duration.is_ok());
}

#[tokio::test]
async fn test_non_numeric_probe_output_is_reported_per_entry() {
    let dir = tempdir().unwrap();
    let probe = write_stub(dir.path(), "ffprobe", "echo N/A");
    let set = populated_set(dir.path(), 2);
    let prober = FfprobeProber::new(&probe);

    let reports = validate::validate_all(&prober, &set).await;

    for report in &reports {
        assert!(matches!(
            &report.duration,
            Err(ValidationError::UnparsableDuration { value, .. }) if value == "N/A"
        ));
    }
}

#[tokio::test]
async fn test_validation_stream_probes_lazily() {
    let dir = tempdir().unwrap();
    let probed_log = dir.path().join("probed.log");
    let probe = write_stub(
        dir.path(),
        "ffprobe",
        &format!(
            "for last; do :; done\necho \"$last\" >> \"{}\"\necho 300.043000",
            probed_log.display()
        ),
    );
    let set = populated_set(dir.path(), 5);
    let prober = FfprobeProber::new(&probe);

    use futures::StreamExt;
    let first_two: Vec<_> = validate::validate(&prober, &set).take(2).collect().await;

    assert_eq!(first_two.len(), 2);
    // Only the polled entries were probed
    let probed = fs::read_to_string(&probed_log).unwrap();
    assert_eq!(probed.lines().count(), 2);
}

#[tokio::test]
async fn test_results_arrive_in_subscriber_index_order() {
    let dir = tempdir().unwrap();
    let probe = write_stub(dir.path(), "ffprobe", PROBE_OK);
    let set = populated_set(dir.path(), 5);
    let prober = FfprobeProber::new(&probe);

    let reports = validate::validate_all(&prober, &set).await;

    let indices: Vec<usize> = reports.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    let stub = validate::StubProber::constant(Duration::from_secs(300));
    let reports = validate::validate_all(&stub, &set).await;
    assert_eq!(reports.len(), 5);
}
