//!
//! Integration tests for the stress workloads
//!

use std::fs;

use concord_runtime::OverflowPolicy;
use concord_stress::{StressProfile, Workload};

fn small_profile() -> StressProfile {
    let mut profile = StressProfile::default().with_overrides(Some(2), Some(50));
    profile.timers.tasks = 8;
    profile.timers.max_delay_ms = 10;
    profile
}

#[test]
fn test_every_workload_passes_on_a_small_profile() {
    let profile = small_profile();
    for workload in Workload::ALL {
        let report = workload
            .run(&profile)
            .unwrap_or_else(|e| panic!("{} failed: {}", workload.name(), e));
        assert_eq!(report.workload, workload.name());
        assert!(report.checks > 0);
    }
}

#[test]
fn test_pool_workload_under_each_policy() {
    for policy in [
        OverflowPolicy::RunInline,
        OverflowPolicy::WaitForSlot,
        OverflowPolicy::Discard,
    ] {
        let mut profile = small_profile();
        profile.pool.maximum_pool_size = Some(2);
        profile.pool.keep_alive_ms = 50;
        profile.pool.policy = policy;
        let report = Workload::Pool.run(&profile).unwrap();
        assert!(report.items <= 100);
        if policy != OverflowPolicy::Discard {
            assert_eq!(report.items, 100);
        }
    }
}

#[test]
fn test_channel_workload_with_tiny_buffer() {
    let mut profile = small_profile();
    profile.queue.capacity = 1;
    let report = Workload::Channel.run(&profile).unwrap();
    assert_eq!(report.items, 3 * 100);
}

#[test]
fn test_profile_loaded_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stress.toml");
    fs::write(
        &path,
        r#"
threads = 3
iterations = 20

[queue]
capacity = 4

[timers]
tasks = 5
max_delay_ms = 5
"#,
    )
    .unwrap();

    let profile = StressProfile::load(&path).unwrap();
    assert_eq!(profile.threads, 3);
    let report = Workload::Queued.run(&profile).unwrap();
    assert_eq!(report.items, 60);
    let report = Workload::Timers.run(&profile).unwrap();
    assert_eq!(report.items, 5);
}

#[test]
fn test_zero_capacity_queue_is_a_config_error() {
    let mut profile = small_profile();
    profile.queue.capacity = 0;
    let err = Workload::Queued.run(&profile).unwrap_err();
    assert!(err.to_string().contains("capacity"));
}
