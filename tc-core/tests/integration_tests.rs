/*
 * Integration tests for the thermal control core
 *
 * These tests build a sysfs-like tree in a temporary directory, load a
 * configuration pointing at it and drive the scheduler end to end.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use serde_json::json;
use tc_core::{parse_config, Demand, Scheduler, SensorState, SysfsGateway, SystemConfig, ThermalError};
use tempfile::TempDir;

struct Platform {
    dir: TempDir,
}

impl Platform {
    fn new() -> Self {
        let platform = Self { dir: TempDir::new().unwrap() };
        platform.set("asic/temperature/input", "60000");
        platform.set("module1/present", "1");
        platform.set("module1/temperature/input", "45000");
        platform.set("fan1/present", "1");
        platform.set("fan1/fan1_input", "9000");
        platform.set("pwm1", "0");
        fs::create_dir_all(platform.path("faults")).unwrap();
        platform
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn set(&self, rel: &str, value: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value).unwrap();
    }

    fn get(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    fn config(&self) -> SystemConfig {
        let doc = json!({
            "fault_threshold": 3,
            "recovery_threshold": 2,
            "fault_report_dir": self.path("faults"),
            "skus": {
                "default": {
                    "zones": [{
                        "name": "main",
                        "pwm_paths": [self.path("pwm1")],
                        "min_pwm": 50,
                        "max_pwm": 255,
                        "safe_pwm": 200,
                        "hysteresis": 2,
                        "strategy": "dynamic",
                        "dwell_ms": 1000,
                        "step_down": 20
                    }],
                    "tables": {
                        "asic_sensor": { "dmin": [[40000, 60], [80000, 220]] },
                        "module": { "dmin": [[30000, 50], [60000, 200]] },
                        "fan_sensor": { "dmin": [[0, 50]] }
                    },
                    "entities": [
                        { "name": "asic", "kind": "asic_sensor", "pwm_zone": "main",
                          "sysfs_path": self.path("asic"), "poll_interval_ms": 1000 },
                        { "name": "module1", "kind": "module_sensor", "pwm_zone": "main",
                          "sysfs_path": self.path("module1"), "poll_interval_ms": 1000,
                          "table": "module" },
                        { "name": "fan1", "kind": "fan_sensor", "pwm_zone": "main",
                          "sysfs_path": self.path("fan1"), "poll_interval_ms": 1000 }
                    ]
                }
            }
        });
        parse_config(&doc.to_string(), None).unwrap()
    }

    fn scheduler(&self, now: Instant) -> Scheduler {
        let config = self.config();
        let io = SysfsGateway::from_config(&config).with_retry_delay(Duration::ZERO);
        Scheduler::new(&config, Box::new(io), now).unwrap()
    }
}

fn run(scheduler: &mut Scheduler, at: Instant) {
    scheduler.tick(at, &AtomicBool::new(false));
}

#[test]
fn test_zone_runs_at_hottest_member() {
    let platform = Platform::new();
    let t0 = Instant::now();
    let mut scheduler = platform.scheduler(t0);

    run(&mut scheduler, t0);
    // asic 60C -> 140, module 45C -> 125, fan idle -> 50
    assert_eq!(scheduler.zone("main").unwrap().committed(), Some(140));
    assert_eq!(platform.get("pwm1"), "140");
}

#[test]
fn test_stalled_fan_forces_full_speed_and_reports_fault() {
    let platform = Platform::new();
    let t0 = Instant::now();
    let mut scheduler = platform.scheduler(t0);
    run(&mut scheduler, t0);

    platform.set("fan1/fan1_input", "0");
    run(&mut scheduler, t0 + Duration::from_secs(1));

    assert_eq!(scheduler.sensor("fan1").unwrap().state(), SensorState::Fault);
    assert_eq!(platform.get("pwm1"), "255");
    assert_eq!(platform.get("faults/fan1_fault"), "1");

    // Spinning again: recovers after two good polls
    platform.set("fan1/fan1_input", "9000");
    run(&mut scheduler, t0 + Duration::from_secs(2));
    assert_eq!(scheduler.sensor("fan1").unwrap().state(), SensorState::Fault);
    run(&mut scheduler, t0 + Duration::from_secs(3));
    assert_eq!(scheduler.sensor("fan1").unwrap().state(), SensorState::Ok);
    assert_eq!(platform.get("faults/fan1_fault"), "0");
}

#[test]
fn test_absent_module_contributes_nothing() {
    let platform = Platform::new();
    platform.set("module1/present", "0");
    let t0 = Instant::now();
    let mut scheduler = platform.scheduler(t0);

    for step in 0..5 {
        run(&mut scheduler, t0 + Duration::from_secs(step));
    }
    let module = scheduler.sensor("module1").unwrap();
    assert_eq!(module.state(), SensorState::Ok);
    assert_eq!(module.contribution().demand, Demand::Idle);
    assert!(!platform.path("faults/module1_fault").exists());
}

#[test]
fn test_cooling_down_is_delayed_and_stepped() {
    let platform = Platform::new();
    platform.set("asic/temperature/input", "80000");
    let t0 = Instant::now();
    let mut scheduler = platform.scheduler(t0);
    run(&mut scheduler, t0);
    assert_eq!(platform.get("pwm1"), "220");

    // Target drops to 125 but the zone holds for the dwell time
    platform.set("asic/temperature/input", "40000");
    run(&mut scheduler, t0 + Duration::from_secs(1));
    assert_eq!(platform.get("pwm1"), "220");
    assert_eq!(scheduler.next_due(), Some(t0 + Duration::from_secs(2)));

    run(&mut scheduler, t0 + Duration::from_secs(2));
    assert_eq!(platform.get("pwm1"), "200");

    // Heating up again is immediate
    platform.set("asic/temperature/input", "80000");
    run(&mut scheduler, t0 + Duration::from_secs(3));
    assert_eq!(platform.get("pwm1"), "220");
}

#[test]
fn test_unreadable_asic_faults_after_threshold() {
    let platform = Platform::new();
    let t0 = Instant::now();
    let mut scheduler = platform.scheduler(t0);
    run(&mut scheduler, t0);

    platform.set("asic/temperature/input", "garbage");
    run(&mut scheduler, t0 + Duration::from_secs(1));
    run(&mut scheduler, t0 + Duration::from_secs(2));
    // Two failures: last good value still drives the zone
    assert_eq!(scheduler.sensor("asic").unwrap().state(), SensorState::Degraded);
    assert_eq!(platform.get("pwm1"), "140");

    run(&mut scheduler, t0 + Duration::from_secs(3));
    assert_eq!(scheduler.sensor("asic").unwrap().state(), SensorState::Fault);
    assert_eq!(platform.get("pwm1"), "255");
}

#[test]
fn test_safe_duty_written_on_shutdown() {
    let platform = Platform::new();
    let t0 = Instant::now();
    let mut scheduler = platform.scheduler(t0);
    run(&mut scheduler, t0);

    scheduler.apply_safe().unwrap();
    assert_eq!(platform.get("pwm1"), "200");
}

#[test]
fn test_table_missing_for_dynamic_zone_is_rejected() {
    let doc = json!({
        "skus": { "default": {
            "zones": [{ "name": "main", "min_pwm": 50, "max_pwm": 255 }],
            "entities": [{ "name": "t", "kind": "thermal_sensor", "pwm_zone": "main",
                           "sysfs_path": Path::new("/nonexistent") }]
        }}
    });
    assert!(matches!(
        parse_config(&doc.to_string(), None),
        Err(ThermalError::InvalidConfig { .. })
    ));
}
