//! Daemon lifecycle
//!
//! `Init -> Running -> Stopping -> Stopped`. The context starts with an
//! empty-but-valid configuration so a signal that arrives while the real
//! one is loading finds nothing uninitialized.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use tracing::{debug, error, info, warn};

use tc_core::constants::{paths, timing};
use tc_core::{
    load_config, load_hot_params, read_dmi_sku, Scheduler, SysfsGateway, SysfsIo, SystemConfig,
};

use crate::logging::LogControl;
use crate::signals::SignalFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Init,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Init => "init",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Where the configuration comes from
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub config_path: PathBuf,
    /// Explicit SKU; DMI is consulted when absent
    pub sku: Option<String>,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(paths::CONFIG_FILE),
            sku: None,
        }
    }
}

/// Everything the daemon owns, created at Init and dropped after Stopped
pub struct DaemonContext {
    sys_config: Arc<SystemConfig>,
    scheduler: Option<Scheduler>,
    phase: LifecyclePhase,
    flags: Arc<SignalFlags>,
    log: LogControl,
    options: DaemonOptions,
}

impl fmt::Debug for DaemonContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonContext")
            .field("sku", &self.sys_config.sku)
            .field("phase", &self.phase)
            .field("scheduler", &self.scheduler.is_some())
            .field("log_level", &self.log.level())
            .finish()
    }
}

impl DaemonContext {
    /// Context holding the default configuration
    ///
    /// Safe to hand its flags to signal listeners immediately.
    pub fn new(options: DaemonOptions, log: LogControl) -> Self {
        let sys_config = Arc::new(SystemConfig::default());
        let flags = Arc::new(SignalFlags::new(sys_config.platform_support));
        Self {
            sys_config,
            scheduler: None,
            phase: LifecyclePhase::Init,
            flags,
            log,
            options,
        }
    }

    pub fn flags(&self) -> Arc<SignalFlags> {
        Arc::clone(&self.flags)
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn sys_config(&self) -> &SystemConfig {
        &self.sys_config
    }

    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Load the configuration and build the sensor graph
    pub fn load(&mut self) -> anyhow::Result<()> {
        let sku = self
            .options
            .sku
            .clone()
            .or_else(|| read_dmi_sku(Path::new(paths::dmi::PRODUCT_SKU)));
        let path = self.options.config_path.clone();
        info!("STARTUP: Loading {} (SKU {})", path.display(), sku.as_deref().unwrap_or("unknown"));

        let config = load_config(&path, sku.as_deref())
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        let io = SysfsGateway::from_config(&config);
        self.install(config, Box::new(io))
    }

    /// Adopt a validated configuration with the given attribute gateway
    pub fn install(&mut self, config: SystemConfig, io: Box<dyn SysfsIo>) -> anyhow::Result<()> {
        if self.phase != LifecyclePhase::Init {
            return Err(anyhow!("configuration can only be installed during init, not {}", self.phase));
        }
        let scheduler = Scheduler::new(&config, io, Instant::now())
            .context("Failed to build sensors and zones")?;

        if !config.platform_support {
            warn!("Platform support disabled in configuration, thermal control is inactive");
        }
        self.flags.set_platform_support(config.platform_support);
        info!(
            "STARTUP: SKU {} with {} entities in {} zones",
            config.sku,
            config.entities.len(),
            config.zones.len()
        );
        self.sys_config = Arc::new(config);
        self.scheduler = Some(scheduler);
        Ok(())
    }

    /// Run the control loop until termination is requested
    ///
    /// Returns an error if a tick panicked. The caller still runs
    /// [`DaemonContext::stop`] in that case.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.phase = LifecyclePhase::Running;
        info!("Control loop running");

        loop {
            if self.flags.terminate_requested() {
                info!("SIGNAL: Termination requested");
                break;
            }
            if self.flags.take_reload() {
                self.reload();
            }

            let now = Instant::now();
            let mut deadline = now + timing::MAX_IDLE;
            if self.flags.platform_support() {
                if let Some(due) = self.scheduler.as_ref().and_then(Scheduler::next_due) {
                    deadline = deadline.min(due);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                _ = self.flags.woken() => {
                    debug!("Control loop woken up by signal");
                    continue;
                }
            }

            if !self.flags.platform_support() {
                continue;
            }
            let Some(scheduler) = self.scheduler.as_mut() else {
                continue;
            };
            let stop = self.flags.terminate_flag();
            let tick = panic::catch_unwind(AssertUnwindSafe(|| scheduler.tick(Instant::now(), stop)));
            if tick.is_err() {
                error!("Control loop panicked, stopping");
                return Err(anyhow!("control loop panicked"));
            }
        }
        Ok(())
    }

    /// Apply the log-level file and reloadable configuration parameters
    pub fn reload(&mut self) {
        info!("SIGNAL: Reload requested");
        self.log.reload_from_file();

        if self.scheduler.is_none() {
            return;
        }
        let params = match load_hot_params(&self.options.config_path, &self.sys_config) {
            Ok(params) => params,
            Err(e) => {
                warn!(
                    "Reload of {} failed, keeping current parameters: {}",
                    self.options.config_path.display(),
                    e
                );
                return;
            }
        };

        if let Some(scheduler) = self.scheduler.as_mut() {
            let zones = scheduler.apply_hot(&params);
            info!("Reloaded tuning for {} zones", zones);
        }
        if params.platform_support != self.flags.platform_support() {
            warn!("Platform support changed to {}", params.platform_support);
            self.flags.set_platform_support(params.platform_support);
        }
        self.sys_config = Arc::new(self.sys_config.with_hot_params(&params));
    }

    /// Stopping: safe duty cycle on every zone, then the final log record
    pub fn stop(&mut self) {
        if self.phase == LifecyclePhase::Stopped {
            return;
        }
        self.phase = LifecyclePhase::Stopping;
        info!("SHUTDOWN: Stopping thermal control");

        if let Some(scheduler) = self.scheduler.as_mut() {
            if self.flags.platform_support() {
                if let Err(e) = scheduler.apply_safe() {
                    error!("SHUTDOWN: Failed to apply safe duty cycle: {}", e);
                }
            } else {
                info!("SHUTDOWN: Platform unsupported, leaving PWM untouched");
            }
        }

        self.phase = LifecyclePhase::Stopped;
        info!("SHUTDOWN: Daemon stopped (log level {})", self.log.level());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Request;
    use serde_json::json;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Board {
        dir: TempDir,
    }

    impl Board {
        fn new() -> Self {
            let board = Self { dir: TempDir::new().unwrap() };
            board.set("asic/temperature/input", "60000");
            board.set("pwm1", "0");
            board
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

        fn write_config(&self, hysteresis: u16, max_pwm: u16, platform_support: bool) {
            let doc = json!({
                "platform_support": platform_support,
                "skus": { "default": {
                    "zones": [{
                        "name": "main",
                        "pwm_paths": [self.path("pwm1")],
                        "min_pwm": 50,
                        "max_pwm": max_pwm,
                        "safe_pwm": 200,
                        "hysteresis": hysteresis,
                        "strategy": "dynamic",
                        "step_down": 20
                    }],
                    "tables": { "asic_sensor": { "dmin": [[40000, 60], [80000, 220]] } },
                    "entities": [{
                        "name": "asic", "kind": "asic_sensor", "pwm_zone": "main",
                        "sysfs_path": self.path("asic"), "poll_interval_ms": 1000
                    }]
                }}
            });
            fs::write(self.path("tc_config.json"), doc.to_string()).unwrap();
        }

        fn context(&self) -> DaemonContext {
            let options = DaemonOptions {
                config_path: self.path("tc_config.json"),
                sku: Some("default".into()),
            };
            DaemonContext::new(options, LogControl::detached("info", self.path("log_level")))
        }
    }

    #[tokio::test]
    async fn test_terminate_with_default_config_is_handled() {
        let board = Board::new();
        let mut ctx = board.context();
        assert!(ctx.sys_config().is_empty());

        // Signal lands before any configuration was loaded
        ctx.flags().raise(Request::Terminate);
        ctx.run().await.unwrap();
        ctx.stop();

        assert_eq!(ctx.phase(), LifecyclePhase::Stopped);
        assert_eq!(board.get("pwm1"), "0");
    }

    #[test]
    fn test_reload_during_init_is_harmless() {
        let board = Board::new();
        let mut ctx = board.context();
        ctx.flags().raise(Request::Reload);
        ctx.reload();
        assert!(ctx.sys_config().is_empty());
        assert_eq!(ctx.phase(), LifecyclePhase::Init);
    }

    #[tokio::test]
    async fn test_run_controls_then_stops_safely() {
        let board = Board::new();
        board.write_config(2, 255, true);
        let mut ctx = board.context();
        ctx.load().unwrap();

        let flags = ctx.flags();
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flags.raise(Request::Terminate);
        };
        let (result, ()) = tokio::join!(ctx.run(), stopper);
        result.unwrap();

        // asic at 60C -> 140
        assert_eq!(board.get("pwm1"), "140");
        ctx.stop();
        assert_eq!(board.get("pwm1"), "200");
        assert_eq!(ctx.phase(), LifecyclePhase::Stopped);
    }

    #[tokio::test]
    async fn test_missing_config_fails_load() {
        let board = Board::new();
        let mut ctx = board.context();
        let err = ctx.load().unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load configuration"));
        assert!(ctx.scheduler().is_none());
        assert_eq!(ctx.phase(), LifecyclePhase::Init);
    }

    #[tokio::test]
    async fn test_reload_applies_tuning_only() {
        let board = Board::new();
        board.write_config(2, 255, true);
        let mut ctx = board.context();
        ctx.load().unwrap();

        // Hysteresis is reloadable, max_pwm is not
        board.write_config(6, 230, true);
        ctx.reload();
        let zone = &ctx.sys_config().zones[0];
        assert_eq!(zone.hysteresis, 6);
        assert_eq!(zone.max_pwm, 255);
        assert_eq!(ctx.scheduler().unwrap().zone("main").unwrap().bounds(), (50, 255));
    }

    #[tokio::test]
    async fn test_broken_reload_keeps_parameters() {
        let board = Board::new();
        board.write_config(2, 255, true);
        let mut ctx = board.context();
        ctx.load().unwrap();

        fs::write(board.path("tc_config.json"), "{ broken").unwrap();
        ctx.reload();
        assert_eq!(ctx.sys_config().zones[0].hysteresis, 2);
    }

    #[tokio::test]
    async fn test_unsupported_platform_is_left_alone() {
        let board = Board::new();
        board.write_config(2, 255, false);
        let mut ctx = board.context();
        ctx.load().unwrap();
        assert!(!ctx.flags().platform_support());

        ctx.flags().raise(Request::Reload);
        assert!(!ctx.flags().take_reload());

        ctx.flags().raise(Request::Terminate);
        ctx.run().await.unwrap();
        ctx.stop();
        assert_eq!(board.get("pwm1"), "0");
    }

    #[tokio::test]
    async fn test_install_only_during_init() {
        let board = Board::new();
        board.write_config(2, 255, true);
        let mut ctx = board.context();
        ctx.load().unwrap();
        ctx.stop();

        let config = ctx.sys_config().clone();
        let err = ctx.install(config, Box::new(SysfsGateway::new())).unwrap_err();
        assert!(err.to_string().contains("only be installed during init"));
    }
}
