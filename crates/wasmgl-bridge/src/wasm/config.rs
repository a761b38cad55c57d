//! Configuration for the bridge runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};
use crate::scheduler::Viewport;

/// Guest interval settings and clock diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Register a clock probe alongside every guest interval
    pub measure_clock: bool,

    /// Intervals a clock probe averages before reporting
    pub clock_samples: u32,

    /// Shortest interval the guest may request, in milliseconds
    pub min_interval_ms: u64,

    /// Window of the achieved tick rate meter, in milliseconds
    pub tick_window_ms: u64,

    /// Maximum tick timestamps kept by the meter
    pub tick_window_samples: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            measure_clock: true,
            clock_samples: 50,
            min_interval_ms: 1,
            tick_window_ms: 3000,
            tick_window_samples: 512,
        }
    }
}

impl TimerConfig {
    /// Builder: toggle clock probes
    pub fn measure_clock(mut self, enable: bool) -> Self {
        self.measure_clock = enable;
        self
    }

    /// Builder: set probe sample count
    pub fn clock_samples(mut self, samples: u32) -> Self {
        self.clock_samples = samples.max(1);
        self
    }

    /// Builder: set the minimum interval
    pub fn min_interval_ms(mut self, ms: u64) -> Self {
        self.min_interval_ms = ms;
        self
    }
}

/// Configuration for the bridge runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum guest memory in bytes (0 = unlimited, default = 256MB)
    pub max_memory: usize,

    /// Fuel granted to each guest entry call (`init`, `draw`, a tick, an
    /// input handler, `export`). A call that runs out traps on its own.
    pub fuel_limit: Option<u64>,

    /// Cranelift optimization level (0-2)
    pub optimization_level: u8,

    /// Define imports the bridge does not provide as trapping stubs
    pub trap_unknown_imports: bool,

    /// Import module name the guest links against
    pub import_module: String,

    /// Display refresh rate driving `draw`
    pub refresh_hz: u32,

    /// Initial drawable size
    pub viewport: Viewport,

    /// Guest intervals and clock diagnostics
    pub timers: TimerConfig,

    /// Guest console lines kept in memory
    pub console_history: usize,

    /// Issued handle count after which a warning is logged
    pub handle_soft_limit: usize,

    /// Cache compiled modules to disk
    pub cache_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_memory: 256 * 1024 * 1024, // 256 MB
            fuel_limit: None,
            optimization_level: 2,
            trap_unknown_imports: true,
            import_module: "env".to_string(),
            refresh_hz: 60,
            viewport: Viewport::default(),
            timers: TimerConfig::default(),
            console_history: 256,
            handle_soft_limit: 1 << 20,
            cache_path: None,
        }
    }
}

impl BridgeConfig {
    /// Config for runs without a display: no clock probes, fuel-limited
    pub fn headless() -> Self {
        Self {
            fuel_limit: Some(1_000_000_000),
            timers: TimerConfig::default().measure_clock(false),
            ..Default::default()
        }
    }

    /// Config for development/debugging
    pub fn development() -> Self {
        Self {
            optimization_level: 0, // Faster compilation
            console_history: 4096,
            handle_soft_limit: 4096,
            ..Default::default()
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Builder: set max memory
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Builder: set fuel limit
    pub fn fuel_limit(mut self, fuel: u64) -> Self {
        self.fuel_limit = Some(fuel);
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(2);
        self
    }

    /// Builder: set refresh rate
    pub fn refresh_hz(mut self, hz: u32) -> Self {
        self.refresh_hz = hz.max(1);
        self
    }

    /// Builder: set initial viewport
    pub fn viewport(mut self, width: i32, height: i32) -> Self {
        self.viewport = Viewport::new(width, height);
        self
    }

    /// Builder: set timer settings
    pub fn timers(mut self, timers: TimerConfig) -> Self {
        self.timers = timers;
        self
    }

    /// Builder: toggle trapping stubs for unknown imports
    pub fn trap_unknown_imports(mut self, enable: bool) -> Self {
        self.trap_unknown_imports = enable;
        self
    }

    /// Builder: set cache path
    pub fn cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.import_module.is_empty() {
            return Err(BridgeError::Config("import_module must not be empty".into()));
        }
        if self.viewport.width < 0 || self.viewport.height < 0 {
            return Err(BridgeError::Config(format!(
                "viewport must be non-negative, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        if self.fuel_limit == Some(0) {
            return Err(BridgeError::Config("fuel_limit must be at least 1".into()));
        }
        if self.refresh_hz == 0 {
            return Err(BridgeError::Config("refresh_hz must be at least 1".into()));
        }
        Ok(())
    }
}
