//! WASM runtime implementation using wasmtime.
//!
//! The guest is a freestanding module: it imports only the bridge functions
//! and exports its own allocator, so no WASI context is linked.

use super::config::BridgeConfig;
use super::host_functions::BridgeHostFunctions;
use super::session::Session;
use crate::error::{BridgeError, Result};
use crate::gl::GraphicsBackend;
use crate::guest::{BridgeContext, GuestEnv};
use crate::memory::guest_len;
use crate::scheduler::{MonotonicClock, SharedClock};

use std::path::Path;
use std::sync::Arc;

use wasmtime::*;

/// Guest exports the bridge itself re-enters while servicing an import.
#[derive(Clone)]
pub(crate) struct GuestAbi {
    pub memory: Memory,
    pub strlen: TypedFunc<i32, i32>,
    pub malloc: TypedFunc<i32, i32>,
}

/// Host state for the WASM store.
pub struct BridgeState<B: GraphicsBackend> {
    pub(crate) context: BridgeContext<B>,
    pub(crate) abi: Option<GuestAbi>,
    limits: StoreLimits,
}

impl<B: GraphicsBackend> BridgeState<B> {
    fn new(context: BridgeContext<B>, config: &BridgeConfig) -> Self {
        let mut limits = StoreLimitsBuilder::new();
        if config.max_memory > 0 {
            limits = limits.memory_size(config.max_memory);
        }
        Self {
            context,
            abi: None,
            limits: limits.build(),
        }
    }

    /// The bridge context.
    pub fn context(&self) -> &BridgeContext<B> {
        &self.context
    }

    fn abi(&self) -> Result<&GuestAbi> {
        self.abi.as_ref().ok_or(BridgeError::GuestNotReady)
    }
}

fn split_store<'a, B: GraphicsBackend + 'static>(
    store: impl Into<StoreContextMut<'a, BridgeState<B>>>,
) -> Result<(&'a mut [u8], &'a mut BridgeContext<B>)> {
    let store = store.into();
    let memory = store.data().abi()?.memory;
    let (arena, state) = memory.data_and_store_mut(store);
    Ok((arena, &mut state.context))
}

fn call_strlen<B: GraphicsBackend + 'static>(
    mut store: impl AsContextMut<Data = BridgeState<B>>,
    offset: u32,
) -> Result<u32> {
    let strlen = store.as_context().data().abi()?.strlen.clone();
    let len = strlen
        .call(&mut store, offset as i32)
        .map_err(|e| BridgeError::guest_call("strlen", e))?;
    guest_len(len)
}

fn call_malloc<B: GraphicsBackend + 'static>(
    mut store: impl AsContextMut<Data = BridgeState<B>>,
    len: u32,
) -> Result<u32> {
    let malloc = store.as_context().data().abi()?.malloc.clone();
    let ptr = malloc
        .call(&mut store, len as i32)
        .map_err(|e| BridgeError::guest_call("malloc", e))?;
    Ok(ptr as u32)
}

impl<B: GraphicsBackend + 'static> GuestEnv for Caller<'_, BridgeState<B>> {
    type Backend = B;

    fn context(&mut self) -> &mut BridgeContext<B> {
        &mut self.data_mut().context
    }

    fn split(&mut self) -> Result<(&mut [u8], &mut BridgeContext<B>)> {
        split_store(self)
    }

    fn strlen(&mut self, offset: u32) -> Result<u32> {
        call_strlen(self, offset)
    }

    fn malloc(&mut self, len: u32) -> Result<u32> {
        call_malloc(self, len)
    }
}

impl<B: GraphicsBackend + 'static> GuestEnv for Store<BridgeState<B>> {
    type Backend = B;

    fn context(&mut self) -> &mut BridgeContext<B> {
        &mut self.data_mut().context
    }

    fn split(&mut self) -> Result<(&mut [u8], &mut BridgeContext<B>)> {
        split_store(self)
    }

    fn strlen(&mut self, offset: u32) -> Result<u32> {
        call_strlen(self, offset)
    }

    fn malloc(&mut self, len: u32) -> Result<u32> {
        call_malloc(self, len)
    }
}

/// Compiles guest modules and boots sessions.
pub struct BridgeRuntime {
    engine: Engine,
    config: BridgeConfig,
}

/// A compiled guest module.
pub struct GuestModule {
    pub(crate) module: Module,
    name: String,
}

impl BridgeRuntime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let mut engine_config = Config::new();

        // Configure optimization
        engine_config.cranelift_opt_level(match config.optimization_level {
            0 => OptLevel::None,
            1 => OptLevel::Speed,
            _ => OptLevel::SpeedAndSize,
        });

        // Enable fuel metering if configured
        if config.fuel_limit.is_some() {
            engine_config.consume_fuel(true);
        }

        // Configure caching if path provided
        if let Some(ref cache_path) = config.cache_path {
            if let Err(e) = engine_config.cache_config_load(cache_path) {
                tracing::warn!("Failed to load cache config: {}", e);
            }
        }

        let engine = Engine::new(&engine_config)
            .map_err(|e| BridgeError::Wasm(format!("engine creation failed: {}", e)))?;

        Ok(Self { engine, config })
    }

    /// Load a guest module from a `.wasm` or `.wat` file.
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<GuestModule> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("guest")
            .to_string();

        let module = Module::from_file(&self.engine, path)
            .map_err(|e| BridgeError::Wasm(format!("module load failed: {}", e)))?;

        tracing::debug!(%name, "module compiled");
        Ok(GuestModule { module, name })
    }

    /// Load a guest module from binary or text format bytes.
    pub fn load_module_bytes(&self, name: &str, bytes: &[u8]) -> Result<GuestModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| BridgeError::Wasm(format!("module creation failed: {}", e)))?;

        Ok(GuestModule {
            module,
            name: name.to_string(),
        })
    }

    /// Boot a session on a real clock. See [`BridgeRuntime::boot_with_clock`].
    pub fn boot<B: GraphicsBackend + 'static>(
        &self,
        module: &GuestModule,
        backend: B,
        payload: &[u8],
    ) -> Result<Session<B>> {
        self.boot_with_clock(module, backend, payload, Arc::new(MonotonicClock::new()))
    }

    /// Instantiate `module`, hand it `payload` and start the frame cycle.
    pub fn boot_with_clock<B: GraphicsBackend + 'static>(
        &self,
        module: &GuestModule,
        backend: B,
        payload: &[u8],
        clock: SharedClock,
    ) -> Result<Session<B>> {
        let context = BridgeContext::new(backend, clock.clone(), &self.config);
        let mut store = Store::new(&self.engine, BridgeState::new(context, &self.config));

        // Configure resource limits via the stored limiter
        store.limiter(|state| &mut state.limits);

        // Add fuel if configured
        if let Some(fuel) = self.config.fuel_limit {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Wasm(format!("fuel setup failed: {}", e)))?;
        }

        let mut linker: Linker<BridgeState<B>> = Linker::new(&self.engine);
        BridgeHostFunctions::register(&mut linker, &self.config.import_module)?;
        if self.config.trap_unknown_imports {
            linker
                .define_unknown_imports_as_traps(&module.module)
                .map_err(|e| BridgeError::Wasm(format!("stub definition failed: {}", e)))?;
        }

        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| BridgeError::Wasm(format!("instantiation failed: {}", e)))?;

        tracing::info!(module = %module.name, payload = payload.len(), "guest instantiated");
        Session::start(store, instance, clock, &self.config, payload)
    }

    /// Get the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl GuestModule {
    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get exported function names.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.module.exports().filter_map(|e| {
            if matches!(e.ty(), ExternType::Func(_)) {
                Some(e.name())
            } else {
                None
            }
        })
    }

    /// Get `(module, name)` pairs of every import.
    pub fn imports(&self) -> impl Iterator<Item = (&str, &str)> {
        self.module.imports().map(|i| (i.module(), i.name()))
    }
}
