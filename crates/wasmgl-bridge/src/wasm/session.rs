//! A running guest: boot, input, timers and frames.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use wasmtime::{Instance, Store, TypedFunc, WasmParams, WasmResults};

use super::config::BridgeConfig;
use super::runtime::{BridgeState, GuestAbi};
use crate::error::{BridgeError, Result};
use crate::gl::GraphicsBackend;
use crate::guest::{BridgeContext, GuestConsole, GuestEnv};
use crate::input::{GuestInput, InputEvent};
use crate::memory::{view, view_mut};
use crate::scheduler::{ClockReport, FrameScheduler, FrameStats, Fired, SharedClock, Viewport};
use crate::strings::{decode_cstring, encode_into_guest};

struct GuestExports {
    init: TypedFunc<(i32, i32), ()>,
    resize: TypedFunc<(i32, i32), ()>,
    draw: TypedFunc<(), ()>,
    call: TypedFunc<(i32, i32), ()>,
    key_down: Option<TypedFunc<i32, ()>>,
    key_up: Option<TypedFunc<i32, ()>>,
    button_down: Option<TypedFunc<i32, ()>>,
    button_up: Option<TypedFunc<i32, ()>>,
    mouse_move: Option<TypedFunc<(i32, i32), ()>>,
    scroll: Option<TypedFunc<i32, ()>>,
    export: Option<TypedFunc<(i32, i32, i32), i32>>,
}

fn required<B, P, R>(instance: &Instance, store: &mut Store<BridgeState<B>>, name: &str) -> Result<TypedFunc<P, R>>
where
    B: GraphicsBackend + 'static,
    P: WasmParams,
    R: WasmResults,
{
    optional(instance, store, name)?.ok_or_else(|| BridgeError::MissingExport(name.to_string()))
}

fn optional<B, P, R>(
    instance: &Instance,
    store: &mut Store<BridgeState<B>>,
    name: &str,
) -> Result<Option<TypedFunc<P, R>>>
where
    B: GraphicsBackend + 'static,
    P: WasmParams,
    R: WasmResults,
{
    let Some(func) = instance.get_func(&mut *store, name) else {
        return Ok(None);
    };
    func.typed::<P, R>(&*store)
        .map(Some)
        .map_err(|e| BridgeError::Wasm(format!("export `{}` has the wrong signature: {}", name, e)))
}

impl GuestExports {
    fn resolve<B: GraphicsBackend + 'static>(instance: &Instance, store: &mut Store<BridgeState<B>>) -> Result<Self> {
        let exports = Self {
            init: required(instance, store, "init")?,
            resize: required(instance, store, "resize")?,
            draw: required(instance, store, "draw")?,
            call: required(instance, store, "call")?,
            key_down: optional(instance, store, "key_down")?,
            key_up: optional(instance, store, "key_up")?,
            button_down: optional(instance, store, "button_down")?,
            button_up: optional(instance, store, "button_up")?,
            mouse_move: optional(instance, store, "move")?,
            scroll: optional(instance, store, "scroll")?,
            export: optional(instance, store, "export")?,
        };
        for (name, present) in [
            ("key_down", exports.key_down.is_some()),
            ("key_up", exports.key_up.is_some()),
            ("button_down", exports.button_down.is_some()),
            ("button_up", exports.button_up.is_some()),
            ("move", exports.mouse_move.is_some()),
            ("scroll", exports.scroll.is_some()),
            ("export", exports.export.is_some()),
        ] {
            if !present {
                tracing::debug!(export = name, "optional guest export missing");
            }
        }
        Ok(exports)
    }
}

/// What one [`Session::pump`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Input events delivered or dropped
    pub events: usize,
    /// Guest timer callbacks run
    pub ticks: usize,
    /// Whether a frame was drawn (or attempted)
    pub frame: bool,
    /// Guest entry calls that trapped
    pub aborted: usize,
}

/// A booted guest driven by the host loop.
pub struct Session<B: GraphicsBackend + 'static> {
    store: Store<BridgeState<B>>,
    exports: GuestExports,
    clock: SharedClock,
    frames: FrameScheduler,
    frame_stats: FrameStats,
    events: VecDeque<InputEvent>,
    viewport: Viewport,
    input_suppressed: bool,
    aborted_calls: u64,
    payload_ptr: u32,
    /// Fuel granted to each guest entry call
    fuel_per_call: Option<u64>,
}

/// Top up the store to `fuel` before the next guest entry call.
fn refuel<B: GraphicsBackend + 'static>(store: &mut Store<BridgeState<B>>, fuel: Option<u64>) -> Result<()> {
    if let Some(fuel) = fuel {
        store
            .set_fuel(fuel)
            .map_err(|e| BridgeError::Wasm(format!("fuel setup failed: {}", e)))?;
    }
    Ok(())
}

impl<B: GraphicsBackend + 'static> Session<B> {
    pub(crate) fn start(
        mut store: Store<BridgeState<B>>,
        instance: Instance,
        clock: SharedClock,
        config: &BridgeConfig,
        payload: &[u8],
    ) -> Result<Self> {
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| BridgeError::MissingExport("memory".to_string()))?;
        let abi = GuestAbi {
            memory,
            strlen: required(&instance, &mut store, "strlen")?,
            malloc: required(&instance, &mut store, "malloc")?,
        };
        store.data_mut().abi = Some(abi);
        let exports = GuestExports::resolve(&instance, &mut store)?;

        let len = u32::try_from(payload.len())
            .map_err(|_| BridgeError::Config(format!("payload of {} bytes does not fit guest memory", payload.len())))?;
        refuel(&mut store, config.fuel_limit)?;
        let ptr = store.malloc(len)?;
        {
            let (arena, _) = store.split()?;
            view_mut(arena, ptr, len)?.copy_from(payload)?;
        }
        refuel(&mut store, config.fuel_limit)?;
        exports
            .init
            .call(&mut store, (ptr as i32, len as i32))
            .map_err(|e| BridgeError::Wasm(format!("guest init failed: {:#}", e)))?;

        let viewport = config.viewport;
        refuel(&mut store, config.fuel_limit)?;
        exports
            .resize
            .call(&mut store, (viewport.width, viewport.height))
            .map_err(|e| BridgeError::Wasm(format!("guest resize failed: {:#}", e)))?;

        let mut frames = FrameScheduler::new(config.refresh_hz);
        frames.start(clock.now(), viewport);
        tracing::info!(
            width = viewport.width,
            height = viewport.height,
            refresh_hz = config.refresh_hz,
            "session started"
        );

        Ok(Self {
            store,
            exports,
            clock,
            frames,
            frame_stats: FrameStats::new(),
            events: VecDeque::new(),
            viewport,
            input_suppressed: false,
            aborted_calls: 0,
            payload_ptr: ptr,
            fuel_per_call: config.fuel_limit,
        })
    }

    /// Queue an input event for the next pump.
    pub fn push_event(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    /// Change the drawable size. Applied before the next frame's `draw`.
    pub fn set_viewport(&mut self, width: i32, height: i32) {
        self.viewport = Viewport::new(width, height);
    }

    /// Drop keyboard events while host menus have focus. Pointer events still pass.
    pub fn set_input_suppressed(&mut self, suppressed: bool) {
        self.input_suppressed = suppressed;
    }

    /// Stop scheduling frames. Timers keep running.
    pub fn stop_frames(&mut self) {
        self.frames.stop();
    }

    /// Deliver queued input, run due timers, then draw if a frame is due.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();

        while let Some(event) = self.events.pop_front() {
            report.events += 1;
            if !self.deliver(event) {
                report.aborted += 1;
            }
        }

        loop {
            let now = self.clock.now();
            let Some(fired) = self.store.data_mut().context.timers.pop_due(now) else {
                break;
            };
            match fired {
                Fired::Guest { token, func, arg, .. } => {
                    self.store.data_mut().context.ticks.record(now);
                    report.ticks += 1;
                    tracing::trace!(token, func, arg, "tick");
                    let result = self.refuel().and_then(|_| self.exports.call.call(&mut self.store, (func, arg)));
                    if !self.settle("call", result) {
                        report.aborted += 1;
                    }
                }
                Fired::Probe { report: Some(measured), .. } => {
                    self.store.data_mut().context.record_clock_report(measured);
                }
                Fired::Probe { report: None, .. } => {}
            }
        }

        if let Some(frame) = self.frames.begin(self.clock.now(), self.viewport) {
            report.frame = true;
            let started = Instant::now();
            let mut ok = true;
            if let Some(size) = frame.resized {
                tracing::debug!(width = size.width, height = size.height, "viewport resized");
                self.store
                    .data_mut()
                    .context
                    .backend
                    .viewport(0, 0, size.width, size.height);
                let result = self
                    .refuel()
                    .and_then(|_| self.exports.resize.call(&mut self.store, (size.width, size.height)));
                ok = self.settle("resize", result);
            }
            if ok {
                let result = self.refuel().and_then(|_| self.exports.draw.call(&mut self.store, ()));
                ok = self.settle("draw", result);
            }
            if ok {
                self.frame_stats.record(started.elapsed().as_micros() as u64);
            } else {
                self.frame_stats.record_aborted();
                report.aborted += 1;
            }
            self.frames.finish(self.clock.now());
        }

        report
    }

    /// Pump until the session clock reaches `deadline`, sleeping between wakeups.
    pub fn run_until(&mut self, deadline: Duration) -> PumpReport {
        let mut total = PumpReport::default();
        loop {
            let step = self.pump();
            total.events += step.events;
            total.ticks += step.ticks;
            total.frame |= step.frame;
            total.aborted += step.aborted;

            if self.clock.now() >= deadline {
                break;
            }
            let next = self.next_wake().map_or(deadline, |t| t.min(deadline));
            self.clock.sleep_until(next);
        }
        total
    }

    /// Pump until `count` more frames have been drawn.
    pub fn run_frames(&mut self, count: u64) -> PumpReport {
        let target = self.frames.frames() + count;
        let mut total = PumpReport::default();
        while self.frames.frames() < target {
            let step = self.pump();
            total.events += step.events;
            total.ticks += step.ticks;
            total.frame |= step.frame;
            total.aborted += step.aborted;
            if self.frames.frames() >= target {
                break;
            }
            let Some(next) = self.next_wake() else {
                break;
            };
            self.clock.sleep_until(next);
        }
        total
    }

    /// Earliest time anything is scheduled.
    pub fn next_wake(&mut self) -> Option<Duration> {
        let timer = self.store.data_mut().context.timers.next_deadline();
        match (self.frames.due(), timer) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Ask the guest to serialize the current design.
    pub fn export_design(&mut self, user: &str, name: &str, description: &str) -> Result<String> {
        let export = self
            .exports
            .export
            .clone()
            .ok_or_else(|| BridgeError::MissingExport("export".to_string()))?;
        refuel(&mut self.store, self.fuel_per_call)?;
        let user = encode_into_guest(&mut self.store, user)?;
        let name = encode_into_guest(&mut self.store, name)?;
        let description = encode_into_guest(&mut self.store, description)?;
        refuel(&mut self.store, self.fuel_per_call)?;
        let xml = export
            .call(&mut self.store, (user as i32, name as i32, description as i32))
            .map_err(|e| BridgeError::guest_call("export", format!("{:#}", e)))?;
        decode_cstring(&mut self.store, xml as u32)
    }

    /// Copy bytes out of guest memory.
    pub fn read_guest_memory(&mut self, offset: u32, len: u32) -> Result<Vec<u8>> {
        Ok(view(self.store.arena()?, offset, len)?.bytes().to_vec())
    }

    /// Copy bytes into guest memory.
    pub fn write_guest_memory(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len()).map_err(|_| BridgeError::OutOfBounds {
            offset: u64::from(offset),
            len: data.len() as u64,
            arena_len: u32::MAX as usize,
        })?;
        let (arena, _) = self.store.split()?;
        view_mut(arena, offset, len)?.copy_from(data)
    }

    /// Current guest memory size in bytes.
    pub fn memory_size(&mut self) -> Result<usize> {
        Ok(self.store.arena()?.len())
    }

    /// Where the payload was copied at boot.
    pub fn payload_ptr(&self) -> u32 {
        self.payload_ptr
    }

    /// The bridge context.
    pub fn context(&self) -> &BridgeContext<B> {
        &self.store.data().context
    }

    /// The graphics backend.
    pub fn backend(&self) -> &B {
        self.context().backend()
    }

    /// The graphics backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        self.store.data_mut().context.backend_mut()
    }

    /// Guest console history.
    pub fn console(&self) -> &GuestConsole {
        self.context().console()
    }

    /// Draw cost statistics.
    pub fn frame_stats(&self) -> &FrameStats {
        &self.frame_stats
    }

    /// Frames begun so far.
    pub fn frames(&self) -> u64 {
        self.frames.frames()
    }

    /// Achieved guest tick rate.
    pub fn tick_rate_hz(&self) -> Option<f64> {
        self.context().tick_rate_hz()
    }

    /// Completed clock probe reports.
    pub fn clock_reports(&self) -> &[ClockReport] {
        self.context().clock_reports()
    }

    /// Handles issued so far.
    pub fn handles_issued(&self) -> usize {
        self.context().objects().issued()
    }

    /// Handles whose object was deleted.
    pub fn handles_dead(&self) -> usize {
        self.context().objects().dead()
    }

    /// Guest entry calls that trapped since boot.
    pub fn aborted_calls(&self) -> u64 {
        self.aborted_calls
    }

    /// Current viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Session clock.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Fuel left from the last entry call's budget (if fuel metering enabled).
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    /// Fuel granted to each guest entry call.
    pub fn fuel_per_call(&self) -> Option<u64> {
        self.fuel_per_call
    }

    fn refuel(&mut self) -> wasmtime::Result<()> {
        refuel(&mut self.store, self.fuel_per_call)?;
        Ok(())
    }

    fn deliver(&mut self, event: InputEvent) -> bool {
        if self.input_suppressed && event.is_key() {
            tracing::debug!(?event, "key event dropped while input is suppressed");
            return true;
        }
        let input = event.guest_call();
        if let Err(err) = self.refuel() {
            return self.settle(input.export_name(), Err(err));
        }
        let store = &mut self.store;
        let exports = &self.exports;
        let result = match input {
            GuestInput::KeyDown(code) => exports.key_down.as_ref().map(|f| f.call(&mut *store, code)),
            GuestInput::KeyUp(code) => exports.key_up.as_ref().map(|f| f.call(&mut *store, code)),
            GuestInput::ButtonDown(code) => exports.button_down.as_ref().map(|f| f.call(&mut *store, code)),
            GuestInput::ButtonUp(code) => exports.button_up.as_ref().map(|f| f.call(&mut *store, code)),
            GuestInput::Move(x, y) => exports.mouse_move.as_ref().map(|f| f.call(&mut *store, (x, y))),
            GuestInput::Scroll(steps) => exports.scroll.as_ref().map(|f| f.call(&mut *store, steps)),
        };
        match result {
            Some(result) => self.settle(input.export_name(), result),
            None => {
                tracing::debug!(export = input.export_name(), "guest has no handler for event");
                true
            }
        }
    }

    fn settle(&mut self, export: &'static str, result: wasmtime::Result<()>) -> bool {
        let Err(err) = result else {
            return true;
        };
        self.aborted_calls += 1;
        match err.downcast_ref::<BridgeError>() {
            Some(bridge) => tracing::error!(export, error = %bridge, "guest call aborted"),
            None => tracing::error!(export, "guest trapped: {:#}", err),
        }
        false
    }
}
