//! Per-device input workers and the coordinating frame loop.
//!
//! Each paired device gets a worker on tokio's blocking pool that turns raw
//! events into registry calls. Clicks in the control band are forwarded to
//! the [`Coordinator`], which owns the command dispatcher, the composition
//! engine and the frame cadence.

use sharedcanvas_common::{tracing, Frame, Point, Tool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandDispatcher, HeaderLayout};
use crate::compositor::CompositionEngine;
use crate::config::CanvasConfig;
use crate::input::{Axis, EventSource, RawEvent, SourcePoll};
use crate::registry::DeviceRegistry;

/// Cooperative cancellation flag shared by every worker and the coordinator
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outer lock serializing worker updates against whole render passes
#[derive(Debug, Clone, Default)]
pub struct DrawLock(Arc<Mutex<()>>);

impl DrawLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Button-down inside the control band
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub device_id: String,
    pub position: Point,
}

/// Who a worker pairs as
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Input node path, used as the registry key
    pub id: String,
    /// Name reported by the device, decides privilege
    pub name: String,
    pub owner: String,
}

/// Tuning shared by every worker
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub poll_interval: Duration,
    pub max_motion_delta: i32,
    pub header_height: i32,
}

impl RouterSettings {
    pub fn from_config(config: &CanvasConfig) -> Self {
        Self {
            poll_interval: config.devices.poll_interval(),
            max_motion_delta: config.drawing.max_motion_delta,
            header_height: config.canvas.header_height,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from_config(&CanvasConfig::default())
    }
}

/// Handles every worker needs
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<DeviceRegistry>,
    pub draw_lock: DrawLock,
    pub clicks: mpsc::UnboundedSender<ClickEvent>,
    pub shutdown: ShutdownSignal,
    pub settings: RouterSettings,
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Cancelled,
    SourceEnded,
    ReadFailed,
    PairingRejected,
}

/// Unpairs the device when the worker leaves, including by panic
struct PairGuard<'a> {
    registry: &'a DeviceRegistry,
    id: &'a str,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        self.registry.unpair(self.id);
    }
}

/// Event handling state of one device
pub struct DeviceWorker {
    id: String,
    ctx: WorkerContext,
    position: Point,
    pressed: bool,
}

impl DeviceWorker {
    pub fn new(id: &str, ctx: WorkerContext) -> Self {
        let position = ctx.registry.position(id).unwrap_or_else(|| ctx.registry.bounds().center());
        Self {
            id: id.to_string(),
            ctx,
            position,
            pressed: false,
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn handle_event(&mut self, event: RawEvent) {
        match event {
            RawEvent::Button { pressed } => self.handle_button(pressed),
            RawEvent::Motion { axis, delta } => self.handle_motion(axis, delta),
        }
    }

    fn handle_button(&mut self, pressed: bool) {
        let registry = &self.ctx.registry;

        if pressed && !self.pressed && self.position.y < self.ctx.settings.header_height {
            let click = ClickEvent { device_id: self.id.clone(), position: self.position };
            if self.ctx.clicks.send(click).is_err() {
                debug!("Coordinator gone, dropping click from {}", self.id);
            }
        }
        self.pressed = pressed;

        if !pressed && !registry.get_current_line(&self.id).is_empty() {
            let _draw = self.ctx.draw_lock.lock();
            registry.commit_line(&self.id);
            registry.clear_current_line(&self.id);
        }
    }

    fn handle_motion(&mut self, axis: Axis, delta: i32) {
        let settings = self.ctx.settings;
        let delta = if self.pressed {
            delta.clamp(-settings.max_motion_delta, settings.max_motion_delta)
        } else {
            delta
        };

        let mut target = self.position;
        match axis {
            Axis::X => target.x = target.x.saturating_add(delta),
            Axis::Y => target.y = target.y.saturating_add(delta),
        }

        let registry = &self.ctx.registry;
        {
            let _draw = self.ctx.draw_lock.lock();
            self.position = registry.set_position(&self.id, target).unwrap_or(target);
        }

        if self.pressed && self.position.y >= settings.header_height {
            let _draw = self.ctx.draw_lock.lock();
            if registry.tool(&self.id) == Some(Tool::Eraser) {
                registry.erase(&self.id, self.position);
            } else {
                registry.add_to_current_line(&self.id, self.position);
            }
        }
    }
}

/// Pair the device and pump its events until shutdown or source failure
pub fn run_worker<S: EventSource>(identity: DeviceIdentity, mut source: S, ctx: WorkerContext) -> WorkerExit {
    let registry = Arc::clone(&ctx.registry);
    if !registry.pair(&identity.id, &identity.name, &identity.owner) {
        error!("Failed to pair device {}", identity.id);
        return WorkerExit::PairingRejected;
    }
    let _guard = PairGuard { registry: &registry, id: &identity.id };

    let poll_interval = ctx.settings.poll_interval;
    let shutdown = ctx.shutdown.clone();
    let mut worker = DeviceWorker::new(&identity.id, ctx);
    info!("Worker started for {} ({})", identity.name, identity.id);

    loop {
        if shutdown.is_triggered() {
            info!("Worker for {} stopping on shutdown", identity.id);
            return WorkerExit::Cancelled;
        }

        match source.poll_event(poll_interval) {
            Ok(SourcePoll::Event(event)) => worker.handle_event(event),
            Ok(SourcePoll::Idle) => {}
            Ok(SourcePoll::Closed) => {
                warn!("Device {} disconnected", identity.id);
                return WorkerExit::SourceEnded;
            }
            Err(e) => {
                error!("Error reading events from {}: {}", identity.id, e);
                return WorkerExit::ReadFailed;
            }
        }
    }
}

/// Run a worker on the blocking pool
pub fn spawn_worker<S>(identity: DeviceIdentity, source: S, ctx: WorkerContext) -> JoinHandle<WorkerExit>
where
    S: EventSource + 'static,
{
    tokio::task::spawn_blocking(move || run_worker(identity, source, ctx))
}

/// The daemon's running workers
///
/// Dropping the set triggers shutdown, so an early return from the daemon
/// never leaves blocking workers polling while the runtime waits on them.
pub struct WorkerSet {
    ctx: WorkerContext,
    handles: Vec<(String, JoinHandle<WorkerExit>)>,
}

impl WorkerSet {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx, handles: Vec::new() }
    }

    pub fn spawn<S>(&mut self, identity: DeviceIdentity, source: S)
    where
        S: EventSource + 'static,
    {
        let id = identity.id.clone();
        self.handles.push((id, spawn_worker(identity, source, self.ctx.clone())));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Trigger shutdown and wait for every worker to leave
    pub async fn shutdown(mut self) -> Vec<(String, WorkerExit)> {
        self.ctx.shutdown.trigger();

        let mut exits = Vec::with_capacity(self.handles.len());
        for (id, handle) in std::mem::take(&mut self.handles) {
            match handle.await {
                Ok(exit) => {
                    info!("Worker for {} finished: {:?}", id, exit);
                    exits.push((id, exit));
                }
                Err(e) => error!("Worker for {} panicked: {}", id, e),
            }
        }
        exits
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        self.ctx.shutdown.trigger();
    }
}

/// Owns dispatch, composition and frame publication
pub struct Coordinator {
    registry: Arc<DeviceRegistry>,
    draw_lock: DrawLock,
    engine: CompositionEngine,
    dispatcher: CommandDispatcher,
    clicks: mpsc::UnboundedReceiver<ClickEvent>,
    frames: watch::Sender<Arc<Frame>>,
    frame_interval: Duration,
}

impl Coordinator {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        draw_lock: DrawLock,
        engine: CompositionEngine,
        dispatcher: CommandDispatcher,
        clicks: mpsc::UnboundedReceiver<ClickEvent>,
        frame_interval: Duration,
    ) -> Self {
        let (frames, _) = watch::channel(Arc::new(Frame::default()));
        Self {
            registry,
            draw_lock,
            engine,
            dispatcher,
            clicks,
            frames,
            frame_interval,
        }
    }

    pub fn from_config(
        config: &CanvasConfig,
        registry: Arc<DeviceRegistry>,
        draw_lock: DrawLock,
        clicks: mpsc::UnboundedReceiver<ClickEvent>,
    ) -> Self {
        let header_height = config.canvas.header_height;
        let engine = CompositionEngine::new(config.rendering.refresh_interval(), header_height);
        let layout = HeaderLayout::from_settings(&config.header, header_height);
        let dispatcher = CommandDispatcher::new(layout, config.header.debounce(), config.drawing.default_size);
        Self::new(registry, draw_lock, engine, dispatcher, clicks, config.rendering.frame_interval())
    }

    /// Receiver that always holds the latest published frame
    pub fn subscribe(&self) -> watch::Receiver<Arc<Frame>> {
        self.frames.subscribe()
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// One display frame: dispatch pending clicks, recompose, publish
    pub fn tick(&mut self) -> Arc<Frame> {
        while let Ok(click) = self.clicks.try_recv() {
            info!("Header click event received at {} from {}", click.position, click.device_id);
            self.dispatcher.handle_click(click.position, &click.device_id, &self.registry);
        }

        let frame = {
            let _draw = self.draw_lock.lock();
            self.engine.refresh(&self.registry);

            let cursors = self.registry.cursors();
            let positions: Vec<Point> = cursors.iter().map(|c| c.position).collect();
            let palette_visible = self.dispatcher.palette_visible();

            Arc::new(Frame {
                sequence: self.engine.sequence(),
                drawables: self.engine.drawables().to_vec(),
                hovered: self.dispatcher.layout().hovered(&positions, palette_visible),
                cursors,
                palette_visible,
            })
        };

        self.frames.send_replace(Arc::clone(&frame));
        frame
    }

    /// Tick at the frame rate until shutdown
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        let mut interval = tokio::time::interval(self.frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Coordinator running at {:?} per frame", self.frame_interval);

        loop {
            interval.tick().await;
            if shutdown.is_triggered() {
                break;
            }
            self.tick();
        }

        info!("Coordinator stopped after {} composition passes", self.engine.sequence());
    }
}
