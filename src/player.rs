// src/player.rs
//
// Session lifecycle coordinator.
//
// Single authority over "what is currently playing". Concurrent start and
// stop requests serialize through the generation counter: every scheduled
// task re-validates its generation on delivery and is a no-op once a newer
// play or stop has landed.

use log::{debug, info, warn};

use crate::backend::SynthBackend;
use crate::disposal::{DISPOSE_GRACE, DisposalQueue, RetiredResources};
use crate::event::NoteEvent;
use crate::instrument::InstrumentMap;
use crate::scheduler::EventScheduler;
use crate::transport::{Generation, Task, TimerHandle, Transport};

/// Seconds over which a stopped session's bus ramps to silence. Not
/// instantaneous, so stopping does not click.
pub const STOP_RAMP: f64 = 0.08;

/// Output bus gain for a new session.
pub const MASTER_GAIN: f64 = 0.85;

/// Session lifecycle, as observable from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    Idle,
    /// A play call is awaiting device readiness.
    Starting,
    Playing,
}

/// Options for one play call.
#[derive(Default)]
pub struct PlayOptions {
    /// Invoked exactly once if the session ends naturally, or immediately
    /// if the device never becomes ready. Never invoked for superseded or
    /// explicitly stopped sessions.
    pub on_finish: Option<Box<dyn FnOnce()>>,
}

struct PendingStart {
    generation: Generation,
    events: Vec<NoteEvent>,
    instruments: InstrumentMap,
    on_finish: Option<Box<dyn FnOnce()>>,
}

struct ActiveSession {
    generation: Generation,
    scheduler: EventScheduler,
    bus: crate::backend::BusId,
    handles: Vec<TimerHandle>,
    on_finish: Option<Box<dyn FnOnce()>>,
}

/// Orchestrates playback attempts end to end: readiness gating, session
/// construction, event scheduling, cancellation, and retirement.
///
/// All scheduling runs on the transport's single cooperative timeline;
/// the host feeds delivered tasks back in through `handle_task`.
pub struct Player {
    generation: Generation,
    pending: Option<PendingStart>,
    current: Option<ActiveSession>,
    disposal: DisposalQueue,
}

impl Player {
    pub fn new() -> Self {
        Self {
            generation: 0,
            pending: None,
            current: None,
            disposal: DisposalQueue::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn phase(&self) -> PlayerPhase {
        if self.current.is_some() {
            PlayerPhase::Playing
        } else if self.pending.is_some() {
            PlayerPhase::Starting
        } else {
            PlayerPhase::Idle
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Batches still waiting out their disposal grace period.
    pub fn pending_disposals(&self) -> usize {
        self.disposal.pending_batches()
    }

    /// Start playing a piece, superseding whatever was playing before.
    ///
    /// The previous session (pending or live) is retired immediately and
    /// its completion callback permanently silenced. The new session only
    /// materializes once the device reports ready; if a newer play or
    /// stop lands first, this attempt creates nothing and fires nothing.
    ///
    /// Never returns an error; all failure is absorbed or reported
    /// through the completion callback.
    pub fn play(
        &mut self,
        transport: &mut dyn Transport,
        backend: &mut dyn SynthBackend,
        events: Vec<NoteEvent>,
        instruments: InstrumentMap,
        options: PlayOptions,
    ) {
        self.generation += 1;
        let generation = self.generation;
        info!("play: generation {generation}, {} events", events.len());

        self.retire_current(transport, backend);
        self.pending = Some(PendingStart {
            generation,
            events,
            instruments,
            on_finish: options.on_finish,
        });

        // The single asynchronous suspension point: resolution arrives
        // later as Task::DeviceReady.
        transport.ensure_ready(generation);
    }

    /// Stop playback. Invalidation is immediate (the generation bump);
    /// the silence ramp and disposal are deferred. A stop with nothing
    /// playing is a no-op beyond the bump.
    pub fn stop(&mut self, transport: &mut dyn Transport, backend: &mut dyn SynthBackend) {
        self.generation += 1;
        info!("stop: generation {}", self.generation);
        self.pending = None;
        self.retire_current(transport, backend);
    }

    /// Feed one delivered transport task back into the player.
    pub fn handle_task(
        &mut self,
        transport: &mut dyn Transport,
        backend: &mut dyn SynthBackend,
        task: Task,
    ) {
        match task {
            Task::DeviceReady { token, ok } => self.on_device_ready(transport, backend, token, ok),
            Task::FireEvent { generation, index } => {
                if generation != self.generation {
                    debug!("dropping stale event fire (generation {generation})");
                    return;
                }
                if let Some(session) = self.current.as_mut() {
                    session.scheduler.fire(backend, index);
                }
            }
            Task::FinishSession { generation } => {
                self.on_finish_session(transport, backend, generation)
            }
            Task::FlushRetired { batch } => self.disposal.flush(backend, batch),
        }
    }

    /// Convenience pump for hosts driving a `VirtualTransport`: deliver
    /// every task due up to `until`, in order.
    pub fn pump(
        &mut self,
        transport: &mut crate::transport::VirtualTransport,
        backend: &mut dyn SynthBackend,
        until: f64,
    ) {
        while let Some(task) = transport.pop_due(until) {
            self.handle_task(transport, backend, task);
        }
    }

    fn on_device_ready(
        &mut self,
        transport: &mut dyn Transport,
        backend: &mut dyn SynthBackend,
        token: Generation,
        ok: bool,
    ) {
        if token != self.generation {
            // Superseded while awaiting readiness: no instruments, no
            // callback, nothing to clean up.
            debug!("dropping stale readiness for generation {token}");
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        debug_assert_eq!(pending.generation, token);

        if !ok {
            warn!("audio device failed to become ready; aborting play");
            if let Some(on_finish) = pending.on_finish {
                on_finish();
            }
            return;
        }

        let bus = backend.create_bus(MASTER_GAIN);
        let scheduler =
            EventScheduler::new(pending.events, pending.instruments, bus, transport.now());
        let handles = scheduler.register(transport, token);
        info!(
            "generation {token} playing: piece ends at +{:.3}s",
            scheduler.end_time()
        );

        self.current = Some(ActiveSession {
            generation: token,
            scheduler,
            bus,
            handles,
            on_finish: pending.on_finish,
        });
    }

    fn on_finish_session(
        &mut self,
        transport: &mut dyn Transport,
        backend: &mut dyn SynthBackend,
        generation: Generation,
    ) {
        if generation != self.generation {
            return;
        }
        let on_finish = match self.current.as_mut() {
            Some(session) if session.generation == generation => session.on_finish.take(),
            _ => None,
        };
        self.retire_current(transport, backend);
        info!("generation {generation} finished naturally");
        if let Some(on_finish) = on_finish {
            on_finish();
        }
    }

    /// Move the live session (if any) toward disposal: ramp its bus to
    /// silence, cancel outstanding timers, and park its resources for the
    /// grace period. Does not touch the session's completion callback.
    fn retire_current(&mut self, transport: &mut dyn Transport, backend: &mut dyn SynthBackend) {
        let Some(session) = self.current.take() else {
            return;
        };
        backend.ramp_bus(session.bus, 0.0, STOP_RAMP);
        for handle in session.handles {
            transport.cancel(handle);
        }
        let (nodes, bus) = session.scheduler.into_retired();
        self.disposal.retire(
            transport,
            RetiredResources {
                nodes,
                buses: vec![bus],
            },
            DISPOSE_GRACE,
        );
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}
