use callscope_events::{Event, EventKind, EventListener};
use callscope_graph::ClassvizManager;
use callscope_store::DataStore;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of one autoplay step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackTick {
    Advanced { thread: String, index: usize },
    /// The cursor was already at the end; playback has stopped.
    Completed { thread: String },
    /// Nothing is playing.
    Idle,
}

/// Playback cursor over each thread's inserted methods, in call order.
///
/// The cursor itself lives in the diagram's thread manager; this controller
/// moves it, recolors the diagram while step-by-step mode is on and owns the
/// single autoplay slot.
pub struct StepByStepPlayController {
    store: Rc<DataStore>,
    classviz: Rc<RefCell<ClassvizManager>>,
    enabled: bool,
    /// Thread whose cursor was last moved; the one shown in color.
    active_thread: Option<String>,
    playing: Option<String>,
    interval: Duration,
}

impl StepByStepPlayController {
    pub const LISTENED_KINDS: [EventKind; 2] = [
        EventKind::SwitchStepByStepMode,
        EventKind::RefreshRegionFocus,
    ];

    pub fn new(
        store: Rc<DataStore>,
        classviz: Rc<RefCell<ClassvizManager>>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            classviz,
            enabled: false,
            active_thread: None,
            playing: None,
            interval,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning the mode off restores every diagram node's own color and
    /// stops autoplay.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.enabled == enabled {
            return false;
        }
        self.enabled = enabled;
        if enabled {
            self.recolor();
        } else {
            self.stop_autoplay();
            self.classviz.borrow_mut().restore_colors();
        }
        tracing::debug!(enabled, "Step-by-step mode switched");
        true
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// The thread shown in color: the last one stepped, else the store's.
    pub fn active_thread(&self) -> Option<String> {
        self.active_thread
            .clone()
            .or_else(|| self.store.current_thread())
    }

    pub fn current_index(&self, thread: &str) -> Option<usize> {
        self.classviz.borrow().current_index(thread)
    }

    pub fn max_index(&self, thread: &str) -> Option<usize> {
        self.classviz.borrow().max_index(thread)
    }

    // ------------------------------------------------------------------
    // Cursor moves. Each returns whether the cursor moved; moves past
    // either end are no-ops.
    // ------------------------------------------------------------------

    pub fn skip_to_start(&mut self, thread: &str) -> bool {
        self.move_cursor(thread, |_, _| 0)
    }

    pub fn step_back(&mut self, thread: &str) -> bool {
        self.move_cursor(thread, |current, _| current.saturating_sub(1))
    }

    pub fn step_forward(&mut self, thread: &str) -> bool {
        self.move_cursor(thread, |current, max| (current + 1).min(max))
    }

    pub fn skip_to_end(&mut self, thread: &str) -> bool {
        self.move_cursor(thread, |_, max| max)
    }

    /// Absolute slider position, clamped to the last entry.
    pub fn set_index(&mut self, thread: &str, index: usize) -> bool {
        self.move_cursor(thread, |_, max| index.min(max))
    }

    fn move_cursor(&mut self, thread: &str, target: impl FnOnce(usize, usize) -> usize) -> bool {
        let (current, max) = {
            let classviz = self.classviz.borrow();
            match (classviz.current_index(thread), classviz.max_index(thread)) {
                (Some(current), Some(max)) => (current, max),
                _ => {
                    tracing::debug!(thread, "No inserted methods to step through");
                    return false;
                }
            }
        };

        let next = target(current, max);
        if next == current {
            return false;
        }
        if !self.classviz.borrow_mut().set_current_index(thread, next) {
            tracing::warn!(thread, index = next, "Cursor rejected by thread manager");
            return false;
        }
        self.active_thread = Some(thread.to_string());
        self.recolor();
        true
    }

    /// Repaint the active thread for its cursor. No-op while disabled.
    fn recolor(&mut self) {
        if !self.enabled {
            return;
        }
        let Some(thread) = self.active_thread() else {
            return;
        };
        let mut classviz = self.classviz.borrow_mut();
        classviz.restore_colors();
        let painted = classviz.color_step(&thread);
        tracing::trace!(thread = %thread, painted, "Step colors applied");
    }

    // ------------------------------------------------------------------
    // Autoplay
    // ------------------------------------------------------------------

    pub fn playing(&self) -> Option<&str> {
        self.playing.as_deref()
    }

    /// Start playing `thread`, stopping any other playback. A cursor sitting
    /// on the last entry rewinds to the start first.
    pub fn start_autoplay(&mut self, thread: &str) -> bool {
        let Some(max) = self.max_index(thread) else {
            tracing::debug!(thread, "Nothing to play");
            return false;
        };
        if let Some(previous) = self.playing.take()
            && previous != thread
        {
            tracing::debug!(stopped = %previous, started = thread, "Autoplay handed over");
        }
        if self.current_index(thread) == Some(max) {
            self.skip_to_start(thread);
        }
        self.active_thread = Some(thread.to_string());
        self.playing = Some(thread.to_string());
        true
    }

    pub fn stop_autoplay(&mut self) -> bool {
        self.playing.take().is_some()
    }

    /// Advance the playing thread by one entry. Reaching past the end stops
    /// playback and reports completion.
    pub fn tick(&mut self) -> PlaybackTick {
        let Some(thread) = self.playing.clone() else {
            return PlaybackTick::Idle;
        };
        if self.step_forward(&thread) {
            let index = self.current_index(&thread).unwrap_or_default();
            PlaybackTick::Advanced { thread, index }
        } else {
            self.playing = None;
            tracing::debug!(thread = %thread, "Autoplay completed");
            PlaybackTick::Completed { thread }
        }
    }
}

/// Drive `controller` on its interval until playback completes, stops or
/// `cancel` fires. Returns the last tick.
pub async fn run_autoplay(
    controller: &RefCell<StepByStepPlayController>,
    cancel: CancellationToken,
) -> PlaybackTick {
    let period = controller.borrow().interval.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                controller.borrow_mut().stop_autoplay();
                return PlaybackTick::Idle;
            }
            _ = interval.tick() => {}
        }
        let tick = controller.borrow_mut().tick();
        if !matches!(tick, PlaybackTick::Advanced { .. }) {
            return tick;
        }
    }
}

impl EventListener for StepByStepPlayController {
    fn handle_event(&mut self, event: &Event) -> Vec<Event> {
        match event {
            Event::SwitchStepByStepMode { flag } => {
                self.set_enabled(*flag);
            }
            Event::RefreshRegionFocus {
                stop_step_by_step_mode: true,
            } => {
                self.set_enabled(false);
                self.stop_autoplay();
            }
            Event::RefreshRegionFocus {
                stop_step_by_step_mode: false,
            } => self.recolor(),
            _ => {}
        }
        Vec::new()
    }
}
