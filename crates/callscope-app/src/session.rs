use crate::selection::SelectionManager;
use crate::settings::Settings;
use crate::step::{PlaybackTick, StepByStepPlayController, run_autoplay};
use crate::views::{FlameGraphView, TreeListView};
use callscope_core::{CoreError, TraceInput};
use callscope_events::{Event, EventBus, Subscription};
use callscope_explain::{
    Explainer, ExplanationService, HttpExplanationService, ProviderConfig, ServiceError,
    explain_selection,
};
use callscope_graph::ClassvizManager;
use callscope_store::DataStore;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One loaded trace with every component wired to a private bus.
///
/// Components are subscribed in a fixed order, so on a shared event the
/// diagram reacts before playback, playback before the views and the views
/// before the explainer. Sessions share nothing.
pub struct Session {
    store: Rc<DataStore>,
    classviz: Rc<RefCell<ClassvizManager>>,
    step: Rc<RefCell<StepByStepPlayController>>,
    selection: Rc<SelectionManager>,
    flame_graph: Rc<RefCell<FlameGraphView>>,
    tree_list: Rc<RefCell<TreeListView>>,
    explainer: Rc<RefCell<Explainer>>,
    settings: Settings,
    subscriptions: Vec<Subscription>,
}

impl Session {
    pub fn new(input: TraceInput, settings: Settings) -> Self {
        let bus = EventBus::new();
        let store = Rc::new(DataStore::new(bus.clone(), input));

        let classviz = Rc::new(RefCell::new(ClassvizManager::new(
            Rc::clone(&store),
            settings.classviz.clone(),
        )));
        let step = Rc::new(RefCell::new(StepByStepPlayController::new(
            Rc::clone(&store),
            Rc::clone(&classviz),
            Duration::from_millis(settings.playback.autoplay_interval_ms),
        )));
        let selection = Rc::new(SelectionManager::new(Rc::clone(&store)));
        let flame_graph = Rc::new(RefCell::new(FlameGraphView::new(
            Rc::clone(&store),
            Rc::clone(&selection),
        )));
        let tree_list = Rc::new(RefCell::new(TreeListView::new(Rc::clone(&store))));
        let explainer = Rc::new(RefCell::new(Explainer::new(
            Rc::clone(&store),
            settings.explainer.clone(),
        )));

        let mut subscriptions = Vec::new();
        subscriptions.extend(bus.attach(&classviz, &ClassvizManager::LISTENED_KINDS));
        subscriptions.extend(bus.attach(&step, &StepByStepPlayController::LISTENED_KINDS));
        subscriptions.extend(bus.attach(&flame_graph, &FlameGraphView::LISTENED_KINDS));
        subscriptions.extend(bus.attach(&tree_list, &TreeListView::LISTENED_KINDS));
        subscriptions.extend(bus.attach(&explainer, &Explainer::LISTENED_KINDS));

        tracing::info!(
            threads = store.thread_names().len(),
            current = ?store.current_thread(),
            subscriptions = subscriptions.len(),
            "Session started"
        );

        Self {
            store,
            classviz,
            step,
            selection,
            flame_graph,
            tree_list,
            explainer,
            settings,
            subscriptions,
        }
    }

    /// Read a trace file and start a session over it.
    pub fn open(path: impl AsRef<Path>, settings: Settings) -> Result<Self, CoreError> {
        let input = TraceInput::load(path)?;
        Ok(Self::new(input, settings))
    }

    pub fn bus(&self) -> &EventBus {
        self.store.bus()
    }

    pub fn store(&self) -> &Rc<DataStore> {
        &self.store
    }

    pub fn classviz(&self) -> &Rc<RefCell<ClassvizManager>> {
        &self.classviz
    }

    pub fn step(&self) -> &Rc<RefCell<StepByStepPlayController>> {
        &self.step
    }

    pub fn selection(&self) -> &Rc<SelectionManager> {
        &self.selection
    }

    pub fn flame_graph(&self) -> &Rc<RefCell<FlameGraphView>> {
        &self.flame_graph
    }

    pub fn tree_list(&self) -> &Rc<RefCell<TreeListView>> {
        &self.tree_list
    }

    pub fn explainer(&self) -> &Rc<RefCell<Explainer>> {
        &self.explainer
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // ------------------------------------------------------------------
    // Broadcast switches
    // ------------------------------------------------------------------

    pub fn set_trace_mode(&mut self, trace_mode: bool) {
        self.settings.classviz.trace_mode = trace_mode;
        self.bus().publish(Event::SwitchTraceMode { trace_mode });
    }

    pub fn set_step_by_step(&self, flag: bool) {
        self.bus().publish(Event::SwitchStepByStepMode { flag });
    }

    pub fn set_provider(&mut self, provider: ProviderConfig) {
        self.settings.explainer.provider = provider.clone();
        self.bus().publish(Event::ChangeLlmServiceProvider {
            model: provider.model,
            url: provider.url,
            key: provider.key,
        });
    }

    // ------------------------------------------------------------------
    // Async work
    // ------------------------------------------------------------------

    /// Explain the current selection through the configured HTTP provider.
    pub async fn explain(&self) -> Result<usize, ServiceError> {
        let provider = self.explainer.borrow().provider().clone();
        let service = HttpExplanationService::new(provider)?;
        Ok(self.explain_with(&service).await)
    }

    /// Explain the current selection through `service`; returns how many
    /// regions and trees received a result.
    pub async fn explain_with(&self, service: &dyn ExplanationService) -> usize {
        explain_selection(&self.explainer, service).await
    }

    /// Play `thread` until it completes or `cancel` fires.
    pub async fn play(&self, thread: &str, cancel: CancellationToken) -> PlaybackTick {
        if !self.step.borrow_mut().start_autoplay(thread) {
            return PlaybackTick::Idle;
        }
        run_autoplay(&self.step, cancel).await
    }
}
