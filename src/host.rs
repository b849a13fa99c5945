//! In-process host shims: clocks, single-threaded event sources and headless
//! collaborators.
//!
//! A browser or windowed host replaces these with adapters over its own
//! animation-frame, input, rendering and audio plumbing; tests and headless
//! runs use them as is.

use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};

use glam::Vec2;
use tracing::debug;

use crate::api::{
    AssetLoader, AudioSink, Clock, Propagation, RawInputSource, RenderHandle, Renderer,
    SubscriptionId, TextureHandle, TickSource,
};
use crate::error::AssetError;
use crate::input::RawEvent;

/// Wall clock backed by [`Instant`].
#[derive(Copy, Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

type Listener<E> = Box<dyn FnMut(&E) -> Propagation>;

/// Ordered listener list that tolerates (un)subscription from inside a
/// listener while a dispatch is running.
struct Listeners<E> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(SubscriptionId, Listener<E>)>>,
    checked_out: RefCell<Vec<SubscriptionId>>,
    removed: RefCell<Vec<SubscriptionId>>,
}

impl<E> Listeners<E> {
    fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            entries: RefCell::new(Vec::new()),
            checked_out: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
        }
    }

    fn subscribe(&self, listener: Listener<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        {
            let mut entries = self.entries.borrow_mut();
            if let Some(pos) = entries.iter().position(|(i, _)| *i == id) {
                entries.remove(pos);
                return true;
            }
        }
        let in_flight = self.checked_out.borrow().contains(&id);
        let mut removed = self.removed.borrow_mut();
        if in_flight && !removed.contains(&id) {
            removed.push(id);
            return true;
        }
        false
    }

    fn len(&self) -> usize {
        self.entries.borrow().len() + self.checked_out.borrow().len() - self.removed.borrow().len()
    }

    fn dispatch(&self, event: &E) -> Propagation {
        let current = std::mem::take(&mut *self.entries.borrow_mut());
        let ids: Vec<SubscriptionId> = current.iter().map(|(id, _)| *id).collect();
        self.checked_out.borrow_mut().extend(ids.iter().copied());
        let mut batch = CheckedOut {
            listeners: self,
            current,
            ids,
        };

        let mut result = Propagation::Continue;
        for (id, listener) in batch.current.iter_mut() {
            if self.removed.borrow().contains(id) {
                continue;
            }
            if listener(event) == Propagation::PreventDefault {
                result = Propagation::PreventDefault;
            }
        }
        result
    }
}

/// Listeners taken out of the list for one dispatch. Dropping it, on return
/// or while a listener panic unwinds, puts the survivors back ahead of any
/// listener subscribed meanwhile.
struct CheckedOut<'a, E> {
    listeners: &'a Listeners<E>,
    current: Vec<(SubscriptionId, Listener<E>)>,
    ids: Vec<SubscriptionId>,
}

impl<E> Drop for CheckedOut<'_, E> {
    fn drop(&mut self) {
        let listeners = self.listeners;
        listeners
            .checked_out
            .borrow_mut()
            .retain(|id| !self.ids.contains(id));
        let mut current = std::mem::take(&mut self.current);
        {
            let mut removed = listeners.removed.borrow_mut();
            current.retain(|(id, _)| match removed.iter().position(|r| r == id) {
                Some(pos) => {
                    removed.swap_remove(pos);
                    false
                }
                None => true,
            });
        }
        let mut entries = listeners.entries.borrow_mut();
        let added = std::mem::take(&mut *entries);
        *entries = current;
        entries.extend(added);
    }
}

/// Tick source fired explicitly by the host loop (or a test).
pub struct ManualTicker {
    listeners: Listeners<()>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self { listeners: Listeners::new() }
    }

    /// Invoke every subscriber once, in subscription order.
    pub fn fire(&self) {
        self.listeners.dispatch(&());
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for ManualTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for ManualTicker {
    fn subscribe(&self, mut callback: Box<dyn FnMut()>) -> SubscriptionId {
        self.listeners.subscribe(Box::new(move |_| {
            callback();
            Propagation::Continue
        }))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

/// Raw input transport: the host pushes native events in with [`emit`](Self::emit).
pub struct InputBus {
    listeners: Listeners<RawEvent>,
}

impl InputBus {
    pub fn new() -> Self {
        Self { listeners: Listeners::new() }
    }

    /// Deliver an event to every listener. Returns `PreventDefault` if any
    /// listener asked for it.
    pub fn emit(&self, event: RawEvent) -> Propagation {
        self.listeners.dispatch(&event)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for InputBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RawInputSource for InputBus {
    fn subscribe(&self, listener: Box<dyn FnMut(&RawEvent) -> Propagation>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

/// Last known state of one sprite.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpriteState {
    pub texture: TextureHandle,
    pub size: Vec2,
    pub position: Vec2,
    pub grounded: bool,
}

#[derive(Debug, Default)]
pub struct RenderState {
    pub sprites: BTreeMap<RenderHandle, SpriteState>,
    /// Handles in destruction order.
    pub destroyed: Vec<RenderHandle>,
    pub camera: Vec2,
    pub hitboxes_visible: bool,
    pub placements: u64,
}

/// Renderer that only records what it is told. Clones share the same state,
/// so a caller can keep one to inspect while the scene owns another.
#[derive(Clone, Debug, Default)]
pub struct HeadlessRenderer {
    state: Rc<RefCell<RenderState>>,
    next_handle: Rc<Cell<u32>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Ref<'_, RenderState> {
        self.state.borrow()
    }
}

impl Renderer for HeadlessRenderer {
    fn create_sprite(&mut self, texture: TextureHandle, size: Vec2) -> RenderHandle {
        let handle = RenderHandle(self.next_handle.get() + 1);
        self.next_handle.set(handle.0);
        self.state.borrow_mut().sprites.insert(
            handle,
            SpriteState {
                texture,
                size,
                position: Vec2::ZERO,
                grounded: false,
            },
        );
        handle
    }

    fn place(&mut self, handle: RenderHandle, position: Vec2, grounded: bool) {
        let mut state = self.state.borrow_mut();
        state.placements += 1;
        match state.sprites.get_mut(&handle) {
            Some(sprite) => {
                sprite.position = position;
                sprite.grounded = grounded;
            }
            None => debug!(handle = handle.0, "place on unknown sprite"),
        }
    }

    fn destroy(&mut self, handle: RenderHandle) {
        let mut state = self.state.borrow_mut();
        state.sprites.remove(&handle);
        state.destroyed.push(handle);
    }

    fn set_camera(&mut self, position: Vec2) {
        self.state.borrow_mut().camera = position;
    }

    fn set_hitboxes_visible(&mut self, visible: bool) {
        self.state.borrow_mut().hitboxes_visible = visible;
    }
}

/// Audio sink that records cue names instead of playing them.
#[derive(Clone, Debug, Default)]
pub struct AudioLog {
    cues: Rc<RefCell<Vec<String>>>,
}

impl AudioLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<String> {
        self.cues.borrow().clone()
    }

    pub fn count(&self, cue: &str) -> usize {
        self.cues.borrow().iter().filter(|c| *c == cue).count()
    }
}

impl AudioSink for AudioLog {
    fn play(&mut self, cue: &str) {
        self.cues.borrow_mut().push(cue.to_owned());
    }
}

/// Asset loader over a fixed id → texture table.
#[derive(Clone, Debug, Default)]
pub struct AssetTable {
    textures: HashMap<String, TextureHandle>,
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_texture(mut self, id: &str, handle: TextureHandle) -> Self {
        self.textures.insert(id.to_owned(), handle);
        self
    }
}

impl AssetLoader for AssetTable {
    fn texture(&mut self, id: &str) -> Result<TextureHandle, AssetError> {
        self.textures
            .get(id)
            .copied()
            .ok_or_else(|| AssetError::Unknown(id.to_owned()))
    }
}
