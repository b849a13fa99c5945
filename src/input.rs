//! Raw control codes to semantic actions.
//!
//! Each action is held while at least one raw code bound to it is down.
//! `pressed`/`released` record the 0→1 and 1→0 transitions and are consumed
//! by the next [`InputMapper::poll`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{Propagation, RawInputSource, SubscriptionId};

/// Semantic action alphabet, usually a fieldless enum.
pub trait Action: Copy + Eq + Ord + Hash + Debug + 'static {}

impl<T: Copy + Eq + Ord + Hash + Debug + 'static> Action for T {}

/// Physical control identifier as delivered by the host.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RawCode {
    /// Keyboard code, e.g. `"ArrowLeft"` or `"KeyA"`.
    Key(String),
    /// Pointer button index (0 = primary).
    Pointer(u8),
    GamepadButton { pad: u8, button: u8 },
    /// One direction of an analog stick axis, active past the deadzone.
    GamepadAxis { pad: u8, axis: u8, positive: bool },
}

impl RawCode {
    pub fn key(code: impl Into<String>) -> Self {
        RawCode::Key(code.into())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawEvent {
    Down(RawCode),
    Up(RawCode),
    Axis { pad: u8, axis: u8, value: f32 },
    PointerMove(Vec2),
    /// Window/tab lost focus: every down code is released.
    FocusLost,
}

#[derive(Clone, Debug)]
pub struct Binding<A> {
    pub code: RawCode,
    pub action: A,
    pub prevent_default: bool,
}

impl<A> Binding<A> {
    pub fn new(code: RawCode, action: A) -> Self {
        Self {
            code,
            action,
            prevent_default: false,
        }
    }

    pub fn prevent_default(mut self) -> Self {
        self.prevent_default = true;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Absolute stick value a `GamepadAxis` code must exceed to go down.
    pub axis_deadzone: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { axis_deadzone: 0.5 }
    }
}

/// What the simulation sees for one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSnapshot<A> {
    pub held: BTreeSet<A>,
    pub pressed: BTreeSet<A>,
    pub released: BTreeSet<A>,
    pub pointer: Option<Vec2>,
}

impl<A: Action> InputSnapshot<A> {
    pub fn empty() -> Self {
        Self {
            held: BTreeSet::new(),
            pressed: BTreeSet::new(),
            released: BTreeSet::new(),
            pointer: None,
        }
    }

    pub fn is_held(&self, action: A) -> bool {
        self.held.contains(&action)
    }

    pub fn was_pressed(&self, action: A) -> bool {
        self.pressed.contains(&action)
    }

    pub fn was_released(&self, action: A) -> bool {
        self.released.contains(&action)
    }
}

/// The mapping state machine, independent of any event transport.
#[derive(Debug)]
pub struct ActionState<A> {
    bindings: HashMap<RawCode, Vec<(A, bool)>>,
    deadzone: f32,
    down_codes: HashSet<RawCode>,
    // Number of down codes currently driving each held action
    held: BTreeMap<A, u32>,
    pressed: BTreeSet<A>,
    released: BTreeSet<A>,
    axes: HashMap<(u8, u8), f32>,
    pointer: Option<Vec2>,
}

impl<A: Action> ActionState<A> {
    pub fn new(bindings: impl IntoIterator<Item = Binding<A>>, cfg: &InputConfig) -> Self {
        let mut map: HashMap<RawCode, Vec<(A, bool)>> = HashMap::new();
        for b in bindings {
            map.entry(b.code).or_default().push((b.action, b.prevent_default));
        }
        Self {
            bindings: map,
            deadzone: cfg.axis_deadzone.abs(),
            down_codes: HashSet::new(),
            held: BTreeMap::new(),
            pressed: BTreeSet::new(),
            released: BTreeSet::new(),
            axes: HashMap::new(),
            pointer: None,
        }
    }

    pub fn handle_event(&mut self, event: &RawEvent) -> Propagation {
        match event {
            RawEvent::Down(code) => {
                self.set_code(code, true);
                self.propagation_for(code)
            }
            RawEvent::Up(code) => {
                self.set_code(code, false);
                self.propagation_for(code)
            }
            RawEvent::Axis { pad, axis, value } => {
                let (pad, axis, value) = (*pad, *axis, *value);
                self.axes.insert((pad, axis), value);
                let pos = RawCode::GamepadAxis { pad, axis, positive: true };
                let neg = RawCode::GamepadAxis { pad, axis, positive: false };
                // Strict, so a centred stick is never down with a zero deadzone
                self.set_code(&pos, value > self.deadzone);
                self.set_code(&neg, value < -self.deadzone);
                Propagation::Continue
            }
            RawEvent::PointerMove(p) => {
                self.pointer = Some(*p);
                Propagation::Continue
            }
            RawEvent::FocusLost => {
                let down: Vec<RawCode> = self.down_codes.iter().cloned().collect();
                for code in &down {
                    self.set_code(code, false);
                }
                self.axes.clear();
                Propagation::Continue
            }
        }
    }

    fn propagation_for(&self, code: &RawCode) -> Propagation {
        let prevent = self
            .bindings
            .get(code)
            .is_some_and(|list| list.iter().any(|&(_, prevent)| prevent));
        if prevent { Propagation::PreventDefault } else { Propagation::Continue }
    }

    fn set_code(&mut self, code: &RawCode, down: bool) {
        // Repeats of an already-down code are not transitions
        let changed = if down {
            self.down_codes.insert(code.clone())
        } else {
            self.down_codes.remove(code)
        };
        if !changed {
            return;
        }
        let Some(actions) = self.bindings.get(code) else {
            return;
        };
        for &(action, _) in actions {
            if down {
                let count = self.held.entry(action).or_insert(0);
                *count += 1;
                if *count == 1 {
                    self.pressed.insert(action);
                }
            } else if let Some(count) = self.held.get_mut(&action) {
                *count -= 1;
                if *count == 0 {
                    self.held.remove(&action);
                    self.released.insert(action);
                }
            }
        }
    }

    /// Current held set plus the edges accumulated since the last poll,
    /// which are cleared.
    pub fn poll(&mut self) -> InputSnapshot<A> {
        InputSnapshot {
            held: self.held.keys().copied().collect(),
            pressed: std::mem::take(&mut self.pressed),
            released: std::mem::take(&mut self.released),
            pointer: self.pointer,
        }
    }

    pub fn is_held(&self, action: A) -> bool {
        self.held.contains_key(&action)
    }

    pub fn axis_value(&self, pad: u8, axis: u8) -> f32 {
        self.axes.get(&(pad, axis)).copied().unwrap_or(0.0)
    }

    pub fn pointer(&self) -> Option<Vec2> {
        self.pointer
    }

    pub fn reset(&mut self) {
        self.down_codes.clear();
        self.held.clear();
        self.pressed.clear();
        self.released.clear();
        self.axes.clear();
        self.pointer = None;
    }
}

/// Action state wired to a raw input source through an explicit subscription.
/// The subscription is released by [`dispose`](Self::dispose) or on drop.
pub struct InputMapper<A: Action> {
    state: Rc<RefCell<ActionState<A>>>,
    attachment: Option<(Rc<dyn RawInputSource>, SubscriptionId)>,
}

impl<A: Action> InputMapper<A> {
    /// Subscribe to `source` and start tracking `bindings`.
    pub fn attach(
        source: Rc<dyn RawInputSource>,
        bindings: impl IntoIterator<Item = Binding<A>>,
        cfg: &InputConfig,
    ) -> Self {
        let state = Rc::new(RefCell::new(ActionState::new(bindings, cfg)));
        let listener_state = Rc::clone(&state);
        let id = source.subscribe(Box::new(move |event| {
            listener_state.borrow_mut().handle_event(event)
        }));
        debug!(subscription = id.0, "input mapper attached");
        Self {
            state,
            attachment: Some((source, id)),
        }
    }

    /// A mapper fed only through [`handle_event`](Self::handle_event).
    pub fn detached(bindings: impl IntoIterator<Item = Binding<A>>, cfg: &InputConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(ActionState::new(bindings, cfg))),
            attachment: None,
        }
    }

    pub fn handle_event(&self, event: &RawEvent) -> Propagation {
        self.state.borrow_mut().handle_event(event)
    }

    pub fn poll(&self) -> InputSnapshot<A> {
        self.state.borrow_mut().poll()
    }

    pub fn is_held(&self, action: A) -> bool {
        self.state.borrow().is_held(action)
    }

    pub fn axis_value(&self, pad: u8, axis: u8) -> f32 {
        self.state.borrow().axis_value(pad, axis)
    }

    pub fn pointer(&self) -> Option<Vec2> {
        self.state.borrow().pointer()
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Unsubscribe from the source and clear all state. Safe to call twice.
    pub fn dispose(&mut self) {
        if let Some((source, id)) = self.attachment.take() {
            source.unsubscribe(id);
            debug!(subscription = id.0, "input mapper disposed");
        }
        self.state.borrow_mut().reset();
    }
}

impl<A: Action> Drop for InputMapper<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// `-1`, `0` or `+1` from two opposing held actions (both held cancel out).
pub fn digital_axis<A: Action>(mapper: &InputMapper<A>, negative: A, positive: A) -> i8 {
    i8::from(mapper.is_held(positive)) - i8::from(mapper.is_held(negative))
}
