use std::collections::BTreeSet;
use std::fmt;

/// Provenance category of a stylesheet, in canonical display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    External,
    Internal,
    OnPage,
    Inline,
}

impl Origin {
    pub const ALL: [Origin; 4] = [
        Origin::External,
        Origin::Internal,
        Origin::OnPage,
        Origin::Inline,
    ];

    /// Value of the `data-location` marker for this origin.
    pub fn marker(self) -> &'static str {
        match self {
            Origin::External => "external",
            Origin::Internal => "internal",
            Origin::OnPage => "on_page",
            Origin::Inline => "inline",
        }
    }

    pub fn from_marker(raw: &str) -> Option<Origin> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "external" => Some(Origin::External),
            "internal" => Some(Origin::Internal),
            "on_page" | "on-page" => Some(Origin::OnPage),
            "inline" => Some(Origin::Inline),
            _ => None,
        }
    }

    pub fn root_label(self) -> &'static str {
        match self {
            Origin::External => "EXTERNAL",
            Origin::Internal => "INTERNAL",
            Origin::OnPage => "ON PAGE",
            Origin::Inline => "INLINE",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Interaction-dependent pseudo-classes the inspector can force on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PseudoState {
    Hover,
    Active,
    Focus,
    Visited,
    FocusWithin,
    FocusVisible,
    Target,
}

impl PseudoState {
    pub const ALL: [PseudoState; 7] = [
        PseudoState::Hover,
        PseudoState::Active,
        PseudoState::Focus,
        PseudoState::Visited,
        PseudoState::FocusWithin,
        PseudoState::FocusVisible,
        PseudoState::Target,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PseudoState::Hover => "hover",
            PseudoState::Active => "active",
            PseudoState::Focus => "focus",
            PseudoState::Visited => "visited",
            PseudoState::FocusWithin => "focus-within",
            PseudoState::FocusVisible => "focus-visible",
            PseudoState::Target => "target",
        }
    }

    pub fn from_name(name: &str) -> Option<PseudoState> {
        let lowered = name.to_ascii_lowercase();
        PseudoState::ALL
            .iter()
            .copied()
            .find(|state| state.name() == lowered)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedPseudoStates {
    states: BTreeSet<PseudoState>,
}

impl ForcedPseudoStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, state: PseudoState) -> Self {
        self.states.insert(state);
        self
    }

    pub fn force(&mut self, state: PseudoState) {
        self.states.insert(state);
    }

    pub fn release(&mut self, state: PseudoState) {
        self.states.remove(&state);
    }

    /// Flips the state and returns whether it is now forced.
    pub fn toggle(&mut self, state: PseudoState) -> bool {
        if self.states.remove(&state) {
            false
        } else {
            self.states.insert(state);
            true
        }
    }

    pub fn is_forced(&self, state: PseudoState) -> bool {
        self.states.contains(&state)
    }

    pub fn iter(&self) -> impl Iterator<Item = PseudoState> + '_ {
        self.states.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Monotonic id source. Owned by whoever mints the ids; never global.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyntaxId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicId(pub u64);

impl SyntaxId {
    pub fn mint(ids: &mut IdGenerator) -> Self {
        SyntaxId(ids.next_id())
    }
}

impl LogicId {
    pub fn mint(ids: &mut IdGenerator) -> Self {
        LogicId(ids.next_id())
    }
}

impl fmt::Display for SyntaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "css-{}", self.0)
    }
}

impl fmt::Display for LogicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}
