//! A small, table-driven finite state machine.
//!
//! States are plain integers and transitions are keyed by `(symbol, state)`.
//! Each transition carries an optional action and an optional next state.
//! The machine owns an auxiliary stack that actions use to push a symbol back
//! so it gets reprocessed in the state the machine moves to next.
//!
//! The machine is generic over a caller-owned context `C`: actions receive it
//! by mutable reference, so all accumulated data (words, names, output) lives
//! with the caller rather than inside the machine.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identifier of a machine state.
pub type State = usize;

/// Input symbol a transition is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Matches exactly this character.
    Char(char),
    /// Matches any character not covered by a `Char` rule for the same state.
    Any,
}

/// Wildcard symbol, see [`Symbol::Any`].
pub const ANY: Symbol = Symbol::Any;

impl From<char> for Symbol {
    fn from(c: char) -> Self {
        Symbol::Char(c)
    }
}

/// Callback run when a transition fires.
///
/// Receives the caller context, the symbol that triggered the transition and
/// the machine itself (for `push`/`pop`/`reset`).
pub type Action<C> = fn(&mut C, char, &mut Machine);

/// One rule of the transition table.
pub struct Transition<C> {
    /// Action to run, `None` for a pure state change.
    pub action: Option<Action<C>>,
    /// State to move to after the action, `None` to stay.
    pub next: Option<State>,
}

impl<C> Transition<C> {
    pub fn new(action: Option<Action<C>>, next: Option<State>) -> Self {
        Self { action, next }
    }
}

impl<C> Clone for Transition<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Transition<C> {}

impl<C> fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("action", &self.action.is_some())
            .field("next", &self.next)
            .finish()
    }
}

/// No rule matched the symbol in the current state and no default exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no transition for {symbol:?} in state {state} (stack: {stack:?})")]
pub struct SyntaxError {
    pub symbol: char,
    pub state: State,
    pub stack: Vec<char>,
}

/// Runtime part of the machine: current state plus the push-back stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    initial: State,
    current: State,
    stack: Vec<char>,
}

impl Machine {
    fn new(initial: State) -> Self {
        Self {
            initial,
            current: initial,
            stack: Vec::new(),
        }
    }

    pub fn current_state(&self) -> State {
        self.current
    }

    pub fn is_initial(&self) -> bool {
        self.current == self.initial
    }

    /// Schedule `symbol` to be processed again after the current transition.
    pub fn push(&mut self, symbol: char) {
        self.stack.push(symbol);
    }

    pub fn pop(&mut self) -> Option<char> {
        self.stack.pop()
    }

    pub fn stack(&self) -> &[char] {
        &self.stack
    }

    /// Clear the stack and go back to the initial state.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.current = self.initial;
    }
}

/// Table-driven finite state machine over a caller context `C`.
pub struct Fsm<C> {
    table: HashMap<(Symbol, State), Transition<C>>,
    default: Option<Transition<C>>,
    machine: Machine,
}

impl<C> Fsm<C> {
    pub fn new(initial: State) -> Self {
        Self {
            table: HashMap::new(),
            default: None,
            machine: Machine::new(initial),
        }
    }

    /// Register a rule. A later rule for the same `(symbol, state)` replaces
    /// the earlier one.
    pub fn insert(&mut self, symbol: impl Into<Symbol>, state: State, transition: Transition<C>) {
        self.table.insert((symbol.into(), state), transition);
    }

    pub fn add_transition(
        &mut self,
        symbol: impl Into<Symbol>,
        state: State,
        action: Action<C>,
        next: State,
    ) {
        self.insert(symbol, state, Transition::new(Some(action), Some(next)));
    }

    /// Register a state change with no action.
    pub fn add_jump(&mut self, symbol: impl Into<Symbol>, state: State, next: State) {
        self.insert(symbol, state, Transition::new(None, Some(next)));
    }

    /// Register the same rule for every character of `symbols`.
    pub fn add_transitions(&mut self, symbols: &str, state: State, action: Action<C>, next: State) {
        for c in symbols.chars() {
            self.add_transition(c, state, action, next);
        }
    }

    /// Rule used when neither the symbol nor [`ANY`] matches in a state.
    pub fn add_default_transition(&mut self, action: Action<C>, next: State) {
        self.default = Some(Transition::new(Some(action), Some(next)));
    }

    /// Feed one symbol through the machine.
    ///
    /// Lookup order is `(symbol, state)`, then `(ANY, state)`, then the
    /// default transition. When nothing matches the machine resets and the
    /// offending symbol is returned together with the stack contents.
    pub fn process(&mut self, symbol: char, ctx: &mut C) -> Result<(), SyntaxError> {
        let state = self.machine.current;
        let transition = self
            .table
            .get(&(Symbol::Char(symbol), state))
            .or_else(|| self.table.get(&(Symbol::Any, state)))
            .or(self.default.as_ref())
            .copied();

        let Some(transition) = transition else {
            let err = SyntaxError {
                symbol,
                state,
                stack: self.machine.stack.clone(),
            };
            self.machine.reset();
            return Err(err);
        };

        if let Some(action) = transition.action {
            action(ctx, symbol, &mut self.machine);
        }
        if let Some(next) = transition.next {
            self.machine.current = next;
        }
        Ok(())
    }

    /// Process every character of `input` in order, stopping at the first error.
    pub fn process_str(&mut self, input: &str, ctx: &mut C) -> Result<(), SyntaxError> {
        for c in input.chars() {
            self.process(c, ctx)?;
        }
        Ok(())
    }

    pub fn current_state(&self) -> State {
        self.machine.current_state()
    }

    pub fn is_initial(&self) -> bool {
        self.machine.is_initial()
    }

    pub fn push(&mut self, symbol: char) {
        self.machine.push(symbol);
    }

    pub fn pop(&mut self) -> Option<char> {
        self.machine.pop()
    }

    pub fn stack(&self) -> &[char] {
        self.machine.stack()
    }

    pub fn reset(&mut self) {
        self.machine.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Trace {
        seen: String,
    }

    fn record(t: &mut Trace, c: char, _m: &mut Machine) {
        t.seen.push(c);
    }

    fn shout(t: &mut Trace, c: char, _m: &mut Machine) {
        t.seen.push(c.to_ascii_uppercase());
    }

    fn bounce(_t: &mut Trace, c: char, m: &mut Machine) {
        m.push(c);
    }

    #[test]
    fn test_specific_rule_wins_over_wildcard() {
        let mut fsm: Fsm<Trace> = Fsm::new(0);
        fsm.add_transition(ANY, 0, record, 0);
        fsm.add_transition('b', 0, shout, 0);

        let mut trace = Trace::default();
        fsm.process_str("abc", &mut trace).unwrap();
        assert_eq!(trace.seen, "aBc");
    }

    #[test]
    fn test_jump_changes_state_without_action() {
        let mut fsm: Fsm<Trace> = Fsm::new(0);
        fsm.add_jump('[', 0, 1);
        fsm.add_transition(ANY, 1, shout, 1);
        fsm.add_jump(']', 1, 0);
        fsm.add_transition(ANY, 0, record, 0);

        let mut trace = Trace::default();
        fsm.process_str("a[bc]d", &mut trace).unwrap();
        assert_eq!(trace.seen, "aBCd");
        assert!(fsm.is_initial());
    }

    #[test]
    fn test_default_transition_catches_unmatched() {
        let mut fsm: Fsm<Trace> = Fsm::new(0);
        fsm.add_jump('x', 0, 1);
        fsm.add_default_transition(shout, 0);

        let mut trace = Trace::default();
        fsm.process_str("xy", &mut trace).unwrap();
        assert_eq!(trace.seen, "Y");
        assert_eq!(fsm.current_state(), 0);
    }

    #[test]
    fn test_missing_rule_is_syntax_error_and_resets() {
        let mut fsm: Fsm<Trace> = Fsm::new(0);
        fsm.add_jump('x', 0, 1);
        fsm.push('q');

        let mut trace = Trace::default();
        fsm.process('x', &mut trace).unwrap();
        assert_eq!(fsm.current_state(), 1);

        let err = fsm.process('y', &mut trace).unwrap_err();
        assert_eq!(err.symbol, 'y');
        assert_eq!(err.state, 1);
        assert_eq!(err.stack, vec!['q']);
        assert!(fsm.is_initial());
        assert!(fsm.stack().is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let mut fsm: Fsm<Trace> = Fsm::new(0);
        fsm.add_transition('a', 0, record, 0);
        fsm.add_transition('a', 0, shout, 0);

        let mut trace = Trace::default();
        fsm.process('a', &mut trace).unwrap();
        assert_eq!(trace.seen, "A");
    }

    #[test]
    fn test_stay_transition_keeps_state() {
        let mut fsm: Fsm<Trace> = Fsm::new(0);
        fsm.add_jump('>', 0, 3);
        fsm.insert(ANY, 3, Transition::new(Some(record), None));

        let mut trace = Trace::default();
        fsm.process_str(">ab", &mut trace).unwrap();
        assert_eq!(fsm.current_state(), 3);
        assert_eq!(trace.seen, "ab");
    }

    #[test]
    fn test_action_can_push_back() {
        let mut fsm: Fsm<Trace> = Fsm::new(0);
        fsm.add_transition(ANY, 0, bounce, 1);
        fsm.add_transition(ANY, 1, shout, 1);

        let mut trace = Trace::default();
        fsm.process('z', &mut trace).unwrap();
        assert_eq!(fsm.stack(), &['z']);
        while let Some(c) = fsm.pop() {
            fsm.process(c, &mut trace).unwrap();
        }
        assert_eq!(trace.seen, "Z");
    }
}
