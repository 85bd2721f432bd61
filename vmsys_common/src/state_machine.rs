use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A lifecycle whose legal edges are known up front.
///
/// Implementors list which `from -> to` moves are allowed; [`StateMachine::try_transition`]
/// refuses everything else.
pub trait Lifecycle: Copy + Eq + fmt::Debug {
    fn can_transition(from: Self, to: Self) -> bool;
}

/// Returned when a move is not an edge of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid state transition: {from:?} -> {to:?}")]
pub struct InvalidTransition<S: fmt::Debug> {
    pub from: S,
    pub to: S,
}

/// A generic state machine wrapper ensuring thread-safe state transitions.
///
/// This struct wraps a state `S` in a `Mutex` and provides a `transition` method
/// to perform atomic state updates and return an action/result.
///
/// # Example
///
/// ```rust
/// use vmsys_common::state_machine::StateMachine;
///
/// enum State {
///     Idle,
///     Running,
/// }
///
/// let machine = StateMachine::new(State::Idle);
///
/// let action = machine.transition(|state| {
///     match state {
///         State::Idle => {
///             *state = State::Running;
///             "Started"
///         }
///         State::Running => "Already running",
///     }
/// });
/// assert_eq!(action, "Started");
/// ```
#[derive(Debug)]
pub struct StateMachine<S> {
    state: Mutex<S>,
}

impl<S> StateMachine<S> {
    /// Creates a new `StateMachine` in the given initial state.
    pub fn new(initial_state: S) -> Self {
        Self {
            state: Mutex::new(initial_state),
        }
    }

    /// Access the underlying state directly via a MutexGuard.
    ///
    /// A poisoned lock still yields the last written state; transitions are
    /// single assignments so the state itself cannot be torn.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Perform an atomic transition on the state.
    ///
    /// The closure `f` is called with a mutable reference to the current state.
    /// The lock is held for the duration of the closure.
    pub fn transition<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut state = self.lock();
        f(&mut *state)
    }
}

impl<S: Lifecycle> StateMachine<S> {
    /// Returns a copy of the current state.
    pub fn current(&self) -> S {
        *self.lock()
    }

    /// Move to `to` if the lifecycle allows it from the current state.
    ///
    /// Returns the state that was replaced.
    pub fn try_transition(&self, to: S) -> Result<S, InvalidTransition<S>> {
        self.transition(|state| {
            let from = *state;
            if S::can_transition(from, to) {
                *state = to;
                Ok(from)
            } else {
                Err(InvalidTransition { from, to })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Open,
        Closed,
        Locked,
    }

    impl Lifecycle for Door {
        fn can_transition(from: Self, to: Self) -> bool {
            matches!(
                (from, to),
                (Door::Open, Door::Closed) | (Door::Closed, Door::Open) | (Door::Closed, Door::Locked)
            )
        }
    }

    #[test]
    fn test_concurrent_transitions() {
        let machine = Arc::new(StateMachine::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let machine = machine.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    machine.transition(|state| {
                        *state += 1;
                    });
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*machine.lock(), 1000);
    }

    #[test]
    fn test_try_transition_follows_lifecycle_edges() {
        let machine = StateMachine::new(Door::Open);

        assert_eq!(machine.try_transition(Door::Closed), Ok(Door::Open));
        assert_eq!(machine.try_transition(Door::Locked), Ok(Door::Closed));
        assert_eq!(machine.current(), Door::Locked);
    }

    #[test]
    fn test_try_transition_rejects_unknown_edge_and_keeps_state() {
        let machine = StateMachine::new(Door::Open);

        let err = machine.try_transition(Door::Locked).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: Door::Open,
                to: Door::Locked
            }
        );
        assert_eq!(machine.current(), Door::Open);
        assert_eq!(
            err.to_string(),
            "invalid state transition: Open -> Locked"
        );
    }

    #[test]
    fn test_only_one_racing_thread_wins_a_single_edge() {
        let machine = Arc::new(StateMachine::new(Door::Closed));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = machine.clone();
                thread::spawn(move || machine.try_transition(Door::Locked).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
