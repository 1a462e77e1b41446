/// A state machine driven one input at a time.
///
/// Transitions consume the current state and may record what they learn in `context`.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;

    /// Whether no further input will be accepted.
    fn is_terminal(&self) -> bool {
        false
    }
}
