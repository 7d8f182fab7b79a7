//! Stock retry handlers used by the presets

use crate::resilience::HandlerDecision;
use crate::result::Failure;

/// Stop retrying once the engine reports an open circuit
///
/// Every other failure retries per policy.
pub fn stop_on_circuit_open(failure: &Failure) -> HandlerDecision {
    if failure.is_circuit_open() {
        HandlerDecision::Stop
    } else {
        HandlerDecision::Continue
    }
}

/// Handler that flips the caller into a fallback mode on failure
///
/// `switch` is invoked after every failed attempt and reports whether it
/// changed mode. A change earns another attempt; otherwise the failure is
/// surfaced immediately.
pub fn fallback<S>(switch: S) -> impl Fn(&Failure) -> HandlerDecision + Send + Sync + 'static
where
    S: Fn() -> bool + Send + Sync + 'static,
{
    move |_: &Failure| {
        if switch() {
            HandlerDecision::Continue
        } else {
            HandlerDecision::Stop
        }
    }
}
