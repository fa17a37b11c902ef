use crate::models::error::DaqError;
use crate::models::rate::RateMismatch;
use crate::models::state::SessionState;

/// Event delegate for device session notifications.
///
/// Methods are called on whichever thread drives the session, which is the
/// acquisition thread once streaming has started.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: SessionState);

    /// Called when the hardware accepted a different rate than requested.
    fn on_rate_mismatch(&self, mismatch: &RateMismatch);

    /// Called when a driver call fails, including suppressed teardown failures.
    fn on_error(&self, error: &DaqError);
}
