//! Output module contract: receives the translated field set for every
//! reply that passes the configured filters and is responsible for getting
//! it out of the process (file, stdout, whatever the concrete module does).

use crate::fieldset::FieldSet;
use crate::state::{RecvState, SendState};

pub trait OutputModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time setup before the receive loop starts.
    fn init(&self) {}

    /// Called once per field set that survives the dedup/success filters.
    fn process(&self, fields: &FieldSet);

    /// How often (in unique successes) `update` should be called. `0` means
    /// never.
    fn update_interval(&self) -> u64 {
        0
    }

    /// Periodic progress hook, driven by the receive loop's cadence check.
    fn update(&self, _send: &SendState, _recv: &RecvState) {}

    /// Flushes and closes any open writers. Called once at shutdown.
    fn close(&self) {}
}
