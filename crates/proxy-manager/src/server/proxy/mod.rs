//! Proxy configuration: synthesis, atomic commit, reload and reconciliation

pub mod commit;
pub mod queue;
pub mod reconciler;
pub mod reload;
pub mod synth;

pub use commit::{CommitError, ConfigFile};
pub use queue::ReconcileQueue;
pub use reconciler::{ReconcileError, ReconcilePhase, ReconcileReport, Reconciler};
pub use reload::{CommandReload, ReloadError, ReloadSignal};
pub use synth::ConfigSynthesizer;
