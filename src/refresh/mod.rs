/*!
 * Refresh
 *
 * Reconciles the virtual file tree with the disk: sessions, the queue that
 * runs them, and the worker that diffs one root.
 */

mod context;
mod queue;
mod session;
mod worker;

pub use queue::RefreshQueue;
pub use session::{FinishCallback, RefreshOutcome, RefreshSession, RefreshTicket};
pub use worker::RefreshWorker;
