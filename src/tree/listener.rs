/*!
 * Bulk File Listeners
 * Synchronous observers of event batches applied to the tree
 */

use crate::vfs::observable::VfsEvent;

/// Observer of event batches
///
/// Both callbacks run on the thread applying the batch, outside the tree's
/// record lock. `before` sees the tree prior to any change in the batch,
/// `after` sees it with every change applied.
pub trait BulkFileListener: Send + Sync {
    fn before(&self, _events: &[VfsEvent]) {}

    fn after(&self, _events: &[VfsEvent]) {}
}
