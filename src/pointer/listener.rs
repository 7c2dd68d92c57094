/*!
 * Pointer Listeners
 */

use super::VirtualFilePointer;

/// Observer of pointer validity and URL changes
///
/// Called outside the pointer trie lock with every pointer of one listener
/// affected by an event batch.
pub trait VirtualFilePointerListener: Send + Sync {
    fn before_validity_changed(&self, _pointers: &[VirtualFilePointer]) {}

    fn validity_changed(&self, _pointers: &[VirtualFilePointer]) {}
}
