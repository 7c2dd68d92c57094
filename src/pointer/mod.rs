/*!
 * Virtual File Pointers
 *
 * URL-addressed, reference-counted handles that survive renames and moves,
 * their manager and trie, and ordered persistable containers.
 */

mod container;
mod listener;
mod manager;
mod node;
#[allow(clippy::module_inception)]
mod pointer;

pub use container::{VirtualFilePointerContainer, URL_ATTRIBUTE};
pub use listener::VirtualFilePointerListener;
pub use manager::VirtualFilePointerManager;
pub use pointer::VirtualFilePointer;
