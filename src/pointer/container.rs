/*!
 * Virtual File Pointer Container
 *
 * Ordered, URL-unique list of pointers with XML persistence. Every pointer is
 * owned by a child scope of the container's scope, so disposing the parent
 * scope releases the whole container.
 */

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use super::listener::VirtualFilePointerListener;
use super::manager::VirtualFilePointerManager;
use super::pointer::VirtualFilePointer;
use crate::core::disposer::Disposable;
use crate::tree::VirtualFile;
use crate::vfs::types::{VfsError, VfsResult};
use crate::vfs::url;

/// Attribute holding the URL on every persisted child element
pub const URL_ATTRIBUTE: &str = "url";

pub struct VirtualFilePointerContainer {
    manager: VirtualFilePointerManager,
    scope: Disposable,
    listener: Option<Arc<dyn VirtualFilePointerListener>>,
    pointers: Arc<Mutex<Vec<VirtualFilePointer>>>,
}

impl VirtualFilePointerContainer {
    pub(crate) fn new(
        manager: VirtualFilePointerManager,
        parent: &Disposable,
        listener: Option<Arc<dyn VirtualFilePointerListener>>,
    ) -> Self {
        let scope = parent.child(format!("pointer-container/{}", parent.name()));
        let pointers = Arc::new(Mutex::new(Vec::new()));
        // Runs after the pointers registered later have released themselves
        let owned: Arc<Mutex<Vec<VirtualFilePointer>>> = pointers.clone();
        scope.register(move || owned.lock().clear());
        Self {
            manager,
            scope,
            listener,
            pointers,
        }
    }

    fn ensure_open(&self) -> VfsResult<()> {
        if self.scope.is_disposed() {
            error!(scope = %self.scope.name(), "Container used after dispose");
            return Err(VfsError::InvalidArgument(
                "pointer container is disposed".to_string(),
            ));
        }
        Ok(())
    }

    fn existing(&self, url: &str) -> Option<VirtualFilePointer> {
        self.pointers
            .lock()
            .iter()
            .find(|p| self.manager.urls_equal(&p.url(), url))
            .cloned()
    }

    /// Append a pointer to `url`; an already present URL is returned as is
    pub fn add_url(&self, url: &str) -> VfsResult<VirtualFilePointer> {
        self.ensure_open()?;
        if let Some(existing) = self.existing(url) {
            return Ok(existing);
        }
        let pointer = self
            .manager
            .create_by_url(url, &self.scope, self.listener.clone())?;
        self.pointers.lock().push(pointer.clone());
        Ok(pointer)
    }

    /// Append a pointer to a file's URL
    pub fn add_file(&self, file: &VirtualFile) -> VfsResult<VirtualFilePointer> {
        self.ensure_open()?;
        if let Some(existing) = self.existing(&file.url()) {
            return Ok(existing);
        }
        let pointer = self
            .manager
            .create_by_file(file, &self.scope, self.listener.clone())?;
        self.pointers.lock().push(pointer.clone());
        Ok(pointer)
    }

    /// Append every URL of `other` not already present
    pub fn add_all(&self, other: &VirtualFilePointerContainer) -> VfsResult<()> {
        for url in other.urls() {
            self.add_url(&url)?;
        }
        Ok(())
    }

    /// Remove and dispose the entry sharing state with `pointer`
    pub fn remove(&self, pointer: &VirtualFilePointer) -> bool {
        let removed = {
            let mut pointers = self.pointers.lock();
            pointers
                .iter()
                .position(|p| p.ptr_eq(pointer))
                .map(|index| pointers.remove(index))
        };
        match removed {
            Some(owned) => {
                owned.dispose();
                true
            }
            None => false,
        }
    }

    /// Dispose every pointer and empty the container
    pub fn clear(&self) {
        let pointers = std::mem::take(&mut *self.pointers.lock());
        debug!(count = pointers.len(), "Clearing pointer container");
        for pointer in pointers {
            pointer.dispose();
        }
    }

    pub fn list(&self) -> Vec<VirtualFilePointer> {
        self.pointers.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.pointers.lock().iter().map(|p| p.url()).collect()
    }

    /// Files the pointers currently resolve to, in order
    pub fn files(&self) -> Vec<VirtualFile> {
        self.list().iter().filter_map(|p| p.file()).collect()
    }

    pub fn directories(&self) -> Vec<VirtualFile> {
        self.files()
            .into_iter()
            .filter(|f| f.is_directory())
            .collect()
    }

    pub fn find_by_url(&self, url: &str) -> Option<VirtualFilePointer> {
        self.existing(url)
    }

    pub fn len(&self) -> usize {
        self.pointers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.lock().is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }

    /// New container with the same URLs under another scope
    pub fn clone_container(
        &self,
        scope: &Disposable,
        listener: Option<Arc<dyn VirtualFilePointerListener>>,
    ) -> VfsResult<VirtualFilePointerContainer> {
        let clone = self.manager.create_container(scope, listener);
        clone.add_all(self)?;
        Ok(clone)
    }

    /// Append the URLs of every `child_tag` element of an XML document
    ///
    /// Elements without a `url` attribute are skipped. Every URL is checked
    /// first, so a malformed one leaves the container unchanged.
    pub fn read_external(&self, xml: &str, child_tag: &str) -> VfsResult<()> {
        self.ensure_open()?;
        let document = roxmltree::Document::parse(xml)
            .map_err(|e| VfsError::InvalidArgument(format!("malformed pointer XML: {}", e)))?;

        let urls: Vec<String> = document
            .root_element()
            .children()
            .filter(|node| node.is_element() && node.tag_name().name() == child_tag)
            .filter_map(|node| node.attribute(URL_ATTRIBUTE).map(str::to_string))
            .collect();

        for raw in &urls {
            url::normalize(raw)?;
        }

        debug!(count = urls.len(), tag = %child_tag, "Reading pointer container");
        for url in urls {
            self.add_url(&url)?;
        }
        Ok(())
    }

    /// Serialize the URLs, in order, as `<root_tag><child_tag url=".."/>..</root_tag>`
    pub fn write_external(&self, root_tag: &str, child_tag: &str) -> String {
        let mut xml = format!("<{}>", root_tag);
        for url in self.urls() {
            xml.push_str(&format!(
                "<{} {}=\"{}\"/>",
                child_tag,
                URL_ATTRIBUTE,
                escape_xml_attr(&url)
            ));
        }
        xml.push_str(&format!("</{}>", root_tag));
        xml
    }
}

impl fmt::Debug for VirtualFilePointerContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFilePointerContainer")
            .field("urls", &self.urls())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn escape_xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}
