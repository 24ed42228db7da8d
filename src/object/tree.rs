use std::{collections::HashMap, fmt::Display};

use log::trace;

use crate::{
    mapi::{FolderId, MapiError},
    object::{Attachment, Folder, Mailbox, Message, Node, Stream, Table},
};

/// Opaque reference to an open object, as handed out to the protocol layer.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Handle(u32);

impl Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Entry {
    parent: Option<Handle>,
    children: Vec<Handle>,
    node: Node,
    /// Opened only to link a descendant to its ancestors; goes away with its
    /// last child.
    implicit: bool,
}

/// Arena of open objects. Every object but a mailbox is owned by exactly one
/// parent, and releasing an object releases everything below it.
#[derive(Debug, Default)]
pub struct ObjectTree {
    entries: HashMap<Handle, Entry>,
    next: u32,
}

macro_rules! typed_accessors {
    ($($variant:ident => $get:ident, $get_mut:ident: $ty:ty;)*) => {
        $(
            pub fn $get(&self, handle: Handle) -> Result<&$ty, MapiError> {
                match self.get(handle)? {
                    Node::$variant(inner) => Ok(inner),
                    _ => Err(MapiError::InvalidObject),
                }
            }

            pub fn $get_mut(&mut self, handle: Handle) -> Result<&mut $ty, MapiError> {
                match self.get_mut(handle)? {
                    Node::$variant(inner) => Ok(inner),
                    _ => Err(MapiError::InvalidObject),
                }
            }
        )*
    };
}

impl ObjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if `parent` is not in the tree.
    pub fn insert(&mut self, parent: Option<Handle>, node: Node) -> Handle {
        self.insert_entry(parent, node, false)
    }

    pub fn insert_implicit(&mut self, parent: Option<Handle>, node: Node) -> Handle {
        self.insert_entry(parent, node, true)
    }

    fn insert_entry(&mut self, parent: Option<Handle>, node: Node, implicit: bool) -> Handle {
        self.next += 1;
        let handle = Handle(self.next);
        if let Some(parent) = parent {
            self.entries
                .get_mut(&parent)
                .expect("parent handle should be open")
                .children
                .push(handle);
        }
        trace!("opened {} {handle} below {parent:?}", node.kind());
        self.entries.insert(
            handle,
            Entry {
                parent,
                children: Vec::new(),
                node,
                implicit,
            },
        );
        handle
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, handle: Handle) -> Result<&Node, MapiError> {
        self.entries
            .get(&handle)
            .map(|entry| &entry.node)
            .ok_or(MapiError::InvalidObject)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Node, MapiError> {
        self.entries
            .get_mut(&handle)
            .map(|entry| &mut entry.node)
            .ok_or(MapiError::InvalidObject)
    }

    /// Like [`ObjectTree::get`] for handles reached through parent links,
    /// which are always open.
    pub(crate) fn node(&self, handle: Handle) -> &Node {
        &self
            .entries
            .get(&handle)
            .expect("linked handle should be open")
            .node
    }

    typed_accessors! {
        Mailbox => mailbox, mailbox_mut: Mailbox;
        Folder => folder, folder_mut: Folder;
        Message => message, message_mut: Message;
        Attachment => attachment, attachment_mut: Attachment;
        Table => table, table_mut: Table;
        Stream => stream, stream_mut: Stream;
    }

    pub fn parent(&self, handle: Handle) -> Option<Handle> {
        self.entries.get(&handle).and_then(|entry| entry.parent)
    }

    pub fn children(&self, handle: Handle) -> &[Handle] {
        self.entries
            .get(&handle)
            .map_or(&[], |entry| entry.children.as_slice())
    }

    pub fn is_implicit(&self, handle: Handle) -> bool {
        self.entries.get(&handle).is_some_and(|entry| entry.implicit)
    }

    /// Whether `ancestor` is `handle` itself or one of its ancestors.
    pub fn is_within(&self, handle: Handle, ancestor: Handle) -> bool {
        let mut current = Some(handle);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.parent(candidate);
        }
        false
    }

    /// An open implicit folder node for `fid` directly below `parent`.
    pub(crate) fn implicit_folder(&self, parent: Handle, fid: FolderId) -> Option<Handle> {
        self.children(parent).iter().copied().find(|child| {
            self.is_implicit(*child)
                && matches!(self.node(*child), Node::Folder(folder) if folder.fid == fid)
        })
    }

    /// Handles below `handle`, children before their parents, ending with
    /// `handle` itself.
    pub fn post_order(&self, handle: Handle) -> Vec<Handle> {
        let mut order = Vec::new();
        let mut pending = vec![(handle, false)];
        while let Some((current, expanded)) = pending.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            pending.push((current, true));
            for child in self.children(current).iter().rev() {
                pending.push((*child, false));
            }
        }
        order
    }

    /// Moves `handle` below `new_parent`.
    pub fn reparent(&mut self, handle: Handle, new_parent: Handle) {
        let old_parent = self.detach(handle);
        self.entries
            .get_mut(&new_parent)
            .expect("new parent should be open")
            .children
            .push(handle);
        self.entries
            .get_mut(&handle)
            .expect("reparented handle should be open")
            .parent = Some(new_parent);
        if let Some(old_parent) = old_parent {
            self.collect_implicit(old_parent);
        }
    }

    /// Removes `handle` with everything below it and hands the nodes back,
    /// children first. Implicit ancestors left without children go too.
    pub fn remove_subtree(&mut self, handle: Handle) -> Vec<Node> {
        if !self.contains(handle) {
            return Vec::new();
        }
        let order = self.post_order(handle);
        let parent = self.detach(handle);
        let mut nodes = Vec::with_capacity(order.len());
        for current in order {
            if let Some(entry) = self.entries.remove(&current) {
                trace!("released {} {current}", entry.node.kind());
                nodes.push(entry.node);
            }
        }
        if let Some(parent) = parent {
            nodes.extend(self.collect_implicit(parent));
        }
        nodes
    }

    fn detach(&mut self, handle: Handle) -> Option<Handle> {
        let parent = self.entries.get(&handle)?.parent;
        if let Some(parent) = parent
            && let Some(entry) = self.entries.get_mut(&parent)
        {
            entry.children.retain(|child| *child != handle);
        }
        parent
    }

    fn collect_implicit(&mut self, mut handle: Handle) -> Vec<Node> {
        let mut nodes = Vec::new();
        while self.is_implicit(handle) && self.children(handle).is_empty() {
            let parent = self.detach(handle);
            if let Some(entry) = self.entries.remove(&handle) {
                trace!("released implicit {} {handle}", entry.node.kind());
                nodes.push(entry.node);
            }
            match parent {
                Some(parent) => handle = parent,
                None => break,
            }
        }
        nodes
    }
}
