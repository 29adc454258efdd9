//! Group header records and the table that owns them.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::{ViewError, ViewResult};
use crate::events::TreeEvent;
use crate::store::NodeId;

use super::GroupId;

/// A synthetic row standing for every root-level node of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHeader {
    pub id: GroupId,
    pub name: String,
    pub expanded: bool,
    /// First visible root-level node of the group, as last observed.
    pub top_node: Option<NodeId>,
}

/// Header table plus the root-level membership cache.
#[derive(Debug, Default)]
pub(crate) struct GroupState {
    headers: HashMap<GroupId, GroupHeader>,
    by_name: HashMap<String, GroupId>,
    members: HashMap<NodeId, GroupId>,
    // Headers requested by name that no root-level node has joined yet.
    unclaimed: HashSet<GroupId>,
    // Table changes not yet announced to listeners.
    pending: Vec<TreeEvent>,
}

impl GroupState {
    pub fn header(&self, id: GroupId) -> ViewResult<&GroupHeader> {
        self.headers.get(&id).ok_or(ViewError::UnknownGroup(id))
    }

    pub fn header_mut(&mut self, id: GroupId) -> ViewResult<&mut GroupHeader> {
        self.headers.get_mut(&id).ok_or(ViewError::UnknownGroup(id))
    }

    pub fn headers(&self) -> impl Iterator<Item = &GroupHeader> {
        self.headers.values()
    }

    /// The header for `name`, created expanded on first reference.
    pub fn header_for(&mut self, name: &str) -> GroupId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = GroupId::new();
        debug!("Created group header {id} for {name:?}");
        self.headers.insert(
            id,
            GroupHeader {
                id,
                name: name.to_string(),
                expanded: true,
                top_node: None,
            },
        );
        self.by_name.insert(name.to_string(), id);
        self.pending.push(TreeEvent::GroupHeaderAdded { group: id });
        id
    }

    /// Like [`header_for`](Self::header_for), for a name no node has been
    /// seen with. A header created here is dropped on the next table change
    /// unless a node joins it first.
    pub fn request_header(&mut self, name: &str) -> GroupId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        self.drop_unclaimed();
        let id = self.header_for(name);
        self.unclaimed.insert(id);
        id
    }

    /// Drops every requested header that is still without members.
    pub fn drop_unclaimed(&mut self) {
        let unclaimed: Vec<GroupId> = self.unclaimed.drain().collect();
        for id in unclaimed {
            self.dispose(id);
        }
    }

    /// Whether the table changed since the last [`take_pending`](Self::take_pending).
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn dispose(&mut self, id: GroupId) {
        self.unclaimed.remove(&id);
        if let Some(header) = self.headers.remove(&id) {
            debug!("Dropped group header {id} ({:?})", header.name);
            self.by_name.remove(&header.name);
            self.members.retain(|_, group| *group != id);
            self.pending.push(TreeEvent::GroupHeaderRemoved { group: id });
        }
    }

    /// Records the group of a root-level node. Returns the previous one.
    pub fn assign(&mut self, node: NodeId, group: GroupId) -> Option<GroupId> {
        self.unclaimed.remove(&group);
        self.members.insert(node, group)
    }

    pub fn unassign(&mut self, node: NodeId) -> Option<GroupId> {
        self.members.remove(&node)
    }

    pub fn member_group(&self, node: NodeId) -> Option<GroupId> {
        self.members.get(&node).copied()
    }

    /// Drops `group` unless one of the given neighbours still belongs to it.
    pub fn dispose_unless_adjacent(
        &mut self,
        group: GroupId,
        prev: Option<NodeId>,
        next: Option<NodeId>,
    ) {
        let adjacent = [prev, next]
            .into_iter()
            .flatten()
            .any(|n| self.member_group(n) == Some(group));
        if !adjacent {
            self.dispose(group);
        }
    }

    pub fn clear_members(&mut self) {
        self.members.clear();
    }

    /// Drops every header not in `referenced`.
    pub fn retain_headers(&mut self, referenced: &HashSet<GroupId>) {
        let stale: Vec<GroupId> = self
            .headers
            .keys()
            .filter(|id| !referenced.contains(id))
            .copied()
            .collect();
        for id in stale {
            self.dispose(id);
        }
    }

    pub fn take_pending(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeStore;

    #[test]
    fn test_header_for_is_idempotent() {
        let mut state = GroupState::default();
        let a = state.header_for("A");
        assert_eq!(state.header_for("A"), a);
        assert_ne!(state.header_for("B"), a);
        assert_eq!(state.take_pending().len(), 2);
        assert!(state.take_pending().is_empty());
    }

    #[test]
    fn test_dispose_forgets_name_and_members() {
        let mut state = GroupState::default();
        let a = state.header_for("A");
        state.dispose(a);

        assert!(state.header(a).is_err());
        assert_ne!(state.header_for("A"), a);
    }

    #[test]
    fn test_requested_header_without_members_is_dropped() {
        let store: NodeStore<u32> = NodeStore::new();
        let node = store.add(1, None).unwrap();
        let mut state = GroupState::default();
        let a = state.request_header("A");
        let b = state.request_header("B");
        assert!(state.header(a).is_err());
        assert!(state.header(b).is_ok());

        state.assign(node, b);
        state.drop_unclaimed();
        assert!(state.header(b).is_ok());
    }
}
