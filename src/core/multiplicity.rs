//! Sibling instances of repeatable fields.
//!
//! Every operation takes an indexed identifier of the field it works on
//! (conventionally `field#0`; the index itself is ignored) and validates all
//! preconditions before touching the tree, so a failed call leaves the tree
//! exactly as it was.
//!
//! A repeatable field never drops below one instance through these
//! operations. A field that is absent altogether (zero instances, as decoded
//! from a payload that omitted it) can be grown again with
//! [`Tree::append_sibling`], which synthesizes instance `#0` from the
//! definition.

use tracing::debug;

use crate::domain::{Identifier, Node, Slot};

use super::tree::{Tree, TreeError};

impl Tree {
    /// Number of instances of the field `first` belongs to.
    ///
    /// A field the definition declares non-repeatable is never multiple, even
    /// when a drifted payload carried it more than once.
    pub fn sibling_count(&self, first: &Identifier) -> Result<usize, TreeError> {
        self.check_indexed(first)?;
        let field = self.field(first);
        if field.is_some_and(|field| !field.repeatable) {
            return Err(TreeError::NotMultiple(first.clone()));
        }

        let parent = self.group_at(first.parent().as_ref())?;
        match (parent.slot(first.last().name()), field) {
            (Some(Slot::Multiple(nodes)), _) => Ok(nodes.len()),
            (Some(Slot::Single(_)), _) => Err(TreeError::NotMultiple(first.clone())),
            (None, Some(_)) => Ok(0),
            (None, None) => Err(TreeError::NodeNotFound(first.clone())),
        }
    }

    /// Identifiers of every instance of the field, in index order
    pub fn siblings(&self, first: &Identifier) -> Result<Vec<Identifier>, TreeError> {
        let count = self.sibling_count(first)?;
        Ok((0..count).map(|index| first.with_last_index(index)).collect())
    }

    /// Append a copy of the highest-indexed instance.
    ///
    /// The copy carries the full subtree, values included. When the field
    /// has no instance yet, a blank one is built from the definition.
    /// Returns the new instance's identifier.
    pub fn append_sibling(&mut self, first: &Identifier) -> Result<Identifier, TreeError> {
        let count = self.sibling_count(first)?;

        let template = if count == 0 {
            let field = self
                .field(first)
                .ok_or_else(|| TreeError::UnknownField(first.clone()))?;
            Node::blank(field)
        } else {
            self.get(&first.with_last_index(count - 1))?.clone()
        };

        let name = first.last().name().to_string();
        let order = self.field_order(first);
        let parent = self.group_at_mut(first.parent().as_ref())?;
        match parent.children.get_mut(&name) {
            Some(Slot::Multiple(nodes)) => nodes.push(template),
            _ => {
                // A new slot goes before the first sibling the definition lists after it
                let rank = |key: &str| order.iter().position(|other| other == key);
                let at = rank(name.as_str())
                    .and_then(|mine| {
                        parent
                            .children
                            .keys()
                            .position(|key| rank(key.as_str()).is_some_and(|other| other > mine))
                    })
                    .unwrap_or(parent.children.len());
                parent.children.shift_insert(at, name, Slot::Multiple(vec![template]));
            }
        }

        let appended = first.with_last_index(count);
        debug!(identifier = %appended, "Appended sibling");
        Ok(appended)
    }

    /// Remove the highest-indexed instance; the last one cannot be removed
    pub fn remove_last_sibling(&mut self, first: &Identifier) -> Result<(), TreeError> {
        let count = self.sibling_count(first)?;
        if count == 0 {
            return Err(TreeError::NodeNotFound(first.clone()));
        }
        if count == 1 {
            return Err(TreeError::CannotRemoveSoleInstance(first.clone()));
        }

        let nodes = self.multiple_slot_mut(first)?;
        nodes.pop();
        debug!(identifier = %first, remaining = nodes.len(), "Removed last sibling");
        Ok(())
    }

    /// Append or remove instances until exactly `count` exist
    pub fn resize_to(&mut self, first: &Identifier, count: usize) -> Result<(), TreeError> {
        if count == 0 {
            return Err(TreeError::InvalidCount {
                identifier: first.clone(),
                count,
            });
        }

        let current = self.sibling_count(first)?;
        if current == 0 {
            // Nothing to copy yet; the first append builds from the definition
            self.append_sibling(first)?;
        }

        let nodes = self.multiple_slot_mut(first)?;
        if nodes.len() > count {
            nodes.truncate(count);
        } else {
            let template = nodes
                .last()
                .cloned()
                .ok_or_else(|| TreeError::NodeNotFound(first.clone()))?;
            nodes.resize(count, template);
        }

        debug!(identifier = %first, from = current, to = count, "Resized siblings");
        Ok(())
    }

    /// Exchange the full subtrees at two instances of the same field
    pub fn swap(&mut self, a: &Identifier, b: &Identifier) -> Result<(), TreeError> {
        let mismatch = || TreeError::KindMismatch {
            a: a.clone(),
            b: b.clone(),
        };

        if !a.same_field(b) {
            return Err(mismatch());
        }
        if self.node_kind(a)? != self.node_kind(b)? {
            return Err(mismatch());
        }
        if a == b {
            return Ok(());
        }

        if a.parent() == b.parent() {
            if let (Some(i), Some(j)) = (a.last().index(), b.last().index()) {
                self.multiple_slot_mut(a)?.swap(i, j);
                debug!(a = %a, b = %b, "Swapped siblings");
                return Ok(());
            }
        }

        let copy_a = self.get(a)?.clone();
        let copy_b = self.get(b)?.clone();
        *self.get_mut(a)? = copy_b;
        *self.get_mut(b)? = copy_a;
        debug!(a = %a, b = %b, "Swapped siblings");
        Ok(())
    }

    /// Field names of `first` and its siblings, in definition order
    fn field_order(&self, first: &Identifier) -> Vec<String> {
        let fields = match first.parent() {
            None => Some(self.definition().fields()),
            Some(parent) => self.field(&parent).map(|field| field.fields.as_slice()),
        };
        fields
            .unwrap_or_default()
            .iter()
            .map(|field| field.name.clone())
            .collect()
    }

    fn check_indexed(&self, first: &Identifier) -> Result<(), TreeError> {
        if first.last().is_indexed() {
            Ok(())
        } else {
            Err(TreeError::NotMultiple(first.clone()))
        }
    }

    fn multiple_slot_mut(&mut self, first: &Identifier) -> Result<&mut Vec<Node>, TreeError> {
        let parent = self.group_at_mut(first.parent().as_ref())?;
        match parent.children.get_mut(first.last().name()) {
            Some(Slot::Multiple(nodes)) => Ok(nodes),
            Some(Slot::Single(_)) => Err(TreeError::NotMultiple(first.clone())),
            None => Err(TreeError::NodeNotFound(first.clone())),
        }
    }
}
