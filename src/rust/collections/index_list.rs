// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Doubly-linked lists over arena indices.
//!
//! The links live in the arena elements themselves (see [LinkArena]); a list is only a small [ListHead] that can be
//! stored anywhere, including inside another element of the same arena. Every link records which list it belongs to,
//! so an element is a member of at most one list at a time and unlinking is O(1).

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::fmt::Debug;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Per-element linkage. `owner` names the list the element is currently linked into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListLink<K> {
    prev: Option<usize>,
    next: Option<usize>,
    owner: Option<K>,
}

/// Head of a list: first and last element plus the element count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListHead {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

/// Iterator over the indices of a list, front to back.
pub struct Iter<'a, K, A: LinkArena<K>> {
    arena: &'a A,
    next: Option<usize>,
    _owner: ::std::marker::PhantomData<K>,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// Storage that holds one [ListLink] per index.
pub trait LinkArena<K> {
    fn link(&self, index: usize) -> &ListLink<K>;
    fn link_mut(&mut self, index: usize) -> &mut ListLink<K>;
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<K: Copy + Eq + Debug> ListLink<K> {
    pub const fn new() -> Self {
        Self {
            prev: None,
            next: None,
            owner: None,
        }
    }

    /// The list this element is linked into, if any.
    pub fn owner(&self) -> Option<K> {
        self.owner
    }

    pub fn is_linked(&self) -> bool {
        self.owner.is_some()
    }

    pub fn next(&self) -> Option<usize> {
        self.next
    }
}

impl ListHead {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn front(&self) -> Option<usize> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Links `index` at the back of this list, which is identified by `owner`.
    pub fn push_back<K: Copy + Eq + Debug, A: LinkArena<K>>(&mut self, arena: &mut A, index: usize, owner: K) {
        self.insert_before(arena, index, None, owner);
    }

    /// Links `index` right before `before`, or at the back if `before` is `None`.
    pub fn insert_before<K: Copy + Eq + Debug, A: LinkArena<K>>(
        &mut self,
        arena: &mut A,
        index: usize,
        before: Option<usize>,
        owner: K,
    ) {
        crate::ukern_assert!(
            !arena.link(index).is_linked(),
            crate::runtime::fail::ResultCode::InvalidHandle
        );
        let prev: Option<usize> = match before {
            Some(next) => arena.link(next).prev,
            None => self.tail,
        };
        {
            let link: &mut ListLink<K> = arena.link_mut(index);
            link.prev = prev;
            link.next = before;
            link.owner = Some(owner);
        }
        match prev {
            Some(prev) => arena.link_mut(prev).next = Some(index),
            None => self.head = Some(index),
        }
        match before {
            Some(next) => arena.link_mut(next).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.len += 1;
    }

    /// Unlinks `index`, which must be a member of this list.
    pub fn remove<K: Copy + Eq + Debug, A: LinkArena<K>>(&mut self, arena: &mut A, index: usize) {
        let link: ListLink<K> = *arena.link(index);
        crate::ukern_assert!(link.is_linked(), crate::runtime::fail::ResultCode::InvalidHandle);
        match link.prev {
            Some(prev) => arena.link_mut(prev).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => arena.link_mut(next).prev = link.prev,
            None => self.tail = link.prev,
        }
        *arena.link_mut(index) = ListLink::new();
        self.len -= 1;
    }

    /// Unlinks and returns the first element.
    pub fn pop_front<K: Copy + Eq + Debug, A: LinkArena<K>>(&mut self, arena: &mut A) -> Option<usize> {
        let index: usize = self.head?;
        self.remove(arena, index);
        Some(index)
    }

    pub fn iter<'a, K, A: LinkArena<K>>(&self, arena: &'a A) -> Iter<'a, K, A> {
        Iter {
            arena,
            next: self.head,
            _owner: ::std::marker::PhantomData,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<K: Copy + Eq + Debug> Default for ListLink<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, K, A: LinkArena<K>> Iterator for Iter<'a, K, A> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index: usize = self.next?;
        self.next = self.arena.link(index).next;
        Some(index)
    }
}

impl<K> LinkArena<K> for Vec<ListLink<K>> {
    fn link(&self, index: usize) -> &ListLink<K> {
        &self[index]
    }

    fn link_mut(&mut self, index: usize) -> &mut ListLink<K> {
        &mut self[index]
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
