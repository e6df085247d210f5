//! Mark/match/sweep replacement of ordered registries.
//!
//! A [`Registry`] owns an ordered list of entries. [`Registry::replace_all`]
//! makes the list equal to a desired sequence while keeping entries that
//! are already present (so anything that refers to them by key keeps
//! working) and only constructing what is genuinely new.
//!
//! ```text
//! current: [A, B, C]     desired: [B, D]
//! mark:    [A*, B*, C*]
//! match B: [A*, C*, B]   (unmarked, moved to the back)
//! new D:   [A*, C*, B, D]
//! sweep:   [B, D]
//! ```
//!
//! If building any entry fails, the registry is cleared completely and
//! the error is returned: it is never left holding a mix of old and new.

use crate::error::{LinkError, Result};

/// An entry type that can be reconciled against a desired description.
pub trait Reconcile: Sized {
    /// The description of an entry as it appears in a desired set.
    type Desired;

    /// Plural noun used in logs and errors.
    const WHAT: &'static str;

    /// Returns whether this entry has the same identity as `desired`.
    fn matches(&self, desired: &Self::Desired) -> bool;

    /// Builds a new entry from its description.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole replacement.
    fn build(desired: &Self::Desired) -> Result<Self>;

    /// Copies non-identity attributes from `desired` onto a matched entry.
    fn refresh(&mut self, _desired: &Self::Desired) {}
}

struct Slot<T> {
    entry: T,
    stale: bool,
}

/// An ordered, identity-matched collection of entries. Order is priority:
/// the first entry is preferred.
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    limit: usize,
}

impl<T: Reconcile> Registry<T> {
    /// Creates an empty registry holding at most `limit` entries.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            limit,
        }
    }

    /// Replaces the contents with `desired`, in order.
    ///
    /// Entries matching a desired item are kept (and refreshed); entries
    /// absent from `desired` are dropped. Duplicates in `desired` collapse
    /// onto a single entry.
    ///
    /// # Errors
    ///
    /// Returns the error from [`Reconcile::build`], or
    /// [`LinkError::TooMany`] if more than `limit` entries would be live.
    /// In both cases the registry is left empty.
    pub fn replace_all<'a, I>(&mut self, desired: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a T::Desired>,
        T::Desired: 'a,
    {
        for slot in &mut self.slots {
            slot.stale = true;
        }

        for want in desired {
            if let Err(e) = self.take(want) {
                tracing::debug!(what = T::WHAT, error = %e, "Replacement failed, clearing");
                self.slots.clear();
                return Err(e);
            }
        }

        self.slots.retain(|slot| !slot.stale);
        Ok(())
    }

    /// Matches or creates one desired entry and puts it at the back.
    fn take(&mut self, want: &T::Desired) -> Result<()> {
        if let Some(pos) = self.slots.iter().position(|s| s.entry.matches(want)) {
            let mut slot = self.slots.remove(pos);
            slot.stale = false;
            slot.entry.refresh(want);
            self.slots.push(slot);
            return Ok(());
        }

        let live = self.slots.iter().filter(|s| !s.stale).count();
        if live >= self.limit {
            return Err(LinkError::TooMany {
                what: T::WHAT,
                limit: self.limit,
            });
        }
        self.slots.push(Slot {
            entry: T::build(want)?,
            stale: false,
        });
        Ok(())
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Returns the first entry matching `key`.
    pub fn find(&self, key: &T::Desired) -> Option<&T> {
        self.iter().find(|e| e.matches(key))
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, key: &T::Desired) -> Option<&mut T> {
        self.iter_mut().find(|e| e.matches(key))
    }

    /// Iterates over entries in priority order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.slots.iter().map(|s| &s.entry)
    }

    /// Iterates mutably over entries in priority order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().map(|s| &mut s.entry)
    }

    /// Returns the entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).map(|s| &s.entry)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the entry limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl<T> std::fmt::Debug for Registry<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.slots.iter().map(|s| &s.entry)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static BUILT: Cell<usize> = const { Cell::new(0) };
    }

    /// Entry keyed by name, carrying a payload that is refreshed on match.
    #[derive(Debug)]
    struct Item {
        name: &'static str,
        payload: u32,
        serial: usize,
    }

    impl Reconcile for Item {
        type Desired = (&'static str, u32);
        const WHAT: &'static str = "items";

        fn matches(&self, desired: &Self::Desired) -> bool {
            self.name == desired.0
        }

        fn build(desired: &Self::Desired) -> Result<Self> {
            if desired.0.is_empty() {
                return Err(LinkError::invalid("empty"));
            }
            let serial = BUILT.with(|b| {
                b.set(b.get() + 1);
                b.get()
            });
            Ok(Self {
                name: desired.0,
                payload: desired.1,
                serial,
            })
        }

        fn refresh(&mut self, desired: &Self::Desired) {
            self.payload = desired.1;
        }
    }

    fn names(r: &Registry<Item>) -> Vec<&'static str> {
        r.iter().map(|i| i.name).collect()
    }

    #[test]
    fn survivors_follow_desired_order() {
        let mut r: Registry<Item> = Registry::new(16);
        r.replace_all(&[("a", 0), ("b", 0), ("c", 0)]).unwrap();
        let b_serial = r.find(&("b", 0)).unwrap().serial;

        r.replace_all(&[("b", 0), ("d", 0)]).unwrap();
        assert_eq!(names(&r), ["b", "d"]);
        // B was kept, not rebuilt.
        assert_eq!(r.find(&("b", 0)).unwrap().serial, b_serial);
    }

    #[test]
    fn reapplying_is_idempotent() {
        let mut r: Registry<Item> = Registry::new(16);
        let want = [("x", 1), ("y", 2)];
        r.replace_all(&want).unwrap();
        let serials: Vec<_> = r.iter().map(|i| i.serial).collect();

        r.replace_all(&want).unwrap();
        assert_eq!(names(&r), ["x", "y"]);
        assert_eq!(r.iter().map(|i| i.serial).collect::<Vec<_>>(), serials);
    }

    #[test]
    fn matched_entries_are_refreshed_and_reordered() {
        let mut r: Registry<Item> = Registry::new(16);
        r.replace_all(&[("a", 1), ("b", 1)]).unwrap();
        r.replace_all(&[("b", 2), ("a", 3)]).unwrap();
        assert_eq!(names(&r), ["b", "a"]);
        assert_eq!(r.find(&("a", 0)).unwrap().payload, 3);
    }

    #[test]
    fn duplicates_collapse() {
        let mut r: Registry<Item> = Registry::new(16);
        r.replace_all(&[("a", 0), ("b", 0), ("a", 0)]).unwrap();
        assert_eq!(names(&r), ["b", "a"]);
    }

    #[test]
    fn failed_build_empties_registry() {
        let mut r: Registry<Item> = Registry::new(16);
        r.replace_all(&[("a", 0), ("b", 0)]).unwrap();

        let err = r.replace_all(&[("a", 0), ("c", 0), ("", 0)]).unwrap_err();
        assert!(err.is_validation());
        assert!(r.is_empty());
    }

    #[test]
    fn limit_counts_only_live_entries() {
        let mut r: Registry<Item> = Registry::new(2);
        r.replace_all(&[("a", 0), ("b", 0)]).unwrap();
        // Both old entries are stale, so two new ones fit.
        r.replace_all(&[("c", 0), ("d", 0)]).unwrap();
        assert_eq!(names(&r), ["c", "d"]);

        let err = r.replace_all(&[("c", 0), ("d", 0), ("e", 0)]).unwrap_err();
        assert!(matches!(err, LinkError::TooMany { limit: 2, .. }));
        assert!(r.is_empty());
    }

    #[test]
    fn empty_desired_set_clears() {
        let mut r: Registry<Item> = Registry::new(4);
        r.replace_all(&[("a", 0)]).unwrap();
        r.replace_all(&[]).unwrap();
        assert!(r.is_empty());
    }
}
