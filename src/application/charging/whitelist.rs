//! Named whitelists of a charging station

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::domain::Identification;

/// Whitelist consulted by station-level Reserve and RemoteStart.
pub const DEFAULT_WHITELIST: &str = "default";

/// Named sets of permitted identifications.
///
/// Only enforced while enabled. When enforced, an identification missing from
/// the list is refused, never silently allowed.
#[derive(Debug, Default)]
pub struct Whitelists {
    enabled: AtomicBool,
    lists: DashMap<String, HashSet<Identification>>,
}

impl Whitelists {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            lists: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Returns `false` when the identification was already listed.
    pub fn add(&self, list: &str, identification: Identification) -> bool {
        debug!(list, %identification, "Whitelist entry added");
        self.lists
            .entry(list.to_string())
            .or_default()
            .insert(identification)
    }

    pub fn remove(&self, list: &str, identification: &Identification) -> bool {
        self.lists
            .get_mut(list)
            .map(|mut entries| entries.remove(identification))
            .unwrap_or(false)
    }

    pub fn contains(&self, list: &str, identification: &Identification) -> bool {
        self.lists
            .get(list)
            .is_some_and(|entries| entries.contains(identification))
    }

    /// Whether `identification` passes the check against `list`.
    pub fn admits(&self, list: &str, identification: &Identification) -> bool {
        !self.is_enabled() || self.contains(list, identification)
    }

    pub fn entries(&self, list: &str) -> Vec<Identification> {
        self.lists
            .get(list)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_whitelist_admits_everyone() {
        let lists = Whitelists::new(false);
        assert!(lists.admits(DEFAULT_WHITELIST, &Identification::auth_token("X").unwrap()));
    }

    #[test]
    fn enabled_whitelist_refuses_unlisted() {
        let lists = Whitelists::new(true);
        let listed = Identification::auth_token("LISTED").unwrap();
        let stranger = Identification::auth_token("STRANGER").unwrap();

        assert!(lists.add(DEFAULT_WHITELIST, listed.clone()));
        assert!(!lists.add(DEFAULT_WHITELIST, listed.clone()));
        assert!(lists.admits(DEFAULT_WHITELIST, &listed));
        assert!(!lists.admits(DEFAULT_WHITELIST, &stranger));
        assert!(!lists.admits("other", &listed));

        assert!(lists.remove(DEFAULT_WHITELIST, &listed));
        assert!(!lists.admits(DEFAULT_WHITELIST, &listed));
    }

    #[test]
    fn same_value_different_kind_is_distinct() {
        let lists = Whitelists::new(true);
        lists.add(DEFAULT_WHITELIST, Identification::auth_token("1234").unwrap());
        assert!(!lists.admits(DEFAULT_WHITELIST, &Identification::pin("1234").unwrap()));
    }
}
