//! Recipient allow-list

use std::collections::HashSet;

/// Marker that allows every address
pub const ALLOW_ALL: &str = "*";

/// Which addresses may receive mail
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AllowList {
    /// Every address is allowed
    #[default]
    All,
    /// Only the listed addresses are allowed (exact match)
    Only(HashSet<String>),
}

impl AllowList {
    pub fn only<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(addresses.into_iter().map(Into::into).collect())
    }

    /// Parse `*` or a comma separated list of addresses
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value == ALLOW_ALL {
            return Self::All;
        }

        Self::Only(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_allowed(&self, address: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(allowed) => allowed.contains(address),
        }
    }

    /// Primary recipients pass only when every one of them is allowed
    pub fn allows_all(&self, addresses: &[String]) -> bool {
        addresses.iter().all(|a| self.is_allowed(a))
    }

    /// Drop disallowed entries, keeping order and duplicates
    pub fn filter(&self, addresses: &[String]) -> Vec<String> {
        addresses
            .iter()
            .filter(|a| self.is_allowed(a))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_wildcard() {
        assert_eq!(AllowList::parse("*"), AllowList::All);
        assert_eq!(AllowList::parse(" * "), AllowList::All);
    }

    #[test]
    fn test_parse_list() {
        let allow = AllowList::parse("a@x.com, b@x.com,,");
        assert!(allow.is_allowed("a@x.com"));
        assert!(allow.is_allowed("b@x.com"));
        assert!(!allow.is_allowed("c@x.com"));
    }

    #[test]
    fn test_empty_list_allows_nothing() {
        let allow = AllowList::parse("");
        assert!(!allow.is_allowed("a@x.com"));
    }

    #[test]
    fn test_filter_preserves_order_and_duplicates() {
        let allow = AllowList::only(["a@x.com", "c@x.com"]);
        let filtered = allow.filter(&list(&["c@x.com", "bad@x.com", "a@x.com", "c@x.com"]));
        assert_eq!(filtered, list(&["c@x.com", "a@x.com", "c@x.com"]));
    }

    #[test]
    fn test_wildcard_keeps_everything() {
        let filtered = AllowList::All.filter(&list(&["a@x.com", "bad@x.com"]));
        assert_eq!(filtered, list(&["a@x.com", "bad@x.com"]));
    }

    #[test]
    fn test_allows_all() {
        let allow = AllowList::only(["a@x.com"]);
        assert!(allow.allows_all(&list(&["a@x.com"])));
        assert!(!allow.allows_all(&list(&["a@x.com", "b@x.com"])));
    }
}
