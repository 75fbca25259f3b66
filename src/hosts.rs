//! Configured API hosts and host-index remapping
//!
//! Recorded URLs are stored without their host so a fixture captured against
//! one backend can be replayed against another. The position of the matched
//! host in the list is stored alongside the URL and resolved against the host
//! list configured at replay time.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire value for a record whose URL matched no configured host
pub const UNMATCHED_HOST_INDEX: i64 = -1;

/// Position of a configured host, or unmatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HostIndex(Option<usize>);

impl HostIndex {
    /// Index that resolves to no host
    pub const UNMATCHED: Self = Self(None);

    /// Index of the host at `position`
    pub fn at(position: usize) -> Self {
        Self(Some(position))
    }

    /// Position in the host list, if matched
    pub fn get(self) -> Option<usize> {
        self.0
    }

    /// Whether a host matched at capture time
    pub fn is_matched(self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for HostIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(index) => write!(f, "{index}"),
            None => write!(f, "{UNMATCHED_HOST_INDEX}"),
        }
    }
}

impl Serialize for HostIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Some(index) => serializer.serialize_u64(index as u64),
            None => serializer.serialize_i64(UNMATCHED_HOST_INDEX),
        }
    }
}

impl<'de> Deserialize<'de> for HostIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        match raw {
            UNMATCHED_HOST_INDEX => Ok(Self::UNMATCHED),
            n if n >= 0 => usize::try_from(n)
                .map(Self::at)
                .map_err(serde::de::Error::custom),
            n => Err(serde::de::Error::custom(format!(
                "matchHostIndex must be -1 or a non-negative index, got {n}"
            ))),
        }
    }
}

/// Result of matching an absolute URL against the host list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatch {
    /// Matched host index
    pub index: HostIndex,
    /// URL with the matched host removed, empty when unmatched
    pub stripped: String,
}

/// Ordered list of API hosts
///
/// Order is significant: it defines the index space for [`HostIndex`].
/// Empty entries are kept so the positions of later hosts do not shift, but an
/// empty entry never matches and never resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostList {
    hosts: Vec<String>,
}

impl HostList {
    /// Build from individual entries, trimming whitespace
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.as_ref().trim().to_string())
                .collect(),
        }
    }

    /// Parse a comma-separated host list
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    /// Number of entries, empty ones included
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether no hosts are configured
    pub fn is_empty(&self) -> bool {
        self.hosts.iter().all(String::is_empty)
    }

    /// Iterate over the entries in index order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Match `url` against the list
    ///
    /// The first non-empty host, in list order, that occurs anywhere in `url`
    /// wins, even when a later host would be a longer match. Only the first
    /// occurrence of the host is removed.
    pub fn match_url(&self, url: &str) -> HostMatch {
        for (position, host) in self.hosts.iter().enumerate() {
            if !host.is_empty() && url.contains(host.as_str()) {
                return HostMatch {
                    index: HostIndex::at(position),
                    stripped: url.replacen(host.as_str(), "", 1),
                };
            }
        }

        HostMatch {
            index: HostIndex::UNMATCHED,
            stripped: String::new(),
        }
    }

    /// Host for a recorded index, if it still exists and is non-empty
    pub fn resolve(&self, index: HostIndex) -> Option<&str> {
        let host = self.hosts.get(index.get()?)?;
        if host.is_empty() {
            None
        } else {
            Some(host.as_str())
        }
    }

    /// Rebuild an absolute URL from a stripped one
    pub fn rebuild(&self, index: HostIndex, stripped: &str) -> Option<String> {
        self.resolve(index).map(|host| format!("{host}{stripped}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_trims_and_keeps_positions() {
        let hosts = HostList::parse(" https://api.example.com , ,https://auth.example.com");
        assert_eq!(hosts.len(), 3);
        assert_eq!(
            hosts.iter().collect::<Vec<_>>(),
            vec!["https://api.example.com", "", "https://auth.example.com"]
        );
    }

    #[test]
    fn test_match_strips_host() {
        let hosts = HostList::parse("https://api.example.com");
        let matched = hosts.match_url("https://api.example.com/users/5?full=1");
        assert_eq!(matched.index, HostIndex::at(0));
        assert_eq!(matched.stripped, "/users/5?full=1");
    }

    #[test]
    fn test_first_match_in_list_order_wins() {
        let hosts = HostList::parse("https://api.example.com,https://api.example.com/v2");
        let matched = hosts.match_url("https://api.example.com/v2/users");
        assert_eq!(matched.index, HostIndex::at(0));
        assert_eq!(matched.stripped, "/v2/users");
    }

    #[test]
    fn test_empty_entry_never_matches() {
        let hosts = HostList::parse(",https://api.example.com");
        let matched = hosts.match_url("https://api.example.com/a");
        assert_eq!(matched.index, HostIndex::at(1));
    }

    #[test]
    fn test_unmatched_stores_no_url() {
        let hosts = HostList::parse("https://api.example.com");
        let matched = hosts.match_url("https://cdn.other.net/x.js");
        assert_eq!(matched.index, HostIndex::UNMATCHED);
        assert_eq!(matched.stripped, "");
    }

    #[test]
    fn test_resolve() {
        let hosts = HostList::parse("https://a.test,,https://c.test");
        assert_eq!(hosts.resolve(HostIndex::at(0)), Some("https://a.test"));
        assert_eq!(hosts.resolve(HostIndex::at(1)), None);
        assert_eq!(hosts.resolve(HostIndex::at(3)), None);
        assert_eq!(hosts.resolve(HostIndex::UNMATCHED), None);
        assert_eq!(
            hosts.rebuild(HostIndex::at(2), "/users/5"),
            Some("https://c.test/users/5".to_string())
        );
    }

    #[test]
    fn test_host_index_wire_format() {
        assert_eq!(serde_json::to_string(&HostIndex::UNMATCHED).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&HostIndex::at(2)).unwrap(), "2");
        assert_eq!(
            serde_json::from_str::<HostIndex>("-1").unwrap(),
            HostIndex::UNMATCHED
        );
        assert_eq!(serde_json::from_str::<HostIndex>("0").unwrap(), HostIndex::at(0));
        assert!(serde_json::from_str::<HostIndex>("-2").is_err());
        assert!(serde_json::from_str::<HostIndex>("\"0\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_strip_then_rebuild_restores_url(
            path in "/[a-z0-9/]{0,24}",
            query in proptest::option::of("[a-z]{1,6}=[0-9]{1,4}"),
        ) {
            let hosts = HostList::parse("https://api.example.com,https://auth.example.com");
            let url = match &query {
                Some(q) => format!("https://auth.example.com{path}?{q}"),
                None => format!("https://auth.example.com{path}"),
            };

            let matched = hosts.match_url(&url);
            prop_assert_eq!(matched.index, HostIndex::at(1));
            prop_assert_eq!(hosts.rebuild(matched.index, &matched.stripped), Some(url));
        }
    }
}
