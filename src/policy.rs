// src/policy.rs
//! Content eligibility policy shared by the search and live-stream paths.
//!
//! Rules are evaluated in a fixed order and the first failing rule wins:
//! 1. status marked sensitive
//! 2. status not public (live stream only; search never returns non-public items)
//! 3. account not discoverable
//! 4. account explicitly not indexable (unset passes)
//! 5. account flagged noindex
//! 6. opt-out tag on the status or the account
//! 7. too few followers
//! 8. too few posts
//!
//! The policy is a pure predicate: no I/O, no state.

use crate::model::{Account, Status, Tag};
use std::fmt;

/// Reserved tag an author sets to opt out of automated discovery.
pub const TAG_OPT_OUT: &str = "nobot";

pub const VISIBILITY_PUBLIC: &str = "public";

/// Where the candidate came from; only the live stream carries non-public statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Search,
    LiveStream,
}

/// Why a candidate was rejected. Not an error: a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Sensitive,
    NotPublic { visibility: String },
    NotDiscoverable,
    NotIndexable,
    NoIndex,
    OptOutTag { tag: String },
    LowFollowers { count: u32, min: u32 },
    LowPosts { count: u32, min: u32 },
}

impl Rejection {
    /// Stable short label, used as a metric label.
    pub fn rule(&self) -> &'static str {
        match self {
            Rejection::Sensitive => "sensitive",
            Rejection::NotPublic { .. } => "visibility",
            Rejection::NotDiscoverable => "discoverable",
            Rejection::NotIndexable => "indexable",
            Rejection::NoIndex => "noindex",
            Rejection::OptOutTag { .. } => "opt_out_tag",
            Rejection::LowFollowers { .. } => "min_followers",
            Rejection::LowPosts { .. } => "min_posts",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Sensitive => write!(f, "skip due to sensitive flag"),
            Rejection::NotPublic { visibility } => {
                write!(f, "skip due to visibility {visibility:?}")
            }
            Rejection::NotDiscoverable => write!(f, "skip due to no explicit discoverable flag"),
            Rejection::NotIndexable => write!(f, "skip due to indexable flag set to false"),
            Rejection::NoIndex => write!(f, "skip due to noindex flag"),
            Rejection::OptOutTag { tag } => write!(f, "skip due to opt-out tag {tag:?}"),
            Rejection::LowFollowers { count, min } => {
                write!(f, "skip due to low followers count {count} < {min}")
            }
            Rejection::LowPosts { count, min } => {
                write!(f, "skip due to low posts count {count} < {min}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Policy {
    pub min_followers: u32,
    pub min_posts: u32,
}

impl Policy {
    pub fn new(min_followers: u32, min_posts: u32) -> Self {
        Self {
            min_followers,
            min_posts,
        }
    }

    /// Status-level rules, then the enclosing account's rules (status tags included).
    pub fn check_status(&self, st: &Status, channel: Channel) -> Result<(), Rejection> {
        if st.sensitive {
            return Err(Rejection::Sensitive);
        }
        if channel == Channel::LiveStream && st.visibility != VISIBILITY_PUBLIC {
            return Err(Rejection::NotPublic {
                visibility: st.visibility.clone(),
            });
        }
        self.check(&st.account, &st.tags)
    }

    /// Rules for a directly found account.
    pub fn check_account(&self, acc: &Account) -> Result<(), Rejection> {
        self.check(acc, &[])
    }

    /// Follower/post thresholds only.
    pub fn check_counts(&self, acc: &Account) -> Result<(), Rejection> {
        if acc.followers_count < self.min_followers {
            return Err(Rejection::LowFollowers {
                count: acc.followers_count,
                min: self.min_followers,
            });
        }
        if acc.statuses_count < self.min_posts {
            return Err(Rejection::LowPosts {
                count: acc.statuses_count,
                min: self.min_posts,
            });
        }
        Ok(())
    }

    fn check(&self, acc: &Account, extra_tags: &[Tag]) -> Result<(), Rejection> {
        if !acc.discoverable {
            return Err(Rejection::NotDiscoverable);
        }
        if acc.indexable == Some(false) {
            return Err(Rejection::NotIndexable);
        }
        if acc.noindex {
            return Err(Rejection::NoIndex);
        }
        if let Some(t) = extra_tags.iter().chain(&acc.tags).find(|t| is_opt_out(&t.name)) {
            return Err(Rejection::OptOutTag {
                tag: t.name.clone(),
            });
        }
        self.check_counts(acc)
    }
}

/// Case-insensitive match against the opt-out tag, with or without a leading `#`.
pub fn is_opt_out(name: &str) -> bool {
    name.trim_start_matches('#').eq_ignore_ascii_case(TAG_OPT_OUT)
}
