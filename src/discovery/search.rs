// src/discovery/search.rs
//! Paginated search fan-out over every configured credential.
//!
//! Each credential runs its own sequential page loop. The offset advances by the number
//! of items upstream returned, not by how many were accepted, so a query whose results
//! are mostly rejected still runs out of pages. A failing credential only ends its own
//! loop; its error is collected and the next credential runs.

use metrics::counter;
use std::fmt;

use super::Discovery;
use crate::follow::FollowError;
use crate::model::{Account, SearchQuery, SearchType, Status};
use crate::platform::{Credential, PlatformError, SearchPage};
use crate::policy::{Channel, Rejection};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("{host}: {source}")]
    Platform {
        host: String,
        #[source]
        source: PlatformError,
    },

    #[error("follow {addr}: {source}")]
    Follow {
        addr: String,
        #[source]
        source: FollowError,
    },

    #[error("{host}: account {addr} has no instance-local id")]
    MissingAccountId { host: String, addr: String },
}

/// All errors of one search, in the order they happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchErrors(pub Vec<SearchError>);

impl fmt::Display for SearchErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SearchErrors {}

/// Accepted count across credentials plus whatever went wrong on the way.
/// A non-zero count with errors is a partial success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub accepted: u32,
    pub errors: SearchErrors,
}

impl SearchOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.0.is_empty()
    }

    pub fn into_result(self) -> Result<u32, (u32, SearchErrors)> {
        if self.is_ok() {
            Ok(self.accepted)
        } else {
            Err((self.accepted, self.errors))
        }
    }
}

impl Discovery {
    pub(super) async fn fan_out_search(&self, q: &SearchQuery) -> SearchOutcome {
        crate::metrics::ensure_described();
        let mut out = SearchOutcome::default();
        for cred in &self.credentials {
            let accepted = self.search_credential(cred, q, &mut out.errors.0).await;
            out.accepted = out.accepted.saturating_add(accepted);
        }
        counter!("search_accepted_total", "type" => q.search_type.as_str())
            .increment(u64::from(out.accepted));
        out
    }

    async fn search_credential(
        &self,
        cred: &Credential,
        q: &SearchQuery,
        errors: &mut Vec<SearchError>,
    ) -> u32 {
        let mut seen: u32 = 0;
        let mut accepted: u32 = 0;
        while seen < q.limit {
            let page = SearchPage {
                q: &q.text,
                search_type: q.search_type,
                offset: seen,
                limit: q.limit - seen,
            };
            counter!("search_requests_total").increment(1);
            let results = match self.platform.search(cred, &page).await {
                Ok(r) => r,
                Err(source) => {
                    errors.push(SearchError::Platform {
                        host: cred.host.clone(),
                        source,
                    });
                    break;
                }
            };
            let page_len = results.page_len(q.search_type);
            if page_len == 0 {
                break;
            }
            match q.search_type {
                SearchType::Statuses => {
                    for st in &results.statuses {
                        if self.add_status_author(st, q, errors).await {
                            accepted += 1;
                        }
                    }
                }
                SearchType::Accounts => {
                    for acc in &results.accounts {
                        if self.follow_account(cred, acc, errors).await {
                            accepted += 1;
                        }
                    }
                }
            }
            seen = seen.saturating_add(u32::try_from(page_len).unwrap_or(u32::MAX));
        }
        tracing::debug!(host = %cred.host, q = %q.text, seen, accepted, "search pages exhausted");
        accepted
    }

    /// Delegates following the author of a found status.
    async fn add_status_author(
        &self,
        st: &Status,
        q: &SearchQuery,
        errors: &mut Vec<SearchError>,
    ) -> bool {
        let acc = &st.account;
        let verdict = self
            .policy
            .check_counts(acc)
            .and_then(|_| self.policy.check_status(st, Channel::Search));
        if let Err(r) = verdict {
            rejected(acc, &r);
            return false;
        }
        let addr = acc.address();
        match self
            .follows
            .create(addr, &q.group_id, "", &q.interest_id, &q.text)
            .await
        {
            Ok(()) => true,
            Err(source) => {
                errors.push(SearchError::Follow {
                    addr: addr.to_string(),
                    source,
                });
                false
            }
        }
    }

    /// Follows a found account directly with the credential that found it.
    async fn follow_account(
        &self,
        cred: &Credential,
        acc: &Account,
        errors: &mut Vec<SearchError>,
    ) -> bool {
        if let Err(r) = self.policy.check_account(acc) {
            rejected(acc, &r);
            return false;
        }
        if acc.id.is_empty() {
            errors.push(SearchError::MissingAccountId {
                host: cred.host.clone(),
                addr: acc.address().to_string(),
            });
            return false;
        }
        match self.platform.follow(cred, &acc.id).await {
            Ok(()) => true,
            Err(source) => {
                errors.push(SearchError::Platform {
                    host: cred.host.clone(),
                    source,
                });
                false
            }
        }
    }
}

fn rejected(acc: &Account, r: &Rejection) {
    tracing::debug!(addr = acc.address(), reason = %r, "found account skipped");
    counter!("policy_rejected_total", "rule" => r.rule()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_errors_are_newline_separated() {
        let errs = SearchErrors(vec![
            SearchError::MissingAccountId {
                host: "a".into(),
                addr: "x".into(),
            },
            SearchError::Follow {
                addr: "y".into(),
                source: FollowError::Internal("boom".into()),
            },
        ]);
        let s = errs.to_string();
        assert_eq!(s.lines().count(), 2);
        assert!(s.contains("boom"));
    }

    #[test]
    fn partial_success_keeps_count() {
        let out = SearchOutcome {
            accepted: 3,
            errors: SearchErrors(vec![SearchError::MissingAccountId {
                host: "a".into(),
                addr: "x".into(),
            }]),
        };
        assert!(!out.is_ok());
        let (n, errs) = out.into_result().unwrap_err();
        assert_eq!(n, 3);
        assert_eq!(errs.0.len(), 1);
    }
}
