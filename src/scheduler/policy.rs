//! Authorization and matching rules that distinguish the two queues.
//!
//! Both queues share one [`Dispatcher`](crate::scheduler::Dispatcher); what
//! differs is who may submit, who may lease, and which jobs a worker may take:
//!
//! - [`TokenPolicy`]: trusted accelerator workers holding a shared bearer
//!   token. Any authorized worker may take any job.
//! - [`TagPolicy`]: edge/browser workers behind a feature flag. Workers must
//!   register first and only receive jobs whose requirements are a subset of
//!   their capability tags.

use subtle::ConstantTimeEq;

use crate::error::{DispatchError, Result};
use crate::scheduler::job::Job;
use crate::scheduler::tags::TagSet;

/// Identity a worker presents on lease-next and complete.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub worker_id: Option<String>,
    /// Tags supplied with the request; these override registered tags.
    pub tags: Option<TagSet>,
    /// Bearer token from the `Authorization` header.
    pub token: Option<String>,
}

impl Caller {
    pub fn worker(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: Some(worker_id.into()),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Worker id with surrounding whitespace removed, if non-empty.
    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

pub trait DispatchPolicy: Send + Sync + 'static {
    /// Short queue name used in logs and stats.
    fn name(&self) -> &'static str;

    fn authorize_submit(&self) -> Result<()>;

    fn authorize_worker(&self, caller: &Caller) -> Result<()>;

    /// Whether lease-next is only served to workers in the registry.
    fn requires_registration(&self) -> bool;

    fn matches(&self, job: &Job, tags: &TagSet) -> bool;
}

/// Shared-secret queue for trusted workers.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    token: Option<String>,
}

impl TokenPolicy {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

impl DispatchPolicy for TokenPolicy {
    fn name(&self) -> &'static str {
        "trusted"
    }

    fn authorize_submit(&self) -> Result<()> {
        Ok(())
    }

    fn authorize_worker(&self, caller: &Caller) -> Result<()> {
        let expected = self
            .token
            .as_deref()
            .ok_or(DispatchError::ProviderUnavailable)?;
        let presented = caller
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(DispatchError::MissingWorkerToken)?;
        if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(DispatchError::InvalidWorkerToken)
        }
    }

    fn requires_registration(&self) -> bool {
        false
    }

    fn matches(&self, _job: &Job, _tags: &TagSet) -> bool {
        true
    }
}

/// Feature-flagged queue for edge workers with capability tags.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    enabled: bool,
}

impl TagPolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(DispatchError::EdgeJobsDisabled)
        }
    }
}

impl DispatchPolicy for TagPolicy {
    fn name(&self) -> &'static str {
        "edge"
    }

    fn authorize_submit(&self) -> Result<()> {
        self.ensure_enabled()
    }

    fn authorize_worker(&self, _caller: &Caller) -> Result<()> {
        self.ensure_enabled()
    }

    fn requires_registration(&self) -> bool {
        true
    }

    fn matches(&self, job: &Job, tags: &TagSet) -> bool {
        job.requirements.is_satisfied_by(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::NewJob;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn token_policy_without_secret_is_unavailable() {
        let policy = TokenPolicy::new(Some(String::new()));
        let caller = Caller::worker("w").with_token("anything");
        assert!(matches!(
            policy.authorize_worker(&caller),
            Err(DispatchError::ProviderUnavailable)
        ));
    }

    #[test]
    fn token_policy_checks_bearer() {
        let policy = TokenPolicy::new(Some("s3cret".to_string()));
        assert!(matches!(
            policy.authorize_worker(&Caller::worker("w")),
            Err(DispatchError::MissingWorkerToken)
        ));
        assert!(matches!(
            policy.authorize_worker(&Caller::worker("w").with_token("nope")),
            Err(DispatchError::InvalidWorkerToken)
        ));
        assert!(policy
            .authorize_worker(&Caller::worker("w").with_token("s3cret"))
            .is_ok());
        assert!(policy.authorize_submit().is_ok());
    }

    #[test]
    fn token_policy_rejects_near_misses() {
        let policy = TokenPolicy::new(Some("s3cret".to_string()));
        for wrong in ["s3creT", "s3cre", "s3cret!", "S3CRET"] {
            assert!(
                matches!(
                    policy.authorize_worker(&Caller::worker("w").with_token(wrong)),
                    Err(DispatchError::InvalidWorkerToken)
                ),
                "{} accepted",
                wrong
            );
        }
    }

    #[test]
    fn tag_policy_flag_gates_everything() {
        let off = TagPolicy::new(false);
        assert!(matches!(
            off.authorize_submit(),
            Err(DispatchError::EdgeJobsDisabled)
        ));
        assert!(matches!(
            off.authorize_worker(&Caller::worker("w")),
            Err(DispatchError::EdgeJobsDisabled)
        ));
        let on = TagPolicy::new(true);
        assert!(on.authorize_submit().is_ok());
        assert!(on.authorize_worker(&Caller::default()).is_ok());
    }

    #[test]
    fn matching_rules() {
        let job = Job::new(
            NewJob::new("x", json!(null)).with_requirements(TagSet::parse_csv("gpu")),
            Utc::now(),
        );
        assert!(TokenPolicy::new(None).matches(&job, &TagSet::new()));
        assert!(!TagPolicy::new(true).matches(&job, &TagSet::new()));
        assert!(TagPolicy::new(true).matches(&job, &TagSet::parse_csv("GPU,wasm")));
    }

    #[test]
    fn caller_worker_id_trims_and_rejects_blank() {
        assert_eq!(Caller::worker(" w1 ").worker_id(), Some("w1"));
        assert_eq!(Caller::worker("   ").worker_id(), None);
        assert_eq!(Caller::default().worker_id(), None);
    }
}
