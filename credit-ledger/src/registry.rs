//! Project & MRV registry transitions
//!
//! Projects are registered once and never deleted; MRV evidence is anchored
//! against an existing project and indexed per project in insertion order.
//! After anchoring, only the evidence pointer of an MRV may be replaced:
//! correcting where the evidence lives is allowed, retroactively changing
//! the claimed sequestration is not.

use crate::{
    error::{Error, Result},
    state::LedgerState,
    types::{AccountId, EvidenceHash, Fact, Role},
};
use chrono::{DateTime, Utc};

impl LedgerState {
    /// Register a new project. Issuer only.
    pub fn register_project(
        &mut self,
        caller: AccountId,
        id: String,
        owner: AccountId,
        evidence_hash: EvidenceHash,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Issuer)?;
        if self.projects.contains_key(&id) {
            return Err(Error::Duplicate(format!("project {}", id)));
        }
        if owner.is_zero() {
            return Err(Error::InvalidArgument(
                "project owner is the null account".to_string(),
            ));
        }
        if evidence_hash.is_empty() {
            return Err(Error::InvalidArgument(
                "missing project evidence hash".to_string(),
            ));
        }

        let fact = Fact::ProjectRegistered {
            id,
            owner,
            evidence_hash,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Toggle a project's active flag. Governance only.
    pub fn set_project_status(
        &mut self,
        caller: AccountId,
        id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Fact>> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        let project = self
            .projects
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("project {}", id)))?;
        if project.active == active {
            return Ok(None);
        }

        let fact = Fact::ProjectStatusChanged {
            id: id.to_string(),
            active,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(Some(fact))
    }

    /// Anchor an MRV evidence package against an existing project. Issuer
    /// only. The id must be unique across the whole ledger.
    pub fn anchor_mrv(
        &mut self,
        caller: AccountId,
        id: String,
        project_id: String,
        evidence_hash: EvidenceHash,
        t_co2e: u64,
        auditor: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Issuer)?;
        if !self.projects.contains_key(&project_id) {
            return Err(Error::NotFound(format!("project {}", project_id)));
        }
        if self.mrvs.contains_key(&id) {
            return Err(Error::Duplicate(format!("mrv {}", id)));
        }
        if t_co2e == 0 {
            return Err(Error::InvalidArgument(
                "claimed tCO2e must be positive".to_string(),
            ));
        }
        if auditor.is_zero() {
            return Err(Error::InvalidArgument(
                "auditor is the null account".to_string(),
            ));
        }
        if evidence_hash.is_empty() {
            return Err(Error::InvalidArgument(
                "missing mrv evidence hash".to_string(),
            ));
        }

        let fact = Fact::MrvAnchored {
            id,
            project_id,
            evidence_hash,
            t_co2e,
            auditor,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Replace an MRV's evidence pointer. Issuer only. Amount and auditor
    /// stay immutable.
    pub fn update_mrv_hash(
        &mut self,
        caller: AccountId,
        id: &str,
        new_hash: EvidenceHash,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Issuer)?;
        if !self.mrvs.contains_key(id) {
            return Err(Error::NotFound(format!("mrv {}", id)));
        }
        if new_hash.is_empty() {
            return Err(Error::InvalidArgument(
                "missing mrv evidence hash".to_string(),
            ));
        }

        let fact = Fact::MrvHashUpdated {
            id: id.to_string(),
            evidence_hash: new_hash,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }
}
