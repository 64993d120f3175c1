//! Caller identity and authorization rules.
//!
//! Authorization is a pure function of the caller context, the current
//! record (when one exists) and the requested [`Operation`]. Nothing here
//! touches the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ContractError, Result};
use crate::record::TouristRecord;

/// Role attribute carried by a caller's enrollment certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Registers tourists (tourism board, border desk)
    Issuer,
    /// Law enforcement
    Police,
    /// Network administrator
    Admin,
    /// End user with no privileged attribute
    Tourist,
}

impl Role {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Issuer => "issuer",
            Role::Police => "police",
            Role::Admin => "admin",
            Role::Tourist => "tourist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "issuer" => Ok(Role::Issuer),
            "police" => Ok(Role::Police),
            "admin" => Ok(Role::Admin),
            "tourist" | "" => Ok(Role::Tourist),
            other => Err(ContractError::InvalidArgument(format!("Unknown role '{other}'"))),
        }
    }
}

/// Explicit caller context passed into every contract method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Stable identity of the caller (certificate subject / user id)
    pub identity: String,
    /// Role attribute
    pub role: Role,
    /// Owning organization (MSP id)
    pub org: String,
}

impl CallerContext {
    /// Create a new caller context.
    pub fn new(identity: impl Into<String>, role: Role, org: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role,
            org: org.into(),
        }
    }

    pub fn issuer(identity: impl Into<String>, org: impl Into<String>) -> Self {
        Self::new(identity, Role::Issuer, org)
    }

    pub fn police(identity: impl Into<String>, org: impl Into<String>) -> Self {
        Self::new(identity, Role::Police, org)
    }

    pub fn admin(identity: impl Into<String>, org: impl Into<String>) -> Self {
        Self::new(identity, Role::Admin, org)
    }

    pub fn tourist(identity: impl Into<String>, org: impl Into<String>) -> Self {
        Self::new(identity, Role::Tourist, org)
    }
}

/// Contract operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    RecordEvent,
    Update,
    Suspend,
    Revoke,
    Reinstate,
    Verify,
    Read,
    Query,
    History,
    ListAll,
}

impl Operation {
    /// Roles admitted at the gate. `None` means any caller.
    pub fn gate_roles(&self) -> Option<&'static [Role]> {
        match self {
            Operation::Register => Some(&[Role::Issuer]),
            Operation::RecordEvent => Some(&[Role::Issuer, Role::Police, Role::Admin]),
            Operation::Update => Some(&[Role::Issuer, Role::Police, Role::Admin]),
            Operation::Suspend => Some(&[Role::Police, Role::Admin]),
            Operation::Revoke => Some(&[Role::Issuer, Role::Admin]),
            Operation::Reinstate => Some(&[Role::Issuer, Role::Police, Role::Admin]),
            Operation::Query => Some(&[Role::Police, Role::Issuer, Role::Admin]),
            Operation::History => Some(&[Role::Police, Role::Admin]),
            Operation::ListAll => Some(&[Role::Admin, Role::Police]),
            Operation::Verify | Operation::Read => None,
        }
    }

    /// Roles that may act on a record they did not issue.
    ///
    /// `None` means the operation has no record-level ownership rule.
    pub fn non_owner_roles(&self) -> Option<&'static [Role]> {
        match self {
            Operation::Update => Some(&[Role::Admin, Role::Police]),
            Operation::Revoke => Some(&[Role::Admin]),
            Operation::Reinstate => Some(&[Role::Police, Role::Admin]),
            _ => None,
        }
    }
}

fn role_list(roles: &[Role]) -> String {
    roles.iter().map(Role::as_str).collect::<Vec<_>>().join(",")
}

/// Access policy applied by the contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Organizations whose members pass every role gate
    #[serde(default)]
    pub trusted_orgs: Vec<String>,
}

impl AccessPolicy {
    /// Create a policy with trusted organizations.
    pub fn with_trusted_orgs(orgs: Vec<String>) -> Self {
        Self { trusted_orgs: orgs }
    }

    /// Check the role gate for an operation.
    pub fn check_gate(&self, caller: &CallerContext, op: Operation) -> Result<()> {
        let Some(allowed) = op.gate_roles() else {
            return Ok(());
        };
        if allowed.contains(&caller.role) || self.trusted_orgs.iter().any(|o| o == &caller.org) {
            return Ok(());
        }
        Err(ContractError::Unauthorized(format!(
            "Required role in [{}]. Caller role=\"{}\", org=\"{}\", id=\"{}\"",
            role_list(allowed),
            caller.role,
            caller.org,
            caller.identity
        )))
    }

    /// Check record-level ownership for an operation.
    pub fn check_record(
        &self,
        caller: &CallerContext,
        op: Operation,
        record: &TouristRecord,
    ) -> Result<()> {
        let Some(others) = op.non_owner_roles() else {
            return Ok(());
        };
        if caller.identity == record.issuer_id || others.contains(&caller.role) {
            return Ok(());
        }
        Err(ContractError::Unauthorized(format!(
            "Only the original issuer or [{}] may perform {:?} on {}",
            role_list(others),
            op,
            record.tourist_id
        )))
    }

    /// Full authorization: gate plus ownership when a record is supplied.
    pub fn authorize(
        &self,
        caller: &CallerContext,
        op: Operation,
        record: Option<&TouristRecord>,
    ) -> Result<()> {
        self.check_gate(caller, op)?;
        if let Some(record) = record {
            self.check_record(caller, op, record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;

    #[test]
    fn test_role_parse() {
        assert_eq!("Police".parse::<Role>().unwrap(), Role::Police);
        assert_eq!("".parse::<Role>().unwrap(), Role::Tourist);
        assert!("pirate".parse::<Role>().is_err());
    }

    #[test]
    fn test_register_requires_issuer() {
        let policy = AccessPolicy::default();
        let police = CallerContext::police("officer-1", "Org2MSP");
        let issuer = CallerContext::issuer("desk-1", "Org1MSP");

        assert!(policy.authorize(&police, Operation::Register, None).is_err());
        assert!(policy.authorize(&issuer, Operation::Register, None).is_ok());
    }

    #[test]
    fn test_trusted_org_passes_gate_only() {
        let policy = AccessPolicy::with_trusted_orgs(vec!["Org1MSP".to_string()]);
        let member = CallerContext::tourist("someone", "Org1MSP");
        let record = sample_record("t1", "desk-1");

        assert!(policy.check_gate(&member, Operation::Revoke).is_ok());
        // Ownership still applies
        assert!(policy.check_record(&member, Operation::Revoke, &record).is_err());
    }

    #[test]
    fn test_revoke_ownership() {
        let policy = AccessPolicy::default();
        let record = sample_record("t1", "desk-1");
        let owner = CallerContext::issuer("desk-1", "Org1MSP");
        let other_issuer = CallerContext::issuer("desk-2", "Org1MSP");
        let admin = CallerContext::admin("root", "Org1MSP");

        assert!(policy.authorize(&owner, Operation::Revoke, Some(&record)).is_ok());
        assert!(policy.authorize(&other_issuer, Operation::Revoke, Some(&record)).is_err());
        assert!(policy.authorize(&admin, Operation::Revoke, Some(&record)).is_ok());
    }

    #[test]
    fn test_verify_open_to_all() {
        let policy = AccessPolicy::default();
        let anyone = CallerContext::tourist("visitor", "Org3MSP");
        assert!(policy.authorize(&anyone, Operation::Verify, None).is_ok());
    }
}
