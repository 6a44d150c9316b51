//! Caller identities and the ward set gating every mutating operation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque caller identity presented to mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller(Uuid);

impl Caller {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn uuid(self) -> Uuid {
        self.0
    }
}

impl Default for Caller {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("caller {0} is not a ward")]
pub struct NotAuthorized(pub Caller);

/// The set of callers permitted to mutate a subsystem. Membership changes are
/// themselves ward-gated.
#[derive(Debug, Clone)]
pub struct WardSet {
    wards: HashSet<Caller>,
}

impl WardSet {
    pub fn new(admin: Caller) -> Self {
        let mut wards = HashSet::new();
        wards.insert(admin);
        Self { wards }
    }

    pub fn ensure(&self, caller: Caller) -> Result<(), NotAuthorized> {
        if self.wards.contains(&caller) {
            Ok(())
        } else {
            Err(NotAuthorized(caller))
        }
    }

    pub fn is_ward(&self, caller: Caller) -> bool {
        self.wards.contains(&caller)
    }

    pub fn authorize(&mut self, caller: Caller, new: Caller) -> Result<(), NotAuthorized> {
        self.ensure(caller)?;
        self.wards.insert(new);
        Ok(())
    }

    pub fn revoke(&mut self, caller: Caller, old: Caller) -> Result<(), NotAuthorized> {
        self.ensure(caller)?;
        self.wards.remove(&old);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_admin_is_ward() {
        let admin = Caller::new();
        let wards = WardSet::new(admin);
        assert!(wards.is_ward(admin));
        assert!(wards.ensure(admin).is_ok());
    }

    #[test]
    fn test_stranger_is_rejected() {
        let wards = WardSet::new(Caller::new());
        let stranger = Caller::new();
        assert_matches!(wards.ensure(stranger), Err(NotAuthorized(c)) if c == stranger);
    }

    #[test]
    fn test_authorize_and_revoke() -> Result<()> {
        let admin = Caller::new();
        let mut wards = WardSet::new(admin);
        let operator = Caller::new();

        wards.authorize(admin, operator)?;
        assert!(wards.is_ward(operator));

        wards.revoke(admin, operator)?;
        assert!(!wards.is_ward(operator));
        Ok(())
    }

    #[test]
    fn test_non_ward_cannot_authorize() {
        let mut wards = WardSet::new(Caller::new());
        let stranger = Caller::new();
        assert_matches!(
            wards.authorize(stranger, Caller::new()),
            Err(NotAuthorized(_))
        );
    }

    #[test]
    fn test_caller_ids_are_unique() {
        assert_ne!(Caller::new(), Caller::new());
    }
}
