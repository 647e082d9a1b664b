//! Authorization capability for committing calculations.
//!
//! Role and permission rules live outside the engine. Callers obtain a
//! [`CalculationPermit`] either from an [`Authorizer`] (interactive users)
//! or via [`CalculationPermit::elevated`] (batch jobs); the engine only checks
//! that the permit covers the contract's tenant.

use folio_types::TenantId;

use crate::store::StoreAccess;
use crate::{Result, RoyaltyError};

/// Identifier of an interactive user.
pub type PrincipalId = u64;

/// Decides whether a principal may trigger calculations for a tenant.
pub trait Authorizer {
    fn may_calculate(&self, principal: PrincipalId, tenant_id: TenantId) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(PrincipalId, TenantId) -> bool,
{
    fn may_calculate(&self, principal: PrincipalId, tenant_id: TenantId) -> bool {
        self(principal, tenant_id)
    }
}

/// Proof that the caller may commit calculations for one tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalculationPermit {
    tenant_id: TenantId,
    access: StoreAccess,
}

impl CalculationPermit {
    /// Permit for background execution with service credentials.
    pub fn elevated(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            access: StoreAccess::Elevated,
        }
    }

    /// Ask `authorizer` for an interactive permit.
    ///
    /// # Errors
    ///
    /// - [`RoyaltyError::Unauthorized`] if the authorizer refuses
    pub fn authorize(
        authorizer: &dyn Authorizer,
        principal: PrincipalId,
        tenant_id: TenantId,
    ) -> Result<Self> {
        if !authorizer.may_calculate(principal, tenant_id) {
            tracing::warn!(principal, tenant_id, "calculation permit refused");
            return Err(RoyaltyError::Unauthorized { tenant_id });
        }
        Ok(Self {
            tenant_id,
            access: StoreAccess::Interactive {
                principal,
                tenant_id,
            },
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Storage credential carried by this permit.
    pub fn access(&self) -> &StoreAccess {
        &self.access
    }

    /// Whether the permit covers `tenant_id`.
    pub fn covers(&self, tenant_id: TenantId) -> bool {
        self.tenant_id == tenant_id
    }
}
