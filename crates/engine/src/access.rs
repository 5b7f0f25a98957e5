// Role-gated access rules for leads.
//
// Every intent passes an explicit `Principal` into these predicates; there
// is no ambient session state, and nothing here caches a decision across
// calls. Role semantics: owner-admins see and move everything; members see
// only leads they own and may never reassign a stage, because a stage
// transition repositions the whole pipeline, not just their own record.

use std::collections::HashMap;

use async_trait::async_trait;
use leadflow_common::error::PipelineError;
use leadflow_common::types::{Lead, Principal, Role};
use tokio::sync::watch;
use uuid::Uuid;

// ── Predicates ──────────────────────────────────────────────────────

/// Whether the principal may see this lead at all.
pub fn can_view(principal: &Principal, lead: &Lead) -> bool {
    principal.is_admin() || lead.owner.is(principal.id)
}

/// Whether the principal may move leads between stages. Owning a lead does
/// not grant this.
pub fn can_mutate_stage(principal: &Principal) -> bool {
    principal.is_admin()
}

/// Whether the principal may delegate ownership of leads in bulk.
pub fn can_bulk_delegate(principal: &Principal) -> bool {
    principal.is_admin()
}

// ── Principal directory ─────────────────────────────────────────────

/// Read-only cache of known principals, keyed by id.
///
/// Principals are owned by the identity collaborator; the engine only holds
/// copies here so delegate eligibility can be answered without a round trip.
#[derive(Debug, Default)]
pub struct Directory {
    principals: HashMap<Uuid, Principal>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a cached principal.
    ///
    /// Enforces the hierarchy invariant: a member's `provisioned_by` must
    /// reference a known owner-admin, and admins have no provisioner.
    pub fn insert(&mut self, principal: Principal) -> Result<(), PipelineError> {
        match principal.role {
            Role::OwnerAdmin => {
                if principal.provisioned_by.is_some() {
                    return Err(PipelineError::validation(
                        "an owner-admin cannot have a provisioning admin",
                    ));
                }
            }
            Role::Member => {
                let admin = principal
                    .provisioned_by
                    .and_then(|id| self.principals.get(&id))
                    .ok_or_else(|| {
                        PipelineError::validation(
                            "a member must be provisioned by a known owner-admin",
                        )
                    })?;
                if !admin.is_admin() {
                    return Err(PipelineError::validation(
                        "a member cannot be provisioned by another member",
                    ));
                }
            }
        }
        self.principals.insert(principal.id, principal);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&Principal> {
        self.principals.get(&id)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    /// Principals eligible to receive delegated ownership from `principal`:
    /// an admin may delegate to itself and any member it provisioned; a
    /// member only to itself.
    pub fn eligible_delegates(&self, principal: &Principal) -> Vec<Principal> {
        let mut delegates = vec![principal.clone()];
        if principal.is_admin() {
            delegates.extend(
                self.principals
                    .values()
                    .filter(|p| p.role == Role::Member && p.provisioned_by == Some(principal.id))
                    .cloned(),
            );
        }
        // HashMap iteration order is arbitrary; keep the output stable.
        delegates.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        delegates.dedup_by_key(|p| p.id);
        delegates
    }
}

// ── Identity collaborator ───────────────────────────────────────────

/// Session lifecycle notifications from the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    RoleChanged,
    LoggedOut,
}

/// Supplies the current principal. Authoritative and read-only from the
/// engine's perspective; predicates re-read it on every intent rather than
/// assuming the session never changes.
pub trait IdentityProvider: Send + Sync {
    fn current_principal(&self) -> Principal;
    /// Watch for session changes. The initial value is `None`.
    fn session_events(&self) -> watch::Receiver<Option<SessionEvent>>;
}

/// Fixed-principal identity for standalone mode and tests.
pub struct StaticIdentity {
    principal: Principal,
    events_tx: watch::Sender<Option<SessionEvent>>,
}

impl StaticIdentity {
    pub fn new(principal: Principal) -> Self {
        let (events_tx, _) = watch::channel(None);
        Self { principal, events_tx }
    }

    /// Push a session event to watchers (test hook).
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(Some(event));
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_principal(&self) -> Principal {
        self.principal.clone()
    }

    fn session_events(&self) -> watch::Receiver<Option<SessionEvent>> {
        self.events_tx.subscribe()
    }
}

// ── Provisioning collaborator ───────────────────────────────────────

/// Creates member principals under an owner-admin. Credential handling
/// lives entirely on the collaborator's side of this boundary.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    async fn create_member(
        &self,
        admin: &Principal,
        name: &str,
        email: &str,
    ) -> Result<Principal, PipelineError>;
}

impl Directory {
    /// Provision a new member through the collaborator and cache it.
    pub async fn provision_member(
        &mut self,
        client: &dyn ProvisioningClient,
        admin: &Principal,
        name: &str,
        email: &str,
    ) -> Result<Principal, PipelineError> {
        if !admin.is_admin() {
            return Err(PipelineError::authorization("only an owner-admin may provision members"));
        }
        let member = client.create_member(admin, name, email).await?;
        self.insert(member.clone())?;
        Ok(member)
    }
}
