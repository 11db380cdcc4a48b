//! The capability token carried on every graph operation.
//!
//! A [`CurrentViewer`] is built from an identity the authentication layer has
//! already verified. The unrestricted [`ViewerKind::InternalAdminOmni`]
//! variant has no path from [`VerifiedIdentity`]; only trusted in-process
//! callers reach it through [`CurrentViewer::omni`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{KeystoneError, Result};
use crate::types::{Node, OrgId, PersonId};

/// Capability variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "__typename")]
pub enum ViewerKind {
    LoggedOut,
    LoggedIn { person_id: PersonId, org_id: OrgId },
    AccessToken { person_id: PersonId, org_id: OrgId },
    InternalAdmin { org_id: OrgId },
    InternalAdminOmni,
}

/// Identity assertion produced by the authentication layer after it has
/// checked a session or token. Keystone never verifies tokens itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedIdentity {
    Session { person_id: PersonId, org_id: OrgId },
    AccessToken { person_id: PersonId, org_id: OrgId },
    AdminGrant { org_id: OrgId },
}

/// Per-type visibility rules, declared on a node spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Logged-out viewers may read nodes of this type.
    pub public_read: bool,
    /// A logged-in viewer may reach the node whose id equals their person id,
    /// even outside their org.
    pub self_referential: bool,
}

impl AccessPolicy {
    pub const fn private() -> Self {
        Self {
            public_read: false,
            self_referential: false,
        }
    }

    pub const fn public() -> Self {
        Self {
            public_read: true,
            self_referential: false,
        }
    }

    pub const fn self_referential() -> Self {
        Self {
            public_read: false,
            self_referential: true,
        }
    }
}

/// The caller's identity plus a revocation flag shared by every clone.
#[derive(Clone)]
pub struct CurrentViewer {
    kind: ViewerKind,
    revoked: Arc<AtomicBool>,
}

impl CurrentViewer {
    fn from_kind(kind: ViewerKind) -> Self {
        Self {
            kind,
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn logged_out() -> Self {
        Self::from_kind(ViewerKind::LoggedOut)
    }

    pub fn logged_in(person_id: PersonId, org_id: OrgId) -> Self {
        Self::from_kind(ViewerKind::LoggedIn { person_id, org_id })
    }

    pub fn access_token(person_id: PersonId, org_id: OrgId) -> Self {
        Self::from_kind(ViewerKind::AccessToken { person_id, org_id })
    }

    pub fn internal_admin(org_id: OrgId) -> Self {
        Self::from_kind(ViewerKind::InternalAdmin { org_id })
    }

    /// Unrestricted viewer for trusted internal scripts. Must never be built
    /// from request input.
    pub fn omni() -> Self {
        Self::from_kind(ViewerKind::InternalAdminOmni)
    }

    /// Build a viewer from an already-verified identity; `None` means the
    /// request carried no valid credentials.
    pub fn from_identity(identity: Option<VerifiedIdentity>) -> Self {
        match identity {
            None => Self::logged_out(),
            Some(VerifiedIdentity::Session { person_id, org_id }) => {
                Self::logged_in(person_id, org_id)
            }
            Some(VerifiedIdentity::AccessToken { person_id, org_id }) => {
                Self::access_token(person_id, org_id)
            }
            Some(VerifiedIdentity::AdminGrant { org_id }) => Self::internal_admin(org_id),
        }
    }

    pub fn kind(&self) -> &ViewerKind {
        &self.kind
    }

    /// API type name of the viewer variant.
    pub fn typename(&self) -> &'static str {
        match self.kind {
            ViewerKind::LoggedOut => "CurrentViewerLoggedOut",
            ViewerKind::LoggedIn { .. } => "CurrentViewerLoggedIn",
            ViewerKind::AccessToken { .. } => "CurrentViewerAccessToken",
            ViewerKind::InternalAdmin { .. } => "CurrentViewerInternalAdmin",
            ViewerKind::InternalAdminOmni => "CurrentViewerInternalAdminOmni",
        }
    }

    pub fn org_id(&self) -> Option<&OrgId> {
        match &self.kind {
            ViewerKind::LoggedIn { org_id, .. }
            | ViewerKind::AccessToken { org_id, .. }
            | ViewerKind::InternalAdmin { org_id } => Some(org_id),
            ViewerKind::LoggedOut | ViewerKind::InternalAdminOmni => None,
        }
    }

    pub fn person_id(&self) -> Option<&PersonId> {
        match &self.kind {
            ViewerKind::LoggedIn { person_id, .. } | ViewerKind::AccessToken { person_id, .. } => {
                Some(person_id)
            }
            _ => None,
        }
    }

    pub fn is_omni(&self) -> bool {
        matches!(self.kind, ViewerKind::InternalAdminOmni)
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self.kind, ViewerKind::LoggedOut)
    }

    /// Invalidate this viewer and every clone of it. Operations already in
    /// flight are not interrupted; new ones fail with `Unauthorized`.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.is_revoked() {
            return Err(self.deny("viewer has been revoked"));
        }
        Ok(())
    }

    /// Owner scope for a query over nodes governed by `policy`.
    /// `Ok(None)` means unscoped.
    pub fn read_scope(&self, policy: AccessPolicy) -> Result<Option<OrgId>> {
        self.ensure_active()?;
        match &self.kind {
            ViewerKind::InternalAdminOmni => Ok(None),
            ViewerKind::LoggedOut if policy.public_read => Ok(None),
            ViewerKind::LoggedOut => Err(self.deny("type is not publicly readable")),
            _ => Ok(self.org_id().cloned()),
        }
    }

    /// Owner scope for edge lookups. Logged-out viewers only traverse from
    /// nodes they were already allowed to read, so they are unscoped.
    pub fn edge_scope(&self) -> Result<Option<OrgId>> {
        self.ensure_active()?;
        Ok(self.org_id().cloned())
    }

    /// Visibility test without logging; used to filter traversal neighbours.
    pub fn can_read(&self, node: &Node, policy: AccessPolicy) -> bool {
        if self.is_revoked() {
            return false;
        }
        match &self.kind {
            ViewerKind::InternalAdminOmni => true,
            ViewerKind::InternalAdmin { org_id } => &node.owner_id == org_id,
            ViewerKind::LoggedIn { person_id, org_id }
            | ViewerKind::AccessToken { person_id, org_id } => {
                &node.owner_id == org_id
                    || (policy.self_referential && node.id.as_str() == person_id.as_str())
            }
            ViewerKind::LoggedOut => policy.public_read,
        }
    }

    pub fn check_read(&self, node: &Node, policy: AccessPolicy) -> Result<()> {
        self.ensure_active()?;
        if self.can_read(node, policy) {
            Ok(())
        } else {
            Err(self.deny(&format!("cannot read {node}")))
        }
    }

    pub fn check_write(&self, node: &Node, policy: AccessPolicy) -> Result<()> {
        if self.is_logged_out() {
            return Err(self.deny(&format!("cannot modify {node}")));
        }
        self.check_read(node, policy)
            .map_err(|_| self.deny(&format!("cannot modify {node}")))
    }

    /// Owner assigned to nodes this viewer creates without naming one.
    pub fn default_owner(&self) -> Result<OrgId> {
        self.ensure_active()?;
        match &self.kind {
            ViewerKind::LoggedOut => Err(self.deny("logged-out viewers cannot create nodes")),
            ViewerKind::InternalAdminOmni => {
                Err(self.deny("omni viewers must name an explicit owner"))
            }
            _ => self
                .org_id()
                .cloned()
                .ok_or_else(|| self.deny("viewer has no org")),
        }
    }

    /// Check that this viewer may create nodes owned by `owner`.
    pub fn check_owner(&self, owner: &OrgId) -> Result<()> {
        self.ensure_active()?;
        match &self.kind {
            ViewerKind::InternalAdminOmni => Ok(()),
            ViewerKind::LoggedOut => Err(self.deny("logged-out viewers cannot create nodes")),
            _ if self.org_id() == Some(owner) => Ok(()),
            _ => Err(self.deny(&format!("cannot create nodes owned by {owner}"))),
        }
    }

    /// Owner recorded on edges this viewer creates.
    pub fn edge_owner(&self) -> OrgId {
        self.org_id().cloned().unwrap_or_else(|| OrgId(String::new()))
    }

    fn deny(&self, reason: &str) -> KeystoneError {
        tracing::warn!(viewer = %self, reason, "Capability check failed");
        KeystoneError::Unauthorized(format!("{}: {reason}", self.typename()))
    }
}

impl fmt::Debug for CurrentViewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentViewer")
            .field("kind", &self.kind)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

impl fmt::Display for CurrentViewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViewerKind::LoggedOut => write!(f, "LoggedOut"),
            ViewerKind::LoggedIn { person_id, org_id } => {
                write!(f, "LoggedIn({person_id}@{org_id})")
            }
            ViewerKind::AccessToken { person_id, org_id } => {
                write!(f, "AccessToken({person_id}@{org_id})")
            }
            ViewerKind::InternalAdmin { org_id } => write!(f, "InternalAdmin({org_id})"),
            ViewerKind::InternalAdminOmni => write!(f, "InternalAdminOmni"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewNode, NodeId, Props};

    fn node(id: &str, owner: &str) -> Node {
        Node::new(NewNode {
            id: Some(NodeId::from(id)),
            type_name: "Doc".into(),
            owner_id: OrgId::from(owner),
            properties: Props::new(),
        })
    }

    #[test]
    fn logged_in_is_confined_to_its_org() {
        let cv = CurrentViewer::logged_in(PersonId::from("p-1"), OrgId::from("o-1"));
        assert!(cv.check_read(&node("n-1", "o-1"), AccessPolicy::private()).is_ok());
        let err = cv
            .check_read(&node("n-2", "o-2"), AccessPolicy::private())
            .unwrap_err();
        assert!(matches!(err, KeystoneError::Unauthorized(_)));
    }

    #[test]
    fn omni_reads_everything() {
        let cv = CurrentViewer::omni();
        assert!(cv.check_read(&node("n-2", "o-2"), AccessPolicy::private()).is_ok());
        assert_eq!(cv.read_scope(AccessPolicy::private()).unwrap(), None);
    }

    #[test]
    fn self_referential_types_match_person_id() {
        let cv = CurrentViewer::logged_in(PersonId::from("p-1"), OrgId::from("o-1"));
        let me = node("p-1", "o-other");
        assert!(cv.check_read(&me, AccessPolicy::self_referential()).is_ok());
        assert!(cv.check_read(&me, AccessPolicy::private()).is_err());
    }

    #[test]
    fn internal_admin_skips_person_checks_but_keeps_org_scope() {
        let cv = CurrentViewer::internal_admin(OrgId::from("o-1"));
        assert!(cv.check_write(&node("n-1", "o-1"), AccessPolicy::private()).is_ok());
        assert!(cv
            .check_read(&node("p-1", "o-2"), AccessPolicy::self_referential())
            .is_err());
    }

    #[test]
    fn logged_out_reads_only_public_types_and_never_writes() {
        let cv = CurrentViewer::logged_out();
        let n = node("n-1", "o-1");
        assert!(cv.check_read(&n, AccessPolicy::public()).is_ok());
        assert!(cv.check_read(&n, AccessPolicy::private()).is_err());
        assert!(cv.check_write(&n, AccessPolicy::public()).is_err());
        assert!(cv.read_scope(AccessPolicy::private()).is_err());
        assert!(cv.default_owner().is_err());
    }

    #[test]
    fn revocation_applies_to_every_clone() {
        let cv = CurrentViewer::logged_in(PersonId::from("p-1"), OrgId::from("o-1"));
        let held_by_request = cv.clone();
        cv.revoke();
        let err = held_by_request
            .check_read(&node("n-1", "o-1"), AccessPolicy::private())
            .unwrap_err();
        assert!(matches!(err, KeystoneError::Unauthorized(_)));
    }

    #[test]
    fn identity_never_yields_omni() {
        let admin = CurrentViewer::from_identity(Some(VerifiedIdentity::AdminGrant {
            org_id: OrgId::from("o-1"),
        }));
        assert_eq!(admin.typename(), "CurrentViewerInternalAdmin");
        assert!(!admin.is_omni());
        assert!(CurrentViewer::from_identity(None).is_logged_out());
    }

    #[test]
    fn omni_must_name_owner_and_may_name_any() {
        let cv = CurrentViewer::omni();
        assert!(cv.default_owner().is_err());
        assert!(cv.check_owner(&OrgId::from("o-9")).is_ok());

        let member = CurrentViewer::access_token(PersonId::from("p"), OrgId::from("o-1"));
        assert_eq!(member.default_owner().unwrap(), OrgId::from("o-1"));
        assert!(member.check_owner(&OrgId::from("o-2")).is_err());
    }
}
