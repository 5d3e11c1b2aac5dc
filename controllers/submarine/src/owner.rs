//! Owner links between children and their Submarine.
//!
//! A child records its owning root as a controller owner reference (kind,
//! name, UID). The root never lists its children; they are found by naming
//! convention and verified through this link.

use crate::error::ControllerError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// Weak back-reference from a child to its controlling owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerLink {
    /// Owner `apiVersion`
    pub api_version: String,
    /// Owner kind
    pub kind: String,
    /// Owner name, same namespace as the child
    pub name: String,
    /// Owner UID
    pub uid: String,
}

impl OwnerLink {
    /// Whether this link points at `root` (kind, name and UID must all match)
    pub fn points_to<R: Resource<DynamicType = ()>>(&self, root: &R) -> bool {
        self.kind == R::kind(&())
            && Some(self.name.as_str()) == root.meta().name.as_deref()
            && Some(self.uid.as_str()) == root.meta().uid.as_deref()
    }
}

impl From<&OwnerReference> for OwnerLink {
    fn from(reference: &OwnerReference) -> Self {
        Self {
            api_version: reference.api_version.clone(),
            kind: reference.kind.clone(),
            name: reference.name.clone(),
            uid: reference.uid.clone(),
        }
    }
}

/// What the event router needs from any watched object.
///
/// Implemented for every `kube::Resource`, so the router handles all kinds
/// the same way instead of branching per type.
pub trait OwnerResolvable {
    /// Current resource version
    fn resource_version(&self) -> Option<&str>;

    /// The controlling owner link, if any
    fn controller_owner(&self) -> Option<OwnerLink>;
}

impl<K: Resource> OwnerResolvable for K {
    fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    fn controller_owner(&self) -> Option<OwnerLink> {
        owner_of(self)
    }
}

/// Returns the controller owner link recorded on `object`
pub fn owner_of<K: Resource>(object: &K) -> Option<OwnerLink> {
    object
        .meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|reference| reference.controller == Some(true))
        .map(OwnerLink::from)
}

/// Records `root` as the controlling owner of `object`.
///
/// Any previous controller reference is replaced; other owners are kept.
pub fn set_owner<K, R>(object: &mut K, root: &R) -> Result<(), ControllerError>
where
    K: Resource,
    R: Resource<DynamicType = ()>,
{
    let mut reference = root.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::InvalidSpec(format!(
            "{} {} has no uid yet, cannot own children",
            R::kind(&()),
            root.meta().name.as_deref().unwrap_or_default()
        ))
    })?;
    let references = object.meta_mut().owner_references.get_or_insert_with(Vec::new);
    references.retain(|existing| existing.controller != Some(true));
    reference.block_owner_deletion = Some(true);
    references.push(reference);
    Ok(())
}
