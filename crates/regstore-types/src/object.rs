use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::key::ObjectKey;
use crate::meta::{ObjectMeta, TypeMeta};
use crate::version::ResourceVersion;

/// Type-erased resource object.
///
/// This is the only representation the generic store understands: type
/// and object metadata it interprets, plus a `spec` payload it never looks
/// into (except to resolve selectable fields). Objects are immutable once
/// returned by the store; every mutation commits a new instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl Object {
    pub fn new(type_meta: TypeMeta, metadata: ObjectMeta, spec: serde_json::Value) -> Self {
        Self {
            type_meta,
            metadata,
            spec,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn kind(&self) -> &str {
        &self.type_meta.kind
    }

    pub fn resource_version(&self) -> ResourceVersion {
        self.metadata.resource_version
    }
}

/// Result of a list call: matching objects in key order, the list version
/// the enumeration was taken at, and an optional continuation token when
/// the result was truncated by a limit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectList {
    pub items: Vec<Object>,
    pub resource_version: ResourceVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_item_count: Option<u64>,
}

/// A concrete resource kind that can be widened into an [`Object`] and
/// narrowed back.
///
/// Typed registries are generic over this trait; the generic store never
/// sees it.
pub trait Resource: Clone + Send + Sync + Sized + 'static {
    /// API group/version, e.g. `networking.k8s.io/v1`.
    const API_VERSION: &'static str;
    /// Kind name, e.g. `NetworkPolicy`.
    const KIND: &'static str;
    /// Whether objects of this kind live in a namespace.
    const NAMESPACED: bool;

    /// Kind-specific payload.
    type Spec: Serialize + DeserializeOwned;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self;

    fn into_parts(self) -> (ObjectMeta, Self::Spec);

    fn type_meta() -> TypeMeta {
        TypeMeta::new(Self::API_VERSION, Self::KIND)
    }

    /// Widen into the store's generic object.
    fn into_object(self) -> Result<Object, TypeError> {
        let (metadata, spec) = self.into_parts();
        let spec =
            serde_json::to_value(spec).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(Object::new(Self::type_meta(), metadata, spec))
    }

    /// Narrow a generic object into this kind.
    ///
    /// A missing (`null`) payload decodes as an empty JSON object, so kinds
    /// whose spec fields all default accept spec-less objects.
    ///
    /// Fails with [`TypeError::KindMismatch`] if the object is of another
    /// kind, or [`TypeError::Serialization`] if its payload does not decode.
    fn try_from_object(object: Object) -> Result<Self, TypeError> {
        if object.type_meta.kind != Self::KIND {
            return Err(TypeError::KindMismatch {
                expected: Self::KIND.to_string(),
                found: object.type_meta.kind,
            });
        }
        let payload = match object.spec {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other,
        };
        let spec: Self::Spec = serde_json::from_value(payload)
            .map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(Self::from_parts(object.metadata, spec))
    }
}
