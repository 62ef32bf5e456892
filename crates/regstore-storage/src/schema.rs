use std::collections::BTreeMap;

use regstore_types::{FieldSelector, LabelSelector, ListOptions, Object, TypeMeta};
use regstore_watch::EventFilter;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub const FIELD_NAME: &str = "metadata.name";
pub const FIELD_NAMESPACE: &str = "metadata.namespace";

/// Describes the one kind a generic store instance serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSchema {
    pub api_version: String,
    pub kind: String,
    /// Backend key prefix, conventionally the lowercase plural kind.
    pub resource: String,
    pub namespaced: bool,
    /// Dotted `spec.` paths usable in field selectors, in addition to
    /// `metadata.name` and `metadata.namespace`.
    #[serde(default)]
    pub selectable_fields: Vec<String>,
}

impl ResourceSchema {
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            resource: resource.into(),
            namespaced: true,
            selectable_fields: Vec::new(),
        }
    }

    pub fn cluster_scoped(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            namespaced: false,
            ..Self::namespaced(api_version, kind, resource)
        }
    }

    pub fn with_selectable_field(mut self, path: impl Into<String>) -> Self {
        self.selectable_fields.push(path.into());
        self
    }

    pub fn type_meta(&self) -> TypeMeta {
        TypeMeta::new(self.api_version.clone(), self.kind.clone())
    }

    pub fn is_selectable(&self, field: &str) -> bool {
        field == FIELD_NAME
            || field == FIELD_NAMESPACE
            || self.selectable_fields.iter().any(|f| f == field)
    }

    /// Resolve every selectable field of `object` to its string form.
    ///
    /// Missing paths and `null` resolve to the empty string; non-string
    /// scalars and structures resolve to their JSON rendering.
    pub fn field_set(&self, object: &Object) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_NAME.to_string(), object.metadata.name.clone());
        fields.insert(
            FIELD_NAMESPACE.to_string(),
            object.metadata.namespace.clone().unwrap_or_default(),
        );
        for path in &self.selectable_fields {
            fields.insert(path.clone(), resolve_spec_path(&object.spec, path));
        }
        fields
    }
}

fn resolve_spec_path(spec: &serde_json::Value, path: &str) -> String {
    let Some(rest) = path.strip_prefix("spec.") else {
        return String::new();
    };
    let mut value = spec;
    for segment in rest.split('.') {
        match value.get(segment) {
            Some(next) => value = next,
            None => return String::new(),
        }
    }
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compiled list/watch filter: namespace, label selector and field selector.
#[derive(Debug, Clone)]
pub struct SelectionPredicate {
    schema: ResourceSchema,
    namespace: Option<String>,
    labels: LabelSelector,
    fields: FieldSelector,
}

impl SelectionPredicate {
    /// Compile a predicate, rejecting filters the schema cannot evaluate.
    pub fn new(
        schema: &ResourceSchema,
        namespace: Option<&str>,
        options: &ListOptions,
    ) -> StoreResult<Self> {
        if namespace.is_some() && !schema.namespaced {
            return Err(StoreError::InvalidFilter(format!(
                "{} is cluster-scoped and has no namespaces",
                schema.kind
            )));
        }
        if let Some(field) = options.field_selector.fields().find(|f| !schema.is_selectable(f)) {
            return Err(StoreError::InvalidFilter(format!(
                "field {field:?} is not selectable for {}",
                schema.kind
            )));
        }
        Ok(Self {
            schema: schema.clone(),
            namespace: namespace.map(str::to_string),
            labels: options.label_selector.clone(),
            fields: options.field_selector.clone(),
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn matches_object(&self, object: &Object) -> bool {
        if let Some(ns) = &self.namespace {
            if object.metadata.namespace.as_deref() != Some(ns.as_str()) {
                return false;
            }
        }
        if !self.labels.matches(&object.metadata.labels) {
            return false;
        }
        self.fields.is_empty() || self.fields.matches(&self.schema.field_set(object))
    }
}

impl EventFilter for SelectionPredicate {
    fn matches(&self, object: &Object) -> bool {
        self.matches_object(object)
    }
}
