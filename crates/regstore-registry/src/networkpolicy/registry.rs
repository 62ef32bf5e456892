use std::sync::Arc;

use regstore_admission::ValidationChain;
use regstore_storage::{
    Backend, ConfigError, GenericStore, StandardStorage, StoreConfig, StoreResult,
};
use regstore_types::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, RequestContext, UpdateOptions,
};

use super::types::{NetworkPolicy, NetworkPolicyList};
use crate::typed::{TypedStorage, TypedWatch};

/// Everything that knows how to store network policies.
pub trait NetworkPolicyRegistry: Send + Sync {
    fn list_network_policies(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> StoreResult<NetworkPolicyList>;

    fn create_network_policy(
        &self,
        ctx: &RequestContext,
        policy: &NetworkPolicy,
        create_validation: &ValidationChain,
    ) -> StoreResult<NetworkPolicy>;

    /// Replace an existing policy. Never creates.
    fn update_network_policy(
        &self,
        ctx: &RequestContext,
        policy: &NetworkPolicy,
        create_validation: &ValidationChain,
        update_validation: &ValidationChain,
        options: &UpdateOptions,
    ) -> StoreResult<NetworkPolicy>;

    fn get_network_policy(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> StoreResult<NetworkPolicy>;

    fn delete_network_policy(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &DeleteOptions,
    ) -> StoreResult<NetworkPolicy>;

    fn watch_network_policies(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> StoreResult<TypedWatch<NetworkPolicy>>;
}

/// Registry backed by a [`StandardStorage`] for the kind.
#[derive(Clone, Debug)]
pub struct NetworkPolicyStorage {
    typed: TypedStorage<NetworkPolicy>,
}

impl NetworkPolicyStorage {
    pub fn typed(&self) -> &TypedStorage<NetworkPolicy> {
        &self.typed
    }
}

/// Build a registry over `storage`.
///
/// # Panics
///
/// If `storage` does not serve `NetworkPolicy`, or later returns an object
/// that does not decode as one.
pub fn new_registry(storage: Arc<dyn StandardStorage>) -> Arc<dyn NetworkPolicyRegistry> {
    Arc::new(NetworkPolicyStorage {
        typed: TypedStorage::new(storage),
    })
}

/// Wire a generic store for network policies over `backend`.
pub fn network_policy_storage<B: Backend + 'static>(
    backend: Arc<B>,
    config: StoreConfig,
) -> Result<Arc<dyn StandardStorage>, ConfigError> {
    let store = GenericStore::new(NetworkPolicy::schema(), backend, config)?;
    Ok(Arc::new(store))
}

impl NetworkPolicyRegistry for NetworkPolicyStorage {
    fn list_network_policies(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> StoreResult<NetworkPolicyList> {
        self.typed.list(ctx, options)
    }

    fn create_network_policy(
        &self,
        ctx: &RequestContext,
        policy: &NetworkPolicy,
        create_validation: &ValidationChain,
    ) -> StoreResult<NetworkPolicy> {
        self.typed
            .create(ctx, policy, create_validation, &CreateOptions::default())
    }

    fn update_network_policy(
        &self,
        ctx: &RequestContext,
        policy: &NetworkPolicy,
        create_validation: &ValidationChain,
        update_validation: &ValidationChain,
        options: &UpdateOptions,
    ) -> StoreResult<NetworkPolicy> {
        self.typed
            .update(ctx, policy, create_validation, update_validation, false, options)
            .map(|(policy, _)| policy)
    }

    fn get_network_policy(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> StoreResult<NetworkPolicy> {
        self.typed.get(ctx, name, options)
    }

    fn delete_network_policy(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &DeleteOptions,
    ) -> StoreResult<NetworkPolicy> {
        self.typed.delete(ctx, name, options)
    }

    fn watch_network_policies(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> StoreResult<TypedWatch<NetworkPolicy>> {
        self.typed.watch(ctx, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regstore_admission::{hook_fn, HookDecision};
    use regstore_storage::{InMemoryBackend, ResourceSchema, StoreError, UpdatedObjectInfo};
    use regstore_types::{FieldSelector, Object, ResourceVersion};
    use regstore_watch::{WatchErrorKind, WatchSession};

    use crate::networkpolicy::types::{NetworkPolicyIngressRule, NetworkPolicySpec, PolicyType};
    use crate::typed::TypedEvent;

    fn registry_with(config: StoreConfig) -> Arc<dyn NetworkPolicyRegistry> {
        let backend = Arc::new(InMemoryBackend::with_config(&config));
        new_registry(network_policy_storage(backend, config).unwrap())
    }

    fn registry() -> Arc<dyn NetworkPolicyRegistry> {
        registry_with(StoreConfig::default())
    }

    fn ctx() -> RequestContext {
        RequestContext::with_namespace("default")
    }

    fn rv(raw: u64) -> ResourceVersion {
        ResourceVersion::from_raw(raw)
    }

    fn none() -> ValidationChain {
        ValidationChain::new()
    }

    fn allow_ingress() -> NetworkPolicySpec {
        NetworkPolicySpec {
            policy_types: vec![PolicyType::Ingress],
            ingress: vec![NetworkPolicyIngressRule::default()],
            ..NetworkPolicySpec::default()
        }
    }

    #[test]
    fn deny_all_scenario() {
        let registry = registry();

        let created = registry
            .create_network_policy(&ctx(), &NetworkPolicy::deny_all("default", "deny-all"), &none())
            .unwrap();
        assert_eq!(created.metadata.resource_version.to_string(), "1");

        let mut next = created.clone().with_spec(allow_ingress());
        next.metadata.resource_version = ResourceVersion::parse("1").unwrap();
        let updated = registry
            .update_network_policy(&ctx(), &next, &none(), &none(), &UpdateOptions::default())
            .unwrap();
        assert_eq!(updated.metadata.resource_version.to_string(), "2");
        assert_eq!(updated.spec, allow_ingress());

        let err = registry
            .update_network_policy(&ctx(), &next, &none(), &none(), &UpdateOptions::default())
            .unwrap_err();
        assert!(err.is_conflict());

        let deleted = registry
            .delete_network_policy(&ctx(), "deny-all", &DeleteOptions::with_resource_version(rv(2)))
            .unwrap();
        assert_eq!(deleted.spec, allow_ingress());

        let err = registry
            .get_network_policy(&ctx(), "deny-all", &GetOptions::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn spec_less_object_from_generic_client_reads_back_typed() {
        use regstore_types::{ObjectMeta, Resource};

        let config = StoreConfig::default();
        let backend = Arc::new(InMemoryBackend::with_config(&config));
        let storage = network_policy_storage(backend, config).unwrap();
        let registry = new_registry(Arc::clone(&storage));

        let bare = Object::new(
            NetworkPolicy::type_meta(),
            ObjectMeta::namespaced("default", "bare"),
            serde_json::Value::Null,
        );
        storage
            .create(&ctx(), bare, &none(), &CreateOptions::default())
            .unwrap();

        let listed = registry
            .list_network_policies(&ctx(), &ListOptions::default())
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed.items[0].spec, NetworkPolicySpec::default());
        let got = registry
            .get_network_policy(&ctx(), "bare", &GetOptions::default())
            .unwrap();
        assert!(got.spec.pod_selector.is_empty());
    }

    #[test]
    fn dry_run_delete_passes_through() {
        let registry = registry();
        let created = registry
            .create_network_policy(&ctx(), &NetworkPolicy::deny_all("default", "keep"), &none())
            .unwrap();

        let mut options = DeleteOptions::with_resource_version(rv(1));
        options.dry_run = true;
        let would_delete = registry
            .delete_network_policy(&ctx(), "keep", &options)
            .unwrap();
        assert_eq!(would_delete, created);

        let still = registry
            .get_network_policy(&ctx(), "keep", &GetOptions::default())
            .unwrap();
        assert_eq!(still.metadata.resource_version, rv(1));

        options.preconditions.resource_version = Some(rv(9));
        let err = registry
            .delete_network_policy(&ctx(), "keep", &options)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn update_never_creates() {
        let err = registry()
            .update_network_policy(
                &ctx(),
                &NetworkPolicy::deny_all("default", "ghost"),
                &none(),
                &none(),
                &UpdateOptions::default(),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn store_errors_pass_through() {
        let registry = registry();
        let policy = NetworkPolicy::deny_all("default", "p");
        registry.create_network_policy(&ctx(), &policy, &none()).unwrap();
        assert!(matches!(
            registry.create_network_policy(&ctx(), &policy, &none()),
            Err(StoreError::AlreadyExists { .. })
        ));

        let deny = ValidationChain::new().with_hook(hook_fn("deny", |_, _, _| {
            HookDecision::fail("no policies on fridays")
        }));
        let other = NetworkPolicy::deny_all("default", "q");
        match registry.create_network_policy(&ctx(), &other, &deny) {
            Err(StoreError::ValidationFailed { source, .. }) => {
                assert_eq!(source.reason(), "no policies on fridays");
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn list_is_typed_and_filterable_by_name() {
        let registry = registry();
        for name in ["b", "a", "c"] {
            registry
                .create_network_policy(&ctx(), &NetworkPolicy::deny_all("default", name), &none())
                .unwrap();
        }
        let list = registry
            .list_network_policies(&ctx(), &ListOptions::default())
            .unwrap();
        let names: Vec<_> = list.items.iter().map(NetworkPolicy::name).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(list.resource_version, rv(3));

        let only_b = ListOptions::default().with_fields(FieldSelector::equals("metadata.name", "b"));
        assert_eq!(registry.list_network_policies(&ctx(), &only_b).unwrap().len(), 1);

        let by_spec = ListOptions::default()
            .with_fields(FieldSelector::equals("spec.podSelector", "x"));
        assert!(matches!(
            registry.list_network_policies(&ctx(), &by_spec),
            Err(StoreError::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn watch_yields_typed_events() {
        let registry = registry();
        let mut watch = registry
            .watch_network_policies(&ctx(), &ListOptions::default())
            .unwrap();
        let created = registry
            .create_network_policy(&ctx(), &NetworkPolicy::deny_all("default", "p"), &none())
            .unwrap();
        registry
            .delete_network_policy(&ctx(), "p", &DeleteOptions::default())
            .unwrap();

        match watch.next().await {
            Some(TypedEvent::Added(policy)) => assert_eq!(policy, created),
            other => panic!("expected Added, got {other:?}"),
        }
        let deleted = watch.next().await.unwrap();
        assert_eq!(deleted.type_name(), "DELETED");
        assert_eq!(deleted.revision(), rv(2));
    }

    #[test]
    fn typed_watch_surfaces_overflow() {
        let registry = registry_with(StoreConfig {
            watch_queue_capacity: 1,
            ..StoreConfig::default()
        });
        let mut watch = registry
            .watch_network_policies(&ctx(), &ListOptions::default())
            .unwrap();
        for name in ["a", "b", "c"] {
            registry
                .create_network_policy(&ctx(), &NetworkPolicy::deny_all("default", name), &none())
                .unwrap();
        }
        assert!(matches!(watch.try_next(), Some(TypedEvent::Added(_))));
        match watch.try_next() {
            Some(TypedEvent::Error(e)) => assert_eq!(e.kind, WatchErrorKind::Overflow),
            other => panic!("expected overflow, got {other:?}"),
        }
        assert!(watch.try_next().is_none());
        assert!(watch.is_finished());
    }

    #[test]
    #[should_panic(expected = "bound to storage for")]
    fn registry_over_other_kind_panics() {
        let config = StoreConfig::default();
        let store = GenericStore::new(
            ResourceSchema::namespaced("example.io/v1", "Widget", "widgets"),
            Arc::new(InMemoryBackend::with_config(&config)),
            config,
        )
        .unwrap();
        let _ = new_registry(Arc::new(store));
    }

    /// Serves the NetworkPolicy schema but hands back objects of another
    /// kind from `get`.
    struct Mislabelled(GenericStore<InMemoryBackend>);

    impl StandardStorage for Mislabelled {
        fn schema(&self) -> &ResourceSchema {
            self.0.schema()
        }
        fn get(&self, ctx: &RequestContext, name: &str, o: &GetOptions) -> StoreResult<Object> {
            let mut object = self.0.get(ctx, name, o)?;
            object.type_meta.kind = "Widget".into();
            Ok(object)
        }
        fn list(&self, ctx: &RequestContext, o: &ListOptions) -> StoreResult<regstore_types::ObjectList> {
            self.0.list(ctx, o)
        }
        fn create(
            &self,
            ctx: &RequestContext,
            object: Object,
            v: &ValidationChain,
            o: &CreateOptions,
        ) -> StoreResult<Object> {
            self.0.create(ctx, object, v, o)
        }
        fn update(
            &self,
            ctx: &RequestContext,
            name: &str,
            info: &dyn UpdatedObjectInfo,
            c: &ValidationChain,
            u: &ValidationChain,
            force: bool,
            o: &UpdateOptions,
        ) -> StoreResult<(Object, bool)> {
            self.0.update(ctx, name, info, c, u, force, o)
        }
        fn delete(&self, ctx: &RequestContext, name: &str, o: &DeleteOptions) -> StoreResult<Object> {
            self.0.delete(ctx, name, o)
        }
        fn watch(&self, ctx: &RequestContext, o: &ListOptions) -> StoreResult<WatchSession> {
            self.0.watch(ctx, o)
        }
    }

    #[test]
    #[should_panic(expected = "incompatible object")]
    fn narrowing_a_foreign_object_panics() {
        let config = StoreConfig::default();
        let store = GenericStore::new(
            NetworkPolicy::schema(),
            Arc::new(InMemoryBackend::with_config(&config)),
            config,
        )
        .unwrap();
        let registry = new_registry(Arc::new(Mislabelled(store)));
        registry
            .create_network_policy(&ctx(), &NetworkPolicy::deny_all("default", "p"), &none())
            .unwrap();
        let _ = registry.get_network_policy(&ctx(), "p", &GetOptions::default());
    }
}
