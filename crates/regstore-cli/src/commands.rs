use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use regstore_admission::ValidationChain;
use regstore_registry::{
    network_policy_storage, new_registry, NetworkPolicy, NetworkPolicyList, TypedEvent,
};
use regstore_storage::{InMemoryBackend, StoreConfig};
use regstore_types::{
    GetOptions, LabelSelector, ListOptions, Object, RequestContext, Resource, ResourceVersion,
    UpdateOptions,
};
use tracing::{debug, info};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    match cli.command {
        Command::Apply(ref args) => cmd_apply(&cli, args, config),
        Command::Config(_) => cmd_config(&cli.format, &config),
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// What one `apply` run observed.
struct ApplyReport {
    created: usize,
    updated: usize,
    events: Vec<TypedEvent<NetworkPolicy>>,
    list: NetworkPolicyList,
}

fn cmd_apply(cli: &Cli, args: &ApplyArgs, config: StoreConfig) -> anyhow::Result<()> {
    let mut policies = Vec::new();
    for file in &args.files {
        policies.extend(load_manifests(file, &cli.namespace)?);
    }

    let mut list_options = ListOptions::default();
    if let Some(selector) = &args.selector {
        let selector = LabelSelector::parse(selector)
            .map_err(|e| anyhow::anyhow!("invalid selector {selector:?}: {e}"))?;
        list_options = list_options.with_labels(selector);
    }
    let list_ctx = if args.all_namespaces {
        RequestContext::new()
    } else {
        RequestContext::with_namespace(cli.namespace.clone())
    };

    let report = apply(policies, config, &list_ctx, &list_options)?;
    match cli.format {
        OutputFormat::Text => print_report_text(&report),
        OutputFormat::Json => print_report_json(&report)?,
    }
    Ok(())
}

/// Read one manifest file holding a single policy or an array of them.
///
/// Policies without a namespace land in `namespace`. Server-owned metadata
/// is cleared so every manifest applies cleanly.
fn load_manifests(path: &Path, namespace: &str) -> anyhow::Result<Vec<NetworkPolicy>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    let documents = match value {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };

    documents
        .into_iter()
        .enumerate()
        .map(|(index, document)| {
            let object: Object = serde_json::from_value(document)
                .with_context(|| format!("{} [{index}]: not an object", path.display()))?;
            let mut policy = NetworkPolicy::try_from_object(object)
                .map_err(|e| anyhow::anyhow!("{} [{index}]: {e}", path.display()))?;
            let meta = policy.metadata_mut();
            if meta.namespace.is_none() {
                meta.namespace = Some(namespace.to_string());
            }
            meta.uid = None;
            meta.resource_version = ResourceVersion::unset();
            Ok(policy)
        })
        .collect()
}

/// Create or update every policy while a watch session records the
/// resulting events, then list.
fn apply(
    policies: Vec<NetworkPolicy>,
    config: StoreConfig,
    list_ctx: &RequestContext,
    list_options: &ListOptions,
) -> anyhow::Result<ApplyReport> {
    let backend = Arc::new(InMemoryBackend::with_config(&config));
    let registry = new_registry(network_policy_storage(backend, config)?);
    let mut watch = registry.watch_network_policies(&RequestContext::new(), &ListOptions::default())?;

    let chain = ValidationChain::new();
    let (mut created, mut updated) = (0, 0);
    for mut policy in policies {
        let namespace = policy.metadata.namespace.clone().unwrap_or_default();
        let ctx = RequestContext::with_namespace(namespace);
        match registry.get_network_policy(&ctx, policy.name(), &GetOptions::default()) {
            Ok(existing) => {
                policy.metadata.resource_version = existing.metadata.resource_version;
                let stored = registry.update_network_policy(
                    &ctx,
                    &policy,
                    &chain,
                    &chain,
                    &UpdateOptions::default(),
                )?;
                debug!(key = %stored.metadata.key(), rv = %stored.metadata.resource_version, "updated");
                updated += 1;
            }
            Err(err) if err.is_not_found() => {
                let stored = registry.create_network_policy(&ctx, &policy, &chain)?;
                debug!(key = %stored.metadata.key(), rv = %stored.metadata.resource_version, "created");
                created += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let mut events = Vec::new();
    while let Some(event) = watch.try_next() {
        events.push(event);
    }
    watch.stop();

    let list = registry.list_network_policies(list_ctx, list_options)?;
    info!(created, updated, listed = list.len(), "apply finished");
    Ok(ApplyReport {
        created,
        updated,
        events,
        list,
    })
}

fn print_report_text(report: &ApplyReport) {
    println!(
        "{} Applied {} policies ({} created, {} updated)",
        "✓".green().bold(),
        report.created + report.updated,
        report.created.to_string().bold(),
        report.updated.to_string().bold(),
    );

    if !report.events.is_empty() {
        println!("\n{}", "Events:".bold());
        for event in &report.events {
            let label = match event {
                TypedEvent::Added(_) => event.type_name().green(),
                TypedEvent::Modified(_) => event.type_name().yellow(),
                TypedEvent::Deleted(_) => event.type_name().red(),
                TypedEvent::Error(_) => event.type_name().red().bold(),
            };
            match event {
                TypedEvent::Error(err) => println!("  {label:<8} {err}"),
                _ => {
                    if let Some(policy) = event.object() {
                        println!(
                            "  {label:<8} {}  {}",
                            policy.metadata.key().to_string().cyan(),
                            format!("rv {}", event.revision()).dimmed(),
                        );
                    }
                }
            }
        }
    }

    println!("\n{}", "Policies:".bold());
    if report.list.is_empty() {
        println!("  {}", "none".dimmed());
        return;
    }
    for policy in &report.list.items {
        let types: Vec<String> = policy
            .spec
            .policy_types
            .iter()
            .map(|t| format!("{t:?}"))
            .collect();
        let selector = if policy.spec.pod_selector.is_empty() {
            "all pods".to_string()
        } else {
            serde_json::to_string(&policy.spec.pod_selector).unwrap_or_default()
        };
        println!(
            "  {}  {}  [{}]  {}",
            policy.metadata.key().to_string().cyan(),
            policy.metadata.resource_version.to_string().yellow(),
            types.join(","),
            selector.dimmed(),
        );
    }
    println!("  List version: {}", report.list.resource_version.to_string().yellow());
}

fn event_json(event: &TypedEvent<NetworkPolicy>) -> serde_json::Value {
    match event {
        TypedEvent::Error(err) => serde_json::json!({ "type": event.type_name(), "error": err }),
        _ => serde_json::json!({ "type": event.type_name(), "object": event.object() }),
    }
}

fn print_report_json(report: &ApplyReport) -> anyhow::Result<()> {
    let events: Vec<serde_json::Value> = report.events.iter().map(event_json).collect();
    let out = serde_json::json!({
        "created": report.created,
        "updated": report.updated,
        "events": events,
        "list": report.list,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(format: &OutputFormat, config: &StoreConfig) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
