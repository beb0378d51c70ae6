use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use kube::{Client, ResourceExt};
use rbg_core::{RoleBasedGroup, RoleBasedGroupSpec};
use rbg_patch::MergeOptions;
use rbg_resolve::Resolver;
use rbg_revision::{group_revision, plan_with, Decision, GroupPlan, LastApplied};
use serde::Serialize;
use serde_json::json;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info, warn};

mod source;

#[derive(Parser, Debug)]
#[command(name = "rbgctl", version, about = "Inspect RoleBasedGroup role templates")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Print Prometheus metrics collected during the run to stderr
    #[arg(long = "metrics", global = true, action = ArgAction::SetTrue)]
    metrics: bool,

    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// RoleBasedGroup manifest (YAML or JSON)
    #[arg(short = 'f', long = "file", global = true, conflicts_with = "cluster")]
    file: Option<PathBuf>,

    /// Read the named RoleBasedGroup from the current cluster context
    #[arg(long = "cluster", global = true)]
    cluster: Option<String>,

    /// Kubernetes namespace (default: current context)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate role templates and role references
    Validate,
    /// Print resolved pod templates per role
    Resolve {
        /// Only this role
        #[arg(long = "role")]
        role: Option<String>,
    },
    /// Fingerprint every role and compare with the last applied revisions
    Plan {
        /// JSON map of role name to last applied fingerprint
        #[arg(long = "last")]
        last: Option<PathBuf>,
    },
    /// Print the StatefulSets the group would produce
    Render {
        /// Only roles whose fingerprint changed
        #[arg(long = "changed-only", action = ArgAction::SetTrue)]
        changed_only: bool,
        /// JSON map of role name to last applied fingerprint
        #[arg(long = "last")]
        last: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env = std::env::var("RBG_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder");
            None
        }
    }
}

struct Loaded {
    group: RoleBasedGroup,
    client: Option<Client>,
}

async fn load(src: &SourceArgs) -> Result<Loaded> {
    match (&src.file, &src.cluster) {
        (Some(path), _) => Ok(Loaded { group: source::load_group_file(path)?, client: None }),
        (None, Some(name)) => {
            let client = Client::try_default().await.context("building kube client")?;
            let group = source::fetch_group(client.clone(), name, src.namespace.as_deref()).await?;
            Ok(Loaded { group, client: Some(client) })
        }
        (None, None) => bail!("one of -f/--file or --cluster is required"),
    }
}

async fn last_applied(loaded: &Loaded, src: &SourceArgs, last: Option<&PathBuf>) -> Result<LastApplied> {
    if let Some(path) = last {
        return source::load_last_applied_file(path);
    }
    match &loaded.client {
        Some(client) => source::fetch_last_applied(client.clone(), &loaded.group.name_any(), src.namespace.as_deref()).await,
        None => Ok(LastApplied::new()),
    }
}

fn emit<T: Serialize>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml | Output::Human => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn plan_json(plan: &GroupPlan) -> serde_json::Value {
    let roles: Vec<_> = plan
        .roles
        .iter()
        .map(|r| match &r.outcome {
            Ok(rev) => json!({
                "role": r.role,
                "fingerprint": rev.fingerprint,
                "previous": rev.previous,
                "decision": rev.decision,
                "resolvedFrom": rev.resolved.from,
            }),
            Err(e) => json!({ "role": r.role, "error": e.to_string() }),
        })
        .collect();
    json!({ "roles": roles })
}

fn print_plan_human(plan: &GroupPlan) {
    println!("{:<20} {:<10} {:<12} {}", "ROLE", "DECISION", "FINGERPRINT", "PREVIOUS");
    for r in &plan.roles {
        match &r.outcome {
            Ok(rev) => {
                let decision = match rev.decision {
                    Decision::Unchanged => "unchanged",
                    Decision::Changed(_) => "changed",
                };
                let prev = rev.previous.as_ref().map(|p| p.short().to_string()).unwrap_or_else(|| "-".to_string());
                println!("{:<20} {:<10} {:<12} {}", r.role, decision, rev.fingerprint.short(), prev);
            }
            Err(e) => println!("{:<20} {:<10} {}", r.role, "error", e),
        }
    }
}

/// Roles referencing each role template, in template declaration order.
fn template_usage(spec: &RoleBasedGroupSpec) -> Vec<(String, Vec<String>)> {
    spec.role_templates
        .iter()
        .map(|t| (t.name.clone(), spec.roles_referencing(&t.name).map(|r| r.name.clone()).collect()))
        .collect()
}

fn fail_on_role_errors(plan: &GroupPlan) -> Result<()> {
    let failed = plan.failed_roles().count();
    if failed > 0 {
        bail!("{} role(s) failed to resolve", failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let metrics = if cli.metrics { init_metrics() } else { None };
    let res = run(&cli).await;
    if let Some(handle) = metrics {
        eprint!("{}", handle.render());
    }
    res
}

async fn run(cli: &Cli) -> Result<()> {
    let loaded = load(&cli.source).await?;
    let group = &loaded.group;
    let opts = MergeOptions::from_env();

    match &cli.command {
        Commands::Validate => {
            info!(group = %group.name_any(), "validate invoked");
            if let Err(e) = group.spec.validate() {
                error!(error = %e, "validation failed");
                bail!("{}: {}", group.name_any(), e);
            }
            let revision = group_revision(&group.spec).context("computing group revision")?;
            let usage = template_usage(&group.spec);
            match cli.output {
                Output::Human => {
                    println!("{} valid (revision {})", group.name_any(), revision.short());
                    for (template, roles) in &usage {
                        let roles = if roles.is_empty() { "-".to_string() } else { roles.join(",") };
                        println!("  template {:<20} used by {}", template, roles);
                    }
                }
                out => {
                    let templates: serde_json::Map<_, _> =
                        usage.into_iter().map(|(t, roles)| (t, json!(roles))).collect();
                    emit(out, &json!({ "group": group.name_any(), "valid": true, "revision": revision, "templates": templates }))?
                }
            }
        }
        Commands::Resolve { role } => {
            info!(group = %group.name_any(), role = ?role, "resolve invoked");
            group.spec.validate().with_context(|| format!("validating {}", group.name_any()))?;
            let resolver = Resolver::with_options(&group.spec, opts);
            let roles: Vec<_> = group
                .spec
                .roles
                .iter()
                .filter(|r| role.as_deref().map(|n| r.name == n).unwrap_or(true))
                .cloned()
                .collect();
            if let Some(name) = role {
                if roles.is_empty() {
                    bail!("role {:?} not found in {}", name, group.name_any());
                }
            }
            let mut failed = 0usize;
            let mut docs = Vec::new();
            for (r, res) in resolver.resolve_all(&roles) {
                match res {
                    Ok(t) => docs.push(json!({ "role": r.name, "resolvedFrom": t.from, "template": t.template })),
                    Err(e) => {
                        failed += 1;
                        docs.push(json!({ "role": r.name, "error": e.to_string() }));
                    }
                }
            }
            match cli.output {
                Output::Human => {
                    for d in &docs {
                        println!("---");
                        print!("{}", serde_yaml::to_string(d)?);
                    }
                }
                out => emit(out, &docs)?,
            }
            if failed > 0 {
                bail!("{} role(s) failed to resolve", failed);
            }
        }
        Commands::Plan { last } => {
            let last = last_applied(&loaded, &cli.source, last.as_ref()).await?;
            info!(group = %group.name_any(), recorded = last.len(), "plan invoked");
            let plan = plan_with(&group.spec, &last, opts).with_context(|| format!("validating {}", group.name_any()))?;
            match cli.output {
                Output::Human => print_plan_human(&plan),
                out => emit(out, &plan_json(&plan))?,
            }
            fail_on_role_errors(&plan)?;
        }
        Commands::Render { changed_only, last } => {
            let last = last_applied(&loaded, &cli.source, last.as_ref()).await?;
            info!(group = %group.name_any(), changed_only, "render invoked");
            let plan = plan_with(&group.spec, &last, opts).with_context(|| format!("validating {}", group.name_any()))?;
            let mut objects = Vec::new();
            for (role, sts) in rbg_render::render_group(group, &plan) {
                if *changed_only && !plan.get(&role).is_some_and(|r| r.is_changed()) {
                    continue;
                }
                objects.push(sts.with_context(|| format!("rendering role {}", role))?);
            }
            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&objects)?),
                Output::Human | Output::Yaml => {
                    for o in &objects {
                        println!("---");
                        print!("{}", serde_yaml::to_string(o)?);
                    }
                }
            }
            fail_on_role_errors(&plan)?;
        }
    }
    Ok(())
}
