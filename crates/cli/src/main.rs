use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use orbit_core::{CollectingReporter, InputSnapshot, Report};
use orbit_detect::{ConfigMapSet, Detector};
use orbit_output::{OutputObject, OutputSnapshot};
use orbit_translate::{FilePatcher, NoopPatcher, TranslationSummary, Translator};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "orbitctl", version, about = "Orbit mesh configuration translator")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one translation pass per snapshot file, in order, on a single translator
    Translate {
        /// Input snapshot (YAML, or JSON when the file ends in .json)
        #[arg(short = 'f', long = "file", required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// YAML list of output objects upserted after every pass
        #[arg(long = "patch-file", env = "ORBIT_PATCH_FILE")]
        patch_file: Option<PathBuf>,
        /// Replace namespaces and injector config maps of this cluster with live ones from the current kube context
        #[arg(long = "live-cluster")]
        live_cluster: Option<String>,
    },
    /// Print which mesh each workload is attributed to
    Detect {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
        #[arg(long = "live-cluster")]
        live_cluster: Option<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("ORBIT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ORBIT_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid ORBIT_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_snapshot(path: &Path) -> Result<InputSnapshot> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut snap: InputSnapshot = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    };
    if snap.name.is_empty() {
        snap.name = path.display().to_string();
    }
    Ok(snap)
}

/// Overlays live injector inputs for `cluster`; failures are logged and the file's data kept.
async fn overlay_live(input: &mut InputSnapshot, cluster: &str) {
    let mut mesh_namespaces: Vec<String> = input
        .meshes
        .iter()
        .filter_map(|m| m.istio())
        .filter(|i| i.installation.cluster == cluster)
        .map(|i| i.installation.namespace.clone())
        .collect();
    mesh_namespaces.sort();
    mesh_namespaces.dedup();
    match orbit_kubehub::load_injection_inputs(cluster, &mesh_namespaces).await {
        Ok(live) => live.apply_to(input),
        Err(e) => {
            error!(cluster, error = ?e, "live cluster load failed");
            eprintln!("live cluster error: {e:#}");
        }
    }
}

#[derive(Serialize)]
struct PassOutput<'a> {
    snapshot: &'a str,
    summary: TranslationSummary,
    reports: Vec<Report>,
}

#[derive(Serialize)]
struct TranslateOutput<'a> {
    passes: Vec<PassOutput<'a>>,
    remote: Vec<&'a OutputObject>,
    local: Vec<&'a OutputObject>,
}

fn print_objects(title: &str, snap: &OutputSnapshot) {
    println!("{title} ({})", snap.len());
    println!("  {:<20} {:<10} {:<16} NAME", "KIND", "CLUSTER", "NAMESPACE");
    snap.for_each_object(|o| {
        let m = o.metadata();
        let cluster = if m.cluster_name.is_empty() { "-" } else { m.cluster_name.as_str() };
        println!("  {:<20} {:<10} {:<16} {}", o.resource_type().to_string(), cluster, m.namespace, m.name);
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Translate { files, patch_file, live_cluster } => {
            info!(files = files.len(), patch_file = ?patch_file, "translate invoked");
            let translator = match patch_file {
                Some(p) => Translator::new(FilePatcher::new(p)),
                None => Translator::new(NoopPatcher),
            };
            let reporter = CollectingReporter::new();

            let mut inputs = Vec::with_capacity(files.len());
            for f in &files {
                let mut input = load_snapshot(f)?;
                if let Some(cluster) = live_cluster.as_deref() {
                    overlay_live(&mut input, cluster).await;
                }
                inputs.push(input);
            }

            // only the last pass's outputs are printed
            let mut passes = Vec::with_capacity(inputs.len());
            let mut outputs = (OutputSnapshot::new("remote"), OutputSnapshot::new("local"));
            for input in &inputs {
                let (mut remote, mut local) = (OutputSnapshot::new("remote"), OutputSnapshot::new("local"));
                let summary = translator.translate(input, &mut remote, &mut local, &reporter);
                passes.push(PassOutput { snapshot: &input.name, summary, reports: reporter.take() });
                outputs = (remote, local);
            }
            let (remote, local) = outputs;

            match cli.output {
                Output::Human => {
                    for p in &passes {
                        let s = &p.summary;
                        println!(
                            "pass {} [{}]: valid={} invalid={} rolled_back={}",
                            s.pass,
                            p.snapshot,
                            s.valid_meshes.len(),
                            s.invalid_meshes.len(),
                            s.rolled_back_meshes.len()
                        );
                        for r in &p.reports {
                            println!("  ! {r}");
                        }
                    }
                    print_objects("remote", &remote);
                    print_objects("local", &local);
                }
                Output::Json => {
                    let out = TranslateOutput { passes, remote: remote.objects(), local: local.objects() };
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
        }
        Commands::Detect { file, live_cluster } => {
            info!(file = %file.display(), "detect invoked");
            let mut input = load_snapshot(&file)?;
            if let Some(cluster) = live_cluster.as_deref() {
                overlay_live(&mut input, cluster).await;
            }
            let config_maps = ConfigMapSet::new(&input.config_maps);
            let mut detector = Detector::new(&input.namespaces, &config_maps);
            let membership = detector.attribute(&input.workloads, &input.meshes);
            let anomalies: Vec<String> = detector.anomalies().iter().map(|a| a.to_string()).collect();

            match cli.output {
                Output::Human => {
                    println!("{:<48} MESH", "WORKLOAD");
                    for w in &input.workloads {
                        println!("{:<48} {}", w.key(), membership.mesh_for(w).unwrap_or("-"));
                    }
                    for a in &anomalies {
                        println!("! {a}");
                    }
                }
                Output::Json => {
                    #[derive(Serialize)]
                    struct Row<'a> { workload: &'a str, mesh: &'a str }
                    #[derive(Serialize)]
                    struct DetectOutput<'a> { attributed: Vec<Row<'a>>, anomalies: &'a [String] }
                    let attributed = membership.iter().map(|(workload, mesh)| Row { workload, mesh }).collect();
                    println!("{}", serde_json::to_string_pretty(&DetectOutput { attributed, anomalies: &anomalies })?);
                }
            }
        }
    }

    Ok(())
}
