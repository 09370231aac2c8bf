//! CLI façade (§6 "CLI"): loads a project file, elaborates it into a
//! [`devs_core::Coordinator`], and runs the simulation to completion.
//!
//! Kept deliberately thin per §1 ("CLI is out of scope" beyond acknowledging
//! its exit-code contract): no project authoring, no package manager, just
//! "parse a project file, run it, map the kernel's error taxonomy to an
//! exit code" (§6 "Exit codes"). Generalizes the teacher's DEVStone
//! width/depth argv binary into a project-file-path + end-time-override
//! argv binary, using the same ecosystem crate (`clap`) for argument
//! parsing.

use clap::Parser;
use devs_core::error::KernelError;
use devs_core::factory::ModelFactory;
use devs_core::project::{Project, ViewKind};
use devs_core::stream::{CsvStream, MatrixStream, Stream};
use devs_core::view::View;
use devs_core::Coordinator;
use std::fs::File;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "xdevs-run", about = "Runs a DEVS project file to completion")]
struct Args {
    /// Path to the project file (§6 "Project file").
    project: std::path::PathBuf,

    /// Overrides the project's own end time (begin + duration), if set.
    #[arg(long)]
    end_time: Option<f64>,

    /// Overrides the project's own RNG seed, if set.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            eprintln!("error: {e}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// §6 "Exit codes": 0 on success; nonzero on project-file error, missing
/// plugin, or runtime Dynamics failure.
fn exit_code_for(err: &KernelError) -> u8 {
    match err {
        KernelError::Config { .. } => 1,
        KernelError::Load { .. } => 2,
        KernelError::Runtime { .. } | KernelError::Invariant { .. } => 3,
        KernelError::Value { .. } => 4,
    }
}

fn run(args: &Args) -> devs_core::Result<()> {
    let xml = std::fs::read_to_string(&args.project)
        .map_err(|e| KernelError::config(format!("failed to read '{}': {e}", args.project.display())))?;
    let project = Project::parse(&xml)?;

    let mut config = project.kernel_config();
    if let Some(end_time) = args.end_time {
        config.end_time = end_time;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut factory = ModelFactory::new(&config);
    for (name, library) in &project.dynamics {
        // Safety: the project file is trusted input to this CLI, same as
        // any other configuration file naming code to load.
        unsafe {
            factory.register_plugin(name.clone(), library)?;
        }
    }

    let graph_spec = project.build_graph();
    let graph = devs_core::model::builder::build_graph(graph_spec);
    let sims = factory.elaborate(&graph, &project.conditions)?;

    let node_by_name: std::collections::HashMap<&str, &devs_core::model::ModelNode> = graph
        .atomic_nodes()
        .map(|n| (n.name.as_str(), n))
        .collect();

    let mut views = Vec::new();
    let mut streams: Vec<Box<dyn Stream>> = Vec::new();
    for view_spec in &project.views {
        let mut view = match view_spec.kind {
            ViewKind::Timed => View::new_timed(view_spec.name.clone(), devs_core::Time::from(config.begin_time), view_spec.timestep),
            ViewKind::Event => View::new_event(view_spec.name.clone()),
        };
        for (model, ports) in &project.observables.by_model {
            let Some(node) = node_by_name.get(model.as_str()) else {
                return Err(KernelError::config(format!(
                    "observable refers to unknown model '{model}'"
                )));
            };
            let sim_id = node.sim_id().expect("observables only target atomic models");
            for (port, view_names) in ports {
                if view_names.iter().any(|v| v == &view_spec.name) {
                    view.observe(sim_id, port.clone(), model.clone());
                }
            }
        }
        views.push(view);
        streams.push(build_stream(view_spec)?);
    }

    let mut coordinator = Coordinator::new(graph, sims, views, streams, config);
    coordinator.run()
}

fn build_stream(view: &devs_core::project::ViewSpec) -> devs_core::Result<Box<dyn Stream>> {
    match view.output.as_str() {
        "matrix" => Ok(Box::new(MatrixStream::new())),
        "csv" => {
            let path = view.output_path.clone().unwrap_or_else(|| {
                std::path::PathBuf::from(format!("{}.csv", view.name))
            });
            let file = File::create(&path).map_err(|e| {
                KernelError::config(format!("failed to create '{}': {e}", path.display()))
            })?;
            Ok(Box::new(CsvStream::new(file)))
        }
        other => Err(KernelError::config(format!(
            "view '{}' requests unknown output plugin '{other}'",
            view.name
        ))),
    }
}
