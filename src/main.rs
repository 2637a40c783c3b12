use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use node_forge_shader_graph::{
    compiler::{self, Engine, validation},
    dsl::{self, ShaderStage},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Cli {
    graph_json: PathBuf,
    engine: String,
    output_dir: Option<PathBuf>,
    validate: bool,
}

const USAGE: &str =
    "supported: --graph-json <graph.json>, --engine <three|babylon|name>, --outputdir <dir>, --validate";

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut graph_json = None;
    let mut engine = "three".to_string();
    let mut output_dir = None;
    let mut validate = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--graph-json" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --graph-json"));
                };
                graph_json = Some(PathBuf::from(v));
                i += 2;
            }
            "--engine" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --engine"));
                };
                engine = v.clone();
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --outputdir"));
                };
                output_dir = Some(PathBuf::from(v));
                i += 2;
            }
            "--validate" => {
                validate = true;
                i += 1;
            }
            other => {
                return Err(anyhow!("unknown argument: {other} ({USAGE})"));
            }
        }
    }
    let graph_json = graph_json.ok_or_else(|| anyhow!("--graph-json is required ({USAGE})"))?;
    Ok(Cli {
        graph_json,
        engine,
        output_dir,
        validate,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;

    let graph = dsl::load_graph_from_path(&cli.graph_json)?;
    let engine = Engine::by_name(&cli.engine);
    let result = compiler::compile(&engine, &graph)
        .with_context(|| format!("failed to compile {}", cli.graph_json.display()))?;

    let vertex = result.vertex_source();
    let fragment = result.fragment_source();

    if cli.validate {
        validation::validate_glsl(&vertex, ShaderStage::Vertex)?;
        validation::validate_glsl(&fragment, ShaderStage::Fragment)?;
        info!("both programs passed validation");
    }

    match cli.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            for (name, text) in [("vertex.glsl", &vertex), ("fragment.glsl", &fragment)] {
                let path = dir.join(name);
                std::fs::write(&path, text)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), "wrote program");
            }
        }
        None => {
            println!("// vertex\n{vertex}\n// fragment\n{fragment}");
        }
    }
    Ok(())
}
