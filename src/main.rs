use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use x3d_exchange::config::LightmapFormat;
use x3d_exchange::gltf_loader::load_gltf;
use x3d_exchange::scene_graph::Scene;
use x3d_exchange::x3d::{read_x3d_file, write_x3d_file};
use x3d_exchange::{Diagnostics, ExchangeConfig, MaterialDialect};

#[derive(Parser)]
#[command(name = "x3d-exchange")]
#[command(about = "Convert scenes to and from X3D")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a glTF scene (.gltf or .glb) as X3D
    Export {
        input: PathBuf,

        /// Output document (defaults to the input with .x3d extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// TOML file with exchange options
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the material dialect from the config
        #[arg(long)]
        dialect: Option<Dialect>,

        /// Skip lightmap atlases
        #[arg(long)]
        no_lightmaps: bool,

        /// Re-encode lightmaps as PNG instead of copying EXR
        #[arg(long)]
        png_lightmaps: bool,
    },
    /// Read an X3D document and print what it contains
    Import {
        input: PathBuf,

        /// Write the imported scene back out to this document
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Dialect {
    Classic,
    Advanced,
}

impl From<Dialect> for MaterialDialect {
    fn from(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Classic => MaterialDialect::Classic,
            Dialect::Advanced => MaterialDialect::Advanced,
        }
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Export {
            input,
            output,
            config,
            dialect,
            no_lightmaps,
            png_lightmaps,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dialect) = dialect {
                config.material_dialect = dialect.into();
            }
            if no_lightmaps {
                config.export_lightmaps = false;
            }
            if png_lightmaps {
                config.lightmap_format = LightmapFormat::Png;
            }

            export(&input, output, &config)
        }
        Command::Import {
            input,
            output,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            import(&input, output.as_deref(), &config)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ExchangeConfig> {
    match path {
        Some(path) => ExchangeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ExchangeConfig::default()),
    }
}

fn export(input: &Path, output: Option<PathBuf>, config: &ExchangeConfig) -> Result<()> {
    match input.extension().and_then(|e| e.to_str()) {
        Some("gltf" | "glb") => {}
        _ => bail!("Unsupported file type: {}", input.display()),
    }

    let output = output.unwrap_or_else(|| input.with_extension("x3d"));

    eprintln!("Loading {}...", input.display());
    let scene = load_gltf(input)?;
    print_stats(&scene);

    eprintln!("Writing {}...", output.display());
    let diagnostics = write_x3d_file(&scene, &scene.root_objects(), &output, config)?;
    print_diagnostics(&diagnostics);

    Ok(())
}

fn import(input: &Path, output: Option<&Path>, config: &ExchangeConfig) -> Result<()> {
    let name = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("Scene"));
    let mut scene = Scene::new(name);

    eprintln!("Reading {}...", input.display());
    let outcome = read_x3d_file(&mut scene, input)?;
    print_stats(&scene);
    print_diagnostics(&outcome.diagnostics);

    if let Some(output) = output {
        eprintln!("Writing {}...", output.display());
        let diagnostics = write_x3d_file(&scene, &outcome.roots, output, config)?;
        print_diagnostics(&diagnostics);
    }

    Ok(())
}

fn print_stats(scene: &Scene) {
    let lights = scene.objects.iter().filter(|(_, o)| o.light.is_some()).count();
    let cameras = scene.objects.iter().filter(|(_, o)| o.camera.is_some()).count();

    eprintln!("  Objects:   {}", scene.objects.len());
    eprintln!("  Meshes:    {}", scene.meshes.len());
    eprintln!("  Materials: {}", scene.materials.len());
    eprintln!("  Lights:    {}", lights);
    eprintln!("  Cameras:   {}", cameras);

    if let Some(bounds) = scene.world_bounds() {
        eprintln!("  Center:    {:?}", bounds.center());
        eprintln!("  Size:      {:?}", bounds.size());
    }
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }

    eprintln!("{} problems:", diagnostics.len());
    for diagnostic in diagnostics.iter() {
        eprintln!("  {}", diagnostic);
    }
}
