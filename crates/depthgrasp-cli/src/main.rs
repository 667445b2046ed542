//! depthgrasp CLI: command-line interface for grasp selection on depth images.

use clap::{Args, Parser, Subcommand, ValueEnum};
use ndarray::Array4;
use std::path::{Path, PathBuf};

use depthgrasp::{
    Candidate, GraspConfig, GraspPlanner, GripperSpec, ModelOutput, ModelSpec, OrthographicImage, Pose,
    ReplayModel, SelectionMethod, Timings, WorkspaceBoundary,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "depthgrasp")]
#[command(about = "Select, refine and check grasps on orthographic RGBD images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate depth (and optionally tilt) of a planar grasp.
    Refine(CliRefineArgs),

    /// Test whether a grasp's jaws lie inside a rectangular bin.
    BoxCheck(CliBoxCheckArgs),

    /// Write the depth channel of every model input view as 16-bit PNG.
    Views(CliViewsArgs),

    /// Run the full pipeline on a recorded model output.
    Grasp(CliGraspArgs),
}

#[derive(Debug, Clone, Args)]
struct ImageArgs {
    /// RGBA image whose alpha channel encodes depth.
    #[arg(long)]
    image: PathBuf,

    /// Pixels per meter.
    #[arg(long, default_value = "2000.0")]
    pixel_size: f64,

    /// Depth of a full-scale depth value (m).
    #[arg(long, default_value = "0.22")]
    min_depth: f64,

    /// Depth of a zero depth value (m).
    #[arg(long, default_value = "0.41")]
    max_depth: f64,
}

impl ImageArgs {
    fn load(&self) -> CliResult<OrthographicImage> {
        tracing::info!("Loading image: {}", self.image.display());
        let img = image::open(&self.image).map_err(|e| -> CliError {
            format!("Failed to open image {}: {}", self.image.display(), e).into()
        })?;
        let img = OrthographicImage::from_dynamic(img, self.pixel_size, self.min_depth, self.max_depth)?;
        tracing::info!("Image size: {}x{}", img.width(), img.height());
        Ok(img)
    }
}

#[derive(Debug, Clone, Args)]
struct PlanarPoseArgs {
    /// Grasp x in the workspace frame (m).
    #[arg(long, allow_hyphen_values = true)]
    x: f64,

    /// Grasp y in the workspace frame (m).
    #[arg(long, allow_hyphen_values = true)]
    y: f64,

    /// Grasp yaw (rad).
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    a: f64,

    /// Gripper opening (m).
    #[arg(long)]
    stroke: f64,
}

impl PlanarPoseArgs {
    fn pose(&self) -> Pose {
        Pose::planar(self.x, self.y, self.a)
    }

    fn candidate(&self) -> Candidate {
        Candidate {
            pose: Pose {
                z: f64::NAN,
                ..self.pose()
            },
            stroke_index: 0,
            stroke: self.stroke,
            estimated_reward: f32::NAN,
            index: [0; 4],
            model_action: None,
            method: "manual".to_string(),
            timings: Timings::default(),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct BoxArgs {
    /// Bin center `x,y,z` (m).
    #[arg(long, num_args = 3, value_delimiter = ',', allow_hyphen_values = true)]
    box_center: Option<Vec<f64>>,

    /// Bin size `x,y,z` (m).
    #[arg(long, num_args = 3, value_delimiter = ',')]
    box_size: Option<Vec<f64>>,
}

impl BoxArgs {
    fn boundary(&self) -> CliResult<Option<WorkspaceBoundary>> {
        match (&self.box_center, &self.box_size) {
            (Some(c), Some(s)) => Ok(Some(WorkspaceBoundary::from_center_size(
                to_triple(c)?,
                to_triple(s)?,
            ))),
            (None, None) => Ok(None),
            _ => Err("--box-center and --box-size must be given together".into()),
        }
    }
}

fn to_triple(v: &[f64]) -> CliResult<[f64; 3]> {
    match v {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(format!("expected 3 comma-separated values, got {}", v.len()).into()),
    }
}

#[derive(Debug, Clone, Args)]
struct CliRefineArgs {
    #[command(flatten)]
    image: ImageArgs,

    #[command(flatten)]
    grasp: PlanarPoseArgs,

    /// Grasp configuration (JSON); only the refinement section is used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also estimate the lateral tilt angles b and c.
    #[arg(long)]
    lateral: bool,
}

#[derive(Debug, Clone, Args)]
struct CliBoxCheckArgs {
    #[command(flatten)]
    grasp: PlanarPoseArgs,

    #[command(flatten)]
    bin: BoxArgs,

    /// Added to the stroke before testing the jaw points (m).
    #[arg(long, default_value = "0.002")]
    clearance: f64,
}

#[derive(Debug, Clone, Args)]
struct CliViewsArgs {
    #[command(flatten)]
    image: ImageArgs,

    /// Model description (JSON). Defaults to the built-in planar model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Grasp configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    bin: BoxArgs,

    /// Output directory for `view_XX.png`.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Max,
    Top,
    PowerProb,
    Random,
}

#[derive(Debug, Clone, Args)]
struct CliGraspArgs {
    #[command(flatten)]
    image: ImageArgs,

    /// Model description (JSON). Defaults to the built-in planar model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Grasp configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recorded model output (JSON with `reward` and optional `action` as nested arrays).
    #[arg(long)]
    output: PathBuf,

    /// Selection method.
    #[arg(long, value_enum, default_value_t = MethodArg::Max)]
    method: MethodArg,

    /// Pool size for `--method top`.
    #[arg(long, default_value = "5")]
    top_n: usize,

    /// Exponent for `--method power-prob`.
    #[arg(long, default_value = "4.0")]
    power: f32,

    /// Seed for stochastic selection methods.
    #[arg(long)]
    seed: Option<u64>,

    /// Smallest stroke the gripper can open to (m).
    #[arg(long)]
    min_stroke: Option<f64>,

    /// Largest stroke the gripper can open to (m).
    #[arg(long)]
    max_stroke: Option<f64>,

    #[command(flatten)]
    bin: BoxArgs,

    /// Path to write the selected grasp (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

impl CliGraspArgs {
    fn method(&self) -> SelectionMethod {
        match self.method {
            MethodArg::Max => SelectionMethod::Max,
            MethodArg::Top => SelectionMethod::Top { n: self.top_n },
            MethodArg::PowerProb => SelectionMethod::PowerProb { power: self.power },
            MethodArg::Random => SelectionMethod::Random,
        }
    }

    fn gripper(&self) -> Option<GripperSpec> {
        if self.min_stroke.is_none() && self.max_stroke.is_none() {
            return None;
        }
        Some(GripperSpec::new(
            self.min_stroke.unwrap_or(0.0),
            self.max_stroke.unwrap_or(f64::INFINITY),
        ))
    }
}

/// Recorded model output as nested `[orientation][row][col][channel]` arrays.
#[derive(Debug, serde::Deserialize)]
struct RecordedOutput {
    reward: Vec<Vec<Vec<Vec<f32>>>>,
    #[serde(default)]
    action: Option<Vec<Vec<Vec<Vec<f32>>>>>,
}

impl RecordedOutput {
    fn into_model_output(self) -> CliResult<ModelOutput> {
        let reward = nested_to_array4("reward", self.reward)?;
        Ok(match self.action {
            Some(action) => ModelOutput::with_action(reward, nested_to_array4("action", action)?),
            None => ModelOutput::reward_only(reward),
        })
    }
}

fn nested_to_array4(name: &str, nested: Vec<Vec<Vec<Vec<f32>>>>) -> CliResult<Array4<f32>> {
    let n = nested.len();
    let rows = nested.first().map_or(0, |v| v.len());
    let cols = nested.first().and_then(|v| v.first()).map_or(0, |v| v.len());
    let depth = nested
        .first()
        .and_then(|v| v.first())
        .and_then(|v| v.first())
        .map_or(0, |v| v.len());

    let mut flat = Vec::with_capacity(n * rows * cols * depth);
    for plane in nested {
        if plane.len() != rows {
            return Err(format!("{name}: ragged array (rows)").into());
        }
        for row in plane {
            if row.len() != cols {
                return Err(format!("{name}: ragged array (cols)").into());
            }
            for cell in row {
                if cell.len() != depth {
                    return Err(format!("{name}: ragged array (channels)").into());
                }
                flat.extend(cell);
            }
        }
    }
    Ok(Array4::from_shape_vec((n, rows, cols, depth), flat)?)
}

fn load_planner(model: Option<&Path>, config: Option<&Path>) -> CliResult<GraspPlanner> {
    let spec = match model {
        Some(path) => ModelSpec::from_json_file(path)?,
        None => ModelSpec::default(),
    };
    let planner = match config {
        Some(path) => GraspPlanner::with_config(spec, GraspConfig::from_json_file(path)?)?,
        None => GraspPlanner::new(spec)?,
    };
    tracing::info!(
        "Model '{}' ({:?}), {} strokes",
        planner.model().name,
        planner.model().architecture,
        planner.model().strokes.len()
    );
    Ok(planner)
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Refine(args) => run_refine(&args),
        Commands::BoxCheck(args) => run_box_check(&args),
        Commands::Views(args) => run_views(&args),
        Commands::Grasp(args) => run_grasp(&args),
    }
}

// ── refine ─────────────────────────────────────────────────────────────

fn run_refine(args: &CliRefineArgs) -> CliResult<()> {
    let img = args.image.load()?;
    let mut config = match &args.config {
        Some(path) => GraspConfig::from_json_file(path)?,
        None => GraspConfig::default(),
    };
    config.refine.lateral |= args.lateral;
    let planner = GraspPlanner::with_config(ModelSpec::default(), config)?;

    let refined = planner.refine(&img, args.grasp.candidate());
    if !refined.pose.is_finite() {
        tracing::warn!("No valid depth around ({:.4}, {:.4})", args.grasp.x, args.grasp.y);
    }
    println!("{}", serde_json::to_string_pretty(&refined.pose)?);
    Ok(())
}

// ── box-check ──────────────────────────────────────────────────────────

fn run_box_check(args: &CliBoxCheckArgs) -> CliResult<()> {
    let bin = args
        .bin
        .boundary()?
        .ok_or_else(|| -> CliError { "--box-center and --box-size are required".into() })?;
    let inside = bin.contains_jaws(&args.grasp.pose(), args.grasp.stroke, args.clearance);
    println!("{}", if inside { "inside" } else { "outside" });
    Ok(())
}

// ── views ──────────────────────────────────────────────────────────────

fn run_views(args: &CliViewsArgs) -> CliResult<()> {
    let img = args.image.load()?;
    let planner = load_planner(args.model.as_deref(), args.config.as_deref())?;
    let boundary = args.bin.boundary()?;

    let batch = planner.input_batch(&img, boundary.as_ref())?;
    std::fs::create_dir_all(&args.out_dir)?;
    for (k, angle) in batch.layout.angles().iter().enumerate() {
        let Some(view) = batch.depth_view(k) else {
            continue;
        };
        let path = args.out_dir.join(format!("view_{k:02}.png"));
        view.save(&path)?;
        tracing::debug!("Wrote {} (yaw {:.3})", path.display(), angle);
    }
    tracing::info!(
        "Wrote {} views of {}x{} px to {}",
        batch.len(),
        batch.layout.view_size(),
        batch.layout.view_size(),
        args.out_dir.display()
    );
    Ok(())
}

// ── grasp ──────────────────────────────────────────────────────────────

fn run_grasp(args: &CliGraspArgs) -> CliResult<()> {
    let img = args.image.load()?;
    let mut planner = load_planner(args.model.as_deref(), args.config.as_deref())?;
    if args.seed.is_some() {
        planner.config_mut().generator.seed = args.seed;
    }
    let boundary = args.bin.boundary()?;
    let gripper = args.gripper();

    let text = std::fs::read_to_string(&args.output)?;
    let recorded: RecordedOutput = serde_json::from_str(&text)?;
    let mut model = ReplayModel::new(recorded.into_model_output()?);

    let grasp = planner.find_safe_grasp(
        &img,
        &mut model,
        args.method(),
        boundary.as_ref(),
        gripper.as_ref(),
    )?;

    let Some(grasp) = grasp else {
        tracing::warn!("No safe grasp found");
        return Ok(());
    };
    tracing::info!(
        "Grasp at ({:.4}, {:.4}, {:.4}) yaw {:.3}, stroke {:.3}, reward {:.3}, {:.1} ms",
        grasp.pose.x,
        grasp.pose.y,
        grasp.pose.z,
        grasp.pose.a,
        grasp.stroke,
        grasp.estimated_reward,
        1e3 * grasp.timings.total()
    );

    let json = serde_json::to_string_pretty(&grasp)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Grasp written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
