use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use stackatlas_core::prelude::*;
use stackatlas_core::{
    AggregateReport, FinishedSheet, PackedAtlas, SheetSink, layout_tree, pack_sprites_into,
};
use tracing::info;

mod fs_source;

use fs_source::{FsSprites, FsTree, TreeRoot};

const SHEET_DIR: &str = "spritesheets";

#[derive(Parser, Debug)]
#[command(
    name = "stackatlas",
    about = "Pack a folder tree of images into sprite sheets and a scene layout descriptor",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan, pack sprite sheets, lay out folder groups and write the descriptor
    Build(BuildArgs),
    /// Descriptor only (no sheets): tree, layouts and seeds without placements
    Layout(BuildArgs),
    /// Simple timing bench (scans and packs once in memory, prints time + occupancy)
    Bench(BenchArgs),
}

#[derive(Parser, Debug, Clone)]
struct BuildArgs {
    // Input/Output
    /// Root directory of the image tree
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory (defaults to the input directory)
    #[arg(short, long, help_heading = "Input/Output")]
    out_dir: Option<PathBuf>,
    /// Descriptor file name inside the output directory
    #[arg(long, default_value = "data.json", help_heading = "Input/Output")]
    descriptor: String,
    /// YAML config file path (present keys override flags)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Exclude patterns (glob, relative to the input directory)
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,
    /// Sheet image format: png | webp
    #[arg(long, value_parser = ["png", "webp"], default_value = "png", help_heading = "Input/Output")]
    sheet_format: String,

    // Atlas
    /// Sheet edge in pixels
    #[arg(long, default_value_t = 4096, help_heading = "Atlas")]
    sheet_size: u32,
    /// Sprite (slot) edge in pixels
    #[arg(long, default_value_t = 64, help_heading = "Atlas")]
    sprite_size: u32,
    /// Frames kept per GIF
    #[arg(long, default_value_t = 30, help_heading = "Atlas")]
    max_frames: u32,
    /// Resize filter: nearest|triangle|catmullrom|gaussian|lanczos3
    #[arg(long, default_value = "nearest", help_heading = "Atlas")]
    resize_filter: String,
    /// Decode and filter sprites in parallel (requires feature `parallel`)
    #[arg(long, default_value_t = false, help_heading = "Atlas")]
    parallel: bool,

    // Filters
    /// Unsharp mask
    #[arg(long, default_value_t = false, help_heading = "Filters")]
    sharpen: bool,
    #[arg(long, default_value_t = 2.0, help_heading = "Filters")]
    sharpen_sigma: f32,
    #[arg(long, default_value_t = 3, help_heading = "Filters")]
    sharpen_threshold: i32,
    /// Gaussian blur
    #[arg(long, default_value_t = false, help_heading = "Filters")]
    blur: bool,
    #[arg(long, default_value_t = 2.0, help_heading = "Filters")]
    blur_sigma: f32,
    /// Make pixels near this colour transparent (e.g. blue, light_gray)
    #[arg(long, help_heading = "Filters")]
    chroma_key: Option<String>,
    #[arg(long, default_value_t = 30, help_heading = "Filters")]
    chroma_threshold: u8,
    /// Dither mode: bw | color_reduce | custom_palette
    #[arg(long, help_heading = "Filters")]
    dither: Option<String>,
    /// Dither method: floyd_steinberg | ordered | none
    #[arg(long, default_value = "ordered", help_heading = "Filters")]
    dither_method: String,
    /// Palette size for color_reduce
    #[arg(long, default_value_t = 256, help_heading = "Filters")]
    dither_colors: u16,
    /// Comma-separated #RRGGBB list for custom_palette
    #[arg(long, value_delimiter = ',', help_heading = "Filters")]
    palette: Vec<String>,

    // Layout
    /// World units between grid cells
    #[arg(long, default_value_t = 1.5, help_heading = "Layout")]
    grid_spacing: f32,
    /// World units between stacked planes
    #[arg(long, default_value_t = 0.15, help_heading = "Layout")]
    stack_spacing: f32,
    /// Give directive groups their declared shape in spiral search
    #[arg(long, default_value_t = true, action=ArgAction::Set, help_heading = "Layout")]
    ordered_grid_layout: bool,
    /// Largest spiral ring searched before failing
    #[arg(long, default_value_t = 100, help_heading = "Layout")]
    max_spiral_radius: u32,
    /// Master seed passed to the renderer
    #[arg(long, default_value_t = 293, help_heading = "Layout")]
    seed: u32,
    /// Unit count above which the renderer loads everything up front
    #[arg(long, default_value_t = 293, help_heading = "Layout")]
    quickload_threshold: u32,

    // Export
    /// Export packing stats (JSON) to this file
    #[arg(long, help_heading = "Export")]
    export_stats: Option<PathBuf>,
    /// Print the merged configuration (after CLI/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
    /// Dry run: pack and lay out but do not write files
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
}

#[derive(Parser, Debug, Clone)]
struct BenchArgs {
    /// Root directory of the image tree
    input: PathBuf,
    /// Sheet edge in pixels
    #[arg(long, default_value_t = 4096)]
    sheet_size: u32,
    /// Sprite (slot) edge in pixels
    #[arg(long, default_value_t = 64)]
    sprite_size: u32,
    /// Decode and filter sprites in parallel (requires feature `parallel`)
    #[arg(long, default_value_t = false)]
    parallel: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Build(args) => run_build(args, cli.progress && !cli.quiet, false),
        Commands::Layout(args) => run_build(args, false, true),
        Commands::Bench(b) => run_bench(b),
    }
}

fn run_build(cli: &BuildArgs, show_progress: bool, layout_only: bool) -> anyhow::Result<()> {
    let mut exclude = cli.exclude.clone();
    let mut sheet_format = cli.sheet_format.clone();
    let cfg = if let Some(path) = &cli.config {
        let file = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let y: YamlConfig = serde_yaml::from_str(&file)?;
        if let Some(v) = &y.exclude {
            exclude.clone_from(v);
        }
        if let Some(v) = &y.sheet_format {
            sheet_format.clone_from(v);
        }
        y.into_atlas_config(atlas_config_from_args(cli)?)?
    } else {
        atlas_config_from_args(cli)?
    };

    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&cfg)?),
            _ => println!("{}", serde_json::to_string_pretty(&cfg)?),
        }
        return Ok(());
    }
    cfg.validate()?;
    let format = parse_sheet_format(&sheet_format)?;

    let root = TreeRoot::new(&cli.input)?;
    let out_dir = cli.out_dir.clone().unwrap_or_else(|| root.dir().to_path_buf());
    let (tree, report) = scan_tree(&root, &exclude, show_progress)?;

    let packed = if layout_only {
        PackedAtlas::default()
    } else {
        let requests = ingest(&tree);
        info!(images = requests.len(), "packing");
        let sheet_dir = out_dir.join(SHEET_DIR);
        if !cli.dry_run {
            reset_dir(&sheet_dir)?;
        }
        let writer = SheetWriter {
            dir: sheet_dir,
            format,
            dry_run: cli.dry_run,
            bar: progress_spinner(show_progress, "packing")?,
        };
        let sprites = FsSprites::new(root.clone());
        let packed = pack_sprites_into(&requests, &sprites, &cfg, writer)?;
        info!("{}", packed.atlas.stats().summary());
        packed
    };

    let layouts = layout_tree(&tree, &cfg)?;
    let doc = build_descriptor(&tree, &packed.atlas, &layouts, &cfg);

    if !cli.dry_run {
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("create out_dir {}", out_dir.display()))?;
        let json_path = out_dir.join(&cli.descriptor);
        fs::write(&json_path, serde_json::to_string_pretty(&doc)?)
            .with_context(|| format!("write {}", json_path.display()))?;
        info!(?json_path, sheets = packed.atlas.sheets.len(), "descriptor written");
    }

    if let Some(stats_path) = &cli.export_stats {
        let stats = packed.atlas.stats();
        let value = serde_json::json!({
            "sheets": stats.num_sheets,
            "units": stats.num_units,
            "animations": stats.num_animations,
            "skipped": stats.skipped_units,
            "used_slots": stats.used_slots,
            "total_slots": stats.total_slots,
            "occupancy": stats.occupancy,
            "directories": report.directories,
            "images": report.images,
            "texts": report.texts,
            "unreadable_dirs": report.unreadable_dirs,
        });
        if !cli.dry_run {
            fs::write(stats_path, serde_json::to_string_pretty(&value)?)
                .with_context(|| format!("write {}", stats_path.display()))?;
            info!(?stats_path, "stats exported");
        } else {
            println!("{}", stats.summary());
        }
    }
    Ok(())
}

fn run_bench(b: &BenchArgs) -> anyhow::Result<()> {
    let cfg = AtlasConfig::builder()
        .sheet_size(b.sheet_size)
        .slot_size(b.sprite_size)
        .parallel(b.parallel)
        .build();
    cfg.validate()?;
    let root = TreeRoot::new(&b.input)?;
    let start = Instant::now();
    let (tree, _) = scan_tree(&root, &[], false)?;
    let scanned = start.elapsed();
    let sink = |_sheet: FinishedSheet| -> stackatlas_core::Result<()> { Ok(()) };
    let packed = pack_sprites_into(&ingest(&tree), &FsSprites::new(root), &cfg, sink)?;
    let layouts = layout_tree(&tree, &cfg)?;
    let dur = start.elapsed();
    let stats = packed.atlas.stats();
    println!(
        "sheets={} units={} layouts={} occupancy={:.2}% scan={} total={}",
        stats.num_sheets,
        stats.num_units,
        layouts.len(),
        stats.occupancy * 100.0,
        fmt_dur(scanned),
        fmt_dur(dur)
    );
    Ok(())
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms >= 1.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{}us", d.as_micros())
    }
}

fn scan_tree(
    root: &TreeRoot,
    exclude: &[String],
    progress: bool,
) -> anyhow::Result<(TreeNode, AggregateReport)> {
    let bar = progress_spinner(progress, "scanning")?;
    let source = FsTree::new(root.clone(), exclude)?;
    let (tree, report) = aggregate_tree(&source, root.name(), &ScanOptions::default())?;
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    info!(
        directories = report.directories,
        images = report.images,
        texts = report.texts,
        unreadable = report.unreadable_dirs.len(),
        "tree scanned"
    );
    Ok((tree, report))
}

fn progress_spinner(enabled: bool, what: &str) -> anyhow::Result<Option<ProgressBar>> {
    if !enabled {
        return Ok(None);
    }
    let b = ProgressBar::new_spinner();
    b.set_style(ProgressStyle::with_template(
        "{spinner:.green} {prefix} [{elapsed_precise}] {wide_msg}",
    )?);
    b.set_prefix(what.to_string());
    b.enable_steady_tick(Duration::from_millis(120));
    Ok(Some(b))
}

/// Removes stale sheets from a previous run.
fn reset_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("clear {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(())
}

fn parse_sheet_format(s: &str) -> anyhow::Result<ImageFormat> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "png" => ImageFormat::Png,
        "webp" => ImageFormat::WebP,
        other => anyhow::bail!("unknown sheet format: {}", other),
    })
}

/// Persists each sheet as `sprites_{id}.{ext}` the moment it is finalized.
struct SheetWriter {
    dir: PathBuf,
    format: ImageFormat,
    dry_run: bool,
    bar: Option<ProgressBar>,
}

impl SheetSink for SheetWriter {
    fn finalize(&mut self, sheet: FinishedSheet) -> stackatlas_core::Result<()> {
        let ext = self.format.extensions_str().first().copied().unwrap_or("png");
        let path = self.dir.join(format!("sprites_{}.{}", sheet.record.id, ext));
        if !self.dry_run {
            sheet.rgba.save_with_format(&path, self.format)?;
        }
        if let Some(b) = &self.bar {
            b.set_message(format!("sheet {} ({} slots)", sheet.record.id, sheet.record.slots_used));
        }
        info!(?path, id = sheet.record.id, slots = sheet.record.slots_used, "wrote sheet");
        Ok(())
    }
}

impl Drop for SheetWriter {
    fn drop(&mut self) {
        if let Some(b) = &self.bar {
            b.finish_and_clear();
        }
    }
}

fn atlas_config_from_args(cli: &BuildArgs) -> anyhow::Result<AtlasConfig> {
    let resize_filter: ResizeFilter = cli
        .resize_filter
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown resize filter: {}", cli.resize_filter))?;

    let mut filters = FilterChain::default();
    filters.sharpen.enabled = cli.sharpen;
    filters.sharpen.sigma = cli.sharpen_sigma;
    filters.sharpen.threshold = cli.sharpen_threshold;
    filters.blur.enabled = cli.blur;
    filters.blur.sigma = cli.blur_sigma;
    if let Some(color) = &cli.chroma_key {
        filters.chroma_key.enabled = true;
        filters.chroma_key.color = color.parse()?;
    }
    filters.chroma_key.threshold = cli.chroma_threshold;
    if let Some(mode) = &cli.dither {
        filters.dither.enabled = true;
        filters.dither.mode = mode
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown dither mode: {}", mode))?;
    }
    filters.dither.method = cli
        .dither_method
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown dither method: {}", cli.dither_method))?;
    filters.dither.colors = cli.dither_colors;
    if !cli.palette.is_empty() {
        filters.dither.palette = cli.palette.clone();
    }

    Ok(AtlasConfig::builder()
        .sheet_size(cli.sheet_size)
        .slot_size(cli.sprite_size)
        .max_animation_frames(cli.max_frames)
        .resize_filter(resize_filter)
        .filters(filters)
        .seed(cli.seed)
        .quickload_threshold(cli.quickload_threshold)
        .grid_spacing(cli.grid_spacing)
        .stack_spacing(cli.stack_spacing)
        .ordered_grid_layout(cli.ordered_grid_layout)
        .max_spiral_radius(cli.max_spiral_radius)
        .parallel(cli.parallel)
        .build())
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Deserialize, Default)]
struct YamlConfig {
    sheet_size: Option<u32>,
    sprite_size: Option<u32>,
    max_animation_frames: Option<u32>,
    resize_filter: Option<String>,
    filters: Option<FilterChain>,
    seed: Option<u32>,
    quickload_threshold: Option<u32>,
    grid_spacing: Option<f32>,
    stack_spacing: Option<f32>,
    ordered_grid_layout: Option<bool>,
    max_spiral_radius: Option<u32>,
    parallel: Option<bool>,
    exclude: Option<Vec<String>>,
    sheet_format: Option<String>,
}

impl YamlConfig {
    fn into_atlas_config(self, mut cfg: AtlasConfig) -> anyhow::Result<AtlasConfig> {
        if let Some(v) = self.sheet_size {
            cfg.sheet_size = v;
        }
        if let Some(v) = self.sprite_size {
            cfg.slot_size = v;
        }
        if let Some(v) = self.max_animation_frames {
            cfg.max_animation_frames = v;
        }
        if let Some(v) = self.resize_filter {
            cfg.resize_filter = v
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown resize filter: {}", v))?;
        }
        if let Some(v) = self.filters {
            cfg.filters = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.quickload_threshold {
            cfg.quickload_threshold = v;
        }
        if let Some(v) = self.grid_spacing {
            cfg.grid_spacing = v;
        }
        if let Some(v) = self.stack_spacing {
            cfg.stack_spacing = v;
        }
        if let Some(v) = self.ordered_grid_layout {
            cfg.ordered_grid_layout = v;
        }
        if let Some(v) = self.max_spiral_radius {
            cfg.max_spiral_radius = v;
        }
        if let Some(v) = self.parallel {
            cfg.parallel = v;
        }
        Ok(cfg)
    }
}
