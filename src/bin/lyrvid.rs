use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use lyrvid::{
    AudioTrack, ExportRange, FrameInput, FrameRenderer, LyricStore, Project, SceneAssets,
    SilentAudio, default_mp4_config, export_frames, load_assets, load_lyrics, sanitize_title,
};

#[derive(Parser, Debug)]
#[command(name = "lyrvid", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a project's lyrics and print the timed lines as JSON.
    Parse(ParseArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Render an MP4 video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ParseArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Frame time in seconds.
    #[arg(long)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path; defaults to the song title next to the project.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Export start in seconds.
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Export end in seconds; defaults to the project duration.
    #[arg(long)]
    end: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Parse(args) => cmd_parse(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn project_root(in_path: &Path) -> &Path {
    in_path.parent().unwrap_or_else(|| Path::new("."))
}

fn cmd_parse(args: ParseArgs) -> anyhow::Result<()> {
    let project = Project::load(&args.in_path)?;
    let outcome = load_lyrics(&project, project_root(&args.in_path))?;

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    let json = serde_json::to_string_pretty(&outcome.entries)?;
    println!("{json}");
    eprintln!(
        "{} lines, {} warnings",
        outcome.entries.len(),
        outcome.warnings.len()
    );
    Ok(())
}

struct Scene {
    project: Project,
    store: LyricStore,
    renderer: FrameRenderer,
    assets: lyrvid::ProjectAssets,
}

fn load_scene(in_path: &Path) -> anyhow::Result<Scene> {
    let project = Project::load(in_path)?;
    let root = project_root(in_path);

    let outcome = load_lyrics(&project, root)?;
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    let store = LyricStore::new(outcome.entries);

    let assets = load_assets(&project, root)?;
    let mut renderer = FrameRenderer::new(project.width, project.height, project.config.seed)?;
    for (slot, bytes) in &assets.fonts {
        renderer.set_font(*slot, bytes.clone());
    }

    Ok(Scene {
        project,
        store,
        renderer,
        assets,
    })
}

fn scene_assets(assets: &lyrvid::ProjectAssets) -> SceneAssets<'_> {
    SceneAssets {
        background: assets.background.as_ref(),
        watermark: assets.watermark.as_ref(),
        logo: assets.logo.as_ref(),
    }
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let mut scene = load_scene(&args.in_path)?;

    let spectrum = match &scene.assets.spectrum {
        Some(frames) => {
            use lyrvid::AudioFeatures as _;
            frames.spectrum_at(args.time)
        }
        None => Vec::new(),
    };
    let input = FrameInput::new(args.time, &spectrum);
    let frame = scene.renderer.render_frame(
        &scene.store,
        &scene.project.config,
        &scene_assets(&scene.assets),
        &input,
    )?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut scene = load_scene(&args.in_path)?;

    let end = match args.end {
        Some(end) => end,
        None => scene.project.export_end(&scene.store)?,
    };
    let range = ExportRange::new(args.start, end);

    let out_path = match args.out {
        Some(out) => out,
        None => {
            let stem = sanitize_title(&scene.project.config.meta.song);
            project_root(&args.in_path).join(format!("{stem}.mp4"))
        }
    };

    let mut cfg = default_mp4_config(
        &out_path,
        scene.project.width,
        scene.project.height,
        scene.project.config.export.fps,
    );
    if let Some(audio) = &scene.project.audio {
        let audio_path = if audio.is_absolute() {
            audio.clone()
        } else {
            project_root(&args.in_path).join(audio)
        };
        cfg = cfg.with_audio(AudioTrack {
            path: audio_path,
            start: range.start,
            duration: Some(range.duration()),
        });
    }

    let sink = Box::new(lyrvid::FfmpegEncoder::new(cfg, [0, 0, 0, 255])?);
    let frames = match &scene.assets.spectrum {
        Some(spectrum) => export_frames(
            &mut scene.renderer,
            &scene.store,
            &scene.project.config,
            &scene_assets(&scene.assets),
            range,
            spectrum,
            sink,
        )?,
        None => export_frames(
            &mut scene.renderer,
            &scene.store,
            &scene.project.config,
            &scene_assets(&scene.assets),
            range,
            &SilentAudio,
            sink,
        )?,
    };

    eprintln!("wrote {} ({frames} frames)", out_path.display());
    Ok(())
}
