//! Lyrvid is a deterministic lyric-video rendering engine.
//!
//! The pipeline is session-oriented:
//!
//! - Parse lyrics (plain text, LRC timestamps, or Apple Music JSON) into a
//!   [`LyricStore`] of timed lines
//! - Tap lines into time with a [`SyncEngine`] driven by any [`PlaybackClock`]
//! - Render single frames with a [`FrameRenderer`], or stream a range into a
//!   [`FrameSink`] such as the [`FfmpegEncoder`]
#![forbid(unsafe_code)]

pub mod assets;
pub mod config;
pub mod effects;
pub mod encode_ffmpeg;
pub mod error;
pub mod export;
pub mod model;
pub mod parse;
pub mod project;
pub mod raster;
pub mod render;
pub mod rng;
pub mod session;
pub mod store;
pub mod sync;
pub mod ttml;

pub use crate::assets::{FontSet, PreparedImage, TextLayoutEngine, decode_image};
pub use crate::config::{
    BgConfig, EntryAnimation, ExportConfig, FxConfig, LogoConfig, MetaConfig, ParticleTheme,
    RenderConfig, Rgba8, TextConfig, TextStylePreset, VizConfig, VizStyle, WatermarkConfig,
};
pub use crate::effects::{EffectRegistry, FxContext, LineEffect, PaintState};
pub use crate::encode_ffmpeg::{
    AudioTrack, EncodeConfig, FfmpegEncoder, default_mp4_config, ensure_parent_dir,
    is_ffmpeg_on_path, sanitize_title,
};
pub use crate::error::{LyrvidError, LyrvidResult};
pub use crate::export::{
    AudioFeatures, AuxClockSync, ExportRange, FrameSink, SilentAudio, SpectrumFrames,
    export_frames,
};
pub use crate::model::{
    DEFAULT_LINE_SECS, EffectKind, EntryKind, FontSlot, LineStyle, LyricEntry, Syllable,
    UNSET_TIME,
};
pub use crate::parse::{ParseOutcome, ParseWarning, parse_clock, parse_plain};
pub use crate::project::{
    FontPaths, LyricFormat, Project, ProjectAssets, load_assets, load_lyrics,
};
pub use crate::render::{FrameInput, FrameRGBA, FrameRenderer, SceneAssets};
pub use crate::session::{
    JsonFileKvStore, KvStore, LyricSourceKind, MemoryKvStore, SessionSnapshot, StylePreset,
    clear_snapshot, delete_preset, load_presets, load_snapshot, save_preset, save_snapshot,
};
pub use crate::store::{LyricStore, MoveDir, TimeField};
pub use crate::sync::{PlaybackClock, SyncEngine};
pub use crate::ttml::parse_apple_json;
