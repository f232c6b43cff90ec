use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{PowerPreference, RecordFormat};

#[derive(Parser, Debug)]
#[command(
    name = "distortio",
    author,
    version,
    about = "Blend two images, videos or camera feeds through a GPU distortion shader",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Content to distort: an image path, a video path, or `camera[:DEVICE]`.
    #[arg(long, value_name = "SRC")]
    pub primary: Option<String>,

    /// Content driving the distortion: an image path, a video path, or `camera[:DEVICE]`.
    #[arg(long, value_name = "SRC")]
    pub distortion: Option<String>,

    /// Letterbox the primary input instead of cropping it to fill.
    #[arg(long)]
    pub primary_fill: bool,

    /// Letterbox the distortion input instead of cropping it to fill.
    #[arg(long)]
    pub distortion_fill: bool,

    /// Pin the force to `X,Y` and ignore the scroll wheel.
    #[arg(long, value_name = "X,Y", value_parser = parse_force, allow_hyphen_values = true)]
    pub force: Option<[f32; 2]>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// GLSL vertex shader replacing the bundled one.
    #[arg(long, value_name = "PATH")]
    pub vertex: Option<PathBuf>,

    /// GLSL fragment shader replacing the bundled one.
    #[arg(long, value_name = "PATH")]
    pub fragment: Option<PathBuf>,

    /// Directory receiving stills and recordings.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Container for recordings.
    #[arg(long, value_name = "FORMAT", value_enum)]
    pub record_format: Option<RecordFormat>,

    /// Frames per second captured while recording.
    #[arg(long, value_name = "FPS")]
    pub record_fps: Option<f32>,

    /// GPU adapter preference.
    #[arg(long, value_name = "PREF", value_enum)]
    pub gpu_power: Option<PowerPreference>,

    /// Settings file to use instead of the one in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the settings file.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a settings file populated with the defaults.
    Init {
        /// Overwrite an existing settings file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings as TOML.
    Show,
    /// Print the resolved config and capture directories.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size argument".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size argument".to_string())?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

pub fn parse_force(value: &str) -> Result<[f32; 2], String> {
    let (x, y) = value
        .trim()
        .split_once(',')
        .ok_or_else(|| "expected X,Y, e.g. 0,350".to_string())?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f32>()
            .ok()
            .filter(|component| component.is_finite())
            .ok_or_else(|| format!("invalid force component '{}'", part.trim()))
    };
    Ok([parse(x)?, parse(y)?])
}
