//! Worker configuration

use std::path::{Path, PathBuf};

use crate::registry::{OutputMode, SessionKey};

/// Placeholder replaced with the per-session output directory
pub const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";

/// Placeholder replaced with the manifest file name
pub const MANIFEST_PLACEHOLDER: &str = "{manifest}";

/// How to launch the external transcoder
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Executable to run
    pub program: PathBuf,

    /// Arguments for live mode (multiplexed output on stdout)
    pub live_args: Vec<String>,

    /// Arguments for segmented mode (files under `{output_dir}`)
    pub segmented_args: Vec<String>,

    /// Shared base directory for segmented output
    pub base_path: PathBuf,

    /// Manifest file name inside a session directory
    pub manifest_name: String,

    /// Stderr text announcing that the worker opened an output file
    pub readiness_marker: String,

    /// Read size for the worker's stdout
    pub read_chunk_size: usize,

    /// Queued input bytes above which writes report backlog
    pub input_high_water: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let encode = [
            "-re", "-i", "pipe:", "-c:v", "libx264", "-preset", "veryfast", "-c:a", "aac",
            "-ac", "2",
        ];

        let live_args = encode
            .iter()
            .chain(["-f", "mpegts", "-"].iter())
            .map(|s| s.to_string())
            .collect();

        let segmented_args = encode
            .iter()
            .chain(
                [
                    "-f",
                    "hls",
                    "-hls_time",
                    "2",
                    "-hls_list_size",
                    "10",
                    "-hls_segment_filename",
                    "{output_dir}/segment_%05d.ts",
                    "{output_dir}/{manifest}",
                ]
                .iter(),
            )
            .map(|s| s.to_string())
            .collect();

        Self {
            program: PathBuf::from("ffmpeg"),
            live_args,
            segmented_args,
            base_path: std::env::temp_dir().join("relay-rs"),
            manifest_name: "index.m3u8".to_string(),
            readiness_marker: "Opening '".to_string(),
            read_chunk_size: 64 * 1024,
            input_high_water: 64 * 1024,
        }
    }
}

impl WorkerConfig {
    /// Use a different executable with the given live and segmented arguments
    pub fn with_program(
        program: impl Into<PathBuf>,
        live_args: impl IntoIterator<Item = impl Into<String>>,
        segmented_args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            live_args: live_args.into_iter().map(Into::into).collect(),
            segmented_args: segmented_args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the shared base directory
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Set the input high-water mark
    pub fn input_high_water(mut self, bytes: usize) -> Self {
        self.input_high_water = bytes.max(1);
        self
    }

    /// Directory holding one session's segmented output
    pub fn output_dir(&self, key: &SessionKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Command-line for the given mode with placeholders substituted
    pub fn args_for(&self, mode: OutputMode, output_dir: Option<&Path>) -> Vec<String> {
        let template = match mode {
            OutputMode::LiveStream => &self.live_args,
            OutputMode::SegmentedFile => &self.segmented_args,
        };

        let dir = output_dir
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();

        template
            .iter()
            .map(|arg| {
                arg.replace(OUTPUT_DIR_PLACEHOLDER, &dir)
                    .replace(MANIFEST_PLACEHOLDER, &self.manifest_name)
            })
            .collect()
    }
}
