// src/frame_source.rs
//
// Where frames come from. The control loop only sees `FrameSource`;
// a missing frame is `Ok(None)` and the caller decides whether to retry.

use crate::types::Frame;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Live stream through OpenCV (needs the `camera` feature)
    Camera,
    /// Still images from a directory, in file-name order
    Replay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Stream URL, or a device index such as "0"
    pub camera_url: String,
    pub replay_dir: PathBuf,
    /// Start over after the last image instead of ending the run
    pub replay_loop: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Camera,
            camera_url: "http://192.168.100.90:8080/video".to_string(),
            replay_dir: PathBuf::from("recordings"),
            replay_loop: false,
        }
    }
}

pub trait FrameSource: Send {
    /// Next frame, or `None` if nothing is available right now.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// True once a finite source has nothing more to give.
    fn is_exhausted(&self) -> bool {
        false
    }
}

pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match config.kind {
        SourceKind::Replay => Ok(Box::new(ReplaySource::open(
            &config.replay_dir,
            config.replay_loop,
        )?)),
        #[cfg(feature = "camera")]
        SourceKind::Camera => Ok(Box::new(camera::CameraSource::open(&config.camera_url)?)),
        #[cfg(not(feature = "camera"))]
        SourceKind::Camera => bail!(
            "camera source requested ({}) but lane-pilot was built without the `camera` feature",
            config.camera_url
        ),
    }
}

// ============================================================================
// REPLAY
// ============================================================================

pub struct ReplaySource {
    files: Vec<PathBuf>,
    next_index: usize,
    looping: bool,
    frame_id: u64,
    started: Instant,
}

impl ReplaySource {
    pub fn open(dir: &Path, looping: bool) -> Result<Self> {
        if !dir.is_dir() {
            bail!("Replay directory {} does not exist", dir.display());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_image(p))
            .collect();
        files.sort();

        info!("Replay source: {} image(s) in {}", files.len(), dir.display());

        Ok(Self {
            files,
            next_index: 0,
            looping,
            frame_id: 0,
            started: Instant::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.files.len() {
            if !self.looping || self.files.is_empty() {
                return Ok(None);
            }
            debug!("Replay wrapped after {} frames", self.frame_id);
            self.next_index = 0;
        }

        let path = &self.files[self.next_index];
        self.next_index += 1;

        let image = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();

        self.frame_id += 1;
        let timestamp_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        Ok(Some(Frame::new(image, self.frame_id, timestamp_ms)))
    }

    fn is_exhausted(&self) -> bool {
        self.files.is_empty() || (!self.looping && self.next_index >= self.files.len())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ============================================================================
// CAMERA
// ============================================================================

#[cfg(feature = "camera")]
pub mod camera {
    use super::FrameSource;
    use crate::types::Frame;
    use anyhow::{bail, Context, Result};
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
    };
    use std::time::Instant;
    use tracing::{info, warn};

    pub struct CameraSource {
        cap: VideoCapture,
        frame_id: u64,
        started: Instant,
    }

    impl CameraSource {
        /// Open a stream URL through FFmpeg, or a local device when `url` is an index.
        pub fn open(url: &str) -> Result<Self> {
            info!("Opening camera: {}", url);

            let cap = match url.trim().parse::<i32>() {
                Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
                Err(_) => VideoCapture::from_file(url, videoio::CAP_FFMPEG),
            }
            .with_context(|| format!("Failed to create capture for {}", url))?;

            if !cap.is_opened()? {
                bail!("Failed to open camera {}", url);
            }

            let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)?;
            let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)?;
            info!("✓ Camera open: {}x{}", width, height);

            Ok(Self {
                cap,
                frame_id: 0,
                started: Instant::now(),
            })
        }
    }

    impl FrameSource for CameraSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let mut bgr = Mat::default();
            let ok = match VideoCaptureTrait::read(&mut self.cap, &mut bgr) {
                Ok(ok) => ok,
                Err(e) => {
                    warn!("Camera read failed: {}", e);
                    return Ok(None);
                }
            };
            if !ok || bgr.empty() {
                return Ok(None);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;

            let width = rgb.cols() as u32;
            let height = rgb.rows() as u32;
            let data = rgb.data_bytes()?.to_vec();

            self.frame_id += 1;
            let timestamp_ms = self.started.elapsed().as_secs_f64() * 1000.0;
            let frame = Frame::from_rgb(data, width, height, self.frame_id, timestamp_ms)?;
            Ok(Some(frame))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) {
        RgbImage::from_pixel(w, h, Rgb([10, 20, 30]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_replay_reads_images_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 8, 8);
        write_png(dir.path(), "a.png", 4, 4);
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source = ReplaySource::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 2);
        assert!(!source.is_exhausted());

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (4, 4));
        assert_eq!(first.frame_id, 1);
        assert_eq!(*first.image.get_pixel(0, 0), Rgb([10, 20, 30]));

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.width(), 8);
        assert!(source.is_exhausted());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_replay_loops_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "only.png", 6, 3);

        let mut source = ReplaySource::open(dir.path(), true).unwrap();
        for id in 1..=3 {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.frame_id, id);
        }
        assert!(!source.is_exhausted());
    }

    #[test]
    fn test_replay_walks_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("run1");
        std::fs::create_dir(&nested).unwrap();
        write_png(&nested, "frame.PNG", 2, 2);

        let source = ReplaySource::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_missing_replay_dir_is_an_error() {
        assert!(ReplaySource::open(Path::new("no/such/dir"), false).is_err());
    }

    #[test]
    fn test_empty_replay_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::open(dir.path(), true).unwrap();
        assert!(source.is_empty());
        assert!(source.is_exhausted());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn test_camera_needs_feature() {
        let config = SourceConfig::default();
        assert!(open_source(&config).is_err());
    }
}
