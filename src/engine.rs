//! Request/response watermark removal engine.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, ImageReader, RgbaImage};
use tracing::{debug, warn};

use crate::alpha_map::AlphaMaps;
use crate::calibration::CalibrationStore;
use crate::config::{Config, DecodeLimits};
use crate::error::{Error, Result};
use crate::placement::{PlacementTable, WatermarkSize};

/// Options controlling how images are processed.
#[derive(Debug, Clone, Default)]
pub struct RemoverOptions {
    /// Size/placement tiers.
    pub placement: PlacementTable,
    /// Bounds applied while decoding input.
    pub limits: DecodeLimits,
    /// Force a specific watermark size instead of selecting by dimensions.
    pub force_size: Option<WatermarkSize>,
}

impl From<&Config> for RemoverOptions {
    fn from(config: &Config) -> Self {
        Self {
            placement: config.placement.clone(),
            limits: config.limits,
            force_size: None,
        }
    }
}

/// A processed image, PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    /// Width in pixels, same as the input.
    pub width: u32,
    /// Height in pixels, same as the input.
    pub height: u32,
    /// PNG bytes.
    pub png: Vec<u8>,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Where the output was written, if it was.
    pub output: Option<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// The watermark remover.
///
/// Cheap to clone; all clones share one [`CalibrationStore`].
#[derive(Clone)]
pub struct WatermarkRemover {
    calibration: Arc<CalibrationStore>,
    options: RemoverOptions,
}

impl WatermarkRemover {
    /// Create a remover over a (possibly not yet calibrated) store.
    #[must_use]
    pub fn new(calibration: Arc<CalibrationStore>, options: RemoverOptions) -> Self {
        Self {
            calibration,
            options,
        }
    }

    /// The shared calibration store.
    #[must_use]
    pub fn calibration(&self) -> &Arc<CalibrationStore> {
        &self.calibration
    }

    /// The options this remover was built with.
    #[must_use]
    pub fn options(&self) -> &RemoverOptions {
        &self.options
    }

    /// Decode `bytes`, remove the watermark, and return the image as PNG.
    ///
    /// Either the whole image is returned or an error; there are no partial
    /// results.
    ///
    /// # Errors
    ///
    /// - [`Error::Uncalibrated`] if the store has no alpha maps yet.
    /// - [`Error::Decode`] if `bytes` is not a decodable image within limits.
    /// - [`Error::Encode`] if the output cannot be encoded.
    pub fn remove_watermark(&self, bytes: &[u8]) -> Result<ProcessedImage> {
        let maps = self.calibration.current()?;
        let source = decode_image(bytes, self.options.limits)?;
        let output = self.remove_with(&maps, &source);
        let png = encode_png(&output)?;
        Ok(ProcessedImage {
            width: output.width(),
            height: output.height(),
            png,
        })
    }

    /// Remove the watermark from an already decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uncalibrated`] if the store has no alpha maps yet.
    pub fn remove_from_image(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let maps = self.calibration.current()?;
        Ok(self.remove_with(&maps, image))
    }

    fn remove_with(&self, maps: &AlphaMaps, image: &RgbaImage) -> RgbaImage {
        let (width, height) = image.dimensions();
        let placement =
            self.options
                .placement
                .placement_for(width, height, self.options.force_size);
        if placement.origin_x < 0 || placement.origin_y < 0 {
            warn!(
                width,
                height,
                size = placement.size.side(),
                margin = placement.margin,
                "image smaller than watermark box, processing only the visible part"
            );
        }
        maps.remove_at(image, &placement)
    }

    /// Process a single image file: load, remove, save as PNG.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path) -> ProcessResult {
        let mut result = ProcessResult {
            path: input.to_path_buf(),
            output: None,
            success: false,
            message: String::new(),
        };

        let processed = match std::fs::read(input)
            .map_err(Error::from)
            .and_then(|bytes| self.remove_watermark(&bytes))
        {
            Ok(p) => p,
            Err(e) => {
                result.message = format!("Failed to process: {e}");
                return result;
            }
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match std::fs::write(output, &processed.png) {
            Ok(()) => {
                debug!(input = %input.display(), output = %output.display(), "wrote output");
                result.success = true;
                result.output = Some(output.to_path_buf());
                result.message = format!(
                    "Watermark removed ({}x{})",
                    processed.width, processed.height
                );
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }

    /// Process all supported images in a directory.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    /// Outputs land in `output_dir` named by [`batch_output_name`]. Inputs that
    /// would still map to the same output name fail instead of overwriting
    /// each other.
    #[must_use]
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Vec<ProcessResult> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                return vec![failure(input_dir, format!("Failed to read directory: {e}"))];
            }
        };

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![failure(
                    output_dir,
                    format!("Failed to create output directory: {e}"),
                )];
            }
        }

        entries.sort();

        // Output name -> first input claiming it.
        let mut claimed: HashMap<String, &Path> = HashMap::new();
        let jobs: Vec<(&Path, std::result::Result<PathBuf, String>)> = entries
            .iter()
            .map(|input| {
                let name = batch_output_name(input);
                let target = match claimed.get(name.to_lowercase().as_str()) {
                    Some(first) => Err(format!(
                        "Output {name} already produced from {}",
                        first.display()
                    )),
                    None => {
                        claimed.insert(name.to_lowercase(), input.as_path());
                        Ok(output_dir.join(&name))
                    }
                };
                (input.as_path(), target)
            })
            .collect();

        let process = |(input, target): &(&Path, std::result::Result<PathBuf, String>)| {
            match target {
                Ok(output_path) => self.process_file(input, output_path),
                Err(message) => failure(input, message.clone()),
            }
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            jobs.par_iter().map(process).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            jobs.iter().map(process).collect()
        }
    }
}

fn failure(path: &Path, message: String) -> ProcessResult {
    ProcessResult {
        path: path.to_path_buf(),
        output: None,
        success: false,
        message,
    }
}

/// Decode caller bytes into an RGBA buffer, guessing the format from content.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the format is unknown, the data is corrupt, or
/// the image exceeds `limits`.
pub fn decode_image(bytes: &[u8], limits: DecodeLimits) -> Result<RgbaImage> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::Decode(image::ImageError::IoError(e)))?;
    reader.limits(limits.to_image_limits());
    let img = reader.decode().map_err(Error::Decode)?;
    Ok(img.to_rgba8())
}

/// Encode an RGBA buffer as PNG.
///
/// # Errors
///
/// Returns [`Error::Encode`] if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(Error::Encode)?;
    Ok(buf.into_inner())
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// File name used for an input in directory mode.
///
/// PNG inputs keep their name; anything else gets its extension folded into
/// the stem so `a.png` and `a.jpg` do not collide: `a.jpg` becomes `a_jpg.png`.
#[must_use]
pub fn batch_output_name(input: &Path) -> String {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    match input.extension().map(|e| e.to_string_lossy()) {
        Some(ext) if ext == "png" => format!("{stem}.png"),
        Some(ext) => format!("{stem}_{ext}.png"),
        None => format!("{stem}.png"),
    }
}

/// Generate a default output path from an input path.
///
/// Output is always PNG: `"photo.jpg"` becomes `"photo_cleaned.png"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.png"))
}
