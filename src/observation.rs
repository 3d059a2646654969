use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::bridge::AsyncBridge;
use crate::config::ObservationConfig;
use crate::diagnostics::Diagnostics;
use crate::error::EnvError;
use crate::frame::{Frame, Insets, Region};
use crate::ocr::Ocr;

// =============================================================================
// Resource Readings
// =============================================================================

/// Why an OCR reading was thrown away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Rejection {
    EmptyText,
    NoDigits,
    Unparseable,
    Negative(i64),
    Implausible { value: i64, last: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReading {
    /// `None` means "unchanged": fall back to the last accepted value.
    pub value: Option<i64>,
    pub raw_text: String,
    pub rejection: Option<Rejection>,
}

impl ResourceReading {
    pub fn accepted(value: i64, raw_text: String) -> Self {
        Self {
            value: Some(value),
            raw_text,
            rejection: None,
        }
    }

    pub fn rejected(rejection: Rejection, raw_text: String) -> Self {
        Self {
            value: None,
            raw_text,
            rejection: Some(rejection),
        }
    }
}

/// Turns raw OCR text into a plausible integer or a [`Rejection`].
///
/// The thresholds are calibration for the game's treasury font, not
/// protocol: readings above `misread_ceiling` usually carry one spurious
/// extra digit, and jumps larger than `max_delta` are far more often misreads
/// than real income.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSanitizer {
    pub misread_ceiling: i64,
    pub max_delta: i64,
}

impl Default for ResourceSanitizer {
    fn default() -> Self {
        Self {
            misread_ceiling: 50_000,
            max_delta: 5_000,
        }
    }
}

impl ResourceSanitizer {
    /// `last_accepted` is `None` until a first reading has been accepted, in
    /// which case the jump check is skipped.
    pub fn sanitize(&self, text: &str, last_accepted: Option<i64>) -> Result<i64, Rejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyText);
        }
        let digits: String = text.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(Rejection::NoDigits);
        }
        let mut value: i64 = digits.parse().map_err(|_| Rejection::Unparseable)?;

        if value > self.misread_ceiling {
            value /= 10;
        }

        if value < 0 {
            return Err(Rejection::Negative(value));
        }
        if let Some(last) = last_accepted
            && value.abs_diff(last) > self.max_delta.unsigned_abs()
        {
            return Err(Rejection::Implausible { value, last });
        }
        Ok(value)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct ObservationPipeline {
    crop: Insets,
    resource: Region,
    sanitizer: ResourceSanitizer,
    ocr: Box<dyn Ocr>,
    save_observation: bool,
}

impl ObservationPipeline {
    pub fn new(config: &ObservationConfig, ocr: Box<dyn Ocr>) -> Self {
        Self {
            crop: config.crop,
            resource: config.resource,
            sanitizer: ResourceSanitizer {
                misread_ceiling: config.misread_ceiling,
                max_delta: config.max_delta,
            },
            ocr,
            save_observation: config.save_observation,
        }
    }

    pub fn sanitizer(&self) -> &ResourceSanitizer {
        &self.sanitizer
    }

    /// Screenshot through the bridge, decode, trim to the play view.
    pub fn capture(
        &self,
        bridge: &AsyncBridge,
        backend: &Arc<dyn Backend>,
    ) -> Result<Frame, EnvError> {
        let backend = backend.clone();
        let bytes = bridge.run(async move { backend.screenshot().await })??;
        self.frame_from_screenshot(&bytes)
    }

    pub fn frame_from_screenshot(&self, bytes: &[u8]) -> Result<Frame, EnvError> {
        let full = Frame::decode(bytes)?;
        Ok(full.trim(&self.crop)?)
    }

    /// One OCR attempt over the resource readout; never retried.
    pub fn read_resource(
        &self,
        frame: &Frame,
        last_accepted: Option<i64>,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResourceReading, EnvError> {
        let crop = frame.crop(&self.resource)?;
        let raw_text = match self.ocr.read_text(&crop) {
            Ok(text) => text,
            Err(e) => {
                warn!("OCR failed, treating reading as empty: {e:#}");
                String::new()
            }
        };
        debug!("OCR text: {:?}", raw_text);

        Ok(match self.sanitizer.sanitize(&raw_text, last_accepted) {
            Ok(value) => ResourceReading::accepted(value, raw_text),
            Err(Rejection::EmptyText) => ResourceReading::rejected(Rejection::EmptyText, raw_text),
            Err(rejection) => {
                warn!("resource not readable: {:?} ({rejection:?})", raw_text.trim());
                diagnostics.record_rejected_reading(&raw_text, &crop);
                ResourceReading::rejected(rejection, raw_text)
            }
        })
    }

    /// Record the frame if configured, then read the resource from it.
    pub fn inspect(
        &self,
        frame: &Frame,
        last_accepted: Option<i64>,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResourceReading, EnvError> {
        if self.save_observation {
            diagnostics.record_observation("latest", frame);
        }
        self.read_resource(frame, last_accepted, diagnostics)
    }

    /// Capture a frame and read the resource from it.
    pub fn observe(
        &self,
        bridge: &AsyncBridge,
        backend: &Arc<dyn Backend>,
        last_accepted: Option<i64>,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Frame, ResourceReading), EnvError> {
        let frame = self.capture(bridge, backend)?;
        let reading = self.inspect(&frame, last_accepted, diagnostics)?;
        Ok((frame, reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[test]
    fn empty_text_is_rejected() {
        let s = ResourceSanitizer::default();
        assert_eq!(s.sanitize("", Some(100)), Err(Rejection::EmptyText));
        assert_eq!(s.sanitize(" \n\x0c", Some(100)), Err(Rejection::EmptyText));
    }

    #[test]
    fn digits_are_pulled_out_of_noise() {
        let s = ResourceSanitizer::default();
        assert_eq!(s.sanitize("5043 Crowns.\n", Some(5000)), Ok(5043));
        assert_eq!(s.sanitize("Crowns", Some(5000)), Err(Rejection::NoDigits));
    }

    #[test]
    fn readings_above_ceiling_lose_a_digit() {
        let s = ResourceSanitizer::default();
        // "50432 Cropnsz." is a 5043 with a trailing digit smeared in.
        assert_eq!(s.sanitize("50432 Cropnsz.", Some(5000)), Ok(5043));
        assert_eq!(s.sanitize("50000", Some(50_000)), Ok(50_000));
    }

    #[test]
    fn ceiling_division_happens_before_plausibility() {
        let s = ResourceSanitizer::default();
        // 60000 / 10 = 6000, which is 4000 away from 2000.
        assert_eq!(s.sanitize("60000", Some(2000)), Ok(6000));
        // 600000 / 10 = 60000, far from 2000.
        assert_eq!(
            s.sanitize("600000", Some(2000)),
            Err(Rejection::Implausible {
                value: 60_000,
                last: 2000
            })
        );
    }

    #[test]
    fn big_jumps_are_misreads() {
        let s = ResourceSanitizer::default();
        assert_eq!(s.sanitize("5000", Some(0)), Ok(5000));
        assert_eq!(
            s.sanitize("5001", Some(0)),
            Err(Rejection::Implausible { value: 5001, last: 0 })
        );
        assert_eq!(s.sanitize("12000", None), Ok(12_000));
    }

    #[test]
    fn overlong_digit_runs_are_unparseable() {
        let s = ResourceSanitizer::default();
        assert_eq!(
            s.sanitize("99999999999999999999999", None),
            Err(Rejection::Unparseable)
        );
    }

    struct Scripted(Mutex<Vec<anyhow::Result<String>>>);

    impl Ocr for Scripted {
        fn read_text(&self, _crop: &Frame) -> anyhow::Result<String> {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn pipeline(texts: Vec<anyhow::Result<String>>) -> ObservationPipeline {
        ObservationPipeline::new(
            &ObservationConfig::default(),
            Box::new(Scripted(Mutex::new(texts))),
        )
    }

    #[test]
    fn rejected_reading_keeps_a_crop_on_disk() {
        let tmp = tempdir().unwrap();
        let mut diag = Diagnostics::in_dir(tmp.path().to_path_buf()).unwrap();
        let p = pipeline(vec![Ok("9000".into()), Ok("1200".into())]);
        let frame = Frame::new(RgbImage::new(534, 400));

        let r = p.read_resource(&frame, Some(1000), &mut diag).unwrap();
        assert_eq!(r.value, None);
        assert!(matches!(r.rejection, Some(Rejection::Implausible { .. })));
        assert!(tmp.path().join("crowns_0.png").exists());

        let r = p.read_resource(&frame, Some(1000), &mut diag).unwrap();
        assert_eq!(r.value, Some(1200));
    }

    #[test]
    fn ocr_failure_reads_as_empty() {
        let tmp = tempdir().unwrap();
        let mut diag = Diagnostics::in_dir(tmp.path().to_path_buf()).unwrap();
        let p = pipeline(vec![Err(anyhow::anyhow!("tesseract missing"))]);
        let frame = Frame::new(RgbImage::new(534, 400));
        let r = p.read_resource(&frame, Some(10), &mut diag).unwrap();
        assert_eq!(r, ResourceReading::rejected(Rejection::EmptyText, String::new()));
        assert_eq!(diag.rejected_count(), 0);
    }

    #[test]
    fn frame_too_small_for_readout_is_an_error() {
        let tmp = tempdir().unwrap();
        let mut diag = Diagnostics::in_dir(tmp.path().to_path_buf()).unwrap();
        let p = pipeline(vec![]);
        let frame = Frame::new(RgbImage::new(100, 100));
        assert!(p.read_resource(&frame, None, &mut diag).is_err());
    }
}
