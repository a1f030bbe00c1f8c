use std::time::Instant;

use crate::detection::domain::face_locator::FaceLocator;
use crate::detection::domain::texture;
use crate::pipeline::pipeline_logger::{PipelineLogger, METRIC_FACES, STAGE_EMBED, STAGE_LOCATE};
use crate::recognition::domain::detection_result::DetectionResult;
use crate::recognition::domain::embedding_provider::EmbeddingProvider;
use crate::recognition::domain::identity_matcher::IdentityMatcher;
use crate::recognition::domain::known_identity_set::KnownIdentitySet;
use crate::shared::constants::{DEFAULT_DOWNSCALE, DEFAULT_TEXTURE_FLOOR};
use crate::shared::frame::Frame;
use crate::shared::settings::Settings;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecognizerParams {
    /// Factor applied to the frame before locating and embedding.
    pub downscale: f64,
    /// Minimum pixel standard deviation for a candidate to be embedded.
    pub texture_floor: f64,
}

impl Default for RecognizerParams {
    fn default() -> Self {
        Self {
            downscale: DEFAULT_DOWNSCALE,
            texture_floor: DEFAULT_TEXTURE_FLOOR,
        }
    }
}

impl From<&Settings> for RecognizerParams {
    fn from(s: &Settings) -> Self {
        Self {
            downscale: s.downscale,
            texture_floor: s.texture_floor,
        }
    }
}

/// Full recognition for one frame: downscale, locate, filter by texture,
/// embed, classify, and map boxes back to full-frame coordinates.
///
/// Per-candidate failures (flat region, embedding miss, provider error,
/// nearest distance above the rejection ceiling) drop that candidate only.
pub struct FrameRecognizer {
    locator: FaceLocator,
    provider: Box<dyn EmbeddingProvider>,
    matcher: IdentityMatcher,
    params: RecognizerParams,
}

impl FrameRecognizer {
    pub fn new(
        locator: FaceLocator,
        provider: Box<dyn EmbeddingProvider>,
        matcher: IdentityMatcher,
        params: RecognizerParams,
    ) -> Self {
        Self {
            locator,
            provider,
            matcher,
            params,
        }
    }

    pub fn recognize(
        &mut self,
        frame: &Frame,
        known: &KnownIdentitySet,
        logger: &mut dyn PipelineLogger,
    ) -> Vec<DetectionResult> {
        let small = frame.scaled(self.params.downscale);
        let back_x = frame.width() as f64 / small.width().max(1) as f64;
        let back_y = frame.height() as f64 / small.height().max(1) as f64;

        let t0 = Instant::now();
        let candidates = self.locator.locate(&small);
        logger.timing(STAGE_LOCATE, t0.elapsed().as_secs_f64() * 1000.0);
        logger.metric(METRIC_FACES, candidates.len() as f64);

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !texture::has_texture(&small, &candidate, self.params.texture_floor) {
                log::trace!("Frame {}: skipping flat region {candidate:?}", frame.index());
                continue;
            }

            let t_embed = Instant::now();
            let embedded = self.provider.embed(&small.crop(&candidate));
            logger.timing(STAGE_EMBED, t_embed.elapsed().as_secs_f64() * 1000.0);

            let embedding = match embedded {
                Ok(Some(e)) => e,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Frame {}: embedding failed: {e}", frame.index());
                    continue;
                }
            };
            if let Some(dim) = known.dimension() {
                if dim != embedding.dimension() {
                    log::warn!(
                        "Embedding has dimension {}, model expects {dim}",
                        embedding.dimension()
                    );
                    continue;
                }
            }

            let Some(classification) = self.matcher.decide(&embedding, known) else {
                log::trace!("Frame {}: dropped implausible candidate", frame.index());
                continue;
            };
            results.push(DetectionResult {
                candidate: candidate.rescaled(back_x, back_y, frame.width(), frame.height()),
                identity: classification.identity,
                distance: classification.distance,
            });
        }
        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detection::domain::cascade_detector::{CascadeDetector, RawDetection};
    use crate::detection::domain::face_locator::LocatorParams;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::recognition::domain::face_embedding::FaceEmbedding;
    use crate::recognition::domain::identity_matcher::Identity;
    use crate::recognition::domain::known_identity_set::LabeledEmbedding;
    use crate::shared::face_candidate::FaceCandidate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) struct FixedCascade(pub Vec<RawDetection>);

    impl CascadeDetector for FixedCascade {
        fn detect(
            &mut self,
            _gray: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    pub(crate) enum Reply {
        Vector(Vec<f32>),
        Miss,
        Fail,
    }

    pub(crate) struct FixedProvider {
        pub reply: Reply,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedProvider {
        pub(crate) fn returning(values: &[f32]) -> Self {
            Self {
                reply: Reply::Vector(values.to_vec()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl EmbeddingProvider for FixedProvider {
        fn embed(
            &mut self,
            _region: &Frame,
        ) -> Result<Option<FaceEmbedding>, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Vector(v) => Ok(Some(FaceEmbedding::new(v.clone()))),
                Reply::Miss => Ok(None),
                Reply::Fail => Err("inference failed".into()),
            }
        }
    }

    /// 8-pixel black/white blocks: survives a 0.5 downscale with contrast.
    pub(crate) fn textured_frame(width: u32, height: u32, index: usize) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if ((x / 8) + (y / 8)) % 2 == 0 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(data, width, height, 3, index)
    }

    pub(crate) fn known_set() -> KnownIdentitySet {
        KnownIdentitySet::new(vec![
            LabeledEmbedding::new(FaceEmbedding::new(vec![0.0, 0.0]), "Ana"),
            LabeledEmbedding::new(FaceEmbedding::new(vec![3.0, 0.0]), "Luis"),
        ])
        .unwrap()
    }

    fn recognizer(provider: FixedProvider) -> FrameRecognizer {
        let locator = FaceLocator::new(
            Box::new(FixedCascade(vec![RawDetection::new(50, 50, 80, 80)])),
            LocatorParams::default(),
        );
        FrameRecognizer::new(
            locator,
            Box::new(provider),
            IdentityMatcher::new(0.5, 0.8),
            RecognizerParams::default(),
        )
    }

    fn run(provider: FixedProvider, frame: &Frame, known: &KnownIdentitySet) -> Vec<DetectionResult> {
        recognizer(provider).recognize(frame, known, &mut NullPipelineLogger)
    }

    #[test]
    fn test_match_is_rescaled_to_full_frame() {
        let results = run(
            FixedProvider::returning(&[0.1, 0.0]),
            &textured_frame(400, 400, 0),
            &known_set(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity, Identity::Known("Ana".into()));
        // 80px box + 8px margin on the half-size frame, doubled
        assert_eq!(results[0].candidate, FaceCandidate::new(84, 276, 276, 84));
    }

    #[test]
    fn test_odd_height_is_rescaled_per_axis() {
        // 400x301 halves to 200x151, so the vertical factor is 301/151
        let results = run(
            FixedProvider::returning(&[0.1, 0.0]),
            &textured_frame(400, 301, 0),
            &known_set(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate, FaceCandidate::new(84, 276, 275, 84));
    }

    #[test]
    fn test_unknown_below_ceiling_is_reported() {
        let results = run(
            FixedProvider::returning(&[1.5, 0.0]),
            &textured_frame(400, 400, 0),
            &known_set(),
        );
        assert_eq!(results[0].identity, Identity::Unknown);
    }

    #[test]
    fn test_far_embedding_is_dropped() {
        let results = run(
            FixedProvider::returning(&[1.5, 5.0]),
            &textured_frame(400, 400, 0),
            &known_set(),
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_flat_region_never_reaches_provider() {
        let provider = FixedProvider::returning(&[0.0, 0.0]);
        let calls = provider.calls.clone();
        let results = run(provider, &Frame::filled(400, 400, 128, 0), &known_set());
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_embedding_miss_skips_candidate() {
        let provider = FixedProvider {
            reply: Reply::Miss,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        assert!(run(provider, &textured_frame(400, 400, 0), &known_set()).is_empty());
    }

    #[test]
    fn test_provider_error_skips_candidate() {
        let provider = FixedProvider {
            reply: Reply::Fail,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        assert!(run(provider, &textured_frame(400, 400, 0), &known_set()).is_empty());
    }

    #[test]
    fn test_dimension_mismatch_skips_candidate() {
        let results = run(
            FixedProvider::returning(&[0.0, 0.0, 0.0]),
            &textured_frame(400, 400, 0),
            &known_set(),
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_empty_known_set_reports_unknown_sentinel() {
        let results = run(
            FixedProvider::returning(&[0.0, 0.0]),
            &textured_frame(400, 400, 0),
            &KnownIdentitySet::empty(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity, Identity::Unknown);
        assert_eq!(results[0].distance, 1.0);
    }
}
