use crate::recognition::domain::identity_matcher::Identity;
use crate::shared::face_candidate::FaceCandidate;

/// A located face and who it was classified as, in full-frame coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub candidate: FaceCandidate,
    pub identity: Identity,
    pub distance: f64,
}

impl DetectionResult {
    pub fn is_known(&self) -> bool {
        self.identity.is_known()
    }
}
