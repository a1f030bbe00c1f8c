//! ArcFace embedding provider using ONNX Runtime.
//!
//! Crops are resampled to 112x112, normalized to [-1, 1] and fed in NCHW
//! layout. Outputs are L2-normalized, so Euclidean distances fall in [0, 2].
use std::path::Path;

use crate::recognition::domain::embedding_provider::EmbeddingProvider;
use crate::recognition::domain::face_embedding::FaceEmbedding;
use crate::recognition::infrastructure::execution_provider;
use crate::shared::frame::Frame;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

/// Crops narrower or shorter than this are not worth embedding.
const MIN_CROP_SIZE: u32 = 30;

pub struct OnnxEmbeddingProvider {
    session: ort::session::Session,
}

impl OnnxEmbeddingProvider {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: execution_provider::load_session(model_path)?,
        })
    }
}

impl EmbeddingProvider for OnnxEmbeddingProvider {
    fn embed(&mut self, region: &Frame) -> Result<Option<FaceEmbedding>, Box<dyn std::error::Error>> {
        if region.width() < MIN_CROP_SIZE || region.height() < MIN_CROP_SIZE {
            return Ok(None);
        }
        if region.channels() != 3 {
            return Err(format!("expected RGB crop, got {} channels", region.channels()).into());
        }

        let tensor = preprocess(region.data(), region.width(), region.height());
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let mut values: Vec<f32> = embedding_array.iter().copied().collect();

        if !l2_normalize(&mut values) {
            return Ok(None);
        }
        Ok(Some(FaceEmbedding::new(values)))
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}

/// Scale `v` to unit length. Returns false for a zero vector, which is
/// left untouched.
fn l2_normalize(v: &mut [f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}
