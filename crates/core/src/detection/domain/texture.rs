use crate::shared::face_candidate::FaceCandidate;
use crate::shared::frame::Frame;

/// Population standard deviation of every byte inside `candidate`.
///
/// Returns 0.0 for an empty region.
pub fn pixel_std_dev(frame: &Frame, candidate: &FaceCandidate) -> f64 {
    let region = frame.crop(candidate);
    let data = region.data();
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = data
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// Whether the region has enough contrast to be worth embedding.
///
/// Near-uniform regions (walls, blown-out highlights) fall below `floor`.
pub fn has_texture(frame: &Frame, candidate: &FaceCandidate, floor: f64) -> bool {
    pixel_std_dev(frame, candidate) >= floor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn checkerboard(width: u32, height: u32, low: u8, high: u8) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { low } else { high };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_uniform_region_has_zero_deviation() {
        let frame = Frame::filled(20, 20, 77, 0);
        let all = FaceCandidate::new(0, 20, 20, 0);
        assert_relative_eq!(pixel_std_dev(&frame, &all), 0.0);
        assert!(!has_texture(&frame, &all, 15.0));
    }

    #[test]
    fn test_checkerboard_deviation_is_half_the_spread() {
        let frame = checkerboard(10, 10, 100, 200);
        let all = FaceCandidate::new(0, 10, 10, 0);
        assert_relative_eq!(pixel_std_dev(&frame, &all), 50.0, epsilon = 1e-9);
        assert!(has_texture(&frame, &all, 15.0));
    }

    #[test]
    fn test_low_contrast_below_floor() {
        let frame = checkerboard(10, 10, 100, 120);
        let all = FaceCandidate::new(0, 10, 10, 0);
        assert!(!has_texture(&frame, &all, 15.0));
    }

    #[test]
    fn test_empty_region_is_untextured() {
        let frame = checkerboard(10, 10, 0, 255);
        let none = FaceCandidate::new(5, 5, 5, 5);
        assert_eq!(pixel_std_dev(&frame, &none), 0.0);
    }
}
