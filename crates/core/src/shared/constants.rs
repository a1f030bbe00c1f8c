pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

pub const CASCADE_MODEL_NAME: &str = "seeta_fd_frontal_v1.0.bin";
pub const CASCADE_MODEL_URL: &str =
    "https://github.com/atomashpolskiy/rustface/raw/master/model/seeta_fd_frontal_v1.0.bin";

/// Directory name used under the platform config/data/cache dirs.
pub const APP_DIR_NAME: &str = "Rollcall";

pub const ARTIFACT_FILE_NAME: &str = "known_faces.rkm";
pub const CORPUS_DIR_NAME: &str = "known_faces";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Label shown for a face that matched no enrolled identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Distance reported when the known set is empty.
pub const EMPTY_SET_DISTANCE: f64 = 1.0;

pub const DEFAULT_TOLERANCE: f64 = 0.5;
pub const DEFAULT_REJECTION_CEILING: f64 = 0.8;
pub const DEFAULT_SKIP_INTERVAL: usize = 3;
pub const DEFAULT_DOWNSCALE: f64 = 0.5;
pub const DEFAULT_MIN_FACE_SIZE: u32 = 80;
pub const DEFAULT_MIN_ASPECT_RATIO: f64 = 0.7;
pub const DEFAULT_MAX_ASPECT_RATIO: f64 = 1.4;
pub const DEFAULT_MARGIN_FRACTION: f64 = 0.1;
pub const DEFAULT_TEXTURE_FLOOR: f64 = 15.0;
pub const DEFAULT_CAPTURE_COUNT: usize = 50;
pub const DEFAULT_CROP_SIZE: u32 = 150;
