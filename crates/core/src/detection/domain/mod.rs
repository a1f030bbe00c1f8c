pub mod cascade_detector;
pub mod face_locator;
pub mod texture;
