pub mod rustface_detector;
