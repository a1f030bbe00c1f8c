pub mod box_overlay_renderer;
pub mod label_font;
