use ab_glyph::{FontVec, PxScale};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::recognition::domain::detection_result::DetectionResult;
use crate::rendering::domain::overlay_renderer::OverlayRenderer;
use crate::shared::frame::Frame;

pub const KNOWN_COLOR: [u8; 3] = [0, 255, 0];
pub const UNKNOWN_COLOR: [u8; 3] = [255, 0, 0];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

const DEFAULT_THICKNESS: u32 = 2;
const DEFAULT_LABEL_HEIGHT: u32 = 30;
const DEFAULT_TEXT_PX: f32 = 20.0;
const TEXT_INSET: u32 = 6;

/// Draws each result as an outlined box with a filled label strip along
/// its bottom edge. Known faces are green, unknown faces red.
///
/// Without a font the strip is drawn empty.
pub struct BoxOverlayRenderer {
    thickness: u32,
    label_height: u32,
    text_scale: PxScale,
    font: Option<FontVec>,
}

impl BoxOverlayRenderer {
    pub fn new(thickness: u32, label_height: u32, text_px: f32) -> Self {
        Self {
            thickness: thickness.max(1),
            label_height,
            text_scale: PxScale::from(text_px),
            font: None,
        }
    }

    pub fn with_font(mut self, font: Option<FontVec>) -> Self {
        self.font = font;
        self
    }
}

impl Default for BoxOverlayRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_THICKNESS, DEFAULT_LABEL_HEIGHT, DEFAULT_TEXT_PX)
    }
}

impl OverlayRenderer for BoxOverlayRenderer {
    fn render(
        &self,
        frame: &mut Frame,
        results: &[DetectionResult],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if results.is_empty() {
            return Ok(());
        }
        if frame.channels() != 3 {
            return Err(format!("cannot draw on {}-channel frame", frame.channels()).into());
        }
        let (width, height) = (frame.width(), frame.height());
        let mut canvas = ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width, height, frame.data_mut())
            .ok_or("frame buffer does not match its dimensions")?;

        for result in results {
            let b = result.candidate.clamped(width, height);
            if b.is_empty() {
                continue;
            }
            let color = Rgb(if result.is_known() {
                KNOWN_COLOR
            } else {
                UNKNOWN_COLOR
            });

            // nested outlines, innermost stays inside the box
            let rings = self.thickness.min(b.width() / 2).min(b.height() / 2).max(1);
            for i in 0..rings {
                let ring = Rect::at((b.left + i) as i32, (b.top + i) as i32)
                    .of_size(b.width() - 2 * i, b.height() - 2 * i);
                draw_hollow_rect_mut(&mut canvas, ring, color);
            }

            let bar_top = b.bottom.saturating_sub(self.label_height).max(b.top);
            let bar_height = b.bottom - bar_top;
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(b.left as i32, bar_top as i32).of_size(b.width(), bar_height),
                color,
            );

            if let Some(font) = &self.font {
                let label = result.identity.label();
                let (_, text_height) = text_size(self.text_scale, font, label);
                let text_y = bar_top + bar_height.saturating_sub(text_height) / 2;
                draw_text_mut(
                    &mut canvas,
                    Rgb(TEXT_COLOR),
                    (b.left + TEXT_INSET) as i32,
                    text_y as i32,
                    self.text_scale,
                    font,
                    label,
                );
            }
        }
        Ok(())
    }
}
