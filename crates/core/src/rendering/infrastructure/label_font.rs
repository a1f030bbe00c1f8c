use std::path::Path;

use ab_glyph::FontVec;

/// Checked in order when no font is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
    "C:\\Windows\\Fonts\\segoeui.ttf",
];

/// Load a TrueType/OpenType font file.
pub fn load_font(path: &Path) -> Result<FontVec, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    FontVec::try_from_vec(bytes).map_err(|e| format!("{}: {e}", path.display()).into())
}

/// The configured font if it loads, otherwise the first usable system font.
///
/// `None` means labels cannot be drawn; boxes still can.
pub fn find_label_font(configured: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = configured {
        match load_font(path) {
            Ok(font) => return Some(font),
            Err(e) => log::warn!("Cannot use label font {}: {e}", path.display()),
        }
    }
    let found = SYSTEM_FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .filter(|p| p.is_file())
        .find_map(|p| load_font(p).ok());
    if found.is_none() {
        log::warn!("No label font found, overlays will show boxes without names");
    }
    found
}
