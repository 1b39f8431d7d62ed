use serde::Deserialize;

/// SDXL-friendly sizes, scanned in order.
pub const PRESETS: [(u32, u32); 13] = [
    (1024, 1024),
    (1152, 896),
    (1216, 832),
    (1344, 768),
    (1536, 640),
    (1568, 672),
    (1728, 576),
    (896, 1152),
    (832, 1216),
    (768, 1344),
    (640, 1536),
    (576, 1728),
    (512, 2048),
];

/// Sources with at most this many pixels keep their size.
pub const DEFAULT_PIXEL_FLOOR: u64 = 1_100_000;
pub const DEFAULT_QUANTUM: u32 = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub pixel_floor: u64,
    /// Output dimensions are multiples of this.
    pub quantum: u32,
    pub scale: f64,
    /// Skip presets larger than the source in either dimension.
    pub shrink_only: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            pixel_floor: DEFAULT_PIXEL_FLOOR,
            quantum: DEFAULT_QUANTUM,
            scale: 1.0,
            shrink_only: false,
        }
    }
}

/// Pick the generation size for a source image: the preset closest in aspect ratio,
/// scaled and snapped to the quantum grid. Small sources are returned as is.
pub fn fit(width: u32, height: u32, options: &FitOptions) -> (u32, u32) {
    if width as u64 * height as u64 <= options.pixel_floor || width == 0 || height == 0 {
        return (width, height);
    }

    let aspect = width as f64 / height as f64;
    let best = PRESETS
        .iter()
        .filter(|(pw, ph)| !options.shrink_only || (*pw <= width && *ph <= height))
        .fold(None, |best: Option<(f64, (u32, u32))>, &(pw, ph)| {
            let diff = (aspect - pw as f64 / ph as f64).abs();
            match best {
                Some((best_diff, _)) if best_diff <= diff => best,
                _ => Some((diff, (pw, ph))),
            }
        });

    match best {
        Some((_, (pw, ph))) => (
            snap(pw as f64 * options.scale, options.quantum),
            snap(ph as f64 * options.scale, options.quantum),
        ),
        None => (width, height),
    }
}

/// Round to the nearest multiple of `quantum`, at least one quantum.
fn snap(value: f64, quantum: u32) -> u32 {
    let quantum = quantum.max(1);
    let steps = (value / quantum as f64).round();
    let steps = if steps.is_finite() && steps >= 1.0 { steps as u32 } else { 1 };
    steps.saturating_mul(quantum)
}
