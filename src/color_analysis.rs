// src/color_analysis.rs
//
// HLS conversion and band thresholding for lane-marking pixels.
//
// Values use the 8-bit HLS scale common to camera tooling:
//   H: 0-179 (degrees / 2), L: 0-255, S: 0-255
// so thresholds tuned against recorded footage carry over unchanged.

use serde::{Deserialize, Serialize};

// ============================================================================
// HLS CONVERSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hls {
    pub h: u8,
    pub l: u8,
    pub s: u8,
}

impl Hls {
    pub fn channels(&self) -> [u8; 3] {
        [self.h, self.l, self.s]
    }
}

/// Convert an RGB pixel to 8-bit HLS.
#[inline]
pub fn rgb_to_hls(r: u8, g: u8, b: u8) -> Hls {
    let r_n = r as f32 / 255.0;
    let g_n = g as f32 / 255.0;
    let b_n = b as f32 / 255.0;

    let max = r_n.max(g_n).max(b_n);
    let min = r_n.min(g_n).min(b_n);
    let delta = max - min;
    let l = (max + min) / 2.0;

    if delta < 1e-6 {
        return Hls {
            h: 0,
            l: to_u8(l * 255.0),
            s: 0,
        };
    }

    let s = if l < 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };

    let mut h = if max == r_n {
        60.0 * (g_n - b_n) / delta
    } else if max == g_n {
        120.0 + 60.0 * (b_n - r_n) / delta
    } else {
        240.0 + 60.0 * (r_n - g_n) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    Hls {
        h: to_u8(h / 2.0),
        l: to_u8(l * 255.0),
        s: to_u8(s * 255.0),
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

// ============================================================================
// BAND THRESHOLD
// ============================================================================

/// Inclusive per-channel HLS band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HlsRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HlsRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, hls: Hls) -> bool {
        hls.channels()
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(v, (lo, hi))| lo <= v && v <= hi)
    }

    #[inline]
    pub fn contains_rgb(&self, r: u8, g: u8, b: u8) -> bool {
        self.contains(rgb_to_hls(r, g, b))
    }
}
