// Watermark geometry: scaled size and placement inside the video frame

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MARGIN_PX;
use crate::error::{RainmakerError, Result};
use crate::metadata::MediaDimensions;

/// Where the watermark is anchored in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
    Center,
}

impl Position {
    pub const ALL: [Position; 5] = [
        Position::UpperLeft,
        Position::UpperRight,
        Position::LowerLeft,
        Position::LowerRight,
        Position::Center,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Position::UpperLeft => "upper-left",
            Position::UpperRight => "upper-right",
            Position::LowerLeft => "lower-left",
            Position::LowerRight => "lower-right",
            Position::Center => "center",
        }
    }

    /// Parse a keyword, falling back to upper-left for anything unrecognized.
    pub fn parse_lenient(s: &str) -> Position {
        s.parse().unwrap_or_else(|_| {
            log::warn!("Unknown position '{}', using {}", s, Position::UpperLeft);
            Position::UpperLeft
        })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Accepts "upper left", "upper-left", "UPPER_LEFT" and so on.
impl FromStr for Position {
    type Err = RainmakerError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c.to_ascii_lowercase() })
            .collect();

        Position::ALL
            .into_iter()
            .find(|p| p.keyword() == normalized)
            .ok_or_else(|| RainmakerError::InvalidPosition(s.to_string()))
    }
}

/// Scaled watermark size and its top-left offset in the video. Offsets may be
/// negative when the watermark does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Placement {
    pub fn fits_within(&self, video: MediaDimensions) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x + self.scaled_width as i64 <= video.width as i64
            && self.y + self.scaled_height as i64 <= video.height as i64
    }
}

/// What to do with a placement that leaves the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundsPolicy {
    /// Pass the placement through untouched
    #[default]
    Unchecked,
    /// Shrink and shift the watermark until it lies inside the frame
    Clamp,
    /// Refuse placements that leave the frame
    Reject,
}

/// Compute the scaled watermark size and offset for `position`.
///
/// Both axes use the same scale factor so the aspect ratio is preserved.
/// No bounds checking is done here; see [`apply_bounds`].
pub fn compute(
    video: MediaDimensions,
    watermark: MediaDimensions,
    size_percentage: f64,
    position: Position,
) -> Placement {
    let scale = size_percentage / 100.0;
    let scaled_width = (watermark.width as f64 * scale).floor() as u32;
    let scaled_height = (watermark.height as f64 * scale).floor() as u32;

    let (x, y) = offsets(video, scaled_width, scaled_height, position);

    Placement { x, y, scaled_width, scaled_height }
}

fn offsets(video: MediaDimensions, width: u32, height: u32, position: Position) -> (i64, i64) {
    let spare_x = video.width as i64 - width as i64;
    let spare_y = video.height as i64 - height as i64;

    match position {
        Position::UpperLeft => (MARGIN_PX, MARGIN_PX),
        Position::UpperRight => (spare_x - MARGIN_PX, MARGIN_PX),
        Position::LowerLeft => (MARGIN_PX, spare_y - MARGIN_PX),
        Position::LowerRight => (spare_x - MARGIN_PX, spare_y - MARGIN_PX),
        // Floor division, also for negative spare space
        Position::Center => (spare_x.div_euclid(2), spare_y.div_euclid(2)),
    }
}

/// Validate or adjust a placement against the video frame.
pub fn apply_bounds(placement: Placement, video: MediaDimensions, policy: BoundsPolicy) -> Result<Placement> {
    if placement.scaled_width == 0 || placement.scaled_height == 0 {
        return Err(RainmakerError::Geometry(format!(
            "Watermark scales to {}x{}",
            placement.scaled_width, placement.scaled_height
        )));
    }

    match policy {
        BoundsPolicy::Unchecked => Ok(placement),
        BoundsPolicy::Reject => {
            if placement.fits_within(video) {
                Ok(placement)
            } else {
                Err(RainmakerError::Geometry(format!(
                    "Watermark {}x{} at ({}, {}) leaves the {} frame",
                    placement.scaled_width, placement.scaled_height, placement.x, placement.y, video
                )))
            }
        }
        BoundsPolicy::Clamp => Ok(clamp(placement, video)),
    }
}

fn clamp(placement: Placement, video: MediaDimensions) -> Placement {
    let mut width = placement.scaled_width;
    let mut height = placement.scaled_height;

    if width > video.width || height > video.height {
        let shrink = f64::min(
            video.width as f64 / width as f64,
            video.height as f64 / height as f64,
        );
        width = ((width as f64 * shrink).floor() as u32).clamp(1, video.width);
        height = ((height as f64 * shrink).floor() as u32).clamp(1, video.height);
        log::debug!(
            "Clamped watermark {}x{} -> {}x{}",
            placement.scaled_width, placement.scaled_height, width, height
        );
    }

    let max_x = video.width as i64 - width as i64;
    let max_y = video.height as i64 - height as i64;

    Placement {
        x: placement.x.clamp(0, max_x),
        y: placement.y.clamp(0, max_y),
        scaled_width: width,
        scaled_height: height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HD: MediaDimensions = MediaDimensions { width: 1920, height: 1080 };
    const LOGO: MediaDimensions = MediaDimensions { width: 400, height: 300 };

    #[test]
    fn test_lower_right_reference_case() {
        let p = compute(HD, LOGO, 30.0, Position::LowerRight);
        assert_eq!(p, Placement { x: 1790, y: 980, scaled_width: 120, scaled_height: 90 });
    }

    #[test]
    fn test_corners_keep_ten_pixel_margin() {
        for position in [Position::UpperLeft, Position::UpperRight, Position::LowerLeft, Position::LowerRight] {
            let p = compute(HD, LOGO, 45.0, position);
            let right_gap = HD.width as i64 - (p.x + p.scaled_width as i64);
            let bottom_gap = HD.height as i64 - (p.y + p.scaled_height as i64);

            match position {
                Position::UpperLeft => assert_eq!((p.x, p.y), (10, 10)),
                Position::UpperRight => assert_eq!((right_gap, p.y), (10, 10)),
                Position::LowerLeft => assert_eq!((p.x, bottom_gap), (10, 10)),
                Position::LowerRight => assert_eq!((right_gap, bottom_gap), (10, 10)),
                Position::Center => unreachable!(),
            }
        }
    }

    #[test]
    fn test_center_uses_floor_division() {
        let video = MediaDimensions::new(1281, 721);
        let p = compute(video, LOGO, 50.0, Position::Center);
        assert_eq!((p.scaled_width, p.scaled_height), (200, 150));
        assert_eq!((p.x, p.y), ((1281 - 200) / 2, (721 - 150) / 2));
    }

    #[test]
    fn test_center_overflow_floors_toward_negative() {
        let video = MediaDimensions::new(100, 100);
        let p = compute(video, MediaDimensions::new(203, 101), 100.0, Position::Center);
        assert_eq!((p.x, p.y), (-52, -1));
    }

    #[test]
    fn test_scaling_preserves_aspect_ratio() {
        for pct in [10.0, 25.0, 30.0, 50.0, 75.0, 100.0] {
            let p = compute(HD, LOGO, pct, Position::UpperLeft);
            assert_eq!(
                p.scaled_width as u64 * LOGO.height as u64,
                p.scaled_height as u64 * LOGO.width as u64,
                "aspect drift at {pct}%"
            );
        }
    }

    #[test]
    fn test_scaling_floors() {
        let p = compute(HD, MediaDimensions::new(333, 111), 33.0, Position::UpperLeft);
        assert_eq!((p.scaled_width, p.scaled_height), (109, 36));
    }

    #[test]
    fn test_negative_offsets_pass_through() {
        let small = MediaDimensions::new(100, 80);
        let p = compute(small, LOGO, 100.0, Position::LowerRight);
        assert_eq!((p.x, p.y), (100 - 400 - 10, 80 - 300 - 10));
        assert_eq!(apply_bounds(p, small, BoundsPolicy::Unchecked).unwrap(), p);
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!("upper left".parse::<Position>().unwrap(), Position::UpperLeft);
        assert_eq!("Lower-Right".parse::<Position>().unwrap(), Position::LowerRight);
        assert_eq!(" UPPER_RIGHT ".parse::<Position>().unwrap(), Position::UpperRight);
        assert_eq!("center".parse::<Position>().unwrap(), Position::Center);
        for p in Position::ALL {
            assert_eq!(p.to_string().parse::<Position>().unwrap(), p);
        }
    }

    #[test]
    fn test_unknown_position_strict_vs_lenient() {
        let err = "top middle".parse::<Position>().unwrap_err();
        assert!(matches!(err, RainmakerError::InvalidPosition(ref s) if s == "top middle"));

        let lenient = Position::parse_lenient("top middle");
        assert_eq!(
            compute(HD, LOGO, 30.0, lenient),
            compute(HD, LOGO, 30.0, Position::UpperLeft)
        );
    }

    #[test]
    fn test_zero_sized_watermark_rejected_by_every_policy() {
        let p = compute(HD, MediaDimensions::new(5, 5), 10.0, Position::Center);
        assert_eq!(p.scaled_width, 0);
        for policy in [BoundsPolicy::Unchecked, BoundsPolicy::Clamp, BoundsPolicy::Reject] {
            assert!(matches!(apply_bounds(p, HD, policy), Err(RainmakerError::Geometry(_))));
        }
    }

    #[test]
    fn test_reject_policy() {
        let inside = compute(HD, LOGO, 30.0, Position::LowerRight);
        assert_eq!(apply_bounds(inside, HD, BoundsPolicy::Reject).unwrap(), inside);

        let small = MediaDimensions::new(320, 240);
        let outside = compute(small, LOGO, 100.0, Position::UpperRight);
        assert!(matches!(
            apply_bounds(outside, small, BoundsPolicy::Reject),
            Err(RainmakerError::Geometry(_))
        ));
    }

    #[test]
    fn test_clamp_policy_keeps_watermark_in_frame() {
        let small = MediaDimensions::new(320, 240);
        for position in Position::ALL {
            let raw = compute(small, MediaDimensions::new(800, 300), 100.0, position);
            let clamped = apply_bounds(raw, small, BoundsPolicy::Clamp).unwrap();
            assert!(clamped.fits_within(small), "{position}: {clamped:?}");
            assert_eq!(clamped.scaled_width, 320);
            assert_eq!(clamped.scaled_height, 120);
        }
    }

    #[test]
    fn test_clamp_leaves_fitting_placement_alone() {
        let p = compute(HD, LOGO, 30.0, Position::Center);
        assert_eq!(apply_bounds(p, HD, BoundsPolicy::Clamp).unwrap(), p);
    }
}
