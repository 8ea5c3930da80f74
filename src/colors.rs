// src/colors.rs

use std::collections::HashMap;
use std::sync::OnceLock;

use palette::{FromColor, Lch, Srgb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{HistoryItemRef, HistoryItemRefId};
use crate::provider::PrivilegedRefs;

/// Number of rotating lane colors
pub const LANE_COLOR_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphColor {
    /// The checked out reference
    Ref,
    RemoteRef,
    BaseRef,
    /// Color hint the provider attached to the reference
    Provided(String),
    /// One of the rotating lane colors
    Lane(usize),
}

impl GraphColor {
    pub fn lane(index: usize) -> Self {
        GraphColor::Lane(index % LANE_COLOR_COUNT)
    }

    pub fn rgb(&self) -> [u8; 3] {
        match self {
            GraphColor::Ref => lch_to_rgb(Lch::new(60.0f32, 60.0f32, 260.0f32)),
            GraphColor::RemoteRef => lch_to_rgb(Lch::new(55.0f32, 70.0f32, 310.0f32)),
            GraphColor::BaseRef => lch_to_rgb(Lch::new(70.0f32, 75.0f32, 60.0f32)),
            GraphColor::Provided(hex) => parse_hex(hex).unwrap_or([128, 128, 128]),
            GraphColor::Lane(index) => lane_colors()[index % LANE_COLOR_COUNT],
        }
    }
}

/// Reference id → color. Uncolored references are present with `None`.
pub type ColorMap = HashMap<HistoryItemRefId, Option<GraphColor>>;

/// Build the color map for one fetch.
///
/// Privileged references are colored first; every other reference of the
/// resolved filter gets an entry so the renderer never meets an unknown id.
pub fn assign_colors(privileged: &PrivilegedRefs, filter_refs: &[HistoryItemRef]) -> ColorMap {
    let mut map = ColorMap::new();

    if let Some(current) = &privileged.current {
        map.insert(current.id.clone(), Some(ref_color(current, GraphColor::Ref)));
    }
    if let Some(remote) = &privileged.remote {
        map.entry(remote.id.clone())
            .or_insert_with(|| Some(ref_color(remote, GraphColor::RemoteRef)));
    }
    if let Some(base) = &privileged.base {
        map.entry(base.id.clone())
            .or_insert_with(|| Some(ref_color(base, GraphColor::BaseRef)));
    }

    for r in filter_refs {
        map.entry(r.id.clone())
            .or_insert_with(|| r.color.clone().map(GraphColor::Provided));
    }

    map
}

fn ref_color(r: &HistoryItemRef, fallback: GraphColor) -> GraphColor {
    r.color.clone().map(GraphColor::Provided).unwrap_or(fallback)
}

fn lane_colors() -> &'static [[u8; 3]; LANE_COLOR_COUNT] {
    static COLORS: OnceLock<[[u8; 3]; LANE_COLOR_COUNT]> = OnceLock::new();
    COLORS.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(42);
        let mut colors = [[0u8; 3]; LANE_COLOR_COUNT];
        for (i, color) in colors.iter_mut().enumerate() {
            // Spread hues evenly, jitter within the slot
            let slot = 360.0f32 / LANE_COLOR_COUNT as f32;
            let hue = slot * i as f32 + rng.gen_range(0.0f32..slot * 0.5f32);
            *color = lch_to_rgb(Lch::new(65.0f32, 70.0f32, hue));
        }
        colors
    })
}

fn lch_to_rgb(color: Lch) -> [u8; 3] {
    let srgb: Srgb<f32> = Srgb::from_color(color);
    let (r, g, b) = srgb.into_components();
    [
        (r.clamp(0.0, 1.0) * 255.0f32) as u8,
        (g.clamp(0.0, 1.0) * 255.0f32) as u8,
        (b.clamp(0.0, 1.0) * 255.0f32) as u8,
    ]
}

fn parse_hex(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(id: &str) -> HistoryItemRef {
        HistoryItemRef::new(id, id)
    }

    #[test]
    fn privileged_refs_are_colored_first() {
        let privileged = PrivilegedRefs {
            current: Some(r("main")),
            remote: Some(r("origin/main")),
            base: Some(r("origin/dev")),
        };
        let map = assign_colors(&privileged, &[r("main"), r("feature")]);

        assert_eq!(map.get("main"), Some(&Some(GraphColor::Ref)));
        assert_eq!(map.get("origin/main"), Some(&Some(GraphColor::RemoteRef)));
        assert_eq!(map.get("origin/dev"), Some(&Some(GraphColor::BaseRef)));
        assert_eq!(map.get("feature"), Some(&None));
    }

    #[test]
    fn every_filter_and_privileged_id_has_an_entry() {
        let privileged = PrivilegedRefs {
            current: Some(r("main")),
            remote: None,
            base: Some(r("base")),
        };
        let filter = [r("a"), r("b"), r("main")];
        let map = assign_colors(&privileged, &filter);

        let mut ids: Vec<&str> = map.keys().map(String::as_str).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b", "base", "main"]);
    }

    #[test]
    fn provider_hint_wins_over_role_color() {
        let mut current = r("main");
        current.color = Some("#ff0000".to_string());
        let privileged = PrivilegedRefs {
            current: Some(current),
            ..PrivilegedRefs::default()
        };

        let map = assign_colors(&privileged, &[]);
        let color = map.get("main").cloned().flatten().unwrap();
        assert_eq!(color.rgb(), [255, 0, 0]);
    }

    #[test]
    fn lane_colors_are_stable_and_rotate() {
        assert_eq!(GraphColor::lane(7), GraphColor::Lane(2));
        assert_eq!(GraphColor::lane(1).rgb(), GraphColor::lane(6).rgb());
        assert_ne!(GraphColor::lane(0).rgb(), GraphColor::lane(1).rgb());
    }
}
