// src/pipeline/effects.rs
//! Deterministic motion-effect sequencing for image assets.
//! Pure functions of (index, total, rule) - same inputs, same assignment.

use crate::queue::{ImageAsset, MotionEffect};

/// Canonical effect rotation used by the bulk and fast-cycle rules
pub const EFFECT_ROTATION: [MotionEffect; 4] = [
    MotionEffect::ZoomIn,
    MotionEffect::ZoomOut,
    MotionEffect::PanLeft,
    MotionEffect::PanRight,
];

/// How a recomputation assigns sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectRule {
    /// Position-based: zoom in at the head, alternate pans through the
    /// middle, zoom out at the tail
    PerPosition,
    /// Every image gets the full four-effect rotation
    ApplyAll,
    /// A single effect per image, cycling the rotation by index
    FastCycle,
}

/// Default per-image rule.
///
/// With `p = index / max(total - 1, 1)`:
/// `p <= 0.2` zooms in, `p > 0.8` zooms out, and the middle band pans
/// left on even indices and right on odd ones.
pub fn positional_sequence(index: usize, total: usize) -> Vec<MotionEffect> {
    let span = total.saturating_sub(1).max(1);
    let p = index as f64 / span as f64;
    if p <= 0.2 {
        vec![MotionEffect::ZoomIn]
    } else if p <= 0.8 {
        if index % 2 == 0 {
            vec![MotionEffect::PanLeft]
        } else {
            vec![MotionEffect::PanRight]
        }
    } else {
        vec![MotionEffect::ZoomOut]
    }
}

/// Bulk rule: the full rotation for every image
pub fn full_rotation_sequence() -> Vec<MotionEffect> {
    EFFECT_ROTATION.to_vec()
}

/// Fast-cycle rule: one effect, chosen by `index mod 4`
pub fn fast_cycle_sequence(index: usize) -> Vec<MotionEffect> {
    vec![EFFECT_ROTATION[index % EFFECT_ROTATION.len()]]
}

/// Recompute every asset's sequence under `rule`. Total replacement -
/// whatever was stored before is discarded, never merged.
pub fn assign_sequences(rule: EffectRule, images: &mut [ImageAsset]) {
    let total = images.len();
    for (index, image) in images.iter_mut().enumerate() {
        image.effects = match rule {
            EffectRule::PerPosition => positional_sequence(index, total),
            EffectRule::ApplyAll => full_rotation_sequence(),
            EffectRule::FastCycle => fast_cycle_sequence(index),
        };
    }
}

/// Strip every sequence (the static assembly strategy sends none)
pub fn clear_sequences(images: &mut [ImageAsset]) {
    for image in images.iter_mut() {
        image.effects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MotionEffect::*;

    fn assets(n: usize) -> Vec<ImageAsset> {
        (0..n)
            .map(|i| ImageAsset {
                filename: format!("img_{i:03}.png"),
                position_index: i,
                source_prompt: format!("prompt {i}"),
                effects: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn positional_rule_five_images() {
        let seqs: Vec<_> = (0..5).map(|i| positional_sequence(i, 5)).collect();
        assert_eq!(seqs[0], vec![ZoomIn]);
        assert_eq!(seqs[1], vec![PanRight]);
        assert_eq!(seqs[2], vec![PanLeft]);
        assert_eq!(seqs[3], vec![PanRight]);
        assert_eq!(seqs[4], vec![ZoomOut]);
    }

    #[test]
    fn positional_rule_band_boundaries() {
        // six images: p hits 0.2 and 0.8 exactly
        let seqs: Vec<_> = (0..6).map(|i| positional_sequence(i, 6)).collect();
        assert_eq!(seqs[0], vec![ZoomIn]);
        assert_eq!(seqs[1], vec![ZoomIn], "p = 0.2 still zooms in");
        assert_eq!(seqs[2], vec![PanLeft]);
        assert_eq!(seqs[3], vec![PanRight]);
        assert_eq!(seqs[4], vec![PanLeft], "p = 0.8 still pans");
        assert_eq!(seqs[5], vec![ZoomOut]);
    }

    #[test]
    fn single_image_zooms_in() {
        assert_eq!(positional_sequence(0, 1), vec![ZoomIn]);
    }

    #[test]
    fn fast_cycle_wraps_rotation() {
        assert_eq!(fast_cycle_sequence(0), vec![ZoomIn]);
        assert_eq!(fast_cycle_sequence(1), vec![ZoomOut]);
        assert_eq!(fast_cycle_sequence(2), vec![PanLeft]);
        assert_eq!(fast_cycle_sequence(3), vec![PanRight]);
        assert_eq!(fast_cycle_sequence(4), vec![ZoomIn]);
        assert_eq!(fast_cycle_sequence(7), vec![PanRight]);
    }

    #[test]
    fn apply_all_gives_full_rotation() {
        let mut imgs = assets(3);
        assign_sequences(EffectRule::ApplyAll, &mut imgs);
        for img in &imgs {
            assert_eq!(img.effects, vec![ZoomIn, ZoomOut, PanLeft, PanRight]);
        }
    }

    #[test]
    fn recomputation_replaces_never_merges() {
        let mut imgs = assets(4);
        assign_sequences(EffectRule::ApplyAll, &mut imgs);
        assign_sequences(EffectRule::FastCycle, &mut imgs);
        assert_eq!(imgs[0].effects, vec![ZoomIn]);
        assert_eq!(imgs[1].effects, vec![ZoomOut]);
        assert_eq!(imgs[2].effects, vec![PanLeft]);
        assert_eq!(imgs[3].effects, vec![PanRight]);
    }

    #[test]
    fn assignment_is_deterministic() {
        let mut a = assets(9);
        let mut b = assets(9);
        assign_sequences(EffectRule::PerPosition, &mut a);
        assign_sequences(EffectRule::PerPosition, &mut b);
        assert_eq!(a, b);

        // idempotent under repetition
        let snapshot = a.clone();
        assign_sequences(EffectRule::PerPosition, &mut a);
        assert_eq!(a, snapshot);
    }

    #[test]
    fn clear_strips_everything() {
        let mut imgs = assets(3);
        assign_sequences(EffectRule::ApplyAll, &mut imgs);
        clear_sequences(&mut imgs);
        assert!(imgs.iter().all(|i| i.effects.is_empty()));
    }
}
