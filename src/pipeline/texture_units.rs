//! Texture unit assignment for post-process passes.
//!
//! A unit is the slot through which a stage samples one input during a draw.
//! Unit `k` of a pass feeds the `k`-th sampler its program declares. Every
//! pass builds its own bind group, so assignment restarts at unit 0 for each
//! pass and depends only on binding order. That keeps frames reproducible:
//! the same plan yields the same units on every frame.

use crate::error::{PipelineError, Result};

/// Minimum number of sampled textures per shader stage every device supports.
pub const GUARANTEED_TEXTURE_UNITS: u32 = 16;

/// A numbered texture slot for one draw call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(pub u32);

impl TextureUnit {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The unit for the `binding_order`-th input of a pass.
pub const fn unit_for(binding_order: usize) -> TextureUnit {
    TextureUnit(binding_order as u32)
}

/// Assigns increasing units to `count` inputs of `pass`.
///
/// Fails when the pass needs more units than the device exposes.
pub fn assign(pass: &'static str, count: usize, max_units: u32) -> Result<Vec<TextureUnit>> {
    if count > max_units as usize {
        return Err(PipelineError::TextureUnitsExhausted {
            pass,
            requested: count,
            max: max_units,
        });
    }
    Ok((0..count).map(unit_for).collect())
}

/// Ephemeral association of a texture view to a unit for one draw.
#[derive(Clone, Copy, Debug)]
pub struct TextureBinding<'a> {
    pub unit: TextureUnit,
    pub view: &'a wgpu::TextureView,
}

/// Returns `true` when no two bindings share a unit.
pub fn units_are_distinct(bindings: &[TextureBinding<'_>]) -> bool {
    bindings
        .iter()
        .enumerate()
        .all(|(i, a)| bindings[i + 1..].iter().all(|b| b.unit != a.unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_increase_from_zero() {
        let units = assign("combine", 2, GUARANTEED_TEXTURE_UNITS).unwrap();
        assert_eq!(units, vec![TextureUnit(0), TextureUnit(1)]);
    }

    #[test]
    fn assignment_is_reproducible() {
        let first = assign("outline", 3, GUARANTEED_TEXTURE_UNITS).unwrap();
        let second = assign("outline", 3, GUARANTEED_TEXTURE_UNITS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_two_inputs_share_a_unit() {
        for count in 0..=GUARANTEED_TEXTURE_UNITS as usize {
            let mut units = assign("any", count, GUARANTEED_TEXTURE_UNITS).unwrap();
            units.sort();
            units.dedup();
            assert_eq!(units.len(), count);
        }
    }

    #[test]
    fn exceeding_the_device_limit_fails() {
        let err = assign("greedy", 17, GUARANTEED_TEXTURE_UNITS).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TextureUnitsExhausted {
                requested: 17,
                max: 16,
                ..
            }
        ));
    }
}
