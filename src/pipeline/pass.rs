//! The pass plan: which program writes which target from which inputs.
//!
//! A [`PassPlan`] is plain data. The compositor executes it in a loop, and
//! [`PassPlan::validate`] checks the hand-off rules once at construction so
//! the per-frame loop never has to.

use std::collections::HashSet;

use crate::error::{PipelineError, Result};

use super::reflect::{StageInterface, UniformKind, UniformValue};
use super::render_target::TargetId;
use super::texture_units;

/// The three post-process programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageId {
    Toonify,
    Outline,
    Combine,
}

impl StageId {
    pub const ALL: [StageId; 3] = [StageId::Toonify, StageId::Outline, StageId::Combine];

    /// Program name, also the shader file stem.
    pub fn name(self) -> &'static str {
        match self {
            StageId::Toonify => "toonify",
            StageId::Outline => "outline",
            StageId::Combine => "combine",
        }
    }

    /// The names and types the program must declare.
    pub fn interface(self) -> StageInterface {
        match self {
            StageId::Toonify => StageInterface {
                samplers: &["u_color_texture"],
                uniforms: &[],
            },
            StageId::Outline => StageInterface {
                samplers: &["u_depth_texture"],
                uniforms: &[("size", UniformKind::Vec2)],
            },
            StageId::Combine => StageInterface {
                samplers: &["u_base_texture", "u_outline_texture"],
                uniforms: &[],
            },
        }
    }
}

/// What a pass draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// The model through the lit color path.
    SceneColor,
    /// The model through the depth-as-color path.
    SceneDepth,
    /// A full-screen quad through a post-process program.
    Fullscreen(StageId),
}

/// Where a pass writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassTarget {
    Offscreen(TargetId),
    /// The visible surface, or the caller's target when rendering headless.
    Output,
}

/// Per-frame values a pass feeds to its program's uniforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformSource {
    /// `(width, height)` of the viewport in pixels.
    ViewportSize,
}

impl UniformSource {
    pub fn kind(self) -> UniformKind {
        match self {
            UniformSource::ViewportSize => UniformKind::Vec2,
        }
    }

    pub fn resolve(self, width: u32, height: u32) -> UniformValue {
        match self {
            UniformSource::ViewportSize => UniformValue::Vec2([width as f32, height as f32]),
        }
    }
}

/// One pass of the plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassDescriptor {
    pub label: &'static str,
    pub kind: PassKind,
    pub target: PassTarget,
    /// Sampled targets; input `k` is bound to texture unit `k`.
    pub inputs: Vec<TargetId>,
    /// Uniform values, in the program's declaration order.
    pub uniforms: Vec<UniformSource>,
}

impl PassDescriptor {
    fn scene(label: &'static str, kind: PassKind, target: TargetId) -> Self {
        Self {
            label,
            kind,
            target: PassTarget::Offscreen(target),
            inputs: Vec::new(),
            uniforms: Vec::new(),
        }
    }

    fn fullscreen(
        label: &'static str,
        stage: StageId,
        target: PassTarget,
        inputs: Vec<TargetId>,
        uniforms: Vec<UniformSource>,
    ) -> Self {
        Self {
            label,
            kind: PassKind::Fullscreen(stage),
            target,
            inputs,
            uniforms,
        }
    }
}

/// An ordered list of passes executed every frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassPlan {
    passes: Vec<PassDescriptor>,
}

impl PassPlan {
    pub fn new(passes: Vec<PassDescriptor>) -> Self {
        Self { passes }
    }

    /// The toon + outline plan.
    ///
    /// 1. scene color into `Scene`
    /// 2. toonify `Scene` into `ToonColor`
    /// 3. scene depth into `Depth`
    /// 4. outline `Depth` into `Scene`, overwriting the lit color
    /// 5. combine `ToonColor` and `Scene` into the output
    pub fn toon_outline() -> Self {
        Self::new(vec![
            PassDescriptor::scene("scene-color", PassKind::SceneColor, TargetId::Scene),
            PassDescriptor::fullscreen(
                "toonify",
                StageId::Toonify,
                PassTarget::Offscreen(TargetId::ToonColor),
                vec![TargetId::Scene],
                vec![],
            ),
            PassDescriptor::scene("scene-depth", PassKind::SceneDepth, TargetId::Depth),
            PassDescriptor::fullscreen(
                "outline",
                StageId::Outline,
                PassTarget::Offscreen(TargetId::Scene),
                vec![TargetId::Depth],
                vec![UniformSource::ViewportSize],
            ),
            PassDescriptor::fullscreen(
                "combine",
                StageId::Combine,
                PassTarget::Output,
                vec![TargetId::ToonColor, TargetId::Scene],
                vec![],
            ),
        ])
    }

    pub fn passes(&self) -> &[PassDescriptor] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Checks the plan against the hand-off rules.
    ///
    /// - the plan is non-empty and only its last pass writes the output
    /// - scene passes write an offscreen target that has a depth attachment
    /// - each post-process program is used by at most one pass
    /// - a pass binds exactly as many inputs and uniforms as its program declares
    /// - a pass never samples the target it writes
    /// - every input was written by an earlier pass
    /// - no pass needs more than `max_units` texture units
    pub fn validate(&self, max_units: u32) -> Result<()> {
        let Some(last) = self.passes.last() else {
            return Err(PipelineError::InvalidPlan("plan has no passes".to_string()));
        };
        if last.target != PassTarget::Output {
            return Err(PipelineError::InvalidPlan(format!(
                "last pass '{}' does not write the output",
                last.label
            )));
        }

        let mut written: HashSet<TargetId> = HashSet::new();
        let mut used_stages: HashSet<StageId> = HashSet::new();

        for (index, pass) in self.passes.iter().enumerate() {
            if pass.target == PassTarget::Output && index + 1 != self.passes.len() {
                return Err(PipelineError::InvalidPlan(format!(
                    "pass '{}' writes the output before the last pass",
                    pass.label
                )));
            }

            match pass.kind {
                PassKind::SceneColor | PassKind::SceneDepth => match pass.target {
                    PassTarget::Offscreen(id) if id.has_depth() => {}
                    other => {
                        return Err(PipelineError::InvalidPlan(format!(
                            "scene pass '{}' needs a target with depth, got {other:?}",
                            pass.label
                        )));
                    }
                },
                PassKind::Fullscreen(stage) => {
                    if !used_stages.insert(stage) {
                        return Err(PipelineError::InvalidPlan(format!(
                            "program '{}' is used by more than one pass",
                            stage.name()
                        )));
                    }
                }
            }

            let interface = match pass.kind {
                PassKind::Fullscreen(stage) => Some((stage.name(), stage.interface())),
                _ => None,
            };
            let expected_inputs = interface.map_or(0, |(_, i)| i.samplers.len());
            if pass.inputs.len() != expected_inputs {
                return Err(PipelineError::BindingCountMismatch {
                    pass: pass.label,
                    program: interface.map_or("scene", |(name, _)| name).to_string(),
                    supplied: pass.inputs.len(),
                    expected: expected_inputs,
                });
            }
            let expected_uniforms: Vec<UniformKind> = interface
                .map(|(_, i)| i.uniforms.iter().map(|&(_, kind)| kind).collect())
                .unwrap_or_default();
            let supplied_uniforms: Vec<UniformKind> =
                pass.uniforms.iter().map(|u| u.kind()).collect();
            if supplied_uniforms != expected_uniforms {
                return Err(PipelineError::InvalidPlan(format!(
                    "pass '{}' supplies uniforms {supplied_uniforms:?}, program expects {expected_uniforms:?}",
                    pass.label
                )));
            }

            texture_units::assign(pass.label, pass.inputs.len(), max_units)?;

            for &input in &pass.inputs {
                if pass.target == PassTarget::Offscreen(input) {
                    return Err(PipelineError::ReadWriteAlias {
                        pass: pass.label,
                        target: input,
                    });
                }
                if !written.contains(&input) {
                    return Err(PipelineError::NonCausalPass {
                        pass: pass.label,
                        target: input,
                    });
                }
            }

            if let PassTarget::Offscreen(id) = pass.target {
                written.insert(id);
            }
        }

        Ok(())
    }
}
