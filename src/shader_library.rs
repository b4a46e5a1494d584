//! WGSL sources for the five programs of the pipeline.
//!
//! The built-in sources are compiled into the binary. [`ShaderLibrary::from_dir`]
//! loads `<dir>/<name>.wgsl` overrides at startup; programs without a file in
//! the directory keep their built-in source. Overrides are checked against
//! the same binding contracts as the built-ins when the compositor is built,
//! or earlier with [`ShaderLibrary::validate`].

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::pipeline::{reflect, StageId};

/// Program name of the lit scene pass.
pub const SCENE_COLOR: &str = "scene_color";
/// Program name of the depth-as-color scene pass.
pub const SCENE_DEPTH: &str = "scene_depth";

/// One program's source and where it came from.
#[derive(Clone, Debug)]
pub struct ShaderSource {
    name: &'static str,
    path: Option<PathBuf>,
    source: Cow<'static, str>,
}

impl ShaderSource {
    fn builtin(name: &'static str, source: &'static str) -> Self {
        Self {
            name,
            path: None,
            source: Cow::Borrowed(source),
        }
    }

    /// Load a shader from the given file path.
    pub fn load(name: &'static str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let source = fs::read_to_string(&path).map_err(|source| PipelineError::ShaderIo {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            name,
            path: Some(path),
            source: Cow::Owned(source),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The file this source was loaded from, `None` for built-ins.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Sources for the two scene programs and the three post-process programs.
#[derive(Clone, Debug)]
pub struct ShaderLibrary {
    scene_color: ShaderSource,
    scene_depth: ShaderSource,
    toonify: ShaderSource,
    outline: ShaderSource,
    combine: ShaderSource,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ShaderLibrary {
    /// The sources shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            scene_color: ShaderSource::builtin(SCENE_COLOR, include_str!("shaders/scene_color.wgsl")),
            scene_depth: ShaderSource::builtin(SCENE_DEPTH, include_str!("shaders/scene_depth.wgsl")),
            toonify: ShaderSource::builtin("toonify", include_str!("shaders/toonify.wgsl")),
            outline: ShaderSource::builtin("outline", include_str!("shaders/outline.wgsl")),
            combine: ShaderSource::builtin("combine", include_str!("shaders/combine.wgsl")),
        }
    }

    /// Built-in sources, overridden by any `<name>.wgsl` found in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(PipelineError::ShaderIo {
                path: dir.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut library = Self::builtin();
        for slot in library.slots_mut() {
            let path = dir.join(format!("{}.wgsl", slot.name));
            if path.is_file() {
                *slot = ShaderSource::load(slot.name, &path)?;
                log::info!("Shader '{}' loaded from {}", slot.name, path.display());
            }
        }
        Ok(library)
    }

    /// Replaces one program's source.
    ///
    /// `name` is one of the five program names; unknown names are ignored
    /// with a warning.
    pub fn with_source(mut self, name: &str, source: impl Into<String>) -> Self {
        match self.slots_mut().into_iter().find(|slot| slot.name == name) {
            Some(slot) => slot.source = Cow::Owned(source.into()),
            None => log::warn!("Ignoring source for unknown shader '{name}'"),
        }
        self
    }

    pub fn scene_color(&self) -> &ShaderSource {
        &self.scene_color
    }

    pub fn scene_depth(&self) -> &ShaderSource {
        &self.scene_depth
    }

    pub fn stage(&self, id: StageId) -> &ShaderSource {
        match id {
            StageId::Toonify => &self.toonify,
            StageId::Outline => &self.outline,
            StageId::Combine => &self.combine,
        }
    }

    fn slots_mut(&mut self) -> [&mut ShaderSource; 5] {
        [
            &mut self.scene_color,
            &mut self.scene_depth,
            &mut self.toonify,
            &mut self.outline,
            &mut self.combine,
        ]
    }

    /// Compiles every program and resolves the post-process binding contracts
    /// without touching the GPU.
    pub fn validate(&self) -> Result<()> {
        for scene in [&self.scene_color, &self.scene_depth] {
            let module = reflect::compile(scene.name, scene.source())?;
            reflect::require_entry_points(scene.name, &module)?;
        }
        for id in StageId::ALL {
            let stage = self.stage(id);
            let module = reflect::compile(stage.name, stage.source())?;
            reflect::require_entry_points(stage.name, &module)?;
            reflect::reflect(stage.name, &module, &id.interface())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_programs_satisfy_their_contracts() {
        ShaderLibrary::builtin().validate().unwrap();
    }

    #[test]
    fn outline_size_uniform_is_resolved() {
        let library = ShaderLibrary::builtin();
        let source = library.stage(StageId::Outline).source();
        let module = reflect::compile("outline", source).unwrap();
        let iface = reflect::reflect("outline", &module, &StageId::Outline.interface()).unwrap();
        assert_eq!(iface.uniforms.len(), 1);
        assert_eq!(iface.uniforms[0].offset, 0);
        assert_eq!(iface.blocks.len(), 1);
    }

    #[test]
    fn combine_units_follow_declaration_order() {
        let library = ShaderLibrary::builtin();
        let module = reflect::compile("combine", library.stage(StageId::Combine).source()).unwrap();
        let iface = reflect::reflect("combine", &module, &StageId::Combine.interface()).unwrap();
        // unit 0 -> u_base_texture, unit 1 -> u_outline_texture
        assert_eq!(iface.textures, vec![0, 1]);
    }

    #[test]
    fn program_without_its_sampler_fails_validation() {
        let broken = ShaderLibrary::builtin()
            .stage(StageId::Toonify)
            .source()
            .replace("u_color_texture", "u_colour_texture");
        let err = ShaderLibrary::builtin()
            .with_source("toonify", broken)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingUniform { ref program, ref name }
                if program == "toonify" && name == "u_color_texture"
        ));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = ShaderLibrary::from_dir("/definitely/not/a/shader/dir").unwrap_err();
        assert!(matches!(err, PipelineError::ShaderIo { .. }));
    }

    #[test]
    fn directory_overrides_only_present_files() {
        let dir = std::env::temp_dir().join(format!("celline-shaders-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let custom = ShaderLibrary::builtin()
            .stage(StageId::Toonify)
            .source()
            .replace("const BANDS: f32 = 4.0;", "const BANDS: f32 = 3.0;");
        fs::write(dir.join("toonify.wgsl"), &custom).unwrap();

        let library = ShaderLibrary::from_dir(&dir).unwrap();
        assert_eq!(library.stage(StageId::Toonify).source(), custom);
        assert!(library.stage(StageId::Toonify).path().is_some());
        assert!(library.stage(StageId::Outline).path().is_none());
        library.validate().unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }
}
