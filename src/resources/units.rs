//! Texture unit binding table

use std::collections::HashMap;

use crate::backend::{
    BackendResult, GraphicsBackend, SamplerDescriptor, SamplerHandle, TextureHandle,
    TextureViewDimension, TextureViewHandle,
};

/// Everything a shader needs to sample a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
    pub dimension: TextureViewDimension,
}

/// Numbered texture units plus the currently active one.
///
/// Textures bound without an explicit unit land on the active unit.
#[derive(Debug, Default)]
pub struct TextureUnits {
    active: u32,
    bound: HashMap<u32, TextureBinding>,
}

impl TextureUnits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn set_active(&mut self, unit: u32) {
        self.active = unit;
    }

    /// Bind `binding` to `unit` (or the active unit), returning what was there
    pub fn bind(&mut self, unit: Option<u32>, binding: TextureBinding) -> Option<TextureBinding> {
        let unit = unit.unwrap_or(self.active);
        self.bound.insert(unit, binding)
    }

    /// Remove every binding of `texture`, returning the units it occupied
    pub fn unbind_texture(&mut self, texture: TextureHandle) -> Vec<u32> {
        let mut units: Vec<u32> = self
            .bound
            .iter()
            .filter(|(_, b)| b.texture == texture)
            .map(|(&unit, _)| unit)
            .collect();
        units.sort_unstable();
        for unit in &units {
            self.bound.remove(unit);
        }
        units
    }

    pub fn get(&self, unit: u32) -> Option<&TextureBinding> {
        self.bound.get(&unit)
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

/// Sampler that is recreated whenever its descriptor changes
#[derive(Debug, Default)]
pub(crate) struct CachedSampler(Option<(SamplerDescriptor, SamplerHandle)>);

impl CachedSampler {
    pub(crate) fn get<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        desc: SamplerDescriptor,
    ) -> BackendResult<SamplerHandle> {
        match self.0.take() {
            Some((current, handle)) if current == desc => {
                self.0 = Some((current, handle));
                Ok(handle)
            }
            previous => {
                if let Some((_, handle)) = previous {
                    backend.destroy_sampler(handle);
                }
                let handle = backend.create_sampler(&desc)?;
                self.0 = Some((desc, handle));
                Ok(handle)
            }
        }
    }

    pub(crate) fn destroy<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some((_, handle)) = self.0.take() {
            backend.destroy_sampler(handle);
        }
    }
}
