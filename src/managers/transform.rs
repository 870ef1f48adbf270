//! Matrix stack and transform state

use crate::backend::GraphicsBackend;
use crate::error::{SceneError, SceneResult};
use crate::shaders::uniforms;
use glam::{Mat4, Vec3};

/// A current matrix plus a bounded stack of saved matrices.
///
/// Operations right-multiply the current matrix, so a translate followed by
/// a rotate rotates in the translated frame.
#[derive(Debug, Clone)]
pub struct MatrixStack {
    name: &'static str,
    current: Mat4,
    saved: Vec<Mat4>,
    limit: usize,
}

impl MatrixStack {
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            current: Mat4::IDENTITY,
            saved: Vec::new(),
            limit,
        }
    }

    /// Save the current matrix.
    pub fn push(&mut self) -> SceneResult<()> {
        if self.saved.len() >= self.limit {
            return Err(SceneError::MatrixStackOverflow {
                depth: self.saved.len(),
            });
        }
        self.saved.push(self.current);
        Ok(())
    }

    /// Restore the most recently saved matrix. Popping an empty stack is a
    /// contract violation and leaves the current matrix untouched.
    pub fn pop(&mut self) -> SceneResult<()> {
        self.current = self
            .saved
            .pop()
            .ok_or(SceneError::MatrixStackUnderflow { stack: self.name })?;
        Ok(())
    }

    /// Number of saved matrices
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn current(&self) -> Mat4 {
        self.current
    }

    pub fn set(&mut self, matrix: Mat4) {
        self.current = matrix;
    }

    pub fn load_identity(&mut self) {
        self.current = Mat4::IDENTITY;
    }

    pub fn multiply(&mut self, matrix: Mat4) {
        self.current *= matrix;
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.multiply(Mat4::from_translation(offset));
    }

    /// Rotate by `angle` radians around `axis`. A zero axis is ignored.
    pub fn rotate(&mut self, axis: Vec3, angle: f32) {
        if let Some(axis) = axis.try_normalize() {
            self.multiply(Mat4::from_axis_angle(axis, angle));
        }
    }

    pub fn scale(&mut self, factor: Vec3) {
        self.multiply(Mat4::from_scale(factor));
    }
}

/// Model matrix stack plus the camera matrices.
pub struct TransformManager {
    model: MatrixStack,
    view: Mat4,
    projection: Mat4,
    model_matrix_enabled: bool,
    saved_model_matrix_enabled: Option<bool>,
}

impl TransformManager {
    pub fn new(stack_limit: usize) -> Self {
        Self {
            model: MatrixStack::new("model", stack_limit),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            model_matrix_enabled: true,
            saved_model_matrix_enabled: None,
        }
    }

    pub fn push(&mut self) -> SceneResult<()> {
        self.model.push()
    }

    pub fn pop(&mut self) -> SceneResult<()> {
        self.model.pop()
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.model.translate(offset);
    }

    pub fn rotate(&mut self, axis: Vec3, angle: f32) {
        self.model.rotate(axis, angle);
    }

    pub fn scale(&mut self, factor: Vec3) {
        self.model.scale(factor);
    }

    pub fn load_identity(&mut self) {
        self.model.load_identity();
    }

    pub fn depth(&self) -> usize {
        self.model.depth()
    }

    pub fn model_stack(&self) -> &MatrixStack {
        &self.model
    }

    pub fn model_stack_mut(&mut self) -> &mut MatrixStack {
        &mut self.model
    }

    /// Matrix that will be uploaded as the model matrix: the top of the
    /// stack, or identity while model-matrix mode is disabled.
    pub fn model_matrix(&self) -> Mat4 {
        if self.model_matrix_enabled {
            self.model.current()
        } else {
            Mat4::IDENTITY
        }
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    pub fn is_model_matrix_enabled(&self) -> bool {
        self.model_matrix_enabled
    }

    pub fn enable_model_matrix(&mut self, enabled: bool) {
        self.model_matrix_enabled = enabled;
    }

    /// Single-slot snapshot of the model-matrix mode.
    pub fn save_model_matrix_mode(&mut self) {
        self.saved_model_matrix_enabled = Some(self.model_matrix_enabled);
    }

    pub fn restore_model_matrix_mode(&mut self) {
        match self.saved_model_matrix_enabled {
            Some(enabled) => self.model_matrix_enabled = enabled,
            None => log::warn!("TransformManager: restore of model-matrix mode without a save"),
        }
    }

    /// Upload the model matrix to the current program
    pub fn apply_model(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_uniform(uniforms::MODEL_MATRIX, self.model_matrix().into());
    }

    /// Upload model, view and projection matrices to the current program
    pub fn apply(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_uniform(uniforms::VIEW_MATRIX, self.view.into());
        backend.set_uniform(uniforms::PROJECTION_MATRIX, self.projection.into());
        self.apply_model(backend);
    }
}

impl Default for TransformManager {
    fn default() -> Self {
        Self::new(64)
    }
}
