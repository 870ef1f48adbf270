//! Texture loading and management

use crate::backend::{
    FilterMode, GpuResource, GraphicsBackend, ReleaseQueue, TextureDescriptor, TextureFormat, TextureHandle,
};
use crate::base::{GlBase, ObjectIdentity};
use crate::error::{SceneError, SceneResult};
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Loaded texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SceneResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| SceneError::TextureLoad(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from encoded bytes (PNG, JPEG, ...)
    pub fn from_bytes(bytes: &[u8], name: &str) -> SceneResult<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| SceneError::TextureLoad(format!("{}: {}", name, e)))?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let data = img.to_rgba8().into_raw();

        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Create a checkerboard texture with 8x8 texel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: "checkerboard".to_string(),
        }
    }
}

/// A texture that uploads itself on first bind.
///
/// Texel data stays on the CPU until a node binds the texture; a failed
/// upload is logged once and the texture then stays unbindable. Dropping
/// an uploaded texture queues its handle on the attached [`ReleaseQueue`].
pub struct Texture {
    identity: ObjectIdentity,
    data: TextureData,
    filter: FilterMode,
    handle: Option<TextureHandle>,
    upload_failed: bool,
    release_queue: Option<ReleaseQueue>,
}

impl Texture {
    pub fn new(data: TextureData) -> Self {
        Self {
            identity: ObjectIdentity::next(),
            data,
            filter: FilterMode::Linear,
            handle: None,
            upload_failed: false,
            release_queue: None,
        }
    }

    /// Load from an image file. Failures are logged and yield `None`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Option<Self> {
        match TextureData::from_file(path) {
            Ok(data) => Some(Self::new(data)),
            Err(e) => {
                log::error!("Texture: {}", e);
                None
            }
        }
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn size(&self) -> (u32, u32) {
        (self.data.width, self.data.height)
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn is_uploaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Attach the queue that receives the handle on drop, unless one is
    /// already attached
    pub fn attach_release_queue(&mut self, queue: &ReleaseQueue) {
        if self.release_queue.is_none() {
            self.release_queue = Some(queue.clone());
        }
    }

    /// Create the GPU texture if it does not exist yet
    pub fn upload(&mut self, backend: &mut dyn GraphicsBackend) -> Option<TextureHandle> {
        if self.handle.is_none() && !self.upload_failed {
            let desc = TextureDescriptor {
                label: Some(self.data.name.clone()),
                width: self.data.width,
                height: self.data.height,
                format: self.data.format,
                filter: self.filter,
                ..Default::default()
            };
            match backend.create_texture(&desc, &self.data.data) {
                Ok(handle) => self.handle = Some(handle),
                Err(e) => {
                    log::error!("Texture '{}': upload failed: {}", self.data.name, e);
                    self.upload_failed = true;
                }
            }
        }
        self.handle
    }

    /// Bind to `unit`, uploading first if needed. Returns whether a texture
    /// was actually bound.
    pub fn bind(&mut self, backend: &mut dyn GraphicsBackend, unit: u32) -> bool {
        match self.upload(backend) {
            Some(handle) => {
                backend.bind_texture(unit, handle);
                true
            }
            None => false,
        }
    }

    pub fn unbind(&self, backend: &mut dyn GraphicsBackend, unit: u32) {
        backend.unbind_texture(unit);
    }

    /// Destroy the GPU texture; it is re-uploaded on the next bind
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(handle) = self.handle.take() {
            backend.destroy_texture(handle);
        }
        self.upload_failed = false;
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match &self.release_queue {
            Some(queue) => queue.push(GpuResource::Texture(handle)),
            None => log::warn!("Texture '{}': dropped while uploaded", self.data.name),
        }
    }
}

impl GlBase for Texture {
    fn identity(&self) -> ObjectIdentity {
        self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn test_checkerboard_size() {
        let data = TextureData::checkerboard(16, [255; 4], [0, 0, 0, 255]);
        assert_eq!(data.data.len(), 16 * 16 * 4);
        assert_eq!(&data.data[0..4], &[255; 4]);
        // x = 8 starts the second cell
        assert_eq!(&data.data[32..36], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_lazy_upload() {
        let mut backend = HeadlessBackend::default();
        let mut texture = Texture::new(TextureData::white());
        assert!(!texture.is_uploaded());

        assert!(texture.bind(&mut backend, 0));
        assert!(texture.is_uploaded());
        assert_eq!(backend.live_textures(), 1);

        // second bind does not upload again
        assert!(texture.bind(&mut backend, 0));
        assert_eq!(backend.live_textures(), 1);

        texture.release(&mut backend);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_bad_data_is_not_bound() {
        let mut backend = HeadlessBackend::default();
        let mut data = TextureData::white();
        data.data.clear();
        let mut texture = Texture::new(data);

        assert!(!texture.bind(&mut backend, 0));
        assert_eq!(backend.stats().texture_binds, 0);
    }

    #[test]
    fn test_drop_queues_handle() {
        let mut backend = HeadlessBackend::default();
        let queue = ReleaseQueue::new();
        let mut texture = Texture::new(TextureData::white());
        texture.attach_release_queue(&queue);
        texture.upload(&mut backend);
        assert_eq!(backend.live_textures(), 1);

        drop(texture);
        assert_eq!(queue.len(), 1);
        queue.drain(&mut backend);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_missing_file() {
        assert!(Texture::from_file("/nonexistent/texture.png").is_none());
    }
}
