//! Host graphics API seam.
//!
//! The bridge does not rasterize anything itself. [`GraphicsBackend`] is the
//! immediate-mode API it forwards to, shaped after WebGL 1: create/bind/delete
//! objects, upload data, compile/link programs, issue draws. Object types are
//! associated types so a backend can use native GL names, `wgpu` resources or,
//! as [`RecordingBackend`] does, plain integers.

mod recording;

pub use recording::{GlCall, RecordingBackend};

use std::fmt;

use crate::error::{BridgeError, Result};
use crate::handles::{Handle, HandleTable};

/// GL enum values the bridge itself needs to interpret.
pub mod consts {
    pub const ARRAY_BUFFER: u32 = 0x8892;
    pub const ELEMENT_ARRAY_BUFFER: u32 = 0x8893;
    pub const STATIC_DRAW: u32 = 0x88E4;
    pub const DYNAMIC_DRAW: u32 = 0x88E8;

    pub const TEXTURE_2D: u32 = 0x0DE1;
    pub const TEXTURE0: u32 = 0x84C0;

    pub const FRAGMENT_SHADER: u32 = 0x8B30;
    pub const VERTEX_SHADER: u32 = 0x8B31;
    pub const COMPILE_STATUS: u32 = 0x8B81;
    pub const LINK_STATUS: u32 = 0x8B82;

    pub const COLOR_BUFFER_BIT: u32 = 0x4000;
    pub const TRIANGLES: u32 = 0x0004;

    pub const UNSIGNED_BYTE: u32 = 0x1401;
    pub const UNSIGNED_SHORT: u32 = 0x1403;
    pub const UNSIGNED_INT: u32 = 0x1405;
    pub const FLOAT: u32 = 0x1406;
    pub const UNSIGNED_SHORT_4_4_4_4: u32 = 0x8033;
    pub const UNSIGNED_SHORT_5_5_5_1: u32 = 0x8034;
    pub const UNSIGNED_SHORT_5_6_5: u32 = 0x8363;

    pub const ALPHA: u32 = 0x1906;
    pub const RGB: u32 = 0x1907;
    pub const RGBA: u32 = 0x1908;
    pub const LUMINANCE: u32 = 0x1909;
    pub const LUMINANCE_ALPHA: u32 = 0x190A;

    /// Default `UNPACK_ALIGNMENT`.
    pub const UNPACK_ALIGNMENT: u32 = 4;
}

/// Immediate-mode graphics API the dispatch shim forwards to.
pub trait GraphicsBackend {
    /// Buffer object
    type Buffer;
    /// Texture object
    type Texture;
    /// Shader object
    type Shader;
    /// Program object
    type Program;
    /// Uniform location inside a linked program
    type UniformLocation;

    fn active_texture(&mut self, texture: u32);
    fn attach_shader(&mut self, program: &Self::Program, shader: &Self::Shader);
    fn bind_buffer(&mut self, target: u32, buffer: &Self::Buffer);
    fn bind_texture(&mut self, target: u32, texture: &Self::Texture);
    fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32);
    fn buffer_sub_data(&mut self, target: u32, offset: i32, data: &[u8]);
    fn clear(&mut self, mask: u32);
    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32);
    fn compile_shader(&mut self, shader: &Self::Shader);
    fn create_buffer(&mut self) -> Self::Buffer;
    fn create_program(&mut self) -> Self::Program;
    fn create_shader(&mut self, kind: u32) -> Self::Shader;
    fn create_texture(&mut self) -> Self::Texture;
    fn delete_shader(&mut self, shader: &Self::Shader);
    fn disable_vertex_attrib_array(&mut self, index: u32);
    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32);
    fn draw_elements(&mut self, mode: u32, count: i32, ty: u32, offset: i32);
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn get_attrib_location(&mut self, program: &Self::Program, name: &str) -> i32;
    fn get_program_parameter(&mut self, program: &Self::Program, pname: u32) -> i32;
    fn get_shader_parameter(&mut self, shader: &Self::Shader, pname: u32) -> i32;
    fn get_uniform_location(
        &mut self,
        program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    fn link_program(&mut self, program: &Self::Program);
    fn shader_source(&mut self, shader: &Self::Shader, source: &str);
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    fn tex_parameteri(&mut self, target: u32, pname: u32, param: i32);
    fn uniform1i(&mut self, location: Option<&Self::UniformLocation>, v0: i32);
    fn uniform2f(&mut self, location: Option<&Self::UniformLocation>, v0: f32, v1: f32);
    fn uniform3f(&mut self, location: Option<&Self::UniformLocation>, v0: f32, v1: f32, v2: f32);
    fn use_program(&mut self, program: &Self::Program);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
}

/// Kind tag for objects in the handle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Texture,
    Shader,
    Program,
    UniformLocation,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::Shader => "shader",
            Self::Program => "program",
            Self::UniformLocation => "uniform location",
        };
        f.write_str(name)
    }
}

/// A host object registered in the handle table.
pub enum GlObject<B: GraphicsBackend> {
    Buffer(B::Buffer),
    Texture(B::Texture),
    Shader(B::Shader),
    Program(B::Program),
    /// `None` when the program has no active uniform of that name.
    UniformLocation(Option<B::UniformLocation>),
}

impl<B: GraphicsBackend> GlObject<B> {
    /// Kind tag of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Buffer(_) => ObjectKind::Buffer,
            Self::Texture(_) => ObjectKind::Texture,
            Self::Shader(_) => ObjectKind::Shader,
            Self::Program(_) => ObjectKind::Program,
            Self::UniformLocation(_) => ObjectKind::UniformLocation,
        }
    }
}

/// Handle table holding the guest's graphics objects.
pub struct ObjectTable<B: GraphicsBackend> {
    table: HandleTable<GlObject<B>>,
    soft_limit: usize,
    warned: bool,
}

macro_rules! typed_resolve {
    ($name:ident, $variant:ident, $ty:ident) => {
        #[doc = concat!("Resolve a handle that must name a ", stringify!($name), ".")]
        pub fn $name(&self, handle: Handle) -> Result<&B::$ty> {
            match self.table.resolve(handle)? {
                GlObject::$variant(object) => Ok(object),
                other => Err(BridgeError::WrongHandleKind {
                    handle,
                    expected: ObjectKind::$variant,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl<B: GraphicsBackend> ObjectTable<B> {
    /// Create an empty table that warns once after `soft_limit` handles.
    pub fn new(soft_limit: usize) -> Self {
        Self {
            table: HandleTable::new(),
            soft_limit,
            warned: false,
        }
    }

    /// Register an object and hand out its handle.
    pub fn create(&mut self, object: GlObject<B>) -> Result<Handle> {
        let kind = object.kind();
        let handle = self.table.create(object)?;
        tracing::trace!(handle, %kind, "handle issued");
        if !self.warned && self.table.len() > self.soft_limit {
            self.warned = true;
            tracing::warn!(
                issued = self.table.len(),
                dead = self.table.dead_count(),
                "handle table passed its soft limit; handles are never recycled"
            );
        }
        Ok(handle)
    }

    /// Resolve a handle of any kind.
    pub fn resolve(&self, handle: Handle) -> Result<&GlObject<B>> {
        self.table.resolve(handle)
    }

    typed_resolve!(buffer, Buffer, Buffer);
    typed_resolve!(texture, Texture, Texture);
    typed_resolve!(shader, Shader, Shader);
    typed_resolve!(program, Program, Program);

    /// Resolve a uniform location handle; the location itself may be null.
    pub fn uniform_location(&self, handle: Handle) -> Result<Option<&B::UniformLocation>> {
        match self.table.resolve(handle)? {
            GlObject::UniformLocation(location) => Ok(location.as_ref()),
            other => Err(BridgeError::WrongHandleKind {
                handle,
                expected: ObjectKind::UniformLocation,
                found: other.kind(),
            }),
        }
    }

    /// Mark the object behind `handle` deleted.
    pub fn retire(&mut self, handle: Handle) -> Result<()> {
        self.table.retire(handle)
    }

    /// Handles issued so far.
    pub fn issued(&self) -> usize {
        self.table.len()
    }

    /// Handles whose object was deleted.
    pub fn dead(&self) -> usize {
        self.table.dead_count()
    }
}

/// Number of bytes `glTexImage2D` reads for a `width`×`height` upload.
///
/// Rows are padded to `alignment` bytes, except the last one.
pub fn pixel_upload_len(width: u32, height: u32, format: u32, ty: u32, alignment: u32) -> Result<u32> {
    use consts::*;

    let unsupported = BridgeError::UnsupportedPixelFormat { format, ty };
    let channels: u64 = match format {
        ALPHA | LUMINANCE => 1,
        LUMINANCE_ALPHA => 2,
        RGB => 3,
        RGBA => 4,
        _ => return Err(unsupported),
    };
    let bytes_per_pixel = match ty {
        UNSIGNED_BYTE => channels,
        FLOAT => channels * 4,
        UNSIGNED_SHORT_5_6_5 if format == RGB => 2,
        UNSIGNED_SHORT_4_4_4_4 | UNSIGNED_SHORT_5_5_5_1 if format == RGBA => 2,
        _ => return Err(unsupported),
    };
    if width == 0 || height == 0 {
        return Ok(0);
    }

    let align = u64::from(alignment.max(1));
    let row = u64::from(width) * bytes_per_pixel;
    let stride = row.div_ceil(align) * align;
    let total = stride * u64::from(height - 1) + row;
    u32::try_from(total).map_err(|_| BridgeError::OutOfBounds {
        offset: 0,
        len: total,
        arena_len: u32::MAX as usize,
    })
}
