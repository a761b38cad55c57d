//! Headless backend that records every call.
//!
//! Used by the CLI for runs without a display and by tests to assert what the
//! guest asked the graphics API to do. Objects are plain integers starting at
//! 1, so they never coincide with guest handles by accident.
//!
//! [`RecordingBackend::new`] keeps every call. [`RecordingBackend::bounded`]
//! keeps only a recent window for long runs; the call and draw counters keep
//! counting either way.

use std::collections::HashMap;

use super::{consts, GraphicsBackend};

/// One recorded graphics call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    ActiveTexture(u32),
    AttachShader { program: u32, shader: u32 },
    BindBuffer { target: u32, buffer: u32 },
    BindTexture { target: u32, texture: u32 },
    BufferData { target: u32, data: Vec<u8>, usage: u32 },
    BufferSubData { target: u32, offset: i32, data: Vec<u8> },
    Clear(u32),
    ClearColor([f32; 4]),
    CompileShader(u32),
    CreateBuffer(u32),
    CreateProgram(u32),
    CreateShader { shader: u32, kind: u32 },
    CreateTexture(u32),
    DeleteShader(u32),
    DisableVertexAttribArray(u32),
    DrawArrays { mode: u32, first: i32, count: i32 },
    DrawElements { mode: u32, count: i32, ty: u32, offset: i32 },
    EnableVertexAttribArray(u32),
    LinkProgram(u32),
    ShaderSource { shader: u32, source: String },
    TexImage2D { target: u32, level: i32, width: i32, height: i32, format: u32, ty: u32, pixels: Option<Vec<u8>> },
    TexParameteri { target: u32, pname: u32, param: i32 },
    Uniform1i { location: Option<u32>, v0: i32 },
    Uniform2f { location: Option<u32>, v: [f32; 2] },
    Uniform3f { location: Option<u32>, v: [f32; 3] },
    UseProgram(u32),
    VertexAttribPointer { index: u32, size: i32, ty: u32, normalized: bool, stride: i32, offset: i32 },
    Viewport { x: i32, y: i32, width: i32, height: i32 },
}

/// Graphics backend that only records.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<GlCall>,
    /// Keep at least this many recent calls and at most twice as many.
    window: Option<usize>,
    total_calls: u64,
    draws: u64,
    next_id: u32,
    /// Attribute and uniform names per program, in lookup order.
    attribs: HashMap<(u32, String), i32>,
    uniforms: HashMap<(u32, String), u32>,
    /// Uniform names reported as inactive.
    inactive_uniforms: Vec<String>,
    deleted_shaders: Vec<u32>,
}

impl RecordingBackend {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder that keeps only the most recent `window` calls.
    pub fn bounded(window: usize) -> Self {
        Self {
            window: Some(window.max(1)),
            ..Self::default()
        }
    }

    /// Make `get_uniform_location` return null for `name`.
    pub fn with_inactive_uniform(mut self, name: impl Into<String>) -> Self {
        self.inactive_uniforms.push(name.into());
        self
    }

    /// Calls still held, oldest first.
    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    /// Take and clear the held calls. Counters are not reset.
    pub fn drain(&mut self) -> Vec<GlCall> {
        std::mem::take(&mut self.calls)
    }

    /// Draw calls made since creation.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    /// Graphics calls made since creation, including any no longer held.
    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    /// Whether a shader was deleted.
    pub fn is_shader_deleted(&self, shader: u32) -> bool {
        self.deleted_shaders.contains(&shader)
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: GlCall) {
        self.total_calls += 1;
        if matches!(call, GlCall::DrawArrays { .. } | GlCall::DrawElements { .. }) {
            self.draws += 1;
        }
        self.record(call);
        if let Some(window) = self.window {
            // Trim in halves so each call is moved at most once
            if self.calls.len() >= window * 2 {
                self.calls.drain(..self.calls.len() - window);
            }
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    type Buffer = u32;
    type Texture = u32;
    type Shader = u32;
    type Program = u32;
    type UniformLocation = u32;

    fn active_texture(&mut self, texture: u32) {
        self.record(GlCall::ActiveTexture(texture));
    }

    fn attach_shader(&mut self, program: &u32, shader: &u32) {
        self.record(GlCall::AttachShader {
            program: *program,
            shader: *shader,
        });
    }

    fn bind_buffer(&mut self, target: u32, buffer: &u32) {
        self.record(GlCall::BindBuffer { target, buffer: *buffer });
    }

    fn bind_texture(&mut self, target: u32, texture: &u32) {
        self.record(GlCall::BindTexture { target, texture: *texture });
    }

    fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32) {
        self.record(GlCall::BufferData {
            target,
            data: data.to_vec(),
            usage,
        });
    }

    fn buffer_sub_data(&mut self, target: u32, offset: i32, data: &[u8]) {
        self.record(GlCall::BufferSubData {
            target,
            offset,
            data: data.to_vec(),
        });
    }

    fn clear(&mut self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }

    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.record(GlCall::ClearColor([red, green, blue, alpha]));
    }

    fn compile_shader(&mut self, shader: &u32) {
        self.record(GlCall::CompileShader(*shader));
    }

    fn create_buffer(&mut self) -> u32 {
        let id = self.next();
        self.record(GlCall::CreateBuffer(id));
        id
    }

    fn create_program(&mut self) -> u32 {
        let id = self.next();
        self.record(GlCall::CreateProgram(id));
        id
    }

    fn create_shader(&mut self, kind: u32) -> u32 {
        let shader = self.next();
        self.record(GlCall::CreateShader { shader, kind });
        shader
    }

    fn create_texture(&mut self) -> u32 {
        let id = self.next();
        self.record(GlCall::CreateTexture(id));
        id
    }

    fn delete_shader(&mut self, shader: &u32) {
        self.deleted_shaders.push(*shader);
        self.record(GlCall::DeleteShader(*shader));
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        self.record(GlCall::DisableVertexAttribArray(index));
    }

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&mut self, mode: u32, count: i32, ty: u32, offset: i32) {
        self.record(GlCall::DrawElements { mode, count, ty, offset });
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn get_attrib_location(&mut self, program: &u32, name: &str) -> i32 {
        let next = self.attribs.keys().filter(|(p, _)| p == program).count() as i32;
        *self.attribs.entry((*program, name.to_string())).or_insert(next)
    }

    fn get_program_parameter(&mut self, _program: &u32, pname: u32) -> i32 {
        i32::from(pname == consts::LINK_STATUS)
    }

    fn get_shader_parameter(&mut self, _shader: &u32, pname: u32) -> i32 {
        i32::from(pname == consts::COMPILE_STATUS)
    }

    fn get_uniform_location(&mut self, program: &u32, name: &str) -> Option<u32> {
        if self.inactive_uniforms.iter().any(|n| n == name) {
            return None;
        }
        let key = (*program, name.to_string());
        if let Some(location) = self.uniforms.get(&key) {
            return Some(*location);
        }
        let location = self.next();
        self.uniforms.insert(key, location);
        Some(location)
    }

    fn link_program(&mut self, program: &u32) {
        self.record(GlCall::LinkProgram(*program));
    }

    fn shader_source(&mut self, shader: &u32, source: &str) {
        self.record(GlCall::ShaderSource {
            shader: *shader,
            source: source.to_string(),
        });
    }

    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        _internal_format: i32,
        width: i32,
        height: i32,
        _border: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record(GlCall::TexImage2D {
            target,
            level,
            width,
            height,
            format,
            ty,
            pixels: pixels.map(<[u8]>::to_vec),
        });
    }

    fn tex_parameteri(&mut self, target: u32, pname: u32, param: i32) {
        self.record(GlCall::TexParameteri { target, pname, param });
    }

    fn uniform1i(&mut self, location: Option<&u32>, v0: i32) {
        self.record(GlCall::Uniform1i {
            location: location.copied(),
            v0,
        });
    }

    fn uniform2f(&mut self, location: Option<&u32>, v0: f32, v1: f32) {
        self.record(GlCall::Uniform2f {
            location: location.copied(),
            v: [v0, v1],
        });
    }

    fn uniform3f(&mut self, location: Option<&u32>, v0: f32, v1: f32, v2: f32) {
        self.record(GlCall::Uniform3f {
            location: location.copied(),
            v: [v0, v1, v2],
        });
    }

    fn use_program(&mut self, program: &u32) {
        self.record(GlCall::UseProgram(*program));
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            ty,
            normalized,
            stride,
            offset,
        });
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport { x, y, width, height });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(backend: &mut RecordingBackend, first: i32) {
        backend.draw_arrays(consts::TRIANGLES, first, 3);
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut backend = RecordingBackend::new();
        for i in 0..100 {
            backend.clear(consts::COLOR_BUFFER_BIT);
            draw(&mut backend, i);
        }
        assert_eq!(backend.calls().len(), 200);
        assert_eq!(backend.total_calls(), 200);
        assert_eq!(backend.draw_count(), 100);
    }

    #[test]
    fn test_bounded_window_stays_small() {
        let mut backend = RecordingBackend::bounded(16);
        for i in 0..10_000 {
            backend.buffer_data(consts::ARRAY_BUFFER, &[0u8; 64], consts::STATIC_DRAW);
            draw(&mut backend, i);
            assert!(backend.calls().len() < 32);
        }
        assert!(backend.calls().len() >= 16);
        assert_eq!(backend.total_calls(), 20_000);
        assert_eq!(backend.draw_count(), 10_000);

        // Newest call is always held
        assert_eq!(
            backend.calls().last(),
            Some(&GlCall::DrawArrays {
                mode: consts::TRIANGLES,
                first: 9_999,
                count: 3
            })
        );
    }

    #[test]
    fn test_drain_keeps_counters() {
        let mut backend = RecordingBackend::new();
        draw(&mut backend, 0);
        backend.viewport(0, 0, 10, 10);
        assert_eq!(backend.drain().len(), 2);
        assert!(backend.calls().is_empty());
        assert_eq!(backend.total_calls(), 2);
        assert_eq!(backend.draw_count(), 1);
    }
}
