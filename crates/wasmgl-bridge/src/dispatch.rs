//! Bridge functions behind the guest's `env` imports.
//!
//! One function per import, independent of the WebAssembly engine: each takes
//! a [`GuestEnv`] and the raw wire arguments. Handles are resolved before any
//! backend call, so a bad handle leaves the backend untouched. Memory is
//! viewed only after every guest re-entry (`strlen`, `malloc`) the call needs
//! has returned.

use crate::error::{BridgeError, Result};
use crate::gl::{consts, pixel_upload_len, GlObject, GraphicsBackend};
use crate::guest::GuestEnv;
use crate::handles::Handle;
use crate::memory::{guest_len, guest_ptr, view};
use crate::scheduler::TimerToken;
use crate::strings::{decode_cstring, decode_fixed};
use crate::format::format_guest;

/// `glActiveTexture`: select the texture unit (`TEXTURE0 + n`).
pub fn gl_active_texture<E: GuestEnv>(env: &mut E, texture: u32) -> Result<()> {
    env.context().backend.active_texture(texture);
    Ok(())
}

/// `glAttachShader`: both handles must resolve before the backend sees either.
pub fn gl_attach_shader<E: GuestEnv>(env: &mut E, program: Handle, shader: Handle) -> Result<()> {
    let ctx = env.context();
    let program = ctx.objects.program(program)?;
    let shader = ctx.objects.shader(shader)?;
    ctx.backend.attach_shader(program, shader);
    Ok(())
}

/// `glBindBuffer`: `buffer` is a guest handle from `glCreateBuffer`.
pub fn gl_bind_buffer<E: GuestEnv>(env: &mut E, target: u32, buffer: Handle) -> Result<()> {
    let ctx = env.context();
    let buffer = ctx.objects.buffer(buffer)?;
    ctx.backend.bind_buffer(target, buffer);
    Ok(())
}

/// `glBindTexture`: `texture` is a guest handle from `glCreateTexture`.
pub fn gl_bind_texture<E: GuestEnv>(env: &mut E, target: u32, texture: Handle) -> Result<()> {
    let ctx = env.context();
    let texture = ctx.objects.texture(texture)?;
    ctx.backend.bind_texture(target, texture);
    Ok(())
}

/// `glBufferData`: copy `size` bytes at guest address `data` into the bound buffer.
pub fn gl_buffer_data<E: GuestEnv>(env: &mut E, target: u32, size: i32, data: i32, usage: u32) -> Result<()> {
    let len = guest_len(size)?;
    let (arena, ctx) = env.split()?;
    let bytes = view(arena, guest_ptr(data), len)?.bytes();
    ctx.backend.buffer_data(target, bytes, usage);
    Ok(())
}

/// `glBufferSubData`: `offset` is a byte offset into the bound buffer, not a
/// guest address; `size` bytes are read from guest address `data`.
pub fn gl_buffer_sub_data<E: GuestEnv>(env: &mut E, target: u32, offset: i32, size: i32, data: i32) -> Result<()> {
    let len = guest_len(size)?;
    let (arena, ctx) = env.split()?;
    let bytes = view(arena, guest_ptr(data), len)?.bytes();
    ctx.backend.buffer_sub_data(target, offset, bytes);
    Ok(())
}

/// `glClear` with a `*_BUFFER_BIT` mask.
pub fn gl_clear<E: GuestEnv>(env: &mut E, mask: u32) -> Result<()> {
    env.context().backend.clear(mask);
    Ok(())
}

pub fn gl_clear_color<E: GuestEnv>(env: &mut E, red: f32, green: f32, blue: f32, alpha: f32) -> Result<()> {
    env.context().backend.clear_color(red, green, blue, alpha);
    Ok(())
}

pub fn gl_compile_shader<E: GuestEnv>(env: &mut E, shader: Handle) -> Result<()> {
    let ctx = env.context();
    let shader = ctx.objects.shader(shader)?;
    ctx.backend.compile_shader(shader);
    Ok(())
}

/// `glCreateBuffer`: returns a new guest handle for the backend buffer.
pub fn gl_create_buffer<E: GuestEnv>(env: &mut E) -> Result<Handle> {
    let ctx = env.context();
    let buffer = ctx.backend.create_buffer();
    ctx.objects.create(GlObject::Buffer(buffer))
}

/// `glCreateProgram`: returns a new guest handle.
pub fn gl_create_program<E: GuestEnv>(env: &mut E) -> Result<Handle> {
    let ctx = env.context();
    let program = ctx.backend.create_program();
    ctx.objects.create(GlObject::Program(program))
}

/// `glCreateShader`: `kind` is `VERTEX_SHADER` or `FRAGMENT_SHADER`.
pub fn gl_create_shader<E: GuestEnv>(env: &mut E, kind: u32) -> Result<Handle> {
    let ctx = env.context();
    let shader = ctx.backend.create_shader(kind);
    ctx.objects.create(GlObject::Shader(shader))
}

/// `glCreateTexture`: returns a new guest handle.
pub fn gl_create_texture<E: GuestEnv>(env: &mut E) -> Result<Handle> {
    let ctx = env.context();
    let texture = ctx.backend.create_texture();
    ctx.objects.create(GlObject::Texture(texture))
}

/// Delete the shader object. Its handle stays resolvable but is counted dead.
pub fn gl_delete_shader<E: GuestEnv>(env: &mut E, shader: Handle) -> Result<()> {
    let ctx = env.context();
    let object = ctx.objects.shader(shader)?;
    ctx.backend.delete_shader(object);
    ctx.objects.retire(shader)
}

pub fn gl_disable_vertex_attrib_array<E: GuestEnv>(env: &mut E, index: u32) -> Result<()> {
    env.context().backend.disable_vertex_attrib_array(index);
    Ok(())
}

pub fn gl_draw_arrays<E: GuestEnv>(env: &mut E, mode: u32, first: i32, count: i32) -> Result<()> {
    env.context().backend.draw_arrays(mode, first, count);
    Ok(())
}

/// `glDrawElements`: `offset` is a byte offset into the bound element buffer.
pub fn gl_draw_elements<E: GuestEnv>(env: &mut E, mode: u32, count: i32, ty: u32, offset: i32) -> Result<()> {
    env.context().backend.draw_elements(mode, count, ty, offset);
    Ok(())
}

pub fn gl_enable_vertex_attrib_array<E: GuestEnv>(env: &mut E, index: u32) -> Result<()> {
    env.context().backend.enable_vertex_attrib_array(index);
    Ok(())
}

/// `glGetAttribLocation`: `name` is a NUL-terminated guest string. Returns
/// the raw attribute index (`-1` when absent), not a handle.
pub fn gl_get_attrib_location<E: GuestEnv>(env: &mut E, program: Handle, name: i32) -> Result<i32> {
    env.context().objects.program(program)?;
    let name = decode_cstring(env, guest_ptr(name))?;
    let ctx = env.context();
    let program = ctx.objects.program(program)?;
    Ok(ctx.backend.get_attrib_location(program, &name))
}

/// `glGetProgramParameter`: booleans come back as `0`/`1`.
pub fn gl_get_program_parameter<E: GuestEnv>(env: &mut E, program: Handle, pname: u32) -> Result<i32> {
    let ctx = env.context();
    let program = ctx.objects.program(program)?;
    Ok(ctx.backend.get_program_parameter(program, pname))
}

/// `glGetShaderParameter`: booleans come back as `0`/`1`.
pub fn gl_get_shader_parameter<E: GuestEnv>(env: &mut E, shader: Handle, pname: u32) -> Result<i32> {
    let ctx = env.context();
    let shader = ctx.objects.shader(shader)?;
    Ok(ctx.backend.get_shader_parameter(shader, pname))
}

/// Look up a uniform. A handle is issued even when the program has no such
/// uniform; setting it is then a no-op in the backend.
pub fn gl_get_uniform_location<E: GuestEnv>(env: &mut E, program: Handle, name: i32) -> Result<Handle> {
    env.context().objects.program(program)?;
    let name = decode_cstring(env, guest_ptr(name))?;
    let ctx = env.context();
    let location = {
        let program = ctx.objects.program(program)?;
        ctx.backend.get_uniform_location(program, &name)
    };
    if location.is_none() {
        tracing::debug!(program, %name, "uniform not active");
    }
    ctx.objects.create(GlObject::UniformLocation(location))
}

pub fn gl_link_program<E: GuestEnv>(env: &mut E, program: Handle) -> Result<()> {
    let ctx = env.context();
    let program = ctx.objects.program(program)?;
    ctx.backend.link_program(program);
    Ok(())
}

/// Concatenate `count` guest strings into one shader source.
///
/// With `lengths == 0` every string is NUL-terminated. Otherwise `lengths`
/// points at `count` `i32`s; a negative entry marks that string as
/// NUL-terminated.
pub fn gl_shader_source<E: GuestEnv>(env: &mut E, shader: Handle, count: i32, strings: i32, lengths: i32) -> Result<()> {
    env.context().objects.shader(shader)?;
    let count = guest_len(count)?;
    let table_len = count.checked_mul(4).ok_or(BridgeError::InvalidLength(count as i32))?;

    let (pointers, explicit) = {
        let arena = env.arena()?;
        let table = view(arena, guest_ptr(strings), table_len)?;
        let pointers = (0..count as usize)
            .map(|i| table.read_u32(i * 4))
            .collect::<Result<Vec<_>>>()?;
        let explicit = if lengths == 0 {
            None
        } else {
            let table = view(arena, guest_ptr(lengths), table_len)?;
            Some(
                (0..count as usize)
                    .map(|i| table.read_i32(i * 4))
                    .collect::<Result<Vec<_>>>()?,
            )
        };
        (pointers, explicit)
    };

    let mut source = String::new();
    for (i, &ptr) in pointers.iter().enumerate() {
        let len = match explicit.as_ref().map(|lens| lens[i]) {
            Some(len) if len >= 0 => len as u32,
            _ => env.strlen(ptr)?,
        };
        source.push_str(&decode_fixed(env.arena()?, ptr, len)?);
    }
    tracing::debug!(shader, pieces = count, bytes = source.len(), "shader source");

    let ctx = env.context();
    let shader = ctx.objects.shader(shader)?;
    ctx.backend.shader_source(shader, &source);
    Ok(())
}

/// Upload a 2D texture image. `pixels == 0` allocates without data.
#[allow(clippy::too_many_arguments)]
pub fn gl_tex_image_2d<E: GuestEnv>(
    env: &mut E,
    target: u32,
    level: i32,
    internal_format: i32,
    width: i32,
    height: i32,
    border: i32,
    format: u32,
    ty: u32,
    pixels: i32,
) -> Result<()> {
    let len = pixel_upload_len(
        guest_len(width)?,
        guest_len(height)?,
        format,
        ty,
        consts::UNPACK_ALIGNMENT,
    )?;
    let (arena, ctx) = env.split()?;
    let data = match pixels {
        0 => None,
        ptr => Some(view(arena, guest_ptr(ptr), len)?.bytes()),
    };
    tracing::debug!(width, height, format, ty, bytes = len, "tex image");
    ctx.backend
        .tex_image_2d(target, level, internal_format, width, height, border, format, ty, data);
    Ok(())
}

pub fn gl_tex_parameteri<E: GuestEnv>(env: &mut E, target: u32, pname: u32, param: i32) -> Result<()> {
    env.context().backend.tex_parameteri(target, pname, param);
    Ok(())
}

/// `glUniform1i`: `location` is a handle from `glGetUniformLocation`.
pub fn gl_uniform1i<E: GuestEnv>(env: &mut E, location: Handle, v0: i32) -> Result<()> {
    let ctx = env.context();
    let location = ctx.objects.uniform_location(location)?;
    ctx.backend.uniform1i(location, v0);
    Ok(())
}

pub fn gl_uniform2f<E: GuestEnv>(env: &mut E, location: Handle, v0: f32, v1: f32) -> Result<()> {
    let ctx = env.context();
    let location = ctx.objects.uniform_location(location)?;
    ctx.backend.uniform2f(location, v0, v1);
    Ok(())
}

pub fn gl_uniform3f<E: GuestEnv>(env: &mut E, location: Handle, v0: f32, v1: f32, v2: f32) -> Result<()> {
    let ctx = env.context();
    let location = ctx.objects.uniform_location(location)?;
    ctx.backend.uniform3f(location, v0, v1, v2);
    Ok(())
}

pub fn gl_use_program<E: GuestEnv>(env: &mut E, program: Handle) -> Result<()> {
    let ctx = env.context();
    let program = ctx.objects.program(program)?;
    ctx.backend.use_program(program);
    Ok(())
}

/// `glVertexAttribPointer`: any nonzero `normalized` means true; `offset` is a
/// byte offset into the bound array buffer.
#[allow(clippy::too_many_arguments)]
pub fn gl_vertex_attrib_pointer<E: GuestEnv>(
    env: &mut E,
    index: u32,
    size: i32,
    ty: u32,
    normalized: i32,
    stride: i32,
    offset: i32,
) -> Result<()> {
    env.context()
        .backend
        .vertex_attrib_pointer(index, size, ty, normalized != 0, stride, offset);
    Ok(())
}

/// `glViewport`, forwarded as is.
pub fn gl_viewport<E: GuestEnv>(env: &mut E, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
    env.context().backend.viewport(x, y, width, height);
    Ok(())
}

/// Start calling `call(func, arg)` every `delay_ms`, raised to the configured
/// minimum interval. Returns a positive token for `clear_interval`.
pub fn set_interval<E: GuestEnv>(env: &mut E, func: i32, delay_ms: i32, arg: i32) -> Result<TimerToken> {
    Ok(env.context().set_interval(func, delay_ms, arg))
}

/// Cancel an interval. Unknown or already cleared tokens are ignored.
pub fn clear_interval<E: GuestEnv>(env: &mut E, token: TimerToken) -> Result<()> {
    env.context().clear_interval(token);
    Ok(())
}

/// Milliseconds on the session clock since boot, with sub-millisecond precision.
pub fn time_precise_ms<E: GuestEnv>(env: &mut E) -> Result<f64> {
    Ok(env.context().time_precise_ms())
}

/// Print `len` bytes at `ptr` as one console line.
pub fn print_slice<E: GuestEnv>(env: &mut E, ptr: i32, len: i32) -> Result<()> {
    let len = guest_len(len)?;
    let (arena, ctx) = env.split()?;
    let line = decode_fixed(arena, guest_ptr(ptr), len)?;
    ctx.console.push(line);
    Ok(())
}

/// Format and print one console line.
pub fn printf<E: GuestEnv>(env: &mut E, fmt: i32, args: i32) -> Result<()> {
    let (arena, ctx) = env.split()?;
    let line = format_guest(arena, guest_ptr(fmt), guest_ptr(args))?;
    ctx.console.push(line);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::consts::*;
    use crate::gl::GlCall;
    use crate::testing::VecGuest;
    use std::time::Duration;

    fn calls(guest: &VecGuest) -> &[GlCall] {
        guest.ctx.backend().calls()
    }

    #[test]
    fn test_buffer_upload_reads_guest_bytes() {
        let mut guest = VecGuest::new(1024);
        guest.poke(64, &[1, 2, 3, 4, 5, 6]);
        let buffer = gl_create_buffer(&mut guest).unwrap();
        assert_eq!(buffer, 0);
        gl_bind_buffer(&mut guest, ARRAY_BUFFER, buffer).unwrap();
        gl_buffer_data(&mut guest, ARRAY_BUFFER, 6, 64, STATIC_DRAW).unwrap();
        gl_buffer_sub_data(&mut guest, ARRAY_BUFFER, 2, 2, 66).unwrap();

        assert_eq!(
            calls(&guest),
            &[
                GlCall::CreateBuffer(1),
                GlCall::BindBuffer {
                    target: ARRAY_BUFFER,
                    buffer: 1
                },
                GlCall::BufferData {
                    target: ARRAY_BUFFER,
                    data: vec![1, 2, 3, 4, 5, 6],
                    usage: STATIC_DRAW
                },
                GlCall::BufferSubData {
                    target: ARRAY_BUFFER,
                    offset: 2,
                    data: vec![3, 4]
                },
            ]
        );
    }

    #[test]
    fn test_invalid_handle_has_no_backend_effect() {
        let mut guest = VecGuest::new(256);
        let err = gl_use_program(&mut guest, 3).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidHandle(3)));
        assert!(matches!(
            gl_bind_buffer(&mut guest, ARRAY_BUFFER, -1),
            Err(BridgeError::InvalidHandle(-1))
        ));
        assert!(calls(&guest).is_empty());
    }

    #[test]
    fn test_wrong_kind_has_no_backend_effect() {
        let mut guest = VecGuest::new(256);
        let shader = gl_create_shader(&mut guest, VERTEX_SHADER).unwrap();
        let before = calls(&guest).len();
        assert!(matches!(
            gl_link_program(&mut guest, shader),
            Err(BridgeError::WrongHandleKind { .. })
        ));
        assert_eq!(calls(&guest).len(), before);
    }

    #[test]
    fn test_buffer_data_out_of_bounds() {
        let mut guest = VecGuest::new(128);
        let err = gl_buffer_data(&mut guest, ARRAY_BUFFER, 64, 100, STATIC_DRAW).unwrap_err();
        assert!(matches!(err, BridgeError::OutOfBounds { .. }));
        let err = gl_buffer_data(&mut guest, ARRAY_BUFFER, -4, 0, STATIC_DRAW).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidLength(-4)));
        assert!(calls(&guest).is_empty());
    }

    fn shader_fixture(guest: &mut VecGuest) -> Handle {
        guest.poke_cstr(16, "precision mediump float;\n");
        guest.poke_cstr(64, "void main() {}");
        guest.poke(96, &16u32.to_le_bytes());
        guest.poke(100, &64u32.to_le_bytes());
        gl_create_shader(guest, FRAGMENT_SHADER).unwrap()
    }

    fn last_source(guest: &VecGuest) -> String {
        calls(guest)
            .iter()
            .rev()
            .find_map(|c| match c {
                GlCall::ShaderSource { source, .. } => Some(source.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_shader_source_nul_terminated() {
        let mut guest = VecGuest::new(512);
        let shader = shader_fixture(&mut guest);
        gl_shader_source(&mut guest, shader, 2, 96, 0).unwrap();
        assert_eq!(last_source(&guest), "precision mediump float;\nvoid main() {}");
    }

    #[test]
    fn test_shader_source_explicit_lengths() {
        let mut guest = VecGuest::new(512);
        let shader = shader_fixture(&mut guest);
        // first piece cut to "precision", second NUL-terminated
        guest.poke(128, &9i32.to_le_bytes());
        guest.poke(132, &(-1i32).to_le_bytes());
        gl_shader_source(&mut guest, shader, 2, 96, 128).unwrap();
        assert_eq!(last_source(&guest), "precisionvoid main() {}");
    }

    #[test]
    fn test_shader_source_bad_pointer_table() {
        let mut guest = VecGuest::new(256);
        let shader = gl_create_shader(&mut guest, VERTEX_SHADER).unwrap();
        assert!(gl_shader_source(&mut guest, shader, 4, 250, 0).is_err());
        assert!(matches!(
            gl_shader_source(&mut guest, shader, -1, 0, 0),
            Err(BridgeError::InvalidLength(-1))
        ));
        assert!(!calls(&guest)
            .iter()
            .any(|c| matches!(c, GlCall::ShaderSource { .. })));
    }

    #[test]
    fn test_tex_image_reads_stride_sized_upload() {
        let mut guest = VecGuest::new(1024);
        guest.poke(200, &[7u8; 16]);
        let texture = gl_create_texture(&mut guest).unwrap();
        gl_bind_texture(&mut guest, TEXTURE_2D, texture).unwrap();
        gl_tex_image_2d(&mut guest, TEXTURE_2D, 0, RGBA as i32, 2, 2, 0, RGBA, UNSIGNED_BYTE, 200).unwrap();

        match calls(&guest).last().unwrap() {
            GlCall::TexImage2D { pixels: Some(p), .. } => assert_eq!(p.len(), 16),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tex_image_without_pixels() {
        let mut guest = VecGuest::new(64);
        gl_tex_image_2d(&mut guest, TEXTURE_2D, 0, RGB as i32, 512, 512, 0, RGB, UNSIGNED_BYTE, 0).unwrap();
        assert!(matches!(
            calls(&guest).last(),
            Some(GlCall::TexImage2D { pixels: None, .. })
        ));
    }

    #[test]
    fn test_tex_image_errors() {
        let mut guest = VecGuest::new(64);
        assert!(matches!(
            gl_tex_image_2d(&mut guest, TEXTURE_2D, 0, 0, 4, 4, 0, 0x1234, UNSIGNED_BYTE, 8),
            Err(BridgeError::UnsupportedPixelFormat { .. })
        ));
        assert!(matches!(
            gl_tex_image_2d(&mut guest, TEXTURE_2D, 0, 0, 8, 8, 0, RGBA, UNSIGNED_BYTE, 8),
            Err(BridgeError::OutOfBounds { .. })
        ));
        assert!(calls(&guest).is_empty());
    }

    #[test]
    fn test_uniform_location_null_still_issues_handle() {
        let mut guest = VecGuest::new(256);
        guest.ctx = crate::guest::BridgeContext::new(
            crate::gl::RecordingBackend::new().with_inactive_uniform("u_unused"),
            std::sync::Arc::new(guest.clock.clone()),
            &crate::wasm::BridgeConfig::default(),
        );
        guest.poke_cstr(32, "u_unused");
        guest.poke_cstr(48, "u_size");
        let program = gl_create_program(&mut guest).unwrap();

        let unused = gl_get_uniform_location(&mut guest, program, 32).unwrap();
        let size = gl_get_uniform_location(&mut guest, program, 48).unwrap();
        assert_eq!((unused, size), (1, 2));

        gl_uniform2f(&mut guest, unused, 1.0, 2.0).unwrap();
        gl_uniform2f(&mut guest, size, 800.0, 600.0).unwrap();
        let uniforms: Vec<_> = calls(&guest)
            .iter()
            .filter_map(|c| match c {
                GlCall::Uniform2f { location, .. } => Some(location.is_some()),
                _ => None,
            })
            .collect();
        assert_eq!(uniforms, vec![false, true]);
        assert!(matches!(
            gl_uniform1i(&mut guest, program, 0),
            Err(BridgeError::WrongHandleKind { .. })
        ));
    }

    #[test]
    fn test_attrib_location_and_parameters() {
        let mut guest = VecGuest::new(256);
        guest.poke_cstr(32, "a_pos");
        let program = gl_create_program(&mut guest).unwrap();
        let shader = gl_create_shader(&mut guest, VERTEX_SHADER).unwrap();
        assert_eq!(gl_get_attrib_location(&mut guest, program, 32).unwrap(), 0);
        assert_eq!(gl_get_program_parameter(&mut guest, program, LINK_STATUS).unwrap(), 1);
        assert_eq!(gl_get_shader_parameter(&mut guest, shader, COMPILE_STATUS).unwrap(), 1);
        assert!(gl_get_attrib_location(&mut guest, shader, 32).is_err());
    }

    #[test]
    fn test_delete_shader_retires_handle() {
        let mut guest = VecGuest::new(256);
        let shader = gl_create_shader(&mut guest, VERTEX_SHADER).unwrap();
        gl_delete_shader(&mut guest, shader).unwrap();
        assert!(guest.ctx.backend().is_shader_deleted(1));
        assert_eq!(guest.ctx.objects().dead(), 1);
        // still resolvable, never reissued
        assert!(gl_compile_shader(&mut guest, shader).is_ok());
        assert_eq!(gl_create_buffer(&mut guest).unwrap(), 1);
    }

    #[test]
    fn test_simple_forwarding() {
        let mut guest = VecGuest::new(64);
        gl_clear_color(&mut guest, 0.0, 0.5, 1.0, 1.0).unwrap();
        gl_clear(&mut guest, COLOR_BUFFER_BIT).unwrap();
        gl_active_texture(&mut guest, TEXTURE0).unwrap();
        gl_tex_parameteri(&mut guest, TEXTURE_2D, 0x2801, 0x2601).unwrap();
        gl_enable_vertex_attrib_array(&mut guest, 0).unwrap();
        gl_vertex_attrib_pointer(&mut guest, 0, 2, FLOAT, 1, 8, 0).unwrap();
        gl_draw_arrays(&mut guest, TRIANGLES, 0, 3).unwrap();
        gl_draw_elements(&mut guest, TRIANGLES, 6, UNSIGNED_SHORT, 0).unwrap();
        gl_disable_vertex_attrib_array(&mut guest, 0).unwrap();
        gl_viewport(&mut guest, 0, 0, 640, 480).unwrap();

        let recorded = calls(&guest);
        assert_eq!(recorded.len(), 10);
        assert_eq!(recorded[1], GlCall::Clear(COLOR_BUFFER_BIT));
        assert!(matches!(
            recorded[5],
            GlCall::VertexAttribPointer { normalized: true, .. }
        ));
        assert_eq!(guest.ctx.backend().draw_count(), 2);
        assert_eq!(
            recorded[9],
            GlCall::Viewport {
                x: 0,
                y: 0,
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_console_imports() {
        let mut guest = VecGuest::new(256);
        guest.poke(0, b"hello there");
        print_slice(&mut guest, 0, 5).unwrap();

        guest.poke_cstr(32, "tick %d arg %d");
        guest.poke(64, &3i32.to_le_bytes());
        guest.poke(68, &7i32.to_le_bytes());
        printf(&mut guest, 32, 64).unwrap();

        let lines: Vec<_> = guest.ctx.console().lines().collect();
        assert_eq!(lines, vec!["hello", "tick 3 arg 7"]);
    }

    #[test]
    fn test_timer_imports() {
        let mut guest = VecGuest::new(64);
        let token = set_interval(&mut guest, 4, 10, 1).unwrap();
        assert!(token > 0);
        clear_interval(&mut guest, token).unwrap();
        clear_interval(&mut guest, 999).unwrap();

        guest.clock.advance(Duration::from_millis(250));
        assert!((time_precise_ms(&mut guest).unwrap() - 250.0).abs() < 1e-9);
    }
}
