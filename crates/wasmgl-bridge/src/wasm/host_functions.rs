//! Bridge imports registered with the wasmtime linker.
//!
//! Every import forwards to its [`dispatch`](crate::dispatch) function and
//! then settles the outcome by error disposition:
//!
//! - skip-call errors (bad handle, undecodable text, unknown pixel format) are
//!   logged and the guest receives a fallback (`-1` for handles and integer
//!   results, `0` for parameter queries)
//! - everything else traps, unwinding the guest entry point that is running
//!   (`draw`, a timer tick, an input handler) back to the session
//!
//! ## Import Module
//!
//! Imports live in the configured module, `env` by default:
//! ```wat
//! (import "env" "glCreateBuffer" (func $glCreateBuffer (result i32)))
//! (import "env" "printf" (func $printf (param i32 i32)))
//! ```

use wasmtime::{Caller, Linker};

use super::runtime::BridgeState;
use crate::dispatch;
use crate::error::{BridgeError, Disposition, Result};
use crate::gl::GraphicsBackend;

type Ctx<'a, B> = Caller<'a, BridgeState<B>>;

/// Registers the bridge import surface.
pub struct BridgeHostFunctions;

impl BridgeHostFunctions {
    /// Register all bridge imports under `module`.
    pub fn register<B: GraphicsBackend + 'static>(linker: &mut Linker<BridgeState<B>>, module: &str) -> Result<()> {
        Self::define(linker, module)
            .map_err(|e| BridgeError::Wasm(format!("failed to register bridge imports: {}", e)))
    }

    fn define<B: GraphicsBackend + 'static>(linker: &mut Linker<BridgeState<B>>, module: &str) -> wasmtime::Result<()> {
        Self::register_objects(linker, module)?;
        Self::register_state(linker, module)?;
        Self::register_draw(linker, module)?;
        Self::register_host(linker, module)?;
        Ok(())
    }

    // ========================================================================
    // Object creation, shaders and programs
    // ========================================================================

    fn register_objects<B: GraphicsBackend + 'static>(
        linker: &mut Linker<BridgeState<B>>,
        m: &str,
    ) -> wasmtime::Result<()> {
        linker.func_wrap(m, "glCreateBuffer", |mut c: Ctx<'_, B>| {
            settle("glCreateBuffer", dispatch::gl_create_buffer(&mut c), -1)
        })?;
        linker.func_wrap(m, "glCreateProgram", |mut c: Ctx<'_, B>| {
            settle("glCreateProgram", dispatch::gl_create_program(&mut c), -1)
        })?;
        linker.func_wrap(m, "glCreateShader", |mut c: Ctx<'_, B>, kind: u32| {
            settle("glCreateShader", dispatch::gl_create_shader(&mut c, kind), -1)
        })?;
        linker.func_wrap(m, "glCreateTexture", |mut c: Ctx<'_, B>| {
            settle("glCreateTexture", dispatch::gl_create_texture(&mut c), -1)
        })?;
        linker.func_wrap(m, "glDeleteShader", |mut c: Ctx<'_, B>, shader: i32| {
            settle("glDeleteShader", dispatch::gl_delete_shader(&mut c, shader), ())
        })?;
        linker.func_wrap(
            m,
            "glShaderSource",
            |mut c: Ctx<'_, B>, shader: i32, count: i32, strings: i32, lengths: i32| {
                settle(
                    "glShaderSource",
                    dispatch::gl_shader_source(&mut c, shader, count, strings, lengths),
                    (),
                )
            },
        )?;
        linker.func_wrap(m, "glCompileShader", |mut c: Ctx<'_, B>, shader: i32| {
            settle("glCompileShader", dispatch::gl_compile_shader(&mut c, shader), ())
        })?;
        linker.func_wrap(m, "glAttachShader", |mut c: Ctx<'_, B>, program: i32, shader: i32| {
            settle("glAttachShader", dispatch::gl_attach_shader(&mut c, program, shader), ())
        })?;
        linker.func_wrap(m, "glLinkProgram", |mut c: Ctx<'_, B>, program: i32| {
            settle("glLinkProgram", dispatch::gl_link_program(&mut c, program), ())
        })?;
        linker.func_wrap(m, "glUseProgram", |mut c: Ctx<'_, B>, program: i32| {
            settle("glUseProgram", dispatch::gl_use_program(&mut c, program), ())
        })?;
        linker.func_wrap(m, "glGetShaderParameter", |mut c: Ctx<'_, B>, shader: i32, pname: u32| {
            settle(
                "glGetShaderParameter",
                dispatch::gl_get_shader_parameter(&mut c, shader, pname),
                0,
            )
        })?;
        linker.func_wrap(m, "glGetProgramParameter", |mut c: Ctx<'_, B>, program: i32, pname: u32| {
            settle(
                "glGetProgramParameter",
                dispatch::gl_get_program_parameter(&mut c, program, pname),
                0,
            )
        })?;
        linker.func_wrap(m, "glGetAttribLocation", |mut c: Ctx<'_, B>, program: i32, name: i32| {
            settle(
                "glGetAttribLocation",
                dispatch::gl_get_attrib_location(&mut c, program, name),
                -1,
            )
        })?;
        linker.func_wrap(m, "glGetUniformLocation", |mut c: Ctx<'_, B>, program: i32, name: i32| {
            settle(
                "glGetUniformLocation",
                dispatch::gl_get_uniform_location(&mut c, program, name),
                -1,
            )
        })?;
        Ok(())
    }

    // ========================================================================
    // Bindings, uploads and uniforms
    // ========================================================================

    fn register_state<B: GraphicsBackend + 'static>(
        linker: &mut Linker<BridgeState<B>>,
        m: &str,
    ) -> wasmtime::Result<()> {
        linker.func_wrap(m, "glActiveTexture", |mut c: Ctx<'_, B>, texture: u32| {
            settle("glActiveTexture", dispatch::gl_active_texture(&mut c, texture), ())
        })?;
        linker.func_wrap(m, "glBindBuffer", |mut c: Ctx<'_, B>, target: u32, buffer: i32| {
            settle("glBindBuffer", dispatch::gl_bind_buffer(&mut c, target, buffer), ())
        })?;
        linker.func_wrap(m, "glBindTexture", |mut c: Ctx<'_, B>, target: u32, texture: i32| {
            settle("glBindTexture", dispatch::gl_bind_texture(&mut c, target, texture), ())
        })?;
        linker.func_wrap(
            m,
            "glBufferData",
            |mut c: Ctx<'_, B>, target: u32, size: i32, data: i32, usage: u32| {
                settle(
                    "glBufferData",
                    dispatch::gl_buffer_data(&mut c, target, size, data, usage),
                    (),
                )
            },
        )?;
        linker.func_wrap(
            m,
            "glBufferSubData",
            |mut c: Ctx<'_, B>, target: u32, offset: i32, size: i32, data: i32| {
                settle(
                    "glBufferSubData",
                    dispatch::gl_buffer_sub_data(&mut c, target, offset, size, data),
                    (),
                )
            },
        )?;
        linker.func_wrap(
            m,
            "glTexImage2D",
            |mut c: Ctx<'_, B>,
             target: u32,
             level: i32,
             internal_format: i32,
             width: i32,
             height: i32,
             border: i32,
             format: u32,
             ty: u32,
             pixels: i32| {
                settle(
                    "glTexImage2D",
                    dispatch::gl_tex_image_2d(
                        &mut c,
                        target,
                        level,
                        internal_format,
                        width,
                        height,
                        border,
                        format,
                        ty,
                        pixels,
                    ),
                    (),
                )
            },
        )?;
        linker.func_wrap(m, "glTexParameteri", |mut c: Ctx<'_, B>, target: u32, pname: u32, param: i32| {
            settle("glTexParameteri", dispatch::gl_tex_parameteri(&mut c, target, pname, param), ())
        })?;
        linker.func_wrap(m, "glUniform1i", |mut c: Ctx<'_, B>, location: i32, v0: i32| {
            settle("glUniform1i", dispatch::gl_uniform1i(&mut c, location, v0), ())
        })?;
        linker.func_wrap(m, "glUniform2f", |mut c: Ctx<'_, B>, location: i32, v0: f32, v1: f32| {
            settle("glUniform2f", dispatch::gl_uniform2f(&mut c, location, v0, v1), ())
        })?;
        linker.func_wrap(
            m,
            "glUniform3f",
            |mut c: Ctx<'_, B>, location: i32, v0: f32, v1: f32, v2: f32| {
                settle("glUniform3f", dispatch::gl_uniform3f(&mut c, location, v0, v1, v2), ())
            },
        )?;
        linker.func_wrap(
            m,
            "glVertexAttribPointer",
            |mut c: Ctx<'_, B>, index: u32, size: i32, ty: u32, normalized: i32, stride: i32, offset: i32| {
                settle(
                    "glVertexAttribPointer",
                    dispatch::gl_vertex_attrib_pointer(&mut c, index, size, ty, normalized, stride, offset),
                    (),
                )
            },
        )?;
        linker.func_wrap(m, "glEnableVertexAttribArray", |mut c: Ctx<'_, B>, index: u32| {
            settle(
                "glEnableVertexAttribArray",
                dispatch::gl_enable_vertex_attrib_array(&mut c, index),
                (),
            )
        })?;
        linker.func_wrap(m, "glDisableVertexAttribArray", |mut c: Ctx<'_, B>, index: u32| {
            settle(
                "glDisableVertexAttribArray",
                dispatch::gl_disable_vertex_attrib_array(&mut c, index),
                (),
            )
        })?;
        Ok(())
    }

    // ========================================================================
    // Frame output
    // ========================================================================

    fn register_draw<B: GraphicsBackend + 'static>(
        linker: &mut Linker<BridgeState<B>>,
        m: &str,
    ) -> wasmtime::Result<()> {
        linker.func_wrap(
            m,
            "glClearColor",
            |mut c: Ctx<'_, B>, red: f32, green: f32, blue: f32, alpha: f32| {
                settle("glClearColor", dispatch::gl_clear_color(&mut c, red, green, blue, alpha), ())
            },
        )?;
        linker.func_wrap(m, "glClear", |mut c: Ctx<'_, B>, mask: u32| {
            settle("glClear", dispatch::gl_clear(&mut c, mask), ())
        })?;
        linker.func_wrap(m, "glDrawArrays", |mut c: Ctx<'_, B>, mode: u32, first: i32, count: i32| {
            settle("glDrawArrays", dispatch::gl_draw_arrays(&mut c, mode, first, count), ())
        })?;
        linker.func_wrap(
            m,
            "glDrawElements",
            |mut c: Ctx<'_, B>, mode: u32, count: i32, ty: u32, offset: i32| {
                settle("glDrawElements", dispatch::gl_draw_elements(&mut c, mode, count, ty, offset), ())
            },
        )?;
        linker.func_wrap(
            m,
            "glViewport",
            |mut c: Ctx<'_, B>, x: i32, y: i32, width: i32, height: i32| {
                settle("glViewport", dispatch::gl_viewport(&mut c, x, y, width, height), ())
            },
        )?;
        Ok(())
    }

    // ========================================================================
    // Timers and console
    // ========================================================================

    fn register_host<B: GraphicsBackend + 'static>(
        linker: &mut Linker<BridgeState<B>>,
        m: &str,
    ) -> wasmtime::Result<()> {
        linker.func_wrap(m, "set_interval", |mut c: Ctx<'_, B>, func: i32, delay: i32, arg: i32| {
            settle("set_interval", dispatch::set_interval(&mut c, func, delay, arg), -1)
        })?;
        linker.func_wrap(m, "clear_interval", |mut c: Ctx<'_, B>, token: i32| {
            settle("clear_interval", dispatch::clear_interval(&mut c, token), ())
        })?;
        linker.func_wrap(m, "time_precise_ms", |mut c: Ctx<'_, B>| {
            settle("time_precise_ms", dispatch::time_precise_ms(&mut c), 0.0)
        })?;
        linker.func_wrap(m, "print_slice", |mut c: Ctx<'_, B>, ptr: i32, len: i32| {
            settle("print_slice", dispatch::print_slice(&mut c, ptr, len), ())
        })?;
        linker.func_wrap(m, "printf", |mut c: Ctx<'_, B>, fmt: i32, args: i32| {
            settle("printf", dispatch::printf(&mut c, fmt, args), ())
        })?;
        Ok(())
    }
}

/// Turn a bridge result into what the guest sees.
fn settle<T>(import: &'static str, result: Result<T>, fallback: T) -> wasmtime::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => match err.disposition() {
            Disposition::SkipCall => {
                tracing::warn!(import, error = %err, "bridge call skipped");
                Ok(fallback)
            }
            Disposition::AbortFrame | Disposition::Fatal => {
                tracing::error!(import, error = %err, "bridge call trapped");
                Err(err.into())
            }
        },
    }
}
