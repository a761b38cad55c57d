//! printf-style formatting of guest strings.
//!
//! Supports the three conversions guest code uses for logging:
//!
//! | Spec | Reads                          | Prints            |
//! |------|--------------------------------|-------------------|
//! | `%d` | 4 bytes, signed                | decimal           |
//! | `%u` | 4 bytes, unsigned              | decimal           |
//! | `%f` | 8 bytes, after aligning to 8   | shortest float    |
//!
//! Arguments are read from a packed little-endian block; the `%f` alignment is
//! relative to the start of that block. Any other byte after `%` is dropped
//! and consumes no argument.

use crate::error::Result;
use crate::memory::{view_to_end, View};

/// Expand the NUL-terminated format string at `fmt` with arguments at `args`.
pub fn format_guest(arena: &[u8], fmt: u32, args: u32) -> Result<String> {
    let fmt = view_to_end(arena, fmt)?;
    let args = view_to_end(arena, args)?;
    let mut cursor = ArgCursor { view: args, pos: 0 };
    let mut out = Vec::new();

    let mut i = 0;
    loop {
        let c = fmt.read_u8(i)?;
        match c {
            0 => break,
            b'%' => {
                i += 1;
                match fmt.read_u8(i)? {
                    0 => break,
                    b'd' => out.extend_from_slice(cursor.next_i32()?.to_string().as_bytes()),
                    b'u' => out.extend_from_slice(cursor.next_u32()?.to_string().as_bytes()),
                    b'f' => out.extend_from_slice(number_text(cursor.next_f64()?).as_bytes()),
                    _ => {}
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

struct ArgCursor<'a> {
    view: View<'a>,
    pos: usize,
}

impl ArgCursor<'_> {
    fn next_i32(&mut self) -> Result<i32> {
        let v = self.view.read_i32(self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    fn next_u32(&mut self) -> Result<u32> {
        let v = self.view.read_u32(self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    fn next_f64(&mut self) -> Result<f64> {
        self.pos = self.pos.next_multiple_of(8);
        let v = self.view.read_f64(self.pos)?;
        self.pos += 8;
        Ok(v)
    }
}

fn number_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if v == 0.0 {
        "0".to_string()
    } else if v.abs() >= 1e21 || v.abs() < 1e-6 {
        // Exponent form with an explicit sign, e.g. `1e+21`, `-2.5e-7`
        let text = format!("{:e}", v);
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => text,
        }
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    fn arena_with(fmt: &str, args: &[u8]) -> Vec<u8> {
        let mut arena = vec![0u8; 256];
        arena[..fmt.len()].copy_from_slice(fmt.as_bytes());
        arena[128..128 + args.len()].copy_from_slice(args);
        arena
    }

    #[test]
    fn test_int_and_float_with_padding() {
        let mut args = Vec::new();
        args.extend_from_slice(&42i32.to_le_bytes());
        args.extend_from_slice(&[0; 4]);
        args.extend_from_slice(&3.5f64.to_le_bytes());
        let arena = arena_with("%d and %f\0", &args);
        assert_eq!(format_guest(&arena, 0, 128).unwrap(), "42 and 3.5");
    }

    #[test]
    fn test_signed_and_unsigned() {
        let mut args = Vec::new();
        args.extend_from_slice(&(-1i32).to_le_bytes());
        args.extend_from_slice(&(-1i32).to_le_bytes());
        let arena = arena_with("%d/%u\0", &args);
        assert_eq!(format_guest(&arena, 0, 128).unwrap(), "-1/4294967295");
    }

    #[test]
    fn test_unknown_specifier_consumes_nothing() {
        let arena = arena_with("100%x done %d\0", &7i32.to_le_bytes());
        assert_eq!(format_guest(&arena, 0, 128).unwrap(), "100 done 7");
    }

    #[test]
    fn test_trailing_percent_stops() {
        let arena = arena_with("50%\0garbage", &[]);
        assert_eq!(format_guest(&arena, 0, 128).unwrap(), "50");
    }

    #[test]
    fn test_float_text() {
        assert_eq!(number_text(2.0), "2");
        assert_eq!(number_text(-0.0), "0");
        assert_eq!(number_text(0.1), "0.1");
        assert_eq!(number_text(f64::NAN), "NaN");
        assert_eq!(number_text(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_float_text_exponent_range() {
        assert_eq!(number_text(1e21), "1e+21");
        assert_eq!(number_text(-1.5e300), "-1.5e+300");
        assert_eq!(number_text(1e20), "100000000000000000000");
        assert_eq!(number_text(0.000001), "0.000001");
        assert_eq!(number_text(1e-7), "1e-7");
        assert_eq!(number_text(-2.5e-7), "-2.5e-7");
        assert_eq!(number_text(5e-324), "5e-324");
    }

    #[test]
    fn test_multibyte_literal_survives() {
        let arena = arena_with("tick ✓ %u\0", &5u32.to_le_bytes());
        assert_eq!(format_guest(&arena, 0, 128).unwrap(), "tick ✓ 5");
    }

    #[test]
    fn test_missing_terminator_fails() {
        let arena = vec![b'a'; 16];
        assert!(matches!(
            format_guest(&arena, 0, 0),
            Err(BridgeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_args_past_arena_fail() {
        let mut arena = vec![0u8; 64];
        arena[..3].copy_from_slice(b"%d\0");
        assert!(format_guest(&arena, 0, 62).is_err());
    }
}
