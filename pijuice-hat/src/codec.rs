//! Shared codec helpers: named wire enums, BCD and bit access

/// Declare an enum whose variants map 1:1 onto a raw register value and a
/// device-style name.
///
/// Generates `ALL`, `from_raw`, `raw`, `as_str`, `Display`, `Serialize` (as
/// the name) and `FromStr`. Parsing an unknown name fails with the
/// `ErrorKind` given after the enum name.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($err:ident) {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn from_raw(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn raw(self) -> u8 {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::PiJuiceError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| {
                        $crate::error::PiJuiceError::invalid(
                            $crate::error::ErrorKind::$err,
                            format!("{} is not a valid {}", s, stringify!($name)),
                        )
                    })
            }
        }
    };
}

pub(crate) use wire_enum;

/// Test a single bit
macro_rules! bit {
    ($byte:expr, $position:expr) => {
        ($byte >> $position) & 1 != 0
    };
}

pub(crate) use bit;

/// Decode a packed BCD byte; `None` if either nibble exceeds 9
pub fn from_bcd(byte: u8) -> Option<u8> {
    let (hi, lo) = (byte >> 4, byte & 0x0F);
    (hi <= 9 && lo <= 9).then_some(hi * 10 + lo)
}

/// Encode 0..=99 as packed BCD
pub fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

pub fn le_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

pub fn le_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Full-scale raw value of a PWM duty cycle; 0xFFFF means always on
pub const PWM_FULL_SCALE: u32 = 65534;

/// Raw PWM register value to whole-percent duty cycle
pub fn duty_from_raw(raw: u16) -> f32 {
    if raw == 0xFFFF {
        100.0
    } else {
        (u32::from(raw) * 100 / PWM_FULL_SCALE) as f32
    }
}

/// Duty cycle in percent to the raw PWM register value; caller validates range
///
/// Rounds up so that reading the register back floors to the same percent.
pub fn duty_to_raw(duty: f32) -> u16 {
    if duty >= 100.0 {
        0xFFFF
    } else {
        (f64::from(duty) * f64::from(PWM_FULL_SCALE) / 100.0).ceil() as u16
    }
}
