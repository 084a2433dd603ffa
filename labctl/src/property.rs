//! Declarative instrument properties.
//!
//! Most bench instruments expose their state as pairs of `FOO?` / `FOO <x>`
//! commands. The [`measurement!`], [`control!`] and [`setting!`] macros
//! expand such a command pair into typed async accessors on a driver,
//! following a fixed recipe: validate, format, send. On the way back:
//! ask, parse.
//!
//! Validators mirror the usual device constraints (inclusive ranges,
//! discrete code sets, stepped ranges). Symbolic values are plain Rust
//! enums implementing [`ScpiValue`] with their wire codes.

use std::fmt::Display;

use crate::Error;

/// Error when `value` lies outside the inclusive range.
pub fn strict_range<T: PartialOrd + Copy + Display>(value: T, min: T, max: T) -> crate::Result<T> {
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(Error::argument(format!(
            "value {} not in range [{}, {}]",
            value, min, max
        )))
    }
}

/// Clamp `value` into the inclusive range.
pub fn truncated_range<T: PartialOrd + Copy>(value: T, min: T, max: T) -> crate::Result<T> {
    if value < min {
        Ok(min)
    } else if value > max {
        Ok(max)
    } else {
        Ok(value)
    }
}

/// Error when `value` is not a member of the set.
pub fn strict_discrete_set<T: PartialEq + Copy + Display>(value: T, set: &[T]) -> crate::Result<T> {
    if set.contains(&value) {
        Ok(value)
    } else {
        Err(Error::argument(format!("value {} not in the valid set", value)))
    }
}

/// Round `value` up to the nearest member of the (ascending) set; values
/// beyond the largest member map to it.
pub fn truncated_discrete_set<T: PartialOrd + Copy>(value: T, set: &[T]) -> crate::Result<T> {
    for x in set {
        if value <= *x {
            return Ok(*x);
        }
    }
    set.last()
        .copied()
        .ok_or_else(|| Error::argument("empty discrete set"))
}

/// Error when `value` is outside the range or not a whole number of steps
/// from its lower end.
pub fn strict_step_range(value: f64, min: f64, max: f64, step: f64) -> crate::Result<f64> {
    let value = strict_range(value, min, max)?;
    let steps = (value - min) / step;
    if (steps - steps.round()).abs() > 1e-6 {
        return Err(Error::argument(format!(
            "value {} is not a multiple of {} from {}",
            value, step, min
        )));
    }
    Ok(value)
}

/// Wrap a non-negative value onto `[0, modulus)`.
pub fn modular_range(value: f64, modulus: f64) -> crate::Result<f64> {
    if modulus <= 0.0 {
        return Err(Error::argument("modulus must be positive"));
    }
    Ok(value.rem_euclid(modulus))
}

/// Wrap a value onto `(-modulus, modulus)`, preserving its sign.
pub fn modular_range_bidirectional(value: f64, modulus: f64) -> crate::Result<f64> {
    if modulus <= 0.0 {
        return Err(Error::argument("modulus must be positive"));
    }
    Ok(value.signum() * value.abs().rem_euclid(modulus))
}

/// Conversion between Rust values and their on-the-wire text.
pub trait ScpiValue: Sized {
    fn format(&self) -> String;
    fn parse(s: &str) -> crate::Result<Self>;
}

fn parse_error<T>(s: &str) -> crate::Result<T> {
    Err(Error::unexpected(format!("cannot parse value from {:?}", s)))
}

impl ScpiValue for f64 {
    fn format(&self) -> String {
        self.to_string()
    }

    fn parse(s: &str) -> crate::Result<Self> {
        s.trim().parse().or_else(|_| parse_error(s))
    }
}

impl ScpiValue for f32 {
    fn format(&self) -> String {
        self.to_string()
    }

    fn parse(s: &str) -> crate::Result<Self> {
        s.trim().parse().or_else(|_| parse_error(s))
    }
}

macro_rules! impl_scpi_int {
    ($($ty:ty),*) => {
        $(
            impl ScpiValue for $ty {
                fn format(&self) -> String {
                    self.to_string()
                }

                // some firmware answers integer queries with floats
                fn parse(s: &str) -> crate::Result<Self> {
                    let s = s.trim();
                    if let Ok(x) = s.parse() {
                        return Ok(x);
                    }
                    match s.parse::<f64>() {
                        Ok(x) if x.fract() == 0.0 => Ok(x as $ty),
                        _ => parse_error(s),
                    }
                }
            }
        )*
    };
}

impl_scpi_int!(u8, u16, u32, i8, i16, i32, i64);

impl ScpiValue for bool {
    fn format(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }

    fn parse(s: &str) -> crate::Result<Self> {
        match s.trim() {
            "1" | "ON" => Ok(true),
            "0" | "OFF" => Ok(false),
            other => parse_error(other),
        }
    }
}

impl ScpiValue for String {
    fn format(&self) -> String {
        self.clone()
    }

    fn parse(s: &str) -> crate::Result<Self> {
        Ok(s.trim().to_string())
    }
}

impl<A: ScpiValue, B: ScpiValue> ScpiValue for (A, B) {
    fn format(&self) -> String {
        format!("{},{}", self.0.format(), self.1.format())
    }

    fn parse(s: &str) -> crate::Result<Self> {
        let mut fields = s.trim().splitn(2, ',');
        match (fields.next(), fields.next()) {
            (Some(a), Some(b)) => Ok((A::parse(a.trim())?, B::parse(b.trim())?)),
            _ => parse_error(s),
        }
    }
}

/// Map an enum onto its wire codes, implementing [`ScpiValue`] both ways.
#[macro_export]
macro_rules! scpi_codes {
    ($ty:ty { $($variant:ident => $code:literal),+ $(,)? }) => {
        impl $crate::ScpiValue for $ty {
            fn format(&self) -> String {
                match self {
                    $(Self::$variant => $code,)+
                }
                .to_string()
            }

            fn parse(s: &str) -> $crate::Result<Self> {
                match s.trim() {
                    $($code => Ok(Self::$variant),)+
                    other => Err($crate::Error::UnexpectedResponse(format!(
                        "unknown code {:?} for {}",
                        other,
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

/// A read-only property: one query command, one parsed reply.
#[macro_export]
macro_rules! measurement {
    ($(#[$meta:meta])* $vis:vis async fn $name:ident(&mut self) -> $ty:ty, $cmd:expr $(,)?) => {
        $(#[$meta])*
        $vis async fn $name(&mut self) -> $crate::Result<$ty> {
            let reply = $crate::Comm::ask(self, $cmd).await?;
            <$ty as $crate::ScpiValue>::parse(reply.trim())
        }
    };
}

/// A write-only property. The command either takes one value, formatted
/// into the `{}` placeholder after validation, or stands alone.
#[macro_export]
macro_rules! setting {
    ($(#[$meta:meta])* $vis:vis async fn $name:ident(&mut self, $arg:ident: $ty:ty), $fmt:expr,
     validate = $validator:expr $(,)?) => {
        $(#[$meta])*
        $vis async fn $name(&mut self, $arg: $ty) -> $crate::Result<()> {
            let $arg = ($validator)($arg)?;
            let cmd = $fmt.replace("{}", &$crate::ScpiValue::format(&$arg));
            $crate::Comm::write(self, &cmd).await
        }
    };
    ($(#[$meta:meta])* $vis:vis async fn $name:ident(&mut self, $arg:ident: $ty:ty), $fmt:expr $(,)?) => {
        $(#[$meta])*
        $vis async fn $name(&mut self, $arg: $ty) -> $crate::Result<()> {
            let cmd = $fmt.replace("{}", &$crate::ScpiValue::format(&$arg));
            $crate::Comm::write(self, &cmd).await
        }
    };
    ($(#[$meta:meta])* $vis:vis async fn $name:ident(&mut self), $cmd:expr $(,)?) => {
        $(#[$meta])*
        $vis async fn $name(&mut self) -> $crate::Result<()> {
            $crate::Comm::write(self, $cmd).await
        }
    };
}

/// A read/write property: a getter built like [`measurement!`] and a
/// setter built like [`setting!`].
#[macro_export]
macro_rules! control {
    ($(#[$gmeta:meta])* $gvis:vis async fn $get:ident(&mut self) -> $ty:ty, $get_cmd:expr,
     $(#[$smeta:meta])* $svis:vis async fn $set:ident(&mut self, $arg:ident: $sty:ty), $set_fmt:expr
     $(, validate = $validator:expr)? $(,)?) => {
        $crate::measurement! {
            $(#[$gmeta])*
            $gvis async fn $get(&mut self) -> $ty, $get_cmd
        }
        $crate::setting! {
            $(#[$smeta])*
            $svis async fn $set(&mut self, $arg: $sty), $set_fmt
            $(, validate = $validator)?
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockAdapter;
    use crate::{Comm, Connection};

    #[test]
    fn ranges() {
        assert_eq!(strict_range(5.0, 0.0, 10.0).unwrap(), 5.0);
        assert!(strict_range(11.0, 0.0, 10.0).is_err());
        assert_eq!(truncated_range(11.0, 0.0, 10.0).unwrap(), 10.0);
        assert_eq!(truncated_range(-1.0, 0.0, 10.0).unwrap(), 0.0);
    }

    #[test]
    fn discrete_sets() {
        assert_eq!(strict_discrete_set(23, &[18, 23, 46]).unwrap(), 23);
        assert!(strict_discrete_set(20, &[18, 23, 46]).is_err());
        assert_eq!(truncated_discrete_set(20, &[18, 23, 46]).unwrap(), 23);
        assert_eq!(truncated_discrete_set(99, &[18, 23, 46]).unwrap(), 46);
    }

    #[test]
    fn step_ranges() {
        assert_eq!(strict_step_range(1.25, 0.0, 12.0, 0.01).unwrap(), 1.25);
        assert!(strict_step_range(1.255, 0.0, 12.0, 0.01).is_err());
        assert!(strict_step_range(12.01, 0.0, 12.0, 0.01).is_err());
    }

    #[test]
    fn modular_ranges() {
        assert_eq!(modular_range(370.0, 360.0).unwrap(), 10.0);
        assert_eq!(modular_range_bidirectional(-370.0, 360.0).unwrap(), -10.0);
    }

    #[test]
    fn scpi_values() {
        assert_eq!(f64::parse(" +1.25E-3 ").unwrap(), 1.25e-3);
        assert_eq!(i32::parse("42").unwrap(), 42);
        assert_eq!(i32::parse("42.0").unwrap(), 42);
        assert!(i32::parse("42.5").is_err());
        assert!(bool::parse("ON").unwrap());
        assert!(!bool::parse("0").unwrap());
        assert_eq!(<(u8, u8)>::parse("1, 3").unwrap(), (1, 3));
        assert_eq!((1u8, 3u8).format(), "1,3");
    }

    struct Fake {
        conn: Connection,
    }

    impl Comm for Fake {
        fn conn(&mut self) -> &mut Connection {
            &mut self.conn
        }
    }

    impl Fake {
        measurement! {
            /// Output voltage readback.
            pub async fn voltage(&mut self) -> f64, "MV?"
        }

        control! {
            /// Programmed current.
            pub async fn current(&mut self) -> f64, "PC?",
            /// Program the output current.
            pub async fn set_current(&mut self, value: f64), "PC {}",
            validate = |v| strict_range(v, 0.0, 38.0),
        }

        setting! {
            /// Restart the instrument.
            pub async fn restart(&mut self), "RST"
        }
    }

    #[tokio::test]
    async fn generated_accessors() {
        let mock = MockAdapter::new()
            .expect("MV?\n", "39.95\n")
            .expect("PC?\n", "1.5\n")
            .expect_write("PC 2.5\n")
            .expect_write("RST\n");
        let mut dev = Fake {
            conn: Connection::with_adapter(Box::new(mock)),
        };
        assert_eq!(dev.voltage().await.unwrap(), 39.95);
        assert_eq!(dev.current().await.unwrap(), 1.5);
        dev.set_current(2.5).await.unwrap();
        dev.restart().await.unwrap();

        let err = dev.set_current(40.0).await.unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }
}
