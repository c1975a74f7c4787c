//! Binary wire format of Postgres `numeric`, mapped onto `BigDecimal` without
//! a precision cap.

use bigdecimal::{
    BigDecimal,
    num_bigint::{BigInt, Sign},
};
use bytes::{BufMut, BytesMut};
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, accepts, to_sql_checked};

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_INFINITY: u16 = 0xD000;
const SIGN_NEG_INFINITY: u16 = 0xF000;
const MAX_DSCALE: u16 = 0x3FFF;
const NBASE: i16 = 10_000;

type BoxError = Box<dyn Error + Sync + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum PgNumeric {
    Finite(BigDecimal),
    NaN,
    Infinity,
    NegativeInfinity,
}

impl PgNumeric {
    /// Text form of the non-finite values, as Postgres prints them.
    pub fn special_text(&self) -> Option<&'static str> {
        match self {
            PgNumeric::Finite(_) => None,
            PgNumeric::NaN => Some("NaN"),
            PgNumeric::Infinity => Some("Infinity"),
            PgNumeric::NegativeInfinity => Some("-Infinity"),
        }
    }

    pub fn parse_special(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "nan" => Some(PgNumeric::NaN),
            "infinity" | "+infinity" | "inf" => Some(PgNumeric::Infinity),
            "-infinity" | "-inf" => Some(PgNumeric::NegativeInfinity),
            _ => None,
        }
    }
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let mut words = raw.chunks(2).map(|w| match w {
            [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err("truncated numeric"),
        });
        let mut next = || words.next().unwrap_or(Err("truncated numeric"));

        let ndigits = next()? as i16;
        let weight = next()? as i16;
        let sign = next()?;
        let dscale = next()?;

        match sign {
            SIGN_NAN => return Ok(PgNumeric::NaN),
            SIGN_INFINITY => return Ok(PgNumeric::Infinity),
            SIGN_NEG_INFINITY => return Ok(PgNumeric::NegativeInfinity),
            SIGN_POSITIVE | SIGN_NEGATIVE => {}
            other => return Err(format!("invalid numeric sign 0x{other:04x}").into()),
        }
        if ndigits < 0 {
            return Err("negative numeric digit count".into());
        }

        let mut int = BigInt::from(0);
        for _ in 0..ndigits {
            let digit = next()? as i16;
            if !(0..NBASE).contains(&digit) {
                return Err(format!("numeric digit {digit} out of range").into());
            }
            int = int * BigInt::from(NBASE) + BigInt::from(digit);
        }
        if raw.len() != 8 + 2 * ndigits as usize {
            return Err("numeric length does not match its digit count".into());
        }
        if sign == SIGN_NEGATIVE {
            int = -int;
        }

        // Each base-10000 digit is four decimal places.
        let exponent = 4 * (i64::from(weight) - i64::from(ndigits) + 1);
        let value = BigDecimal::new(int, -exponent).with_scale(i64::from(dscale));
        Ok(PgNumeric::Finite(value))
    }

    accepts!(NUMERIC);
}

impl ToSql for PgNumeric {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let (sign, weight, dscale, digits) = match self {
            PgNumeric::Finite(value) => encode_finite(value)?,
            PgNumeric::NaN => (SIGN_NAN, 0, 0, Vec::new()),
            PgNumeric::Infinity => (SIGN_INFINITY, 0, 0, Vec::new()),
            PgNumeric::NegativeInfinity => (SIGN_NEG_INFINITY, 0, 0, Vec::new()),
        };

        out.put_i16(i16::try_from(digits.len())?);
        out.put_i16(weight);
        out.put_u16(sign);
        out.put_u16(dscale);
        for digit in digits {
            out.put_i16(digit);
        }
        Ok(IsNull::No)
    }

    accepts!(NUMERIC);
    to_sql_checked!();
}

/// Sign, weight, display scale and base-10000 digits of a finite value.
fn encode_finite(value: &BigDecimal) -> Result<(u16, i16, u16, Vec<i16>), BoxError> {
    let (int, scale) = value.as_bigint_and_exponent();
    let (int, scale) = if scale < 0 {
        (value.with_scale(0).as_bigint_and_exponent().0, 0)
    } else {
        (int, scale)
    };
    let dscale = u16::try_from(scale)
        .ok()
        .filter(|s| *s <= MAX_DSCALE)
        .ok_or("numeric scale out of range")?;
    let mut sign = match int.sign() {
        Sign::Minus => SIGN_NEGATIVE,
        _ => SIGN_POSITIVE,
    };

    let decimal = int.magnitude().to_string();
    let scale = usize::from(dscale);
    let (whole, fraction) = if decimal.len() > scale {
        let (w, f) = decimal.split_at(decimal.len() - scale);
        (w.to_string(), f.to_string())
    } else {
        (String::new(), format!("{}{decimal}", "0".repeat(scale - decimal.len())))
    };

    let lead = (4 - whole.len() % 4) % 4;
    let trail = (4 - fraction.len() % 4) % 4;
    let padded = format!(
        "{}{whole}{fraction}{}",
        "0".repeat(lead),
        "0".repeat(trail)
    );
    let mut digits: Vec<i16> = padded
        .as_bytes()
        .chunks(4)
        .map(|group| group.iter().fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0')))
        .collect();

    let mut weight = ((lead + whole.len()) / 4) as i64 - 1;
    let leading_zeros = digits.iter().take_while(|d| **d == 0).count();
    digits.drain(..leading_zeros);
    weight -= leading_zeros as i64;
    while digits.last() == Some(&0) {
        digits.pop();
    }
    if digits.is_empty() {
        weight = 0;
        sign = SIGN_POSITIVE;
    }

    Ok((sign, i16::try_from(weight)?, dscale, digits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn wire(value: &PgNumeric) -> Vec<u8> {
        let mut out = BytesMut::new();
        value.to_sql(&Type::NUMERIC, &mut out).unwrap();
        out.to_vec()
    }

    fn decimal(text: &str) -> PgNumeric {
        PgNumeric::Finite(BigDecimal::from_str(text).unwrap())
    }

    fn read(raw: &[u8]) -> PgNumeric {
        PgNumeric::from_sql(&Type::NUMERIC, raw).unwrap()
    }

    #[test]
    fn encodes_base_ten_thousand_digits() {
        // ndigits 2, weight 0, positive, dscale 2, digits 1234 and 5000
        assert_eq!(
            wire(&decimal("1234.50")),
            vec![0, 2, 0, 0, 0, 0, 0, 2, 0x04, 0xd2, 0x13, 0x88]
        );
        // -0.0001: one digit of weight -1
        assert_eq!(
            wire(&decimal("-0.0001")),
            vec![0, 1, 0xff, 0xff, 0x40, 0, 0, 4, 0, 1]
        );
    }

    #[test]
    fn decodes_with_display_scale() {
        let value = read(&[0, 2, 0, 0, 0, 0, 0, 2, 0x04, 0xd2, 0x13, 0x88]);
        let PgNumeric::Finite(d) = value else {
            panic!("expected a finite value");
        };
        assert_eq!(d.to_string(), "1234.50");
        assert_eq!(read(&[0, 0, 0, 0, 0, 0, 0, 3]), decimal("0.000"));
    }

    #[test]
    fn precision_beyond_28_digits_survives() {
        let big = decimal("123456789012345678901234567890.123456789012345678901234567890");
        assert_eq!(read(&wire(&big)), big);

        let large_exponent = PgNumeric::Finite(BigDecimal::from_str("1E+40").unwrap());
        assert_eq!(read(&wire(&large_exponent)), decimal(&format!("1{}", "0".repeat(40))));
    }

    #[test]
    fn special_values() {
        assert_eq!(read(&[0, 0, 0, 0, 0xc0, 0, 0, 0]), PgNumeric::NaN);
        assert_eq!(read(&[0, 0, 0, 0, 0xd0, 0, 0, 0]), PgNumeric::Infinity);
        assert_eq!(read(&[0, 0, 0, 0, 0xf0, 0, 0, 0]), PgNumeric::NegativeInfinity);
        assert_eq!(wire(&PgNumeric::NaN), vec![0, 0, 0, 0, 0xc0, 0, 0, 0]);
        assert_eq!(PgNumeric::parse_special(" nan "), Some(PgNumeric::NaN));
        assert_eq!(PgNumeric::NegativeInfinity.special_text(), Some("-Infinity"));
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &[0, 1, 0, 0]).is_err());
        let digit_overflow = [0, 1, 0, 0, 0, 0, 0, 0, 0x27, 0x10];
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &digit_overflow).is_err());
    }
}
