//! dBFS to linear amplitude mapping.

use crate::config::SampleEncoding;

/// Numeric domain a sample value is expressed in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleDomain {
    /// Signed integer PCM with the given positive full-scale value.
    Integer { max: f64 },
    /// Floating point, full scale 1.0.
    Float,
}

impl SampleDomain {
    pub fn for_encoding(encoding: SampleEncoding) -> Self {
        match encoding {
            SampleEncoding::I16 => SampleDomain::Integer {
                max: i16::MAX as f64,
            },
            SampleEncoding::I32 => SampleDomain::Integer {
                max: i32::MAX as f64,
            },
            SampleEncoding::F32 => SampleDomain::Float,
        }
    }
}

/// Convert a level in dBFS to a peak amplitude in `domain` units.
///
/// Integer domains are clamped to `[1, max]`: an all-zero signal is treated as silence by
/// some interfaces, which then power down anyway. Float domains are returned unclamped.
pub fn to_linear_amplitude(level_dbfs: f64, domain: SampleDomain) -> f64 {
    let linear = 10f64.powf(level_dbfs / 20.0);
    match domain {
        SampleDomain::Integer { max } => (linear * max).clamp(1.0, max),
        SampleDomain::Float => linear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const I16: SampleDomain = SampleDomain::Integer {
        max: i16::MAX as f64,
    };

    fn levels() -> impl Iterator<Item = f64> {
        (0..=280).map(|i| -150.0 + i as f64 * 0.5)
    }

    #[test]
    fn float_amplitude_is_strictly_increasing() {
        let mut prev = f64::NEG_INFINITY;
        for db in levels() {
            let amp = to_linear_amplitude(db, SampleDomain::Float);
            assert!(amp > prev, "not increasing at {db} dBFS");
            prev = amp;
        }
    }

    #[test]
    fn integer_amplitude_stays_in_range_and_never_decreases() {
        for domain in [I16, SampleDomain::for_encoding(SampleEncoding::I32)] {
            let SampleDomain::Integer { max } = domain else {
                unreachable!()
            };
            let mut prev = 0.0;
            for db in levels() {
                let amp = to_linear_amplitude(db, domain);
                assert!(amp >= 1.0);
                assert!(amp <= max);
                assert!(amp >= prev, "decreased at {db} dBFS");
                prev = amp;
            }
        }
    }

    #[test]
    fn integer_amplitude_floors_at_one_lsb() {
        assert_eq!(to_linear_amplitude(-120.0, I16), 1.0);
        assert_eq!(to_linear_amplitude(-150.0, I16), 1.0);
    }

    #[test]
    fn integer_amplitude_is_strictly_increasing_above_the_floor() {
        let a = to_linear_amplitude(-60.0, I16);
        let b = to_linear_amplitude(-40.0, I16);
        assert!(b > a);
        assert!((b - 327.67).abs() < 0.01);
    }

    #[test]
    fn minus_100_dbfs_float_is_about_1e_minus_5() {
        let amp = to_linear_amplitude(-100.0, SampleDomain::Float);
        assert!((amp - 1.0e-5).abs() < 1e-12);
    }
}
