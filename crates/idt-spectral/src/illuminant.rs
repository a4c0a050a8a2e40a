//! Illuminant synthesis from correlated color temperature.
//!
//! Two families are generated on demand rather than stored in the database:
//!
//! - **Daylight** (CIE D-series), valid for 4000-25000 K, also accepting
//!   the historical x100 shorthand (40-250) with the 1.4387752/1.438
//!   radiation-constant correction;
//! - **Blackbody** (Planck), valid for 1500-3999 K.
//!
//! Both produce a [`SpectralData`] holding a single `"power"` channel in
//! the `"main"` set.

use idt_math::interp_linear;

use crate::{
    Shape, SpectralData, SpectralError, SpectralResult, SpectralSet,
    Spectrum, REFERENCE_SHAPE,
};

/// Which synthesis family to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IlluminantKind {
    /// CIE D-series daylight.
    Daylight,
    /// Planckian blackbody radiator.
    Blackbody,
}

/// Planck constant, J*s.
const PLANCK: f64 = 6.62607015e-34;
/// Speed of light in vacuum, m/s.
const LIGHT_SPEED: f64 = 299_792_458.0;
/// Boltzmann constant, J/K.
const BOLTZMANN: f64 = 1.380649e-23;

/// CIE daylight components S0/S1/S2, tabulated at 10 nm over 300-830 nm.
///
/// Columns: wavelength, S0, S1, S2.
const S_SERIES: [[f64; 4]; 54] = [
    [300.0, 0.04, 0.02, 0.0],
    [310.0, 6.0, 4.5, 2.0],
    [320.0, 29.6, 22.4, 4.0],
    [330.0, 55.3, 42.0, 8.5],
    [340.0, 57.3, 40.6, 7.8],
    [350.0, 61.8, 41.6, 6.7],
    [360.0, 61.5, 38.0, 5.3],
    [370.0, 68.8, 42.4, 6.1],
    [380.0, 63.4, 38.5, 3.0],
    [390.0, 65.8, 35.0, 1.2],
    [400.0, 94.8, 43.4, -1.1],
    [410.0, 104.8, 46.3, -0.5],
    [420.0, 105.9, 43.9, -0.7],
    [430.0, 96.8, 37.1, -1.2],
    [440.0, 113.9, 36.7, -2.6],
    [450.0, 125.6, 35.9, -2.9],
    [460.0, 125.5, 32.6, -2.8],
    [470.0, 121.3, 27.9, -2.6],
    [480.0, 121.3, 24.3, -2.6],
    [490.0, 113.5, 20.1, -1.8],
    [500.0, 113.1, 16.2, -1.5],
    [510.0, 110.8, 13.2, -1.3],
    [520.0, 106.5, 8.6, -1.2],
    [530.0, 108.8, 6.1, -1.0],
    [540.0, 105.3, 4.2, -0.5],
    [550.0, 104.4, 1.9, -0.3],
    [560.0, 100.0, 0.0, 0.0],
    [570.0, 96.0, -1.6, 0.2],
    [580.0, 95.1, -3.5, 0.5],
    [590.0, 89.1, -3.5, 2.1],
    [600.0, 90.5, -5.8, 3.2],
    [610.0, 90.3, -7.2, 4.1],
    [620.0, 88.4, -8.6, 4.7],
    [630.0, 84.0, -9.5, 5.1],
    [640.0, 85.1, -10.9, 6.7],
    [650.0, 81.9, -10.7, 7.3],
    [660.0, 82.6, -12.0, 8.6],
    [670.0, 84.9, -14.0, 9.8],
    [680.0, 81.3, -13.6, 10.2],
    [690.0, 71.9, -12.0, 8.3],
    [700.0, 74.3, -13.3, 9.6],
    [710.0, 76.4, -12.9, 8.5],
    [720.0, 63.3, -10.6, 7.0],
    [730.0, 71.7, -11.6, 7.6],
    [740.0, 77.0, -12.2, 8.0],
    [750.0, 65.2, -10.2, 6.7],
    [760.0, 47.7, -7.8, 5.2],
    [770.0, 68.6, -11.2, 7.4],
    [780.0, 65.0, -10.4, 6.8],
    [790.0, 66.0, -10.6, 7.0],
    [800.0, 61.0, -9.7, 6.4],
    [810.0, 53.3, -8.3, 5.5],
    [820.0, 58.9, -9.3, 6.1],
    [830.0, 61.9, -9.8, 6.5],
];

/// Chromaticity (x, y) of a daylight illuminant from its CCT, using the
/// standard CIE piecewise cubics with the pivot at 7003.77 K.
fn cct_to_xy(cct: f64) -> (f64, f64) {
    let x = if (4002.15..=7003.77).contains(&cct) {
        0.244063 + 99.11 / cct + 2.9678e6 / cct.powi(2)
            - 4.6070e9 / cct.powi(3)
    } else {
        0.237040 + 247.48 / cct + 1.9018e6 / cct.powi(2)
            - 2.0064e9 / cct.powi(3)
    };

    let y = -3.0 * x.powi(2) + 2.87 * x - 0.275;

    (x, y)
}

/// Synthesizes a CIE D-series daylight power spectrum.
///
/// `cct_input` accepts raw Kelvin (4000..=25000) or the x100 shorthand
/// (40..=250); the shorthand is corrected by 1.4387752/1.438 to account for
/// the historical value of the second radiation constant. Any other input
/// is rejected.
///
/// The result covers 380-780 nm at `step` nanometers (the step of `shape`).
pub fn daylight_spd(cct_input: i32, shape: Shape) -> SpectralResult<Spectrum> {
    let cct = if (40..=250).contains(&cct_input) {
        cct_input as f64 * 100.0 * 1.4387752 / 1.438
    } else if (4000..=25000).contains(&cct_input) {
        cct_input as f64
    } else {
        return Err(SpectralError::DaylightCctOutOfRange { cct: cct_input });
    };

    let step = shape.step;
    let table_first = S_SERIES[0][0];
    let table_last = S_SERIES[S_SERIES.len() - 1][0];
    debug_assert_eq!((table_last - table_first) % step, 0.0);

    let (x, y) = cct_to_xy(cct);
    let m0 = 0.0241 + 0.2562 * x - 0.7341 * y;
    let m1 = (-1.3515 - 1.7703 * x + 5.9114 * y) / m0;
    let m2 = (0.03000 - 31.4424 * x + 30.0717 * y) / m0;

    let wavelengths: Vec<f64> = S_SERIES.iter().map(|row| row[0]).collect();
    let s0: Vec<f64> = S_SERIES.iter().map(|row| row[1]).collect();
    let s1: Vec<f64> = S_SERIES.iter().map(|row| row[2]).collect();
    let s2: Vec<f64> = S_SERIES.iter().map(|row| row[3]).collect();

    let count = ((table_last - table_first) / step) as usize + 1;
    let queries: Vec<f64> =
        (0..count).map(|i| table_first + step * i as f64).collect();

    let s0i = interp_linear(&wavelengths, &s0, &queries);
    let s1i = interp_linear(&wavelengths, &s1, &queries);
    let s2i = interp_linear(&wavelengths, &s2, &queries);

    let out_shape = Shape { first: 380.0, last: 780.0, step };
    let mut spectrum = Spectrum { shape: out_shape, values: Vec::new() };

    for i in 0..count {
        let wavelength = queries[i];
        if (380.0..=780.0).contains(&wavelength) {
            spectrum.values.push(s0i[i] + m1 * s1i[i] + m2 * s2i[i]);
        }
    }

    Ok(spectrum)
}

/// Synthesizes a Planckian blackbody power spectrum over 380-780 nm at
/// 5 nm, for CCTs in 1500..<4000 K.
pub fn blackbody_spd(cct: i32) -> SpectralResult<Spectrum> {
    if !(1500..4000).contains(&cct) {
        return Err(SpectralError::BlackbodyCctOutOfRange { cct });
    }

    let mut spectrum = Spectrum {
        shape: REFERENCE_SHAPE,
        values: Vec::with_capacity(REFERENCE_SHAPE.sample_count()),
    };

    let mut wavelength = 380;
    while wavelength <= 780 {
        let lambda = wavelength as f64 / 1e9;
        let c1 = 2.0 * PLANCK * LIGHT_SPEED.powi(2);
        let c2 = PLANCK * LIGHT_SPEED
            / (BOLTZMANN * lambda * cct as f64);
        spectrum.values.push(
            c1 * std::f64::consts::PI
                / (lambda.powi(5) * (c2.exp() - 1.0)),
        );
        wavelength += 5;
    }

    Ok(spectrum)
}

/// Generates an illuminant [`SpectralData`] of the given kind and CCT.
///
/// The result holds a single `"power"` channel in the `"main"` set and
/// carries `type_name` (lowercase `d{n}` / `{n}k` labels by convention).
pub fn generate_illuminant(
    cct: i32,
    type_name: &str,
    kind: IlluminantKind,
) -> SpectralResult<SpectralData> {
    let spectrum = match kind {
        IlluminantKind::Daylight => daylight_spd(cct, REFERENCE_SHAPE)?,
        IlluminantKind::Blackbody => blackbody_spd(cct)?,
    };

    let mut set = SpectralSet::new();
    set.push(("power".to_string(), spectrum));

    let mut data = SpectralData {
        type_name: type_name.to_string(),
        ..Default::default()
    };
    data.data.insert("main".to_string(), set);

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daylight_d65_shorthand() {
        let spd = daylight_spd(65, REFERENCE_SHAPE).unwrap();
        assert_eq!(spd.shape, REFERENCE_SHAPE);
        assert_eq!(spd.values.len(), 81);
        assert!(spd.values.iter().all(|v| v.is_finite()));
        assert!(spd.integrate() > 0.0);
    }

    #[test]
    fn test_daylight_raw_kelvin() {
        let spd = daylight_spd(6500, REFERENCE_SHAPE).unwrap();
        assert_eq!(spd.values.len(), 81);
        // The shorthand applies a small radiation-constant correction, so
        // D65 via "65" and via "6500" differ slightly but stay close.
        let shorthand = daylight_spd(65, REFERENCE_SHAPE).unwrap();
        let diff: f64 = spd
            .values
            .iter()
            .zip(shorthand.values.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff / 81.0 < 1.0);
    }

    #[test]
    fn test_daylight_rejects_out_of_band() {
        assert!(matches!(
            daylight_spd(3000, REFERENCE_SHAPE),
            Err(SpectralError::DaylightCctOutOfRange { cct: 3000 })
        ));
        assert!(matches!(
            daylight_spd(30000, REFERENCE_SHAPE),
            Err(SpectralError::DaylightCctOutOfRange { .. })
        ));
        assert!(matches!(
            daylight_spd(0, REFERENCE_SHAPE),
            Err(SpectralError::DaylightCctOutOfRange { .. })
        ));
    }

    #[test]
    fn test_blackbody_3200k() {
        let spd = blackbody_spd(3200).unwrap();
        assert_eq!(spd.values.len(), 81);
        assert!(spd.values.iter().all(|v| v.is_finite() && *v > 0.0));
        // Wien peak for 3200 K sits above 780 nm, so the spectrum is
        // monotonically increasing and peaks at the last sample.
        let max = spd.max();
        assert_eq!(max, *spd.values.last().unwrap());
    }

    #[test]
    fn test_blackbody_rejects_out_of_band() {
        assert!(matches!(
            blackbody_spd(1000),
            Err(SpectralError::BlackbodyCctOutOfRange { cct: 1000 })
        ));
        assert!(blackbody_spd(4000).is_err());
        assert!(blackbody_spd(1500).is_ok());
        assert!(blackbody_spd(3999).is_ok());
    }

    #[test]
    fn test_generate_illuminant_layout() {
        let illuminant =
            generate_illuminant(5500, "d55", IlluminantKind::Daylight)
                .unwrap();
        assert_eq!(illuminant.type_name, "d55");
        assert_eq!(illuminant.main_channel_count(), 1);
        let power = illuminant.channel("power").unwrap();
        assert_eq!(power.values.len(), 81);
    }

    #[test]
    fn test_daylight_chromaticity_pivot() {
        // Both cubics agree closely at the 7003.77 K pivot.
        let (x_low, _) = cct_to_xy(7003.77);
        let (x_high, _) = cct_to_xy(7003.78);
        assert!((x_low - x_high).abs() < 1e-4);
    }
}
