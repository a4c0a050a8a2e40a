//! Keyed collections of spectral curves and their JSON loader.
//!
//! A [`SpectralData`] maps set names to ordered channel lists. The canonical
//! set is `"main"`: camera files carry `R`/`G`/`B` there, observer files
//! `X`/`Y`/`Z`, illuminant files a single `power` channel, and training
//! files one channel per reflectance patch.
//!
//! The on-disk format is the database JSON layout: a `header` object of
//! string metadata and a `spectral_data` object holding an `index` (set name
//! to channel names) and `data` (set name to wavelength-keyed value rows).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{
    Spectrum, SpectralError, SpectralResult, Shape, EMPTY_SHAPE,
};

/// A named spectral channel: one curve in an RGB or XYZ triplet.
pub type SpectralChannel = (String, Spectrum);

/// An ordered list of spectral channels, like an RGB or XYZ triplet.
///
/// Order matters for presentation and tie-breaking; lookups go by name.
pub type SpectralSet = Vec<SpectralChannel>;

/// Spectral curves with header metadata, loaded from a database JSON file
/// or synthesized (see [`crate::illuminant`]).
///
/// After loading, all curves across all sets share a single [`Shape`].
#[derive(Debug, Clone, Default)]
pub struct SpectralData {
    /// Device manufacturer, e.g. a camera maker.
    pub manufacturer: String,
    /// Device model.
    pub model: String,
    /// Data type tag; illuminants carry their type token here (e.g. "d65").
    pub type_name: String,
    /// Free-form description.
    pub description: String,
    /// Document author.
    pub document_creator: String,
    /// Unique document identifier.
    pub unique_identifier: String,
    /// Measurement equipment note.
    pub measurement_equipment: String,
    /// Measuring laboratory.
    pub laboratory: String,
    /// Document creation date.
    pub creation_date: String,
    /// Free-form comments.
    pub comments: String,
    /// License string.
    pub license: String,

    /// Measurement units.
    pub units: String,
    /// Reflection measurement geometry.
    pub reflection_geometry: String,
    /// Transmission measurement geometry.
    pub transmission_geometry: String,
    /// Bandwidth FWHM note.
    pub bandwidth_fwhm: String,
    /// Bandwidth-corrected flag note.
    pub bandwidth_corrected: String,

    /// The spectral data storage, keyed by set name.
    pub data: BTreeMap<String, SpectralSet>,
}

/// Raw header block as it appears in the file.
#[derive(Debug, Default, Deserialize)]
struct RawHeader {
    manufacturer: Option<String>,
    model: Option<String>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    illuminant: Option<String>,
    schema_version: Option<String>,
    description: Option<String>,
    document_creator: Option<String>,
    unique_identifier: Option<String>,
    measurement_equipment: Option<String>,
    laboratory: Option<String>,
    document_creation_date: Option<String>,
    comments: Option<String>,
    license: Option<String>,
}

/// Raw spectral_data block as it appears in the file.
#[derive(Debug, Default, Deserialize)]
struct RawSpectralBlock {
    units: Option<String>,
    reflection_geometry: Option<String>,
    transmission_geometry: Option<String>,
    #[serde(rename = "bandwidth_FWHM")]
    bandwidth_fwhm: Option<String>,
    bandwidth_corrected: Option<String>,
    #[serde(default)]
    index: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    data: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    header: RawHeader,
    #[serde(default)]
    spectral_data: RawSpectralBlock,
}

impl SpectralData {
    /// Loads a spectral data file.
    ///
    /// With `reshape = true` (the database default) every curve is reduced
    /// to the reference 380-780 nm / 5 nm grid after loading.
    ///
    /// # Errors
    ///
    /// Returns [`SpectralError::Json`] for malformed files,
    /// [`SpectralError::InconsistentStep`] when a set's wavelength bins are
    /// not regularly spaced, and [`SpectralError::ChannelCountMismatch`]
    /// when a bin's value count disagrees with the set's index entry.
    pub fn load(
        path: impl AsRef<Path>,
        reshape: bool,
    ) -> SpectralResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let raw: RawFile =
            serde_json::from_str(&text).map_err(|source| {
                SpectralError::Json { path: path.to_path_buf(), source }
            })?;

        let h = raw.header;
        let mut out = SpectralData {
            manufacturer: h.manufacturer.unwrap_or_default(),
            model: h.model.unwrap_or_default(),
            type_name: h.type_name.unwrap_or_default(),
            description: h.description.unwrap_or_default(),
            document_creator: h.document_creator.unwrap_or_default(),
            unique_identifier: h.unique_identifier.unwrap_or_default(),
            measurement_equipment: h
                .measurement_equipment
                .unwrap_or_default(),
            laboratory: h.laboratory.unwrap_or_default(),
            creation_date: h.document_creation_date.unwrap_or_default(),
            comments: h.comments.unwrap_or_default(),
            license: h.license.unwrap_or_default(),
            units: raw.spectral_data.units.unwrap_or_default(),
            reflection_geometry: raw
                .spectral_data
                .reflection_geometry
                .unwrap_or_default(),
            transmission_geometry: raw
                .spectral_data
                .transmission_geometry
                .unwrap_or_default(),
            bandwidth_fwhm: raw.spectral_data.bandwidth_fwhm.unwrap_or_default(),
            bandwidth_corrected: raw
                .spectral_data
                .bandwidth_corrected
                .unwrap_or_default(),
            data: BTreeMap::new(),
        };

        // Schema 0.1.0 kept the illuminant type under 'header/illuminant';
        // later schemas use 'header/type'. Type takes precedence if present.
        if out.type_name.is_empty()
            && h.schema_version.as_deref() == Some("0.1.0")
        {
            out.type_name = h.illuminant.unwrap_or_default();
        }

        let mut shape: Option<Shape> = None;

        for (set_name, channel_names) in &raw.spectral_data.index {
            let mut set: SpectralSet = channel_names
                .iter()
                .map(|name| (name.clone(), Spectrum::new(0.0, EMPTY_SHAPE)))
                .collect();

            if let Some(bins) = raw.spectral_data.data.get(set_name) {
                // Wavelength keys arrive as strings; order them numerically.
                let mut rows: Vec<(f64, &Vec<f64>)> = Vec::new();
                for (key, values) in bins {
                    let wavelength: f64 =
                        key.parse().map_err(|_| {
                            SpectralError::InvalidWavelength {
                                path: path.to_path_buf(),
                                key: key.clone(),
                            }
                        })?;
                    rows.push((wavelength, values));
                }
                rows.sort_by(|a, b| a.0.total_cmp(&b.0));

                let set_shape =
                    check_bins(path, set_name, set.len(), &rows, shape)?;
                shape = Some(set_shape);

                for (_, values) in &rows {
                    for (channel, value) in set.iter_mut().zip(values.iter())
                    {
                        channel.1.values.push(*value);
                    }
                }
            }

            out.data.insert(set_name.clone(), set);
        }

        if let Some(shape) = shape {
            for set in out.data.values_mut() {
                for (_, spectrum) in set.iter_mut() {
                    spectrum.shape = shape;
                    if reshape {
                        spectrum.reshape();
                    }
                }
            }
        }

        Ok(out)
    }

    /// Returns the spectrum of `channel` within `set`.
    pub fn get(&self, set: &str, channel: &str) -> SpectralResult<&Spectrum> {
        let set_data = self.data.get(set).ok_or_else(|| {
            SpectralError::SetNotFound { set: set.to_string() }
        })?;
        set_data
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, spectrum)| spectrum)
            .ok_or_else(|| SpectralError::ChannelNotFound {
                set: set.to_string(),
                channel: channel.to_string(),
            })
    }

    /// Returns the mutable spectrum of `channel` within `set`.
    pub fn get_mut(
        &mut self,
        set: &str,
        channel: &str,
    ) -> SpectralResult<&mut Spectrum> {
        let set_data = self.data.get_mut(set).ok_or_else(|| {
            SpectralError::SetNotFound { set: set.to_string() }
        })?;
        set_data
            .iter_mut()
            .find(|(name, _)| name == channel)
            .map(|(_, spectrum)| spectrum)
            .ok_or_else(|| SpectralError::ChannelNotFound {
                set: set.to_string(),
                channel: channel.to_string(),
            })
    }

    /// Returns the spectrum of `channel` within the `"main"` set.
    pub fn channel(&self, channel: &str) -> SpectralResult<&Spectrum> {
        self.get("main", channel)
    }

    /// Number of channels in the `"main"` set, or 0 if absent.
    pub fn main_channel_count(&self) -> usize {
        self.data.get("main").map_or(0, Vec::len)
    }
}

/// Validates a set's wavelength bins: regular step, consistent with any
/// previously established shape, and the right value count per bin.
fn check_bins(
    path: &Path,
    set_name: &str,
    channel_count: usize,
    rows: &[(f64, &Vec<f64>)],
    prior: Option<Shape>,
) -> SpectralResult<Shape> {
    let mut shape = prior.unwrap_or(EMPTY_SHAPE);
    let mut prev: Option<f64> = None;

    for (wavelength, values) in rows {
        if values.len() != channel_count {
            return Err(SpectralError::ChannelCountMismatch {
                path: path.to_path_buf(),
                set: set_name.to_string(),
                expected: channel_count,
                got: values.len(),
            });
        }

        if let Some(prev) = prev {
            let step = wavelength - prev;
            if shape.step != 0.0 && (step - shape.step).abs() > 1e-6 {
                return Err(SpectralError::InconsistentStep {
                    path: path.to_path_buf(),
                    expected: shape.step,
                    got: step,
                });
            }
            shape.step = step;
        } else if prior.is_none() {
            shape.first = *wavelength;
        }

        prev = Some(*wavelength);
    }

    if let Some(last) = prev {
        if prior.is_none() {
            shape.last = last;
        }
    }
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::REFERENCE_SHAPE;

    fn make_data() -> SpectralData {
        let mut data = SpectralData {
            manufacturer: "manufacturer".into(),
            model: "model".into(),
            ..Default::default()
        };
        let mut set = SpectralSet::new();
        for name in ["R", "G", "B"] {
            set.push((name.into(), Spectrum::new(1.0, REFERENCE_SHAPE)));
        }
        data.data.insert("main".into(), set);
        data
    }

    #[test]
    fn test_channel_lookup() {
        let data = make_data();
        assert!(data.channel("R").is_ok());
        assert!(data.get("main", "G").is_ok());
        assert_eq!(data.main_channel_count(), 3);
    }

    #[test]
    fn test_missing_channel_errors() {
        let data = make_data();
        assert!(matches!(
            data.channel("power"),
            Err(SpectralError::ChannelNotFound { .. })
        ));
        assert!(matches!(
            data.get("secondary", "R"),
            Err(SpectralError::SetNotFound { .. })
        ));
    }

    #[test]
    fn test_channel_names_are_case_sensitive() {
        let data = make_data();
        assert!(data.channel("r").is_err());
    }
}
