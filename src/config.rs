//! Edit session settings.

use serde::{Deserialize, Serialize};

use crate::edit::history::DEFAULT_MAX_UNDO;
use crate::error::{EditError, Result};

/// Smallest and largest brush size, in voxels.
pub const SELECTION_SIZE_RANGE: (u32, u32) = (1, 100);

/// Smallest and largest search radius, in world units.
pub const SEARCH_RADIUS_RANGE: (f64, f64) = (0.01, 200.0);

/// Settings of an [`EditSession`](crate::edit::EditSession).
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditSettings {
    /// Brush size in voxels along each edited axis.
    pub selection_size: u32,
    /// Brush and select-by-value operate in 3D instead of on one slice.
    pub selection_is_3d: bool,
    /// Value written by fills.
    pub fill_value: f32,
    /// Value written by erases.
    pub erase_value: f32,
    /// Brush strokes write to the image directly when they end.
    pub draw_mode: bool,
    /// Select-by-value tolerance.
    pub intensity_threshold: f32,
    /// Select-by-value only selects voxels connected to the seed.
    pub local_fill: bool,
    /// Select-by-value is limited to `search_radius` around the seed.
    pub limit_to_radius: bool,
    /// Select-by-value search radius in world units.
    pub search_radius: f64,
    /// Number of change groups kept for undo.
    pub max_undo_groups: usize,
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            selection_size: 3,
            selection_is_3d: false,
            fill_value: 1.0,
            erase_value: 0.0,
            draw_mode: true,
            intensity_threshold: 0.0,
            local_fill: false,
            limit_to_radius: false,
            search_radius: 0.0,
            max_undo_groups: DEFAULT_MAX_UNDO,
        }
    }
}

impl EditSettings {
    /// Parses settings from JSON and validates them.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = SELECTION_SIZE_RANGE;
        if !(lo..=hi).contains(&self.selection_size) {
            return Err(EditError::InvalidArgument(format!(
                "selection_size {} outside {lo}..={hi}",
                self.selection_size
            )));
        }
        if !self.fill_value.is_finite() || !self.erase_value.is_finite() {
            return Err(EditError::InvalidArgument(
                "fill and erase values must be finite".into(),
            ));
        }
        if self.intensity_threshold.is_nan() || self.intensity_threshold < 0.0 {
            return Err(EditError::InvalidArgument(format!(
                "intensity_threshold {} must be non-negative",
                self.intensity_threshold
            )));
        }
        if !(0.0..=SEARCH_RADIUS_RANGE.1).contains(&self.search_radius) {
            return Err(EditError::InvalidArgument(format!(
                "search_radius {} outside 0..={}",
                self.search_radius, SEARCH_RADIUS_RANGE.1
            )));
        }
        if self.max_undo_groups == 0 {
            return Err(EditError::InvalidArgument("max_undo_groups must be at least 1".into()));
        }
        Ok(())
    }

    /// Search radius used for select-by-value, if radius limiting is on.
    pub fn effective_search_radius(&self) -> Option<f64> {
        self.limit_to_radius
            .then(|| self.search_radius.clamp(SEARCH_RADIUS_RANGE.0, SEARCH_RADIUS_RANGE.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EditSettings::default();
        assert_eq!(settings.selection_size, 3);
        assert!(settings.draw_mode);
        assert_eq!(settings.max_undo_groups, 100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = EditSettings::from_json(r#"{"selection_size": 7, "local_fill": true}"#).unwrap();
        assert_eq!(settings.selection_size, 7);
        assert!(settings.local_fill);
        assert_eq!(settings.fill_value, 1.0);
    }

    #[test]
    fn test_json_round_trip() {
        let settings = EditSettings {
            fill_value: 4.5,
            limit_to_radius: true,
            search_radius: 12.5,
            ..EditSettings::default()
        };
        let json = settings.to_json().unwrap();
        assert_eq!(EditSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            EditSettings::from_json("{selection_size: }"),
            Err(EditError::Config(_))
        ));
    }

    #[test]
    fn test_validation() {
        assert!(EditSettings::from_json(r#"{"selection_size": 0}"#).is_err());
        assert!(EditSettings::from_json(r#"{"selection_size": 101}"#).is_err());
        assert!(EditSettings::from_json(r#"{"intensity_threshold": -1.0}"#).is_err());
        assert!(EditSettings::from_json(r#"{"search_radius": 500.0}"#).is_err());
        assert!(EditSettings::from_json(r#"{"max_undo_groups": 0}"#).is_err());
    }

    #[test]
    fn test_effective_search_radius() {
        let mut settings = EditSettings::default();
        assert_eq!(settings.effective_search_radius(), None);

        settings.limit_to_radius = true;
        assert_eq!(settings.effective_search_radius(), Some(0.01));
        settings.search_radius = 25.0;
        assert_eq!(settings.effective_search_radius(), Some(25.0));
    }
}
