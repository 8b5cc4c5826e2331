//! RON files for solver settings (`*.vrik.ron`) and skeleton bind poses
//! (`*.skn.ron`).

use std::path::Path;

use bevy_log::debug;
use bevy_vr_ik_core::skeleton::{Skeleton, SkeletonSerial};

use crate::{errors::AssetLoadError, settings::VrIkSettings};

pub const SETTINGS_EXTENSION: &str = "vrik.ron";
pub const SKELETON_EXTENSION: &str = "skn.ron";

/// Parses and validates settings.
pub fn settings_from_bytes(bytes: &[u8]) -> Result<VrIkSettings, AssetLoadError> {
    let settings: VrIkSettings = ron::de::from_bytes(bytes)?;
    settings.validate()?;
    Ok(settings)
}

pub fn settings_from_str(text: &str) -> Result<VrIkSettings, AssetLoadError> {
    settings_from_bytes(text.as_bytes())
}

pub fn load_settings(path: impl AsRef<Path>) -> Result<VrIkSettings, AssetLoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let settings = settings_from_bytes(&bytes)?;
    debug!("Loaded VR IK settings from {}", path.display());
    Ok(settings)
}

pub fn settings_to_string(settings: &VrIkSettings) -> Result<String, AssetLoadError> {
    Ok(ron::ser::to_string_pretty(
        settings,
        ron::ser::PrettyConfig::default(),
    )?)
}

pub fn skeleton_from_bytes(bytes: &[u8]) -> Result<Skeleton, AssetLoadError> {
    let serial: SkeletonSerial = ron::de::from_bytes(bytes)?;
    Ok(Skeleton::try_from(&serial)?)
}

pub fn load_skeleton(path: impl AsRef<Path>) -> Result<Skeleton, AssetLoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let skeleton = skeleton_from_bytes(&bytes)?;
    debug!("Loaded skeleton with {} bones from {}", skeleton.len(), path.display());
    Ok(skeleton)
}

#[cfg(test)]
mod test {
    use bevy_vr_ik_core::{curve::FloatCurve, errors::ConfigurationError};

    use super::*;
    use crate::settings::{LocomotionMode, ShoulderRotationMode};

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings = settings_from_str(
            "(
                scale: 1.1,
                spine: (min_head_height: 0.7),
                locomotion: (mode: Animated),
            )",
        )
        .unwrap();

        assert_eq!(settings.scale, 1.1);
        assert_eq!(settings.spine.min_head_height, 0.7);
        assert_eq!(settings.spine.body_pos_stiffness, 0.55);
        assert_eq!(settings.locomotion.mode, LocomotionMode::Animated);
        assert_eq!(settings.locomotion.animated.stop_debounce, 0.05);
        assert!(settings.plant_feet);
    }

    #[test]
    fn test_settings_round_trip() {
        let mut settings = VrIkSettings::default();
        settings.lod = 1;
        settings.left_arm.shoulder_rotation_mode = ShoulderRotationMode::FromTo;
        settings.right_leg.stretch_curve = FloatCurve::linear(&[(0.0, 1.0), (1.0, 1.25)]);
        settings.locomotion.animated.stop_transition_tag = "Stop".into();

        let text = settings_to_string(&settings).unwrap();
        let loaded = settings_from_str(&text).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let err = settings_from_str("(scale: -2.0)").unwrap_err();
        assert!(matches!(
            err,
            AssetLoadError::Configuration(ConfigurationError::InvalidScale(_))
        ));

        let err = settings_from_str(
            "(locomotion: (procedural: (step_height: [
                (time: 0.5, value: 0.05),
                (time: 0.0, value: 0.0),
            ])))",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AssetLoadError::Configuration(ConfigurationError::UnsortedCurve("procedural.step_height"))
        ));

        let err = settings_from_str("(scale: ").unwrap_err();
        assert!(matches!(err, AssetLoadError::RonSpannedError(_)));
    }

    #[test]
    fn test_skeleton_from_ron() {
        let skeleton = skeleton_from_bytes(
            br#"(
                bones: [
                    (name: "root"),
                    (name: "hips", parent: Some("root"), translation: (0.0, 1.0, 0.0)),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(skeleton.len(), 2);
        assert_eq!(skeleton.parent(1), Some(0));

        let err = skeleton_from_bytes(br#"(bones: [(name: "a", parent: Some("b"))])"#).unwrap_err();
        assert!(matches!(
            err,
            AssetLoadError::Configuration(ConfigurationError::UnknownBone(_))
        ));
    }
}
