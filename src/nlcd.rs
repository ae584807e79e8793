//! NLCD land-cover legend.
//!
//! Class codes follow the National Land Cover Database convention used by
//! the land-cover rasters this pipeline consumes.

/// Class code to descriptive name, in legend order.
pub const NLCD_CLASSES: &[(i32, &str)] = &[
    (11, "Open Water"),
    (12, "Perennial Ice/Snow"),
    (21, "Developed, Open Space"),
    (22, "Developed, Low Intensity"),
    (23, "Developed, Medium Intensity"),
    (24, "Developed, High Intensity"),
    (31, "Barren Land (Rock/Sand/Clay)"),
    (41, "Deciduous Forest"),
    (42, "Evergreen Forest"),
    (43, "Mixed Forest"),
    (51, "Dwarf Scrub"),
    (52, "Shrub/Scrub"),
    (71, "Grassland/Herbaceous"),
    (72, "Sedge/Herbaceous"),
    (73, "Lichens"),
    (74, "Moss"),
    (81, "Pasture/Hay"),
    (82, "Cultivated Crops"),
    (90, "Woody Wetlands"),
    (95, "Emergent Herbaceous Wetlands"),
];

/// Label used for codes missing from the legend.
pub const UNKNOWN_CLASS: &str = "Unknown";

/// Descriptive name for a class code, if the legend knows it.
pub fn class_name(code: i32) -> Option<&'static str> {
    NLCD_CLASSES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Descriptive name for a class code, falling back to [`UNKNOWN_CLASS`].
pub fn class_label(code: i32) -> &'static str {
    class_name(code).unwrap_or(UNKNOWN_CLASS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_classes() {
        assert_eq!(class_name(11), Some("Open Water"));
        assert_eq!(class_name(21), Some("Developed, Open Space"));
        assert_eq!(class_name(95), Some("Emergent Herbaceous Wetlands"));
    }

    #[test]
    fn test_unknown_class_falls_back() {
        assert_eq!(class_name(99), None);
        assert_eq!(class_label(99), UNKNOWN_CLASS);
    }
}
