//! Approximate 2-D positions of 10-20 / 10-10 electrodes.
//!
//! Positions are an azimuthal projection seen from above: Cz at the origin,
//! nose towards +y, right ear towards +x, and the Fpz-T7-Oz-T8 ring at radius 0.8.

/// (label, radius, angle in degrees counter-clockwise from +x)
const POLAR_POSITIONS: &[(&str, f64, f64)] = &[
    ("Nz", 1.0, 90.0),
    ("Fpz", 0.8, 90.0),
    ("Fp1", 0.8, 108.0),
    ("Fp2", 0.8, 72.0),
    ("AF7", 0.8, 126.0),
    ("AF3", 0.62, 112.0),
    ("AFz", 0.6, 90.0),
    ("AF4", 0.62, 68.0),
    ("AF8", 0.8, 54.0),
    ("F7", 0.8, 144.0),
    ("F3", 0.5, 130.0),
    ("Fz", 0.4, 90.0),
    ("F4", 0.5, 50.0),
    ("F8", 0.8, 36.0),
    ("FT7", 0.8, 162.0),
    ("FC3", 0.45, 153.0),
    ("FCz", 0.2, 90.0),
    ("FC4", 0.45, 27.0),
    ("FT8", 0.8, 18.0),
    ("T7", 0.8, 180.0),
    ("C5", 0.6, 180.0),
    ("C3", 0.4, 180.0),
    ("C1", 0.2, 180.0),
    ("Cz", 0.0, 0.0),
    ("C2", 0.2, 0.0),
    ("C4", 0.4, 0.0),
    ("C6", 0.6, 0.0),
    ("T8", 0.8, 0.0),
    ("TP7", 0.8, 198.0),
    ("CP3", 0.45, 207.0),
    ("CPz", 0.2, 270.0),
    ("CP4", 0.45, 333.0),
    ("TP8", 0.8, 342.0),
    ("P7", 0.8, 216.0),
    ("P3", 0.5, 230.0),
    ("Pz", 0.4, 270.0),
    ("P4", 0.5, 310.0),
    ("P8", 0.8, 324.0),
    ("PO7", 0.8, 234.0),
    ("PO3", 0.62, 248.0),
    ("POz", 0.6, 270.0),
    ("PO4", 0.62, 292.0),
    ("PO8", 0.8, 306.0),
    ("O1", 0.8, 252.0),
    ("Oz", 0.8, 270.0),
    ("O2", 0.8, 288.0),
    ("Iz", 1.0, 270.0),
];

/// Old 10-20 names still found in exports.
const ALIASES: &[(&str, &str)] = &[("T3", "T7"), ("T4", "T8"), ("T5", "P7"), ("T6", "P8")];

/// Case-insensitive lookup of an electrode position.
pub fn standard_1020_position(label: &str) -> Option<(f64, f64)> {
    let label = label.trim();
    let canonical = ALIASES
        .iter()
        .find(|(old, _)| old.eq_ignore_ascii_case(label))
        .map(|(_, new)| *new)
        .unwrap_or(label);
    POLAR_POSITIONS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(canonical))
        .map(|(_, radius, angle)| {
            let theta = angle.to_radians();
            (radius * theta.cos(), radius * theta.sin())
        })
}
