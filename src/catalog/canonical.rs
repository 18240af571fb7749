//! Static `(metric, spec, filter)` → canonical metric name table.

/// One row of the canonical name table.
pub(super) struct CanonicalEntry {
    pub metric: &'static str,
    pub spec: Option<&'static str>,
    pub filter: Option<&'static str>,
    pub name: &'static str,
}

const fn entry(
    metric: &'static str,
    spec: Option<&'static str>,
    filter: Option<&'static str>,
    name: &'static str,
) -> CanonicalEntry {
    CanonicalEntry {
        metric,
        spec,
        filter,
        name,
    }
}

const MIN: Option<&str> = Some("minimum");
const DES: Option<&str> = Some("design");
const STR: Option<&str> = Some("stretch");

// Photometric requirements are specified per filter group: `gri` and `uzy`.
pub(super) const CANONICAL_NAMES: &[CanonicalEntry] = &[
    entry("PA1", None, None, "validate_drp.PA1"),
    entry("PA2", MIN, Some("g"), "validate_drp.PA2_minimum_gri"),
    entry("PA2", MIN, Some("r"), "validate_drp.PA2_minimum_gri"),
    entry("PA2", MIN, Some("i"), "validate_drp.PA2_minimum_gri"),
    entry("PA2", MIN, Some("u"), "validate_drp.PA2_minimum_uzy"),
    entry("PA2", MIN, Some("z"), "validate_drp.PA2_minimum_uzy"),
    entry("PA2", MIN, Some("y"), "validate_drp.PA2_minimum_uzy"),
    entry("PA2", DES, Some("g"), "validate_drp.PA2_design_gri"),
    entry("PA2", DES, Some("r"), "validate_drp.PA2_design_gri"),
    entry("PA2", DES, Some("i"), "validate_drp.PA2_design_gri"),
    entry("PA2", DES, Some("u"), "validate_drp.PA2_design_uzy"),
    entry("PA2", DES, Some("z"), "validate_drp.PA2_design_uzy"),
    entry("PA2", DES, Some("y"), "validate_drp.PA2_design_uzy"),
    entry("PA2", STR, Some("g"), "validate_drp.PA2_stretch_gri"),
    entry("PA2", STR, Some("r"), "validate_drp.PA2_stretch_gri"),
    entry("PA2", STR, Some("i"), "validate_drp.PA2_stretch_gri"),
    entry("PA2", STR, Some("u"), "validate_drp.PA2_stretch_uzy"),
    entry("PA2", STR, Some("z"), "validate_drp.PA2_stretch_uzy"),
    entry("PA2", STR, Some("y"), "validate_drp.PA2_stretch_uzy"),
    entry("PF1", MIN, Some("g"), "validate_drp.PF1_minimum_gri"),
    entry("PF1", MIN, Some("r"), "validate_drp.PF1_minimum_gri"),
    entry("PF1", MIN, Some("i"), "validate_drp.PF1_minimum_gri"),
    entry("PF1", MIN, Some("u"), "validate_drp.PF1_minimum_uzy"),
    entry("PF1", MIN, Some("z"), "validate_drp.PF1_minimum_uzy"),
    entry("PF1", MIN, Some("y"), "validate_drp.PF1_minimum_uzy"),
    entry("PF1", DES, Some("g"), "validate_drp.PF1_design_gri"),
    entry("PF1", DES, Some("r"), "validate_drp.PF1_design_gri"),
    entry("PF1", DES, Some("i"), "validate_drp.PF1_design_gri"),
    entry("PF1", DES, Some("u"), "validate_drp.PF1_design_uzy"),
    entry("PF1", DES, Some("z"), "validate_drp.PF1_design_uzy"),
    entry("PF1", DES, Some("y"), "validate_drp.PF1_design_uzy"),
    entry("PF1", STR, Some("g"), "validate_drp.PF1_stretch_gri"),
    entry("PF1", STR, Some("r"), "validate_drp.PF1_stretch_gri"),
    entry("PF1", STR, Some("i"), "validate_drp.PF1_stretch_gri"),
    entry("PF1", STR, Some("u"), "validate_drp.PF1_stretch_uzy"),
    entry("PF1", STR, Some("z"), "validate_drp.PF1_stretch_uzy"),
    entry("PF1", STR, Some("y"), "validate_drp.PF1_stretch_uzy"),
    entry("AM1", None, None, "validate_drp.AM1"),
    entry("AM2", None, None, "validate_drp.AM2"),
    entry("AM3", None, None, "validate_drp.AM3"),
    entry("AF1", MIN, None, "validate_drp.AF1_minimum"),
    entry("AF1", DES, None, "validate_drp.AF1_design"),
    entry("AF1", STR, None, "validate_drp.AF1_stretch"),
    entry("AF2", MIN, None, "validate_drp.AF2_minimum"),
    entry("AF2", DES, None, "validate_drp.AF2_design"),
    entry("AF2", STR, None, "validate_drp.AF2_stretch"),
    entry("AF3", MIN, None, "validate_drp.AF3_minimum"),
    entry("AF3", DES, None, "validate_drp.AF3_design"),
    entry("AF3", STR, None, "validate_drp.AF3_stretch"),
    entry("AD1", MIN, None, "validate_drp.AD1_minimum"),
    entry("AD1", DES, None, "validate_drp.AD1_design"),
    entry("AD1", STR, None, "validate_drp.AD1_stretch"),
    entry("AD2", MIN, None, "validate_drp.AD2_minimum"),
    entry("AD2", DES, None, "validate_drp.AD2_design"),
    entry("AD2", STR, None, "validate_drp.AD2_stretch"),
    entry("AD3", MIN, None, "validate_drp.AD3_minimum"),
    entry("AD3", DES, None, "validate_drp.AD3_design"),
    entry("AD3", STR, None, "validate_drp.AD3_stretch"),
    entry("TE1", None, None, "validate_drp.TE1"),
    entry("TE2", None, None, "validate_drp.TE2"),
];
