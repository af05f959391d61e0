/// Column-name constants for the crop-shocks tables.
/// Single source of truth - exported to Python via PyO3.

// ── Production columns ──────────────────────────────────────────────────────
pub mod production {
    pub const COUNTRY: &str = "country";
    pub const CROP: &str = "crop";
    pub const YEAR: &str = "year";
    /// Production weight in tonnes.
    pub const PRODUCTION: &str = "production";

    pub const ALL: [&str; 4] = [COUNTRY, CROP, YEAR, PRODUCTION];
}

// ── Calorie columns ─────────────────────────────────────────────────────────
pub mod calories {
    /// Prefix of the per-crop calorie columns, e.g. `calories_Wheat`.
    pub const PREFIX: &str = "calories_";

    pub fn column_for(crop: &str) -> String {
        format!("{PREFIX}{crop}")
    }
}

// ── Country-year series columns ─────────────────────────────────────────────
pub mod series {
    pub const COUNTRY: &str = "country";
    pub const YEAR: &str = "year";
    pub const TOTAL_CALORIES: &str = "total_calories";
}

// ── Baseline columns ────────────────────────────────────────────────────────
pub mod baseline {
    pub const COUNTRY: &str = "country";
    pub const YEAR: &str = "year";
    pub const BASELINE: &str = "baseline";
}

// ── Shock columns ───────────────────────────────────────────────────────────
pub mod shocks {
    pub const COUNTRY: &str = "country";
    pub const YEAR: &str = "year";
    pub const ACTUAL: &str = "actual";
    pub const BASELINE: &str = "baseline";
    pub const RELATIVE_DEVIATION: &str = "relative_deviation";
    pub const IS_SHOCK: &str = "is_shock";
}

// ── Summary columns ─────────────────────────────────────────────────────────
pub mod summary {
    pub const COUNTRY: &str = "country";
    /// Replaces `country` when a caller-supplied grouping is used.
    pub const GROUP: &str = "group";
    pub const SHOCK_COUNT: &str = "shock_count";
    pub const MEAN_MAGNITUDE: &str = "mean_magnitude";
    pub const MAX_MAGNITUDE: &str = "max_magnitude";
    pub const FIRST_YEAR: &str = "first_year";
    pub const LAST_YEAR: &str = "last_year";
    pub const YEARS_COVERED: &str = "years_covered";
}

// ── Largest shock columns ───────────────────────────────────────────────────
pub mod largest {
    pub const COUNTRY: &str = "country";
    pub const LARGEST_SHOCK: &str = "largest_shock";
    pub const YEAR_OF_SHOCK: &str = "year_of_shock";
}

// ── Correlation columns ─────────────────────────────────────────────────────
pub mod correlation {
    pub const COUNTRY: &str = "country";
    /// Spearman correlation with the rest of the world.
    pub const CORRELATION: &str = "correlation";
}

// ── Annotation columns ──────────────────────────────────────────────────────
pub mod annotation {
    pub const COUNTRY: &str = "country";
    pub const YEAR: &str = "year";
    pub const CATEGORY: &str = "category";

    /// Group label for shocks without an annotation.
    pub const UNLABELED: &str = "unlabeled";
}
