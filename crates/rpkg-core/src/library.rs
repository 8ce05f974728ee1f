//! Library path resolution across lockfile layout conventions.

use crate::types::RVersion;

/// Resolve the on-disk library directory for a lockfile convention.
///
/// Total over its input: any `lockfile_type` other than `renv` or `packrat`
/// (including the empty string for a native library) returns `fallback`
/// unchanged.
///
/// # Example
///
/// ```
/// use rpkg_core::library::library_path;
/// use rpkg_core::types::RVersion;
///
/// let rv = RVersion::new(1, 2, 3);
/// assert_eq!(library_path("renv", &rv, "apple", "original"), "renv/library/R-1.2/apple");
/// ```
pub fn library_path(lockfile_type: &str, rv: &RVersion, platform: &str, fallback: &str) -> String {
    match lockfile_type {
        "renv" => format!("renv/library/R-{}.{}/{}", rv.major, rv.minor, platform),
        "packrat" => format!(
            "packrat/lib/{}/{}.{}.{}",
            platform, rv.major, rv.minor, rv.patch
        ),
        _ => fallback.to_string(),
    }
}
