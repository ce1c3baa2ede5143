use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

fn lane_suffix() -> &'static Regex {
    static LANE_SUFFIX: OnceLock<Regex> = OnceLock::new();
    LANE_SUFFIX.get_or_init(|| Regex::new(r"_S\d+$").expect("static regex"))
}

/// Strips a trailing `_S<digits>` sequencer suffix and maps `-` and `.` to `_`.
pub fn normalize_sample_name(name: &str) -> String {
    lane_suffix()
        .replace(name, "")
        .replace(['-', '.'], "_")
}

/// Drops a read-pair suffix (`_1`, `_2`, `_R1`, `_R2`).
pub fn edit_name(name: &str) -> &str {
    for suffix in ["_R1", "_R2", "_1", "_2"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped;
        }
    }
    name
}

pub fn edit_names<'a, I>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    names
        .into_iter()
        .map(|name| edit_name(name).to_string())
        .collect()
}
