//! Visibility filters and ordering for directory listings.
//!
//! The order is total: `..` first, then directories, then files, and
//! within each group the selected column. Size ordering compares the
//! formatted size strings (`"1.00 KB"` sorts before `"999 bytes"`), which
//! is the behaviour clients observe. It lives in [`compare_formatted_size`]
//! so a numeric comparator can replace it in one place.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scanner::DirectoryEntry;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Column a listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    /// Case-insensitive entry name.
    #[default]
    Name,
    /// Formatted size string.
    Size,
    /// Modification timestamp.
    Modified,
}

impl SortColumn {
    /// Query-string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortColumn::Name => "name",
            SortColumn::Size => "size",
            SortColumn::Modified => "modified",
        }
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortColumn::Name),
            "size" => Ok(SortColumn::Size),
            "modified" => Ok(SortColumn::Modified),
            other => Err(format!("unknown sort column: {other}")),
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the per-column comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// Query-string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// Apply the direction to an ascending comparison result.
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort and filter settings for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewPreferences {
    /// Column to sort by.
    pub sort_column: SortColumn,
    /// Sort direction.
    pub sort_order: SortOrder,
    /// Hide names starting with `.`.
    pub hide_dotfiles: bool,
    /// Hide directories.
    pub hide_dirs: bool,
    /// Hide non-directories.
    pub hide_files: bool,
}

impl Default for ViewPreferences {
    fn default() -> Self {
        Self {
            sort_column: SortColumn::Name,
            sort_order: SortOrder::Asc,
            hide_dotfiles: true,
            hide_dirs: false,
            hide_files: false,
        }
    }
}

/// Explicit per-request overrides. `None` keeps the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreferenceOverrides {
    /// Requested sort column.
    pub sort_column: Option<SortColumn>,
    /// Requested sort direction.
    pub sort_order: Option<SortOrder>,
    /// Requested dotfile visibility.
    pub hide_dotfiles: Option<bool>,
    /// Requested directory visibility.
    pub hide_dirs: Option<bool>,
    /// Requested file visibility.
    pub hide_files: Option<bool>,
}

impl PreferenceOverrides {
    /// Build overrides from raw request parameters.
    ///
    /// Unknown sort values are ignored; flags use [`parse_flag`].
    pub fn from_params(
        sort: Option<&str>,
        order: Option<&str>,
        hide_dotfiles: Option<&str>,
        hide_dirs: Option<&str>,
        hide_files: Option<&str>,
    ) -> Self {
        Self {
            sort_column: sort.and_then(|s| s.parse().ok()),
            sort_order: order.and_then(|s| s.parse().ok()),
            hide_dotfiles: hide_dotfiles.map(parse_flag),
            hide_dirs: hide_dirs.map(parse_flag),
            hide_files: hide_files.map(parse_flag),
        }
    }

    /// True when no override is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of applying overrides to stored preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceUpdate {
    /// Preferences to use for this request.
    pub preferences: ViewPreferences,
    /// Whether the caller must persist `preferences`.
    pub changed: bool,
}

impl ViewPreferences {
    /// Merge request overrides into these (stored) preferences.
    pub fn apply_overrides(&self, overrides: &PreferenceOverrides) -> PreferenceUpdate {
        let preferences = Self {
            sort_column: overrides.sort_column.unwrap_or(self.sort_column),
            sort_order: overrides.sort_order.unwrap_or(self.sort_order),
            hide_dotfiles: overrides.hide_dotfiles.unwrap_or(self.hide_dotfiles),
            hide_dirs: overrides.hide_dirs.unwrap_or(self.hide_dirs),
            hide_files: overrides.hide_files.unwrap_or(self.hide_files),
        };
        PreferenceUpdate {
            changed: preferences != *self,
            preferences,
        }
    }

    /// Whether `entry` survives the visibility filters. `..` always does.
    pub fn is_visible(&self, entry: &DirectoryEntry) -> bool {
        if entry.is_parent_link() {
            return true;
        }
        if self.hide_dotfiles && entry.name.starts_with('.') {
            return false;
        }
        if self.hide_dirs && entry.is_directory {
            return false;
        }
        !(self.hide_files && !entry.is_directory)
    }

    /// Total order used for listings.
    pub fn compare(&self, a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
        match (a.is_parent_link(), b.is_parent_link()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        match (a.is_directory, b.is_directory) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        let by_column = match self.sort_column {
            SortColumn::Size if !a.is_directory => {
                compare_formatted_size(&a.size_display(), &b.size_display())
            }
            SortColumn::Modified => a.modified_display().cmp(&b.modified_display()),
            SortColumn::Name | SortColumn::Size => compare_ignore_case(&a.name, &b.name),
        };

        // Ties fall back to the name so equal keys never depend on readdir order.
        self.sort_order.apply(
            by_column
                .then_with(|| compare_ignore_case(&a.name, &b.name))
                .then_with(|| a.name.cmp(&b.name)),
        )
    }
}

/// Filter and sort a raw listing.
pub fn apply(
    entries: impl IntoIterator<Item = DirectoryEntry>,
    prefs: &ViewPreferences,
) -> Vec<DirectoryEntry> {
    let mut visible: Vec<_> = entries
        .into_iter()
        .filter(|entry| prefs.is_visible(entry))
        .collect();
    visible.sort_by(|a, b| prefs.compare(a, b));
    visible
}

/// Order a column header should request next.
///
/// Clicking the active ascending column flips to descending; anything else
/// starts ascending.
pub fn toggle_order(column: SortColumn, prefs: &ViewPreferences) -> SortOrder {
    if column == prefs.sort_column && prefs.sort_order == SortOrder::Asc {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    }
}

/// Parse a boolean request flag.
///
/// `1`, `true`, `on` and `yes` (any case) are true; everything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Format a byte count as `N bytes`, `X.XX KB`, `X.XX MB` or `X.XX GB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{} GB", format_two_decimals(bytes as f64 / GIB as f64))
    } else if bytes >= MIB {
        format!("{} MB", format_two_decimals(bytes as f64 / MIB as f64))
    } else if bytes >= KIB {
        format!("{} KB", format_two_decimals(bytes as f64 / KIB as f64))
    } else {
        format!("{bytes} bytes")
    }
}

/// Compare two formatted size strings, case-insensitively.
///
/// This is a string comparison, not a numeric one.
pub fn compare_formatted_size(a: &str, b: &str) -> Ordering {
    compare_ignore_case(a, b)
}

/// ASCII case-insensitive byte comparison.
fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Two decimals with comma thousands separators, e.g. `1,536.00`.
fn format_two_decimals(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let (integer, fraction) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let digits = integer.as_bytes();
    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit as char);
    }

    format!("{grouped}.{fraction}")
}
