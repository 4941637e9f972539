use serde::{Deserialize, Serialize};

pub const MINI_TRACKER_START: &str = "---mini_tracker_start---";
pub const MINI_TRACKER_END: &str = "---mini_tracker_end---";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Markers {
    pub start: String,
    pub end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self { start: MINI_TRACKER_START.to_string(), end: MINI_TRACKER_END.to_string() }
    }
}

/// How a tracker's text sits inside its file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Layout {
    /// The whole file is the tracker.
    Standalone,
    /// Only the region between the markers is machine-owned. `template` seeds
    /// the surrounding document when the file has no usable markers.
    Embedded { markers: Markers, template: String },
}

/// A file split into the text before, between and after a marker pair.
///
/// `preamble` ends with the start marker line and `postamble` begins with the
/// end marker line, so re-rendering with a new region leaves every byte outside
/// the region as it was.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ManagedDocument {
    pub preamble: String,
    pub region: String,
    pub postamble: String,
}

impl ManagedDocument {
    /// Split `text` on exactly one start and one following end marker line.
    /// Returns `None` when markers are missing, duplicated or inverted.
    #[must_use]
    pub fn parse(text: &str, markers: &Markers) -> Option<Self> {
        let mut offset = 0;
        let mut starts = Vec::new();
        let mut ends = Vec::new();

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case(&markers.start) {
                starts.push(offset + line.len());
            } else if trimmed.eq_ignore_ascii_case(&markers.end) {
                ends.push(offset);
            }
            offset += line.len();
        }

        let (&[region_start], &[region_end]) = (starts.as_slice(), ends.as_slice()) else {
            return None;
        };
        if region_end < region_start {
            return None;
        }

        Some(Self {
            preamble: text[..region_start].to_string(),
            region: text[region_start..region_end].to_string(),
            postamble: text[region_end..].to_string(),
        })
    }

    /// A fresh document: the template followed by an empty marked region.
    #[must_use]
    pub fn from_template(template: &str, markers: &Markers) -> Self {
        let mut preamble = template.to_string();
        if !preamble.is_empty() && !preamble.ends_with('\n') {
            preamble.push('\n');
        }
        preamble.push_str(&markers.start);
        preamble.push('\n');
        Self { preamble, region: String::new(), postamble: format!("{}\n", markers.end) }
    }

    #[must_use]
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        if !self.region.is_empty() && !self.region.ends_with('\n') {
            self.region.push('\n');
        }
        self
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!("{}{}{}", self.preamble, self.region, self.postamble)
    }
}
