//! Options shared by the series file constructors.

use crate::buffer::GrowthSchedule;
use crate::signature::TypeMap;

/// Configuration for creating or opening a series file.
///
/// ```
/// use tickfile::SeriesOptions;
///
/// let opts = SeriesOptions::new()
///     .tag("eurusd minute bars")
///     .buffer_schedule(tickfile::GrowthSchedule::Single { size: 4096 });
/// ```
#[derive(Debug, Clone)]
pub struct SeriesOptions {
    tag: String,
    schedule: GrowthSchedule,
    type_map: Option<TypeMap>,
}

impl SeriesOptions {
    /// Default options: an empty tag, the default growing buffer schedule
    /// and no type map.
    pub fn new() -> Self {
        Self {
            tag: String::new(),
            schedule: GrowthSchedule::default_growing(),
            type_map: None,
        }
    }

    /// Sets the free-form tag persisted in the header at create time.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the buffer sizing schedule used by streaming reads.
    pub fn buffer_schedule(mut self, schedule: GrowthSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Supplies tag renames that authorize opening files whose persisted
    /// signature uses older type names.
    pub fn type_map(mut self, map: TypeMap) -> Self {
        self.type_map = Some(map);
        self
    }

    pub(crate) fn tag_str(&self) -> &str {
        &self.tag
    }

    pub(crate) fn schedule(&self) -> GrowthSchedule {
        self.schedule
    }

    pub(crate) fn map_ref(&self) -> Option<&TypeMap> {
        self.type_map.as_ref()
    }
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self::new()
    }
}
