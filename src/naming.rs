//! Output file naming and collision resolution.

use std::collections::HashSet;
use std::path::Path;

use crate::config::ConversionOptions;

/// Extension of every encoded output file
pub const OUTPUT_EXTENSION: &str = "webp";

/// Derives output names for a run.
///
/// In overwrite mode the computed name is used as-is. Otherwise a `-N` suffix
/// is appended until the name is free both on disk and among the names
/// already handed out by this namer.
pub struct OutputNamer<'a> {
    options: &'a ConversionOptions,
    claimed: HashSet<String>,
}

impl<'a> OutputNamer<'a> {
    pub fn new(options: &'a ConversionOptions) -> Self {
        Self {
            options,
            claimed: HashSet::new(),
        }
    }

    /// Name for the input at 1-based `index`, before any collision handling
    pub fn base_name(&self, source: &Path, index: usize) -> String {
        build_output_name(source, self.options.trimmed_export_name(), index)
    }

    /// Name that the run will actually write for the input at `index`
    pub fn next_name(&mut self, source: &Path, index: usize) -> String {
        let name = self.base_name(source, index);
        let name = if self.options.overwrite {
            name
        } else {
            self.disambiguate(&name)
        };
        self.claimed.insert(name.clone());
        name
    }

    fn disambiguate(&self, name: &str) -> String {
        if self.is_free(name) {
            return name.to_string();
        }

        let (stem, ext) = split_extension(name);
        (1..)
            .map(|n| match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            })
            .find(|candidate| self.is_free(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    fn is_free(&self, name: &str) -> bool {
        !self.claimed.contains(name) && !self.options.output_dir.join(name).exists()
    }
}

/// `{export_name}-{index}.webp` when an export name is given, else `{stem}.webp`
pub fn build_output_name(source: &Path, export_name: Option<&str>, index: usize) -> String {
    match export_name {
        Some(base) => format!("{base}-{index}.{OUTPUT_EXTENSION}"),
        None => {
            let stem = source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            format!("{stem}.{OUTPUT_EXTENSION}")
        }
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
