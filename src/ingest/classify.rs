//! Extension-based file classification.
//!
//! Only [`FileCategory::NonProcessable`] files are kept out of the queue.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a repository file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileCategory {
    Source,
    Data,
    Markup,
    Style,
    Docs,
    /// Images, video, audio, fonts, archives and compiled binaries.
    NonProcessable,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Source => "source",
            FileCategory::Data => "data",
            FileCategory::Markup => "markup",
            FileCategory::Style => "style",
            FileCategory::Docs => "docs",
            FileCategory::NonProcessable => "non-processable",
        }
    }

    pub fn is_processable(&self) -> bool {
        *self != FileCategory::NonProcessable
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "js", "mjs", "cjs", "jsx", "ts", "tsx", "py", "go", "java", "kt", "kts", "scala", "c",
    "h", "cc", "cpp", "cxx", "hpp", "cs", "rb", "php", "swift", "m", "mm", "sh", "bash", "zsh",
    "ps1", "lua", "pl", "r", "dart", "ex", "exs", "erl", "hs", "clj", "elm", "vue", "svelte",
    "sql", "zig", "nim", "fs", "groovy", "gradle",
];

const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "xhtml", "svg", "hbs", "ejs", "njk", "jinja", "j2"];

const STYLE_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less", "styl"];

const DOCS_EXTENSIONS: &[&str] = &["md", "mdx", "markdown", "rst", "adoc", "txt", "tex"];

const NON_PROCESSABLE_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "tif", "psd", "heic", "avif",
    // video and audio
    "mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "mp3", "wav", "ogg", "flac", "aac", "m4a",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "war",
    // compiled and binary documents
    "exe", "dll", "so", "dylib", "bin", "o", "a", "lib", "class", "pyc", "pyo", "wasm", "pdf",
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "sqlite", "db",
];

const DOC_NAMES: &[&str] = &[
    "readme",
    "license",
    "licence",
    "changelog",
    "contributing",
    "authors",
    "notice",
    "code_of_conduct",
];

const SOURCE_NAMES: &[&str] = &["makefile", "dockerfile", "rakefile", "gemfile", "justfile"];

/// Classifies a repository path by its extension (or well-known file name).
pub fn classify(path: &str) -> FileCategory {
    let lower = path.to_lowercase();
    let basename = lower.rsplit('/').next().unwrap_or(&lower);

    let ext = match basename.rsplit_once('.') {
        // Dotfiles like `.gitignore` have no extension.
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => {
            if DOC_NAMES.contains(&basename) {
                return FileCategory::Docs;
            }
            if SOURCE_NAMES.contains(&basename) {
                return FileCategory::Source;
            }
            return FileCategory::Data;
        }
    };

    if NON_PROCESSABLE_EXTENSIONS.contains(&ext) {
        FileCategory::NonProcessable
    } else if SOURCE_EXTENSIONS.contains(&ext) {
        FileCategory::Source
    } else if STYLE_EXTENSIONS.contains(&ext) {
        FileCategory::Style
    } else if MARKUP_EXTENSIONS.contains(&ext) {
        FileCategory::Markup
    } else if DOCS_EXTENSIONS.contains(&ext) {
        FileCategory::Docs
    } else {
        // json, yaml, toml, lockfiles and anything unrecognized.
        FileCategory::Data
    }
}
